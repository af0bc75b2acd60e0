use crate::calls::{DepthCheck, GAP_STR, ReadCall, decode_record};
use crate::errors::{AppError, Result};
use crate::pileup::{PileupReader, PileupRecord};
use crate::position::{ConsensusPosition, meets_threshold};
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{debug, warn};

/// Buffering stops with an error once a window holds this many times its
/// initial deletion length.
pub const WINDOW_GUARD_FACTOR: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutcome {
    pub positions: Vec<ConsensusPosition>,
    /// Rows pulled from the stream after the anchor row.
    pub rows_consumed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct DeletionWindowResolver {
    threshold: f64,
    depth_check: DepthCheck,
}

struct BufferedRow {
    record: PileupRecord,
    // None when a lenient depth check discarded the row.
    calls: Option<Vec<ReadCall>>,
}

impl DeletionWindowResolver {
    pub fn new(threshold: f64, depth_check: DepthCheck) -> Self {
        Self {
            threshold,
            depth_check,
        }
    }

    /// Every emitted position keeps its own row's coordinate, so a position
    /// missing from the pileup surfaces as a non-contiguous append.
    pub fn resolve<R: BufRead>(
        &self,
        anchor: &PileupRecord,
        anchor_calls: &[ReadCall],
        reader: &mut PileupReader<R>,
    ) -> Result<WindowOutcome> {
        let max_deletion = anchor_calls
            .iter()
            .map(ReadCall::deletion_length)
            .max()
            .unwrap_or(0);
        let rows = self.buffer_rows(anchor, max_deletion, reader)?;

        let mut window: Vec<Option<&[ReadCall]>> = Vec::with_capacity(rows.len() + 1);
        window.push(Some(anchor_calls));
        window.extend(rows.iter().map(|row| row.calls.as_deref()));
        let width = window.iter().flatten().map(|calls| calls.len()).max().unwrap_or(0);

        let mut columns: Vec<Vec<String>> = Vec::with_capacity(width);
        let mut discarded = 0usize;
        for read in 0..width {
            let (symbols, consistent) = read_column(read, &window);
            if consistent {
                columns.push(symbols);
            } else {
                discarded += 1;
            }
        }

        let mut shapes: BTreeMap<&[String], usize> = BTreeMap::new();
        for column in &columns {
            *shapes.entry(column.as_slice()).or_default() += 1;
        }
        let surviving: Vec<(&[String], usize)> = shapes
            .iter()
            .filter(|(_, count)| meets_threshold(**count, width, self.threshold))
            .map(|(shape, count)| (*shape, *count))
            .collect();

        debug!(
            contig = %anchor.contig,
            position = anchor.position,
            window = rows.len(),
            reads = width,
            discarded,
            shapes = shapes.len(),
            surviving = surviving.len(),
            "resolved deletion window"
        );

        let records: Vec<&PileupRecord> = std::iter::once(anchor)
            .chain(rows.iter().map(|row| &row.record))
            .collect();

        let positions: Vec<ConsensusPosition> = match surviving.as_slice() {
            [] => records
                .iter()
                .map(|record| ConsensusPosition::unresolved_gap(record.position, record.reference))
                .collect(),
            [(shape, count)] => records
                .iter()
                .zip(shape.iter())
                .map(|(record, symbol)| {
                    ConsensusPosition::resolved(
                        record.position,
                        record.reference,
                        symbol,
                        *count as u32,
                    )
                })
                .collect(),
            _ => {
                let kept: Vec<&[String]> = columns
                    .iter()
                    .map(Vec::as_slice)
                    .filter(|column| surviving.iter().any(|(shape, _)| shape == column))
                    .collect();
                records
                    .iter()
                    .enumerate()
                    .map(|(slot, record)| {
                        let observations: Vec<String> =
                            kept.iter().map(|column| column[slot].clone()).collect();
                        let support = observations
                            .iter()
                            .filter(|symbol| *symbol != GAP_STR)
                            .count() as u32;
                        ConsensusPosition::observed(
                            record.position,
                            record.reference,
                            observations,
                            support,
                        )
                    })
                    .collect()
            }
        };

        let positions = positions
            .into_iter()
            .zip(records.iter().zip(&window))
            .map(|(position, (record, calls))| match calls {
                Some(_) => position.with_depth(record.depth),
                None => ConsensusPosition::gap(record.position, record.reference),
            })
            .collect();

        Ok(WindowOutcome {
            positions,
            rows_consumed: rows.len(),
        })
    }

    // Extends while buffered rows claim deletions past the window's end.
    fn buffer_rows<R: BufRead>(
        &self,
        anchor: &PileupRecord,
        max_deletion: usize,
        reader: &mut PileupReader<R>,
    ) -> Result<Vec<BufferedRow>> {
        let limit = WINDOW_GUARD_FACTOR.saturating_mul(max_deletion.max(1));
        let mut required = max_deletion;
        let mut rows: Vec<BufferedRow> = Vec::new();
        let mut last_position = anchor.position;

        while rows.len() < required {
            if rows.len() >= limit {
                return Err(AppError::WindowOverflow {
                    contig: anchor.contig.clone(),
                    position: anchor.position,
                    rows: rows.len(),
                    limit,
                });
            }

            let Some(record) = reader.next_record()? else {
                warn!(
                    contig = %anchor.contig,
                    position = anchor.position,
                    claimed = required,
                    buffered = rows.len(),
                    "pileup ended inside a deletion window; truncating window"
                );
                break;
            };
            if record.contig != anchor.contig || record.position <= last_position {
                warn!(
                    contig = %anchor.contig,
                    position = anchor.position,
                    claimed = required,
                    buffered = rows.len(),
                    "contig ended inside a deletion window; truncating window"
                );
                reader.push_back(record);
                break;
            }

            last_position = record.position;
            let calls = decode_record(&record, self.depth_check)?;
            let row_index = rows.len() + 1;
            for call in calls.iter().flatten() {
                required = required.max(row_index + call.deletion_length());
            }
            rows.push(BufferedRow { record, calls });
        }

        Ok(rows)
    }
}

/// Symbols one read contributes across the window and whether its gaps
/// agree with its deletion claims. Slots covered by a claim must be gaps;
/// the remaining slots after the anchor must be all gaps or all bases.
/// Discarded rows pad with a gap and take no part in either check.
fn read_column(read: usize, window: &[Option<&[ReadCall]>]) -> (Vec<String>, bool) {
    let span = window.len();
    let mut symbols: Vec<String> = Vec::with_capacity(span);
    let mut claimed = vec![false; span];

    for (row, calls) in window.iter().enumerate() {
        match calls.and_then(|calls| calls.get(read)) {
            Some(call) => {
                symbols.push(call.symbol());
                let end = (row + call.deletion_length()).min(span - 1);
                for slot in claimed.iter_mut().take(end + 1).skip(row + 1) {
                    *slot = true;
                }
            }
            None => symbols.push(GAP_STR.to_string()),
        }
    }

    let known = |slot: &usize| window[*slot].is_some();
    let claims_hold = (1..span)
        .filter(known)
        .filter(|slot| claimed[*slot])
        .all(|slot| symbols[slot] == GAP_STR);
    let mut unclaimed = (1..span)
        .filter(known)
        .filter(|slot| !claimed[*slot])
        .map(|slot| symbols[slot] == GAP_STR);
    let uniform = match unclaimed.next() {
        Some(first) => unclaimed.all(|gap| gap == first),
        None => true,
    };

    (symbols, claims_hold && uniform)
}

#[cfg(test)]
mod tests {
    use super::{DeletionWindowResolver, read_column};
    use crate::calls::{DepthCheck, ReadCall, decode_calls};
    use crate::errors::{AppError, Result};
    use crate::pileup::{PileupReader, parse_pileup_line};
    use crate::position::Call;
    use std::io::Cursor;

    const THIRD: f64 = 1.0 / 3.0;

    fn try_resolve(
        anchor_line: &str,
        rest: &str,
        threshold: f64,
        depth_check: DepthCheck,
    ) -> (Result<super::WindowOutcome>, PileupReader<Cursor<Vec<u8>>>) {
        let anchor = parse_pileup_line(anchor_line.as_bytes(), 1).expect("expected anchor row");
        let calls = decode_calls(&anchor.calls, anchor.reference, 1).expect("expected calls");
        let mut reader = PileupReader::new(Cursor::new(rest.as_bytes().to_vec()));
        let outcome = DeletionWindowResolver::new(threshold, depth_check).resolve(
            &anchor,
            &calls,
            &mut reader,
        );
        (outcome, reader)
    }

    fn resolve(
        anchor_line: &str,
        rest: &str,
        threshold: f64,
    ) -> (super::WindowOutcome, PileupReader<Cursor<Vec<u8>>>) {
        let (outcome, reader) = try_resolve(anchor_line, rest, threshold, DepthCheck::Strict);
        (outcome.expect("expected window to resolve"), reader)
    }

    fn rendered(outcome: &super::WindowOutcome) -> String {
        outcome
            .positions
            .iter()
            .map(|position| position.render().into_owned())
            .collect()
    }

    #[test]
    fn dominant_deletion_resolves_to_single_shape() {
        let (outcome, mut reader) = resolve(
            "c\t3\tA\t4\t.-2CG.-2CG.-2CG.\tFFFF",
            "c\t4\tC\t4\t***.\tFFFF\nc\t5\tG\t4\t***.\tFFFF\nc\t6\tT\t4\t....\tFFFF\n",
            THIRD,
        );
        assert_eq!(outcome.rows_consumed, 2);
        assert_eq!(rendered(&outcome), "A--");
        assert!(outcome.positions.iter().all(|position| !position.is_ambiguous()));
        assert!(outcome.positions.iter().all(|position| position.support() == 3));
        let coordinates: Vec<u64> = outcome
            .positions
            .iter()
            .map(|position| position.coordinate())
            .collect();
        assert_eq!(coordinates, vec![3, 4, 5]);

        let next = reader
            .next_record()
            .expect("expected read success")
            .expect("expected row after window");
        assert_eq!(next.position, 6);
    }

    #[test]
    fn competing_shapes_defer_to_flatten() {
        let (mut outcome, _) = resolve(
            "c\t10\tT\t4\t.-1A.-1A..\tFFFF",
            "c\t11\tC\t4\t**AA\tFFFF\n",
            THIRD,
        );
        assert_eq!(outcome.positions.len(), 2);
        assert!(outcome.positions.iter().all(|position| position.needs_analysis()));
        for position in &mut outcome.positions {
            position.flatten(THIRD);
        }
        assert_eq!(outcome.positions[0].call(), &Call::Base("T".to_string()));
        assert_eq!(rendered(&outcome), "TN");
        assert_eq!(outcome.positions[1].complexity(), 2);
    }

    #[test]
    fn no_surviving_shape_yields_frozen_gaps() {
        let (outcome, _) = resolve(
            "c\t10\tT\t4\t.-1A.-1A..\tFFFF",
            "c\t11\tA\t4\t..*.\tFFFF\n",
            THIRD,
        );
        assert_eq!(outcome.positions.len(), 2);
        for position in &outcome.positions {
            assert!(position.is_gap());
            assert!(position.is_ambiguous());
            assert!(!position.needs_analysis());
            assert_eq!(position.support(), 0);
        }
    }

    #[test]
    fn window_is_truncated_at_end_of_stream() {
        let (outcome, _) = resolve(
            "c\t3\tA\t2\t.-4CGTA.-4CGTA\tFF",
            "c\t4\tC\t2\t**\tFF\n",
            THIRD,
        );
        assert_eq!(outcome.rows_consumed, 1);
        assert_eq!(rendered(&outcome), "A-");
    }

    #[test]
    fn window_stops_at_next_contig() {
        let (outcome, mut reader) = resolve(
            "c\t3\tA\t2\t.-2CG.-2CG\tFF",
            "c\t4\tC\t2\t**\tFF\nd\t1\tG\t2\t..\tFF\n",
            THIRD,
        );
        assert_eq!(outcome.rows_consumed, 1);
        let next = reader
            .next_record()
            .expect("expected read success")
            .expect("expected pushed-back row");
        assert_eq!(next.contig, "d");
    }

    #[test]
    fn window_extends_for_claims_inside_it() {
        let (outcome, _) = resolve(
            "c\t1\tA\t2\t.-1C.-1C\tFF",
            "c\t2\tC\t2\t*-2GT*-2GT\tFF\nc\t3\tG\t2\t**\tFF\nc\t4\tT\t2\t**\tFF\nc\t5\tA\t2\t..\tFF\n",
            THIRD,
        );
        assert_eq!(outcome.rows_consumed, 3);
        assert_eq!(rendered(&outcome), "A---");
    }

    #[test]
    fn skipped_rows_keep_their_own_coordinates() {
        let (outcome, _) = resolve(
            "c\t3\tA\t2\t.-2CG.-2CG\tFF",
            "c\t4\tC\t2\t**\tFF\nc\t7\tG\t2\t**\tFF\n",
            THIRD,
        );
        assert_eq!(outcome.rows_consumed, 2);
        let coordinates: Vec<u64> = outcome
            .positions
            .iter()
            .map(|position| position.coordinate())
            .collect();
        assert_eq!(coordinates, vec![3, 4, 7]);
    }

    #[test]
    fn lenient_discard_inside_window_is_unknown() {
        let (outcome, _) = try_resolve(
            "c\t1\tT\t4\t.-1A.-1A..\tFFFF",
            "c\t2\tA\t4\t*C\tFF\n",
            THIRD,
            DepthCheck::Lenient,
        );
        let outcome = outcome.expect("expected window to resolve");
        assert_eq!(outcome.positions.len(), 2);

        let anchor = &outcome.positions[0];
        assert_eq!(anchor.call(), &Call::Base("T".to_string()));
        assert_eq!(anchor.support(), 4);

        let discarded = &outcome.positions[1];
        assert_eq!(discarded.coordinate(), 2);
        assert!(discarded.is_gap());
        assert!(!discarded.is_ambiguous());
        assert!(!discarded.needs_analysis());
        assert_eq!(discarded.support(), 0);
        assert_eq!(discarded.depth(), 0);
    }

    #[test]
    fn strict_depth_mismatch_inside_window_is_fatal() {
        let (outcome, _) = try_resolve(
            "c\t1\tT\t4\t.-1A.-1A..\tFFFF",
            "c\t2\tA\t4\t*C\tFF\n",
            THIRD,
            DepthCheck::Strict,
        );
        assert!(matches!(
            outcome,
            Err(AppError::MalformedPileupRow { line: 1, .. })
        ));
    }

    #[test]
    fn runaway_windows_hit_the_guard() {
        let mut rest = String::new();
        for position in 2..200 {
            rest.push_str(&format!("c\t{position}\tA\t1\t.-1A\tF\n"));
        }
        let anchor = parse_pileup_line(b"c\t1\tA\t1\t.-1A\tF", 1).expect("expected anchor row");
        let calls = decode_calls(&anchor.calls, anchor.reference, 1).expect("expected calls");
        let mut reader = PileupReader::new(Cursor::new(rest.into_bytes()));
        let error = DeletionWindowResolver::new(THIRD, DepthCheck::Strict)
            .resolve(&anchor, &calls, &mut reader)
            .expect_err("expected guard to trip");
        assert!(matches!(error, AppError::WindowOverflow { limit: 64, .. }));
    }

    #[test]
    fn column_consistency_follows_claims() {
        let anchor = [ReadCall::Deletion("A".to_string(), 1)];
        let base = [ReadCall::Plain("C".to_string())];
        let gap = [ReadCall::Plain("-".to_string())];

        let (symbols, consistent) =
            read_column(0, &[Some(&anchor[..]), Some(&gap[..]), Some(&base[..])]);
        assert_eq!(symbols, vec!["A", "-", "C"]);
        assert!(consistent);

        let (_, consistent) =
            read_column(0, &[Some(&anchor[..]), Some(&base[..]), Some(&base[..])]);
        assert!(!consistent);

        let plain = [ReadCall::Plain("A".to_string())];
        let (_, consistent) = read_column(0, &[Some(&plain[..]), Some(&gap[..]), Some(&base[..])]);
        assert!(!consistent);

        let (symbols, consistent) =
            read_column(3, &[Some(&plain[..]), Some(&gap[..]), Some(&base[..])]);
        assert_eq!(symbols, vec!["-", "-", "-"]);
        assert!(consistent);
    }

    #[test]
    fn discarded_rows_do_not_split_columns() {
        let plain = [ReadCall::Plain("T".to_string())];
        let base = [ReadCall::Plain("C".to_string())];

        let (symbols, consistent) = read_column(0, &[Some(&plain[..]), None, Some(&base[..])]);
        assert_eq!(symbols, vec!["T", "-", "C"]);
        assert!(consistent);
    }
}
