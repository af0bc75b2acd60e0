use crate::calls::GAP_STR;
use crate::iupac::iupac_code;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// A single resolved symbol: a base, a base plus inserted bases, or `-`.
    Base(String),
    /// Per-read observations that have not collapsed to a single symbol.
    Alleles(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusPosition {
    coordinate: u64,
    reference: char,
    call: Call,
    support: u32,
    depth: u32,
    ambiguous: bool,
    complexity: usize,
    analyze: bool,
}

impl ConsensusPosition {
    pub fn resolved(coordinate: u64, reference: char, symbol: &str, support: u32) -> Self {
        Self {
            coordinate,
            reference: reference.to_ascii_uppercase(),
            call: Call::Base(symbol.to_ascii_uppercase()),
            support,
            depth: support,
            ambiguous: false,
            complexity: 0,
            analyze: false,
        }
    }

    pub fn gap(coordinate: u64, reference: char) -> Self {
        Self::resolved(coordinate, reference, GAP_STR, 0)
    }

    /// A deleted position whose reads could not agree on any shape; it is
    /// kept as an ambiguous gap and excluded from further voting.
    pub fn unresolved_gap(coordinate: u64, reference: char) -> Self {
        Self {
            ambiguous: true,
            complexity: 1,
            ..Self::gap(coordinate, reference)
        }
    }

    pub fn observed(coordinate: u64, reference: char, observations: Vec<String>, support: u32) -> Self {
        let observations: Vec<String> = observations
            .into_iter()
            .map(|symbol| symbol.to_ascii_uppercase())
            .collect();
        Self {
            coordinate,
            reference: reference.to_ascii_uppercase(),
            depth: observations.len() as u32,
            call: Call::Alleles(observations),
            support,
            ambiguous: true,
            complexity: 0,
            analyze: true,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Plurality-with-floor vote: a lone symbol meeting `threshold` wins,
    /// then the reference, otherwise the position stays multi-valued.
    /// Returns whether the position is ambiguous afterwards.
    pub fn flatten(&mut self, threshold: f64) -> bool {
        if !self.analyze {
            return self.ambiguous;
        }
        self.analyze = false;

        let Call::Alleles(observations) = &mut self.call else {
            return self.ambiguous;
        };
        if observations.is_empty() {
            self.call = Call::Base(GAP_STR.to_string());
            self.support = 0;
            self.ambiguous = false;
            self.complexity = 0;
            return false;
        }

        let total = observations.len();
        let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
        for symbol in observations.iter() {
            *counts.entry(symbol.as_str()).or_default() += 1;
        }
        let passing: Vec<(&str, u32)> = counts
            .iter()
            .filter(|(_, count)| meets_threshold(**count as usize, total, threshold))
            .map(|(symbol, count)| (*symbol, *count))
            .collect();

        if let [(symbol, count)] = passing.as_slice() {
            let differs = !is_reference(symbol, self.reference);
            let symbol = (*symbol).to_string();
            self.support = *count;
            self.ambiguous = differs;
            self.complexity = usize::from(differs);
            self.call = Call::Base(symbol);
            return self.ambiguous;
        }

        let reference = self.reference.to_string();
        if let Some((_, count)) = passing.iter().find(|(symbol, _)| *symbol == reference) {
            self.support = *count;
            self.ambiguous = false;
            self.complexity = 0;
            self.call = Call::Base(reference);
            return false;
        }

        // With nothing at the threshold every observed symbol is kept, so the
        // position renders as the ambiguity of all of them.
        let keep: BTreeSet<String> = if passing.is_empty() {
            counts.keys().map(|symbol| (*symbol).to_string()).collect()
        } else {
            passing.iter().map(|(symbol, _)| (*symbol).to_string()).collect()
        };
        observations.retain(|symbol| keep.contains(symbol));
        self.support = observations.len() as u32;
        self.ambiguous = true;
        self.complexity = keep.iter().map(|symbol| symbol.chars().count()).sum();
        self.ambiguous
    }

    pub fn coordinate(&self) -> u64 {
        self.coordinate
    }

    pub fn reference(&self) -> char {
        self.reference
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    pub fn support(&self) -> u32 {
        self.support
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    pub fn complexity(&self) -> usize {
        self.complexity
    }

    pub fn needs_analysis(&self) -> bool {
        self.analyze
    }

    pub fn is_gap(&self) -> bool {
        matches!(&self.call, Call::Base(symbol) if symbol == GAP_STR)
    }

    pub fn alleles(&self) -> Vec<&str> {
        match &self.call {
            Call::Base(symbol) => vec![symbol.as_str()],
            Call::Alleles(observations) => observations
                .iter()
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        }
    }

    /// Fragment token for this position.
    ///
    /// Multi-valued positions render as `N` when a gap survives, otherwise
    /// as the IUPAC code of the single-base alleles; surviving insertion
    /// alleles are listed as `[ALT|...|CODE]`.
    pub fn render(&self) -> Cow<'_, str> {
        match &self.call {
            Call::Base(symbol) => Cow::Borrowed(symbol.as_str()),
            Call::Alleles(_) => Cow::Owned(render_alleles(&self.alleles())),
        }
    }
}

fn render_alleles(alleles: &[&str]) -> String {
    if alleles.is_empty() || alleles.contains(&GAP_STR) {
        return "N".to_string();
    }

    let (singles, insertions): (Vec<&str>, Vec<&str>) = alleles
        .iter()
        .copied()
        .partition(|allele| allele.chars().count() == 1);

    if insertions.is_empty() {
        return iupac_code(singles).to_string();
    }

    let mut rendered = String::from("[");
    rendered.push_str(&insertions.join("|"));
    if !singles.is_empty() {
        rendered.push('|');
        rendered.push(iupac_code(singles));
    }
    rendered.push(']');
    rendered
}

fn is_reference(symbol: &str, reference: char) -> bool {
    let mut chars = symbol.chars();
    chars.next() == Some(reference) && chars.next().is_none()
}

/// `count / total >= threshold`, tolerant of rounding in fractions like 1/3.
pub(crate) fn meets_threshold(count: usize, total: usize, threshold: f64) -> bool {
    if total == 0 {
        return false;
    }
    count as f64 / total as f64 + 1e-9 >= threshold
}
