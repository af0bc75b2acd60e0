/// IUPAC nucleotide code for a set of observed single-base alleles.
///
/// `N` among the alleles, or no recognizable base at all, yields `N`.
pub fn iupac_code<'a, I>(alleles: I) -> char
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = [false; 4];
    for allele in alleles {
        match allele {
            "A" => seen[0] = true,
            "C" => seen[1] = true,
            "G" => seen[2] = true,
            "T" | "U" => seen[3] = true,
            _ => return 'N',
        }
    }
    code_from_seen(seen)
}

fn code_from_seen(seen: [bool; 4]) -> char {
    match (seen[0], seen[1], seen[2], seen[3]) {
        (true, false, false, false) => 'A',
        (false, true, false, false) => 'C',
        (false, false, true, false) => 'G',
        (false, false, false, true) => 'T',
        (true, false, true, false) => 'R',
        (false, true, false, true) => 'Y',
        (false, true, true, false) => 'S',
        (true, false, false, true) => 'W',
        (false, false, true, true) => 'K',
        (true, true, false, false) => 'M',
        (false, true, true, true) => 'B',
        (true, false, true, true) => 'D',
        (true, true, false, true) => 'H',
        (true, true, true, false) => 'V',
        _ => 'N',
    }
}
