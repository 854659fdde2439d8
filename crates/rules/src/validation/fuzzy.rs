//! "Did you mean" hints for tag references and the rule_id style check.

/// Closest candidate to `input`, compared case-insensitively.
///
/// Nothing is suggested when more than half of the longer string would
/// have to change.
pub(crate) fn suggest<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let needle = input.to_ascii_uppercase();
    let (best, distance) = candidates
        .iter()
        .map(|&c| (c, edit_distance(&needle, &c.to_ascii_uppercase())))
        .min_by_key(|&(_, d)| d)?;
    (distance <= input.len().max(best.len()) / 2).then_some(best)
}

/// Levenshtein distance over chars, two rows at a time.
pub(crate) fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitute = diag + usize::from(ca != *cb);
            row[j + 1] = substitute.min(above + 1).min(row[j] + 1);
            diag = above;
        }
    }
    row[b.len()]
}

/// Lowercase words of ASCII letters and digits joined by single hyphens.
pub(crate) fn is_kebab_case(s: &str) -> bool {
    !s.is_empty()
        && s.split('-').all(|word| {
            !word.is_empty()
                && word
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}
