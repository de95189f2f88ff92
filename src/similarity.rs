/// Similarity in [0, 1] of two titles after collapsing whitespace and
/// folding case: one minus the edit distance over the longer length.
pub fn normalized_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&fold(a), &fold(b))
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
