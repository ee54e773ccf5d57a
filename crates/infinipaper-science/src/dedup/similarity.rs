use std::collections::BTreeSet;

use rapidfuzz::fuzz;

/// Normalized Indel similarity of two strings, 0–100.
pub fn ratio(a: &str, b: &str) -> f64 {
    fuzz::ratio(a.chars(), b.chars()) * 100.0
}

/// Order-insensitive title similarity, 0–100.
///
/// Both sides are split on whitespace, deduplicated and sorted. When the
/// shared tokens cover one side entirely the score is 100; otherwise it is the
/// best [`ratio`] between the shared tokens and each side's sorted tokens.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let left: BTreeSet<&str> = a.split_whitespace().collect();
    let right: BTreeSet<&str> = b.split_whitespace().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let shared: Vec<&str> = left.intersection(&right).copied().collect();
    let only_left: Vec<&str> = left.difference(&right).copied().collect();
    let only_right: Vec<&str> = right.difference(&left).copied().collect();

    if !shared.is_empty() && (only_left.is_empty() || only_right.is_empty()) {
        return 100.0;
    }

    let shared = shared.join(" ");
    let with_left = join_tokens(&shared, &only_left.join(" "));
    let with_right = join_tokens(&shared, &only_right.join(" "));

    ratio(&shared, &with_left)
        .max(ratio(&shared, &with_right))
        .max(ratio(&with_left, &with_right))
}

fn join_tokens(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{head} {tail}"),
    }
}
