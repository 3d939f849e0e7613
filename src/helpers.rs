/// Normalize a district name into a join key: trimmed, lowercased, inner
/// whitespace collapsed to single spaces.
pub fn normalize_name(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalize an optional census code. Blank codes count as absent.
pub fn normalize_code(value: Option<&str>) -> Option<String> {
    value
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
}
