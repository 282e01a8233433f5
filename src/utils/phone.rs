/// Strip everything but digits and drop a leading US country code.
///
/// Mirrors what the job system stores, so `+1 (555) 000-1000` and
/// `5550001000` compare equal.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.strip_prefix('1') {
        Some(rest) => rest.to_string(),
        None => digits,
    }
}

/// Canonical 10-digit form, or `None` when the input cannot be one.
pub fn canonical_phone(raw: &str) -> Option<String> {
    let normalized = normalize_phone(raw);
    if normalized.len() == 10 {
        Some(normalized)
    } else {
        None
    }
}

/// `(555) 000-1000`, the display format the job system also searches on.
pub fn format_phone(canonical: &str) -> String {
    if canonical.len() != 10 {
        return canonical.to_string();
    }
    format!(
        "({}) {}-{}",
        &canonical[0..3],
        &canonical[3..6],
        &canonical[6..]
    )
}
