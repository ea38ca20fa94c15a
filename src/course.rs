/// A course code split into its department prefix and numeric level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCode {
    pub normalized: String,
    pub prefix: String,
    pub level: Option<u32>,
}

/// Uppercases and strips spaces and hyphens so `ir 301`, `IR-301` and
/// `IR301` compare equal.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Returns `None` when no department prefix can be extracted.
pub fn parse(raw: &str) -> Option<CourseCode> {
    let normalized = normalize(raw);
    let prefix_len = normalized
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphabetic() || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(normalized.len());

    let prefix = normalized[..prefix_len].trim_end_matches('_').to_string();
    if prefix.is_empty() || !prefix.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let digits: String = normalized[prefix_len..]
        .chars()
        .skip_while(|c| *c == '_' || *c == '.')
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let level = if digits.is_empty() {
        None
    } else {
        digits.parse::<u32>().ok()
    };

    Some(CourseCode {
        normalized,
        prefix,
        level,
    })
}
