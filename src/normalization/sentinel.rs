//! Legacy rows use the literal `"N/A"` where a value is missing. These helpers
//! translate it by comparison so that transformation stays total over its input.

/// Sentinel standing in for NULL throughout the legacy dataset.
pub const NOT_AVAILABLE: &str = "N/A";

pub fn is_sentinel(value: &str) -> bool {
    value == NOT_AVAILABLE
}

/// `None` for NULL or the sentinel, otherwise the value untouched.
pub fn non_sentinel(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !is_sentinel(v))
}

/// Split a comma-joined column into trimmed, non-empty tokens.
pub fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a rating column. `Ok(None)` for NULL/sentinel, `Err` with the offending
/// text when it is not a number.
pub fn parse_rating(raw: Option<&str>) -> Result<Option<f64>, String> {
    match non_sentinel(raw) {
        None => Ok(None),
        Some(text) => text
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("rating {text:?} is not a number")),
    }
}
