use std::borrow::Cow;

use memchr::memmem;

/// Case-insensitive substring test. An empty needle matches any haystack.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let haystack = upper(haystack);
    let needle = upper(needle);
    memmem::find(haystack.as_bytes(), needle.as_bytes()).is_some()
}

// Normalized street names are already uppercase, skip the allocation for them
fn upper(s: &str) -> Cow<'_, str> {
    if s.chars().any(char::is_lowercase) {
        Cow::Owned(s.to_uppercase())
    } else {
        Cow::Borrowed(s)
    }
}

/// Trim, collapse inner whitespace runs and uppercase. Blank input is `None`.
pub fn normalize_label(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_uppercase())
    }
}

/// Trimmed text, blank input is `None`. Case is preserved.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a non-negative person count.
///
/// `Ok(None)` for blank input, `Err` with a reason for anything that is not a
/// non-negative integer (integral floats such as `2.0` are accepted).
pub fn parse_count(raw: &str) -> Result<Option<u32>, String> {
    let field = raw.trim();
    if field.is_empty() {
        return Ok(None);
    }
    if let Ok(value) = atoi_simd::parse::<u32>(field.as_bytes()) {
        return Ok(Some(value));
    }
    match fast_float::parse::<f64, _>(field) {
        Ok(v) if v < 0.0 => Err("negative count".to_string()),
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v <= f64::from(u32::MAX) => {
            Ok(Some(v as u32))
        }
        Ok(_) => Err("count is not a whole number".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Parses a coordinate. `Ok(None)` for blank input or non-finite values.
pub fn parse_coordinate(raw: &str) -> Result<Option<f64>, String> {
    let field = raw.trim();
    if field.is_empty() {
        return Ok(None);
    }
    match fast_float::parse::<f64, _>(field) {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

/// Lowercase `[a-z0-9_]` identifier for file names.
pub fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}
