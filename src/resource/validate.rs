//! Attribute validation shared by the metrics router resources.

use crate::error::{ProviderError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Names and regions: `^[a-zA-Z0-9 \-._:]+$`
pub fn name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9 \-._:]+$").expect("static regex"))
}

/// CRNs additionally allow `/`
pub fn crn_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9 \-._:/]+$").expect("static regex"))
}

/// Value must match `pattern` and have a length within `min..=max`
pub fn regexp_len(attr: &str, value: &str, pattern: &Regex, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ProviderError::validation(format!(
            "expected length of {attr} to be in the range ({min} - {max}), got {value:?}"
        )));
    }
    if !pattern.is_match(value) {
        return Err(ProviderError::validation(format!(
            "{attr} ({value:?}) should match regexp {}",
            pattern.as_str()
        )));
    }
    Ok(())
}

pub fn allowed_value(attr: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ProviderError::validation(format!(
        "{attr:?} must contain a value from {allowed:?}, got {value:?}"
    )))
}

pub fn non_empty<T>(attr: &str, items: &[T]) -> Result<()> {
    if items.is_empty() {
        return Err(ProviderError::validation(format!("{attr} must not be empty")));
    }
    Ok(())
}
