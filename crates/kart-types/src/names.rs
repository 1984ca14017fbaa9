//! Identifier validation for the pieces of a storage key.
//!
//! Every segment that ends up in a key must be free of separators so the
//! key scheme stays reversible:
//! - `project`, `channel`, `version`: non-empty, `[A-Za-z0-9._+-]`, starting
//!   with an alphanumeric character
//! - `arch`: same as above, but without `.` (it separates arch from ext)
//! - `ext`: non-empty `[A-Za-z0-9.]`, must not start or end with `.`

use crate::error::TypeError;

fn invalid(field: &'static str, value: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidIdentifier {
        field,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), TypeError> {
    let first = value
        .chars()
        .next()
        .ok_or_else(|| invalid(field, value, "must not be empty"))?;

    if !first.is_ascii_alphanumeric() {
        return Err(invalid(field, value, "must start with a letter or digit"));
    }

    if let Some(ch) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-')))
    {
        return Err(invalid(field, value, format!("contains forbidden character: {ch:?}")));
    }

    Ok(())
}

/// Validate a project name.
///
/// ```
/// use kart_types::names::validate_project;
///
/// assert!(validate_project("testing").is_ok());
/// assert!(validate_project("my/project").is_err());
/// ```
pub fn validate_project(name: &str) -> Result<(), TypeError> {
    check_segment("project", name)
}

/// Validate a channel or track name.
pub fn validate_channel(name: &str) -> Result<(), TypeError> {
    check_segment("channel", name)
}

/// Validate a version string.
pub fn validate_version(version: &str) -> Result<(), TypeError> {
    check_segment("version", version)
}

/// Validate an architecture label. Dots are reserved for the extension.
pub fn validate_arch(arch: &str) -> Result<(), TypeError> {
    check_segment("arch", arch)?;
    if arch.contains('.') {
        return Err(invalid("arch", arch, "must not contain '.'"));
    }
    Ok(())
}

/// Validate a file extension such as `tar.gz`.
pub fn validate_ext(ext: &str) -> Result<(), TypeError> {
    if ext.is_empty() {
        return Err(invalid("ext", ext, "must not be empty"));
    }
    if ext.starts_with('.') || ext.ends_with('.') {
        return Err(invalid("ext", ext, "must not start or end with '.'"));
    }
    if ext.contains("..") {
        return Err(invalid("ext", ext, "must not contain '..'"));
    }
    if let Some(ch) = ext.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '.')) {
        return Err(invalid("ext", ext, format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}
