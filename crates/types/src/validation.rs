//! Input validation for document paths.
//!
//! A document path alternates collection ids and document ids, so a valid
//! path has an even, non-zero number of non-empty segments.

use std::fmt;

/// Validation error with structured context.
///
/// Contains the specific constraint that was violated and the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Validates the segments of a document path.
///
/// # Errors
///
/// Returns [`ValidationError`] if there are no segments, any segment is
/// empty, or the segment count is odd (a collection path, not a document).
pub fn validate_document_segments(segments: &[String]) -> Result<(), ValidationError> {
    if segments.is_empty() {
        return Err(ValidationError {
            field: "document_key".to_string(),
            constraint: "must not be empty".to_string(),
        });
    }
    if let Some(pos) = segments.iter().position(String::is_empty) {
        return Err(ValidationError {
            field: "document_key".to_string(),
            constraint: format!("segment {pos} of '{}' is empty", segments.join("/")),
        });
    }
    if segments.len() % 2 != 0 {
        return Err(ValidationError {
            field: "document_key".to_string(),
            constraint: format!(
                "'{}' has {} segments; document paths need an even number",
                segments.join("/"),
                segments.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    #[test]
    fn test_valid_document_paths() {
        assert!(validate_document_segments(&segs("rooms/eros")).is_ok());
        assert!(validate_document_segments(&segs("rooms/eros/messages/1")).is_ok());
    }

    #[test]
    fn test_empty_segment_list_rejected() {
        let err = validate_document_segments(&[]).expect_err("empty should fail");
        assert_eq!(err.field, "document_key");
        assert_eq!(err.constraint, "must not be empty");
    }

    #[test]
    fn test_odd_segment_count_reports_count() {
        let err = validate_document_segments(&segs("rooms/eros/messages")).expect_err("odd");
        assert!(err.constraint.contains("3 segments"), "got: {err}");
    }

    #[test]
    fn test_empty_segment_reports_position() {
        let err = validate_document_segments(&segs("rooms//messages/1")).expect_err("empty seg");
        assert!(err.constraint.starts_with("segment 1"), "got: {err}");
    }

    #[test]
    fn test_display_joins_field_and_constraint() {
        let err = ValidationError {
            field: "document_key".to_string(),
            constraint: "must not be empty".to_string(),
        };
        assert_eq!(err.to_string(), "document_key: must not be empty");
    }
}
