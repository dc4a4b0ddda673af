use thiserror::Error;

pub const MAX_PROJECT_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("invalid characters")]
    InvalidCharacters,
}

/// Project identifiers are opaque but restricted to URL-safe characters so
/// they can travel in a query string without escaping.
pub fn validate_project_id(id: &str) -> Result<(), ValidationError> {
    let len = id.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_PROJECT_ID_LEN {
        return Err(ValidationError::TooLong {
            max: MAX_PROJECT_ID_LEN,
            got: len,
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

/// Chat bodies must contain something other than whitespace and stay under
/// `max_len` characters.
pub fn validate_message_body(body: &str, max_len: usize) -> Result<(), ValidationError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::TooShort { min: 1, got: 0 });
    }
    let len = body.chars().count();
    if len > max_len {
        return Err(ValidationError::TooLong { max: max_len, got: len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_accepts_object_ids_and_slugs() {
        assert!(validate_project_id("R1").is_ok());
        assert!(validate_project_id("65a1f0c2e4b0a1b2c3d4e5f6").is_ok());
        assert!(validate_project_id("team_alpha-2").is_ok());
    }

    #[test]
    fn project_id_rejects_empty_and_oversized() {
        assert_eq!(
            validate_project_id(""),
            Err(ValidationError::TooShort { min: 1, got: 0 })
        );
        let long = "a".repeat(MAX_PROJECT_ID_LEN + 1);
        assert!(matches!(
            validate_project_id(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn project_id_rejects_path_characters() {
        assert_eq!(
            validate_project_id("../etc"),
            Err(ValidationError::InvalidCharacters)
        );
        assert_eq!(
            validate_project_id("a b"),
            Err(ValidationError::InvalidCharacters)
        );
    }

    #[test]
    fn message_body_limits() {
        assert!(validate_message_body("hello", 10).is_ok());
        assert!(validate_message_body("   ", 10).is_err());
        assert!(matches!(
            validate_message_body("hello world", 5),
            Err(ValidationError::TooLong { max: 5, got: 11 })
        ));
    }

    #[test]
    fn message_body_counts_chars_not_bytes() {
        assert!(validate_message_body("héllo", 5).is_ok());
    }
}
