//! Error types for the RBAC decision engine.
//!
//! # Security Note
//! None of these errors ever escape the boolean `has_*` / `can_*` gates. Those
//! gates fail closed and report the error through the `decision:error`
//! telemetry channel instead. Only the `try_*` variants and the construction
//! paths hand an `AuthzError` back to the caller.

use thiserror::Error;

/// Errors that can occur while building or querying the decision engine.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A permission id, role id, or batch argument was missing or malformed.
    ///
    /// Checks that fail validation resolve to a deny.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Role inheritance could not be resolved.
    ///
    /// Raised when traversal exceeds the configured depth limit, which
    /// usually points at a corrupted role hierarchy.
    #[error("Role resolution failed: {0}")]
    Resolution(String),

    /// The role/permission configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl AuthzError {
    /// Short classification carried as `kind` on `decision:error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Resolution(_) => "resolution",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Yaml(_) => "yaml",
        }
    }
}

/// A specialized Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Rejects ids that are empty or contain whitespace.
///
/// `what` names the argument in the error message ("permission id", "role id").
pub(crate) fn validate_id(id: &str, what: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AuthzError::Validation(format!("{} must not be empty", what)));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(AuthzError::Validation(format!(
            "{} '{}' must not contain whitespace",
            what, id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthzError::Validation("permission id must not be empty".to_string());
        assert_eq!(
            err.to_string(),
            "Validation failed: permission id must not be empty"
        );

        let err = AuthzError::Resolution("depth exceeded".to_string());
        assert_eq!(err.to_string(), "Role resolution failed: depth exceeded");

        let err = AuthzError::Config("duplicate role 'viewer'".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: duplicate role 'viewer'"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(AuthzError::Validation("x".into()).kind(), "validation");
        assert_eq!(AuthzError::Resolution("x".into()).kind(), "resolution");
        assert_eq!(AuthzError::Config("x".into()).kind(), "config");
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("content:view", "permission id").is_ok());
        assert!(validate_id("", "permission id").is_err());
        assert!(validate_id("   ", "role id").is_err());
        assert!(matches!(
            validate_id("content view", "permission id"),
            Err(AuthzError::Validation(_))
        ));
    }
}
