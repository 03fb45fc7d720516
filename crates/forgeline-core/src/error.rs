//! Domain-level error taxonomy for Forgeline.

/// Errors produced by specification invariant validation.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("specification declares no artifacts")]
    NoArtifacts,

    #[error("duplicate artifact path: {path}")]
    DuplicatePath { path: String },

    #[error("entry point {entry} does not reference a declared artifact")]
    UnresolvableEntryPoint { entry: String },
}

/// Errors produced while recovering a structured record from raw text.
///
/// Never fatal to a run: the planning stage substitutes the minimal
/// fallback record when recovery reports one of these.
#[derive(Debug, thiserror::Error)]
pub enum RecoverError {
    #[error("no structured record found in text")]
    NoPayload,

    #[error("record could not be decoded after repair: {reason}")]
    Undecodable { reason: String },

    #[error("decoded record violates invariants: {0}")]
    Invalid(#[from] SpecError),
}

/// Result type for Forgeline domain operations.
pub type Result<T, E = SpecError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_error_display() {
        let err = SpecError::DuplicatePath {
            path: "main.py".to_string(),
        };
        assert!(err.to_string().contains("main.py"));

        let err = SpecError::UnresolvableEntryPoint {
            entry: "app.py".to_string(),
        };
        assert!(err.to_string().contains("app.py"));
    }

    #[test]
    fn test_recover_error_wraps_spec_error() {
        let err = RecoverError::from(SpecError::NoArtifacts);
        assert!(err.to_string().contains("invariants"));
    }
}
