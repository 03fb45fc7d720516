//! Sandbox error taxonomy.
//!
//! Only workspace acquisition is fatal to a verification pass; every
//! per-artifact failure is recovered locally and represented as a
//! diagnostic in the report.

/// Errors that abort a whole verification pass.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to acquire verification workspace: {0}")]
    Acquisition(#[source] std::io::Error),
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_display() {
        let err = SandboxError::Acquisition(std::io::Error::other("disk full"));
        assert!(err.to_string().contains("acquire"));
    }
}
