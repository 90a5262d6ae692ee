//! Error types for revtape.
//!
//! Only recoverable conditions are reported through [`AdError`]. Contract
//! violations such as non-LIFO nested scopes panic at the call site, and
//! numeric domain problems propagate as NaN through values and adjoints.

use thiserror::Error;

/// Errors that can occur when configuring or driving the AD engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A handle refers to a node that was reclaimed by a reset or a nested-scope recovery.
    #[error("stale handle: node {index} is no longer live on this tape")]
    StaleHandle { index: usize },

    /// Two sizes that must agree do not.
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A functional was called without any arguments to differentiate.
    #[error("{function}: input must not be empty")]
    EmptyInput { function: &'static str },

    /// An argument failed a domain check.
    #[error("{function}: {name} is {value}, but must be {requirement}")]
    Domain {
        function: &'static str,
        name: &'static str,
        value: f64,
        requirement: &'static str,
    },

    /// Nested-scope bookkeeping was requested in an invalid state.
    #[error("nested scope error: {message}")]
    NestedScope { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_message() {
        let err = AdError::Domain {
            function: "normal_log",
            name: "sigma",
            value: -1.0,
            requirement: "positive",
        };
        assert_eq!(
            err.to_string(),
            "normal_log: sigma is -1, but must be positive"
        );
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = AdError::SizeMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "size mismatch: expected 3, got 2");
    }
}
