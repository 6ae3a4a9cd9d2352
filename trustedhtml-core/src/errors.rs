//! errors.rs - Custom error types for the trustedhtml-core library.
//!
//! Validation outcomes are not errors: they travel as [`crate::validators::Rejection`]
//! values. This enum only covers failures that surface to the caller, such as a
//! policy that cannot be compiled or input that never stabilizes.
//!
//! License: MIT OR APACHE 2.0

use std::fmt;
use thiserror::Error;

/// The pipeline stage whose iteration budget was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Character reference decoding and whitespace normalization of raw markup.
    Preparing,
    /// The outer filter / collapse / wrap loop.
    Filtering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Preparing => write!(f, "preparing"),
            Stage::Filtering => write!(f, "filtering"),
        }
    }
}

/// This enum represents all possible error types in the `trustedhtml-core` library.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrustedError {
    #[error("Sanitization did not converge: {stage} stage still changing after {passes} passes")]
    NonConvergent { stage: Stage, passes: usize },

    #[error("Failed to compile pattern for validator '{0}': {1}")]
    PatternCompilation(String, regex::Error),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("A fatal error occurred: {0}")]
    Fatal(String),
}

impl TrustedError {
    /// True for the budget-exhaustion failure callers must treat as "reject the input".
    pub fn is_non_convergent(&self) -> bool {
        matches!(self, TrustedError::NonConvergent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_convergent_names_the_stage() {
        let err = TrustedError::NonConvergent {
            stage: Stage::Filtering,
            passes: 3,
        };
        assert!(err.is_non_convergent());
        assert_eq!(
            err.to_string(),
            "Sanitization did not converge: filtering stage still changing after 3 passes"
        );
        assert!(!TrustedError::InvalidPolicy("x".to_string()).is_non_convergent());
    }

    #[test]
    fn test_library_errors_pass_through_anyhow() {
        let err: anyhow::Error = TrustedError::Fatal("two problems".to_string()).into();
        assert!(matches!(err.downcast_ref::<TrustedError>(), Some(TrustedError::Fatal(_))));
    }
}
