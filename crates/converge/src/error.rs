//! Engine errors
//!
//! Analysis (planning, preflight, policy) reports problems as data. Only faults
//! in the engine's wiring surface as [`Error`]. A confirmation prompt that
//! cannot run reports [`Error::Confirmation`], which the executor treats as a
//! refusal.

use thiserror::Error;

use crate::model::{ActionKind, Backend};

/// Errors that abort an executor run before or outside of per-action handling
#[derive(Debug, Error)]
pub enum Error {
    /// The plan needs a provider that was not supplied
    #[error("no {backend} provider configured (required by {kind})")]
    MissingProvider {
        /// Backend the action is routed to
        backend: Backend,
        /// First action kind that needed it
        kind: ActionKind,
    },

    /// The confirmation strategy itself failed (not a negative answer)
    #[error("confirmation failed: {0}")]
    Confirmation(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_message() {
        let err = Error::Confirmation("not a terminal".to_string());
        assert_eq!(err.to_string(), "confirmation failed: not a terminal");
    }

    #[test]
    fn test_missing_provider_message() {
        let err = Error::MissingProvider {
            backend: Backend::Observability,
            kind: ActionKind::CreateFolder,
        };
        assert_eq!(
            err.to_string(),
            "no observability provider configured (required by create_folder)"
        );
    }
}
