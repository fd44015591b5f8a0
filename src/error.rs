//! Error types.
//!
//! Two layers:
//!
//! - [`FitError`] is the typed taxonomy used by the library (ingestion,
//!   insufficient data, non-convergence, ill-conditioning, precondition
//!   failures). Group- and comparison-level variants are recoverable and are
//!   recorded next to successful results.
//! - [`AppError`] is the binary-facing error that carries a process exit code.

use thiserror::Error;

/// Library-level failure taxonomy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Malformed input or unmapped labels. Fatal for the run.
    #[error("ingestion error at line {line}: {message}")]
    Ingest { line: usize, message: String },

    /// Partition too small for the requested model.
    #[error("insufficient data: n={n} (need at least {required})")]
    InsufficientData { n: usize, required: usize },

    /// Data cannot identify the model (e.g. zero variance in age).
    #[error("degenerate data: {0}")]
    Degenerate(String),

    /// Every optimizer start failed.
    #[error("no start converged ({starts} attempted)")]
    NonConvergence { starts: usize },

    /// Covariance is not positive definite at the optimum.
    #[error("ill-conditioned covariance: {0}")]
    IllConditioned(String),

    /// Inputs to a comparison are missing, unconverged, or not nested.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Invalid numeric settings (bounds, counts, thresholds).
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl FitError {
    /// Whether this error may abort a whole analysis run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FitError::Ingest { .. } | FitError::InvalidSettings(_))
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match &err {
            e if e.is_fatal() => 2,
            FitError::InsufficientData { .. } | FitError::NonConvergence { .. } => 3,
            _ => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_errors_map_to_input_exit_code() {
        let err = FitError::Ingest {
            line: 4,
            message: "unmapped variant 'X'".to_string(),
        };
        assert!(err.is_fatal());
        let app: AppError = err.into();
        assert_eq!(app.exit_code(), 2);
        assert!(app.to_string().contains("line 4"));
    }

    #[test]
    fn group_level_errors_are_recoverable() {
        assert!(!FitError::NonConvergence { starts: 10 }.is_fatal());
        assert!(!FitError::InsufficientData { n: 3, required: 5 }.is_fatal());
        assert!(FitError::InvalidSettings("n_starts must be > 0".to_string()).is_fatal());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let code = |e: FitError| AppError::from(e).exit_code();
        assert_eq!(code(FitError::InvalidSettings("alpha".to_string())), 2);
        assert_eq!(code(FitError::NonConvergence { starts: 5 }), 3);
        assert_eq!(code(FitError::IllConditioned("singular".to_string())), 4);
        assert_eq!(code(FitError::Precondition("not nested".to_string())), 4);
    }
}
