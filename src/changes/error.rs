// ABOUTME: Error taxonomy for change-set assembly
// ABOUTME: Distinguishes the single retryable merge failure from fatal errors

use thiserror::Error;

/// Errors raised while assembling a change set.
#[derive(Error, Debug)]
pub enum CdcError {
    /// A required identifier or LSN was missing, blank or unusable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The merge engine saw an update row whose changed columns were never resolved.
    #[error("Changed columns must be resolved before merging: {0}")]
    RequireColumnsResolution(String),

    /// An UpdateOld row was not immediately followed by its Update row.
    #[error("Missing corresponding update operation: {message}")]
    MissingCorrespondingOperation {
        /// Index of the pending UpdateOld row.
        previous: usize,
        /// Index of the row that broke the pairing (None if the window ended).
        current: Option<usize>,
        message: String,
    },

    /// A raw row carried metadata that could not be mapped.
    #[error("Malformed change row: {0}")]
    InvalidRow(String),

    #[error("Change set assembly was cancelled")]
    Cancelled,

    /// Failure raised by the change source, passed through untouched.
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl CdcError {
    /// Whether the orchestrator may restart the fetch cycle after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CdcError::MissingCorrespondingOperation { .. })
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        CdcError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_operation_is_retryable() {
        let err = CdcError::MissingCorrespondingOperation {
            previous: 3,
            current: Some(5),
            message: "row 3 then row 5".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!CdcError::RequireColumnsResolution("x".into()).is_retryable());
        assert!(!CdcError::InvalidArgument("x".into()).is_retryable());
        assert!(!CdcError::Cancelled.is_retryable());
    }

    #[test]
    fn test_source_error_is_transparent() {
        let err: CdcError = anyhow::anyhow!("connection reset by peer").into();
        assert_eq!(err.to_string(), "connection reset by peer");
        assert!(!err.is_retryable());
    }
}
