use crate::layout::RecordLayout;
use crate::status::NtStatus;
use crate::validate::MismatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConformError {
    #[error("{status}")]
    OsCall { status: NtStatus },

    #[error("{layout} query still overflowed after growing the buffer to {capacity} bytes")]
    OverflowExhausted {
        layout: RecordLayout,
        capacity: usize,
    },

    #[error("Malformed directory record at offset {offset}: {reason}")]
    StructuralDecode { offset: usize, reason: String },

    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    #[error("Record holds {actual} data, decoded as {expected}")]
    LayoutMismatch {
        actual: RecordLayout,
        expected: RecordLayout,
    },

    #[error("{actual} entries returned, expected {expected}")]
    EntryCount { actual: usize, expected: usize },

    #[error("{layout} listing {detail}")]
    ListingMismatch { layout: RecordLayout, detail: String },

    #[error("Status was {actual}, expected {expected}")]
    UnexpectedStatus { actual: NtStatus, expected: NtStatus },

    #[error("{call} IoStatus.Information was {actual}, expected {expected}")]
    IoInformation {
        call: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

pub type Result<T> = std::result::Result<T, ConformError>;

impl ConformError {
    pub(crate) fn structural(offset: usize, reason: impl Into<String>) -> Self {
        ConformError::StructuralDecode {
            offset,
            reason: reason.into(),
        }
    }

    /// The NT status carried by this error, if it came from an OS call.
    pub fn status(&self) -> Option<NtStatus> {
        match self {
            ConformError::OsCall { status } => Some(*status),
            _ => None,
        }
    }

    /// True for errors that describe a driver answer disagreeing with the
    /// expected one, as opposed to the harness failing to run.
    pub fn is_test_failure(&self) -> bool {
        matches!(
            self,
            ConformError::Mismatch(_)
                | ConformError::EntryCount { .. }
                | ConformError::ListingMismatch { .. }
                | ConformError::UnexpectedStatus { .. }
                | ConformError::IoInformation { .. }
        )
    }
}
