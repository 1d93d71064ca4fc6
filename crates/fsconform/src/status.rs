//! NT status codes as returned by the native file APIs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A raw `NTSTATUS` value.
///
/// The top two bits carry the severity: `00` success, `01` informational,
/// `10` warning, `11` error. Success and informational codes both count as
/// "succeeded" (`NT_SUCCESS`), so callers that need exactly
/// `STATUS_SUCCESS` must compare against [`NtStatus::SUCCESS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const DATATYPE_MISALIGNMENT: Self = Self(0x8000_0002);
    pub const BUFFER_OVERFLOW: Self = Self(0x8000_0005);
    pub const NO_MORE_FILES: Self = Self(0x8000_0006);
    pub const INFO_LENGTH_MISMATCH: Self = Self(0xC000_0004);
    pub const INVALID_HANDLE: Self = Self(0xC000_0008);
    pub const INVALID_PARAMETER: Self = Self(0xC000_000D);
    pub const NO_SUCH_FILE: Self = Self(0xC000_000F);
    pub const ACCESS_DENIED: Self = Self(0xC000_0022);
    pub const BUFFER_TOO_SMALL: Self = Self(0xC000_0023);
    pub const OBJECT_NAME_INVALID: Self = Self(0xC000_0033);
    pub const OBJECT_NAME_NOT_FOUND: Self = Self(0xC000_0034);
    pub const OBJECT_NAME_COLLISION: Self = Self(0xC000_0035);
    pub const OBJECT_PATH_NOT_FOUND: Self = Self(0xC000_003A);
    pub const NOT_A_DIRECTORY: Self = Self(0xC000_0103);

    pub fn from_raw(raw: i32) -> Self {
        Self(raw as u32)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// `NT_SUCCESS`: success or informational severity.
    pub fn is_success(self) -> bool {
        (self.0 as i32) >= 0
    }

    pub fn is_warning(self) -> bool {
        self.0 >> 30 == 0b10
    }

    pub fn is_error(self) -> bool {
        self.0 >> 30 == 0b11
    }

    /// Symbolic name for the codes this harness knows about.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "STATUS_SUCCESS",
            Self::DATATYPE_MISALIGNMENT => "STATUS_DATATYPE_MISALIGNMENT",
            Self::BUFFER_OVERFLOW => "STATUS_BUFFER_OVERFLOW",
            Self::NO_MORE_FILES => "STATUS_NO_MORE_FILES",
            Self::INFO_LENGTH_MISMATCH => "STATUS_INFO_LENGTH_MISMATCH",
            Self::INVALID_HANDLE => "STATUS_INVALID_HANDLE",
            Self::INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
            Self::NO_SUCH_FILE => "STATUS_NO_SUCH_FILE",
            Self::ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            Self::BUFFER_TOO_SMALL => "STATUS_BUFFER_TOO_SMALL",
            Self::OBJECT_NAME_INVALID => "STATUS_OBJECT_NAME_INVALID",
            Self::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            Self::OBJECT_NAME_COLLISION => "STATUS_OBJECT_NAME_COLLISION",
            Self::OBJECT_PATH_NOT_FOUND => "STATUS_OBJECT_PATH_NOT_FOUND",
            Self::NOT_A_DIRECTORY => "STATUS_NOT_A_DIRECTORY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "NTSTATUS 0x{:08x}", self.0),
        }
    }
}

/// How the enumeration engine classifies the answer to one directory query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Success,
    BufferTooSmall,
    NoMoreEntries,
    Other(NtStatus),
}

impl QueryStatus {
    /// Classify `status` as answered to a call whose restart flag was `restart`.
    ///
    /// `STATUS_NO_SUCH_FILE` is only "no more entries" on the restart call:
    /// that is how NTFS reports a filter that matches nothing.
    pub fn classify(status: NtStatus, restart: bool) -> Self {
        match status {
            NtStatus::SUCCESS => Self::Success,
            NtStatus::BUFFER_OVERFLOW | NtStatus::BUFFER_TOO_SMALL => Self::BufferTooSmall,
            NtStatus::NO_MORE_FILES => Self::NoMoreEntries,
            NtStatus::NO_SUCH_FILE if restart => Self::NoMoreEntries,
            other => Self::Other(other),
        }
    }
}
