//! Conformance harness for the NT directory query.
//!
//! [`enumerate`] drives `NtQueryDirectoryFile` (or any other
//! [`DirectoryHandle`]) through the buffer protocol and hands back owned
//! [`RawRecord`]s; [`record`] and [`validate`] decode those records into
//! typed views and compare them with golden values. [`runner`] builds the
//! conformance suites on top, against the native driver ([`nt`], Windows
//! only) or an in-memory [`synthetic`] volume.

pub mod attributes;
pub mod cli;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod handle;
pub mod layout;
#[cfg(windows)]
pub mod nt;
pub mod record;
pub mod report;
pub mod runner;
pub mod status;
pub mod synthetic;
pub mod validate;

pub use config::ConformConfig;
pub use enumerate::{enumerate, query_dir, DirectoryEnumerator, Enumeration, EnumerationStats, ScanBuffer};
pub use error::{ConformError, Result};
pub use handle::{BasicInformation, DirectoryHandle, FileInfo, QueryResult, StandardInformation, Volume};
pub use layout::{Layout, RecordLayout};
pub use record::{decode, RawRecord, RecordView};
pub use report::{CaseResult, CaseStatus, RunReport, SuiteReport};
pub use runner::{check_dir_entry, expect_information, expect_status, ConformanceRunner, Suite};
pub use status::{NtStatus, QueryStatus};
pub use synthetic::{SyntheticDirectory, SyntheticEntry, SyntheticHandle, SyntheticVolume};
pub use validate::{decode_and_validate, validate, ExpectedFields, Field, FieldValue, MismatchError};
