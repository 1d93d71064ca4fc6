//! The file-handle layer the harness drives.
//!
//! A [`Volume`] opens directories and answers the basic/standard information
//! queries; a [`DirectoryHandle`] answers the directory query itself. The
//! handle is closed when dropped.

use crate::error::Result;
use crate::layout::RecordLayout;
use crate::status::NtStatus;
use serde::{Deserialize, Serialize};

/// Outcome of one directory query: the status and how many bytes of the
/// buffer the driver filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryResult {
    pub status: NtStatus,
    pub bytes_written: usize,
}

impl QueryResult {
    pub fn new(status: NtStatus, bytes_written: usize) -> Self {
        Self {
            status,
            bytes_written,
        }
    }
}

pub trait DirectoryHandle {
    /// Fills `buf` with entries in `layout`, continuing from where the
    /// previous call stopped unless `restart` is set. `filter` is a UTF-16
    /// name pattern, only meaningful together with `restart`.
    fn query_directory(
        &mut self,
        buf: &mut [u8],
        layout: RecordLayout,
        restart: bool,
        filter: Option<&[u16]>,
    ) -> QueryResult;
}

impl<H: DirectoryHandle + ?Sized> DirectoryHandle for &mut H {
    fn query_directory(
        &mut self,
        buf: &mut [u8],
        layout: RecordLayout,
        restart: bool,
        filter: Option<&[u16]>,
    ) -> QueryResult {
        (**self).query_directory(buf, layout, restart, filter)
    }
}

impl<H: DirectoryHandle + ?Sized> DirectoryHandle for Box<H> {
    fn query_directory(
        &mut self,
        buf: &mut [u8],
        layout: RecordLayout,
        restart: bool,
        filter: Option<&[u16]>,
    ) -> QueryResult {
        (**self).query_directory(buf, layout, restart, filter)
    }
}

/// `FILE_BASIC_INFORMATION`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInformation {
    pub creation_time: i64,
    pub last_access_time: i64,
    pub last_write_time: i64,
    pub change_time: i64,
    pub file_attributes: u32,
}

/// `FILE_STANDARD_INFORMATION`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardInformation {
    pub allocation_size: i64,
    pub end_of_file: i64,
    pub number_of_links: u32,
    pub delete_pending: bool,
    pub directory: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub basic: BasicInformation,
    pub standard: StandardInformation,
}

/// Paths use `\` as the separator and are relative to whatever root the
/// volume was created with.
pub trait Volume {
    type Directory: DirectoryHandle;

    fn open_directory(&self, path: &str) -> Result<Self::Directory>;

    fn query_file_info(&self, path: &str) -> Result<FileInfo>;
}

/// Joins a directory path and an entry name with `\`.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('\\') {
        format!("{}{}", dir, name)
    } else {
        format!("{}\\{}", dir, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("dir", "a"), "dir\\a");
        assert_eq!(join("\\??\\C:\\", "a"), "\\??\\C:\\a");
    }

    #[test]
    fn test_file_info_default() {
        let info = FileInfo::default();
        assert_eq!(info.basic.file_attributes, 0);
        assert!(!info.standard.directory);
    }
}
