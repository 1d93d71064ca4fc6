//! Native backend: the real driver, reached through `ntdll`.
//!
//! Paths handed to [`NtVolume`] are relative to the directory it was created
//! for; every open goes through `NtCreateFile` with an NT object path
//! (`\??\C:\...`), and handles are closed when their [`OwnedHandle`] drops.

use crate::error::{ConformError, Result};
use crate::handle::{
    join, BasicInformation, DirectoryHandle, FileInfo, QueryResult, StandardInformation, Volume,
};
use crate::layout::RecordLayout;
use crate::runner::expect_information;
use crate::status::NtStatus;
use std::mem;
use std::os::windows::io::AsRawHandle;
use std::os::windows::io::FromRawHandle;
use std::os::windows::io::OwnedHandle;
use std::path::Path;
use std::ptr;
use tracing::{debug, trace};
use windows::core::PWSTR;
use windows::Wdk::Foundation::OBJECT_ATTRIBUTES;
use windows::Wdk::Storage::FileSystem;
use windows::Wdk::Storage::FileSystem::FILE_INFORMATION_CLASS;
use windows::Win32::Foundation;
use windows::Win32::Storage::FileSystem as W32Fs;
use windows::Win32::System::IO::IO_STATUS_BLOCK;

/// `IO_STATUS_BLOCK.Information` after `FILE_OPEN` of an existing file.
const FILE_OPENED: usize = 1;

/// Counted UTF-16 string over `units`, which must outlive the result.
fn unicode_string(units: &mut [u16]) -> Result<Foundation::UNICODE_STRING> {
    let byte_len = u16::try_from(units.len() * 2).map_err(|_| ConformError::Config {
        reason: format!(
            "name of {} characters is too long for an NT string",
            units.len()
        ),
    })?;
    Ok(Foundation::UNICODE_STRING {
        Length: byte_len,
        MaximumLength: byte_len,
        Buffer: PWSTR(units.as_mut_ptr()),
    })
}

fn open(
    path: &str,
    access: W32Fs::FILE_ACCESS_RIGHTS,
    options: FileSystem::NTCREATEFILE_CREATE_OPTIONS,
) -> Result<OwnedHandle> {
    let mut units: Vec<u16> = path.encode_utf16().collect();
    let name = unicode_string(&mut units)?;
    let attrs = OBJECT_ATTRIBUTES {
        Length: mem::size_of::<OBJECT_ATTRIBUTES>() as u32,
        RootDirectory: Foundation::HANDLE::default(),
        ObjectName: &name,
        Attributes: Foundation::OBJ_CASE_INSENSITIVE as u32,
        SecurityDescriptor: ptr::null(),
        SecurityQualityOfService: ptr::null(),
    };
    let mut iosb = IO_STATUS_BLOCK::default();
    let mut raw = Foundation::HANDLE::default();

    // SAFETY: Calling NT API as documented; `attrs`, `name` and `units` live
    // across the call.
    let status = NtStatus::from_raw(
        unsafe {
            FileSystem::NtCreateFile(
                &mut raw,
                access | W32Fs::SYNCHRONIZE,
                &attrs,
                &mut iosb,
                None,
                W32Fs::FILE_FLAGS_AND_ATTRIBUTES(0),
                W32Fs::FILE_SHARE_READ | W32Fs::FILE_SHARE_WRITE | W32Fs::FILE_SHARE_DELETE,
                FileSystem::FILE_OPEN,
                options | FileSystem::FILE_SYNCHRONOUS_IO_NONALERT,
                None,
                0,
            )
        }
        .0,
    );
    trace!("NtCreateFile {}: {}", path, status);

    // Informational statuses still return an open handle.
    let handle = if status.is_success() {
        // SAFETY: NtCreateFile succeeded, so `raw` is an open handle owned by
        // nothing else.
        Some(unsafe { OwnedHandle::from_raw_handle(raw.0) })
    } else {
        None
    };

    match handle {
        Some(handle) if status == NtStatus::SUCCESS => {
            expect_information("NtCreateFile", iosb.Information, FILE_OPENED)?;
            Ok(handle)
        }
        _ => Err(ConformError::OsCall { status }),
    }
}

fn query_information<T: Default>(handle: &OwnedHandle, class: FILE_INFORMATION_CLASS) -> Result<T> {
    let mut info = T::default();
    let mut iosb = IO_STATUS_BLOCK::default();
    // SAFETY: `info` is a writable information struct of the size passed.
    let status = NtStatus::from_raw(
        unsafe {
            FileSystem::NtQueryInformationFile(
                Foundation::HANDLE(handle.as_raw_handle()),
                &mut iosb,
                (&mut info as *mut T).cast(),
                mem::size_of::<T>() as u32,
                class,
            )
        }
        .0,
    );
    if status != NtStatus::SUCCESS {
        return Err(ConformError::OsCall { status });
    }
    expect_information("NtQueryInformationFile", iosb.Information, mem::size_of::<T>())?;
    Ok(info)
}

/// An open directory on the native driver.
#[derive(Debug)]
pub struct NtDirectory {
    handle: OwnedHandle,
}

impl DirectoryHandle for NtDirectory {
    fn query_directory(
        &mut self,
        buf: &mut [u8],
        layout: RecordLayout,
        restart: bool,
        filter: Option<&[u16]>,
    ) -> QueryResult {
        let mut filter_units: Vec<u16> = filter.map(<[u16]>::to_vec).unwrap_or_default();
        let filter_name = match unicode_string(&mut filter_units) {
            Ok(name) => name,
            Err(_) => return QueryResult::new(NtStatus::OBJECT_NAME_INVALID, 0),
        };
        let filter_ptr = filter.map(|_| &filter_name as *const Foundation::UNICODE_STRING);
        let length = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let mut iosb = IO_STATUS_BLOCK::default();

        // SAFETY: the handle is synchronous, so the call completes before
        // returning and nothing outlives `buf`, `iosb` or `filter_units`.
        let status = NtStatus::from_raw(
            unsafe {
                FileSystem::NtQueryDirectoryFile(
                    Foundation::HANDLE(self.handle.as_raw_handle()),
                    None,
                    None,
                    None,
                    &mut iosb,
                    buf.as_mut_ptr().cast(),
                    length,
                    FILE_INFORMATION_CLASS(layout.info_class() as i32),
                    false,
                    filter_ptr,
                    restart,
                )
            }
            .0,
        );
        QueryResult::new(status, iosb.Information)
    }
}

/// The directory tree below one host directory, served by the native
/// driver.
#[derive(Debug, Clone)]
pub struct NtVolume {
    root: String,
}

impl NtVolume {
    /// `dir` is a Win32 path (`C:\test`); it is resolved to an NT object
    /// path.
    pub fn new(dir: &Path) -> Result<Self> {
        let full = dir.canonicalize()?;
        let full = full.to_string_lossy();
        let root = match full.strip_prefix(r"\\?\") {
            Some(rest) => format!(r"\??\{}", rest),
            None => format!(r"\??\{}", full),
        };
        debug!("native volume rooted at {}", root);
        Ok(Self { root })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    fn full_path(&self, path: &str) -> String {
        let path = path.trim_matches('\\');
        if path.is_empty() {
            self.root.clone()
        } else {
            join(&self.root, path)
        }
    }
}

impl Volume for NtVolume {
    type Directory = NtDirectory;

    fn open_directory(&self, path: &str) -> Result<NtDirectory> {
        let handle = open(
            &self.full_path(path),
            W32Fs::FILE_LIST_DIRECTORY,
            FileSystem::FILE_DIRECTORY_FILE | FileSystem::FILE_OPEN_FOR_BACKUP_INTENT,
        )?;
        Ok(NtDirectory { handle })
    }

    fn query_file_info(&self, path: &str) -> Result<FileInfo> {
        let handle = open(
            &self.full_path(path),
            W32Fs::FILE_READ_ATTRIBUTES,
            FileSystem::FILE_OPEN_REPARSE_POINT | FileSystem::FILE_OPEN_FOR_BACKUP_INTENT,
        )?;
        let basic: FileSystem::FILE_BASIC_INFORMATION =
            query_information(&handle, FileSystem::FileBasicInformation)?;
        let standard: FileSystem::FILE_STANDARD_INFORMATION =
            query_information(&handle, FileSystem::FileStandardInformation)?;

        Ok(FileInfo {
            basic: BasicInformation {
                creation_time: basic.CreationTime,
                last_access_time: basic.LastAccessTime,
                last_write_time: basic.LastWriteTime,
                change_time: basic.ChangeTime,
                file_attributes: basic.FileAttributes,
            },
            standard: StandardInformation {
                allocation_size: standard.AllocationSize,
                end_of_file: standard.EndOfFile,
                number_of_links: standard.NumberOfLinks,
                delete_pending: standard.DeletePending.0 != 0,
                directory: standard.Directory.0 != 0,
            },
        })
    }
}
