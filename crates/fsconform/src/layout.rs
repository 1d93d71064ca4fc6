//! Directory-entry record layouts.
//!
//! The NT directory query can answer in eight record shapes, selected by the
//! `FILE_INFORMATION_CLASS` passed with the call. Every shape starts with a
//! `NextEntryOffset`/`FileIndex` pair and ends with a UTF-16 file name whose
//! byte length is stored in the fixed part; in between, each shape carries
//! its own subset of times, sizes and attributes.
//!
//! [`RecordLayout`] is the runtime tag. Each tag also has a zero-sized marker
//! type implementing [`Layout`], and the capability traits
//! ([`HasCreationTime`], [`HasEndOfFile`], ...) are implemented only for the
//! markers whose structure really has that field. Record accessors are bound
//! on those traits, so asking a `FileNamesInformation` record for its size
//! does not compile.

use crate::record::RecordView;
use crate::validate::ObservedFields;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Offsets shared by every layout that carries times, sizes and attributes.
pub(crate) mod offsets {
    pub const NEXT_ENTRY_OFFSET: usize = 0;
    pub const FILE_INDEX: usize = 4;
    pub const CREATION_TIME: usize = 8;
    pub const LAST_ACCESS_TIME: usize = 16;
    pub const LAST_WRITE_TIME: usize = 24;
    pub const CHANGE_TIME: usize = 32;
    pub const END_OF_FILE: usize = 40;
    pub const ALLOCATION_SIZE: usize = 48;
    pub const FILE_ATTRIBUTES: usize = 56;
}

/// Every directory record is aligned to this many bytes, and so must be the
/// buffer handed to the query.
pub const RECORD_ALIGNMENT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordLayout {
    Directory,
    FullDirectory,
    BothDirectory,
    Names,
    IdBothDirectory,
    IdFullDirectory,
    IdExtdDirectory,
    IdExtdBothDirectory,
}

impl RecordLayout {
    pub const ALL: [RecordLayout; 8] = [
        RecordLayout::Directory,
        RecordLayout::FullDirectory,
        RecordLayout::BothDirectory,
        RecordLayout::Names,
        RecordLayout::IdBothDirectory,
        RecordLayout::IdFullDirectory,
        RecordLayout::IdExtdDirectory,
        RecordLayout::IdExtdBothDirectory,
    ];

    /// `FILE_INFORMATION_CLASS` value passed to the query.
    pub fn info_class(self) -> u32 {
        match self {
            Self::Directory => 1,
            Self::FullDirectory => 2,
            Self::BothDirectory => 3,
            Self::Names => 12,
            Self::IdBothDirectory => 37,
            Self::IdFullDirectory => 38,
            Self::IdExtdDirectory => 60,
            Self::IdExtdBothDirectory => 63,
        }
    }

    pub fn from_info_class(class: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.info_class() == class)
    }

    /// Offset of the `FileNameLength` field.
    pub fn name_length_offset(self) -> usize {
        match self {
            Self::Names => 8,
            _ => 60,
        }
    }

    /// Offset of the first name character, i.e. the length of the fixed part.
    pub fn name_offset(self) -> usize {
        match self {
            Self::Directory => 64,
            Self::FullDirectory => 68,
            Self::BothDirectory => 94,
            Self::Names => 12,
            Self::IdBothDirectory => 104,
            Self::IdFullDirectory => 80,
            Self::IdExtdDirectory => 88,
            Self::IdExtdBothDirectory => 114,
        }
    }

    /// `sizeof` of the C structure: fixed part plus the one-character name
    /// array, rounded up to the structure's alignment.
    pub fn header_size(self) -> usize {
        match self {
            Self::Directory => 72,
            Self::FullDirectory => 72,
            Self::BothDirectory => 96,
            Self::Names => 16,
            Self::IdBothDirectory => 112,
            Self::IdFullDirectory => 88,
            Self::IdExtdDirectory => 96,
            Self::IdExtdBothDirectory => 120,
        }
    }

    /// Whether the layout carries times, sizes and attributes.
    pub fn has_attributes(self) -> bool {
        !matches!(self, Self::Names)
    }

    /// Name of the NT information class.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Directory => "FileDirectoryInformation",
            Self::FullDirectory => "FileFullDirectoryInformation",
            Self::BothDirectory => "FileBothDirectoryInformation",
            Self::Names => "FileNamesInformation",
            Self::IdBothDirectory => "FileIdBothDirectoryInformation",
            Self::IdFullDirectory => "FileIdFullDirectoryInformation",
            Self::IdExtdDirectory => "FileIdExtdDirectoryInformation",
            Self::IdExtdBothDirectory => "FileIdExtdBothDirectoryInformation",
        }
    }

    fn config_name(self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::FullDirectory => "full-directory",
            Self::BothDirectory => "both-directory",
            Self::Names => "names",
            Self::IdBothDirectory => "id-both-directory",
            Self::IdFullDirectory => "id-full-directory",
            Self::IdExtdDirectory => "id-extd-directory",
            Self::IdExtdBothDirectory => "id-extd-both-directory",
        }
    }
}

impl fmt::Display for RecordLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class_name())
    }
}

impl FromStr for RecordLayout {
    type Err = String;

    /// Accepts the kebab-case config name or the NT class name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|l| l.config_name() == s || l.class_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown record layout: {}", s))
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A directory-entry layout known at compile time.
pub trait Layout: sealed::Sealed + Copy + Sized + 'static {
    const TAG: RecordLayout;

    /// Reads every field this layout carries, leaving the others unset.
    fn observe(view: &RecordView<'_, Self>) -> ObservedFields;
}

pub trait HasCreationTime: Layout {}
pub trait HasLastAccessTime: Layout {}
pub trait HasLastWriteTime: Layout {}
pub trait HasChangeTime: Layout {}
pub trait HasEndOfFile: Layout {}
pub trait HasAllocationSize: Layout {}
pub trait HasFileAttributes: Layout {}

macro_rules! observe_field {
    (HasCreationTime, $view:ident, $fields:ident) => {
        $fields.creation_time = Some($view.creation_time());
    };
    (HasLastAccessTime, $view:ident, $fields:ident) => {
        $fields.last_access_time = Some($view.last_access_time());
    };
    (HasLastWriteTime, $view:ident, $fields:ident) => {
        $fields.last_write_time = Some($view.last_write_time());
    };
    (HasChangeTime, $view:ident, $fields:ident) => {
        $fields.change_time = Some($view.change_time());
    };
    (HasEndOfFile, $view:ident, $fields:ident) => {
        $fields.end_of_file = Some($view.end_of_file());
    };
    (HasAllocationSize, $view:ident, $fields:ident) => {
        $fields.allocation_size = Some($view.allocation_size());
    };
    (HasFileAttributes, $view:ident, $fields:ident) => {
        $fields.file_attributes = Some($view.file_attributes());
    };
}

macro_rules! layouts {
    ($(
        $(#[$meta:meta])*
        $marker:ident => $tag:ident: [$($cap:ident),*];
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
            pub struct $marker;

            impl sealed::Sealed for $marker {}

            impl Layout for $marker {
                const TAG: RecordLayout = RecordLayout::$tag;

                #[allow(unused_mut)]
                fn observe(view: &RecordView<'_, Self>) -> ObservedFields {
                    let mut fields = ObservedFields::named(
                        view.file_name_length(),
                        view.file_name_units().collect(),
                    );
                    $( observe_field!($cap, view, fields); )*
                    fields
                }
            }

            $( impl $cap for $marker {} )*
        )*
    };
}

layouts! {
    /// `FILE_DIRECTORY_INFORMATION`
    FileDirectoryInformation => Directory: [
        HasCreationTime, HasLastAccessTime, HasLastWriteTime, HasChangeTime,
        HasEndOfFile, HasAllocationSize, HasFileAttributes
    ];
    /// `FILE_FULL_DIR_INFORMATION`: adds `EaSize`.
    FileFullDirInformation => FullDirectory: [
        HasCreationTime, HasLastAccessTime, HasLastWriteTime, HasChangeTime,
        HasEndOfFile, HasAllocationSize, HasFileAttributes
    ];
    /// `FILE_BOTH_DIR_INFORMATION`: adds `EaSize` and the 8.3 short name.
    FileBothDirInformation => BothDirectory: [
        HasCreationTime, HasLastAccessTime, HasLastWriteTime, HasChangeTime,
        HasEndOfFile, HasAllocationSize, HasFileAttributes
    ];
    /// `FILE_NAMES_INFORMATION`: the name and nothing else.
    FileNamesInformation => Names: [];
    /// `FILE_ID_BOTH_DIR_INFORMATION`: short name plus a 64-bit file id.
    FileIdBothDirInformation => IdBothDirectory: [
        HasCreationTime, HasLastAccessTime, HasLastWriteTime, HasChangeTime,
        HasEndOfFile, HasAllocationSize, HasFileAttributes
    ];
    /// `FILE_ID_FULL_DIR_INFORMATION`
    FileIdFullDirInformation => IdFullDirectory: [
        HasCreationTime, HasLastAccessTime, HasLastWriteTime, HasChangeTime,
        HasEndOfFile, HasAllocationSize, HasFileAttributes
    ];
    /// `FILE_ID_EXTD_DIR_INFORMATION`: reparse tag and a 128-bit file id.
    FileIdExtdDirInformation => IdExtdDirectory: [
        HasCreationTime, HasLastAccessTime, HasLastWriteTime, HasChangeTime,
        HasEndOfFile, HasAllocationSize, HasFileAttributes
    ];
    /// `FILE_ID_EXTD_BOTH_DIR_INFORMATION`
    FileIdExtdBothDirInformation => IdExtdBothDirectory: [
        HasCreationTime, HasLastAccessTime, HasLastWriteTime, HasChangeTime,
        HasEndOfFile, HasAllocationSize, HasFileAttributes
    ];
}
