//! Field-by-field comparison of directory records against golden values.
//!
//! A layout only reports the fields it carries (see [`Layout::observe`]), so
//! a golden value for a field the layout lacks is never compared. Fields are
//! checked in a fixed order and the first disagreement is returned, which
//! keeps failures reproducible from run to run.

use crate::attributes;
use crate::error::Result;
use crate::handle::FileInfo;
use crate::layout::{
    FileBothDirInformation, FileDirectoryInformation, FileFullDirInformation,
    FileIdBothDirInformation, FileIdExtdBothDirInformation, FileIdExtdDirInformation,
    FileIdFullDirInformation, FileNamesInformation, Layout, RecordLayout,
};
use crate::record::{decode, RawRecord, RecordView};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    CreationTime,
    LastAccessTime,
    LastWriteTime,
    ChangeTime,
    EndOfFile,
    AllocationSize,
    FileAttributes,
    FileNameLength,
    FileName,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Integer(i64),
    Attributes(u32),
    Name(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Attributes(v) => write!(f, "{:#x} ({})", v, attributes::describe(*v)),
            FieldValue::Name(v) => write!(f, "{:?}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{field} was {actual}, expected {expected}.")]
pub struct MismatchError {
    pub field: Field,
    pub actual: FieldValue,
    pub expected: FieldValue,
}

/// Golden values for one directory entry. Unset fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedFields {
    pub creation_time: Option<i64>,
    pub last_access_time: Option<i64>,
    pub last_write_time: Option<i64>,
    pub change_time: Option<i64>,
    pub end_of_file: Option<i64>,
    pub allocation_size: Option<i64>,
    pub file_attributes: Option<u32>,
    pub file_name: Option<Vec<u16>>,
}

impl ExpectedFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything the basic and standard information report, plus the name.
    pub fn from_file_info(info: &FileInfo, name: &str) -> Self {
        Self {
            creation_time: Some(info.basic.creation_time),
            last_access_time: Some(info.basic.last_access_time),
            last_write_time: Some(info.basic.last_write_time),
            change_time: Some(info.basic.change_time),
            end_of_file: Some(info.standard.end_of_file),
            allocation_size: Some(info.standard.allocation_size),
            file_attributes: Some(info.basic.file_attributes),
            file_name: Some(name.encode_utf16().collect()),
        }
    }

    pub fn with_creation_time(mut self, t: i64) -> Self {
        self.creation_time = Some(t);
        self
    }

    pub fn with_last_access_time(mut self, t: i64) -> Self {
        self.last_access_time = Some(t);
        self
    }

    pub fn with_last_write_time(mut self, t: i64) -> Self {
        self.last_write_time = Some(t);
        self
    }

    pub fn with_change_time(mut self, t: i64) -> Self {
        self.change_time = Some(t);
        self
    }

    pub fn with_end_of_file(mut self, size: i64) -> Self {
        self.end_of_file = Some(size);
        self
    }

    pub fn with_allocation_size(mut self, size: i64) -> Self {
        self.allocation_size = Some(size);
        self
    }

    pub fn with_file_attributes(mut self, attrs: u32) -> Self {
        self.file_attributes = Some(attrs);
        self
    }

    pub fn with_file_name(mut self, name: &str) -> Self {
        self.file_name = Some(name.encode_utf16().collect());
        self
    }
}

/// What one record actually says, limited to the fields its layout has.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedFields {
    pub creation_time: Option<i64>,
    pub last_access_time: Option<i64>,
    pub last_write_time: Option<i64>,
    pub change_time: Option<i64>,
    pub end_of_file: Option<i64>,
    pub allocation_size: Option<i64>,
    pub file_attributes: Option<u32>,
    pub file_name_length: u32,
    pub file_name: Vec<u16>,
}

fn check<T: PartialEq + Copy>(
    field: Field,
    actual: Option<T>,
    expected: Option<T>,
    wrap: fn(T) -> FieldValue,
) -> std::result::Result<(), MismatchError> {
    match (actual, expected) {
        (Some(actual), Some(expected)) if actual != expected => Err(MismatchError {
            field,
            actual: wrap(actual),
            expected: wrap(expected),
        }),
        _ => Ok(()),
    }
}

impl ObservedFields {
    pub(crate) fn named(file_name_length: u32, file_name: Vec<u16>) -> Self {
        Self {
            file_name_length,
            file_name,
            ..Self::default()
        }
    }

    pub fn file_name_lossy(&self) -> String {
        String::from_utf16_lossy(&self.file_name)
    }

    /// Compares against `expected` in the order creation, access, write,
    /// change, end of file, allocation, attributes, name.
    pub fn compare(&self, expected: &ExpectedFields) -> std::result::Result<(), MismatchError> {
        check(
            Field::CreationTime,
            self.creation_time,
            expected.creation_time,
            FieldValue::Integer,
        )?;
        check(
            Field::LastAccessTime,
            self.last_access_time,
            expected.last_access_time,
            FieldValue::Integer,
        )?;
        check(
            Field::LastWriteTime,
            self.last_write_time,
            expected.last_write_time,
            FieldValue::Integer,
        )?;
        check(
            Field::ChangeTime,
            self.change_time,
            expected.change_time,
            FieldValue::Integer,
        )?;
        check(
            Field::EndOfFile,
            self.end_of_file,
            expected.end_of_file,
            FieldValue::Integer,
        )?;
        check(
            Field::AllocationSize,
            self.allocation_size,
            expected.allocation_size,
            FieldValue::Integer,
        )?;
        check(
            Field::FileAttributes,
            self.file_attributes,
            expected.file_attributes,
            FieldValue::Attributes,
        )?;

        if let Some(name) = &expected.file_name {
            let expected_len = name.len() as u64 * 2;
            if u64::from(self.file_name_length) != expected_len {
                return Err(MismatchError {
                    field: Field::FileNameLength,
                    actual: FieldValue::Integer(i64::from(self.file_name_length)),
                    expected: FieldValue::Integer(expected_len as i64),
                });
            }
            if self.file_name != *name {
                return Err(MismatchError {
                    field: Field::FileName,
                    actual: FieldValue::Name(self.file_name_lossy()),
                    expected: FieldValue::Name(String::from_utf16_lossy(name)),
                });
            }
        }
        Ok(())
    }
}

pub fn validate<L: Layout>(
    view: &RecordView<'_, L>,
    expected: &ExpectedFields,
) -> std::result::Result<(), MismatchError> {
    L::observe(view).compare(expected)
}

fn decode_and_validate_as<L: Layout>(raw: &RawRecord, expected: &ExpectedFields) -> Result<()> {
    let view = decode::<L>(raw)?;
    validate(&view, expected)?;
    Ok(())
}

fn observe_as<L: Layout>(raw: &RawRecord) -> Result<ObservedFields> {
    let view = decode::<L>(raw)?;
    Ok(L::observe(&view))
}

/// Decodes `raw` as `layout` and checks it against `expected`.
pub fn decode_and_validate(
    raw: &RawRecord,
    layout: RecordLayout,
    expected: &ExpectedFields,
) -> Result<()> {
    match layout {
        RecordLayout::Directory => decode_and_validate_as::<FileDirectoryInformation>(raw, expected),
        RecordLayout::FullDirectory => decode_and_validate_as::<FileFullDirInformation>(raw, expected),
        RecordLayout::BothDirectory => decode_and_validate_as::<FileBothDirInformation>(raw, expected),
        RecordLayout::Names => decode_and_validate_as::<FileNamesInformation>(raw, expected),
        RecordLayout::IdBothDirectory => {
            decode_and_validate_as::<FileIdBothDirInformation>(raw, expected)
        }
        RecordLayout::IdFullDirectory => {
            decode_and_validate_as::<FileIdFullDirInformation>(raw, expected)
        }
        RecordLayout::IdExtdDirectory => {
            decode_and_validate_as::<FileIdExtdDirInformation>(raw, expected)
        }
        RecordLayout::IdExtdBothDirectory => {
            decode_and_validate_as::<FileIdExtdBothDirInformation>(raw, expected)
        }
    }
}

/// Reads every field `raw` carries under its own layout tag.
pub fn observe(raw: &RawRecord) -> Result<ObservedFields> {
    match raw.layout() {
        RecordLayout::Directory => observe_as::<FileDirectoryInformation>(raw),
        RecordLayout::FullDirectory => observe_as::<FileFullDirInformation>(raw),
        RecordLayout::BothDirectory => observe_as::<FileBothDirInformation>(raw),
        RecordLayout::Names => observe_as::<FileNamesInformation>(raw),
        RecordLayout::IdBothDirectory => observe_as::<FileIdBothDirInformation>(raw),
        RecordLayout::IdFullDirectory => observe_as::<FileIdFullDirInformation>(raw),
        RecordLayout::IdExtdDirectory => observe_as::<FileIdExtdDirInformation>(raw),
        RecordLayout::IdExtdBothDirectory => observe_as::<FileIdExtdBothDirInformation>(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes;
    use crate::error::ConformError;
    use crate::synthetic::{encode_entry, SyntheticEntry};

    fn record(layout: RecordLayout, entry: &SyntheticEntry) -> RawRecord {
        RawRecord::from_bytes(layout, encode_entry(layout, entry)).unwrap()
    }

    fn sample() -> SyntheticEntry {
        SyntheticEntry::file("abc", 5)
            .with_times(100, 110, 120, 130)
            .with_allocation_size(4096)
    }

    fn full_expected() -> ExpectedFields {
        ExpectedFields::new()
            .with_creation_time(100)
            .with_last_access_time(110)
            .with_last_write_time(120)
            .with_change_time(130)
            .with_end_of_file(5)
            .with_allocation_size(4096)
            .with_file_attributes(attributes::ARCHIVE)
            .with_file_name("abc")
    }

    #[test]
    fn test_all_layouts_accept_matching_values() {
        for layout in RecordLayout::ALL {
            let raw = record(layout, &sample());
            decode_and_validate(&raw, layout, &full_expected())
                .unwrap_or_else(|e| panic!("{}: {}", layout, e));
        }
    }

    #[test]
    fn test_creation_time_mismatch() {
        let raw = record(RecordLayout::Directory, &sample());
        let expected = ExpectedFields::new()
            .with_creation_time(101)
            .with_end_of_file(5)
            .with_file_name("abc");
        let err = decode_and_validate(&raw, RecordLayout::Directory, &expected).unwrap_err();
        match err {
            ConformError::Mismatch(m) => {
                assert_eq!(m.field, Field::CreationTime);
                assert_eq!(m.actual, FieldValue::Integer(100));
                assert_eq!(m.expected, FieldValue::Integer(101));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_names_layout_ignores_fields_it_lacks() {
        let raw = record(RecordLayout::Names, &sample());
        let expected = ExpectedFields::new()
            .with_creation_time(1)
            .with_last_access_time(2)
            .with_last_write_time(3)
            .with_change_time(4)
            .with_end_of_file(5000)
            .with_allocation_size(1)
            .with_file_attributes(attributes::DIRECTORY)
            .with_file_name("abc");
        decode_and_validate(&raw, RecordLayout::Names, &expected).unwrap();
    }

    #[test]
    fn test_names_layout_still_checks_name() {
        let raw = record(RecordLayout::Names, &sample());
        let expected = ExpectedFields::new().with_file_name("abd");
        let err = decode_and_validate(&raw, RecordLayout::Names, &expected).unwrap_err();
        assert!(matches!(
            err,
            ConformError::Mismatch(MismatchError {
                field: Field::FileName,
                ..
            })
        ));
    }

    #[test]
    fn test_name_length_checked_before_content() {
        let raw = record(RecordLayout::FullDirectory, &sample());
        let expected = ExpectedFields::new().with_file_name("abcd");
        let err = decode_and_validate(&raw, RecordLayout::FullDirectory, &expected).unwrap_err();
        match err {
            ConformError::Mismatch(m) => {
                assert_eq!(m.field, Field::FileNameLength);
                assert_eq!(m.actual, FieldValue::Integer(6));
                assert_eq!(m.expected, FieldValue::Integer(8));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_name_comparison_is_exact() {
        let raw = record(RecordLayout::IdFullDirectory, &sample());
        let expected = ExpectedFields::new().with_file_name("ABC");
        let err = decode_and_validate(&raw, RecordLayout::IdFullDirectory, &expected).unwrap_err();
        assert_eq!(err.to_string(), "FileName was \"abc\", expected \"ABC\".");
    }

    #[test]
    fn test_fixed_order_reports_earliest_field() {
        let raw = record(RecordLayout::IdBothDirectory, &sample());
        let expected = ExpectedFields::new()
            .with_file_attributes(attributes::HIDDEN)
            .with_end_of_file(6)
            .with_last_write_time(0);
        let err = decode_and_validate(&raw, RecordLayout::IdBothDirectory, &expected).unwrap_err();
        assert!(matches!(
            err,
            ConformError::Mismatch(MismatchError {
                field: Field::LastWriteTime,
                ..
            })
        ));
    }

    #[test]
    fn test_attributes_display_hex() {
        let raw = record(RecordLayout::IdExtdDirectory, &sample());
        let expected = ExpectedFields::new().with_file_attributes(attributes::NORMAL);
        let err = decode_and_validate(&raw, RecordLayout::IdExtdDirectory, &expected).unwrap_err();
        assert_eq!(err.to_string(), "FileAttributes was 0x20 (ARCHIVE), expected 0x80 (NORMAL).");
    }

    #[test]
    fn test_empty_expectation_always_passes() {
        for layout in RecordLayout::ALL {
            let raw = record(layout, &sample());
            decode_and_validate(&raw, layout, &ExpectedFields::new()).unwrap();
        }
    }

    #[test]
    fn test_dispatch_rejects_wrong_tag() {
        let raw = record(RecordLayout::Directory, &sample());
        let err = decode_and_validate(&raw, RecordLayout::BothDirectory, &full_expected()).unwrap_err();
        assert!(matches!(err, ConformError::LayoutMismatch { .. }));
    }

    #[test]
    fn test_observe_names_has_no_optional_fields() {
        let observed = observe(&record(RecordLayout::Names, &sample())).unwrap();
        assert_eq!(observed.creation_time, None);
        assert_eq!(observed.end_of_file, None);
        assert_eq!(observed.file_attributes, None);
        assert_eq!(observed.file_name_lossy(), "abc");
        assert_eq!(observed.file_name_length, 6);
    }

    #[test]
    fn test_observe_full_layout() {
        let observed = observe(&record(RecordLayout::IdExtdBothDirectory, &sample())).unwrap();
        assert_eq!(observed.creation_time, Some(100));
        assert_eq!(observed.last_access_time, Some(110));
        assert_eq!(observed.allocation_size, Some(4096));
        assert_eq!(observed.file_attributes, Some(attributes::ARCHIVE));
    }

    #[test]
    fn test_typed_validate() {
        let raw = record(RecordLayout::BothDirectory, &sample());
        let view = decode::<FileBothDirInformation>(&raw).unwrap();
        assert!(validate(&view, &full_expected()).is_ok());
        let err = validate(&view, &full_expected().with_allocation_size(0)).unwrap_err();
        assert_eq!(err.field, Field::AllocationSize);
    }

    #[test]
    fn test_from_file_info() {
        let info = sample().file_info();
        let expected = ExpectedFields::from_file_info(&info, "abc");
        assert_eq!(expected, full_expected());
    }
}
