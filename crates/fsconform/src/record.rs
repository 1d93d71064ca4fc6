//! Raw directory records and typed, zero-copy views over them.

use crate::error::{ConformError, Result};
use crate::layout::{
    offsets, HasAllocationSize, HasChangeTime, HasCreationTime, HasEndOfFile, HasFileAttributes,
    HasLastAccessTime, HasLastWriteTime, Layout, RecordLayout,
};
use bytes::Bytes;
use std::fmt;
use std::marker::PhantomData;

pub(crate) fn read_u32(buf: &[u8], off: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn read_i64(buf: &[u8], off: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[off..off + 8]);
    i64::from_le_bytes(bytes)
}

/// One directory entry copied out of a query buffer: the fixed part followed
/// by exactly `FileNameLength` bytes of name.
///
/// The copy is owned, so it stays valid after the scan buffer is reused or
/// grown. `NextEntryOffset` is kept as the driver wrote it.
#[derive(Clone, PartialEq, Eq)]
pub struct RawRecord {
    layout: RecordLayout,
    bytes: Bytes,
}

impl RawRecord {
    /// Wraps bytes already known to hold one whole record of `layout`.
    pub(crate) fn new(layout: RecordLayout, bytes: Bytes) -> Self {
        Self { layout, bytes }
    }

    /// Checks `bytes` against the layout's length rules and wraps them.
    pub fn from_bytes(layout: RecordLayout, bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        check_record_length(layout, &bytes)?;
        Ok(Self { layout, bytes })
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn file_name_length(&self) -> u32 {
        read_u32(&self.bytes, self.layout.name_length_offset())
    }

    pub fn file_name_units(&self) -> Vec<u16> {
        name_units(&self.bytes[self.layout.name_offset()..])
    }

    /// Decodes the name for display and sorting; unpaired surrogates become
    /// U+FFFD.
    pub fn file_name(&self) -> String {
        String::from_utf16_lossy(&self.file_name_units())
    }
}

impl fmt::Debug for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRecord")
            .field("layout", &self.layout)
            .field("len", &self.bytes.len())
            .field("file_name", &self.file_name())
            .finish()
    }
}

fn name_units(name: &[u8]) -> Vec<u16> {
    name.chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn check_record_length(layout: RecordLayout, bytes: &[u8]) -> Result<()> {
    let name_offset = layout.name_offset();
    if bytes.len() < name_offset {
        return Err(ConformError::structural(
            0,
            format!(
                "{} bytes cannot hold the {}-byte fixed part of {}",
                bytes.len(),
                name_offset,
                layout
            ),
        ));
    }
    let name_len = read_u32(bytes, layout.name_length_offset()) as usize;
    if name_len % 2 != 0 {
        return Err(ConformError::structural(
            0,
            format!("odd FileNameLength {}", name_len),
        ));
    }
    if bytes.len() != name_offset + name_len {
        return Err(ConformError::structural(
            0,
            format!(
                "FileNameLength {} disagrees with record length {}",
                name_len,
                bytes.len()
            ),
        ));
    }
    Ok(())
}

/// A read-only view of a [`RawRecord`] as layout `L`.
///
/// Accessors for optional fields exist only when `L` carries the field.
#[derive(Clone, Copy)]
pub struct RecordView<'a, L> {
    bytes: &'a [u8],
    _layout: PhantomData<L>,
}

/// Reinterprets `raw` as layout `L`.
///
/// Fails if the record was produced for a different layout or its lengths do
/// not add up; after that, every accessor reads inside the record.
pub fn decode<L: Layout>(raw: &RawRecord) -> Result<RecordView<'_, L>> {
    if raw.layout != L::TAG {
        return Err(ConformError::LayoutMismatch {
            actual: raw.layout,
            expected: L::TAG,
        });
    }
    check_record_length(L::TAG, &raw.bytes)?;
    Ok(RecordView {
        bytes: &raw.bytes,
        _layout: PhantomData,
    })
}

impl<'a, L: Layout> RecordView<'a, L> {
    pub fn layout(&self) -> RecordLayout {
        L::TAG
    }

    pub fn next_entry_offset(&self) -> u32 {
        read_u32(self.bytes, offsets::NEXT_ENTRY_OFFSET)
    }

    pub fn file_index(&self) -> u32 {
        read_u32(self.bytes, offsets::FILE_INDEX)
    }

    /// Name length in bytes, as declared by the record.
    pub fn file_name_length(&self) -> u32 {
        read_u32(self.bytes, L::TAG.name_length_offset())
    }

    pub fn file_name_units(&self) -> impl Iterator<Item = u16> + 'a {
        self.bytes[L::TAG.name_offset()..]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
    }

    pub fn file_name(&self) -> String {
        char::decode_utf16(self.file_name_units())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl<L: HasCreationTime> RecordView<'_, L> {
    pub fn creation_time(&self) -> i64 {
        read_i64(self.bytes, offsets::CREATION_TIME)
    }
}

impl<L: HasLastAccessTime> RecordView<'_, L> {
    pub fn last_access_time(&self) -> i64 {
        read_i64(self.bytes, offsets::LAST_ACCESS_TIME)
    }
}

impl<L: HasLastWriteTime> RecordView<'_, L> {
    pub fn last_write_time(&self) -> i64 {
        read_i64(self.bytes, offsets::LAST_WRITE_TIME)
    }
}

impl<L: HasChangeTime> RecordView<'_, L> {
    pub fn change_time(&self) -> i64 {
        read_i64(self.bytes, offsets::CHANGE_TIME)
    }
}

impl<L: HasEndOfFile> RecordView<'_, L> {
    pub fn end_of_file(&self) -> i64 {
        read_i64(self.bytes, offsets::END_OF_FILE)
    }
}

impl<L: HasAllocationSize> RecordView<'_, L> {
    pub fn allocation_size(&self) -> i64 {
        read_i64(self.bytes, offsets::ALLOCATION_SIZE)
    }
}

impl<L: HasFileAttributes> RecordView<'_, L> {
    pub fn file_attributes(&self) -> u32 {
        read_u32(self.bytes, offsets::FILE_ATTRIBUTES)
    }
}

impl<L: Layout> fmt::Debug for RecordView<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordView")
            .field("layout", &L::TAG)
            .field("file_name", &self.file_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{FileDirectoryInformation, FileNamesInformation};
    use crate::synthetic::{encode_entry, SyntheticEntry};

    fn entry() -> SyntheticEntry {
        SyntheticEntry::file("report.txt", 4096)
            .with_times(100, 200, 300, 400)
            .with_allocation_size(8192)
            .with_file_index(7)
    }

    fn raw(layout: RecordLayout) -> RawRecord {
        let bytes = encode_entry(layout, &entry());
        RawRecord::from_bytes(layout, bytes).unwrap()
    }

    #[test]
    fn test_decode_directory_fields() {
        let raw = raw(RecordLayout::Directory);
        let view = decode::<FileDirectoryInformation>(&raw).unwrap();
        assert_eq!(view.file_index(), 7);
        assert_eq!(view.creation_time(), 100);
        assert_eq!(view.last_access_time(), 200);
        assert_eq!(view.last_write_time(), 300);
        assert_eq!(view.change_time(), 400);
        assert_eq!(view.end_of_file(), 4096);
        assert_eq!(view.allocation_size(), 8192);
        assert_eq!(view.file_attributes(), crate::attributes::ARCHIVE);
        assert_eq!(view.file_name_length(), 20);
        assert_eq!(view.file_name(), "report.txt");
    }

    #[test]
    fn test_decode_names() {
        let raw = raw(RecordLayout::Names);
        assert_eq!(raw.len(), 12 + 20);
        let view = decode::<FileNamesInformation>(&raw).unwrap();
        assert_eq!(view.file_name(), "report.txt");
        assert_eq!(view.file_index(), 7);
    }

    #[test]
    fn test_decode_wrong_layout() {
        let raw = raw(RecordLayout::FullDirectory);
        let err = decode::<FileDirectoryInformation>(&raw).unwrap_err();
        assert!(matches!(
            err,
            ConformError::LayoutMismatch {
                actual: RecordLayout::FullDirectory,
                expected: RecordLayout::Directory,
            }
        ));
    }

    #[test]
    fn test_from_bytes_rejects_short_fixed_part() {
        let err = RawRecord::from_bytes(RecordLayout::Directory, vec![0u8; 40]).unwrap_err();
        assert!(matches!(err, ConformError::StructuralDecode { .. }));
    }

    #[test]
    fn test_from_bytes_rejects_name_length_disagreement() {
        let mut bytes = encode_entry(RecordLayout::Names, &entry());
        bytes.truncate(bytes.len() - 2);
        let err = RawRecord::from_bytes(RecordLayout::Names, bytes).unwrap_err();
        assert!(err.to_string().contains("disagrees"));
    }

    #[test]
    fn test_from_bytes_rejects_odd_name_length() {
        let mut bytes = vec![0u8; 13];
        bytes[8] = 1;
        let err = RawRecord::from_bytes(RecordLayout::Names, bytes).unwrap_err();
        assert!(err.to_string().contains("odd"));
    }

    #[test]
    fn test_non_bmp_name() {
        let e = SyntheticEntry::file("a\u{1F600}", 0);
        let bytes = encode_entry(RecordLayout::Names, &e);
        let raw = RawRecord::from_bytes(RecordLayout::Names, bytes).unwrap();
        assert_eq!(raw.file_name_length(), 6);
        assert_eq!(raw.file_name(), "a\u{1F600}");
    }

    #[test]
    fn test_raw_record_debug_shows_name() {
        let debug = format!("{:?}", raw(RecordLayout::IdExtdBothDirectory));
        assert!(debug.contains("report.txt"));
        assert!(debug.contains("IdExtdBothDirectory"));
    }
}
