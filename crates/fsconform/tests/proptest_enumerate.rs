//! Property-based tests for the directory enumeration engine.
//!
//! The synthetic directory plays the driver; the properties hold for any
//! set of entries and any starting buffer capacity.

use fsconform::{
    decode_and_validate, enumerate, DirectoryEnumerator, ExpectedFields, RecordLayout,
    ScanBuffer, SyntheticDirectory, SyntheticEntry,
};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn any_layout() -> impl Strategy<Value = RecordLayout> {
    proptest::sample::select(RecordLayout::ALL.to_vec())
}

/// Entries with names unique under case folding, as NTFS requires.
fn any_entries() -> impl Strategy<Value = Vec<SyntheticEntry>> {
    proptest::collection::vec(("[a-zA-Z0-9_.]{1,40}", 0i64..1_000_000, any::<i64>()), 0..40).prop_map(
        |items| {
            let mut unique = BTreeMap::new();
            for (name, size, time) in items {
                unique
                    .entry(name.to_uppercase())
                    .or_insert_with(|| SyntheticEntry::file(&name, size).with_times(time, time, time, time));
            }
            unique.into_values().collect()
        },
    )
}

fn directory(entries: &[SyntheticEntry]) -> SyntheticDirectory {
    let mut dir = SyntheticDirectory::new();
    for entry in entries {
        dir.insert(entry.clone());
    }
    dir
}

proptest! {
    #[test]
    fn test_listing_independent_of_initial_capacity(
        entries in any_entries(),
        layout in any_layout(),
        capacity in 1usize..2048,
    ) {
        let dir = directory(&entries);
        let baseline: Vec<String> = enumerate(dir.open(), layout, None)
            .unwrap()
            .iter()
            .map(|r| r.file_name())
            .collect();
        let resized: Vec<String> = DirectoryEnumerator::new(dir.open(), layout)
            .with_initial_capacity(capacity)
            .run()
            .unwrap()
            .records
            .iter()
            .map(|r| r.file_name())
            .collect();
        prop_assert_eq!(&baseline, &resized);
        prop_assert_eq!(baseline.len(), entries.len());
    }

    #[test]
    fn test_every_record_decodes_and_validates(
        entries in any_entries(),
        layout in any_layout(),
    ) {
        let dir = directory(&entries);
        let records = enumerate(dir.open(), layout, None).unwrap();
        prop_assert_eq!(records.len(), dir.len());
        for (record, entry) in records.iter().zip(dir.entries()) {
            let name_chars = entry.name.encode_utf16().count();
            prop_assert_eq!(record.len(), layout.name_offset() + name_chars * 2);
            let expected = ExpectedFields::from_file_info(&entry.file_info(), &entry.name);
            prop_assert!(decode_and_validate(record, layout, &expected).is_ok());
        }
    }

    #[test]
    fn test_exact_filter_finds_one(
        entries in any_entries(),
        layout in any_layout(),
        pick in any::<proptest::sample::Index>(),
    ) {
        prop_assume!(!entries.is_empty());
        let dir = directory(&entries);
        let target = &dir.entries()[pick.index(dir.len())];
        let records = enumerate(dir.open(), layout, Some(&target.name)).unwrap();
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(records[0].file_name(), target.name.clone());
    }

    #[test]
    fn test_scan_buffer_always_aligned(capacity in 0usize..4096, grow_to in 0usize..8192) {
        let mut buf = ScanBuffer::new(capacity);
        prop_assert_eq!(buf.usable().as_ptr() as usize % 8, 0);
        prop_assert!(buf.capacity() >= capacity);
        buf.grow(grow_to);
        prop_assert_eq!(buf.usable().as_ptr() as usize % 8, 0);
        prop_assert!(buf.capacity() >= capacity.max(grow_to));
    }
}
