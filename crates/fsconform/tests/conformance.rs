//! End-to-end checks of the enumeration engine and validator against the
//! in-memory volume.

use fsconform::{
    attributes, check_dir_entry, decode_and_validate, enumerate, query_dir, ConformError,
    ConformanceRunner, DirectoryEnumerator, ExpectedFields, Field, FieldValue, MismatchError,
    NtStatus, RecordLayout, Suite, SyntheticDirectory, SyntheticEntry, SyntheticVolume, Volume,
};

fn abc_volume() -> SyntheticVolume {
    let mut volume = SyntheticVolume::new();
    volume
        .insert("", SyntheticEntry::file("abc", 5).with_times(100, 0, 0, 0))
        .unwrap();
    volume
}

#[test]
fn test_abc_scenario() {
    let volume = abc_volume();
    let records = query_dir(&volume, "", RecordLayout::Directory, "").unwrap();
    assert_eq!(records.len(), 1);

    let expected = ExpectedFields::new()
        .with_creation_time(100)
        .with_end_of_file(5)
        .with_file_name("abc");
    decode_and_validate(&records[0], RecordLayout::Directory, &expected).unwrap();

    let wrong = expected.clone().with_creation_time(101);
    let err = decode_and_validate(&records[0], RecordLayout::Directory, &wrong).unwrap_err();
    match err {
        ConformError::Mismatch(m) => assert_eq!(
            m,
            MismatchError {
                field: Field::CreationTime,
                actual: FieldValue::Integer(100),
                expected: FieldValue::Integer(101),
            }
        ),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_capabilities_respected_for_every_layout() {
    let volume = abc_volume();
    // every optional field is wrong; only layouts carrying it may complain
    let expected = ExpectedFields::new()
        .with_creation_time(1)
        .with_file_name("abc");

    for layout in RecordLayout::ALL {
        let records = query_dir(&volume, "", layout, "abc").unwrap();
        assert_eq!(records.len(), 1, "{}", layout);
        let result = decode_and_validate(&records[0], layout, &expected);
        if layout.has_attributes() {
            assert!(
                matches!(&result, Err(ConformError::Mismatch(m)) if m.field == Field::CreationTime),
                "{}: {:?}",
                layout,
                result
            );
        } else {
            result.unwrap();
        }
    }
}

#[test]
fn test_names_layout_ignores_allocation_size() {
    let volume = abc_volume();
    let expected = ExpectedFields::new()
        .with_allocation_size(12345)
        .with_file_attributes(attributes::HIDDEN);
    let records = query_dir(&volume, "", RecordLayout::Names, "").unwrap();
    decode_and_validate(&records[0], RecordLayout::Names, &expected).unwrap();
}

#[test]
fn test_empty_after_filter() {
    let volume = abc_volume();
    for layout in RecordLayout::ALL {
        let records = query_dir(&volume, "", layout, "*.exe").unwrap();
        assert!(records.is_empty());
    }
}

#[test]
fn test_overflow_converges_with_one_growth() {
    let volume = abc_volume();
    let handle = volume.open_directory("").unwrap();
    let enumeration = DirectoryEnumerator::new(handle, RecordLayout::Directory)
        .with_initial_capacity(8)
        .run()
        .unwrap();
    assert_eq!(enumeration.records.len(), 1);
    assert_eq!(enumeration.stats.growths, 1);
    // too small, grown retry, no more files
    assert_eq!(enumeration.stats.calls, 3);
}

#[test]
fn test_overflow_exhausted_on_oversized_name() {
    // below the fixed part no name length is observed, so the one growth
    // leaves room for 256 characters only
    let mut dir = SyntheticDirectory::new();
    dir.insert(SyntheticEntry::file(&"x".repeat(300), 1));
    let err = DirectoryEnumerator::new(dir.open(), RecordLayout::Directory)
        .with_initial_capacity(1)
        .run()
        .unwrap_err();
    match err {
        ConformError::OverflowExhausted { layout, capacity } => {
            assert_eq!(layout, RecordLayout::Directory);
            assert!(capacity >= 64 + 512);
            assert!(capacity < 64 + 600);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_observed_name_length_sizes_growth() {
    let mut dir = SyntheticDirectory::new();
    dir.insert(SyntheticEntry::file(&"x".repeat(1200), 1));
    let enumeration = DirectoryEnumerator::new(dir.open(), RecordLayout::Names)
        .with_initial_capacity(16)
        .run()
        .unwrap();
    assert_eq!(enumeration.records.len(), 1);
    assert_eq!(enumeration.stats.growths, 1);
    assert_eq!(enumeration.records[0].len(), 12 + 2400);
}

#[test]
fn test_records_outlive_buffer_and_handle() {
    let mut dir = SyntheticDirectory::new();
    for i in 0..50 {
        dir.insert(SyntheticEntry::file(&format!("file{:03}", i), i));
    }
    let records = enumerate(dir.open(), RecordLayout::IdExtdBothDirectory, None).unwrap();
    drop(dir);
    assert_eq!(records.len(), 50);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.file_name(), format!("file{:03}", i));
        let expected = ExpectedFields::new().with_end_of_file(i as i64);
        decode_and_validate(record, RecordLayout::IdExtdBothDirectory, &expected).unwrap();
    }
}

#[test]
fn test_check_dir_entry_in_subdirectory() {
    let mut volume = SyntheticVolume::new();
    volume.insert("", SyntheticEntry::directory("nested")).unwrap();
    volume
        .insert(
            "nested",
            SyntheticEntry::file("data.bin", 70000)
                .with_times(10, 20, 30, 40)
                .with_attributes(attributes::ARCHIVE | attributes::READONLY),
        )
        .unwrap();

    let info = volume.query_file_info("nested\\data.bin").unwrap();
    for layout in RecordLayout::ALL {
        check_dir_entry(&volume, "nested", "data.bin", layout, &info).unwrap();
    }

    let mut stale = info;
    stale.basic.last_write_time = 31;
    let err = check_dir_entry(&volume, "nested", "data.bin", RecordLayout::FullDirectory, &stale)
        .unwrap_err();
    assert_eq!(err.to_string(), "LastWriteTime was 30, expected 31.");
}

#[test]
fn test_missing_directory_status() {
    let volume = abc_volume();
    let err = query_dir(&volume, "nope", RecordLayout::Names, "").unwrap_err();
    assert_eq!(err.status(), Some(NtStatus::OBJECT_NAME_NOT_FOUND));
}

#[test]
fn test_runner_over_mirrored_tree() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("readme.md"), b"# hi").unwrap();
    std::fs::write(temp.path().join("empty"), b"").unwrap();
    std::fs::create_dir(temp.path().join("child")).unwrap();

    let volume = SyntheticVolume::mirror(temp.path()).unwrap();
    let report = ConformanceRunner::new(volume).run(&Suite::ALL, "mirror", "synthetic");
    assert!(report.is_passing(), "{:?}", report.summary_lines());
    assert_eq!(report.suites.len(), 4);
    assert_eq!(report.suites[0].total(), 3 * 8);
}
