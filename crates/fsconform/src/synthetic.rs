//! In-memory volume that answers directory queries the way NTFS does.
//!
//! Entries are serialised in the real MS-FSCC record layouts. The query
//! emulation follows the NTFS protocol closely enough to exercise every path
//! of the enumeration engine:
//!
//! * the filter is latched by the restart call and ignored afterwards;
//! * patterns support `*` and `?` and match case-insensitively;
//! * records are packed on 8-byte boundaries and the last one carries a
//!   `NextEntryOffset` of 0;
//! * if the next entry does not fit at all, the fixed part and as much of the
//!   name as fits are written and `STATUS_BUFFER_OVERFLOW` is returned
//!   without consuming the entry; below the fixed part,
//!   `STATUS_BUFFER_TOO_SMALL` is returned instead;
//! * a filtered restart that matches nothing answers `STATUS_NO_SUCH_FILE`,
//!   an exhausted scan `STATUS_NO_MORE_FILES`;
//! * a buffer that is not 8-byte aligned is refused with
//!   `STATUS_DATATYPE_MISALIGNMENT`.

use crate::attributes;
use crate::error::{ConformError, Result};
use crate::handle::{
    BasicInformation, DirectoryHandle, FileInfo, QueryResult, StandardInformation, Volume,
};
use crate::layout::{offsets, RecordLayout, RECORD_ALIGNMENT};
use crate::status::NtStatus;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const CLUSTER_SIZE: i64 = 4096;

/// 100ns intervals between 1601-01-01 and 1970-01-01.
const UNIX_EPOCH_AS_FILETIME: i64 = 116_444_736_000_000_000;

/// Converts a host timestamp to NT time (100ns units since 1601).
pub fn system_time_to_nt(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH_AS_FILETIME + (d.as_secs() as i64) * 10_000_000 + i64::from(d.subsec_nanos() / 100),
        Err(e) => {
            let d = e.duration();
            UNIX_EPOCH_AS_FILETIME - (d.as_secs() as i64) * 10_000_000 - i64::from(d.subsec_nanos() / 100)
        }
    }
}

fn round_to_cluster(size: i64) -> i64 {
    (size + CLUSTER_SIZE - 1) / CLUSTER_SIZE * CLUSTER_SIZE
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticEntry {
    pub name: String,
    pub file_index: u32,
    pub creation_time: i64,
    pub last_access_time: i64,
    pub last_write_time: i64,
    pub change_time: i64,
    pub end_of_file: i64,
    pub allocation_size: i64,
    pub file_attributes: u32,
    pub ea_size: u32,
    pub reparse_tag: u32,
    pub file_id: u64,
    pub short_name: Option<String>,
}

impl SyntheticEntry {
    /// A plain file with the archive bit set and whole clusters allocated.
    pub fn file(name: &str, size: i64) -> Self {
        Self {
            name: name.to_string(),
            file_index: 0,
            creation_time: 0,
            last_access_time: 0,
            last_write_time: 0,
            change_time: 0,
            end_of_file: size,
            allocation_size: round_to_cluster(size),
            file_attributes: attributes::ARCHIVE,
            ea_size: 0,
            reparse_tag: 0,
            file_id: 0,
            short_name: None,
        }
    }

    pub fn directory(name: &str) -> Self {
        Self {
            end_of_file: 0,
            allocation_size: 0,
            file_attributes: attributes::DIRECTORY,
            ..Self::file(name, 0)
        }
    }

    pub fn with_times(mut self, creation: i64, access: i64, write: i64, change: i64) -> Self {
        self.creation_time = creation;
        self.last_access_time = access;
        self.last_write_time = write;
        self.change_time = change;
        self
    }

    pub fn with_allocation_size(mut self, size: i64) -> Self {
        self.allocation_size = size;
        self
    }

    pub fn with_attributes(mut self, attrs: u32) -> Self {
        self.file_attributes = attrs;
        self
    }

    pub fn with_file_index(mut self, index: u32) -> Self {
        self.file_index = index;
        self
    }

    pub fn with_file_id(mut self, id: u64) -> Self {
        self.file_id = id;
        self
    }

    pub fn with_short_name(mut self, short_name: &str) -> Self {
        self.short_name = Some(short_name.to_string());
        self
    }

    pub fn is_directory(&self) -> bool {
        self.file_attributes & attributes::DIRECTORY != 0
    }

    pub fn file_info(&self) -> FileInfo {
        FileInfo {
            basic: BasicInformation {
                creation_time: self.creation_time,
                last_access_time: self.last_access_time,
                last_write_time: self.last_write_time,
                change_time: self.change_time,
                file_attributes: self.file_attributes,
            },
            standard: StandardInformation {
                allocation_size: self.allocation_size,
                end_of_file: self.end_of_file,
                number_of_links: 1,
                delete_pending: false,
                directory: self.is_directory(),
            },
        }
    }

    fn sort_key(&self) -> String {
        self.name.to_uppercase()
    }
}

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_i64(buf: &mut [u8], off: usize, v: i64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn put_short_name(buf: &mut [u8], off: usize, short_name: Option<&str>) {
    let units: Vec<u16> = short_name
        .map(|s| s.encode_utf16().take(12).collect())
        .unwrap_or_default();
    buf[off] = (units.len() * 2) as u8;
    for (i, unit) in units.iter().enumerate() {
        let at = off + 2 + i * 2;
        buf[at..at + 2].copy_from_slice(&unit.to_le_bytes());
    }
}

/// Serialises one entry in `layout`: the fixed part followed by the name,
/// with `NextEntryOffset` 0 and no trailing padding.
pub fn encode_entry(layout: RecordLayout, entry: &SyntheticEntry) -> Vec<u8> {
    let name: Vec<u16> = entry.name.encode_utf16().collect();
    let name_offset = layout.name_offset();
    let mut buf = vec![0u8; name_offset + name.len() * 2];

    put_u32(&mut buf, offsets::FILE_INDEX, entry.file_index);
    put_u32(&mut buf, layout.name_length_offset(), (name.len() * 2) as u32);

    if layout.has_attributes() {
        put_i64(&mut buf, offsets::CREATION_TIME, entry.creation_time);
        put_i64(&mut buf, offsets::LAST_ACCESS_TIME, entry.last_access_time);
        put_i64(&mut buf, offsets::LAST_WRITE_TIME, entry.last_write_time);
        put_i64(&mut buf, offsets::CHANGE_TIME, entry.change_time);
        put_i64(&mut buf, offsets::END_OF_FILE, entry.end_of_file);
        put_i64(&mut buf, offsets::ALLOCATION_SIZE, entry.allocation_size);
        put_u32(&mut buf, offsets::FILE_ATTRIBUTES, entry.file_attributes);
    }

    let short_name = entry.short_name.as_deref();
    match layout {
        RecordLayout::Directory | RecordLayout::Names => {}
        RecordLayout::FullDirectory => put_u32(&mut buf, 64, entry.ea_size),
        RecordLayout::BothDirectory => {
            put_u32(&mut buf, 64, entry.ea_size);
            put_short_name(&mut buf, 68, short_name);
        }
        RecordLayout::IdBothDirectory => {
            put_u32(&mut buf, 64, entry.ea_size);
            put_short_name(&mut buf, 68, short_name);
            put_i64(&mut buf, 96, entry.file_id as i64);
        }
        RecordLayout::IdFullDirectory => {
            put_u32(&mut buf, 64, entry.ea_size);
            put_i64(&mut buf, 72, entry.file_id as i64);
        }
        RecordLayout::IdExtdDirectory => {
            put_u32(&mut buf, 64, entry.ea_size);
            put_u32(&mut buf, 68, entry.reparse_tag);
            put_i64(&mut buf, 72, entry.file_id as i64);
        }
        RecordLayout::IdExtdBothDirectory => {
            put_u32(&mut buf, 64, entry.ea_size);
            put_u32(&mut buf, 68, entry.reparse_tag);
            put_i64(&mut buf, 72, entry.file_id as i64);
            put_short_name(&mut buf, 88, short_name);
        }
    }

    for (i, unit) in name.iter().enumerate() {
        let at = name_offset + i * 2;
        buf[at..at + 2].copy_from_slice(&unit.to_le_bytes());
    }
    buf
}

/// Case-insensitive match of `name` against a pattern using `*` (any run of
/// characters) and `?` (exactly one character).
pub fn matches_pattern(pattern: &[u16], name: &[u16]) -> bool {
    let upper = |units: &[u16]| -> Vec<char> {
        String::from_utf16_lossy(units)
            .chars()
            .flat_map(char::to_uppercase)
            .collect()
    };
    let pattern = upper(pattern);
    let name = upper(name);

    let (mut p, mut n) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = backtrack {
            p = star_p + 1;
            n = star_n + 1;
            backtrack = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// The entries of one directory, kept in NTFS order (upcased name).
#[derive(Debug, Clone, Default)]
pub struct SyntheticDirectory {
    entries: Arc<Vec<SyntheticEntry>>,
}

impl SyntheticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entry`, replacing any entry whose name differs only in case.
    pub fn insert(&mut self, entry: SyntheticEntry) {
        let entries = Arc::make_mut(&mut self.entries);
        let key = entry.sort_key();
        entries.retain(|e| e.sort_key() != key);
        entries.push(entry);
        entries.sort_by_key(|e| e.sort_key());
    }

    pub fn remove(&mut self, name: &str) -> Option<SyntheticEntry> {
        let key = name.to_uppercase();
        let entries = Arc::make_mut(&mut self.entries);
        let idx = entries.iter().position(|e| e.sort_key() == key)?;
        Some(entries.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&SyntheticEntry> {
        let key = name.to_uppercase();
        self.entries.iter().find(|e| e.sort_key() == key)
    }

    pub fn entries(&self) -> &[SyntheticEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A listing handle over a snapshot of the current entries.
    pub fn open(&self) -> SyntheticHandle {
        SyntheticHandle {
            entries: Arc::clone(&self.entries),
            cursor: 0,
            filter: None,
            started: false,
            returned_any: false,
            calls: 0,
        }
    }
}

#[derive(Debug)]
pub struct SyntheticHandle {
    entries: Arc<Vec<SyntheticEntry>>,
    cursor: usize,
    filter: Option<Vec<u16>>,
    started: bool,
    returned_any: bool,
    calls: usize,
}

impl SyntheticHandle {
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn matches(&self, entry: &SyntheticEntry) -> bool {
        match &self.filter {
            Some(pattern) => {
                let name: Vec<u16> = entry.name.encode_utf16().collect();
                matches_pattern(pattern, &name)
            }
            None => true,
        }
    }
}

impl DirectoryHandle for SyntheticHandle {
    fn query_directory(
        &mut self,
        buf: &mut [u8],
        layout: RecordLayout,
        restart: bool,
        filter: Option<&[u16]>,
    ) -> QueryResult {
        self.calls += 1;

        if buf.as_ptr() as usize % RECORD_ALIGNMENT != 0 {
            return QueryResult::new(NtStatus::DATATYPE_MISALIGNMENT, 0);
        }

        if restart || !self.started {
            self.cursor = 0;
            self.filter = filter.filter(|f| !f.is_empty()).map(|f| f.to_vec());
            self.started = true;
            self.returned_any = false;
        }

        if buf.len() < layout.name_offset() {
            return QueryResult::new(NtStatus::BUFFER_TOO_SMALL, 0);
        }

        let mut offset = 0usize;
        let mut written = 0usize;
        let mut last_start: Option<usize> = None;

        while self.cursor < self.entries.len() {
            let entries = Arc::clone(&self.entries);
            let entry = &entries[self.cursor];
            if !self.matches(entry) {
                self.cursor += 1;
                continue;
            }

            let rec = encode_entry(layout, entry);
            if offset + rec.len() > buf.len() {
                if last_start.is_none() {
                    let n = buf.len();
                    buf[..n].copy_from_slice(&rec[..n]);
                    return QueryResult::new(NtStatus::BUFFER_OVERFLOW, n);
                }
                break;
            }

            buf[offset..offset + rec.len()].copy_from_slice(&rec);
            if let Some(prev) = last_start {
                put_u32(buf, prev, (offset - prev) as u32);
            }
            last_start = Some(offset);
            written = offset + rec.len();
            offset = (written + RECORD_ALIGNMENT - 1) & !(RECORD_ALIGNMENT - 1);
            self.cursor += 1;
        }

        if last_start.is_none() {
            let status = if !self.returned_any && self.filter.is_some() {
                NtStatus::NO_SUCH_FILE
            } else {
                NtStatus::NO_MORE_FILES
            };
            return QueryResult::new(status, 0);
        }

        self.returned_any = true;
        QueryResult::new(NtStatus::SUCCESS, written)
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('\\').to_uppercase()
}

fn split_parent(path: &str) -> (&str, &str) {
    let path = path.trim_matches('\\');
    match path.rfind('\\') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// A tree of synthetic directories addressed by `\`-separated paths.
#[derive(Debug, Clone, Default)]
pub struct SyntheticVolume {
    dirs: BTreeMap<String, SyntheticDirectory>,
}

impl SyntheticVolume {
    /// A volume holding only an empty root directory (`""`).
    pub fn new() -> Self {
        let mut dirs = BTreeMap::new();
        dirs.insert(String::new(), SyntheticDirectory::new());
        Self { dirs }
    }

    /// Adds `entry` to the directory at `dir`. Adding a directory entry also
    /// creates the (empty) directory it names.
    pub fn insert(&mut self, dir: &str, entry: SyntheticEntry) -> Result<()> {
        let key = normalize(dir);
        let child = if entry.is_directory() {
            Some(normalize(&crate::handle::join(dir.trim_matches('\\'), &entry.name)))
        } else {
            None
        };
        let parent = self
            .dirs
            .get_mut(&key)
            .ok_or_else(|| ConformError::NotFound {
                path: dir.to_string(),
            })?;
        parent.insert(entry);
        if let Some(child) = child {
            self.dirs.entry(child).or_default();
        }
        Ok(())
    }

    pub fn directory(&self, dir: &str) -> Option<&SyntheticDirectory> {
        self.dirs.get(&normalize(dir))
    }

    /// Copies a host directory tree into a new volume, converting timestamps
    /// to NT time. Symbolic links are recorded but not followed.
    pub fn mirror(root: &Path) -> Result<Self> {
        let mut volume = Self::new();
        volume.mirror_dir(root, "")?;
        debug!(
            "mirrored {} into {} synthetic directories",
            root.display(),
            volume.dirs.len()
        );
        Ok(volume)
    }

    fn mirror_dir(&mut self, host: &Path, dir: &str) -> Result<()> {
        for item in fs::read_dir(host)? {
            let item = item?;
            let meta = match item.path().symlink_metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("skipping {}: {}", item.path().display(), e);
                    continue;
                }
            };
            let name = item.file_name().to_string_lossy().into_owned();
            let entry = entry_from_metadata(&name, &meta);
            let recurse = meta.is_dir();
            self.insert(dir, entry)?;
            if recurse {
                let child = crate::handle::join(dir, &name);
                self.mirror_dir(&item.path(), &child)?;
            }
        }
        Ok(())
    }
}

fn entry_from_metadata(name: &str, meta: &fs::Metadata) -> SyntheticEntry {
    let modified = meta.modified().map(system_time_to_nt).unwrap_or(0);
    let accessed = meta.accessed().map(system_time_to_nt).unwrap_or(modified);
    let created = meta.created().map(system_time_to_nt).unwrap_or(modified);

    let mut entry = if meta.is_dir() {
        SyntheticEntry::directory(name)
    } else {
        SyntheticEntry::file(name, meta.len() as i64)
    };
    if meta.file_type().is_symlink() {
        entry.file_attributes |= attributes::REPARSE_POINT;
    }
    if meta.permissions().readonly() {
        entry.file_attributes |= attributes::READONLY;
    }
    entry.with_times(created, accessed, modified, modified)
}

impl Volume for SyntheticVolume {
    type Directory = SyntheticHandle;

    fn open_directory(&self, path: &str) -> Result<SyntheticHandle> {
        self.directory(path)
            .map(SyntheticDirectory::open)
            .ok_or_else(|| ConformError::OsCall {
                status: NtStatus::OBJECT_NAME_NOT_FOUND,
            })
    }

    fn query_file_info(&self, path: &str) -> Result<FileInfo> {
        let (parent, name) = split_parent(path);
        self.directory(parent)
            .and_then(|d| d.get(name))
            .map(SyntheticEntry::file_info)
            .ok_or_else(|| ConformError::OsCall {
                status: NtStatus::OBJECT_NAME_NOT_FOUND,
            })
    }
}
