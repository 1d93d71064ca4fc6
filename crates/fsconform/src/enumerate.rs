//! Directory enumeration over the NT query protocol.
//!
//! One enumeration keeps a single [`ScanBuffer`] and issues queries until the
//! driver reports no more entries. Each answer is walked record by record
//! through the `NextEntryOffset` chain and every record is copied out into
//! its own [`RawRecord`].
//!
//! A "buffer too small" answer triggers one growth of the buffer, sized from
//! the name length the driver wrote into the partial first record, and the
//! identical query is reissued. Overflowing again after that is fatal.

use crate::error::{ConformError, Result};
use crate::handle::{DirectoryHandle, Volume};
use crate::layout::{RecordLayout, RECORD_ALIGNMENT};
use crate::record::{read_u32, RawRecord};
use crate::status::QueryStatus;
use bytes::Bytes;
use tracing::{debug, trace};

/// Characters of headroom added on top of the observed name when growing.
pub const GROWTH_NAME_CHARS: usize = 256;

/// Bytes needed to advance `base_address` to the next multiple of
/// `alignment` (0 if already aligned).
pub fn aligned_offset(base_address: usize, alignment: usize) -> usize {
    let rem = base_address % alignment;
    if rem == 0 {
        0
    } else {
        alignment - rem
    }
}

/// Byte buffer handed to the directory query.
///
/// The backing allocation carries `RECORD_ALIGNMENT - 1` bytes of slack so
/// that an aligned window of the requested capacity always exists.
#[derive(Debug)]
pub struct ScanBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl ScanBuffer {
    pub const SLACK: usize = RECORD_ALIGNMENT - 1;

    pub fn new(capacity: usize) -> Self {
        let data = vec![0u8; capacity + Self::SLACK];
        let offset = aligned_offset(data.as_ptr() as usize, RECORD_ALIGNMENT);
        Self { data, offset }
    }

    /// Reallocates so at least `capacity` aligned bytes are usable. Never
    /// shrinks.
    pub fn grow(&mut self, capacity: usize) {
        let wanted = capacity + Self::SLACK;
        if wanted > self.data.len() {
            self.data.resize(wanted, 0);
        }
        self.offset = aligned_offset(self.data.as_ptr() as usize, RECORD_ALIGNMENT);
    }

    /// Start of the aligned window within the allocation.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the aligned window.
    pub fn capacity(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn allocation_len(&self) -> usize {
        self.data.len()
    }

    pub fn usable(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    pub fn usable_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.offset..]
    }
}

/// New capacity after an overflow: the fixed part, 256 characters of
/// headroom and twice the observed name length.
///
/// The observed length is already in bytes, so doubling it over-allocates;
/// the extra room is kept. A name more than 256 characters longer than the
/// one observed would still not fit.
pub fn growth_capacity(layout: RecordLayout, observed_name_length: u32) -> usize {
    layout.name_offset() + GROWTH_NAME_CHARS * 2 + observed_name_length as usize * 2
}

/// Name length the driver wrote into the partial first record, or 0 if the
/// written bytes do not reach that field.
fn observed_name_length(written: &[u8], layout: RecordLayout) -> u32 {
    let off = layout.name_length_offset();
    if written.len() >= off + 4 {
        read_u32(written, off)
    } else {
        0
    }
}

/// `base + len`, or a structural error at `cursor` if the sum overflows.
fn checked_end(cursor: usize, base: usize, len: usize, what: &str) -> Result<usize> {
    base.checked_add(len).ok_or_else(|| {
        ConformError::structural(cursor, format!("{} {} overflows the address space", what, len))
    })
}

/// Splits the valid part of one query answer into records, appending them to
/// `out`. Returns how many records were found.
pub fn walk_records(valid: &[u8], layout: RecordLayout, out: &mut Vec<RawRecord>) -> Result<usize> {
    if valid.is_empty() {
        return Err(ConformError::structural(
            0,
            "query succeeded without returning any entries",
        ));
    }

    let name_offset = layout.name_offset();
    let mut cursor = 0usize;
    let mut count = 0usize;

    loop {
        if checked_end(cursor, cursor, name_offset, "fixed part")? > valid.len() {
            return Err(ConformError::structural(
                cursor,
                format!(
                    "fixed part of {} bytes runs past the {} valid bytes",
                    name_offset,
                    valid.len()
                ),
            ));
        }

        let name_len = read_u32(valid, cursor + layout.name_length_offset()) as usize;
        if name_len % 2 != 0 {
            return Err(ConformError::structural(
                cursor,
                format!("odd FileNameLength {}", name_len),
            ));
        }

        let record_len = checked_end(cursor, name_offset, name_len, "FileNameLength")?;
        let record_end = checked_end(cursor, cursor, record_len, "FileNameLength")?;
        if record_end > valid.len() {
            return Err(ConformError::structural(
                cursor,
                format!(
                    "FileNameLength {} runs past the {} valid bytes",
                    name_len,
                    valid.len()
                ),
            ));
        }

        out.push(RawRecord::new(
            layout,
            Bytes::copy_from_slice(&valid[cursor..record_end]),
        ));
        count += 1;

        let next = read_u32(valid, cursor) as usize;
        if next == 0 {
            break;
        }
        if next < record_len {
            return Err(ConformError::structural(
                cursor,
                format!(
                    "NextEntryOffset {} overlaps the {}-byte record",
                    next, record_len
                ),
            ));
        }
        if next % RECORD_ALIGNMENT != 0 {
            return Err(ConformError::structural(
                cursor,
                format!("NextEntryOffset {} is not 8-byte aligned", next),
            ));
        }
        let next_start = checked_end(cursor, cursor, next, "NextEntryOffset")?;
        if next_start >= valid.len() {
            return Err(ConformError::structural(
                cursor,
                format!(
                    "NextEntryOffset {} points past the {} valid bytes",
                    next,
                    valid.len()
                ),
            ));
        }
        cursor = next_start;
    }

    Ok(count)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationStats {
    /// Directory queries issued, retries included.
    pub calls: usize,
    pub growths: usize,
    pub records: usize,
    /// Aligned capacity of the scan buffer when the enumeration ended.
    pub final_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct Enumeration {
    pub records: Vec<RawRecord>,
    pub stats: EnumerationStats,
}

/// Lists one directory handle in one layout.
pub struct DirectoryEnumerator<H> {
    handle: H,
    layout: RecordLayout,
    filter: Vec<u16>,
    initial_capacity: Option<usize>,
}

impl<H: DirectoryHandle> DirectoryEnumerator<H> {
    pub fn new(handle: H, layout: RecordLayout) -> Self {
        Self {
            handle,
            layout,
            filter: Vec::new(),
            initial_capacity: None,
        }
    }

    /// Name pattern sent with the first query. Empty means no filter.
    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = filter.encode_utf16().collect();
        self
    }

    pub fn with_filter_units(mut self, filter: Vec<u16>) -> Self {
        self.filter = filter;
        self
    }

    /// Overrides the initial aligned capacity, which defaults to the
    /// layout's header size.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Runs the scan from the start to "no more entries".
    pub fn run(self) -> Result<Enumeration> {
        let Self {
            mut handle,
            layout,
            filter,
            initial_capacity,
        } = self;

        let filter = if filter.is_empty() {
            None
        } else {
            Some(filter.as_slice())
        };
        let mut buffer = ScanBuffer::new(initial_capacity.unwrap_or_else(|| layout.header_size()));
        let mut stats = EnumerationStats::default();
        let mut records = Vec::new();
        let mut restart = true;

        loop {
            stats.calls += 1;
            let mut result = handle.query_directory(buffer.usable_mut(), layout, restart, filter);
            trace!(
                "query_directory: layout={} restart={} capacity={} status={} bytes={}",
                layout,
                restart,
                buffer.capacity(),
                result.status,
                result.bytes_written
            );
            let mut status = QueryStatus::classify(result.status, restart);

            if status == QueryStatus::BufferTooSmall {
                let written = result.bytes_written.min(buffer.capacity());
                let observed = observed_name_length(&buffer.usable()[..written], layout);
                let capacity = growth_capacity(layout, observed);
                debug!(
                    "query_directory overflow: layout={} observed_name_length={} growing {} -> {}",
                    layout,
                    observed,
                    buffer.capacity(),
                    capacity
                );
                buffer.grow(capacity);
                stats.growths += 1;

                stats.calls += 1;
                result = handle.query_directory(buffer.usable_mut(), layout, restart, filter);
                trace!(
                    "query_directory retry: layout={} capacity={} status={} bytes={}",
                    layout,
                    buffer.capacity(),
                    result.status,
                    result.bytes_written
                );
                status = QueryStatus::classify(result.status, restart);
            }

            match status {
                QueryStatus::Success => {}
                QueryStatus::NoMoreEntries => break,
                QueryStatus::BufferTooSmall => {
                    return Err(ConformError::OverflowExhausted {
                        layout,
                        capacity: buffer.capacity(),
                    });
                }
                QueryStatus::Other(status) => return Err(ConformError::OsCall { status }),
            }

            if result.bytes_written > buffer.capacity() {
                return Err(ConformError::structural(
                    0,
                    format!(
                        "driver reported {} bytes written into a {}-byte buffer",
                        result.bytes_written,
                        buffer.capacity()
                    ),
                ));
            }

            stats.records += walk_records(
                &buffer.usable()[..result.bytes_written],
                layout,
                &mut records,
            )?;
            restart = false;
        }

        stats.final_capacity = buffer.capacity();
        debug!(
            "enumeration done: layout={} records={} calls={} growths={}",
            layout, stats.records, stats.calls, stats.growths
        );
        Ok(Enumeration { records, stats })
    }
}

/// Every record of `handle` in `layout`, optionally restricted by a name
/// pattern.
pub fn enumerate<H: DirectoryHandle>(
    handle: H,
    layout: RecordLayout,
    filter: Option<&str>,
) -> Result<Vec<RawRecord>> {
    let mut enumerator = DirectoryEnumerator::new(handle, layout);
    if let Some(filter) = filter {
        enumerator = enumerator.with_filter(filter);
    }
    Ok(enumerator.run()?.records)
}

/// Opens `dir` on `volume` for listing and enumerates it with a fresh handle.
pub fn query_dir<V: Volume>(
    volume: &V,
    dir: &str,
    layout: RecordLayout,
    filter: &str,
) -> Result<Vec<RawRecord>> {
    let handle = volume.open_directory(dir)?;
    enumerate(handle, layout, Some(filter))
}
