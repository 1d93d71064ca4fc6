//! Conformance suites and the case runner.
//!
//! A suite is a list of named cases; each case is a closure returning
//! [`Result`]. The first error a case returns becomes its failure message,
//! and the remaining cases still run.

use crate::enumerate::DirectoryEnumerator;
use crate::error::{ConformError, Result};
use crate::handle::{join, FileInfo, Volume};
use crate::layout::RecordLayout;
use crate::record::RawRecord;
use crate::report::{CaseResult, CaseStatus, RunReport, SuiteReport};
use crate::status::NtStatus;
use crate::validate::{decode_and_validate, ExpectedFields};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name assumed absent from every directory under test.
const NO_MATCH_PATTERN: &str = "fsconform-no-such-entry.none";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suite {
    /// Every entry, every layout, looked up by exact name and compared with
    /// the basic and standard information of the file.
    DirEntry,
    /// The unfiltered listing is the same set of names under every layout.
    DirListing,
    /// The listing does not depend on the initial buffer capacity.
    DirSmallBuffer,
    /// Wildcard and no-match filters.
    DirFilter,
}

impl Suite {
    pub const ALL: [Suite; 4] = [
        Suite::DirEntry,
        Suite::DirListing,
        Suite::DirSmallBuffer,
        Suite::DirFilter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Suite::DirEntry => "dir_entry",
            Suite::DirListing => "dir_listing",
            Suite::DirSmallBuffer => "dir_small_buffer",
            Suite::DirFilter => "dir_filter",
        }
    }

    /// Resolves a command-line selection: `all` or one suite name.
    pub fn select(name: &str) -> Result<Vec<Suite>> {
        if name == "all" {
            return Ok(Self::ALL.to_vec());
        }
        name.parse::<Suite>()
            .map(|s| vec![s])
            .map_err(|reason| ConformError::Config { reason })
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.name() == s)
            .ok_or_else(|| format!("Test not supported: {}", s))
    }
}

/// Asserts that `result` failed with `expected`, or succeeded when
/// `expected` is `STATUS_SUCCESS`. Errors that carry no status are passed
/// through unchanged.
pub fn expect_status<T>(result: Result<T>, expected: NtStatus) -> Result<()> {
    match result {
        Ok(_) if expected == NtStatus::SUCCESS => Ok(()),
        Ok(_) => Err(ConformError::UnexpectedStatus {
            actual: NtStatus::SUCCESS,
            expected,
        }),
        Err(err) => match err.status() {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(ConformError::UnexpectedStatus { actual, expected }),
            None => Err(err),
        },
    }
}

/// Checks the `Information` value a successful call left in its I/O status
/// block.
pub fn expect_information(call: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ConformError::IoInformation {
            call,
            actual,
            expected,
        })
    }
}

/// Looks `name` up in `dir` with an exact-name filter and checks that the
/// single record returned agrees with `info`.
pub fn check_dir_entry<V: Volume>(
    volume: &V,
    dir: &str,
    name: &str,
    layout: RecordLayout,
    info: &FileInfo,
) -> Result<()> {
    let records = crate::enumerate::query_dir(volume, dir, layout, name)?;
    check_single_record(&records, layout, ExpectedFields::from_file_info(info, name))
}

fn check_single_record(
    records: &[RawRecord],
    layout: RecordLayout,
    expected: ExpectedFields,
) -> Result<()> {
    if records.len() != 1 {
        return Err(ConformError::EntryCount {
            actual: records.len(),
            expected: 1,
        });
    }
    decode_and_validate(&records[0], layout, &expected)
}

/// Collects case results for one suite.
pub struct SuiteRun {
    report: SuiteReport,
    started: Instant,
}

impl SuiteRun {
    pub fn new(name: &str) -> Self {
        info!("Running suite {}", name);
        Self {
            report: SuiteReport::new(name),
            started: Instant::now(),
        }
    }

    /// Runs one case and records its outcome.
    pub fn case<F>(&mut self, name: &str, func: F)
    where
        F: FnOnce() -> Result<()>,
    {
        let start = Instant::now();
        let outcome = func();
        let elapsed = start.elapsed();
        let result = match outcome {
            Ok(()) => {
                debug!("{}, PASS", name);
                CaseResult::new(name, &self.report.name, CaseStatus::Pass, elapsed)
            }
            Err(err) => {
                warn!("{}, FAIL ({})", name, err);
                CaseResult::from_error(name, &self.report.name, elapsed, &err)
            }
        };
        self.report.add_result(result);
    }

    pub fn skip(&mut self, name: &str, reason: &str) {
        debug!("{}, SKIP ({})", name, reason);
        self.report.add_result(
            CaseResult::new(name, &self.report.name, CaseStatus::Skip, Duration::default())
                .with_message(reason),
        );
    }

    pub fn finish(self) -> SuiteReport {
        let mut report = self.report;
        report.duration = self.started.elapsed();
        info!(
            "Passed {}/{} in {}",
            report.passed(),
            report.total(),
            report.name
        );
        report
    }
}

/// Runs suites against one directory of one volume.
pub struct ConformanceRunner<V> {
    volume: V,
    dir: String,
    layouts: Vec<RecordLayout>,
    initial_capacity: Option<usize>,
}

impl<V: Volume> ConformanceRunner<V> {
    /// Targets the root directory (`""`) of `volume` with every layout.
    pub fn new(volume: V) -> Self {
        Self {
            volume,
            dir: String::new(),
            layouts: RecordLayout::ALL.to_vec(),
            initial_capacity: None,
        }
    }

    pub fn with_directory(mut self, dir: &str) -> Self {
        self.dir = dir.to_string();
        self
    }

    pub fn with_layouts(mut self, layouts: Vec<RecordLayout>) -> Self {
        self.layouts = layouts;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: Option<usize>) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn volume(&self) -> &V {
        &self.volume
    }

    fn list(
        &self,
        layout: RecordLayout,
        filter: &[u16],
        capacity: Option<usize>,
    ) -> Result<Vec<RawRecord>> {
        let handle = self.volume.open_directory(&self.dir)?;
        let mut enumerator = DirectoryEnumerator::new(handle, layout).with_filter_units(filter.to_vec());
        if let Some(capacity) = capacity.or(self.initial_capacity) {
            enumerator = enumerator.with_initial_capacity(capacity);
        }
        let enumeration = enumerator.run()?;
        debug!(
            "listed {:?} as {}: {} records, {} calls, {} growths",
            self.dir,
            layout,
            enumeration.stats.records,
            enumeration.stats.calls,
            enumeration.stats.growths
        );
        Ok(enumeration.records)
    }

    /// Names in the unfiltered `FileNamesInformation` listing, in driver
    /// order, without `.` and `..`.
    fn baseline(&self) -> Result<Vec<Vec<u16>>> {
        let records = self.list(RecordLayout::Names, &[], None)?;
        Ok(records
            .iter()
            .map(RawRecord::file_name_units)
            .filter(|name| !is_dot_entry(name))
            .collect())
    }

    pub fn run_suite(&self, suite: Suite) -> SuiteReport {
        let mut run = SuiteRun::new(suite.name());
        match self.baseline() {
            Ok(baseline) => match suite {
                Suite::DirEntry => self.dir_entry(&mut run, &baseline),
                Suite::DirListing => self.dir_listing(&mut run, &baseline),
                Suite::DirSmallBuffer => self.dir_small_buffer(&mut run, &baseline),
                Suite::DirFilter => self.dir_filter(&mut run, &baseline),
            },
            Err(err) => run.case("list directory", || Err(err)),
        }
        run.finish()
    }

    pub fn run(&self, suites: &[Suite], target: &str, backend: &str) -> RunReport {
        let mut report = RunReport::new(target, backend);
        for suite in suites {
            report.add_suite(self.run_suite(*suite));
        }
        info!(
            "Total passed {}/{}",
            report.total_passed(),
            report.total_cases()
        );
        report
    }

    fn dir_entry(&self, run: &mut SuiteRun, baseline: &[Vec<u16>]) {
        if baseline.is_empty() {
            run.skip("dir_entry", "directory is empty");
            return;
        }

        for units in baseline {
            let name = String::from_utf16_lossy(units);
            if has_wildcard(units) {
                for layout in &self.layouts {
                    run.skip(
                        &format!("{} ({})", name, layout),
                        "name contains wildcard characters",
                    );
                }
                continue;
            }

            let info = self.volume.query_file_info(&join(&self.dir, &name));
            for layout in &self.layouts {
                let layout = *layout;
                run.case(&format!("{} ({})", name, layout), || {
                    let info = match &info {
                        Ok(info) => info,
                        Err(err) => {
                            return Err(ConformError::NotFound {
                                path: format!("{}: {}", join(&self.dir, &name), err),
                            })
                        }
                    };
                    let records = self.list(layout, units, None)?;
                    let mut expected = ExpectedFields::from_file_info(info, &name);
                    expected.file_name = Some(units.clone());
                    check_single_record(&records, layout, expected)
                });
            }
        }
    }

    fn dir_listing(&self, run: &mut SuiteRun, baseline: &[Vec<u16>]) {
        let expected: BTreeSet<&[u16]> = baseline.iter().map(Vec::as_slice).collect();

        for layout in &self.layouts {
            let layout = *layout;
            run.case(&format!("listing ({})", layout), || {
                let records = self.list(layout, &[], None)?;
                let names: Vec<Vec<u16>> = records
                    .iter()
                    .map(RawRecord::file_name_units)
                    .filter(|name| !is_dot_entry(name))
                    .collect();
                compare_listing(layout, &names, &expected)
            });
        }

        run.case("open missing directory", || {
            let missing = join(&self.dir, NO_MATCH_PATTERN);
            expect_status(
                self.volume.open_directory(&missing),
                NtStatus::OBJECT_NAME_NOT_FOUND,
            )
        });
    }

    fn dir_small_buffer(&self, run: &mut SuiteRun, baseline: &[Vec<u16>]) {
        for layout in &self.layouts {
            let layout = *layout;
            let header = layout.header_size();
            for capacity in [header, header + 8, 1024] {
                run.case(&format!("capacity {} ({})", capacity, layout), || {
                    let records = self.list(layout, &[], Some(capacity))?;
                    let names: Vec<Vec<u16>> = records
                        .iter()
                        .map(RawRecord::file_name_units)
                        .filter(|name| !is_dot_entry(name))
                        .collect();
                    if names != baseline {
                        return Err(ConformError::ListingMismatch {
                            layout,
                            detail: format!(
                                "with a {}-byte initial buffer returned {} names in a different order or set than the {} expected",
                                capacity,
                                names.len(),
                                baseline.len()
                            ),
                        });
                    }
                    Ok(())
                });
            }
        }
    }

    fn dir_filter(&self, run: &mut SuiteRun, baseline: &[Vec<u16>]) {
        let expected: BTreeSet<&[u16]> = baseline.iter().map(Vec::as_slice).collect();
        let star: Vec<u16> = "*".encode_utf16().collect();
        let none: Vec<u16> = NO_MATCH_PATTERN.encode_utf16().collect();

        for layout in &self.layouts {
            let layout = *layout;
            run.case(&format!("filter * ({})", layout), || {
                let records = self.list(layout, &star, None)?;
                let names: Vec<Vec<u16>> = records
                    .iter()
                    .map(RawRecord::file_name_units)
                    .filter(|name| !is_dot_entry(name))
                    .collect();
                compare_listing(layout, &names, &expected)
            });

            run.case(&format!("filter without match ({})", layout), || {
                let records = self.list(layout, &none, None)?;
                if !records.is_empty() {
                    return Err(ConformError::EntryCount {
                        actual: records.len(),
                        expected: 0,
                    });
                }
                Ok(())
            });
        }

        if let Some(first) = baseline.iter().find(|name| !has_wildcard(name)) {
            let name = String::from_utf16_lossy(first);
            let swapped = swap_case(&name);
            if swapped != name {
                run.case(&format!("filter {} matches case-insensitively", swapped), || {
                    let filter: Vec<u16> = swapped.encode_utf16().collect();
                    let records = self.list(RecordLayout::Names, &filter, None)?;
                    if records.len() != 1 {
                        return Err(ConformError::EntryCount {
                            actual: records.len(),
                            expected: 1,
                        });
                    }
                    Ok(())
                });
            }
        }
    }
}

fn is_dot_entry(name: &[u16]) -> bool {
    const DOT: u16 = b'.' as u16;
    name == [DOT] || name == [DOT, DOT]
}

/// Characters NTFS treats as wildcards in a query filter.
fn has_wildcard(name: &[u16]) -> bool {
    name.iter()
        .any(|&c| matches!(char::from_u32(u32::from(c)), Some('*' | '?' | '<' | '>' | '"')))
}

fn swap_case(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_lowercase() {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

fn compare_listing(
    layout: RecordLayout,
    names: &[Vec<u16>],
    expected: &BTreeSet<&[u16]>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name.as_slice()) {
            return Err(ConformError::ListingMismatch {
                layout,
                detail: format!("returned {:?} twice", String::from_utf16_lossy(name)),
            });
        }
    }
    if let Some(missing) = expected.difference(&seen).next() {
        return Err(ConformError::ListingMismatch {
            layout,
            detail: format!("is missing {:?}", String::from_utf16_lossy(missing)),
        });
    }
    if let Some(extra) = seen.difference(expected).next() {
        return Err(ConformError::ListingMismatch {
            layout,
            detail: format!("has unexpected {:?}", String::from_utf16_lossy(extra)),
        });
    }
    Ok(())
}
