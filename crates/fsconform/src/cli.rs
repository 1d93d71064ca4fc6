use crate::config::ConformConfig;
use crate::handle::Volume;
use crate::layout::RecordLayout;
use crate::report::RunReport;
use crate::runner::{ConformanceRunner, Suite};
use crate::synthetic::SyntheticVolume;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "fsconform")]
#[command(about = "Directory query conformance tests for Windows filesystem drivers", long_about = None)]
#[command(allow_missing_positional = true)]
pub struct Cli {
    /// Suite to run (dir_entry, dir_listing, dir_small_buffer, dir_filter);
    /// all of them when omitted.
    pub suite: Option<String>,

    /// Directory to test.
    pub dir: PathBuf,

    #[arg(short, long, env = "FSCONFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Test an in-memory mirror of DIR instead of the native driver.
    #[arg(long)]
    pub synthetic: bool,

    /// Restrict to these record layouts (repeatable).
    #[arg(short, long = "layout")]
    pub layouts: Vec<RecordLayout>,

    #[arg(long)]
    pub initial_capacity: Option<usize>,

    #[arg(long)]
    pub report_json: Option<PathBuf>,

    #[arg(long)]
    pub report_junit: Option<PathBuf>,

    #[arg(long)]
    pub log_filter: Option<String>,
}

impl Cli {
    /// The config file (if any) with command-line flags applied on top.
    pub fn load_config(&self) -> Result<ConformConfig> {
        let mut config = match &self.config {
            Some(path) => ConformConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ConformConfig::default(),
        };

        if let Some(suite) = &self.suite {
            config.suites = Suite::select(suite)?;
        }
        if self.synthetic {
            config.synthetic = true;
        }
        if !self.layouts.is_empty() {
            config.layouts = self.layouts.clone();
        }
        if self.initial_capacity.is_some() {
            config.initial_capacity = self.initial_capacity;
        }
        if self.report_json.is_some() {
            config.report_json = self.report_json.clone();
        }
        if self.report_junit.is_some() {
            config.report_junit = self.report_junit.clone();
        }
        if let Some(filter) = &self.log_filter {
            config.log_filter = filter.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Runs the selected suites, writes the reports and prints one summary
    /// line per suite. Returns whether every case passed.
    pub fn run(&self, config: &ConformConfig) -> Result<bool> {
        let report = if config.synthetic {
            let volume = SyntheticVolume::mirror(&self.dir)
                .with_context(|| format!("mirroring {}", self.dir.display()))?;
            run_suites(volume, config, &self.dir, "synthetic")
        } else {
            native(config, &self.dir)?
        };

        write_reports(&report, config)?;
        for line in report.summary_lines() {
            println!("{}", line);
        }
        println!(
            "Total passed {}/{}",
            report.total_passed(),
            report.total_cases()
        );
        Ok(report.is_passing())
    }
}

#[cfg(windows)]
fn native(config: &ConformConfig, dir: &Path) -> Result<RunReport> {
    let volume = crate::nt::NtVolume::new(dir)
        .with_context(|| format!("opening {}", dir.display()))?;
    Ok(run_suites(volume, config, dir, "native"))
}

#[cfg(not(windows))]
fn native(_config: &ConformConfig, _dir: &Path) -> Result<RunReport> {
    anyhow::bail!("the native backend is only available on Windows; pass --synthetic")
}

fn run_suites<V: Volume>(volume: V, config: &ConformConfig, dir: &Path, backend: &str) -> RunReport {
    tracing::info!("Testing {} ({} backend)", dir.display(), backend);
    ConformanceRunner::new(volume)
        .with_layouts(config.layouts.clone())
        .with_initial_capacity(config.initial_capacity)
        .run(&config.suites, &dir.display().to_string(), backend)
}

fn write_reports(report: &RunReport, config: &ConformConfig) -> Result<()> {
    if let Some(path) = &config.report_json {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &config.report_junit {
        std::fs::write(path, report.to_junit_xml())
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn test_parse_dir_only() {
        let cli = Cli::try_parse_from(["fsconform", "C:\\test"]).unwrap();
        assert!(cli.suite.is_none());
        assert_eq!(cli.dir, PathBuf::from("C:\\test"));
    }

    #[test]
    fn test_parse_suite_and_dir() {
        let cli = Cli::try_parse_from([
            "fsconform",
            "--synthetic",
            "--layout",
            "names",
            "--layout",
            "FileIdBothDirectoryInformation",
            "dir_filter",
            "some/dir",
        ])
        .unwrap();
        assert_eq!(cli.suite.as_deref(), Some("dir_filter"));
        assert_eq!(
            cli.layouts,
            vec![RecordLayout::Names, RecordLayout::IdBothDirectory]
        );

        let config = cli.load_config().unwrap();
        assert_eq!(config.suites, vec![Suite::DirFilter]);
        assert_eq!(config.layouts.len(), 2);
        assert!(config.synthetic);
    }

    #[test]
    fn test_unknown_suite_rejected() {
        let cli = Cli::try_parse_from(["fsconform", "--synthetic", "oplock_i", "dir"]).unwrap();
        let err = cli.load_config().unwrap_err();
        assert!(err.to_string().contains("Test not supported"));
    }

    #[test]
    fn test_missing_dir_is_usage_error() {
        assert!(Cli::try_parse_from(["fsconform"]).is_err());
    }

    #[test]
    fn test_run_synthetic_writes_reports() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("target");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("abc"), b"hello").unwrap();
        std::fs::create_dir(target.join("sub")).unwrap();

        let json = temp.path().join("report.json");
        let junit = temp.path().join("report.xml");
        let cli = Cli::try_parse_from([
            OsStr::new("fsconform"),
            OsStr::new("--synthetic"),
            OsStr::new("--report-json"),
            json.as_os_str(),
            OsStr::new("--report-junit"),
            junit.as_os_str(),
            target.as_os_str(),
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert!(cli.run(&config).unwrap());

        let report = RunReport::from_json(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(report.backend, "synthetic");
        assert_eq!(report.suites.len(), 4);
        assert!(std::fs::read_to_string(&junit).unwrap().contains("<testsuites"));
    }
}
