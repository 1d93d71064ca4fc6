use crate::error::{ConformError, Result};
use crate::layout::RecordLayout;
use crate::runner::Suite;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformConfig {
    pub suites: Vec<Suite>,
    /// Initial scan buffer capacity; the layout's header size when unset.
    pub initial_capacity: Option<usize>,
    pub layouts: Vec<RecordLayout>,
    pub report_json: Option<PathBuf>,
    pub report_junit: Option<PathBuf>,
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub log_filter: String,
    /// Run against an in-memory mirror of the target directory instead of
    /// the native driver.
    pub synthetic: bool,
}

impl Default for ConformConfig {
    fn default() -> Self {
        Self {
            suites: Suite::ALL.to_vec(),
            initial_capacity: None,
            layouts: RecordLayout::ALL.to_vec(),
            report_json: None,
            report_junit: None,
            log_filter: String::from("info"),
            synthetic: !cfg!(windows),
        }
    }
}

fn config_error(reason: impl ToString) -> ConformError {
    ConformError::Config {
        reason: reason.to_string(),
    }
}

impl ConformConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ConformConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(config_error)?,
            "json" => serde_json::from_str(&contents).map_err(config_error)?,
            _ => {
                return Err(config_error(format!(
                    "Unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.suites.is_empty() {
            return Err(config_error("no suites selected"));
        }
        if self.layouts.is_empty() {
            return Err(config_error("no record layouts selected"));
        }
        if self.initial_capacity == Some(0) {
            return Err(config_error("initial_capacity must be positive"));
        }
        if !cfg!(windows) && !self.synthetic {
            return Err(config_error(
                "the native backend is only available on Windows",
            ));
        }
        Ok(())
    }
}
