//! Configuration module
//!
//! Startup-time discovery of collector configuration files and the
//! YAML-defined collector they describe.

mod collector;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

pub use collector::{CollectorConfig, MetricConfig, SampleConfig, YamlCollector};

/// File name suffixes recognized as collector configuration
pub const CONFIG_EXTENSIONS: [&str; 2] = [".yml", ".yaml"];

/// True if `file_name` ends with a recognized suffix
pub fn is_config_file(file_name: &str) -> bool {
    CONFIG_EXTENSIONS
        .iter()
        .any(|extension| file_name.ends_with(extension))
}

/// List the configuration files in `dir`, sorted by path.
///
/// Fails if `dir` is not an existing directory or holds no matching file.
/// Subdirectories are not descended into.
pub fn scan_config_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::ConfigDirectoryMissing(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if is_config_file(&name.to_string_lossy()) {
            files.push(entry.path());
        } else {
            debug!(file = %entry.path().display(), "Skipping non-configuration file");
        }
    }

    if files.is_empty() {
        return Err(Error::NoConfigFiles(dir.to_path_buf()));
    }

    files.sort();
    Ok(files)
}

/// Scan `dir` and load one [`YamlCollector`] per configuration file.
///
/// Any file that fails to load aborts the whole load.
pub fn load_collectors(dir: &Path) -> Result<Vec<YamlCollector>> {
    let files = scan_config_dir(dir)?;
    info!(dir = %dir.display(), files = files.len(), "Found configuration files");

    files
        .iter()
        .map(|path| YamlCollector::from_path(path))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
