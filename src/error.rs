//! Error types for the YAML exporter

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading collectors or serving metrics
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error (including a sink failing mid-write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("Failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // =========================================================================
    // Startup Errors
    // =========================================================================
    /// Configuration directory does not exist
    #[error("Configuration directory does not exist: [{}]", .0.display())]
    ConfigDirectoryMissing(PathBuf),

    /// Configuration directory holds no `.yml`/`.yaml` files
    #[error("No configuration files found in [{}]", .0.display())]
    NoConfigFiles(PathBuf),

    /// Configuration file is well-formed YAML but semantically invalid
    #[error("Invalid configuration in {source_name}: {reason}")]
    InvalidConfig { source_name: String, reason: String },

    // =========================================================================
    // Scrape Errors
    // =========================================================================
    /// A collector failed while producing its families
    #[error("Collector {collector} failed: {reason}")]
    Collector { collector: String, reason: String },

    /// Label names and label values differ in length
    #[error("Sample {sample} has {names} label names but {values} label values")]
    LabelArity {
        sample: String,
        names: usize,
        values: usize,
    },

    /// A label name appears twice in one sample
    #[error("Sample {sample} repeats label {label}")]
    DuplicateLabel { sample: String, label: String },

    /// HTTP server error
    #[error("Server error: {0}")]
    Server(String),
}
