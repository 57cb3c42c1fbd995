//! YAML-defined collector
//!
//! Each configuration file describes a fixed set of metric families whose
//! sample values are either constants or read from a file (a sysfs/procfs
//! node, a value dropped by a cron job, ...) on every scrape.
//!
//! ```yaml
//! prefix: node
//! lowercase_output_name: true
//! metrics:
//!   - name: thermal_zone_celsius
//!     help: Temperature of a thermal zone
//!     type: gauge
//!     samples:
//!       - labels: { zone: "0" }
//!         file: /sys/class/thermal/thermal_zone0/temp
//!         scale: 0.001
//!   - name: build_info
//!     type: gauge
//!     samples:
//!       - labels: { version: "1.4.2" }
//!         value: 1
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{MetricFamily, MetricType, Sample};
use crate::registry::Collector;

// =============================================================================
// File Format
// =============================================================================

/// Top-level document of a configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    /// Lowercase every metric name
    pub lowercase_output_name: bool,
    /// Prepended to every metric name, joined with `_`
    pub prefix: Option<String>,
    pub metrics: Vec<MetricConfig>,
}

/// One metric family
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricConfig {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(default, rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub samples: Vec<SampleConfig>,
}

/// One sample of a family
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SampleConfig {
    /// Appended to the family name, e.g. `_total` or `_bucket`
    #[serde(default)]
    pub suffix: Option<String>,
    /// Label pairs, in the order written
    #[serde(default)]
    pub labels: serde_yaml::Mapping,
    /// Constant value
    #[serde(default)]
    pub value: Option<f64>,
    /// File holding the value as text, read on every scrape
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Multiplier applied to file values
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

// =============================================================================
// Collector
// =============================================================================

#[derive(Debug, Clone)]
enum ValueSource {
    Constant(f64),
    File { path: PathBuf, scale: f64 },
}

#[derive(Debug, Clone)]
struct SampleTemplate {
    name: String,
    label_names: Vec<String>,
    label_values: Vec<String>,
    source: ValueSource,
}

#[derive(Debug, Clone)]
struct FamilyTemplate {
    name: String,
    help: String,
    metric_type: MetricType,
    samples: Vec<SampleTemplate>,
}

/// Collector built from one YAML configuration file
#[derive(Debug, Clone)]
pub struct YamlCollector {
    source_name: String,
    families: Vec<FamilyTemplate>,
}

impl YamlCollector {
    /// Load a collector from a configuration file
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(path.display().to_string(), file)
    }

    /// Load a collector from any reader. `source_name` identifies it in errors and logs.
    pub fn from_reader(source_name: impl Into<String>, mut reader: impl Read) -> Result<Self> {
        let mut yaml = String::new();
        reader.read_to_string(&mut yaml)?;
        Self::parse(source_name, &yaml)
    }

    /// Parse a collector from YAML text. An empty document yields a collector
    /// with no families.
    pub fn parse(source_name: impl Into<String>, yaml: &str) -> Result<Self> {
        let config = if yaml.trim().is_empty() {
            CollectorConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        Self::from_config(source_name, config)
    }

    /// Build a collector from an already-parsed configuration
    pub fn from_config(source_name: impl Into<String>, config: CollectorConfig) -> Result<Self> {
        let source_name = source_name.into();
        let invalid = |reason: String| Error::InvalidConfig {
            source_name: source_name.clone(),
            reason,
        };

        let mut families = Vec::with_capacity(config.metrics.len());
        for metric in config.metrics {
            let mut name = match &config.prefix {
                Some(prefix) if !prefix.is_empty() => format!("{}_{}", prefix, metric.name),
                _ => metric.name.clone(),
            };
            if config.lowercase_output_name {
                name = name.to_lowercase();
            }
            if !is_valid_metric_name(&name) {
                return Err(invalid(format!("invalid metric name {:?}", name)));
            }

            let mut samples = Vec::with_capacity(metric.samples.len());
            for sample in metric.samples {
                let mut sample_name =
                    format!("{}{}", name, sample.suffix.as_deref().unwrap_or(""));
                if config.lowercase_output_name {
                    sample_name = sample_name.to_lowercase();
                }
                if !is_valid_metric_name(&sample_name) {
                    return Err(invalid(format!("invalid sample name {:?}", sample_name)));
                }

                let (label_names, label_values) =
                    split_labels(&sample.labels).map_err(|reason| {
                        invalid(format!("sample {}: {}", sample_name, reason))
                    })?;

                let source = match (sample.value, sample.file) {
                    (Some(value), None) => ValueSource::Constant(value),
                    (None, Some(path)) => ValueSource::File {
                        path,
                        scale: sample.scale,
                    },
                    _ => {
                        return Err(invalid(format!(
                            "sample {} needs exactly one of `value` or `file`",
                            sample_name
                        )))
                    }
                };

                samples.push(SampleTemplate {
                    name: sample_name,
                    label_names,
                    label_values,
                    source,
                });
            }

            families.push(FamilyTemplate {
                name,
                help: metric.help,
                metric_type: metric.metric_type,
                samples,
            });
        }

        debug!(source = %source_name, families = families.len(), "Loaded collector configuration");
        Ok(Self {
            source_name,
            families,
        })
    }

    /// Where this collector was loaded from
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Number of families produced per scrape
    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    fn read_value(&self, path: &Path, scale: f64) -> Result<f64> {
        let failed = |reason: String| {
            warn!(
                collector = %self.source_name,
                file = %path.display(),
                reason = reason.as_str(),
                "Value source failed"
            );
            Error::Collector {
                collector: self.source_name.clone(),
                reason,
            }
        };

        let text = std::fs::read_to_string(path)
            .map_err(|e| failed(format!("failed to read {}: {}", path.display(), e)))?;
        let value: f64 = text.trim().parse().map_err(|e| {
            failed(format!(
                "failed to parse {:?} from {}: {}",
                text.trim(),
                path.display(),
                e
            ))
        })?;
        Ok(value * scale)
    }
}

impl Collector for YamlCollector {
    fn collect(&self) -> Result<Vec<MetricFamily>> {
        let mut families = Vec::with_capacity(self.families.len());
        for template in &self.families {
            let mut family =
                MetricFamily::new(&template.name, &template.help, template.metric_type);
            for sample in &template.samples {
                let value = match &sample.source {
                    ValueSource::Constant(value) => *value,
                    ValueSource::File { path, scale } => self.read_value(path, *scale)?,
                };
                family.samples.push(Sample::with_labels(
                    &sample.name,
                    sample.label_names.clone(),
                    sample.label_values.clone(),
                    value,
                ));
            }
            families.push(family);
        }
        Ok(families)
    }

    fn describe(&self) -> String {
        format!("yaml:{}", self.source_name)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn split_labels(
    labels: &serde_yaml::Mapping,
) -> std::result::Result<(Vec<String>, Vec<String>), String> {
    let mut names = Vec::with_capacity(labels.len());
    let mut values = Vec::with_capacity(labels.len());
    let mut seen = HashSet::with_capacity(labels.len());

    for (key, value) in labels {
        let name = scalar_to_string(key).ok_or("label names must be scalars")?;
        if !is_valid_label_name(&name) {
            return Err(format!("invalid label name {:?}", name));
        }
        if !seen.insert(name.clone()) {
            return Err(format!("duplicate label {:?}", name));
        }
        let value = scalar_to_string(value)
            .ok_or_else(|| format!("label {} must have a scalar value", name))?;
        names.push(name);
        values.push(value);
    }

    Ok((names, values))
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// =============================================================================
// Tests
// =============================================================================
