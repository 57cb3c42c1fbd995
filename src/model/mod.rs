//! Metric Snapshot Model
//!
//! The data shapes a collector hands to the registry: typed families of
//! labelled samples, grouped into a per-request [`Snapshot`].

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use crate::error::{Error, Result};

// =============================================================================
// Metric Type
// =============================================================================

/// Metric family type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(from = "String")]
pub enum MetricType {
    Gauge,
    Counter,
    Summary,
    Histogram,
    /// Fallback for anything unrecognized
    #[default]
    Untyped,
}

impl MetricType {
    /// Wire token used on the `# TYPE` line
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Summary => "summary",
            MetricType::Histogram => "histogram",
            MetricType::Untyped => "untyped",
        }
    }

    /// Parse a type token. Unknown tokens map to [`MetricType::Untyped`].
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "gauge" => MetricType::Gauge,
            "counter" => MetricType::Counter,
            "summary" => MetricType::Summary,
            "histogram" => MetricType::Histogram,
            _ => MetricType::Untyped,
        }
    }
}

impl From<String> for MetricType {
    fn from(token: String) -> Self {
        Self::from_token(&token)
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sample
// =============================================================================

/// One labelled data point.
///
/// Label names and values are kept as two positionally paired vectors so a
/// collector can build them from whatever source order it has; use
/// [`Sample::validate`] (the encoder always does) to check they line up.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub label_names: Vec<String>,
    pub label_values: Vec<String>,
    pub value: f64,
    pub timestamp_millis: Option<i64>,
}

impl Sample {
    /// Create an unlabelled sample
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            label_names: Vec::new(),
            label_values: Vec::new(),
            value,
            timestamp_millis: None,
        }
    }

    /// Create a sample from already-split label vectors
    pub fn with_labels(
        name: impl Into<String>,
        label_names: Vec<String>,
        label_values: Vec<String>,
        value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            label_names,
            label_values,
            value,
            timestamp_millis: None,
        }
    }

    /// Append one label pair
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.label_names.push(name.into());
        self.label_values.push(value.into());
        self
    }

    /// Attach a timestamp in milliseconds since the epoch
    pub fn at(mut self, timestamp_millis: i64) -> Self {
        self.timestamp_millis = Some(timestamp_millis);
        self
    }

    /// Iterate label pairs in order
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.label_names
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }

    /// Check label arity and uniqueness
    pub fn validate(&self) -> Result<()> {
        if self.label_names.len() != self.label_values.len() {
            return Err(Error::LabelArity {
                sample: self.name.clone(),
                names: self.label_names.len(),
                values: self.label_values.len(),
            });
        }

        let mut seen = HashSet::with_capacity(self.label_names.len());
        for label in &self.label_names {
            if !seen.insert(label.as_str()) {
                return Err(Error::DuplicateLabel {
                    sample: self.name.clone(),
                    label: label.clone(),
                });
            }
        }

        Ok(())
    }
}

// =============================================================================
// Metric Family
// =============================================================================

/// A named, typed group of samples
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    /// Create an empty family
    pub fn new(name: impl Into<String>, help: impl Into<String>, metric_type: MetricType) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            samples: Vec::new(),
        }
    }

    /// Append a sample
    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    /// Validate every sample
    pub fn validate(&self) -> Result<()> {
        self.samples.iter().try_for_each(Sample::validate)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// The ordered families produced for one request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    families: Vec<MetricFamily>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of families
    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Append a collector's fragment, keeping its order
    pub fn extend(&mut self, fragment: impl IntoIterator<Item = MetricFamily>) {
        self.families.extend(fragment);
    }

    /// Families in order
    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricFamily> {
        self.families.iter()
    }

    /// Validate every family
    pub fn validate(&self) -> Result<()> {
        self.families.iter().try_for_each(MetricFamily::validate)
    }
}

impl From<Vec<MetricFamily>> for Snapshot {
    fn from(families: Vec<MetricFamily>) -> Self {
        Self { families }
    }
}

impl IntoIterator for Snapshot {
    type Item = MetricFamily;
    type IntoIter = std::vec::IntoIter<MetricFamily>;

    fn into_iter(self) -> Self::IntoIter {
        self.families.into_iter()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a MetricFamily;
    type IntoIter = std::slice::Iter<'a, MetricFamily>;

    fn into_iter(self) -> Self::IntoIter {
        self.families.iter()
    }
}

// =============================================================================
// Tests
// =============================================================================
