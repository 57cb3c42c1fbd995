//! Text exposition encoder.
//!
//! Streams a [`Snapshot`] into any [`Write`] sink, family by family. Nothing
//! is staged in an intermediate buffer: whatever buffering exists belongs to
//! the sink handed in by the caller.

use std::io::Write;

use uuid::Uuid;

use super::format::{escape_help, escape_label_value, format_value};
use crate::error::Result;
use crate::model::{MetricFamily, Sample, Snapshot};

/// Content type of the text format, version 0.0.4
pub const CONTENT_TYPE_004: &str = "text/plain; version=0.0.4";

/// How the metric name on a `# HELP` line is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HelpName {
    /// The family name as declared
    #[default]
    Plain,
    /// A fresh random token, `_`, then the family name. The token is new for
    /// every family on every encoding pass, so two families sharing a name
    /// never produce the same HELP key. TYPE and sample lines are unaffected.
    Discriminated,
}

/// Encoder for the Prometheus text exposition format
#[derive(Debug, Clone, Copy, Default)]
pub struct TextEncoder {
    help_name: HelpName,
}

impl TextEncoder {
    /// Create an encoder with standard HELP lines
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder with the given HELP name mode
    pub fn with_help_name(help_name: HelpName) -> Self {
        Self { help_name }
    }

    /// Content type to advertise alongside the encoded output
    pub fn format_type(&self) -> &'static str {
        CONTENT_TYPE_004
    }

    /// Encode every family of `snapshot`, in order, into `writer`.
    ///
    /// Stops at the first invalid family or failed write. Families already
    /// written stay written.
    pub fn encode<W: Write + ?Sized>(&self, snapshot: &Snapshot, writer: &mut W) -> Result<()> {
        for family in snapshot {
            self.encode_family(family, writer)?;
        }
        Ok(())
    }

    /// Encode a single family. The family is validated before its first byte
    /// is written.
    pub fn encode_family<W: Write + ?Sized>(
        &self,
        family: &MetricFamily,
        writer: &mut W,
    ) -> Result<()> {
        family.validate()?;

        writer.write_all(b"# HELP ")?;
        if self.help_name == HelpName::Discriminated {
            write!(writer, "{}_", discriminator())?;
        }
        writeln!(writer, "{} {}", family.name, escape_help(&family.help))?;
        writeln!(writer, "# TYPE {} {}", family.name, family.metric_type)?;

        for sample in &family.samples {
            write_sample(sample, writer)?;
        }
        Ok(())
    }
}

/// Encode `snapshot` with standard HELP lines
pub fn encode<W: Write + ?Sized>(snapshot: &Snapshot, writer: &mut W) -> Result<()> {
    TextEncoder::new().encode(snapshot, writer)
}

fn write_sample<W: Write + ?Sized>(sample: &Sample, writer: &mut W) -> Result<()> {
    writer.write_all(sample.name.as_bytes())?;

    if !sample.label_names.is_empty() {
        writer.write_all(b"{")?;
        // every pair is comma-terminated, the last one included
        for (name, value) in sample.labels() {
            write!(writer, "{}=\"{}\",", name, escape_label_value(value))?;
        }
        writer.write_all(b"}")?;
    }

    // timestamps are carried by the model but never written
    writeln!(writer, " {}", format_value(sample.value))?;
    Ok(())
}

fn discriminator() -> String {
    Uuid::new_v4().to_string().replace('-', "_")
}

// =============================================================================
// Tests
// =============================================================================
