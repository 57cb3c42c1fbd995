//! Exposition Module
//!
//! Serializes a [`Snapshot`](crate::model::Snapshot) into the Prometheus text
//! exposition format, version 0.0.4.
//!
//! # Wire Layout
//!
//! ```text
//! # HELP <name> <escaped help>
//! # TYPE <name> <gauge|counter|summary|histogram|untyped>
//! <sample>{<label>="<escaped value>",...,} <value>
//! ```
//!
//! # Components
//!
//! - **Format** (`format.rs`): escaping of HELP text and label values, and
//!   Go-compatible float rendering (`+Inf`, `-Inf`, `NaN`, shortest digits).
//! - **Encoder** (`encoder.rs`): the streaming [`TextEncoder`].

pub mod encoder;
pub mod format;

#[cfg(test)]
mod proptest;

pub use encoder::{encode, HelpName, TextEncoder, CONTENT_TYPE_004};
pub use format::{escape_help, escape_label_value, format_value};
