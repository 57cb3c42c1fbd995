//! Property-Based Tests for the Text Format
//!
//! # Test Properties
//!
//! 1. **Escape Reversibility**: unescape(escape(s)) = s for HELP text and label values
//! 2. **Float Round-trip**: parse(format(v)) is bit-equal to v for every finite v
//! 3. **Line Shape**: escaped text never contains a raw newline

#![cfg(test)]

use proptest::prelude::*;

use super::format::{escape_help, escape_label_value, format_value};
use super::TextEncoder;
use crate::model::{MetricFamily, MetricType, Sample, Snapshot};

// =============================================================================
// Helpers
// =============================================================================

/// Inverse substitution of the escaping rules
fn unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Strings biased towards the characters that need escaping.
fn tricky_string_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just('\\'),
            Just('"'),
            Just('\n'),
            Just('n'),
            any::<char>(),
        ],
        0..64,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

// =============================================================================
// Escaping Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: label value escaping is reversed exactly by the inverse substitution.
    #[test]
    fn prop_label_value_escape_reversible(value in tricky_string_strategy()) {
        let escaped = escape_label_value(&value).into_owned();
        prop_assert_eq!(unescape(&escaped), value);
    }

    /// Property: HELP escaping is reversed exactly by the inverse substitution.
    #[test]
    fn prop_help_escape_reversible(help in tricky_string_strategy()) {
        let escaped = escape_help(&help).into_owned();
        prop_assert_eq!(unescape(&escaped), help);
    }

    /// Property: escaped text stays on one line.
    #[test]
    fn prop_escaped_text_has_no_newline(value in tricky_string_strategy()) {
        prop_assert!(!escape_help(&value).contains('\n'));
        prop_assert!(!escape_label_value(&value).contains('\n'));
    }
}

// =============================================================================
// Number Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Property: every finite double survives format -> parse bit for bit.
    #[test]
    fn prop_finite_values_round_trip(bits in any::<u64>()) {
        let value = f64::from_bits(bits);
        prop_assume!(value.is_finite());

        let rendered = format_value(value);
        let parsed: f64 = rendered.parse().unwrap();
        prop_assert_eq!(parsed.to_bits(), value.to_bits(), "rendered as {}", rendered);
    }

    /// Property: a sample line carries exactly the formatted value.
    #[test]
    fn prop_sample_line_value(value in any::<f64>()) {
        let snapshot = Snapshot::from(vec![
            MetricFamily::new("m", "", MetricType::Gauge).with_sample(Sample::new("m", value)),
        ]);
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&snapshot, &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();

        let last = output.lines().last().unwrap();
        prop_assert_eq!(last, format!("m {}", format_value(value)));
    }
}
