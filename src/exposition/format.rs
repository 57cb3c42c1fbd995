//! Text format primitives: escaping and number rendering.

use std::borrow::Cow;

/// Escape HELP text: `\` becomes `\\`, newline becomes `\n`.
pub fn escape_help(help: &str) -> Cow<'_, str> {
    escape(help, false)
}

/// Escape a label value: `\` becomes `\\`, `"` becomes `\"`, newline becomes `\n`.
pub fn escape_label_value(value: &str) -> Cow<'_, str> {
    escape(value, true)
}

fn escape(input: &str, quotes: bool) -> Cow<'_, str> {
    let needs_escape = |c: char| c == '\\' || c == '\n' || (quotes && c == '"');
    if !input.contains(needs_escape) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '"' if quotes => out.push_str("\\\""),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Render a sample value.
///
/// Non-finite values use the Prometheus tokens `+Inf`, `-Inf` and `NaN`.
/// Finite values use the shortest digits that round-trip, laid out the way
/// Go's `strconv.FormatFloat(v, 'g', -1, 64)` does: exponent notation when
/// the decimal exponent is below -4 or at least 6, plain decimal otherwise.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits as `d[.ddd]e<exp>`
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let mut out = String::with_capacity(digits.len() + 8);
    if value.is_sign_negative() {
        out.push('-');
    }

    if !(-4..6).contains(&exponent) {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push(if exponent < 0 { '-' } else { '+' });
        let magnitude = exponent.unsigned_abs();
        if magnitude < 10 {
            out.push('0');
        }
        out.push_str(&magnitude.to_string());
        return out;
    }

    // position of the decimal point relative to the digit string
    let point = exponent + 1;
    let len = digits.len() as i32;
    if point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-point) as usize));
        out.push_str(&digits);
    } else if point >= len {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((point - len) as usize));
    } else {
        let (int_part, frac_part) = digits.split_at(point as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
