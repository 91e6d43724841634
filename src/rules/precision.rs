//! Precision-safe arithmetic and display formatting
//!
//! Every dollar and linear-foot figure in the rules goes through these so
//! results read `13.68` rather than `13.680000000000007`. NaN and infinity
//! pass straight through; callers validate input first.

/// Default number of decimals for money and lengths
pub const DEFAULT_DECIMALS: u32 = 2;

/// Round half away from zero at `decimals`, biased by one epsilon so values
/// like 1.005 round the way they read. Magnitudes too large to scale are
/// returned unchanged; they have no fractional digits left to round.
pub fn round_to_precision(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    let scaled = (value + f64::EPSILON.copysign(value)) * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

pub fn safe_add(a: f64, b: f64, decimals: u32) -> f64 {
    round_to_precision(a + b, decimals)
}

pub fn safe_subtract(a: f64, b: f64, decimals: u32) -> f64 {
    round_to_precision(a - b, decimals)
}

pub fn safe_multiply(a: f64, b: f64, decimals: u32) -> f64 {
    round_to_precision(a * b, decimals)
}

/// Format with a fixed number of decimals, optionally stripping trailing zeros
pub fn format_number(value: f64, decimals: u32, strip_trailing_zeros: bool) -> String {
    let rounded = round_to_precision(value, decimals);
    let mut text = format!("{:.*}", decimals as usize, rounded);
    if strip_trailing_zeros && text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// "$4,847.70"
pub fn format_currency(value: f64) -> String {
    let text = format_number(value.abs(), 2, false);
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if value < 0.0 && round_to_precision(value, 2) != 0.0 {
        "-"
    } else {
        ""
    };
    format!("{}${}.{}", sign, group_thousands(whole), fraction)
}

/// "119 LF", "1,234.5 SF"
pub fn format_measurement(value: f64, unit: &str) -> String {
    let text = format_number(value.abs(), 2, true);
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole.to_string(), format!(".{}", fraction)),
        None => (text.clone(), String::new()),
    };
    let sign = if value < 0.0 && round_to_precision(value, 2) != 0.0 {
        "-"
    } else {
        ""
    };
    format!("{}{}{} {}", sign, group_thousands(&whole), fraction, unit)
}

/// Measurement with an explicit sign: "+12 LF", "-113 LF", "0 LF"
pub fn format_signed_measurement(value: f64, unit: &str) -> String {
    if round_to_precision(value, 2) > 0.0 {
        format!("+{}", format_measurement(value, unit))
    } else {
        format_measurement(value, unit)
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
