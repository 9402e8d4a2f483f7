// Number parsing and formatting helpers.
//
// Everything that turns loosely formatted spreadsheet text into numbers, or
// numbers back into display text, lives here so the pipeline only sees `f64`.
use num_format::{Locale, ToFormattedString};

/// Parse a numeric cell written either in English (`1,234.56`) or Brazilian
/// (`1.234,56`) notation.
///
/// - Trims whitespace and rejects empty or alphabetic input.
/// - When both `.` and `,` appear, the last one is the decimal separator.
/// - A lone `,` is a decimal comma, as exported by pt-BR ERP screens.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let normalized = match (s.rfind('.'), s.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) => s.replace(',', "."),
        _ => s.to_string(),
    };
    let v = normalized.parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

/// Round half away from zero to two decimal places.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals first, then `num-format` groups the integer part.
    let s = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s.as_str(), None),
    };
    let mut res = match int_part.parse::<u128>() {
        Ok(v) => v.to_formatted_string(&Locale::en),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    // `-0.00` reads as noise in a report.
    if n.is_sign_negative() && res.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{}", res)
    } else {
        res
    }
}

/// Render a percentage value as `5.00%`.
pub fn format_percent(p: f64) -> String {
    format!("{}%", format_number(p, 2))
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
