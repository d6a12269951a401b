// Utility helpers for parsing and basic statistics.
//
// This module centralizes all the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values.
use crate::types::NumericStats;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use num_format::{Locale, ToFormattedString};

/// Canonical serialization used for dates everywhere (dedup keys, export).
pub const ISO_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[ISO_DATETIME, "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports (commas, spaces).
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
/// - Trims whitespace.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be parsed or is not finite
///   (`"inf"`, `"NaN"`), so statistics are never skewed by a placeholder.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a date or date-time. Date-only inputs land on midnight.
pub fn parse_datetime_safe(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_iso(dt: &NaiveDateTime) -> String {
    dt.format(ISO_DATETIME).to_string()
}

/// Whole days from `start` to `end`, rounded up. A stay that ends one
/// second into the next day counts as a full day.
pub fn ceil_days(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let secs = (end - start).num_seconds();
    secs.div_euclid(86_400) + i64::from(secs.rem_euclid(86_400) != 0)
}

/// Trim, collapse runs of whitespace and capitalize each word.
///
/// `"  dr.  JOHN   smith "` becomes `"Dr. John Smith"`.
pub fn normalize_name(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn average(v: &[f64]) -> Option<f64> {
    // Arithmetic mean; `None` for an empty slice so callers never see NaN.
    if v.is_empty() {
        return None;
    }
    let sum: f64 = v.iter().copied().sum();
    Some(sum / v.len() as f64)
}

pub fn median(mut v: Vec<f64>) -> Option<f64> {
    // The element at `len / 2` of the ascending sort. For an even count this
    // is the upper of the two middle values, not their average.
    if v.is_empty() {
        return None;
    }
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(v[v.len() / 2])
}

/// Count, mean, median, min, max and population standard deviation over the
/// non-null values. `None` when there is nothing to summarize.
pub fn stats<I>(values: I) -> Option<NumericStats>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let valid: Vec<f64> = values.into_iter().flatten().collect();
    let mean = average(&valid)?;
    let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
    let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / valid.len() as f64;
    let count = valid.len();
    let median = median(valid)?;
    Some(NumericStats {
        count,
        mean,
        median,
        min,
        max,
        std: variance.sqrt(),
    })
}

/// Round half-up to one decimal, the precision every percentage is shown at.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// `count / total` as a one-decimal percentage; 0 for an empty total.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(count as f64 / total as f64 * 100.0)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for integer-like values, used for
    // counts in console messages (e.g., `55,500 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

/// Compact currency label used by KPI cards: `$1.2M`, `$35k`, `$950`.
pub fn format_currency(v: f64) -> String {
    if v.abs() >= 1_000_000.0 {
        format!("${:.1}M", v / 1_000_000.0)
    } else if v.abs() >= 1_000.0 {
        format!("${:.0}k", v / 1_000.0)
    } else {
        format!("${}", format_number(v, 0))
    }
}

pub fn format_opt(v: Option<f64>, decimals: usize) -> String {
    v.map(|v| format_number(v, decimals))
        .unwrap_or_else(|| "-".to_string())
}
