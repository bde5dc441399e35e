//! Cell and summary text formatting.

use chrono::{NaiveDateTime, Timelike};

pub const MISSING: &str = "n/a";

/// `1234567.891` -> `1,234,567.89`
pub fn thousands(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    // A value that rounds to zero keeps no sign
    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::with_capacity(grouped.len() + decimals + 2);
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Date-only form at midnight, full datetime otherwise
pub fn timestamp(ts: Option<NaiveDateTime>) -> String {
    match ts {
        Some(ts) if ts.time().num_seconds_from_midnight() == 0 && ts.nanosecond() == 0 => {
            ts.format("%Y-%m-%d").to_string()
        }
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => MISSING.to_string(),
    }
}

pub fn value(v: Option<f64>) -> String {
    v.map_or_else(|| MISSING.to_string(), |v| thousands(v, 2))
}

pub fn score(s: f64) -> String {
    format!("{:.4}", s)
}

/// Fraction in [0, 1] as a percentage with two decimals
pub fn rate(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(1234567.891, 2), "1,234,567.89");
        assert_eq!(thousands(999.0, 2), "999.00");
        assert_eq!(thousands(1000.0, 2), "1,000.00");
        assert_eq!(thousands(-20000.5, 2), "-20,000.50");
        assert_eq!(thousands(-0.001, 2), "0.00");
        assert_eq!(thousands(123456.0, 0), "123,456");
    }

    #[test]
    fn test_timestamp_forms() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert_eq!(timestamp(d.and_hms_opt(0, 0, 0)), "2024-01-03");
        assert_eq!(timestamp(d.and_hms_opt(14, 5, 9)), "2024-01-03 14:05:09");
        assert_eq!(timestamp(None), "n/a");
    }

    #[test]
    fn test_score_and_rate() {
        assert_eq!(score(-0.712345), "-0.7123");
        assert_eq!(rate(0.05), "5.00%");
        assert_eq!(rate(1.0 / 3.0), "33.33%");
        assert_eq!(value(None), "n/a");
    }
}
