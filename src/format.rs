//! Display helpers for sizes, dates and labels

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::catalog::InstitutionType;

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human-readable size, base 1024, at most two decimals
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut exponent = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && exponent < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZE_UNITS[exponent])
}

/// Sizes arrive from the server as strings
pub fn format_file_size_str(raw: &str) -> String {
    match raw.trim().parse::<u64>() {
        Ok(bytes) => format_file_size(bytes),
        Err(_) if raw.trim().is_empty() => "N/A".to_string(),
        Err(_) => raw.to_string(),
    }
}

/// `dd.mm.yyyy`. Unparseable input is returned unchanged.
pub fn format_date(raw: &str) -> String {
    let raw_trimmed = raw.trim();
    if raw_trimmed.is_empty() {
        return "N/A".to_string();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw_trimmed) {
        return dt.format("%d.%m.%Y").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw_trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%d.%m.%Y").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw_trimmed, "%Y-%m-%d") {
        return date.format("%d.%m.%Y").to_string();
    }

    raw.to_string()
}

pub fn institution_type_label(kind: InstitutionType) -> &'static str {
    kind.label()
}
