//! Display helpers for job board values

use chrono::{DateTime, Utc};

const COMPACT_UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];

/// Compact salary notation: `950`, `1.5K`, `12K`, `2M`
pub fn format_salary(salary: u64) -> String {
    let value = salary as f64;
    for (i, (unit, suffix)) in COMPACT_UNITS.iter().enumerate() {
        if value < *unit {
            continue;
        }
        let scaled = compact_round(value / unit);
        // 999_999 rounds up to 1000K, which reads as 1M
        if scaled >= 1000.0 && i > 0 {
            let (bigger, bigger_suffix) = COMPACT_UNITS[i - 1];
            return format!("{}{}", trim_decimal(compact_round(value / bigger)), bigger_suffix);
        }
        return format!("{}{}", trim_decimal(scaled), suffix);
    }
    salary.to_string()
}

// Two significant digits below 100, whole numbers above
fn compact_round(scaled: f64) -> f64 {
    if scaled < 10.0 {
        (scaled * 10.0).round() / 10.0
    } else {
        scaled.round()
    }
}

fn trim_decimal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

pub fn format_job_type(job_type: &str) -> String {
    match job_type.to_ascii_lowercase().as_str() {
        "fulltime" => "Full Time".to_string(),
        "parttime" => "Part Time".to_string(),
        "contract" => "Contract".to_string(),
        "casual" => "Casual".to_string(),
        "internship" => "Internship".to_string(),
        _ => job_type.to_string(),
    }
}

pub fn format_experience(experience: &str) -> String {
    match experience.to_ascii_lowercase().as_str() {
        "newgrad" => "New Grad".to_string(),
        "junior" => "Junior".to_string(),
        "senior" => "Senior".to_string(),
        "manager" => "Manager".to_string(),
        "internship" => "Internship".to_string(),
        _ => experience.to_string(),
    }
}

/// Relative age of an RFC 3339 timestamp, e.g. `3 days ago`.
/// Unparseable or future timestamps read as `just now`.
pub fn time_ago(created_at: &str, now: DateTime<Utc>) -> String {
    let Ok(created) = DateTime::parse_from_rfc3339(created_at) else {
        return "just now".to_string();
    };

    let seconds = (now - created.with_timezone(&Utc)).num_seconds();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let months = days / 30;

    let (count, unit) = if months > 0 {
        (months, "month")
    } else if days > 0 {
        (days, "day")
    } else if hours > 0 {
        (hours, "hour")
    } else if minutes > 0 {
        (minutes, "minute")
    } else {
        return "just now".to_string();
    };

    let plural = if count > 1 { "s" } else { "" };
    format!("{count} {unit}{plural} ago")
}
