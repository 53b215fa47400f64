use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

const ZONES: [(&str, &str); 8] = [
    ("toronto", "America/Toronto"),
    ("new_york", "America/New_York"),
    ("los_angeles", "America/Los_Angeles"),
    ("london", "Europe/London"),
    ("paris", "Europe/Paris"),
    ("tokyo", "Asia/Tokyo"),
    ("sydney", "Australia/Sydney"),
    ("utc", "UTC"),
];

pub const DEFAULT_ZONE: &str = "toronto";

#[derive(Debug, Clone, Serialize)]
pub struct TimeInfo {
    pub time: String,
    pub date: String,
    pub timezone: String,
    pub timezone_abbr: String,
    pub iso_format: String,
    pub unix_timestamp: i64,
}

/// IANA zone for a short name; unknown names fall back to Toronto.
pub fn zone_for(name: &str) -> Tz {
    let key = name.trim().to_lowercase().replace([' ', '-'], "_");
    let iana = ZONES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .unwrap_or("America/Toronto");
    iana.parse().unwrap_or(chrono_tz::America::Toronto)
}

pub fn time_at(zone_name: &str, now: DateTime<Utc>) -> TimeInfo {
    let tz = zone_for(zone_name);
    let local = now.with_timezone(&tz);
    TimeInfo {
        time: local.format("%I:%M:%S %p").to_string(),
        date: local.format("%A, %B %d, %Y").to_string(),
        timezone: tz.name().to_string(),
        timezone_abbr: local.format("%Z").to_string(),
        iso_format: local.to_rfc3339(),
        unix_timestamp: local.timestamp(),
    }
}

pub fn current_time(zone_name: &str) -> TimeInfo {
    time_at(zone_name, Utc::now())
}

/// `"03:04:05 PM EDT on Monday, June 02, 2025"`
pub fn describe(zone_name: &str) -> String {
    let info = current_time(zone_name);
    format!("{} {} on {}", info.time, info.timezone_abbr, info.date)
}

/// Zone key and display label for a free-text query.
pub fn location_in(query: &str) -> (&'static str, &'static str) {
    let q = query.to_lowercase();
    if q.contains("new york") || q.contains("nyc") {
        ("new_york", "New York, USA")
    } else if q.contains("los angeles") || q.contains("la time") {
        ("los_angeles", "Los Angeles, USA")
    } else if q.contains("london") || q.contains("uk") {
        ("london", "London, UK")
    } else if q.contains("paris") || q.contains("france") {
        ("paris", "Paris, France")
    } else if q.contains("tokyo") || q.contains("japan") {
        ("tokyo", "Tokyo, Japan")
    } else if q.contains("sydney") || q.contains("australia") {
        ("sydney", "Sydney, Australia")
    } else if q.contains("utc") || q.contains("gmt") {
        ("utc", "UTC")
    } else {
        ("toronto", "Toronto, Canada")
    }
}

pub fn format_duration(a: DateTime<Utc>, b: DateTime<Utc>) -> String {
    let secs = (b - a).num_seconds().unsigned_abs();
    let (n, unit) = match secs {
        0..60 => return format!("{secs} seconds"),
        60..3600 => (secs / 60, "minute"),
        3600..86400 => (secs / 3600, "hour"),
        _ => (secs / 86400, "day"),
    };
    format!("{n} {unit}{}", if n == 1 { "" } else { "s" })
}
