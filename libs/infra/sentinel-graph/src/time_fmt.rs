use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-precision RFC3339 rendering (nanosecond, `Z` suffix) so stored
/// timestamps compare correctly both lexicographically (for `MAX()` in SQL)
/// and after being parsed back with `parse_rfc3339`.
pub fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
