//! Wall-clock helpers for wire timestamps.

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Current time as fractional unix seconds.
pub fn unix_seconds() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

/// Current time as an RFC 3339 string.
pub fn rfc3339_now() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
