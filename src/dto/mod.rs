use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod events;
pub mod health;
pub mod ops;
pub mod results;
pub mod session;
pub mod validation;
pub mod ws;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Milliseconds since the unix epoch.
pub(crate) fn unix_millis(time: SystemTime) -> i64 {
    (OffsetDateTime::from(time).unix_timestamp_nanos() / 1_000_000) as i64
}
