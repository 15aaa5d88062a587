use chrono::{DateTime, Utc};

/// Milliseconds elapsed between two timestamps.
pub fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    end.signed_duration_since(start).num_milliseconds()
}
