/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Durations are recorded in whole milliseconds.
pub type DurationMs = u64;
