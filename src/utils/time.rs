use std::time::{SystemTime, UNIX_EPOCH};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Current UTC timestamp (seconds)
pub fn now_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current UTC timestamp (milliseconds)
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Last second of the UTC day containing `ts_s`
pub fn end_of_day(ts_s: u64) -> u64 {
    ts_s - ts_s % SECONDS_PER_DAY + (SECONDS_PER_DAY - 1)
}
