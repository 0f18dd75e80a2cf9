use time::OffsetDateTime;

pub fn utc_now_ms() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Wall-clock seconds since the epoch with sub-second precision.
pub fn utc_now_secs_f64() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}
