use std::time::Duration;

/// Milliseconds since the Unix epoch, the unit of every stored timestamp.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// `now_millis() + after`, saturating.
pub fn millis_after(after: Duration) -> i64 {
    let delta = i64::try_from(after.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(delta)
}
