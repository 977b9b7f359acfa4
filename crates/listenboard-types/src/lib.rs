pub mod api;
pub mod history;

/// Listening time is reported in whole minutes, rounded to the nearest one.
pub fn ms_to_minutes(ms: i64) -> i64 {
    if ms <= 0 {
        return 0;
    }
    (ms + 30_000) / 60_000
}
