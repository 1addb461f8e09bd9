use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Minimum age of a passcode before a fetch rotates it.
pub const REFRESH_INTERVAL_SECS: i64 = 10;

/// Random 4-digit code in [1000, 9999].
pub fn generate_passcode() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}

pub fn needs_refresh(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_updated {
        None => true,
        Some(updated) => now - updated >= Duration::seconds(REFRESH_INTERVAL_SECS),
    }
}
