//! Exchange session windows.
//!
//! The exchange trades in two windows per day, expressed in exchange-local
//! time (UTC+8): 09:30-11:30 and 13:00-15:00. Every timestamp in the system
//! is `DateTime<Utc>`; this module is the single place where wall-clock
//! session logic converts through the fixed offset.

use chrono::{DateTime, FixedOffset, NaiveTime, Timelike, Utc};

const EXCHANGE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Fixed exchange-local offset (UTC+8).
pub fn exchange_offset() -> FixedOffset {
    FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS).expect("static offset is in range")
}

/// Convert a UTC timestamp to exchange-local time.
pub fn exchange_local(t: DateTime<Utc>) -> DateTime<FixedOffset> {
    t.with_timezone(&exchange_offset())
}

fn session_windows() -> [(NaiveTime, NaiveTime); 2] {
    let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).expect("static time is valid");
    [(t(9, 30), t(11, 30)), (t(13, 0), t(15, 0))]
}

/// Whether `t` falls inside a trading session window.
pub fn is_trading_time(t: DateTime<Utc>) -> bool {
    let local = exchange_local(t).time();
    session_windows()
        .iter()
        .any(|(open, close)| local >= *open && local < *close)
}

/// Seconds remaining until the close of the session containing `t`.
///
/// Returns `None` when `t` is outside both session windows; callers must
/// treat that as "unknown", not as zero.
pub fn seconds_to_close_at(t: DateTime<Utc>) -> Option<i64> {
    let local = exchange_local(t).time();
    // Time remaining counts down to the final close of the day, so a morning
    // tick still sees the afternoon session ahead of it.
    let [(m_open, m_close), (a_open, a_close)] = session_windows();
    let afternoon_secs = (a_close - a_open).num_seconds();
    if local >= m_open && local < m_close {
        Some((m_close - local).num_seconds() + afternoon_secs)
    } else if local >= a_open && local < a_close {
        Some((a_close - local).num_seconds())
    } else {
        None
    }
}

/// Exchange-local hour of day for `t` (0-23).
pub fn exchange_hour(t: DateTime<Utc>) -> u32 {
    exchange_local(t).hour()
}
