//! Conversion between wall-clock instants and the tick count stored in
//! tickets and throttle records.
//!
//! A tick is ⅛ of a second since 2021-01-01 00:00:00 UTC. Four big-endian
//! bytes of ticks cover roughly 17 years; the counter wraps after that,
//! which is operationally acceptable for a two-week verification horizon.
//!
//! `chrono::DateTime<Utc>` is used throughout, so a timezone-naive instant
//! cannot reach these functions by construction.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::config::TICK_MILLIS;

/// The service epoch: 2021-01-01 00:00:00 UTC.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
}

/// Ticks elapsed at `moment`, rounded to the nearest tick (half up).
///
/// Instants before the epoch are a programming error; the value wraps
/// modulo 2³² past mid-2038.
pub fn encode(moment: DateTime<Utc>) -> u32 {
    let millis = (moment - epoch()).num_milliseconds();
    debug_assert!(millis >= 0, "instants before the epoch cannot be encoded");
    let ticks = (millis.max(0) * 8 + 500) / 1000;
    (ticks as u64 & 0xffff_ffff) as u32
}

/// The instant a tick count refers to.
pub fn decode(ticks: u32) -> DateTime<Utc> {
    epoch() + Duration::milliseconds(i64::from(ticks) * TICK_MILLIS as i64)
}

/// The current instant as a tick count.
pub fn now() -> u32 {
    encode(Utc::now())
}
