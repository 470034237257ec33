//! Forecast-hour bucketing.
//!
//! A forecast fetched during the last quarter of an hour already belongs to
//! the next hour: from minute 45 on, the provider's nearest hourly slot is
//! the upcoming one. Every instant therefore maps to a canonical hour, and
//! that hour is what cache keys are built from.

use chrono::{Duration, NaiveDateTime, Timelike};

/// First minute of an hour that already counts as the next hour.
pub const ROLLOVER_MINUTE: u32 = 45;

/// Opaque identifier of a canonical forecast hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(NaiveDateTime);

/// Rounds `now` to its canonical forecast hour: advance one hour when the
/// minute is at or past [`ROLLOVER_MINUTE`], then truncate to the top of
/// the hour.
///
/// Returns `None` when the rollover would pass the last representable
/// date.
pub fn canonical_hour(now: NaiveDateTime) -> Option<NaiveDateTime> {
    let shifted = if now.minute() >= ROLLOVER_MINUTE {
        now.checked_add_signed(Duration::hours(1))?
    } else {
        now
    };

    top_of_hour(shifted)
}

fn top_of_hour(at: NaiveDateTime) -> Option<NaiveDateTime> {
    at.with_minute(0)?.with_second(0)?.with_nanosecond(0)
}

pub fn bucket(now: NaiveDateTime) -> BucketId {
    // The last representable hour has nothing to roll over into.
    let hour = canonical_hour(now)
        .or_else(|| top_of_hour(now))
        .unwrap_or(now);
    BucketId(hour)
}
