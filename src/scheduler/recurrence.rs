//! Next-fire computation for recurrence specs.

use chrono::{DateTime, Duration, Utc};

use super::model::RecurrenceSpec;

/// Compute the next absolute fire instant for `spec`, relative to `now`.
///
/// Returns `None` for an interval of zero or one that overflows, and for
/// cron expressions, which are not scheduled.
pub fn next_fire_time(spec: &RecurrenceSpec, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match spec {
        RecurrenceSpec::Interval { unit, value } => {
            if *value == 0 {
                return None;
            }
            let millis = unit.millis().checked_mul(i64::from(*value))?;
            now.checked_add_signed(Duration::milliseconds(millis))
        }
        RecurrenceSpec::Cron { .. } => None,
    }
}
