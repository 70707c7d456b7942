//! Selection and blending of snapshots in time.

use chrono::{DateTime, Duration, Utc};
use wx_common::InterpolationError;

/// Which snapshots of a timeline answer a query time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeBracket {
    /// Use the snapshot at this index unblended
    Exact(usize),
    /// Blend `earlier` and `earlier + 1`; `weight` is the share of the later one
    Between { earlier: usize, weight: f64 },
}

/// Bracket `time` within `valid_times` (strictly increasing).
///
/// - Past the last valid time the data is stale; there is no extrapolation.
/// - Before the first valid time, the first snapshot answers within
///   `tolerance`; further out there is no coverage.
/// - An earlier snapshot more than `staleness` old is not blended; the later
///   one answers alone when it is within `tolerance`.
pub fn bracket_time(
    valid_times: &[DateTime<Utc>],
    time: DateTime<Utc>,
    tolerance: Duration,
    staleness: Duration,
) -> Result<TimeBracket, InterpolationError> {
    let (Some(&first), Some(&last)) = (valid_times.first(), valid_times.last()) else {
        return Err(InterpolationError::no_coverage("no snapshots published"));
    };

    if time > last {
        return Err(InterpolationError::stale(format!(
            "{} is past the last forecast hour {}",
            time, last
        )));
    }
    if time < first {
        return if first - time <= tolerance {
            Ok(TimeBracket::Exact(0))
        } else {
            Err(InterpolationError::no_coverage(format!(
                "{} is before the first forecast hour {}",
                time, first
            )))
        };
    }

    if let Some(k) = valid_times.iter().position(|&t| t == time) {
        return Ok(TimeBracket::Exact(k));
    }

    let earlier = valid_times
        .windows(2)
        .position(|w| w[0] < time && time < w[1])
        .ok_or_else(|| InterpolationError::no_coverage("valid times are not increasing"))?;
    let (t0, t1) = (valid_times[earlier], valid_times[earlier + 1]);

    if time - t0 > staleness {
        return if t1 - time <= tolerance {
            Ok(TimeBracket::Exact(earlier + 1))
        } else {
            Err(InterpolationError::stale(format!(
                "nearest earlier forecast hour {} is older than {} hours",
                t0,
                staleness.num_hours()
            )))
        };
    }

    let weight = (time - t0).num_milliseconds() as f64 / (t1 - t0).num_milliseconds() as f64;
    Ok(TimeBracket::Between { earlier, weight })
}

/// Blend two optional values; a value present on one side only is used as is.
pub fn lerp_option(a: Option<f64>, b: Option<f64>, weight: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + (b - a) * weight),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}
