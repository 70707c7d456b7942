//! Interpolation between pressure levels.
//!
//! Atmospheric fields vary close to linearly with the logarithm of pressure,
//! so every weight here is computed in `ln p`. Level lists are ordered from
//! the highest pressure (lowest altitude) upwards.

use wx_common::atmosphere::{altitude_to_pressure, pressure_to_altitude};

/// Position of a pressure relative to a strictly decreasing level list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LevelBracket {
    /// Equal to the level at this index
    Exact(usize),
    /// Between `lower` and `lower + 1`; `weight` is the share of the upper level
    Between { lower: usize, weight: f64 },
    /// Higher pressure than the first level
    BelowColumn,
    /// Lower pressure than the last level
    AboveColumn,
}

/// Locate `pressure_hpa` within `levels_hpa` (strictly decreasing).
pub fn bracket_pressure(levels_hpa: &[f64], pressure_hpa: f64) -> Option<LevelBracket> {
    let first = *levels_hpa.first()?;
    let last = *levels_hpa.last()?;

    if let Some(k) = levels_hpa.iter().position(|&p| p == pressure_hpa) {
        return Some(LevelBracket::Exact(k));
    }
    if pressure_hpa > first {
        return Some(LevelBracket::BelowColumn);
    }
    if pressure_hpa < last {
        return Some(LevelBracket::AboveColumn);
    }

    let lower = levels_hpa
        .windows(2)
        .position(|w| w[0] > pressure_hpa && pressure_hpa > w[1])?;
    Some(LevelBracket::Between {
        lower,
        weight: log_pressure_weight(levels_hpa[lower], levels_hpa[lower + 1], pressure_hpa),
    })
}

/// Fraction of the way from `p0` to `p1` at which `p` lies, in `ln p`.
pub fn log_pressure_weight(p0: f64, p1: f64, p: f64) -> f64 {
    let span = p1.ln() - p0.ln();
    if span == 0.0 {
        0.0
    } else {
        (p.ln() - p0.ln()) / span
    }
}

pub fn lerp(a: f64, b: f64, weight: f64) -> f64 {
    a + (b - a) * weight
}

/// Height (m) of a pressure level from a column of (pressure, height) pairs
/// ordered by decreasing pressure.
///
/// Outside the column the standard atmosphere supplies the shape of the
/// profile, anchored at the nearest end level.
pub fn height_at_pressure(column: &[(f64, f64)], pressure_hpa: f64) -> Option<f64> {
    let pressures: Vec<f64> = column.iter().map(|(p, _)| *p).collect();

    Some(match bracket_pressure(&pressures, pressure_hpa)? {
        LevelBracket::Exact(k) => column[k].1,
        LevelBracket::Between { lower, weight } => lerp(column[lower].1, column[lower + 1].1, weight),
        LevelBracket::BelowColumn => {
            let (p, h) = column[0];
            h + pressure_to_altitude(pressure_hpa) - pressure_to_altitude(p)
        }
        LevelBracket::AboveColumn => {
            let (p, h) = column[column.len() - 1];
            h + pressure_to_altitude(pressure_hpa) - pressure_to_altitude(p)
        }
    })
}

/// Pressure (hPa) at a geometric height, the inverse of [`height_at_pressure`].
///
/// Heights must increase along the column.
pub fn pressure_at_height(column: &[(f64, f64)], height_m: f64) -> Option<f64> {
    let (first_p, first_h) = *column.first()?;
    let (last_p, last_h) = *column.last()?;

    if let Some((p, _)) = column.iter().find(|(_, h)| *h == height_m) {
        return Some(*p);
    }
    if height_m < first_h {
        return Some(altitude_to_pressure(pressure_to_altitude(first_p) + height_m - first_h));
    }
    if height_m > last_h {
        return Some(altitude_to_pressure(pressure_to_altitude(last_p) + height_m - last_h));
    }

    let k = column
        .windows(2)
        .position(|w| w[0].1 < height_m && height_m < w[1].1)?;
    let (p0, h0) = column[k];
    let (p1, h1) = column[k + 1];
    let weight = (height_m - h0) / (h1 - h0);
    Some(lerp(p0.ln(), p1.ln(), weight).exp())
}
