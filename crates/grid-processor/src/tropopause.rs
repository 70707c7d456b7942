//! Tropopause detection from a resolved column.
//!
//! The tropopause is the lowest level above 500 hPa at which the lapse rate
//! falls below the threshold and the mean lapse rate to every level within
//! the next 2 km stays below it too. Lapse rates are taken per layer between
//! adjacent levels and assigned to the layer midpoint; the crossing is
//! interpolated linearly between midpoints.

use crate::column::Column;
use crate::interpolation::vertical::lerp;
use crate::types::{LevelSample, Tropopause, TropopauseSource};

/// Levels at higher pressure than this are never the tropopause.
const SEARCH_FROM_HPA: f64 = 500.0;
/// Depth above the candidate over which the lapse rate must stay low.
const CHECK_DEPTH_M: f64 = 2000.0;

/// A level with known height and temperature.
#[derive(Debug, Clone, Copy)]
struct Point {
    log_p: f64,
    height_m: f64,
    temperature_k: f64,
}

#[derive(Debug, Clone, Copy)]
struct Layer {
    bottom: Point,
    mid: Point,
    /// K/km, positive when temperature falls with height
    lapse_rate: f64,
}

fn layers(points: &[Point]) -> Vec<Layer> {
    points
        .windows(2)
        .map(|w| {
            let (a, b) = (w[0], w[1]);
            Layer {
                bottom: a,
                mid: Point {
                    log_p: (a.log_p + b.log_p) / 2.0,
                    height_m: (a.height_m + b.height_m) / 2.0,
                    temperature_k: (a.temperature_k + b.temperature_k) / 2.0,
                },
                lapse_rate: (a.temperature_k - b.temperature_k) / (b.height_m - a.height_m) * 1000.0,
            }
        })
        .collect()
}

fn stays_below(points: &[Point], candidate: &Point, threshold: f64) -> bool {
    points
        .iter()
        .filter(|p| p.height_m > candidate.height_m && p.height_m <= candidate.height_m + CHECK_DEPTH_M)
        .all(|p| {
            (candidate.temperature_k - p.temperature_k) / (p.height_m - candidate.height_m) * 1000.0
                <= threshold
        })
}

/// Scan `levels` (highest pressure first) for the lapse-rate tropopause.
pub fn find_tropopause(levels: &[LevelSample], threshold_k_per_km: f64) -> Option<Tropopause> {
    let mut points: Vec<Point> = Vec::with_capacity(levels.len());
    for level in levels.iter().filter(|l| l.pressure_hpa <= SEARCH_FROM_HPA) {
        let (Some(height_m), Some(temperature_k)) = (level.height_m, level.temperature_k) else {
            continue;
        };
        if points.last().map_or(true, |prev| height_m > prev.height_m) {
            points.push(Point {
                log_p: level.pressure_hpa.ln(),
                height_m,
                temperature_k,
            });
        }
    }

    let layers = layers(&points);
    for (k, layer) in layers.iter().enumerate() {
        if layer.lapse_rate >= threshold_k_per_km {
            continue;
        }

        let candidate = match k.checked_sub(1).map(|i| &layers[i]) {
            Some(prev) if prev.lapse_rate >= threshold_k_per_km => {
                let f = (prev.lapse_rate - threshold_k_per_km) / (prev.lapse_rate - layer.lapse_rate);
                Point {
                    log_p: lerp(prev.mid.log_p, layer.mid.log_p, f),
                    height_m: lerp(prev.mid.height_m, layer.mid.height_m, f),
                    temperature_k: lerp(prev.mid.temperature_k, layer.mid.temperature_k, f),
                }
            }
            _ => layer.bottom,
        };

        if stays_below(&points, &candidate, threshold_k_per_km) {
            return Some(Tropopause {
                altitude_m: candidate.height_m,
                pressure_hpa: candidate.log_p.exp(),
                temperature_k: Some(candidate.temperature_k),
                source: TropopauseSource::LapseRate,
            });
        }
    }
    None
}

/// Lapse-rate tropopause of a column, else the snapshot's tropopause fields.
pub fn resolve_tropopause(column: &Column, threshold_k_per_km: f64) -> Option<Tropopause> {
    find_tropopause(&column.levels, threshold_k_per_km).or_else(|| {
        let (pressure_hpa, temperature_k) = column.model_tropopause?;
        Some(Tropopause {
            altitude_m: column.height_at_pressure(pressure_hpa),
            pressure_hpa,
            temperature_k,
            source: TropopauseSource::ModelField,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wx_common::atmosphere::{isa_temperature, pressure_to_altitude};

    fn level(p: f64, height_m: f64, temperature_k: f64) -> LevelSample {
        LevelSample {
            height_m: Some(height_m),
            temperature_k: Some(temperature_k),
            ..LevelSample::empty(p)
        }
    }

    fn isa_levels(pressures: &[f64]) -> Vec<LevelSample> {
        pressures
            .iter()
            .map(|&p| {
                let z = pressure_to_altitude(p);
                level(p, z, isa_temperature(z))
            })
            .collect()
    }

    #[test]
    fn test_standard_atmosphere() {
        let levels = isa_levels(&[1000.0, 850.0, 500.0, 400.0, 300.0, 250.0, 200.0, 150.0, 100.0]);
        let tropopause = find_tropopause(&levels, 2.0).unwrap();

        assert_eq!(tropopause.source, TropopauseSource::LapseRate);
        assert!((tropopause.altitude_m - 11_000.0).abs() < 800.0);
        assert!(tropopause.pressure_hpa < 250.0 && tropopause.pressure_hpa > 150.0);
        assert!((tropopause.temperature_k.unwrap() - 216.65).abs() < 3.0);
    }

    #[test]
    fn test_crossing_interpolates_between_midpoints() {
        // 6 K/km up to 10 km, then isothermal
        let levels = vec![
            level(400.0, 7000.0, 240.0),
            level(300.0, 9000.0, 228.0),
            level(250.0, 10_000.0, 222.0),
            level(200.0, 12_000.0, 222.0),
        ];
        let tropopause = find_tropopause(&levels, 2.0).unwrap();
        // Midpoints 9500 m (6 K/km) and 11000 m (0 K/km); 2 K/km is two thirds along
        assert!((tropopause.altitude_m - 10_500.0).abs() < 1e-6);
    }

    #[test]
    fn test_shallow_inversion_is_skipped() {
        let levels = vec![
            level(500.0, 5500.0, 250.0),
            level(450.0, 6000.0, 250.0),
            level(400.0, 7000.0, 240.0),
            level(300.0, 9000.0, 226.0),
            level(250.0, 10_000.0, 219.0),
            level(200.0, 12_000.0, 219.0),
            level(150.0, 14_000.0, 219.0),
        ];
        let tropopause = find_tropopause(&levels, 2.0).unwrap();
        // The isothermal 500-450 hPa layer is followed by 10 K/km cooling
        assert!(tropopause.altitude_m > 9000.0);
    }

    #[test]
    fn test_no_stratosphere() {
        let levels: Vec<LevelSample> = (0..6)
            .map(|k| level(500.0 - 50.0 * k as f64, 5500.0 + 1000.0 * k as f64, 250.0 - 6.5 * k as f64))
            .collect();
        assert!(find_tropopause(&levels, 2.0).is_none());
    }

    #[test]
    fn test_model_field_fallback() {
        let levels = isa_levels(&[1000.0, 850.0, 700.0, 500.0]);
        let column = Column {
            valid: wx_common::ValidTime::new(chrono::Utc::now(), 0),
            levels,
            surface: Default::default(),
            clouds: Vec::new(),
            model_tropopause: Some((220.0, Some(215.0))),
        };

        let tropopause = resolve_tropopause(&column, 2.0).unwrap();
        assert_eq!(tropopause.source, TropopauseSource::ModelField);
        assert_eq!(tropopause.pressure_hpa, 220.0);
        assert!((tropopause.altitude_m - pressure_to_altitude(220.0)).abs() < 1.0);

        let column = Column {
            model_tropopause: None,
            ..column
        };
        assert!(resolve_tropopause(&column, 2.0).is_none());
    }
}
