//! Vertical profile of one snapshot at one point.

use wx_common::atmosphere::{altitude_to_pressure, isa_temperature, pressure_to_altitude};
use wx_common::cloud::normalize_layers;
use wx_common::params;
use wx_common::{CloudDeck, CloudLayer, Coverage, GeoPoint, GridSnapshot, InterpolationError, Level, ValidTime};

use crate::interpolation::temporal::lerp_option;
use crate::interpolation::vertical::{self, bracket_pressure, lerp, LevelBracket};
use crate::interpolation::Stencil;
use crate::types::{LevelSample, SurfaceSample, VerticalTarget};

/// Every pressure level of a snapshot, resolved horizontally at one point.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub valid: ValidTime,
    /// Highest pressure first
    pub levels: Vec<LevelSample>,
    pub surface: SurfaceSample,
    /// Model cloud layers, altitudes above mean sea level
    pub clouds: Vec<CloudLayer>,
    /// Pressure (hPa) and temperature (K) of the snapshot's tropopause fields
    pub model_tropopause: Option<(f64, Option<f64>)>,
}

impl Column {
    /// Resolve every field of `snapshot` at `point`.
    ///
    /// Slots the snapshot lacks, or whose surrounding cells are all missing,
    /// stay `None` in the result.
    pub fn extract(snapshot: &GridSnapshot, point: &GeoPoint) -> Result<Self, InterpolationError> {
        let levels_hpa = snapshot.pressure_levels_hpa();
        if levels_hpa.is_empty() {
            return Err(InterpolationError::no_coverage(format!(
                "{} {} has no pressure levels",
                snapshot.product, snapshot.valid
            )));
        }

        let stencil = Stencil::new(&snapshot.grid, point)?;
        let scalar = |param: &str, level: Level| snapshot.field(param, level).and_then(|v| stencil.sample(v));
        let vector =
            |param: &str, level: Level| snapshot.field(param, level).and_then(|v| stencil.sample_vector(v));

        let levels = levels_hpa
            .iter()
            .map(|&p| {
                let level = Level::isobaric_hpa(p);
                LevelSample {
                    pressure_hpa: p,
                    height_m: scalar(params::HGT, level),
                    temperature_k: scalar(params::TMP, level),
                    u_ms: vector(params::UGRD, level),
                    v_ms: vector(params::VGRD, level),
                    rh_percent: scalar(params::RH, level),
                    edr: scalar(params::EDPARM, level),
                }
            })
            .collect();

        let surface = SurfaceSample {
            msl_pressure_hpa: scalar(params::PRMSL, Level::MeanSeaLevel).map(|pa| pa / 100.0),
            temperature_k: scalar(params::TMP, Level::HeightAboveGround(2)),
            dewpoint_k: scalar(params::DPT, Level::HeightAboveGround(2)),
            u_ms: vector(params::UGRD, Level::HeightAboveGround(10)),
            v_ms: vector(params::VGRD, Level::HeightAboveGround(10)),
            elevation_m: scalar(params::HGT, Level::Surface),
            cape_j_per_kg: scalar(params::CAPE, Level::Surface),
            precipitation_rate: scalar(params::PRATE, Level::Surface),
            visibility_m: scalar(params::VIS, Level::Surface),
        };

        let model_tropopause = scalar(params::PRES, Level::Tropopause)
            .map(|pa| (pa / 100.0, scalar(params::TMP, Level::Tropopause)));

        let mut column = Self {
            valid: snapshot.valid,
            levels,
            surface,
            clouds: Vec::new(),
            model_tropopause,
        };

        let mut clouds = Vec::new();
        for (cover_param, deck) in [
            (params::LCDC, CloudDeck::Low),
            (params::MCDC, CloudDeck::Middle),
            (params::HCDC, CloudDeck::High),
        ] {
            let cover = scalar(cover_param, Level::CloudLayer(deck));
            let bottom = scalar(params::PRES, Level::CloudBottom(deck));
            let top = scalar(params::PRES, Level::CloudTop(deck));
            if let (Some(cover), Some(bottom), Some(top)) = (cover, bottom, top) {
                if let Some(layer) = column.cloud_layer(cover, bottom / 100.0, top / 100.0) {
                    clouds.push(layer);
                }
            }
        }
        normalize_layers(&mut clouds);
        column.clouds = clouds;

        Ok(column)
    }

    /// Model cloud deck from cover (%) and bottom/top pressures (hPa).
    fn cloud_layer(&self, cover_percent: f64, bottom_hpa: f64, top_hpa: f64) -> Option<CloudLayer> {
        let coverage = Coverage::from_fraction(cover_percent / 100.0);
        if coverage == Coverage::Clear || bottom_hpa <= 0.0 || top_hpa <= 0.0 {
            return None;
        }
        let a = self.height_at_pressure(bottom_hpa);
        let b = self.height_at_pressure(top_hpa);
        Some(CloudLayer {
            base_m: a.min(b),
            top_m: a.max(b),
            coverage,
            cloud_type: None,
            convective: false,
        })
    }

    /// (pressure, height) pairs of levels with a geopotential height, heights
    /// strictly increasing.
    fn height_column(&self) -> Vec<(f64, f64)> {
        let mut column: Vec<(f64, f64)> = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            let Some(h) = level.height_m else { continue };
            if column.last().map_or(true, |&(_, prev)| h > prev) {
                column.push((level.pressure_hpa, h));
            }
        }
        column
    }

    /// Geometric height (m) of a pressure. Without any height field the
    /// standard atmosphere is used.
    pub fn height_at_pressure(&self, pressure_hpa: f64) -> f64 {
        vertical::height_at_pressure(&self.height_column(), pressure_hpa)
            .unwrap_or_else(|| pressure_to_altitude(pressure_hpa))
    }

    /// Pressure (hPa) at a geometric height.
    pub fn pressure_at_height(&self, height_m: f64) -> f64 {
        vertical::pressure_at_height(&self.height_column(), height_m)
            .unwrap_or_else(|| altitude_to_pressure(height_m))
    }

    /// Values at an arbitrary pressure.
    ///
    /// A pressure equal to a column level returns that level unchanged.
    /// Between levels every field is interpolated in `ln p` and is only known
    /// when both levels know it. Outside the column, temperature follows the
    /// standard lapse rate from the end level and the other fields hold.
    pub fn sample_pressure(&self, pressure_hpa: f64) -> LevelSample {
        let pressures: Vec<f64> = self.levels.iter().map(|l| l.pressure_hpa).collect();

        match bracket_pressure(&pressures, pressure_hpa) {
            Some(LevelBracket::Exact(k)) => self.levels[k].clone(),
            Some(LevelBracket::Between { lower, weight }) => {
                let a = &self.levels[lower];
                let b = &self.levels[lower + 1];
                let mix = |x: Option<f64>, y: Option<f64>| Some(lerp(x?, y?, weight));
                LevelSample {
                    pressure_hpa,
                    height_m: Some(self.height_at_pressure(pressure_hpa)),
                    temperature_k: mix(a.temperature_k, b.temperature_k),
                    u_ms: mix(a.u_ms, b.u_ms),
                    v_ms: mix(a.v_ms, b.v_ms),
                    rh_percent: mix(a.rh_percent, b.rh_percent),
                    edr: mix(a.edr, b.edr),
                }
            }
            Some(LevelBracket::BelowColumn) => self.extrapolate(&self.levels[0], pressure_hpa),
            Some(LevelBracket::AboveColumn) => {
                self.extrapolate(&self.levels[self.levels.len() - 1], pressure_hpa)
            }
            None => LevelSample {
                height_m: Some(self.height_at_pressure(pressure_hpa)),
                ..LevelSample::empty(pressure_hpa)
            },
        }
    }

    fn extrapolate(&self, end: &LevelSample, pressure_hpa: f64) -> LevelSample {
        let isa_shift = isa_temperature(pressure_to_altitude(pressure_hpa))
            - isa_temperature(pressure_to_altitude(end.pressure_hpa));
        LevelSample {
            pressure_hpa,
            height_m: Some(self.height_at_pressure(pressure_hpa)),
            temperature_k: end.temperature_k.map(|t| t + isa_shift),
            u_ms: end.u_ms,
            v_ms: end.v_ms,
            rh_percent: end.rh_percent,
            edr: None,
        }
    }

    /// Values at a pressure or at a geometric altitude.
    pub fn sample(&self, target: VerticalTarget) -> LevelSample {
        match target {
            VerticalTarget::Pressure(hpa) => self.sample_pressure(hpa),
            VerticalTarget::Altitude(z) => {
                let mut sample = self.sample_pressure(self.pressure_at_height(z));
                sample.height_m = Some(z);
                sample
            }
        }
    }

    /// Eddy dissipation at a pressure, interpolated only between levels
    /// that carry it.
    pub fn edr_at(&self, pressure_hpa: f64) -> Option<f64> {
        let known: Vec<(f64, f64)> = self
            .levels
            .iter()
            .filter_map(|l| Some((l.pressure_hpa, l.edr?)))
            .collect();
        let pressures: Vec<f64> = known.iter().map(|(p, _)| *p).collect();

        match bracket_pressure(&pressures, pressure_hpa)? {
            LevelBracket::Exact(k) => Some(known[k].1),
            LevelBracket::Between { lower, weight } => Some(lerp(known[lower].1, known[lower + 1].1, weight)),
            LevelBracket::BelowColumn | LevelBracket::AboveColumn => None,
        }
    }

    /// Copy eddy dissipation from a turbulence-product column onto matching
    /// pressures of this column.
    pub fn attach_edr(&mut self, turbulence: &Column) {
        for level in &mut self.levels {
            if let Some(edr) = turbulence.edr_at(level.pressure_hpa) {
                level.edr = Some(edr);
            }
        }
    }

    /// Blend towards `later` by `weight` (0 keeps `self`).
    ///
    /// Levels follow `self`; `later` is sampled at the same pressures. Cloud
    /// layers are not blended but taken from whichever column is nearer.
    pub fn blend(&self, later: &Column, weight: f64) -> Column {
        let levels = self
            .levels
            .iter()
            .map(|a| {
                let b = later.sample_pressure(a.pressure_hpa);
                LevelSample {
                    pressure_hpa: a.pressure_hpa,
                    height_m: lerp_option(a.height_m, b.height_m, weight),
                    temperature_k: lerp_option(a.temperature_k, b.temperature_k, weight),
                    u_ms: lerp_option(a.u_ms, b.u_ms, weight),
                    v_ms: lerp_option(a.v_ms, b.v_ms, weight),
                    rh_percent: lerp_option(a.rh_percent, b.rh_percent, weight),
                    edr: lerp_option(a.edr, b.edr, weight),
                }
            })
            .collect();

        let (s, l) = (&self.surface, &later.surface);
        let surface = SurfaceSample {
            msl_pressure_hpa: lerp_option(s.msl_pressure_hpa, l.msl_pressure_hpa, weight),
            temperature_k: lerp_option(s.temperature_k, l.temperature_k, weight),
            dewpoint_k: lerp_option(s.dewpoint_k, l.dewpoint_k, weight),
            u_ms: lerp_option(s.u_ms, l.u_ms, weight),
            v_ms: lerp_option(s.v_ms, l.v_ms, weight),
            elevation_m: lerp_option(s.elevation_m, l.elevation_m, weight),
            cape_j_per_kg: lerp_option(s.cape_j_per_kg, l.cape_j_per_kg, weight),
            precipitation_rate: lerp_option(s.precipitation_rate, l.precipitation_rate, weight),
            visibility_m: lerp_option(s.visibility_m, l.visibility_m, weight),
        };

        let model_tropopause = match (self.model_tropopause, later.model_tropopause) {
            (Some((p0, t0)), Some((p1, t1))) => Some((lerp(p0, p1, weight), lerp_option(t0, t1, weight))),
            (a, b) => a.or(b),
        };

        let nearer = if weight < 0.5 { self } else { later };
        Column {
            valid: nearer.valid,
            levels,
            surface,
            clouds: nearer.clouds.clone(),
            model_tropopause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use test_utils::{assert_approx_eq, SyntheticAtmosphere};
    use wx_common::{FieldKey, LatLonGrid};

    fn valid(hour: u32) -> ValidTime {
        ValidTime::new(Utc.with_ymd_and_hms(2024, 3, 12, 0, 0, 0).unwrap(), hour)
    }

    fn column(atmosphere: &SyntheticAtmosphere) -> Column {
        let snapshot = atmosphere.build("gfs", valid(0), LatLonGrid::global(5.0));
        Column::extract(&snapshot, &GeoPoint::new(47.3, 8.5)).unwrap()
    }

    #[test]
    fn test_exact_level_values() {
        let atmosphere = SyntheticAtmosphere::standard().with_temperature_offset(3.0);
        let col = column(&atmosphere);

        let sample = col.sample(VerticalTarget::Pressure(500.0));
        assert_eq!(sample.pressure_hpa, 500.0);
        assert_approx_eq!(sample.temperature_k.unwrap(), atmosphere.temperature_of(500.0), 1e-4);
        assert_approx_eq!(sample.u_ms.unwrap(), 10.0, 1e-9);
        assert_eq!(sample, col.levels[4]);
    }

    #[test]
    fn test_altitude_target() {
        let col = column(&SyntheticAtmosphere::standard());
        let sample = col.sample(VerticalTarget::Altitude(3000.0));

        assert_eq!(sample.height_m, Some(3000.0));
        assert!((sample.pressure_hpa - altitude_to_pressure(3000.0)).abs() < 2.0);
        assert!((sample.temperature_k.unwrap() - isa_temperature(3000.0)).abs() < 0.5);
    }

    #[test]
    fn test_extrapolates_below_lowest_level() {
        let col = column(&SyntheticAtmosphere::standard());
        let sample = col.sample_pressure(1013.25);

        assert!((sample.temperature_k.unwrap() - 288.15).abs() < 0.01);
        assert!(sample.height_m.unwrap().abs() < 1.0);
        assert_eq!(sample.edr, None);
    }

    #[test]
    fn test_missing_slot_stays_unknown() {
        let atmosphere = SyntheticAtmosphere::standard();
        let mut snapshot = atmosphere.build("gfs", valid(0), LatLonGrid::global(5.0));
        snapshot.mark_missing(FieldKey::new("DPT", Level::HeightAboveGround(2)));

        let col = Column::extract(&snapshot, &GeoPoint::new(0.0, 0.0)).unwrap();
        assert_eq!(col.surface.dewpoint_k, None);
        assert!(col.surface.temperature_k.is_some());
        assert_eq!(col.surface.msl_pressure_hpa, Some(1013.25));
    }

    #[test]
    fn test_grid_cloud_altitudes() {
        let atmosphere = SyntheticAtmosphere::standard().with_cloud(CloudDeck::Low, 80.0, 850.0, 700.0);
        let col = column(&atmosphere);

        assert_eq!(col.clouds.len(), 1);
        let layer = col.clouds[0];
        assert_eq!(layer.coverage, Coverage::Broken);
        assert!((layer.base_m - pressure_to_altitude(850.0)).abs() < 1.0);
        assert!((layer.top_m - pressure_to_altitude(700.0)).abs() < 1.0);
    }

    #[test]
    fn test_clear_deck_is_dropped() {
        let atmosphere = SyntheticAtmosphere::standard().with_cloud(CloudDeck::High, 2.0, 300.0, 250.0);
        assert!(column(&atmosphere).clouds.is_empty());
    }

    #[test]
    fn test_blend_midpoint() {
        let cold = column(&SyntheticAtmosphere::standard());
        let warm = column(&SyntheticAtmosphere::standard().with_temperature_offset(4.0).with_wind(20.0, 0.0));

        let mid = cold.blend(&warm, 0.5);
        let t_cold = cold.levels[2].temperature_k.unwrap();
        assert!((mid.levels[2].temperature_k.unwrap() - (t_cold + 2.0)).abs() < 1e-4);
        assert!((mid.levels[2].u_ms.unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_edr_attachment() {
        let mut primary = column(&SyntheticAtmosphere::standard());
        let turbulence = column(&SyntheticAtmosphere::standard().with_edr(0.25));
        assert!(primary.levels.iter().all(|l| l.edr.is_none()));

        primary.attach_edr(&turbulence);
        for level in &primary.levels {
            assert_approx_eq!(level.edr.unwrap(), 0.25, 1e-9);
        }
    }

    #[test]
    fn test_model_tropopause_fields() {
        let atmosphere = SyntheticAtmosphere::standard();
        let mut snapshot = atmosphere.build("gfs", valid(0), LatLonGrid::global(5.0));
        let n = snapshot.grid.len();
        snapshot
            .insert_field(FieldKey::new("PRES", Level::Tropopause), vec![22_000.0; n])
            .unwrap();

        let col = Column::extract(&snapshot, &GeoPoint::new(10.0, 10.0)).unwrap();
        assert_eq!(col.model_tropopause, Some((220.0, None)));
    }
}
