//! Synthetic atmosphere generators.
//!
//! These build `GridSnapshot`s with predictable, verifiable content so the
//! interpolation and fusion tests can assert exact or analytically known
//! values.

use wx_common::atmosphere::{altitude_to_pressure, isa_temperature, pressure_to_altitude};
use wx_common::grid::{CloudDeck, FieldKey, GridSnapshot, LatLonGrid, Level};
use wx_common::params;
use wx_common::ValidTime;

/// Pressure levels (hPa) of a coarse GFS-like column.
pub const STANDARD_LEVELS_HPA: [f64; 12] = [
    1000.0, 925.0, 850.0, 700.0, 500.0, 400.0, 300.0, 250.0, 200.0, 150.0, 100.0, 70.0,
];

/// Fill a grid with values from a function of (lat, lon).
pub fn field_from_fn(grid: &LatLonGrid, f: impl Fn(f64, f64) -> f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(grid.len());
    for j in 0..grid.nj {
        let lat = grid.lat_at(j);
        for i in 0..grid.ni {
            data.push(f(lat, grid.lon_at(i)));
        }
    }
    data
}

/// Creates a test grid with predictable values: `col * 1000 + row`.
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// A model cloud deck with cover in percent and bottom/top pressures in hPa.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticCloud {
    pub deck: CloudDeck,
    pub cover_percent: f32,
    pub bottom_hpa: f32,
    pub top_hpa: f32,
}

/// Horizontally uniform atmosphere following ISA, with optional tweaks.
#[derive(Debug, Clone)]
pub struct SyntheticAtmosphere {
    pub levels_hpa: Vec<f64>,
    /// Added to every ISA temperature
    pub temperature_offset_k: f64,
    /// Temperature change per degree of longitude, for spatial tests
    pub temperature_lon_gradient: f64,
    /// Wind components at the lowest level
    pub u_ms: f64,
    pub v_ms: f64,
    /// Added to `u` per kilometre of height (vertical shear)
    pub u_shear_per_km: f64,
    pub rh_percent: f64,
    pub msl_pressure_hpa: Option<f64>,
    pub surface_temperature_k: Option<f64>,
    pub clouds: Vec<SyntheticCloud>,
    /// Eddy dissipation parameter on every level, for turbulence products
    pub edr: Option<f32>,
}

impl SyntheticAtmosphere {
    /// ISA with a 10 m/s westerly and 50% humidity on the standard levels.
    pub fn standard() -> Self {
        Self {
            levels_hpa: STANDARD_LEVELS_HPA.to_vec(),
            temperature_offset_k: 0.0,
            temperature_lon_gradient: 0.0,
            u_ms: 10.0,
            v_ms: 0.0,
            u_shear_per_km: 0.0,
            rh_percent: 50.0,
            msl_pressure_hpa: Some(1013.25),
            surface_temperature_k: Some(288.15),
            clouds: Vec::new(),
            edr: None,
        }
    }

    pub fn with_temperature_offset(mut self, k: f64) -> Self {
        self.temperature_offset_k = k;
        self
    }

    pub fn with_wind(mut self, u_ms: f64, v_ms: f64) -> Self {
        self.u_ms = u_ms;
        self.v_ms = v_ms;
        self
    }

    pub fn with_shear(mut self, u_per_km: f64) -> Self {
        self.u_shear_per_km = u_per_km;
        self
    }

    pub fn with_cloud(mut self, deck: CloudDeck, cover_percent: f32, bottom_hpa: f32, top_hpa: f32) -> Self {
        self.clouds.push(SyntheticCloud {
            deck,
            cover_percent,
            bottom_hpa,
            top_hpa,
        });
        self
    }

    pub fn with_edr(mut self, edr: f32) -> Self {
        self.edr = Some(edr);
        self
    }

    /// Geopotential height (m) of a pressure level.
    pub fn height_of(&self, hpa: f64) -> f64 {
        pressure_to_altitude(hpa)
    }

    /// Temperature (K) at a pressure level at longitude zero.
    pub fn temperature_of(&self, hpa: f64) -> f64 {
        isa_temperature(pressure_to_altitude(hpa)) + self.temperature_offset_k
    }

    /// u component at a pressure level.
    pub fn u_of(&self, hpa: f64) -> f64 {
        let base = pressure_to_altitude(self.levels_hpa[0]);
        self.u_ms + self.u_shear_per_km * (pressure_to_altitude(hpa) - base) / 1000.0
    }

    pub fn build(&self, product: &str, valid: ValidTime, grid: LatLonGrid) -> GridSnapshot {
        let mut snapshot = GridSnapshot::new(product, valid, grid);
        let constant = |v: f64| vec![v as f32; grid.len()];

        for &hpa in &self.levels_hpa {
            let level = Level::isobaric_hpa(hpa);
            let t = self.temperature_of(hpa);
            let gradient = self.temperature_lon_gradient;
            let insert = |snap: &mut GridSnapshot, param: &str, values: Vec<f32>| {
                snap.insert_field(FieldKey::new(param, level), values)
                    .expect("synthetic field matches grid");
            };

            insert(&mut snapshot, params::HGT, constant(self.height_of(hpa)));
            insert(
                &mut snapshot,
                params::TMP,
                field_from_fn(&grid, |_, lon| (t + gradient * lon) as f32),
            );
            insert(&mut snapshot, params::UGRD, constant(self.u_of(hpa)));
            insert(&mut snapshot, params::VGRD, constant(self.v_ms));
            insert(&mut snapshot, params::RH, constant(self.rh_percent));
            if let Some(edr) = self.edr {
                insert(&mut snapshot, params::EDPARM, vec![edr; grid.len()]);
            }
        }

        if let Some(msl) = self.msl_pressure_hpa {
            snapshot
                .insert_field(FieldKey::new(params::PRMSL, Level::MeanSeaLevel), constant(msl * 100.0))
                .expect("synthetic field matches grid");
        }
        if let Some(t) = self.surface_temperature_k {
            snapshot
                .insert_field(FieldKey::new(params::TMP, Level::HeightAboveGround(2)), constant(t))
                .expect("synthetic field matches grid");
        }
        snapshot
            .insert_field(FieldKey::new(params::HGT, Level::Surface), constant(0.0))
            .expect("synthetic field matches grid");

        for cloud in &self.clouds {
            let mut put = |param: &str, level: Level, v: f32| {
                snapshot
                    .insert_field(FieldKey::new(param, level), vec![v; grid.len()])
                    .expect("synthetic field matches grid");
            };
            let cover_param = match cloud.deck {
                CloudDeck::Low => params::LCDC,
                CloudDeck::Middle => params::MCDC,
                CloudDeck::High => params::HCDC,
            };
            put(cover_param, Level::CloudLayer(cloud.deck), cloud.cover_percent);
            put(params::PRES, Level::CloudBottom(cloud.deck), cloud.bottom_hpa * 100.0);
            put(params::PRES, Level::CloudTop(cloud.deck), cloud.top_hpa * 100.0);
        }

        snapshot
    }
}

/// Pressure (hPa) at an ISA altitude, re-exported for test readability.
pub fn isa_pressure(altitude_m: f64) -> f64 {
    altitude_to_pressure(altitude_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_create_test_grid() {
        let grid = create_test_grid(10, 5);
        assert_eq!(grid.len(), 50);
        assert_eq!(grid[1], 1000.0);
        assert_eq!(grid[10], 1.0);
    }

    #[test]
    fn test_standard_atmosphere_snapshot() {
        let valid = ValidTime::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 0);
        let grid = LatLonGrid::global(10.0);
        let snap = SyntheticAtmosphere::standard().build("gfs", valid, grid);

        assert_eq!(snap.pressure_levels_hpa().len(), STANDARD_LEVELS_HPA.len());
        let t500 = snap.field(params::TMP, Level::isobaric_hpa(500.0)).unwrap();
        assert!((t500[0] as f64 - 251.9).abs() < 0.5);
    }
}
