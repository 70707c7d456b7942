//! Regular lat/lon grids and decoded forecast snapshots.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::geo::{normalize_longitude, GeoPoint};
use crate::time::ValidTime;

/// Specification of a regular lat/lon grid in canonical order.
///
/// Canonical order is row-major (`j * ni + i`), with longitude increasing
/// eastward along a row. Latitude may run north-to-south (`dlat < 0`) or
/// south-to-north (`dlat > 0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLonGrid {
    /// Number of points along a parallel
    pub ni: usize,
    /// Number of points along a meridian
    pub nj: usize,
    /// Latitude of row 0
    pub lat0: f64,
    /// Longitude of column 0
    pub lon0: f64,
    /// Signed latitude step between rows
    pub dlat: f64,
    /// Positive longitude step between columns
    pub dlon: f64,
}

impl LatLonGrid {
    pub fn new(ni: usize, nj: usize, lat0: f64, lon0: f64, dlat: f64, dlon: f64) -> Self {
        Self {
            ni,
            nj,
            lat0,
            lon0,
            dlat,
            dlon,
        }
    }

    /// Global grid at a given resolution, north to south, starting at 0°E.
    pub fn global(resolution: f64) -> Self {
        let ni = (360.0 / resolution).round() as usize;
        let nj = (180.0 / resolution).round() as usize + 1;
        Self::new(ni, nj, 90.0, 0.0, -resolution, resolution)
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.ni * self.nj
    }

    pub fn is_empty(&self) -> bool {
        self.ni == 0 || self.nj == 0
    }

    pub fn lat_at(&self, j: usize) -> f64 {
        self.lat0 + j as f64 * self.dlat
    }

    pub fn lon_at(&self, i: usize) -> f64 {
        normalize_longitude(self.lon0 + i as f64 * self.dlon)
    }

    /// Whether columns wrap around the full circle of longitude.
    pub fn wraps_longitude(&self) -> bool {
        self.dlon > 0.0 && ((self.ni as f64) * self.dlon - 360.0).abs() < self.dlon * 0.5
    }

    /// Fractional column index of a longitude, measured eastward from `lon0`.
    ///
    /// Always in `[0, 360 / dlon)`; callers decide whether values past the
    /// last column are covered.
    pub fn fractional_column(&self, lon: f64) -> f64 {
        (lon - self.lon0).rem_euclid(360.0) / self.dlon
    }

    /// Fractional row index of a latitude (may be negative or past the last row).
    pub fn fractional_row(&self, lat: f64) -> f64 {
        (lat - self.lat0) / self.dlat
    }

    /// Whether a point lies within the grid's rows and columns, counting
    /// longitude wrap and the half-cell beyond the outermost rows that
    /// polar mirroring can fill.
    pub fn covers(&self, point: &GeoPoint) -> bool {
        if self.is_empty() {
            return false;
        }
        let x = self.fractional_column(point.lon);
        if !self.wraps_longitude() && x > (self.ni - 1) as f64 + 1e-9 {
            return false;
        }
        let y = self.fractional_row(point.lat);
        let last = (self.nj - 1) as f64;
        if (0.0..=last).contains(&y) {
            return true;
        }
        // Beyond the outermost row: only reachable when that row borders a pole
        let edge_lat = if y < 0.0 { self.lat_at(0) } else { self.lat_at(self.nj - 1) };
        self.wraps_longitude() && edge_lat.abs() + self.dlat.abs() >= 90.0 - 1e-9
    }

    pub fn index(&self, i: usize, j: usize) -> usize {
        j * self.ni + i
    }
}

/// Scan mode flags for grid data ordering.
///
/// Based on GRIB2 scanning mode (Flag Table 3.4).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanMode {
    /// +i direction: false = +x (east), true = -x (west)
    pub i_negative: bool,
    /// +j direction: false = -y (south), true = +y (north)
    pub j_positive: bool,
    /// Adjacent points: false = i direction, true = j direction
    pub j_consecutive: bool,
    /// Row scan direction alternates
    pub alternating_rows: bool,
}

impl ScanMode {
    /// Create from GRIB2 flag byte.
    pub fn from_grib2_flag(flag: u8) -> Self {
        Self {
            i_negative: (flag & 0x80) != 0,
            j_positive: (flag & 0x40) != 0,
            j_consecutive: (flag & 0x20) != 0,
            alternating_rows: (flag & 0x10) != 0,
        }
    }

    /// Reorder values stored in this scan mode into canonical row-major,
    /// eastward order. Row order (the sign of `dlat`) is left untouched.
    pub fn to_canonical(&self, values: Vec<f32>, ni: usize, nj: usize) -> Vec<f32> {
        if !self.i_negative && !self.j_consecutive && !self.alternating_rows {
            return values;
        }

        let mut out = vec![f32::NAN; ni * nj];
        for j in 0..nj {
            for i in 0..ni {
                let (row, col) = (j, i);
                let src = if self.j_consecutive {
                    let mut r = row;
                    if self.alternating_rows && col % 2 == 1 {
                        r = nj - 1 - r;
                    }
                    col * nj + r
                } else {
                    let mut c = col;
                    if self.alternating_rows && row % 2 == 1 {
                        c = ni - 1 - c;
                    }
                    row * ni + c
                };
                let dst_col = if self.i_negative { ni - 1 - i } else { i };
                if let Some(v) = values.get(src) {
                    out[j * ni + dst_col] = *v;
                }
            }
        }
        out
    }
}

/// Deck of a model cloud layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CloudDeck {
    Low,
    Middle,
    High,
}

/// Vertical level of a decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Surface,
    MeanSeaLevel,
    /// Isobaric surface, in Pa
    Isobaric(u32),
    /// Height above ground, in meters
    HeightAboveGround(u32),
    Tropopause,
    EntireAtmosphere,
    CloudBottom(CloudDeck),
    CloudTop(CloudDeck),
    CloudLayer(CloudDeck),
    /// Any other GRIB2 fixed-surface type with its scaled value
    Other(u8, i64),
}

impl Level {
    /// Isobaric level from hPa.
    pub fn isobaric_hpa(hpa: f64) -> Self {
        Self::Isobaric((hpa * 100.0).round() as u32)
    }

    /// Map a GRIB2 fixed-surface type (Code Table 4.5) and its value.
    pub fn from_grib2(surface_type: u8, value: f64) -> Self {
        match surface_type {
            1 => Self::Surface,
            7 => Self::Tropopause,
            10 | 200 => Self::EntireAtmosphere,
            100 => Self::Isobaric(value.round().max(0.0) as u32),
            101 => Self::MeanSeaLevel,
            103 => Self::HeightAboveGround(value.round().max(0.0) as u32),
            212 => Self::CloudBottom(CloudDeck::Low),
            213 => Self::CloudTop(CloudDeck::Low),
            214 => Self::CloudLayer(CloudDeck::Low),
            222 => Self::CloudBottom(CloudDeck::Middle),
            223 => Self::CloudTop(CloudDeck::Middle),
            224 => Self::CloudLayer(CloudDeck::Middle),
            232 => Self::CloudBottom(CloudDeck::High),
            233 => Self::CloudTop(CloudDeck::High),
            234 => Self::CloudLayer(CloudDeck::High),
            other => Self::Other(other, value.round() as i64),
        }
    }

    /// Pressure of an isobaric level in hPa.
    pub fn pressure_hpa(&self) -> Option<f64> {
        match self {
            Self::Isobaric(pa) => Some(*pa as f64 / 100.0),
            _ => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Surface => write!(f, "surface"),
            Self::MeanSeaLevel => write!(f, "mean sea level"),
            Self::Isobaric(pa) => write!(f, "{} mb", *pa as f64 / 100.0),
            Self::HeightAboveGround(m) => write!(f, "{} m above ground", m),
            Self::Tropopause => write!(f, "tropopause"),
            Self::EntireAtmosphere => write!(f, "entire atmosphere"),
            Self::CloudBottom(d) => write!(f, "{:?} cloud bottom", d),
            Self::CloudTop(d) => write!(f, "{:?} cloud top", d),
            Self::CloudLayer(d) => write!(f, "{:?} cloud layer", d),
            Self::Other(t, v) => write!(f, "level type {} value {}", t, v),
        }
    }
}

/// Key of one 2-D field within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldKey {
    /// Parameter short name (e.g. `TMP`, `UGRD`)
    pub parameter: String,
    pub level: Level,
}

impl FieldKey {
    pub fn new(parameter: impl Into<String>, level: Level) -> Self {
        Self {
            parameter: parameter.into(),
            level,
        }
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.parameter, self.level)
    }
}

/// One decoded forecast-hour grid: every requested (variable, level) slot
/// holds either a full 2-D array in native units or `None` when the source
/// file omitted it.
///
/// Built by the grid decoder and never mutated after it is published.
#[derive(Debug, Clone)]
pub struct GridSnapshot {
    /// Product family the snapshot belongs to (e.g. `gfs`, `wafs`)
    pub product: String,
    pub valid: ValidTime,
    pub grid: LatLonGrid,
    fields: HashMap<FieldKey, Option<Vec<f32>>>,
    /// Isobaric levels with data, in Pa, strictly decreasing
    pressure_levels: Vec<u32>,
}

impl GridSnapshot {
    pub fn new(product: impl Into<String>, valid: ValidTime, grid: LatLonGrid) -> Self {
        Self {
            product: product.into(),
            valid,
            grid,
            fields: HashMap::new(),
            pressure_levels: Vec::new(),
        }
    }

    /// Store a field. The array must match the grid size.
    pub fn insert_field(&mut self, key: FieldKey, values: Vec<f32>) -> Result<(), DecodeError> {
        if values.len() != self.grid.len() {
            return Err(DecodeError::malformed(format!(
                "field {} has {} values, grid has {}",
                key,
                values.len(),
                self.grid.len()
            )));
        }
        if let Level::Isobaric(pa) = key.level {
            if let Err(pos) = self.pressure_levels.binary_search_by(|p| pa.cmp(p)) {
                self.pressure_levels.insert(pos, pa);
            }
        }
        self.fields.insert(key, Some(values));
        Ok(())
    }

    /// Record a requested slot the source did not provide.
    pub fn mark_missing(&mut self, key: FieldKey) {
        self.fields.entry(key).or_insert(None);
    }

    /// Field values, or `None` when the slot is absent or missing.
    pub fn field(&self, parameter: &str, level: Level) -> Option<&[f32]> {
        self.fields
            .get(&FieldKey::new(parameter, level))
            .and_then(|v| v.as_deref())
    }

    /// Whether the slot was requested or present, even if it holds no data.
    pub fn has_slot(&self, key: &FieldKey) -> bool {
        self.fields.contains_key(key)
    }

    pub fn slots(&self) -> impl Iterator<Item = (&FieldKey, Option<&[f32]>)> {
        self.fields.iter().map(|(k, v)| (k, v.as_deref()))
    }

    pub fn field_count(&self) -> usize {
        self.fields.values().filter(|v| v.is_some()).count()
    }

    /// Isobaric levels holding data, in hPa, strictly decreasing
    /// (increasing altitude).
    pub fn pressure_levels_hpa(&self) -> Vec<f64> {
        self.pressure_levels.iter().map(|pa| *pa as f64 / 100.0).collect()
    }

    pub fn valid_time(&self) -> DateTime<Utc> {
        self.valid.valid_datetime()
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.valid.reference_time
    }
}
