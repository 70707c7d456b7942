//! Common types and utilities shared across the weather fusion crates.

pub mod atmosphere;
pub mod cloud;
pub mod error;
pub mod geo;
pub mod grid;
pub mod time;

pub use cloud::{CloudLayer, CloudType, Coverage};
pub use error::{DecodeError, IndexError, InterpolationError};
pub use geo::GeoPoint;
pub use grid::{CloudDeck, FieldKey, GridSnapshot, LatLonGrid, Level, ScanMode};
pub use time::ValidTime;

/// GRIB2 parameter short names used across the engine.
pub mod params {
    pub const TMP: &str = "TMP";
    pub const DPT: &str = "DPT";
    pub const RH: &str = "RH";
    pub const UGRD: &str = "UGRD";
    pub const VGRD: &str = "VGRD";
    pub const HGT: &str = "HGT";
    pub const PRES: &str = "PRES";
    pub const PRMSL: &str = "PRMSL";
    pub const LCDC: &str = "LCDC";
    pub const MCDC: &str = "MCDC";
    pub const HCDC: &str = "HCDC";
    pub const TCDC: &str = "TCDC";
    pub const CAPE: &str = "CAPE";
    pub const PRATE: &str = "PRATE";
    pub const VIS: &str = "VIS";
    pub const EDPARM: &str = "EDPARM";
}
