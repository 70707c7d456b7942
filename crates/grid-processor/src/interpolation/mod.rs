//! Interpolation in space, pressure and time.

pub mod spatial;
pub mod temporal;
pub mod vertical;

pub use spatial::Stencil;
pub use temporal::{bracket_time, lerp_option, TimeBracket};
pub use vertical::{bracket_pressure, height_at_pressure, pressure_at_height, LevelBracket};
