//! Host adapter for the weather fusion engine.
//!
//! Watches a grid directory and an observation directory, decodes new files
//! on the blocking pool, and ticks the [`fusion::FusionEngine`] at a fixed
//! rate for a position taken from the command line or a recorded track.
//! Published states are written as JSON lines.

pub mod config;
pub mod output;
pub mod pipeline;
pub mod position;
pub mod scanner;
pub mod server;

pub use config::{FieldSet, ProductConfig, ServerConfig};
pub use output::StateWriter;
pub use pipeline::{JobOutcome, Pipeline, TickClock};
pub use position::{parse_position, PositionError, PositionFeed, TrackPoint};
pub use scanner::{DecodeJob, Scanner};
pub use server::WeatherServer;
