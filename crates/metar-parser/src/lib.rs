//! Point observation decoder.
//!
//! Turns raw airport reports into [`ObservationRecord`]s, splits provider
//! feeds into reports, locates stations through the fixed-column catalogue
//! and writes the legacy `METAR.rwx` file.

pub mod feed;
pub mod groups;
pub mod legacy;
pub mod report;
pub mod stations;
pub mod weather;

use thiserror::Error;

pub use feed::{decode_feed, FeedBatch, ObservationSource, RawReport};
pub use legacy::{encode_report, rwx_line, write_rwx_file, RWX_FILE_NAME};
pub use report::{
    decode_report, DistanceUnit, ObservationRecord, Pressure, PressureUnit, ReportKind,
    RunwayVisualRange, Visibility, VisibilityQualifier, Wind,
};
pub use stations::{parse_station_table, Station, StationCatalogue};
pub use weather::{Descriptor, Intensity, Phenomenon, WeatherPhenomenon};

/// Errors reading feeds or writing the legacy file. Individual report
/// failures are [`wx_common::DecodeError`]s.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON feed: {0}")]
    Json(#[from] serde_json::Error),
}
