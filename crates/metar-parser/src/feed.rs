//! Bulk feeds from the observation providers.
//!
//! Each provider delivers many reports in one body. [`ObservationSource`]
//! splits a body into raw reports; [`decode_feed`] decodes them and locates
//! each one.

use std::io::Read;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wx_common::{DecodeError, GeoPoint};

use crate::report::{decode_report, ObservationRecord};
use crate::stations::StationCatalogue;
use crate::FeedError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Observation provider, selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationSource {
    /// Aviation weather CSV cache, usually gzip-compressed
    #[default]
    Noaa,
    /// Plain text, one report per line
    Vatsim,
    /// JSON array of objects with a `metar` field
    Ivao,
}

impl std::str::FromStr for ObservationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noaa" => Ok(Self::Noaa),
            "vatsim" => Ok(Self::Vatsim),
            "ivao" => Ok(Self::Ivao),
            other => Err(format!("unknown observation source '{}'", other)),
        }
    }
}

impl std::fmt::Display for ObservationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Noaa => write!(f, "noaa"),
            Self::Vatsim => write!(f, "vatsim"),
            Self::Ivao => write!(f, "ivao"),
        }
    }
}

/// One undecoded report, with a position when the feed carries one.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReport {
    pub text: String,
    pub location: Option<GeoPoint>,
    pub elevation_m: Option<f64>,
}

impl RawReport {
    fn text(text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            location: None,
            elevation_m: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IvaoEntry {
    metar: Option<String>,
}

impl ObservationSource {
    /// Split a feed body into raw reports.
    pub fn split_feed(&self, body: &[u8]) -> Result<Vec<RawReport>, FeedError> {
        let text = if body.starts_with(&GZIP_MAGIC) {
            let mut decoded = String::new();
            GzDecoder::new(body)
                .read_to_string(&mut decoded)
                .map_err(FeedError::Io)?;
            decoded
        } else {
            String::from_utf8_lossy(body).into_owned()
        };

        let reports = match self {
            Self::Noaa => split_noaa_csv(&text),
            Self::Vatsim => text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(RawReport::text)
                .collect(),
            Self::Ivao => serde_json::from_str::<Vec<IvaoEntry>>(&text)?
                .into_iter()
                .filter_map(|e| e.metar)
                .filter(|m| !m.trim().is_empty())
                .map(|m| RawReport::text(&m))
                .collect(),
        };

        debug!(source = %self, reports = reports.len(), "Split feed");
        Ok(reports)
    }
}

/// CSV cache: a free-form preamble, then a header row naming the columns.
/// Columns are picked by header name; rows that fail to parse are skipped.
fn split_noaa_csv(text: &str) -> Vec<RawReport> {
    let Some(offset) = header_offset(text) else {
        warn!("NOAA feed has no header row");
        return Vec::new();
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text[offset..].as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            warn!(error = %e, "Failed to read NOAA header row");
            return Vec::new();
        }
    };
    let column = |name: &str| headers.iter().position(|h| h == name);
    let text_col = column("raw_text").unwrap_or(0);
    let lat_col = column("latitude");
    let lon_col = column("longitude");
    let elev_col = column("elevation_m");

    let mut reports = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!(row, error = %e, "Skipping malformed NOAA row");
                continue;
            }
        };
        let Some(text) = record.get(text_col).filter(|t| !t.is_empty()) else {
            continue;
        };
        let number = |col: Option<usize>| -> Option<f64> { record.get(col?)?.parse().ok() };
        let location = match (number(lat_col), number(lon_col)) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        reports.push(RawReport {
            text: text.to_string(),
            location,
            elevation_m: number(elev_col),
        });
    }
    reports
}

/// Byte offset of the header row, which starts with `raw_text`.
fn header_offset(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim_start_matches('\u{feff}').starts_with("raw_text") {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Result of decoding one feed.
#[derive(Debug, Default)]
pub struct FeedBatch {
    pub records: Vec<ObservationRecord>,
    pub rejected: Vec<(String, DecodeError)>,
    /// Decoded but without a known position
    pub unlocated: usize,
}

/// Decode every report of a feed and attach positions, from the feed itself
/// or from the station catalogue. Failed reports are collected, not fatal.
pub fn decode_feed(
    source: ObservationSource,
    body: &[u8],
    reference_time: DateTime<Utc>,
    catalogue: &StationCatalogue,
) -> Result<FeedBatch, FeedError> {
    let mut batch = FeedBatch::default();

    for raw in source.split_feed(body)? {
        match decode_report(&raw.text, reference_time) {
            Ok(mut record) => {
                record.location = raw.location;
                record.elevation_m = raw.elevation_m;
                if catalogue.locate(&mut record) {
                    batch.records.push(record);
                } else {
                    batch.unlocated += 1;
                }
            }
            Err(e) => {
                debug!(error = %e, report = %raw.text, "Rejected report");
                batch.rejected.push((raw.text, e));
            }
        }
    }

    info!(
        source = %source,
        decoded = batch.records.len(),
        rejected = batch.rejected.len(),
        unlocated = batch.unlocated,
        "Decoded observation feed"
    );
    Ok(batch)
}
