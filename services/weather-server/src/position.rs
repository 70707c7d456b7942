//! Aircraft position sources for driving the tick outside a simulator.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fusion::AircraftPosition;
use wx_common::atmosphere::feet_to_meters;
use wx_common::GeoPoint;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("invalid position '{0}': expected lat,lon,altitude_ft")]
    Format(String),

    #[error("coordinate out of range in '{0}'")]
    OutOfRange(String),

    #[error("failed to read track: {0}")]
    Io(#[from] std::io::Error),

    #[error("track line {line}: {source}")]
    Track {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("track holds no points")]
    EmptyTrack,
}

/// Parse `lat,lon,altitude_ft` as given on the command line.
pub fn parse_position(text: &str) -> Result<AircraftPosition, PositionError> {
    let parts: Vec<f64> = text
        .split(',')
        .map(|p| f64::from_str(p.trim()))
        .collect::<Result<_, _>>()
        .map_err(|_| PositionError::Format(text.to_string()))?;

    let [lat, lon, altitude_ft] = parts[..] else {
        return Err(PositionError::Format(text.to_string()));
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=360.0).contains(&lon) {
        return Err(PositionError::OutOfRange(text.to_string()));
    }

    Ok(AircraftPosition::new(GeoPoint::new(lat, lon), feet_to_meters(altitude_ft)))
}

/// One line of a JSON-lines track. Without a time the tick runs at the
/// wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub position: AircraftPosition,
}

/// Supplies the position for each tick.
#[derive(Debug, Clone)]
pub enum PositionFeed {
    Fixed(AircraftPosition),
    /// Replays points in order, then holds the last one.
    Track { points: Vec<TrackPoint>, next: usize },
}

impl PositionFeed {
    pub fn load_track(path: &Path) -> Result<Self, PositionError> {
        Self::parse_track(&fs::read_to_string(path)?)
    }

    pub fn parse_track(text: &str) -> Result<Self, PositionError> {
        let mut points = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let point = serde_json::from_str(line).map_err(|source| PositionError::Track {
                line: index + 1,
                source,
            })?;
            points.push(point);
        }

        if points.is_empty() {
            return Err(PositionError::EmptyTrack);
        }
        Ok(Self::Track { points, next: 0 })
    }

    /// Position and time for the next tick.
    pub fn advance(&mut self) -> (AircraftPosition, DateTime<Utc>) {
        match self {
            Self::Fixed(position) => (*position, Utc::now()),
            Self::Track { points, next } => {
                let index = (*next).min(points.len() - 1);
                *next = (*next + 1).min(points.len());
                let point = &points[index];
                (point.position, point.time.unwrap_or_else(Utc::now))
            }
        }
    }

    /// The time the next [`advance`](Self::advance) will report.
    pub fn peek_time(&self) -> DateTime<Utc> {
        match self {
            Self::Fixed(_) => Utc::now(),
            Self::Track { points, next } => points
                .get((*next).min(points.len().saturating_sub(1)))
                .and_then(|p| p.time)
                .unwrap_or_else(Utc::now),
        }
    }

    /// Whether a track has handed out its last point.
    pub fn finished(&self) -> bool {
        match self {
            Self::Fixed(_) => false,
            Self::Track { points, next } => *next >= points.len(),
        }
    }
}
