//! Station catalogue in the fixed-column `stations.txt` layout.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wx_common::GeoPoint;

use crate::report::ObservationRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub icao: String,
    pub location: GeoPoint,
    pub elevation_m: f64,
}

#[derive(Debug, Clone, Default)]
pub struct StationCatalogue {
    stations: HashMap<String, Station>,
}

impl StationCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, station: Station) {
        self.stations.insert(station.icao.clone(), station);
    }

    pub fn get(&self, icao: &str) -> Option<&Station> {
        self.stations.get(icao)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Fill in a record's position and elevation from the catalogue.
    /// Returns false when the station is unknown and the record has no
    /// position of its own.
    pub fn locate(&self, record: &mut ObservationRecord) -> bool {
        if let Some(station) = self.get(&record.station) {
            record.location.get_or_insert(station.location);
            record.elevation_m.get_or_insert(station.elevation_m);
        }
        record.location.is_some()
    }
}

/// Parse the catalogue text. Lines that do not carry a usable station are
/// skipped.
pub fn parse_station_table(text: &str) -> StationCatalogue {
    let mut catalogue = StationCatalogue::new();
    let mut skipped = 0usize;

    for line in text.lines() {
        match parse_station_line(line) {
            Some(station) => catalogue.insert(station),
            None => skipped += 1,
        }
    }

    info!(stations = catalogue.len(), skipped = skipped, "Parsed station catalogue");
    catalogue
}

fn parse_station_line(line: &str) -> Option<Station> {
    if line.starts_with('!') || line.len() < 59 || !line.is_ascii() {
        return None;
    }
    let field = |from: usize, to: usize| line.get(from..to).map(str::trim);

    let icao = field(20, 24)?.trim_matches('"');
    if icao.len() != 4 || !icao.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let lat_deg: f64 = field(39, 41)?.parse().ok()?;
    let lat_min: f64 = field(42, 44)?.parse().ok()?;
    let lon_deg: f64 = field(47, 50)?.parse().ok()?;
    let lon_min: f64 = field(51, 53)?.parse().ok()?;
    if lat_min >= 60.0 || lon_min >= 60.0 {
        debug!(icao = icao, "Skipping station with invalid minutes");
        return None;
    }

    let lat_sign = match field(44, 45)? {
        "S" => -1.0,
        _ => 1.0,
    };
    let lon_sign = match field(53, 54)? {
        "W" => -1.0,
        _ => 1.0,
    };
    let elevation_m: f64 = field(55, 59)?.parse().ok()?;

    Some(Station {
        icao: icao.to_string(),
        location: GeoPoint::new(
            lat_sign * (lat_deg + lat_min / 60.0),
            lon_sign * (lon_deg + lon_min / 60.0),
        ),
        elevation_m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::stations::{sample_catalogue, station_line};

    #[test]
    fn test_parse_sample() {
        let catalogue = parse_station_table(&sample_catalogue());
        assert_eq!(catalogue.len(), 3);

        let den = catalogue.get("KDEN").unwrap();
        assert!((den.location.lat - (39.0 + 50.0 / 60.0)).abs() < 1e-9);
        assert!((den.location.lon + (104.0 + 40.0 / 60.0)).abs() < 1e-9);
        assert_eq!(den.elevation_m, 1655.0);

        let syd = catalogue.get("YSSY").unwrap();
        assert!(syd.location.lat < 0.0);
        assert!(syd.location.lon > 0.0);
    }

    #[test]
    fn test_skips_blank_icao_and_short_lines() {
        let text = [
            station_line("NO ICAO", "    ", 10, 0, 'N', 10, 0, 'E', 5),
            "short line".to_string(),
            station_line("   OK", "LFPG", 49, 0, 'N', 2, 33, 'E', 119),
        ]
        .join("\n");
        let catalogue = parse_station_table(&text);
        assert_eq!(catalogue.len(), 1);
        assert!(catalogue.get("LFPG").is_some());
    }
}
