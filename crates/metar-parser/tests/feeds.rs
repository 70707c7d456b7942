//! Provider feeds, station lookup and the legacy file sink.

use std::io::Write;

use chrono::{DateTime, TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use metar_parser::{
    decode_feed, decode_report, parse_station_table, write_rwx_file, ObservationSource,
    StationCatalogue, RWX_FILE_NAME,
};
use test_utils::stations::sample_catalogue;
use test_utils::{assert_approx_eq, feeds, metar, temp_test_dir};

fn reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 12, 17, 0, 0).unwrap()
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

// ============================================================================
// Feed splitting and decoding
// ============================================================================

#[test]
fn test_noaa_gzip_feed_carries_positions() {
    let body = gzip(feeds::NOAA_CSV);
    let batch = decode_feed(
        ObservationSource::Noaa,
        &body,
        reference(),
        &StationCatalogue::new(),
    )
    .unwrap();

    assert_eq!(batch.records.len(), 2);
    assert!(batch.rejected.is_empty());
    assert_eq!(batch.unlocated, 0);

    let den = &batch.records[0];
    assert_eq!(den.station, "KDEN");
    let loc = den.location.unwrap();
    assert_approx_eq!(loc.lat, 39.85, 1e-9);
    assert_approx_eq!(loc.lon, -104.65, 1e-9);
}

#[test]
fn test_noaa_quoted_fields() {
    let body = "No errors\n\
1 results\n\
raw_text,station_id,remarks,latitude,longitude,elevation_m\n\
\"KJFK 121651Z 31015KT 10SM FEW050 22/12 A2992\",KJFK,\"gusty, dry\",40.64,-73.76,4.0\n";

    let reports = ObservationSource::Noaa.split_feed(body.as_bytes()).unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.text, "KJFK 121651Z 31015KT 10SM FEW050 22/12 A2992");

    // The comma inside the quoted remarks does not shift later columns
    let loc = report.location.unwrap();
    assert_approx_eq!(loc.lat, 40.64, 1e-9);
    assert_approx_eq!(loc.lon, -73.76, 1e-9);
    assert_approx_eq!(report.elevation_m.unwrap(), 4.0, 1e-9);

    let batch = decode_feed(
        ObservationSource::Noaa,
        body.as_bytes(),
        reference(),
        &StationCatalogue::new(),
    )
    .unwrap();
    assert!(batch.rejected.is_empty());
    assert_eq!(batch.records[0].station, "KJFK");
}

#[test]
fn test_noaa_short_rows_keep_text() {
    let body = "raw_text,station_id,latitude,longitude\n\
KDEN 121653Z 36010KT 10SM FEW080 05/M03 A3012,KDEN\n";
    let reports = ObservationSource::Noaa.split_feed(body.as_bytes()).unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].location.is_none());
}

#[test]
fn test_noaa_plain_feed() {
    let reports = ObservationSource::Noaa
        .split_feed(feeds::NOAA_CSV.as_bytes())
        .unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports[1].text.starts_with("EGLL"));
}

#[test]
fn test_vatsim_feed_uses_catalogue() {
    let catalogue = parse_station_table(&sample_catalogue());
    let batch = decode_feed(
        ObservationSource::Vatsim,
        feeds::VATSIM_TEXT.as_bytes(),
        reference(),
        &catalogue,
    )
    .unwrap();

    assert_eq!(batch.records.len(), 2);
    let egll = batch.records.iter().find(|r| r.station == "EGLL").unwrap();
    assert_eq!(egll.elevation_m, Some(25.0));
    assert!(egll.location.unwrap().lon < 0.0);
}

#[test]
fn test_vatsim_feed_without_catalogue_is_unlocated() {
    let batch = decode_feed(
        ObservationSource::Vatsim,
        feeds::VATSIM_TEXT.as_bytes(),
        reference(),
        &StationCatalogue::new(),
    )
    .unwrap();

    assert!(batch.records.is_empty());
    assert_eq!(batch.unlocated, 2);
}

#[test]
fn test_ivao_feed() {
    let catalogue = parse_station_table(&sample_catalogue());
    let batch = decode_feed(
        ObservationSource::Ivao,
        feeds::IVAO_JSON.as_bytes(),
        reference(),
        &catalogue,
    )
    .unwrap();

    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].station, "KDEN");
}

#[test]
fn test_bad_reports_are_collected() {
    let body = "KDEN 121653Z 36010KT 10SM FEW080 05/M03 A3012\n\
                EGLL 121650Z 99912KT\n\
                garbage\n";
    let catalogue = parse_station_table(&sample_catalogue());
    let batch = decode_feed(ObservationSource::Vatsim, body.as_bytes(), reference(), &catalogue)
        .unwrap();

    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.rejected.len(), 2);
    assert_eq!(batch.rejected[0].0, "EGLL 121650Z 99912KT");
}

// ============================================================================
// Legacy file
// ============================================================================

#[test]
fn test_write_rwx_file() {
    let dir = temp_test_dir();
    let path = dir.path().join(RWX_FILE_NAME);

    let records: Vec<_> = [metar::KXYZ_BASIC, metar::EGLL_VARIABLE]
        .iter()
        .map(|t| decode_report(t, reference()).unwrap())
        .collect();

    let written = write_rwx_file(&path, &records).unwrap();
    assert_eq!(written, 2);

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], metar::KXYZ_BASIC);
    assert!(lines[1].starts_with("EGLL 121650Z 24012KT 200V280 9999 -RA"));
}

#[test]
fn test_write_rwx_file_replaces_previous_content() {
    let dir = temp_test_dir();
    let path = dir.path().join(RWX_FILE_NAME);
    std::fs::write(&path, "stale content\nmore stale content\n").unwrap();

    let record = decode_report(metar::KMIA_TS, reference()).unwrap();
    write_rwx_file(&path, [&record]).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.starts_with("KMIA "));

    // Only the target file remains; the temporary file was renamed over it
    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);
}
