//! Report decoding against the sample fixtures.

use chrono::{DateTime, TimeZone, Utc};
use metar_parser::{
    decode_report, rwx_line, DistanceUnit, Intensity, Phenomenon, PressureUnit, ReportKind,
    VisibilityQualifier,
};
use test_utils::{assert_approx_eq, metar};
use wx_common::atmosphere::{feet_to_meters, meters_to_feet};
use wx_common::{CloudType, Coverage, DecodeError};

fn reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 12, 17, 0, 0).unwrap()
}

// ============================================================================
// Full reports
// ============================================================================

#[test]
fn test_basic_report() {
    let r = decode_report(metar::KXYZ_BASIC, reference()).unwrap();

    assert_eq!(r.station, "KXYZ");
    assert_eq!(r.kind, ReportKind::Metar);
    assert_eq!(r.observed_at, Utc.with_ymd_and_hms(2024, 3, 12, 16, 54, 0).unwrap());

    let wind = r.wind.unwrap();
    assert_eq!(wind.direction_deg, Some(270));
    assert_approx_eq!(wind.speed_kt, 15.0, 1e-9);
    assert_approx_eq!(wind.gust_kt.unwrap(), 25.0, 1e-9);
    assert!(wind.variable_range.is_none());

    let vis = r.visibility.unwrap();
    assert_eq!(vis.unit, DistanceUnit::StatuteMiles);
    assert_approx_eq!(vis.value, 10.0, 1e-9);

    let clouds = r.clouds.as_ref().unwrap();
    assert_eq!(clouds.len(), 2);
    assert_eq!(clouds[0].coverage, Coverage::Few);
    assert_approx_eq!(meters_to_feet(clouds[0].base_m), 3500.0, 1e-6);
    assert_eq!(clouds[1].coverage, Coverage::Overcast);
    assert_approx_eq!(meters_to_feet(clouds[1].base_m), 25000.0, 1e-6);

    assert_eq!(r.temperature_c, Some(15.0));
    assert_eq!(r.dewpoint_c, Some(8.0));

    let p = r.pressure.unwrap();
    assert_eq!(p.unit, PressureUnit::InchesHg);
    assert_approx_eq!(p.inhg(), 29.92, 1e-9);
    assert!(r.remarks.is_none());
}

#[test]
fn test_variable_wind_and_qnh() {
    let r = decode_report(metar::EGLL_VARIABLE, reference()).unwrap();

    let wind = r.wind.unwrap();
    assert_eq!(wind.direction_deg, Some(240));
    assert_eq!(wind.variable_range, Some((200, 280)));

    let vis = r.visibility.unwrap();
    assert_eq!(vis.qualifier, VisibilityQualifier::AtLeast);
    assert_approx_eq!(vis.meters(), 10_000.0, 1e-9);

    assert_eq!(r.weather.len(), 1);
    assert_eq!(r.weather[0].intensity, Intensity::Light);
    assert_eq!(r.weather[0].phenomena, vec![Phenomenon::Rain]);

    // SCT012 would reach into BKN025 with its default thickness
    let clouds = r.clouds.unwrap();
    assert_eq!(clouds.len(), 2);
    assert_approx_eq!(clouds[0].top_m, clouds[1].base_m, 1e-9);

    assert_approx_eq!(r.pressure.unwrap().hpa(), 1008.0, 1e-9);
}

#[test]
fn test_snow_with_rvr_and_remarks() {
    let r = decode_report(metar::CYYZ_SNOW, reference()).unwrap();

    let vis = r.visibility.unwrap();
    assert_approx_eq!(vis.value, 0.5, 1e-9);

    assert_eq!(r.rvr.len(), 1);
    assert_eq!(r.rvr[0].runway, "05");
    assert_approx_eq!(r.rvr[0].meters, feet_to_meters(2400.0), 1e-9);

    assert_eq!(r.weather[0].intensity, Intensity::Heavy);
    assert!(r.weather[0].phenomena[0].is_frozen());

    let clouds = r.clouds.as_ref().unwrap();
    assert_eq!(clouds[0].coverage, Coverage::Overcast);
    assert_approx_eq!(meters_to_feet(clouds[0].base_m), 800.0, 1e-6);
    assert_approx_eq!(r.ceiling_m().unwrap(), feet_to_meters(800.0), 1e-9);

    assert_eq!(r.temperature_c, Some(-5.0));
    assert_eq!(r.dewpoint_c, Some(-7.0));
    assert_eq!(r.remarks.as_deref(), Some("SN8 SLP061"));
}

#[test]
fn test_thunderstorm() {
    let r = decode_report(metar::KMIA_TS, reference()).unwrap();

    assert!(r.has_thunderstorm());
    let clouds = r.clouds.unwrap();
    assert_eq!(clouds[0].cloud_type, Some(CloudType::Cumulonimbus));
    assert!(clouds[0].convective);
    assert!(clouds[0].top_m <= clouds[1].base_m);
}

#[test]
fn test_cavok_and_mps() {
    let r = decode_report(metar::UUEE_CAVOK, reference()).unwrap();

    let vis = r.visibility.unwrap();
    assert!(vis.cavok);
    assert_eq!(r.clouds, Some(Vec::new()));
    assert_approx_eq!(r.wind.unwrap().speed_kt, 4.0 * 1.943_844, 1e-3);
    assert_eq!(r.temperature_c, Some(-12.0));
}

#[test]
fn test_sparse_automated_report() {
    let r = decode_report(metar::KAUT_SPARSE, reference()).unwrap();

    assert!(r.auto);
    assert!(r.wind.unwrap().is_calm());
    // Not reported stays unknown
    assert!(r.visibility.is_none());
    assert!(r.clouds.is_none());
    assert!(r.has_data());
}

#[test]
fn test_trend_is_ignored() {
    let r = decode_report(metar::LFPG_TEMPO, reference()).unwrap();

    assert_approx_eq!(r.visibility.unwrap().meters(), 6000.0, 1e-9);
    assert_eq!(r.clouds.unwrap().len(), 1);
    assert!(r.weather.is_empty());
}

// ============================================================================
// Grammar details
// ============================================================================

#[test]
fn test_speci_and_mixed_miles() {
    let r = decode_report("SPECI KXYZ 121654Z 31008KT 1 1/2SM BR OVC004 08/07 A3001", reference())
        .unwrap();
    assert_eq!(r.kind, ReportKind::Speci);
    assert_approx_eq!(r.visibility.unwrap().value, 1.5, 1e-9);
    assert_eq!(r.weather[0].phenomena, vec![Phenomenon::Mist]);
}

#[test]
fn test_explicit_clear_sky() {
    let r = decode_report("KXYZ 121654Z 00000KT 10SM SKC 20/05 A3010", reference()).unwrap();
    assert_eq!(r.clouds, Some(Vec::new()));
}

#[test]
fn test_precise_temperature_from_remarks() {
    let r = decode_report(
        "KXYZ 121654Z 27015KT 10SM CLR 15/08 A2992 RMK AO2 T01540083",
        reference(),
    )
    .unwrap();
    assert_approx_eq!(r.temperature_c.unwrap(), 15.4, 1e-9);
    assert_approx_eq!(r.dewpoint_c.unwrap(), 8.3, 1e-9);
}

#[test]
fn test_previous_month_day() {
    let reference = Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap();
    let r = decode_report("KXYZ 292350Z 27015KT", reference).unwrap();
    assert_eq!(r.observed_at, Utc.with_ymd_and_hms(2024, 2, 29, 23, 50, 0).unwrap());
}

#[test]
fn test_malformed_wind_group() {
    let err = decode_report("KXYZ 121654Z 27015GKT 10SM", reference()).unwrap_err();
    match err {
        DecodeError::UnparsableToken { token, .. } => assert_eq!(token, "27015GKT"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_out_of_range_direction() {
    let err = decode_report("KXYZ 121654Z 45015KT", reference()).unwrap_err();
    assert!(matches!(err, DecodeError::OutOfRangeValue { .. }));
}

#[test]
fn test_unknown_tokens_are_skipped() {
    let r = decode_report("KXYZ 121654Z 27015KT 10SM FEW035 15/08 A2992 WS R27", reference())
        .unwrap();
    assert!(r.wind.is_some());
}

// ============================================================================
// Legacy re-encoding
// ============================================================================

#[test]
fn test_rwx_line_matches_canonical_report() {
    let r = decode_report(metar::KXYZ_BASIC, reference()).unwrap();
    assert_eq!(rwx_line(&r), metar::KXYZ_BASIC);
}

#[test]
fn test_rwx_line_decodes_to_same_fields() {
    for text in [metar::EGLL_VARIABLE, metar::CYYZ_SNOW, metar::KMIA_TS, metar::UUEE_CAVOK] {
        let original = decode_report(text, reference()).unwrap();
        let line = rwx_line(&original);
        let again = decode_report(&line, reference()).unwrap();

        assert_eq!(again.station, original.station, "{}", line);
        assert_eq!(again.wind.map(|w| w.direction_deg), original.wind.map(|w| w.direction_deg));
        assert_eq!(again.temperature_c, original.temperature_c, "{}", line);
        assert_eq!(
            again.clouds.as_ref().map(|c| c.len()),
            original.clouds.as_ref().map(|c| c.len()),
            "{}",
            line
        );
    }
}
