//! Observation records and the report decoder.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use wx_common::atmosphere::{
    feet_to_meters, hpa_to_inhg, inhg_to_hpa, kmh_to_knots, ms_to_knots, statute_miles_to_meters,
};
use wx_common::cloud::normalize_layers;
use wx_common::time::resolve_day_time;
use wx_common::{CloudLayer, DecodeError, GeoPoint};

use crate::groups::{self, parse_token, CloudGroup, PressureGroup, SpeedUnit, VisibilityGroup};
use crate::weather::WeatherPhenomenon;

/// Tokens that start a trend forecast; everything after them is dropped.
const TREND_MARKERS: [&str; 3] = ["TEMPO", "BECMG", "NOSIG"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    Metar,
    Speci,
}

/// Surface wind. Speeds are in knots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Direction the wind blows from; `None` when reported variable
    pub direction_deg: Option<u16>,
    pub speed_kt: f64,
    pub gust_kt: Option<f64>,
    /// Variable sector in degrees (`VRB` maps to the full circle)
    pub variable_range: Option<(u16, u16)>,
}

impl Wind {
    pub fn is_calm(&self) -> bool {
        self.speed_kt < 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    StatuteMiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisibilityQualifier {
    Exact,
    /// `P` prefix or `9999`
    AtLeast,
    /// `M` prefix
    LessThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Visibility {
    pub value: f64,
    pub unit: DistanceUnit,
    pub qualifier: VisibilityQualifier,
    pub cavok: bool,
}

impl Visibility {
    pub fn meters(&self) -> f64 {
        match self.unit {
            DistanceUnit::Meters => self.value,
            DistanceUnit::Kilometers => self.value * 1000.0,
            DistanceUnit::StatuteMiles => statute_miles_to_meters(self.value),
        }
    }

    fn cavok() -> Self {
        Self {
            value: 10_000.0,
            unit: DistanceUnit::Meters,
            qualifier: VisibilityQualifier::AtLeast,
            cavok: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureUnit {
    Hectopascal,
    InchesHg,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pressure {
    pub value: f64,
    pub unit: PressureUnit,
}

impl Pressure {
    pub fn hpa(&self) -> f64 {
        match self.unit {
            PressureUnit::Hectopascal => self.value,
            PressureUnit::InchesHg => inhg_to_hpa(self.value),
        }
    }

    pub fn inhg(&self) -> f64 {
        match self.unit {
            PressureUnit::Hectopascal => hpa_to_inhg(self.value),
            PressureUnit::InchesHg => self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunwayVisualRange {
    pub runway: String,
    pub meters: f64,
    pub qualifier: VisibilityQualifier,
    pub trend: Option<char>,
}

/// One decoded point observation.
///
/// Absent groups stay `None`. `clouds` is `Some(vec![])` only for an explicit
/// clear-sky report; layer altitudes are meters above the station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub station: String,
    pub kind: ReportKind,
    pub observed_at: DateTime<Utc>,
    pub location: Option<GeoPoint>,
    pub elevation_m: Option<f64>,
    pub auto: bool,
    pub corrected: bool,
    /// `NIL` report: the station sent no data
    pub nil: bool,
    pub wind: Option<Wind>,
    pub visibility: Option<Visibility>,
    pub rvr: Vec<RunwayVisualRange>,
    pub weather: Vec<WeatherPhenomenon>,
    pub clouds: Option<Vec<CloudLayer>>,
    pub temperature_c: Option<f64>,
    pub dewpoint_c: Option<f64>,
    pub pressure: Option<Pressure>,
    pub remarks: Option<String>,
    pub raw: String,
}

impl ObservationRecord {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.observed_at
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    /// Lowest broken or overcast base above the station.
    pub fn ceiling_m(&self) -> Option<f64> {
        self.clouds
            .as_ref()?
            .iter()
            .filter(|l| l.coverage.is_ceiling())
            .map(|l| l.base_m)
            .reduce(f64::min)
    }

    pub fn has_thunderstorm(&self) -> bool {
        self.current_weather().any(|w| w.is_thunderstorm())
    }

    /// Present weather, excluding recent (`RE`) groups.
    pub fn current_weather(&self) -> impl Iterator<Item = &WeatherPhenomenon> {
        self.weather.iter().filter(|w| !w.recent)
    }

    /// Whether any group carries data beyond the header.
    pub fn has_data(&self) -> bool {
        !self.nil
            && (self.wind.is_some()
                || self.visibility.is_some()
                || self.clouds.is_some()
                || self.temperature_c.is_some()
                || self.pressure.is_some())
    }
}

/// Decode one report. Day/hour/minute are resolved against `reference_time`.
///
/// Unrecognised tokens are skipped; a token shaped like a known group that
/// fails to parse is an error.
pub fn decode_report(
    text: &str,
    reference_time: DateTime<Utc>,
) -> Result<ObservationRecord, DecodeError> {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_ascii() { c } else { ' ' })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('=');

    let (body, remarks) = match cleaned.split_once(" RMK") {
        Some((body, rest)) => (body, Some(rest.trim().to_string())),
        None => (cleaned, None),
    };

    let mut tokens: Vec<&str> = body.split_whitespace().collect();
    if let Some(cut) = tokens.iter().position(|t| TREND_MARKERS.contains(t)) {
        tokens.truncate(cut);
    }
    let mut tokens = tokens.into_iter().peekable();

    let mut kind = ReportKind::Metar;
    let mut corrected = false;
    while let Some(&t) = tokens.peek() {
        match t {
            "METAR" => kind = ReportKind::Metar,
            "SPECI" => kind = ReportKind::Speci,
            "COR" => corrected = true,
            _ => break,
        }
        tokens.next();
    }

    let station_token = tokens
        .next()
        .ok_or_else(|| DecodeError::unparsable("", "empty report"))?;
    let station = parse_token(groups::station, station_token)
        .ok_or_else(|| DecodeError::unparsable(station_token, "expected station identifier"))?
        .to_string();

    let time_token = tokens
        .next()
        .ok_or_else(|| DecodeError::unparsable(cleaned, "missing observation time"))?;
    let (day, hour, minute) = parse_token(groups::day_time, time_token)
        .ok_or_else(|| DecodeError::unparsable(time_token, "expected DDHHMMZ"))?;
    let observed_at = resolve_day_time(day, hour, minute, reference_time)
        .ok_or_else(|| DecodeError::out_of_range("observation time", time_token))?;

    let mut record = ObservationRecord {
        station,
        kind,
        observed_at,
        location: None,
        elevation_m: None,
        auto: false,
        corrected,
        nil: false,
        wind: None,
        visibility: None,
        rvr: Vec::new(),
        weather: Vec::new(),
        clouds: None,
        temperature_c: None,
        dewpoint_c: None,
        pressure: None,
        remarks,
        raw: cleaned.to_string(),
    };

    while let Some(token) = tokens.next() {
        match token {
            "NIL" => {
                record.nil = true;
                break;
            }
            "AUTO" => {
                record.auto = true;
                continue;
            }
            "COR" => {
                record.corrected = true;
                continue;
            }
            _ => {}
        }

        if let Some(w) = parse_token(groups::wind, token) {
            if record.wind.is_none() {
                record.wind = Some(convert_wind(w)?);
            }
        } else if let Some((from, to)) = parse_token(groups::variable_sector, token) {
            if let Some(wind) = record.wind.as_mut() {
                wind.variable_range = Some((from, to));
            }
        } else if let Some(whole) = parse_token(groups::whole_miles, token) {
            // Two-token miles group: `1 1/2SM`
            let fraction = tokens
                .peek()
                .and_then(|next| parse_token(groups::visibility_fraction, *next));
            match fraction {
                Some(frac) => {
                    tokens.next();
                    record.visibility.get_or_insert(Visibility {
                        value: whole as f64 + frac,
                        unit: DistanceUnit::StatuteMiles,
                        qualifier: VisibilityQualifier::Exact,
                        cavok: false,
                    });
                }
                None => debug!(token = token, "Skipping stray digit"),
            }
        } else if let Some(vis) = parse_token(groups::visibility, token) {
            if vis == VisibilityGroup::Cavok {
                record.clouds.get_or_insert_with(Vec::new);
            }
            record.visibility.get_or_insert(convert_visibility(vis));
        } else if let Some(rvr) = parse_token(groups::runway_visual_range, token) {
            let meters = if rvr.feet {
                feet_to_meters(rvr.value as f64)
            } else {
                rvr.value as f64
            };
            record.rvr.push(RunwayVisualRange {
                runway: rvr.runway,
                meters,
                qualifier: qualifier_from(rvr.qualifier),
                trend: rvr.trend,
            });
        } else if let Some(group) = parse_token(groups::cloud, token) {
            let layers = record.clouds.get_or_insert_with(Vec::new);
            if let CloudGroup::Layer {
                coverage,
                height: Some(hundreds),
                cloud_type,
            } = group
            {
                let base = feet_to_meters(hundreds as f64 * 100.0);
                layers.push(CloudLayer::with_default_top(base, coverage, cloud_type));
            }
        } else if let Some((t, d)) = parse_token(groups::temperature, token) {
            record.temperature_c = Some(t as f64);
            record.dewpoint_c = d.map(f64::from);
        } else if let Some(p) = parse_token(groups::pressure, token) {
            if record.pressure.is_none() {
                record.pressure = Some(match p {
                    PressureGroup::Altimeter(v) => Pressure {
                        value: v as f64 / 100.0,
                        unit: PressureUnit::InchesHg,
                    },
                    PressureGroup::Qnh(v) => Pressure {
                        value: v as f64,
                        unit: PressureUnit::Hectopascal,
                    },
                });
            }
        } else if let Some(wx) = parse_token(groups::weather, token) {
            record.weather.push(wx);
        } else if groups::looks_like_group(token) {
            return Err(DecodeError::unparsable(token, "malformed group"));
        } else {
            debug!(station = %record.station, token = token, "Skipping unrecognised token");
        }
    }

    if let Some(remarks) = &record.remarks {
        if let Some((t, d)) = remarks
            .split_whitespace()
            .find_map(|tok| parse_token(groups::precise_temperature, tok))
        {
            record.temperature_c = Some(t);
            record.dewpoint_c = Some(d);
        }
    }

    if let Some(clouds) = record.clouds.as_mut() {
        normalize_layers(clouds);
    }

    validate(&record)?;
    Ok(record)
}

fn convert_wind(w: groups::WindGroup) -> Result<Wind, DecodeError> {
    if let Some(dir) = w.direction {
        if dir > 360 {
            return Err(DecodeError::out_of_range("wind direction", dir));
        }
    }
    let to_knots = |v: u32| match w.unit {
        SpeedUnit::Knots => v as f64,
        SpeedUnit::MetersPerSecond => ms_to_knots(v as f64),
        SpeedUnit::KilometersPerHour => kmh_to_knots(v as f64),
    };
    Ok(Wind {
        direction_deg: w.direction,
        speed_kt: to_knots(w.speed),
        gust_kt: w.gust.map(to_knots),
        variable_range: w.direction.is_none().then_some((0, 360)),
    })
}

fn qualifier_from(q: Option<char>) -> VisibilityQualifier {
    match q {
        Some('P') => VisibilityQualifier::AtLeast,
        Some('M') => VisibilityQualifier::LessThan,
        _ => VisibilityQualifier::Exact,
    }
}

fn convert_visibility(vis: VisibilityGroup) -> Visibility {
    match vis {
        VisibilityGroup::Cavok => Visibility::cavok(),
        VisibilityGroup::Meters(9999) => Visibility {
            value: 10_000.0,
            unit: DistanceUnit::Meters,
            qualifier: VisibilityQualifier::AtLeast,
            cavok: false,
        },
        VisibilityGroup::Meters(m) => Visibility {
            value: m as f64,
            unit: DistanceUnit::Meters,
            qualifier: VisibilityQualifier::Exact,
            cavok: false,
        },
        VisibilityGroup::Kilometers(km) => Visibility {
            value: km as f64,
            unit: DistanceUnit::Kilometers,
            qualifier: VisibilityQualifier::Exact,
            cavok: false,
        },
        VisibilityGroup::StatuteMiles(q, sm) => Visibility {
            value: sm,
            unit: DistanceUnit::StatuteMiles,
            qualifier: qualifier_from(q),
            cavok: false,
        },
    }
}

fn validate(record: &ObservationRecord) -> Result<(), DecodeError> {
    if let Some(wind) = &record.wind {
        if wind.speed_kt > 250.0 {
            return Err(DecodeError::out_of_range("wind speed", wind.speed_kt));
        }
        if let Some(gust) = wind.gust_kt {
            if gust > 300.0 {
                return Err(DecodeError::out_of_range("wind gust", gust));
            }
        }
    }
    if let Some(t) = record.temperature_c {
        if !(-90.0..=60.0).contains(&t) {
            return Err(DecodeError::out_of_range("temperature", t));
        }
    }
    if let Some(d) = record.dewpoint_c {
        if !(-90.0..=60.0).contains(&d) {
            return Err(DecodeError::out_of_range("dew point", d));
        }
    }
    if let Some(p) = &record.pressure {
        let hpa = p.hpa();
        if !(850.0..=1100.0).contains(&hpa) {
            return Err(DecodeError::out_of_range("pressure", p.value));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 17, 0, 0).unwrap()
    }

    #[test]
    fn test_header_only() {
        let r = decode_report("KXYZ 121654Z", reference()).unwrap();
        assert_eq!(r.station, "KXYZ");
        assert!(!r.has_data());
        assert!(r.clouds.is_none());
    }

    #[test]
    fn test_nil_report() {
        let r = decode_report("KXYZ 121654Z NIL", reference()).unwrap();
        assert!(r.nil);
        assert!(!r.has_data());
    }

    #[test]
    fn test_bad_station() {
        let err = decode_report("12 121654Z", reference()).unwrap_err();
        assert!(matches!(err, DecodeError::UnparsableToken { .. }));
    }

    #[test]
    fn test_bad_time() {
        let err = decode_report("KXYZ 1216Z", reference()).unwrap_err();
        assert!(matches!(err, DecodeError::UnparsableToken { .. }));

        let err = decode_report("KXYZ 122554Z", reference()).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRangeValue { .. }));
    }

    #[test]
    fn test_pressure_out_of_range() {
        let err = decode_report("KXYZ 121654Z 27015KT A1992", reference()).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRangeValue { .. }));
    }

    #[test]
    fn test_ceiling() {
        let r = decode_report("KXYZ 121654Z FEW010 BKN030 OVC050", reference()).unwrap();
        let ceiling = r.ceiling_m().unwrap();
        assert!((ceiling - feet_to_meters(3000.0)).abs() < 1e-6);
    }
}
