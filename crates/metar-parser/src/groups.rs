//! Token-level grammar for report groups.
//!
//! Each parser consumes one whitespace-separated token completely or fails.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while_m_n},
    character::complete::{char, one_of},
    combinator::{all_consuming, map, map_opt, map_res, opt, value},
    multi::many0,
    sequence::{pair, preceded, tuple},
    IResult,
};

use wx_common::{CloudType, Coverage};

use crate::weather::{Descriptor, Intensity, Phenomenon, WeatherPhenomenon};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    Knots,
    MetersPerSecond,
    KilometersPerHour,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindGroup {
    /// `None` for variable (`VRB`)
    pub direction: Option<u16>,
    pub speed: u32,
    pub gust: Option<u32>,
    pub unit: SpeedUnit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisibilityGroup {
    Cavok,
    Meters(u32),
    /// Statute miles with an optional `P`/`M` qualifier
    StatuteMiles(Option<char>, f64),
    Kilometers(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RvrGroup {
    pub runway: String,
    pub qualifier: Option<char>,
    pub value: u32,
    pub max_value: Option<u32>,
    pub feet: bool,
    pub trend: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloudGroup {
    /// Explicit clear sky (`CLR`, `SKC`, `NSC`, `NCD`)
    Clear,
    Layer {
        coverage: Coverage,
        /// Hundreds of feet above ground, `None` for `///`
        height: Option<u32>,
        cloud_type: Option<CloudType>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PressureGroup {
    /// Hundredths of inHg
    Altimeter(u32),
    Qnh(u32),
}

fn digits<'a>(n: usize) -> impl FnMut(&'a str) -> IResult<&'a str, u32> {
    digits_between(n, n)
}

fn digits_between<'a>(min: usize, max: usize) -> impl FnMut(&'a str) -> IResult<&'a str, u32> {
    move |input: &'a str| {
        map_res(
            take_while_m_n(min, max, |c: char| c.is_ascii_digit()),
            str::parse::<u32>,
        )(input)
    }
}

fn two_letters(input: &str) -> IResult<&str, &str> {
    take_while_m_n(2, 2, |c: char| c.is_ascii_uppercase())(input)
}

/// Run a parser over a whole token.
pub fn parse_token<'a, O>(
    parser: impl FnMut(&'a str) -> IResult<&'a str, O>,
    token: &'a str,
) -> Option<O> {
    all_consuming(parser)(token).ok().map(|(_, out)| out)
}

pub fn station(input: &str) -> IResult<&str, &str> {
    map_opt(
        take_while_m_n(4, 4, |c: char| c.is_ascii_uppercase() || c.is_ascii_digit()),
        |id: &str| id.starts_with(|c: char| c.is_ascii_uppercase()).then_some(id),
    )(input)
}

/// `DDHHMMZ`
pub fn day_time(input: &str) -> IResult<&str, (u32, u32, u32)> {
    map(
        tuple((digits(2), digits(2), digits(2), char('Z'))),
        |(d, h, m, _)| (d, h, m),
    )(input)
}

pub fn wind(input: &str) -> IResult<&str, WindGroup> {
    map(
        tuple((
            alt((
                value(None, tag("VRB")),
                map(digits(3), |d| Some(d as u16)),
            )),
            digits_between(2, 3),
            opt(preceded(char('G'), digits_between(2, 3))),
            alt((
                value(SpeedUnit::Knots, tag("KT")),
                value(SpeedUnit::MetersPerSecond, tag("MPS")),
                value(SpeedUnit::KilometersPerHour, tag("KMH")),
            )),
        )),
        |(direction, speed, gust, unit)| WindGroup {
            direction,
            speed,
            gust,
            unit,
        },
    )(input)
}

/// Variable direction sector, `dddVddd`.
pub fn variable_sector(input: &str) -> IResult<&str, (u16, u16)> {
    map(tuple((digits(3), char('V'), digits(3))), |(a, _, b)| {
        (a as u16, b as u16)
    })(input)
}

fn fraction(input: &str) -> IResult<&str, f64> {
    map_opt(
        tuple((digits_between(1, 2), char('/'), digits_between(1, 2))),
        |(num, _, den)| (den != 0).then(|| num as f64 / den as f64),
    )(input)
}

pub fn visibility(input: &str) -> IResult<&str, VisibilityGroup> {
    alt((
        value(VisibilityGroup::Cavok, tag("CAVOK")),
        map(
            tuple((
                opt(one_of("PM")),
                alt((fraction, map(digits_between(1, 2), f64::from))),
                tag("SM"),
            )),
            |(q, v, _)| VisibilityGroup::StatuteMiles(q, v),
        ),
        map(pair(digits_between(1, 2), tag("KM")), |(v, _)| {
            VisibilityGroup::Kilometers(v)
        }),
        map(pair(digits(4), opt(tag("NDV"))), |(v, _)| {
            VisibilityGroup::Meters(v)
        }),
    ))(input)
}

/// Fractional statute miles completing a two-token group such as `1 1/2SM`.
pub fn visibility_fraction(input: &str) -> IResult<&str, f64> {
    map(pair(fraction, tag("SM")), |(v, _)| v)(input)
}

/// Whole miles preceding a fractional group.
pub fn whole_miles(input: &str) -> IResult<&str, u32> {
    digits(1)(input)
}

pub fn runway_visual_range(input: &str) -> IResult<&str, RvrGroup> {
    map(
        tuple((
            char('R'),
            digits(2),
            opt(one_of("LCR")),
            char('/'),
            opt(one_of("PM")),
            digits(4),
            opt(preceded(char('V'), preceded(opt(one_of("PM")), digits(4)))),
            opt(tag("FT")),
            opt(preceded(opt(char('/')), one_of("UDN"))),
        )),
        |(_, rwy, side, _, qualifier, value, max_value, ft, trend)| RvrGroup {
            runway: match side {
                Some(s) => format!("{:02}{}", rwy, s),
                None => format!("{:02}", rwy),
            },
            qualifier,
            value,
            max_value,
            feet: ft.is_some(),
            trend,
        },
    )(input)
}

pub fn weather(input: &str) -> IResult<&str, WeatherPhenomenon> {
    map_opt(
        tuple((
            opt(tag("RE")),
            opt(alt((
                value(Intensity::Light, char('-')),
                value(Intensity::Heavy, char('+')),
                value(Intensity::Vicinity, tag("VC")),
            ))),
            opt(map_opt(two_letters, Descriptor::from_code)),
            many0(map_opt(two_letters, Phenomenon::from_code)),
        )),
        |(recent, intensity, descriptor, phenomena)| {
            if descriptor.is_none() && phenomena.is_empty() {
                return None;
            }
            Some(WeatherPhenomenon {
                intensity: intensity.unwrap_or(Intensity::Moderate),
                descriptor,
                phenomena,
                recent: recent.is_some(),
            })
        },
    )(input)
}

pub fn cloud(input: &str) -> IResult<&str, CloudGroup> {
    alt((
        value(
            CloudGroup::Clear,
            alt((tag("CLR"), tag("SKC"), tag("NSC"), tag("NCD"))),
        ),
        map(
            tuple((
                map_opt(
                    alt((tag("FEW"), tag("SCT"), tag("BKN"), tag("OVC"), tag("VV"))),
                    Coverage::from_code,
                ),
                alt((map(digits(3), Some), value(None, tag("///")))),
                opt(alt((
                    map(map_opt(alt((tag("CB"), tag("TCU"))), CloudType::from_code), Some),
                    value(None, tag("///")),
                ))),
            )),
            |(coverage, height, cloud_type)| CloudGroup::Layer {
                coverage,
                height,
                cloud_type: cloud_type.flatten(),
            },
        ),
    ))(input)
}

fn signed_temperature(input: &str) -> IResult<&str, i32> {
    map(pair(opt(char('M')), digits(2)), |(minus, v)| {
        if minus.is_some() {
            -(v as i32)
        } else {
            v as i32
        }
    })(input)
}

/// `TT/DD`, with the dew point optional (`15/`, `15///`).
pub fn temperature(input: &str) -> IResult<&str, (i32, Option<i32>)> {
    map(
        tuple((
            signed_temperature,
            char('/'),
            alt((map(signed_temperature, Some), value(None, opt(tag("//"))))),
        )),
        |(t, _, d)| (t, d),
    )(input)
}

pub fn pressure(input: &str) -> IResult<&str, PressureGroup> {
    alt((
        map(preceded(char('A'), digits(4)), PressureGroup::Altimeter),
        map(preceded(char('Q'), digits(4)), PressureGroup::Qnh),
    ))(input)
}

/// Remark group `TsTTTsDDD` with tenths of a degree.
pub fn precise_temperature(input: &str) -> IResult<&str, (f64, f64)> {
    map(
        tuple((char('T'), one_of("01"), digits(3), one_of("01"), digits(3))),
        |(_, ts, t, ds, d)| {
            let t = t as f64 / 10.0 * if ts == '1' { -1.0 } else { 1.0 };
            let d = d as f64 / 10.0 * if ds == '1' { -1.0 } else { 1.0 };
            (t, d)
        },
    )(input)
}

/// Whether a token has the shape of a known group, so that a failed parse is
/// an error rather than an unrecognised extension.
pub fn looks_like_group(token: &str) -> bool {
    let starts_digit = token.starts_with(|c: char| c.is_ascii_digit());
    let tail_digits = |prefix: &str| {
        token
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    };

    let wind_like = (starts_digit || token.starts_with("VRB"))
        && (token.ends_with("KT") || token.ends_with("MPS") || token.ends_with("KMH"));
    let miles_like =
        (starts_digit || token.starts_with('P') || token.starts_with('M')) && token.ends_with("SM");

    wind_like
        || miles_like
        || ["FEW", "SCT", "BKN", "OVC"]
            .iter()
            .any(|c| token.strip_prefix(c).is_some_and(|r| r.starts_with(|ch: char| ch.is_ascii_digit())))
        || tail_digits("A")
        || tail_digits("Q")
}
