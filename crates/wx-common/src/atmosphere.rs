//! Unit conversions and the ICAO standard atmosphere.

/// Standard sea-level pressure in hPa.
pub const ISA_SEA_LEVEL_HPA: f64 = 1013.25;
/// Standard sea-level temperature in Kelvin.
pub const ISA_SEA_LEVEL_K: f64 = 288.15;
/// Tropospheric lapse rate in K/m.
pub const ISA_LAPSE_RATE: f64 = 0.0065;
/// Altitude of the standard tropopause in meters.
pub const ISA_TROPOPAUSE_M: f64 = 11_000.0;

const GAS_CONSTANT_DRY_AIR: f64 = 287.053;
const GRAVITY: f64 = 9.806_65;
const KELVIN_OFFSET: f64 = 273.15;
const HPA_PER_INHG: f64 = 33.863_886_666_667;
const METERS_PER_FOOT: f64 = 0.3048;
const KNOTS_PER_MS: f64 = 1.943_844_492_440_6;
const METERS_PER_STATUTE_MILE: f64 = 1609.344;

pub fn ms_to_knots(ms: f64) -> f64 {
    ms * KNOTS_PER_MS
}

pub fn knots_to_ms(kt: f64) -> f64 {
    kt / KNOTS_PER_MS
}

pub fn kmh_to_knots(kmh: f64) -> f64 {
    ms_to_knots(kmh / 3.6)
}

pub fn feet_to_meters(ft: f64) -> f64 {
    ft * METERS_PER_FOOT
}

pub fn meters_to_feet(m: f64) -> f64 {
    m / METERS_PER_FOOT
}

pub fn statute_miles_to_meters(sm: f64) -> f64 {
    sm * METERS_PER_STATUTE_MILE
}

pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa / HPA_PER_INHG
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * HPA_PER_INHG
}

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - KELVIN_OFFSET
}

pub fn celsius_to_kelvin(c: f64) -> f64 {
    c + KELVIN_OFFSET
}

/// ISA temperature (K) at a pressure altitude in meters.
pub fn isa_temperature(altitude_m: f64) -> f64 {
    if altitude_m <= ISA_TROPOPAUSE_M {
        ISA_SEA_LEVEL_K - ISA_LAPSE_RATE * altitude_m
    } else {
        ISA_SEA_LEVEL_K - ISA_LAPSE_RATE * ISA_TROPOPAUSE_M
    }
}

/// Deviation of an observed temperature from ISA at the same altitude, in K.
pub fn isa_deviation(altitude_m: f64, temperature_k: f64) -> f64 {
    temperature_k - isa_temperature(altitude_m)
}

/// ISA pressure altitude in meters for a pressure in hPa.
pub fn pressure_to_altitude(hpa: f64) -> f64 {
    let exponent = GAS_CONSTANT_DRY_AIR * ISA_LAPSE_RATE / GRAVITY;
    let tropopause_hpa = altitude_to_pressure(ISA_TROPOPAUSE_M);

    if hpa >= tropopause_hpa {
        ISA_SEA_LEVEL_K / ISA_LAPSE_RATE * (1.0 - (hpa / ISA_SEA_LEVEL_HPA).powf(exponent))
    } else {
        let t = isa_temperature(ISA_TROPOPAUSE_M);
        ISA_TROPOPAUSE_M - GAS_CONSTANT_DRY_AIR * t / GRAVITY * (hpa / tropopause_hpa).ln()
    }
}

/// ISA pressure in hPa at a pressure altitude in meters.
pub fn altitude_to_pressure(altitude_m: f64) -> f64 {
    let exponent = GRAVITY / (GAS_CONSTANT_DRY_AIR * ISA_LAPSE_RATE);

    if altitude_m <= ISA_TROPOPAUSE_M {
        ISA_SEA_LEVEL_HPA * (1.0 - ISA_LAPSE_RATE * altitude_m / ISA_SEA_LEVEL_K).powf(exponent)
    } else {
        let base = ISA_SEA_LEVEL_HPA
            * (1.0 - ISA_LAPSE_RATE * ISA_TROPOPAUSE_M / ISA_SEA_LEVEL_K).powf(exponent);
        let t = isa_temperature(ISA_TROPOPAUSE_M);
        base * (-(GRAVITY * (altitude_m - ISA_TROPOPAUSE_M)) / (GAS_CONSTANT_DRY_AIR * t)).exp()
    }
}

/// Dew point (°C) from temperature (°C) and relative humidity (%), Magnus formula.
pub fn dewpoint_from_rh(temperature_c: f64, rh_percent: f64) -> f64 {
    const A: f64 = 17.625;
    const B: f64 = 243.04;
    let rh = rh_percent.clamp(1.0, 100.0) / 100.0;
    let gamma = rh.ln() + A * temperature_c / (B + temperature_c);
    B * gamma / (A - gamma)
}

/// Meteorological wind direction (degrees the wind blows FROM) and speed
/// from grid-relative u/v components.
pub fn wind_from_components(u: f64, v: f64) -> (f64, f64) {
    let speed = u.hypot(v);
    if speed == 0.0 {
        return (0.0, 0.0);
    }
    let direction = (-u).atan2(-v).to_degrees().rem_euclid(360.0);
    (direction, speed)
}

/// u/v components from a meteorological direction and speed.
pub fn components_from_wind(direction_deg: f64, speed: f64) -> (f64, f64) {
    let rad = direction_deg.to_radians();
    (-speed * rad.sin(), -speed * rad.cos())
}

/// Smallest absolute difference between two headings in degrees, `[0, 180]`.
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}
