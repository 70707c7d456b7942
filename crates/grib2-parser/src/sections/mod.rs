//! GRIB2 section parsing.
//!
//! Each parse function takes the bytes of one section (starting at its
//! 4-byte length) and returns the decoded header. Locating sections inside
//! a message is the reader's job.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use wx_common::grid::{LatLonGrid, Level, ScanMode};

use crate::tables::Grib2Tables;
use crate::Grib2Error;

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone)]
pub struct GridDefinition {
    pub template: u16,
    pub num_data_points: u32,
    pub ni: u32,
    pub nj: u32,
    pub first_latitude_micro: i32,
    pub first_longitude_micro: i32,
    pub last_latitude_micro: i32,
    pub last_longitude_micro: i32,
    pub i_increment_micro: u32,
    pub j_increment_micro: u32,
    pub scanning_mode: u8,
}

impl GridDefinition {
    pub fn scan_mode(&self) -> ScanMode {
        ScanMode::from_grib2_flag(self.scanning_mode)
    }

    /// Canonical lat/lon description of this grid (eastward columns).
    pub fn to_lat_lon_grid(&self) -> Result<LatLonGrid, Grib2Error> {
        if self.template != 0 {
            return Err(Grib2Error::UnsupportedTemplate {
                section: 3,
                template: self.template,
            });
        }
        if self.ni == 0 || self.nj == 0 {
            return Err(Grib2Error::InvalidSection {
                section: 3,
                reason: format!("empty grid {}x{}", self.ni, self.nj),
            });
        }

        let scan = self.scan_mode();
        let la1 = self.first_latitude_micro as f64 / 1e6;
        let lo1 = self.first_longitude_micro as f64 / 1e6;
        let la2 = self.last_latitude_micro as f64 / 1e6;
        let lo2 = self.last_longitude_micro as f64 / 1e6;

        // Increments may be flagged missing (all ones); derive them from the corners
        let di = if self.i_increment_micro == u32::MAX || self.i_increment_micro == 0 {
            let span = if scan.i_negative { lo1 - lo2 } else { lo2 - lo1 };
            span.rem_euclid(360.0) / (self.ni.max(2) - 1) as f64
        } else {
            self.i_increment_micro as f64 / 1e6
        };
        let dj = if self.j_increment_micro == u32::MAX || self.j_increment_micro == 0 {
            (la2 - la1).abs() / (self.nj.max(2) - 1) as f64
        } else {
            self.j_increment_micro as f64 / 1e6
        };

        let dlat = if scan.j_positive { dj } else { -dj };
        // Canonical rows run eastward; a westward scan starts at the far end
        let lon0 = if scan.i_negative {
            lo1 - (self.ni - 1) as f64 * di
        } else {
            lo1
        };

        Ok(LatLonGrid::new(
            self.ni as usize,
            self.nj as usize,
            la1,
            lon0,
            dlat,
            di,
        ))
    }
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub parameter_short_name: String,
    pub level_type: u8,
    /// First fixed surface value after applying its scale factor
    pub level_value: f64,
    pub forecast_minutes: u32,
}

impl ProductDefinition {
    pub fn level(&self) -> Level {
        Level::from_grib2(self.level_type, self.level_value)
    }

    pub fn forecast_hour(&self) -> u32 {
        self.forecast_minutes / 60
    }
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub template: u16,
    /// Number of packed values (points not masked by the bitmap)
    pub num_data_points: u32,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Parsing Functions =====

/// Decode a GRIB2 sign-magnitude integer of 1 to 4 bytes.
///
/// GRIB2 stores signed values with the most significant bit as the sign and
/// the remaining bits as the magnitude, not in two's complement.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    let n = bytes.len().clamp(1, 4);
    let mut raw: u32 = 0;
    for b in &bytes[..n] {
        raw = (raw << 8) | *b as u32;
    }
    let sign_bit = 1u32 << (n * 8 - 1);
    let magnitude = (raw & (sign_bit - 1)) as i32;
    if raw & sign_bit != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn require_len(section: &[u8], number: u8, needed: usize) -> Result<(), Grib2Error> {
    if section.len() < needed {
        return Err(Grib2Error::InvalidSection {
            section: number,
            reason: format!("needs {} bytes, got {}", needed, section.len()),
        });
    }
    Ok(())
}

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::Truncated(
            "not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octet 7: discipline, octet 8: edition, octets 9-16: total length
    let discipline = data[6];
    let edition = data[7];

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "expected GRIB edition 2, got {}",
            edition
        )));
    }

    let message_length = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification)
pub fn parse_identification(section: &[u8]) -> Result<Identification, Grib2Error> {
    require_len(section, 1, 21)?;

    let year = read_u16(section, 12);
    let (month, day, hour, minute, second) =
        (section[14], section[15], section[16], section[17], section[18]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| Grib2Error::InvalidSection {
            section: 1,
            reason: format!(
                "invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ),
        })?;

    Ok(Identification {
        center: read_u16(section, 5),
        sub_center: read_u16(section, 7),
        significance_of_reference_time: section[11],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: section[19],
        data_type: section[20],
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(section: &[u8]) -> Result<GridDefinition, Grib2Error> {
    require_len(section, 3, 14)?;

    let num_data_points = read_u32(section, 6);
    let template = read_u16(section, 12);

    if template != 0 {
        // Other projections are carried through so the caller can report them
        return Ok(GridDefinition {
            template,
            num_data_points,
            ni: 0,
            nj: 0,
            first_latitude_micro: 0,
            first_longitude_micro: 0,
            last_latitude_micro: 0,
            last_longitude_micro: 0,
            i_increment_micro: 0,
            j_increment_micro: 0,
            scanning_mode: 0,
        });
    }

    // Template 3.0 starts at octet 15; offsets below are relative to it
    require_len(section, 3, 14 + 58)?;
    let gd = &section[14..];

    Ok(GridDefinition {
        template,
        num_data_points,
        ni: read_u32(gd, 16),
        nj: read_u32(gd, 20),
        first_latitude_micro: decode_grib2_signed(&gd[32..36]),
        first_longitude_micro: decode_grib2_signed(&gd[36..40]),
        last_latitude_micro: decode_grib2_signed(&gd[41..45]),
        last_longitude_micro: decode_grib2_signed(&gd[45..49]),
        i_increment_micro: read_u32(gd, 49),
        j_increment_micro: read_u32(gd, 53),
        scanning_mode: gd[57],
    })
}

/// Parse Section 4 (Product Definition).
///
/// Templates 4.0 to 4.15 share the layout of the first 34 octets, which is
/// all the engine reads.
pub fn parse_product_definition(
    section: &[u8],
    discipline: u8,
    tables: &Grib2Tables,
) -> Result<ProductDefinition, Grib2Error> {
    require_len(section, 4, 11)?;
    let template = read_u16(section, 7);
    if template > 15 {
        return Err(Grib2Error::UnsupportedTemplate { section: 4, template });
    }
    require_len(section, 4, 34)?;

    let parameter_category = section[9];
    let parameter_number = section[10];

    let time_unit = section[17];
    let forecast_time = read_u32(section, 18);
    let forecast_minutes = match time_unit {
        0 => forecast_time,
        1 => forecast_time * 60,
        2 => forecast_time * 1440,
        10 => forecast_time * 180,
        11 => forecast_time * 360,
        12 => forecast_time * 720,
        13 => forecast_time / 60,
        other => {
            return Err(Grib2Error::InvalidSection {
                section: 4,
                reason: format!("unsupported time range unit {}", other),
            })
        }
    };

    let level_type = section[22];
    let scale_factor = decode_grib2_signed(&section[23..24]);
    let scaled_value = read_u32(section, 24);
    // All ones marks a missing value
    let level_value = if scaled_value == u32::MAX {
        0.0
    } else {
        scaled_value as f64 / 10f64.powi(scale_factor)
    };

    Ok(ProductDefinition {
        template,
        parameter_category,
        parameter_number,
        parameter_short_name: tables.get_parameter_name(discipline, parameter_category, parameter_number),
        level_type,
        level_value,
        forecast_minutes,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(section: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    require_len(section, 5, 11)?;

    let num_data_points = read_u32(section, 5);
    let template = read_u16(section, 9);

    // Templates 5.0, 5.2, 5.3, 5.40 and 5.41 share octets 12-21
    let (reference_value, binary_scale_factor, decimal_scale_factor, bits_per_value, original_data_type) =
        if section.len() >= 21 {
            (
                f32::from_be_bytes([section[11], section[12], section[13], section[14]]),
                decode_grib2_signed(&section[15..17]) as i16,
                decode_grib2_signed(&section[17..19]) as i16,
                section[19],
                section[20],
            )
        } else {
            (0.0, 0, 0, 0, 0)
        };

    Ok(DataRepresentation {
        template,
        num_data_points,
        reference_value,
        binary_scale_factor,
        decimal_scale_factor,
        bits_per_value,
        original_data_type,
    })
}

/// Parse Section 6 (Bitmap)
pub fn parse_bitmap(section: &[u8]) -> Result<Bitmap, Grib2Error> {
    require_len(section, 6, 6)?;

    Ok(Bitmap {
        indicator: section[5],
        data: Bytes::copy_from_slice(&section[6..]),
    })
}

/// Parse Section 7 (Data)
pub fn parse_data_section(section: &[u8]) -> Result<DataSection, Grib2Error> {
    require_len(section, 7, 5)?;
    Ok(DataSection {
        data: Bytes::copy_from_slice(&section[5..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_signed_widths() {
        assert_eq!(decode_grib2_signed(&[0x81]), -1);
        assert_eq!(decode_grib2_signed(&[0x01]), 1);
        assert_eq!(decode_grib2_signed(&[0x80, 0x0A]), -10);
        assert_eq!(decode_grib2_signed(&[0x80, 0x00, 0x00, 0x01]), -1);
    }

    #[test]
    fn test_indicator_rejects_edition_1() {
        let mut data = b"GRIB".to_vec();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(&[0; 8]);
        assert!(matches!(parse_indicator(&data), Err(Grib2Error::InvalidFormat(_))));
    }

    #[test]
    fn test_indicator_short_input_is_truncated() {
        assert!(matches!(parse_indicator(b"GRIB"), Err(Grib2Error::Truncated(_))));
    }

    #[test]
    fn test_grid_definition_westward_scan() {
        let gd = GridDefinition {
            template: 0,
            num_data_points: 12,
            ni: 4,
            nj: 3,
            first_latitude_micro: 10_000_000,
            first_longitude_micro: 30_000_000,
            last_latitude_micro: 8_000_000,
            last_longitude_micro: 27_000_000,
            i_increment_micro: 1_000_000,
            j_increment_micro: 1_000_000,
            scanning_mode: 0x80,
        };
        let grid = gd.to_lat_lon_grid().unwrap();
        assert_eq!(grid.lon0, 27.0);
        assert_eq!(grid.dlon, 1.0);
        assert_eq!(grid.dlat, -1.0);
    }
}
