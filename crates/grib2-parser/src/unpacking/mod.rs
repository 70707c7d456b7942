//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0), used by GFS and WAFS pressure-level
//! products, is decoded natively. Other templates go through the `grib`
//! crate.

use std::io::Cursor;

use crate::Grib2Error;

/// Unpack simple packed GRIB2 data onto the full grid.
///
/// Formula: value = (R + X * 2^E) * 10^(-D). Only points set in the bitmap
/// have a packed value; the others come back as NaN.
pub fn unpack_simple(
    packed_data: &[u8],
    num_grid_points: usize,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<f32>, Grib2Error> {
    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let bits = bits_per_value as usize;

    if bits > 32 {
        return Err(Grib2Error::UnpackingError(format!(
            "invalid bits per value: {}",
            bits
        )));
    }

    let mut values = Vec::with_capacity(num_grid_points);
    let mut bit_position = 0usize;

    for i in 0..num_grid_points {
        if let Some(bm) = bitmap {
            let byte = bm.get(i / 8).ok_or_else(|| {
                Grib2Error::Truncated(format!("bitmap shorter than {} points", num_grid_points))
            })?;
            if (byte >> (7 - (i % 8))) & 1 == 0 {
                values.push(f32::NAN);
                continue;
            }
        }

        let packed_value = if bits == 0 {
            0
        } else {
            let v = extract_bits(packed_data, bit_position, bits)?;
            bit_position += bits;
            v
        };

        let value = (reference_value as f64 + packed_value as f64 * binary_scale) * decimal_scale;
        values.push(value as f32);
    }

    Ok(values)
}

/// Extract `num_bits` bits MSB-first starting at `start_bit`.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, Grib2Error> {
    let end_bit = start_bit + num_bits;
    if end_bit.div_ceil(8) > data.len() {
        return Err(Grib2Error::Truncated(format!(
            "data section ends at bit {}, need bit {}",
            data.len() * 8,
            end_bit
        )));
    }

    let mut result = 0u32;
    for absolute_bit in start_bit..end_bit {
        let bit = (data[absolute_bit / 8] >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | bit as u32;
    }
    Ok(result)
}

/// Decode one field of a complete message with the `grib` crate.
///
/// Values come back in the message's scan order with NaN for missing points.
pub fn unpack_with_grib_crate(message: &[u8], field_index: usize) -> Result<Vec<f32>, Grib2Error> {
    let grib_file = grib::from_reader(Cursor::new(message))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;

    let (_, submessage) = grib_file
        .iter()
        .nth(field_index)
        .ok_or_else(|| Grib2Error::UnpackingError(format!("no field {} in message", field_index)))?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;
    let values = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;

    Ok(values.collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bits() {
        let data = vec![0b10110101];
        assert_eq!(extract_bits(&data, 0, 2).unwrap(), 0b10);
        assert_eq!(extract_bits(&data, 2, 2).unwrap(), 0b11);
        assert_eq!(extract_bits(&data, 0, 8).unwrap(), 0b10110101);
    }

    #[test]
    fn test_extract_bits_past_end() {
        let data = vec![0xFF];
        assert!(matches!(extract_bits(&data, 4, 8), Err(Grib2Error::Truncated(_))));
    }

    #[test]
    fn test_simple_unpacking() {
        let packed = vec![100, 200];
        let vals = unpack_simple(&packed, 2, 8, 0.0, 0, 0, None).unwrap();
        assert_eq!(vals, vec![100.0, 200.0]);
    }

    #[test]
    fn test_simple_unpacking_with_scales() {
        // R = 2500, E = 1, D = 1: (2500 + 3 * 2) / 10 = 250.6
        let packed = vec![3];
        let vals = unpack_simple(&packed, 1, 8, 2500.0, 1, 1, None).unwrap();
        assert!((vals[0] - 250.6).abs() < 1e-4);
    }

    #[test]
    fn test_bitmap_skips_packed_values() {
        // Points 0 and 2 present, point 1 masked: only two packed values
        let packed = vec![10, 20];
        let bitmap = [0b1010_0000];
        let vals = unpack_simple(&packed, 3, 8, 0.0, 0, 0, Some(&bitmap)).unwrap();
        assert_eq!(vals[0], 10.0);
        assert!(vals[1].is_nan());
        assert_eq!(vals[2], 20.0);
    }

    #[test]
    fn test_constant_field() {
        let vals = unpack_simple(&[], 4, 0, 288.15, 0, 0, None).unwrap();
        assert_eq!(vals, vec![288.15; 4]);
    }

    #[test]
    fn test_truncated_data_section() {
        let err = unpack_simple(&[1], 4, 8, 0.0, 0, 0, None).unwrap_err();
        assert!(matches!(err, Grib2Error::Truncated(_)));
    }
}
