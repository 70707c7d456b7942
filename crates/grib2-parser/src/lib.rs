//! GRIB2 parser implementation (WMO FM 92 GRIB Edition 2).
//!
//! [`Grib2Reader`] walks a file image message by message (and field by field
//! when a message repeats sections 2 to 7). [`decode_snapshot`] turns a file
//! into an immutable [`wx_common::GridSnapshot`] holding the requested
//! (variable, level) slots.

pub mod sections;
pub mod snapshot;
pub mod tables;
pub mod unpacking;

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use wx_common::grid::{LatLonGrid, Level};
use wx_common::{DecodeError, ValidTime};

use sections::{
    Bitmap, DataRepresentation, DataSection, GridDefinition, Identification, Indicator,
    ProductDefinition,
};

pub use sections::decode_grib2_signed;
pub use snapshot::{decode_snapshot, DecodeRequest, FieldRequest, LevelSelector};
pub use tables::Grib2Tables;
pub use unpacking::unpack_simple;

/// Low-level GRIB2 parsing errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported template {template} in section {section}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Unpacking error: {0}")]
    UnpackingError(String),

    #[error("Truncated data: {0}")]
    Truncated(String),
}

impl From<Grib2Error> for DecodeError {
    fn from(err: Grib2Error) -> Self {
        match err {
            Grib2Error::Truncated(msg) => DecodeError::TruncatedData(msg),
            Grib2Error::UnsupportedTemplate { .. } => DecodeError::UnsupportedVariable(err.to_string()),
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

/// One decodable field: the shared message headers plus the field's own
/// product, representation, bitmap and data sections.
#[derive(Debug, Clone)]
pub struct Grib2Message {
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Option<Bitmap>,
    pub data_section: DataSection,
    /// Complete message bytes, kept for decoders that need the whole message
    pub raw: Bytes,
    /// Position of this field within its message
    pub field_index: usize,
}

impl Grib2Message {
    /// Parameter short name (e.g. `TMP`).
    pub fn parameter(&self) -> &str {
        &self.product_definition.parameter_short_name
    }

    pub fn level(&self) -> Level {
        self.product_definition.level()
    }

    pub fn valid_time(&self) -> ValidTime {
        ValidTime::new(
            self.identification.reference_time,
            self.product_definition.forecast_hour(),
        )
    }

    /// Grid dimensions as (ni, nj).
    pub fn grid_dims(&self) -> (usize, usize) {
        (
            self.grid_definition.ni as usize,
            self.grid_definition.nj as usize,
        )
    }

    pub fn lat_lon_grid(&self) -> Result<LatLonGrid, Grib2Error> {
        self.grid_definition.to_lat_lon_grid()
    }

    /// Unpack values into canonical row-major, eastward order. Missing
    /// points are NaN.
    pub fn unpack_data(&self) -> Result<Vec<f32>, Grib2Error> {
        let grid = self.lat_lon_grid()?;
        let dr = &self.data_representation;

        let values = match dr.template {
            0 => unpacking::unpack_simple(
                &self.data_section.data,
                grid.len(),
                dr.bits_per_value,
                dr.reference_value,
                dr.binary_scale_factor,
                dr.decimal_scale_factor,
                self.bitmap.as_ref().map(|b| b.data.as_ref()),
            )?,
            _ => unpacking::unpack_with_grib_crate(&self.raw, self.field_index)?,
        };

        if values.len() != grid.len() {
            return Err(Grib2Error::UnpackingError(format!(
                "decoded {} values for a {}x{} grid",
                values.len(),
                grid.ni,
                grid.nj
            )));
        }

        Ok(self
            .grid_definition
            .scan_mode()
            .to_canonical(values, grid.ni, grid.nj))
    }
}

/// Sequential reader over a GRIB2 file image.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    tables: Arc<Grib2Tables>,
    pending: VecDeque<Grib2Message>,
}

impl Grib2Reader {
    pub fn new(data: Bytes, tables: Arc<Grib2Tables>) -> Self {
        Self {
            data,
            offset: 0,
            tables,
            pending: VecDeque::new(),
        }
    }

    /// Size of the underlying file image in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Next field, `Ok(None)` at the end of the file.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(Some(msg));
        }

        let Some(start) = find_magic(&self.data, self.offset) else {
            self.offset = self.data.len();
            return Ok(None);
        };

        let indicator = sections::parse_indicator(&self.data[start..])?;
        let length = usize::try_from(indicator.message_length)
            .map_err(|_| Grib2Error::InvalidFormat("message length overflows".to_string()))?;
        if length < 16 + 4 {
            return Err(Grib2Error::InvalidFormat(format!(
                "message length {} is too small",
                length
            )));
        }
        let end = start + length;
        if end > self.data.len() {
            self.offset = self.data.len();
            return Err(Grib2Error::Truncated(format!(
                "message at offset {} declares {} bytes, {} available",
                start,
                length,
                self.data.len() - start
            )));
        }

        self.offset = end;
        let message = self.data.slice(start..end);
        let fields = parse_fields(message, indicator, &self.tables)?;
        self.pending.extend(fields);

        Ok(self.pending.pop_front())
    }
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(4)
        .position(|w| w == b"GRIB")
        .map(|p| from + p)
}

fn parse_fields(
    message: Bytes,
    indicator: Indicator,
    tables: &Grib2Tables,
) -> Result<Vec<Grib2Message>, Grib2Error> {
    let len = message.len();
    let mut pos = 16;
    let mut identification = None;
    let mut grid = None;
    let mut product = None;
    let mut representation = None;
    let mut bitmap: Option<Bitmap> = None;
    let mut last_defined_bitmap: Option<Bitmap> = None;
    let mut fields = Vec::new();

    loop {
        if pos + 4 > len {
            return Err(Grib2Error::Truncated("missing end section".to_string()));
        }
        if &message[pos..pos + 4] == b"7777" {
            break;
        }
        if pos + 5 > len {
            return Err(Grib2Error::Truncated("section header cut off".to_string()));
        }

        let section_length = u32::from_be_bytes([
            message[pos],
            message[pos + 1],
            message[pos + 2],
            message[pos + 3],
        ]) as usize;
        let number = message[pos + 4];
        if section_length < 5 || pos + section_length > len {
            return Err(Grib2Error::InvalidSection {
                section: number,
                reason: format!("length {} exceeds message", section_length),
            });
        }
        let section = &message[pos..pos + section_length];

        match number {
            1 => identification = Some(sections::parse_identification(section)?),
            2 => {} // local use
            3 => grid = Some(sections::parse_grid_definition(section)?),
            4 => {
                product = Some(sections::parse_product_definition(
                    section,
                    indicator.discipline,
                    tables,
                )?)
            }
            5 => representation = Some(sections::parse_data_representation(section)?),
            6 => {
                let parsed = sections::parse_bitmap(section)?;
                bitmap = match parsed.indicator {
                    0 => {
                        last_defined_bitmap = Some(parsed.clone());
                        Some(parsed)
                    }
                    254 => Some(last_defined_bitmap.clone().ok_or_else(|| {
                        Grib2Error::InvalidSection {
                            section: 6,
                            reason: "reuses a bitmap that was never defined".to_string(),
                        }
                    })?),
                    255 => None,
                    predefined => {
                        return Err(Grib2Error::UnsupportedTemplate {
                            section: 6,
                            template: predefined as u16,
                        })
                    }
                };
            }
            7 => {
                let missing = |what: &str| {
                    Grib2Error::InvalidFormat(format!("data section before {} section", what))
                };
                fields.push(Grib2Message {
                    indicator: indicator.clone(),
                    identification: identification.clone().ok_or_else(|| missing("identification"))?,
                    grid_definition: grid.clone().ok_or_else(|| missing("grid definition"))?,
                    product_definition: product.clone().ok_or_else(|| missing("product definition"))?,
                    data_representation: representation
                        .clone()
                        .ok_or_else(|| missing("data representation"))?,
                    bitmap: bitmap.clone(),
                    data_section: sections::parse_data_section(section)?,
                    raw: message.clone(),
                    field_index: fields.len(),
                });
            }
            other => {
                return Err(Grib2Error::InvalidFormat(format!(
                    "unexpected section number {}",
                    other
                )))
            }
        }

        pos += section_length;
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_magic_skips_padding() {
        let data = b"\0\0\0GRIBxx";
        assert_eq!(find_magic(data, 0), Some(3));
        assert_eq!(find_magic(data, 4), None);
    }

    #[test]
    fn test_empty_input_has_no_messages() {
        let mut reader = Grib2Reader::new(Bytes::new(), Arc::new(Grib2Tables::standard()));
        assert!(reader.next_message().unwrap().is_none());
    }

    #[test]
    fn test_error_mapping() {
        let err: DecodeError = Grib2Error::Truncated("x".into()).into();
        assert!(matches!(err, DecodeError::TruncatedData(_)));

        let err: DecodeError = Grib2Error::UnsupportedTemplate { section: 5, template: 40 }.into();
        assert!(matches!(err, DecodeError::UnsupportedVariable(_)));

        let err: DecodeError = Grib2Error::InvalidFormat("x".into()).into();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
