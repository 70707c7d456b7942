//! Decoding a whole GRIB2 file into a [`GridSnapshot`].

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use rayon::prelude::*;
use tracing::{debug, info, warn};
use wx_common::grid::{CloudDeck, FieldKey, GridSnapshot, LatLonGrid, Level};
use wx_common::{params, DecodeError, ValidTime};

use crate::{Grib2Message, Grib2Reader, Grib2Tables};

/// Which levels of a parameter to keep.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelSelector {
    /// Listed levels. Absent ones become missing slots.
    Exact(Vec<Level>),
    /// Every isobaric level present in the file.
    AllIsobaric,
    /// Every level present in the file.
    Any,
}

impl LevelSelector {
    pub fn matches(&self, level: &Level) -> bool {
        match self {
            Self::Exact(levels) => levels.contains(level),
            Self::AllIsobaric => matches!(level, Level::Isobaric(_)),
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldRequest {
    pub parameter: String,
    pub levels: LevelSelector,
}

impl FieldRequest {
    pub fn new(parameter: impl Into<String>, levels: LevelSelector) -> Self {
        Self {
            parameter: parameter.into(),
            levels,
        }
    }

    pub fn isobaric(parameter: &str) -> Self {
        Self::new(parameter, LevelSelector::AllIsobaric)
    }

    pub fn at(parameter: &str, levels: &[Level]) -> Self {
        Self::new(parameter, LevelSelector::Exact(levels.to_vec()))
    }
}

/// The set of (variable, level) pairs to extract from a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeRequest {
    pub fields: Vec<FieldRequest>,
}

impl DecodeRequest {
    pub fn new(fields: Vec<FieldRequest>) -> Self {
        Self { fields }
    }

    /// Fields the interpolation engine reads from the forecast model.
    pub fn gfs_default() -> Self {
        let mut fields = vec![
            FieldRequest::isobaric(params::HGT),
            FieldRequest::isobaric(params::TMP),
            FieldRequest::isobaric(params::UGRD),
            FieldRequest::isobaric(params::VGRD),
            FieldRequest::isobaric(params::RH),
            FieldRequest::at(params::PRMSL, &[Level::MeanSeaLevel]),
            FieldRequest::at(params::TMP, &[Level::HeightAboveGround(2), Level::Tropopause]),
            FieldRequest::at(params::DPT, &[Level::HeightAboveGround(2)]),
            FieldRequest::at(params::UGRD, &[Level::HeightAboveGround(10)]),
            FieldRequest::at(params::VGRD, &[Level::HeightAboveGround(10)]),
            FieldRequest::at(params::HGT, &[Level::Surface]),
            FieldRequest::at(params::CAPE, &[Level::Surface]),
            FieldRequest::at(params::PRATE, &[Level::Surface]),
            FieldRequest::at(params::VIS, &[Level::Surface]),
            FieldRequest::at(params::PRES, &[Level::Tropopause]),
        ];

        for (cover, deck) in [
            (params::LCDC, CloudDeck::Low),
            (params::MCDC, CloudDeck::Middle),
            (params::HCDC, CloudDeck::High),
        ] {
            fields.push(FieldRequest::at(cover, &[Level::CloudLayer(deck)]));
            fields.push(FieldRequest::at(
                params::PRES,
                &[Level::CloudBottom(deck), Level::CloudTop(deck)],
            ));
        }

        Self { fields }
    }

    /// Eddy dissipation on every pressure level of the turbulence product.
    pub fn wafs_default() -> Self {
        Self {
            fields: vec![FieldRequest::isobaric(params::EDPARM)],
        }
    }

    /// Whether a decoded (parameter, level) pair was asked for.
    pub fn matches(&self, parameter: &str, level: &Level) -> bool {
        self.fields
            .iter()
            .any(|f| f.parameter == parameter && f.levels.matches(level))
    }

    fn exact_slots(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.iter().flat_map(|f| match &f.levels {
            LevelSelector::Exact(levels) => levels
                .iter()
                .map(|l| FieldKey::new(f.parameter.clone(), *l))
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        })
    }
}

/// Statistically processed fields (accumulations, averages) carry the start
/// of their interval as forecast time and do not pin the snapshot's hour.
fn is_instantaneous(msg: &Grib2Message) -> bool {
    msg.product_definition.template < 8
}

/// Decode the requested fields of a GRIB2 file into one snapshot.
///
/// Every matched field must share the grid and the reference time, and every
/// instantaneous field the forecast hour. Requested exact slots the file does
/// not provide are recorded as missing instead of failing the snapshot.
pub fn decode_snapshot(
    data: Bytes,
    product: &str,
    request: &DecodeRequest,
    tables: Arc<Grib2Tables>,
) -> Result<GridSnapshot, DecodeError> {
    for field in &request.fields {
        if !tables.is_known(&field.parameter) {
            return Err(DecodeError::UnsupportedVariable(field.parameter.clone()));
        }
    }

    let mut reader = Grib2Reader::new(data, tables);
    let mut total = 0usize;
    let mut matched: Vec<Grib2Message> = Vec::new();

    while let Some(msg) = reader.next_message()? {
        total += 1;
        if request.matches(msg.parameter(), &msg.level()) {
            debug!(
                parameter = msg.parameter(),
                level = %msg.level(),
                forecast_hour = msg.product_definition.forecast_hour(),
                "Matched field"
            );
            matched.push(msg);
        }
    }

    if total == 0 {
        return Err(DecodeError::malformed("no GRIB2 messages in input"));
    }
    if matched.is_empty() {
        let names: BTreeSet<&str> = request.fields.iter().map(|f| f.parameter.as_str()).collect();
        return Err(DecodeError::UnsupportedVariable(format!(
            "none of {:?} present in {} messages",
            names, total
        )));
    }

    let anchor = matched
        .iter()
        .find(|m| is_instantaneous(m))
        .unwrap_or(&matched[0]);
    let grid = anchor.lat_lon_grid()?;
    let valid = anchor.valid_time();

    for msg in &matched {
        check_consistency(msg, &grid, &valid)?;
    }

    let decoded: Vec<(FieldKey, Result<Vec<f32>, DecodeError>)> = matched
        .par_iter()
        .map(|msg| {
            let key = FieldKey::new(msg.parameter(), msg.level());
            (key, msg.unpack_data().map_err(DecodeError::from))
        })
        .collect();

    let mut snapshot = GridSnapshot::new(product, valid, grid);
    for (key, values) in decoded {
        if snapshot.field(&key.parameter, key.level).is_some() {
            warn!(field = %key, "Duplicate field in file, keeping the first");
            continue;
        }
        snapshot.insert_field(key, values?)?;
    }

    let mut missing = 0usize;
    for key in request.exact_slots() {
        if !snapshot.has_slot(&key) {
            debug!(field = %key, "Requested field not in file");
            snapshot.mark_missing(key);
            missing += 1;
        }
    }

    info!(
        product = product,
        valid = %valid,
        fields = snapshot.field_count(),
        missing = missing,
        levels = snapshot.pressure_levels_hpa().len(),
        "Decoded snapshot"
    );

    Ok(snapshot)
}

fn check_consistency(
    msg: &Grib2Message,
    grid: &LatLonGrid,
    valid: &ValidTime,
) -> Result<(), DecodeError> {
    let msg_grid = msg.lat_lon_grid()?;
    if msg_grid != *grid {
        return Err(DecodeError::malformed(format!(
            "{} at {} is on a {}x{} grid, expected {}x{}",
            msg.parameter(),
            msg.level(),
            msg_grid.ni,
            msg_grid.nj,
            grid.ni,
            grid.nj
        )));
    }

    let msg_valid = msg.valid_time();
    if msg_valid.reference_time != valid.reference_time {
        return Err(DecodeError::malformed(format!(
            "{} belongs to cycle {}, expected {}",
            msg.parameter(),
            msg_valid.reference_time,
            valid.reference_time
        )));
    }
    if is_instantaneous(msg) && msg_valid.forecast_hour != valid.forecast_hour {
        return Err(DecodeError::malformed(format!(
            "{} at {} is forecast hour {}, expected {}",
            msg.parameter(),
            msg.level(),
            msg_valid.forecast_hour,
            valid.forecast_hour
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_selector() {
        assert!(LevelSelector::AllIsobaric.matches(&Level::Isobaric(50000)));
        assert!(!LevelSelector::AllIsobaric.matches(&Level::Surface));
        assert!(LevelSelector::Any.matches(&Level::Tropopause));

        let exact = LevelSelector::Exact(vec![Level::HeightAboveGround(2)]);
        assert!(exact.matches(&Level::HeightAboveGround(2)));
        assert!(!exact.matches(&Level::HeightAboveGround(10)));
    }

    #[test]
    fn test_gfs_request_covers_surface_and_aloft() {
        let request = DecodeRequest::gfs_default();
        assert!(request.matches("TMP", &Level::Isobaric(85000)));
        assert!(request.matches("TMP", &Level::HeightAboveGround(2)));
        assert!(request.matches("PRES", &Level::CloudBottom(CloudDeck::Middle)));
        assert!(!request.matches("EDPARM", &Level::Isobaric(30000)));
    }

    #[test]
    fn test_exact_slots_listed() {
        let request = DecodeRequest::new(vec![
            FieldRequest::isobaric("TMP"),
            FieldRequest::at("UGRD", &[Level::HeightAboveGround(10)]),
        ]);
        let slots: Vec<_> = request.exact_slots().collect();
        assert_eq!(slots, vec![FieldKey::new("UGRD", Level::HeightAboveGround(10))]);
    }
}
