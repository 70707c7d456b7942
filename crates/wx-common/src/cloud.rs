//! Cloud layer types shared by observations, grid output and fused state.

use serde::{Deserialize, Serialize};

use crate::atmosphere::feet_to_meters;

/// Sky coverage code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    Clear,
    Few,
    Scattered,
    Broken,
    Overcast,
}

impl Coverage {
    /// Representative sky fraction in `[0, 1]` (okta mid-points).
    pub fn fraction(&self) -> f64 {
        match self {
            Self::Clear => 0.0,
            Self::Few => 1.5 / 8.0,
            Self::Scattered => 3.5 / 8.0,
            Self::Broken => 6.0 / 8.0,
            Self::Overcast => 1.0,
        }
    }

    /// Classify a sky fraction in `[0, 1]` by rounding to oktas.
    pub fn from_fraction(fraction: f64) -> Self {
        let oktas = (fraction.clamp(0.0, 1.0) * 8.0).round() as u8;
        match oktas {
            0 => Self::Clear,
            1..=2 => Self::Few,
            3..=4 => Self::Scattered,
            5..=7 => Self::Broken,
            _ => Self::Overcast,
        }
    }

    /// Parse a report coverage code (`FEW`, `SCT`, `BKN`, `OVC`, `VV`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "FEW" => Some(Self::Few),
            "SCT" => Some(Self::Scattered),
            "BKN" => Some(Self::Broken),
            "OVC" | "VV" => Some(Self::Overcast),
            "CLR" | "SKC" | "NSC" | "NCD" => Some(Self::Clear),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Clear => "CLR",
            Self::Few => "FEW",
            Self::Scattered => "SCT",
            Self::Broken => "BKN",
            Self::Overcast => "OVC",
        }
    }

    /// Whether the layer counts towards a ceiling.
    pub fn is_ceiling(&self) -> bool {
        matches!(self, Self::Broken | Self::Overcast)
    }

    /// Typical vertical extent of a layer of this coverage in meters.
    pub fn default_thickness_m(&self) -> f64 {
        match self {
            Self::Clear => 0.0,
            Self::Few => feet_to_meters(2000.0),
            _ => feet_to_meters(4000.0),
        }
    }
}

/// Convective cloud type reported alongside a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloudType {
    Cumulonimbus,
    ToweringCumulus,
}

impl CloudType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "CB" => Some(Self::Cumulonimbus),
            "TCU" => Some(Self::ToweringCumulus),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Cumulonimbus => "CB",
            Self::ToweringCumulus => "TCU",
        }
    }
}

/// One cloud layer. Altitudes are in meters; whether they are above ground
/// or above mean sea level is fixed by the owning record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudLayer {
    pub base_m: f64,
    pub top_m: f64,
    pub coverage: Coverage,
    pub cloud_type: Option<CloudType>,
    /// Set when precipitation or convection is associated with the layer.
    pub convective: bool,
}

impl CloudLayer {
    /// Layer with its top derived from the coverage's typical thickness.
    pub fn with_default_top(base_m: f64, coverage: Coverage, cloud_type: Option<CloudType>) -> Self {
        let thickness = match cloud_type {
            // Vertical development reaches far higher than stratiform layers
            Some(CloudType::Cumulonimbus) => feet_to_meters(20_000.0),
            Some(CloudType::ToweringCumulus) => feet_to_meters(8000.0),
            None => coverage.default_thickness_m(),
        };
        Self {
            base_m,
            top_m: base_m + thickness,
            coverage,
            cloud_type,
            convective: cloud_type.is_some(),
        }
    }

    pub fn thickness_m(&self) -> f64 {
        self.top_m - self.base_m
    }

    /// Shift both base and top by a fixed offset (e.g. AGL to MSL).
    pub fn offset(&self, meters: f64) -> Self {
        Self {
            base_m: self.base_m + meters,
            top_m: self.top_m + meters,
            ..*self
        }
    }
}

/// Sort layers by base and trim tops so that no layer overlaps the next.
///
/// Clear layers are dropped. Layers whose base coincides with the previous
/// layer's base keep the higher coverage.
pub fn normalize_layers(layers: &mut Vec<CloudLayer>) {
    layers.retain(|l| l.coverage != Coverage::Clear && l.base_m.is_finite() && l.top_m.is_finite());
    layers.sort_by(|a, b| a.base_m.total_cmp(&b.base_m));

    let mut merged: Vec<CloudLayer> = Vec::with_capacity(layers.len());
    for layer in layers.drain(..) {
        match merged.last_mut() {
            Some(prev) if (layer.base_m - prev.base_m).abs() < f64::EPSILON => {
                if layer.coverage > prev.coverage {
                    *prev = CloudLayer {
                        top_m: prev.top_m.max(layer.top_m),
                        ..layer
                    };
                }
            }
            _ => merged.push(layer),
        }
    }

    for i in 1..merged.len() {
        let next_base = merged[i].base_m;
        let prev = &mut merged[i - 1];
        if prev.top_m > next_base {
            prev.top_m = next_base;
        }
    }
    for layer in &mut merged {
        if layer.top_m < layer.base_m {
            layer.top_m = layer.base_m;
        }
    }

    *layers = merged;
}
