//! Present and recent weather groups (`-SHRA`, `+TSRA`, `VCFG`, `REDZ`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Light,
    Moderate,
    Heavy,
    /// In the vicinity (`VC`), not at the station
    Vicinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Descriptor {
    Shallow,
    Partial,
    Patches,
    LowDrifting,
    Blowing,
    Showers,
    Thunderstorm,
    Freezing,
}

impl Descriptor {
    pub const CODES: [(&'static str, Descriptor); 8] = [
        ("MI", Descriptor::Shallow),
        ("PR", Descriptor::Partial),
        ("BC", Descriptor::Patches),
        ("DR", Descriptor::LowDrifting),
        ("BL", Descriptor::Blowing),
        ("SH", Descriptor::Showers),
        ("TS", Descriptor::Thunderstorm),
        ("FZ", Descriptor::Freezing),
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        Self::CODES.iter().find(|(c, _)| *c == code).map(|(_, d)| *d)
    }

    pub fn as_code(&self) -> &'static str {
        Self::CODES
            .iter()
            .find(|(_, d)| d == self)
            .map(|(c, _)| *c)
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phenomenon {
    // Precipitation
    Drizzle,
    Rain,
    Snow,
    SnowGrains,
    IceCrystals,
    IcePellets,
    Hail,
    SmallHail,
    Unknown,
    // Obscuration
    Mist,
    Fog,
    Smoke,
    VolcanicAsh,
    Dust,
    Sand,
    Haze,
    Spray,
    // Other
    DustWhirls,
    Squalls,
    FunnelCloud,
    Sandstorm,
    Duststorm,
}

impl Phenomenon {
    pub const CODES: [(&'static str, Phenomenon); 22] = [
        ("DZ", Phenomenon::Drizzle),
        ("RA", Phenomenon::Rain),
        ("SN", Phenomenon::Snow),
        ("SG", Phenomenon::SnowGrains),
        ("IC", Phenomenon::IceCrystals),
        ("PL", Phenomenon::IcePellets),
        ("GR", Phenomenon::Hail),
        ("GS", Phenomenon::SmallHail),
        ("UP", Phenomenon::Unknown),
        ("BR", Phenomenon::Mist),
        ("FG", Phenomenon::Fog),
        ("FU", Phenomenon::Smoke),
        ("VA", Phenomenon::VolcanicAsh),
        ("DU", Phenomenon::Dust),
        ("SA", Phenomenon::Sand),
        ("HZ", Phenomenon::Haze),
        ("PY", Phenomenon::Spray),
        ("PO", Phenomenon::DustWhirls),
        ("SQ", Phenomenon::Squalls),
        ("FC", Phenomenon::FunnelCloud),
        ("SS", Phenomenon::Sandstorm),
        ("DS", Phenomenon::Duststorm),
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        Self::CODES.iter().find(|(c, _)| *c == code).map(|(_, p)| *p)
    }

    pub fn as_code(&self) -> &'static str {
        Self::CODES
            .iter()
            .find(|(_, p)| p == self)
            .map(|(c, _)| *c)
            .unwrap_or("")
    }

    pub fn is_precipitation(&self) -> bool {
        matches!(
            self,
            Self::Drizzle
                | Self::Rain
                | Self::Snow
                | Self::SnowGrains
                | Self::IceCrystals
                | Self::IcePellets
                | Self::Hail
                | Self::SmallHail
                | Self::Unknown
        )
    }

    /// Frozen precipitation types.
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            Self::Snow | Self::SnowGrains | Self::IceCrystals | Self::IcePellets | Self::Hail | Self::SmallHail
        )
    }
}

/// One decoded weather group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherPhenomenon {
    pub intensity: Intensity,
    pub descriptor: Option<Descriptor>,
    pub phenomena: Vec<Phenomenon>,
    /// Recent weather (`RE` prefix): ended within the last hour
    pub recent: bool,
}

impl WeatherPhenomenon {
    pub fn is_thunderstorm(&self) -> bool {
        self.descriptor == Some(Descriptor::Thunderstorm)
    }

    pub fn has_precipitation(&self) -> bool {
        self.phenomena.iter().any(Phenomenon::is_precipitation)
    }

    pub fn is_freezing(&self) -> bool {
        self.descriptor == Some(Descriptor::Freezing)
    }

    /// Re-encode as a report token.
    pub fn to_code(&self) -> String {
        let mut code = String::new();
        if self.recent {
            code.push_str("RE");
        }
        match self.intensity {
            Intensity::Light => code.push('-'),
            Intensity::Heavy => code.push('+'),
            Intensity::Vicinity => code.push_str("VC"),
            Intensity::Moderate => {}
        }
        if let Some(d) = self.descriptor {
            code.push_str(d.as_code());
        }
        for p in &self.phenomena {
            code.push_str(p.as_code());
        }
        code
    }
}
