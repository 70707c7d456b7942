//! GRIB2 parameter lookup tables.
//!
//! Translates (discipline, category, number) codes into short names such as
//! `TMP` or `UGRD`, and back. The standard table covers the GFS and WAFS
//! fields the engine consumes; deployments can add local parameters.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

/// GRIB2 parameter lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    /// (discipline, category, number) -> parameter short name
    parameters: HashMap<ParamKey, String>,
    /// short name -> codes
    by_name: HashMap<String, ParamKey>,
}

impl Grib2Tables {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// WMO/NCEP parameters used by the forecast and turbulence products.
    pub fn standard() -> Self {
        let mut tables = Self::new();
        let entries: &[(u8, u8, u8, &str)] = &[
            // Temperature
            (0, 0, 0, "TMP"),
            (0, 0, 6, "DPT"),
            // Moisture
            (0, 1, 0, "SPFH"),
            (0, 1, 1, "RH"),
            (0, 1, 7, "PRATE"),
            (0, 1, 8, "APCP"),
            (0, 1, 11, "SNOD"),
            // Momentum
            (0, 2, 2, "UGRD"),
            (0, 2, 3, "VGRD"),
            (0, 2, 8, "VVEL"),
            (0, 2, 22, "GUST"),
            // Mass
            (0, 3, 0, "PRES"),
            (0, 3, 1, "PRMSL"),
            (0, 3, 5, "HGT"),
            // Cloud
            (0, 6, 1, "TCDC"),
            (0, 6, 3, "LCDC"),
            (0, 6, 4, "MCDC"),
            (0, 6, 5, "HCDC"),
            // Stability
            (0, 7, 6, "CAPE"),
            (0, 7, 7, "CIN"),
            // Physical atmospheric properties
            (0, 19, 0, "VIS"),
            (0, 19, 22, "CAT"),
            (0, 19, 29, "CATEDR"),
            (0, 19, 30, "EDPARM"),
            (0, 19, 31, "MXEDPRM"),
        ];
        for (d, c, n, name) in entries {
            tables.add_parameter(*d, *c, *n, name.to_string());
        }
        tables
    }

    /// Add a parameter mapping
    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, name: String) {
        self.by_name.insert(name.clone(), (discipline, category, number));
        self.parameters.insert((discipline, category, number), name);
    }

    /// Look up parameter short name by GRIB2 codes.
    ///
    /// Returns "P{discipline}_{category}_{number}" if not found.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameters
            .get(&(discipline, category, number))
            .cloned()
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    /// Codes for a short name, if the name is known.
    pub fn lookup(&self, name: &str) -> Option<ParamKey> {
        self.by_name.get(name).copied()
    }

    /// Whether a short name can be decoded with these tables.
    pub fn is_known(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Get the number of parameters in the table
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
