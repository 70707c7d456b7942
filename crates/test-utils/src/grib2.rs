//! Synthetic GRIB2 message builder.
//!
//! Emits byte-exact GRIB2 edition 2 messages with a template 3.0 lat/lon
//! grid, template 4.0 product, template 5.0 simple packing and an optional
//! bitmap. NaN data values are written as bitmap holes.

/// Encode a signed value in GRIB2 sign-magnitude form (16 bits).
pub fn encode_signed16(value: i16) -> [u8; 2] {
    let raw = if value < 0 {
        0x8000 | value.unsigned_abs()
    } else {
        value as u16
    };
    raw.to_be_bytes()
}

/// Encode a signed value in GRIB2 sign-magnitude form (32 bits).
pub fn encode_signed32(value: i32) -> [u8; 4] {
    let raw = if value < 0 {
        0x8000_0000 | value.unsigned_abs()
    } else {
        value as u32
    };
    raw.to_be_bytes()
}

/// Build a minimal GRIB2 message with the specified parameters.
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    // Grid definition
    ni: u32,
    nj: u32,
    la1: i32, // microdegrees
    lo1: i32, // microdegrees, 0-360 range
    la2: i32,
    lo2: i32,
    di: u32,
    dj: u32,
    scanning_mode: u8,
    // Product definition
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_scale: i8,
    level_value: u32,
    time_unit: u8,
    forecast_time: u32,
    // Data
    decimal_scale: i16,
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// Create a new builder with defaults for GFS-like data: a 10x10 one-degree
    /// grid from 45N/130W, 2 m temperature at 15°C.
    pub fn new_gfs() -> Self {
        let ni = 10;
        let nj = 10;
        Self {
            discipline: 0,
            center: 7, // NCEP
            year: 2025,
            month: 12,
            day: 10,
            hour: 12,
            ni,
            nj,
            la1: 45_000_000,
            lo1: 230_000_000,
            la2: 36_000_000,
            lo2: 239_000_000,
            di: 1_000_000,
            dj: 1_000_000,
            scanning_mode: 0b0000_0000, // +i, -j, i consecutive
            param_category: 0,
            param_number: 0, // TMP
            level_type: 103,
            level_scale: 0,
            level_value: 2,
            time_unit: 1, // hours
            forecast_time: 0,
            decimal_scale: 0,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    pub fn with_discipline(mut self, discipline: u8) -> Self {
        self.discipline = discipline;
        self
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    /// Resize the grid, keeping its origin and spacing.
    pub fn with_grid(mut self, ni: u32, nj: u32) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.data_values = vec![0.0; (ni * nj) as usize];
        self.update_last_point();
        self
    }

    /// Full grid definition in degrees. A positive `dlat` scans south to north.
    pub fn with_grid_definition(
        mut self,
        ni: u32,
        nj: u32,
        lat1: f64,
        lon1: f64,
        dlat: f64,
        dlon: f64,
    ) -> Self {
        self.ni = ni;
        self.nj = nj;
        self.la1 = (lat1 * 1e6).round() as i32;
        self.lo1 = (lon1.rem_euclid(360.0) * 1e6).round() as i32;
        self.di = (dlon.abs() * 1e6).round() as u32;
        self.dj = (dlat.abs() * 1e6).round() as u32;
        self.scanning_mode = if dlat > 0.0 { 0b0100_0000 } else { 0 };
        self.data_values = vec![0.0; (ni * nj) as usize];
        self.update_last_point();
        self
    }

    pub fn with_scanning_mode(mut self, flags: u8) -> Self {
        self.scanning_mode = flags;
        self
    }

    pub fn with_parameter(mut self, category: u8, number: u8) -> Self {
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = 0;
        self.level_value = level_value;
        self
    }

    /// Level with an explicit scale factor: value = scaled / 10^scale.
    pub fn with_scaled_level(mut self, level_type: u8, scale: i8, scaled_value: u32) -> Self {
        self.level_type = level_type;
        self.level_scale = scale;
        self.level_value = scaled_value;
        self
    }

    /// Isobaric level in hPa (encoded in Pa).
    pub fn with_isobaric_level(self, hpa: u32) -> Self {
        self.with_level(100, hpa * 100)
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.time_unit = 1;
        self.forecast_time = hour;
        self
    }

    pub fn with_forecast_minutes(mut self, minutes: u32) -> Self {
        self.time_unit = 0;
        self.forecast_time = minutes;
        self
    }

    pub fn with_decimal_scale(mut self, d: i16) -> Self {
        self.decimal_scale = d;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        self.data_values = vec![value; (self.ni * self.nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let n = (self.ni * self.nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Raw values in scan order; NaN marks a missing point.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    fn update_last_point(&mut self) {
        let j_sign = if self.scanning_mode & 0x40 != 0 { 1 } else { -1 };
        self.la2 = self.la1 + j_sign * (self.nj.saturating_sub(1) * self.dj) as i32;
        self.lo2 = ((self.lo1 as i64 + (self.ni.saturating_sub(1) * self.di) as i64)
            .rem_euclid(360_000_000)) as i32;
    }

    /// Build the complete GRIB2 message bytes.
    pub fn build(&self) -> Vec<u8> {
        let section1 = self.build_section1();
        let section3 = self.build_section3();
        let section4 = self.build_section4();
        let section5 = self.build_section5();
        let section6 = self.build_section6();
        let section7 = self.build_section7();

        let message_length = 16
            + section1.len()
            + section3.len()
            + section4.len()
            + section5.len()
            + section6.len()
            + section7.len()
            + 4;

        let mut message = Vec::with_capacity(message_length);

        // Section 0: Indicator
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());

        message.extend_from_slice(&section1);
        message.extend_from_slice(&section3);
        message.extend_from_slice(&section4);
        message.extend_from_slice(&section5);
        message.extend_from_slice(&section6);
        message.extend_from_slice(&section7);

        // Section 8: End
        message.extend_from_slice(b"7777");

        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);

        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Significance of reference time (start of forecast)

        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0); // Minute
        section.push(0); // Second

        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)
        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let section_length: u32 = 14 + 58;

        section.extend_from_slice(&section_length.to_be_bytes());
        section.push(3);

        section.push(0); // Source of grid definition
        section.extend_from_slice(&(self.ni * self.nj).to_be_bytes());
        section.push(0); // Number of octets for optional list
        section.push(0); // Interpretation of optional list
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 3.0

        section.push(6); // Shape of Earth (spherical, 6371229 m)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());

        section.extend_from_slice(&self.ni.to_be_bytes());
        section.extend_from_slice(&self.nj.to_be_bytes());
        section.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
        section.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions

        section.extend_from_slice(&encode_signed32(self.la1));
        section.extend_from_slice(&encode_signed32(self.lo1));
        section.push(48); // Resolution and component flags
        section.extend_from_slice(&encode_signed32(self.la2));
        section.extend_from_slice(&encode_signed32(self.lo2));
        section.extend_from_slice(&self.di.to_be_bytes());
        section.extend_from_slice(&self.dj.to_be_bytes());
        section.push(self.scanning_mode);
        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::new();
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);

        section.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 4.0

        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Type of generating process (forecast)
        section.push(0); // Background generating process
        section.push(96); // Analysis or forecast process (GFS)
        section.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        section.push(0); // Minutes of cutoff
        section.push(self.time_unit);
        section.extend_from_slice(&self.forecast_time.to_be_bytes());

        section.push(self.level_type);
        let scale_byte = if self.level_scale < 0 {
            0x80 | self.level_scale.unsigned_abs()
        } else {
            self.level_scale as u8
        };
        section.push(scale_byte);
        section.extend_from_slice(&self.level_value.to_be_bytes());

        section.push(255); // Type of second fixed surface (none)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section
    }

    /// Reference value, binary scale and bit width for the present values.
    fn packing_parameters(&self) -> (f32, i16, u8) {
        let factor = 10f32.powi(self.decimal_scale as i32);
        let (min_val, max_val) = self
            .data_values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
                (min.min(v * factor), max.max(v * factor))
            });

        if !min_val.is_finite() {
            return (0.0, 0, 0);
        }
        let range = max_val - min_val;
        if range == 0.0 {
            return (min_val, 0, 0);
        }
        // E = ceil(log2(range / 65535)) so every value fits in 16 bits
        let e = (range / 65535.0).log2().ceil() as i16;
        (min_val, e, 16)
    }

    fn has_missing(&self) -> bool {
        self.data_values.iter().any(|v| v.is_nan())
    }

    fn build_section5(&self) -> Vec<u8> {
        let mut section = Vec::new();
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();
        let present = self.data_values.iter().filter(|v| !v.is_nan()).count() as u32;

        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);

        section.extend_from_slice(&present.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0

        section.extend_from_slice(&reference_value.to_be_bytes());
        section.extend_from_slice(&encode_signed16(binary_scale_factor));
        section.extend_from_slice(&encode_signed16(self.decimal_scale));
        section.push(bits_per_value);
        section.push(0); // Original field type (floating point)
        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let mut section = Vec::new();
        if !self.has_missing() {
            section.extend_from_slice(&6u32.to_be_bytes());
            section.push(6);
            section.push(255); // No bitmap
            return section;
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, v) in self.data_values.iter().enumerate() {
            if !v.is_nan() {
                bitmap[i / 8] |= 0x80 >> (i % 8);
            }
        }
        section.extend_from_slice(&(6 + bitmap.len() as u32).to_be_bytes());
        section.push(6);
        section.push(0); // Bitmap follows
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let packed_data = self.pack_simple();
        let mut section = Vec::with_capacity(5 + packed_data.len());
        section.extend_from_slice(&(5 + packed_data.len() as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed_data);
        section
    }

    fn pack_simple(&self) -> Vec<u8> {
        let (reference_value, binary_scale_factor, bits_per_value) = self.packing_parameters();
        if bits_per_value == 0 {
            return Vec::new();
        }

        let factor = 10f32.powi(self.decimal_scale as i32);
        let binary_scale = 2.0_f32.powi(binary_scale_factor as i32);
        let mut packed = Vec::new();
        for &val in self.data_values.iter().filter(|v| !v.is_nan()) {
            let packed_value = ((val * factor - reference_value) / binary_scale).round() as u16;
            packed.extend_from_slice(&packed_value.to_be_bytes());
        }
        packed
    }
}

/// Concatenate several messages into one file image.
pub fn multi_message(builders: &[Grib2Builder]) -> Vec<u8> {
    builders.iter().flat_map(|b| b.build()).collect()
}
