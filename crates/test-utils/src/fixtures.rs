//! Common test fixtures: sample reports, station catalogue lines and
//! provider feed bodies.

/// Sample observation reports.
pub mod metar {
    /// Minimal US-style report with gust, two layers and an altimeter.
    pub const KXYZ_BASIC: &str = "KXYZ 121654Z 27015G25KT 10SM FEW035 OVC250 15/08 A2992";

    /// European report with variable wind sector, metre visibility and QNH.
    pub const EGLL_VARIABLE: &str =
        "EGLL 121650Z 24012KT 200V280 9999 -RA SCT012 BKN025 11/09 Q1008 NOSIG";

    /// Freezing conditions with heavy snow and a remark section.
    pub const CYYZ_SNOW: &str =
        "CYYZ 121700Z 03018G28KT 1/2SM R05/2400FT/D +SN VV008 M05/M07 A2968 RMK SN8 SLP061";

    /// Thunderstorm with cumulonimbus.
    pub const KMIA_TS: &str = "KMIA 121653Z 09008KT 4SM +TSRA BKN020CB OVC080 26/24 A2990";

    /// CAVOK with metres-per-second wind.
    pub const UUEE_CAVOK: &str = "UUEE 121630Z 18004MPS CAVOK M12/M15 Q1030";

    /// Automated report without visibility or cloud groups.
    pub const KAUT_SPARSE: &str = "METAR KAUT 121655Z AUTO 00000KT 12/M01 A3001";

    /// Trend section that must be ignored.
    pub const LFPG_TEMPO: &str =
        "LFPG 121630Z 22010KT 6000 SCT015 12/10 Q1012 TEMPO 3000 SHRA BKN008";
}

/// Station catalogue lines in the fixed-column layout.
pub mod stations {
    /// Format one fixed-column catalogue line.
    #[allow(clippy::too_many_arguments)]
    pub fn station_line(
        name: &str,
        icao: &str,
        lat_deg: u32,
        lat_min: u32,
        ns: char,
        lon_deg: u32,
        lon_min: u32,
        ew: char,
        elevation_m: i32,
    ) -> String {
        format!(
            "{:<20}{:<4}{:<15}{:02} {:02}{}  {:03} {:02}{} {:>4}{:<30}",
            name,
            icao,
            "  XXX   99999",
            lat_deg,
            lat_min,
            ns,
            lon_deg,
            lon_min,
            ew,
            elevation_m,
            "   X     U     A    0 US"
        )
    }

    /// A small catalogue with a header, a comment and three stations.
    pub fn sample_catalogue() -> String {
        [
            "!   ICAO station catalogue".to_string(),
            "CD  STATION         ICAO  IATA  SYNOP   LAT     LONG   ELEV   M  N  V  U  A  C".to_string(),
            station_line("CO DENVER", "KDEN", 39, 50, 'N', 104, 40, 'W', 1655),
            station_line("   LONDON HEATHROW", "EGLL", 51, 29, 'N', 0, 27, 'W', 25),
            station_line("   SYDNEY", "YSSY", 33, 57, 'S', 151, 11, 'E', 6),
        ]
        .join("\n")
    }
}

/// Provider feed bodies.
pub mod feeds {
    /// NOAA CSV cache body (before gzip) with header preamble.
    pub const NOAA_CSV: &str = "No errors\n\
No warnings\n\
5 ms\n\
data source=metars\n\
2 results\n\
raw_text,station_id,observation_time,latitude,longitude,temp_c\n\
KDEN 121653Z 36010KT 10SM FEW080 05/M03 A3012,KDEN,2024-03-12T16:53:00Z,39.85,-104.65,5.0\n\
EGLL 121650Z 24012KT 9999 SCT012 11/09 Q1008,EGLL,2024-03-12T16:50:00Z,51.48,-0.45,11.0\n";

    /// VATSIM plain-text feed.
    pub const VATSIM_TEXT: &str = "KDEN 121653Z 36010KT 10SM FEW080 05/M03 A3012\n\
EGLL 121650Z 24012KT 9999 SCT012 11/09 Q1008\n\
\n";

    /// IVAO JSON feed.
    pub const IVAO_JSON: &str = r#"[
  {"airportIcao": "KDEN", "metar": "KDEN 121653Z 36010KT 10SM FEW080 05/M03 A3012"},
  {"airportIcao": "EGLL", "metar": "EGLL 121650Z 24012KT 9999 SCT012 11/09 Q1008"}
]"#;
}
