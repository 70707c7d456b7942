//! Legacy `METAR.rwx` sink for tools that only read files.
//!
//! Each line is `ICAO <report>`, where the report is re-encoded from the
//! decoded fields in a canonical fixed-width form.

use std::io::Write;
use std::path::Path;

use chrono::{Datelike, Timelike};
use tempfile::NamedTempFile;
use tracing::info;
use wx_common::atmosphere::meters_to_feet;
use wx_common::Coverage;

use crate::report::{
    DistanceUnit, ObservationRecord, PressureUnit, VisibilityQualifier,
};
use crate::FeedError;

/// File name expected by the simulator.
pub const RWX_FILE_NAME: &str = "METAR.rwx";

/// Re-encode a record without its station identifier.
pub fn encode_report(record: &ObservationRecord) -> String {
    let mut groups: Vec<String> = Vec::new();
    let t = record.observed_at;
    groups.push(format!("{:02}{:02}{:02}Z", t.day(), t.hour(), t.minute()));

    if record.nil {
        groups.push("NIL".to_string());
        return groups.join(" ");
    }
    if record.auto {
        groups.push("AUTO".to_string());
    }

    if let Some(wind) = &record.wind {
        let direction = match wind.direction_deg {
            Some(d) => format!("{:03}", d),
            None => "VRB".to_string(),
        };
        let gust = wind
            .gust_kt
            .map(|g| format!("G{:02}", g.round() as u32))
            .unwrap_or_default();
        groups.push(format!("{}{:02}{}KT", direction, wind.speed_kt.round() as u32, gust));
        if let (Some(_), Some((from, to))) = (wind.direction_deg, wind.variable_range) {
            groups.push(format!("{:03}V{:03}", from, to));
        }
    }

    let cavok = record.visibility.is_some_and(|v| v.cavok);
    if let Some(vis) = &record.visibility {
        groups.push(if vis.cavok {
            "CAVOK".to_string()
        } else {
            encode_visibility(vis.value, vis.unit, vis.qualifier, vis.meters())
        });
    }

    for w in &record.weather {
        groups.push(w.to_code());
    }

    if !cavok {
        match &record.clouds {
            Some(layers) if layers.is_empty() => groups.push("CLR".to_string()),
            Some(layers) => {
                for layer in layers {
                    let hundreds = (meters_to_feet(layer.base_m) / 100.0).round() as u32;
                    let code = match layer.coverage {
                        Coverage::Clear => continue,
                        c => c.as_code(),
                    };
                    let kind = layer.cloud_type.map(|t| t.as_code()).unwrap_or("");
                    groups.push(format!("{}{:03}{}", code, hundreds, kind));
                }
            }
            None => {}
        }
    }

    if let Some(t) = record.temperature_c {
        let dew = record.dewpoint_c.map(encode_temperature).unwrap_or_default();
        groups.push(format!("{}/{}", encode_temperature(t), dew));
    }

    if let Some(p) = &record.pressure {
        groups.push(match p.unit {
            PressureUnit::InchesHg => format!("A{:04}", (p.value * 100.0).round() as u32),
            PressureUnit::Hectopascal => format!("Q{:04}", p.value.round() as u32),
        });
    }

    groups.join(" ")
}

fn encode_temperature(c: f64) -> String {
    let rounded = c.round() as i32;
    if rounded < 0 {
        format!("M{:02}", -rounded)
    } else {
        format!("{:02}", rounded)
    }
}

fn encode_visibility(
    value: f64,
    unit: DistanceUnit,
    qualifier: VisibilityQualifier,
    meters: f64,
) -> String {
    match unit {
        DistanceUnit::StatuteMiles => {
            let prefix = match qualifier {
                VisibilityQualifier::AtLeast => "P",
                VisibilityQualifier::LessThan => "M",
                VisibilityQualifier::Exact => "",
            };
            let whole = value.trunc();
            let frac = value - whole;
            let text = if frac.abs() < 1e-6 {
                format!("{}", whole as u32)
            } else {
                // Quarter-mile resolution, as reported in practice
                let quarters = (frac * 4.0).round() as u32;
                let (num, den) = match quarters {
                    2 => (1, 2),
                    q => (q, 4),
                };
                if whole >= 1.0 {
                    format!("{} {}/{}", whole as u32, num, den)
                } else {
                    format!("{}/{}", num, den)
                }
            };
            format!("{}{}SM", prefix, text)
        }
        _ => {
            if meters >= 9999.0 {
                "9999".to_string()
            } else {
                format!("{:04}", meters.round() as u32)
            }
        }
    }
}

/// One `METAR.rwx` line.
pub fn rwx_line(record: &ObservationRecord) -> String {
    format!("{} {}", record.station, encode_report(record))
}

/// Write all records to `path` atomically: the file is replaced only once
/// the new content is complete.
pub fn write_rwx_file<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a ObservationRecord>,
) -> Result<usize, FeedError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;

    let mut lines = 0usize;
    for record in records {
        writeln!(tmp, "{}", rwx_line(record))?;
        lines += 1;
    }
    tmp.flush()?;
    tmp.persist(path).map_err(|e| FeedError::Io(e.error))?;

    info!(path = %path.display(), lines = lines, "Wrote legacy observation file");
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_temperature() {
        assert_eq!(encode_temperature(15.0), "15");
        assert_eq!(encode_temperature(-5.0), "M05");
        assert_eq!(encode_temperature(-0.2), "00");
    }

    #[test]
    fn test_encode_visibility() {
        let vis = |v, u, q| encode_visibility(v, u, q, 0.0);
        assert_eq!(vis(10.0, DistanceUnit::StatuteMiles, VisibilityQualifier::Exact), "10SM");
        assert_eq!(vis(0.5, DistanceUnit::StatuteMiles, VisibilityQualifier::Exact), "1/2SM");
        assert_eq!(vis(1.5, DistanceUnit::StatuteMiles, VisibilityQualifier::Exact), "1 1/2SM");
        assert_eq!(vis(6.0, DistanceUnit::StatuteMiles, VisibilityQualifier::AtLeast), "P6SM");
        assert_eq!(encode_visibility(800.0, DistanceUnit::Meters, VisibilityQualifier::Exact, 800.0), "0800");
        assert_eq!(
            encode_visibility(10_000.0, DistanceUnit::Meters, VisibilityQualifier::AtLeast, 10_000.0),
            "9999"
        );
    }
}
