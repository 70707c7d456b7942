//! Wind and cloud layers from the resolved column and the nearest report.

use grid_processor::InterpolatedPoint;
use metar_parser::ObservationRecord;
use wx_common::atmosphere::{feet_to_meters, kelvin_to_celsius, ms_to_knots, pressure_to_altitude};
use wx_common::cloud::normalize_layers;
use wx_common::CloudLayer;

use crate::config::FusionConfig;
use crate::derived::{apply_shear_turbulence, edr_turbulence};
use crate::state::{FusedCloudLayer, LayerSource, WindLayer};

/// Thickness bounds applied to layers that borrow their top from the grid.
const MIN_CLOUD_THICKNESS_FT: f64 = 2000.0;
const MAX_CLOUD_THICKNESS_FT: f64 = 40_000.0;

/// An observed base this far below a grid layer still borrows its top.
const CLOUD_MATCH_BELOW_FT: f64 = 1500.0;

/// Grid layers are only added this far above the station.
const GRID_CLOUD_FLOOR_FT: f64 = 5600.0;

fn clamp_thickness(thickness_m: f64) -> f64 {
    thickness_m.clamp(
        feet_to_meters(MIN_CLOUD_THICKNESS_FT),
        feet_to_meters(MAX_CLOUD_THICKNESS_FT),
    )
}

/// Wind layers aloft from every grid level carrying a wind, ordered by
/// altitude.
fn grid_winds(point: &InterpolatedPoint, max_turbulence: f64) -> Vec<WindLayer> {
    let mut winds: Vec<WindLayer> = point
        .levels
        .iter()
        .filter_map(|level| {
            let (direction, speed) = level.wind()?;
            Some(WindLayer {
                altitude_m: level
                    .height_m
                    .unwrap_or_else(|| pressure_to_altitude(level.pressure_hpa)),
                direction_deg: direction,
                speed_kt: ms_to_knots(speed),
                gust_kt: None,
                variation_deg: None,
                shear_deg: 0.0,
                temperature_c: level.temperature_k.map(kelvin_to_celsius),
                dewpoint_c: level.dewpoint_c(),
                turbulence: level.edr.map(edr_turbulence).unwrap_or(0.0).min(max_turbulence),
                source: LayerSource::Grid,
            })
        })
        .collect();
    winds.sort_by(|a, b| a.altitude_m.total_cmp(&b.altitude_m));
    winds
}

/// The observed surface wind, placed `agl_limit_m` above the station.
fn observed_surface_wind(
    record: &ObservationRecord,
    agl_limit_m: f64,
    aloft: &[WindLayer],
) -> Option<WindLayer> {
    let wind = record.wind.as_ref()?;
    let elevation = record.elevation_m.unwrap_or(0.0);

    // VRB arrives as the full 0-360 sector
    let variation = wind.variable_range.map(|(from, to)| match to as f64 - from as f64 {
        width if width >= 360.0 => 360.0,
        width => width.rem_euclid(360.0),
    });
    let direction = match (wind.direction_deg, wind.variable_range, variation) {
        (Some(direction), _, _) => direction as f64,
        (None, Some((from, _)), Some(width)) if width < 360.0 => (from as f64 + width / 2.0) % 360.0,
        // No usable sector: keep the lowest model direction
        _ => aloft.first().map(|w| w.direction_deg).unwrap_or(0.0),
    };
    let variation = variation.or(wind.direction_deg.is_none().then_some(360.0));

    Some(WindLayer {
        altitude_m: elevation + agl_limit_m,
        direction_deg: direction,
        speed_kt: wind.speed_kt,
        gust_kt: wind.gust_kt,
        variation_deg: variation,
        shear_deg: 0.0,
        temperature_c: record.temperature_c,
        dewpoint_c: record.dewpoint_c,
        turbulence: 0.0,
        source: LayerSource::Observation,
    })
}

/// The model 10 m wind, placed `agl_limit_m` above the model terrain.
fn grid_surface_wind(point: &InterpolatedPoint, agl_limit_m: f64) -> Option<WindLayer> {
    let surface = &point.surface;
    let (direction, speed) = surface.wind()?;
    Some(WindLayer {
        altitude_m: surface.elevation_m.unwrap_or(0.0) + agl_limit_m,
        direction_deg: direction,
        speed_kt: ms_to_knots(speed),
        gust_kt: None,
        variation_deg: None,
        shear_deg: 0.0,
        temperature_c: surface.temperature_k.map(kelvin_to_celsius),
        dewpoint_c: surface.dewpoint_k.map(kelvin_to_celsius),
        turbulence: 0.0,
        source: LayerSource::Grid,
    })
}

/// Keep the first and last layers and sample evenly between them.
fn thin_layers(winds: Vec<WindLayer>, max: usize) -> Vec<WindLayer> {
    if winds.len() <= max || max < 2 {
        return winds;
    }
    let last = winds.len() - 1;
    let step = last as f64 / (max - 1) as f64;
    let keep: Vec<usize> = (0..max).map(|i| (i as f64 * step).round() as usize).collect();
    winds
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.binary_search(i).is_ok())
        .map(|(_, w)| w)
        .collect()
}

/// Build the wind layers: the surface wind (observed when available),
/// then grid layers above it, with shear turbulence applied and thinned
/// to `max_wind_layers`.
pub fn build_wind_layers(
    point: &InterpolatedPoint,
    observation: Option<&ObservationRecord>,
    config: &FusionConfig,
) -> Vec<WindLayer> {
    let agl_limit = config.metar_agl_limit_m;
    let aloft = grid_winds(point, config.max_turbulence);

    let surface = observation
        .and_then(|record| observed_surface_wind(record, agl_limit, &aloft))
        .or_else(|| grid_surface_wind(point, agl_limit));

    let mut winds = Vec::with_capacity(aloft.len() + 1);
    match surface {
        Some(surface) => {
            let floor = surface.altitude_m + agl_limit;
            winds.push(surface);
            winds.extend(aloft.into_iter().filter(|w| w.altitude_m > floor));
        }
        None => {
            let floor = point.surface.elevation_m.unwrap_or(f64::NEG_INFINITY);
            winds.extend(aloft.into_iter().filter(|w| w.altitude_m > floor));
        }
    }

    apply_shear_turbulence(&mut winds, config.max_turbulence);
    thin_layers(winds, config.max_wind_layers)
}

/// Merge observed and model clouds, altitudes MSL.
///
/// Observed layers are placed over the station and take their top from an
/// overlapping model layer. Model layers fill in above the observed ones,
/// well clear of what a surface observer can see. Without an observed
/// cloud group the model layers are used alone. At most `max_layers` of
/// the lowest layers are kept.
pub fn merge_clouds(
    grid: &[CloudLayer],
    observation: Option<&ObservationRecord>,
    max_layers: usize,
) -> Vec<FusedCloudLayer> {
    let mut model: Vec<CloudLayer> = grid
        .iter()
        .map(|layer| CloudLayer {
            top_m: layer.base_m + clamp_thickness(layer.thickness_m()),
            ..*layer
        })
        .collect();
    normalize_layers(&mut model);

    let observed = observation.and_then(|record| Some((record.clouds.as_ref()?, record.elevation_m.unwrap_or(0.0))));

    let mut merged: Vec<FusedCloudLayer> = match observed {
        None => model
            .into_iter()
            .map(|layer| FusedCloudLayer {
                layer,
                source: LayerSource::Grid,
            })
            .collect(),
        Some((clouds, elevation)) => {
            let match_below = feet_to_meters(CLOUD_MATCH_BELOW_FT);
            let mut layers: Vec<CloudLayer> = clouds
                .iter()
                .map(|agl| {
                    let layer = agl.offset(elevation);
                    match grid
                        .iter()
                        .find(|g| g.base_m - match_below < layer.base_m && layer.base_m < g.top_m)
                    {
                        Some(g) => CloudLayer {
                            top_m: layer.base_m + clamp_thickness(g.thickness_m()),
                            ..layer
                        },
                        None => layer,
                    }
                })
                .collect();
            normalize_layers(&mut layers);

            let floor = layers
                .iter()
                .map(|l| l.top_m)
                .fold(elevation + feet_to_meters(GRID_CLOUD_FLOOR_FT), f64::max);

            layers
                .into_iter()
                .map(|layer| FusedCloudLayer {
                    layer,
                    source: LayerSource::Observation,
                })
                .chain(model.into_iter().filter(|l| l.base_m > floor).map(|layer| FusedCloudLayer {
                    layer,
                    source: LayerSource::Grid,
                }))
                .collect()
        }
    };

    merged.truncate(max_layers);
    merged
}
