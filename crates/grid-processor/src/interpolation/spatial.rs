//! Bilinear sampling on regular lat/lon grids.
//!
//! Column selection wraps in longitude on global grids. Between the outermost
//! row and a pole, the missing row is filled with the same row read 180°
//! away, which is where the grid continues on the far side of the pole.

use wx_common::{GeoPoint, InterpolationError, LatLonGrid};

/// Total weight below which a sample is considered missing.
const MIN_WEIGHT: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Corner {
    index: usize,
    weight: f64,
    /// Read across the pole, where grid-relative vector components reverse
    mirrored: bool,
}

/// Two columns of one grid row and the eastward fraction between them.
struct RowSpan {
    row: usize,
    i0: usize,
    i1: usize,
    fx: f64,
    mirrored: bool,
}

fn row_span(grid: &LatLonGrid, row: usize, lon: f64, mirrored: bool) -> RowSpan {
    let x = grid.fractional_column(lon);
    let last_col = grid.ni - 1;

    if grid.wraps_longitude() {
        let i0 = (x.floor() as usize) % grid.ni;
        RowSpan {
            row,
            i0,
            i1: (i0 + 1) % grid.ni,
            fx: x - x.floor(),
            mirrored,
        }
    } else if x >= last_col as f64 {
        RowSpan {
            row,
            i0: last_col,
            i1: last_col,
            fx: 0.0,
            mirrored,
        }
    } else {
        let i0 = x.floor() as usize;
        RowSpan {
            row,
            i0,
            i1: i0 + 1,
            fx: x - i0 as f64,
            mirrored,
        }
    }
}

/// The four grid points surrounding a location and their bilinear weights.
///
/// A stencil depends only on grid geometry, so one stencil serves every
/// field of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
    corners: [Corner; 4],
}

impl Stencil {
    /// Build the stencil for `point`, or fail with `NoCoverage` when the
    /// grid does not reach it.
    pub fn new(grid: &LatLonGrid, point: &GeoPoint) -> Result<Self, InterpolationError> {
        if !grid.covers(point) {
            return Err(InterpolationError::no_coverage(format!(
                "{} is outside the {}x{} grid at ({}, {})",
                point, grid.ni, grid.nj, grid.lat0, grid.lon0
            )));
        }

        let last_row = grid.nj - 1;
        let y = grid.fractional_row(point.lat);

        let (near, far, fy) = if y < 0.0 {
            (
                row_span(grid, 0, point.lon + 180.0, true),
                row_span(grid, 0, point.lon, false),
                y + 1.0,
            )
        } else if y > last_row as f64 {
            (
                row_span(grid, last_row, point.lon, false),
                row_span(grid, last_row, point.lon + 180.0, true),
                y - last_row as f64,
            )
        } else {
            let j0 = (y.floor() as usize).min(last_row.saturating_sub(1));
            let j1 = (j0 + 1).min(last_row);
            (
                row_span(grid, j0, point.lon, false),
                row_span(grid, j1, point.lon, false),
                y - j0 as f64,
            )
        };

        let corner = |span: &RowSpan, i: usize, weight: f64| Corner {
            index: grid.index(i, span.row),
            weight,
            mirrored: span.mirrored,
        };

        Ok(Self {
            corners: [
                corner(&near, near.i0, (1.0 - near.fx) * (1.0 - fy)),
                corner(&near, near.i1, near.fx * (1.0 - fy)),
                corner(&far, far.i0, (1.0 - far.fx) * fy),
                corner(&far, far.i1, far.fx * fy),
            ],
        })
    }

    /// Interpolate a scalar field.
    ///
    /// Missing corners (NaN or out of range) are left out and the remaining
    /// weights renormalized. Returns `None` when nothing usable remains.
    pub fn sample(&self, values: &[f32]) -> Option<f64> {
        self.weighted(values, false)
    }

    /// Interpolate one grid-relative vector component, reversing the sign of
    /// corners read across the pole.
    pub fn sample_vector(&self, values: &[f32]) -> Option<f64> {
        self.weighted(values, true)
    }

    fn weighted(&self, values: &[f32], vector: bool) -> Option<f64> {
        let mut sum = 0.0;
        let mut total = 0.0;

        for corner in &self.corners {
            if corner.weight <= 0.0 {
                continue;
            }
            let Some(&v) = values.get(corner.index) else {
                continue;
            };
            if !v.is_finite() {
                continue;
            }
            let v = if vector && corner.mirrored { -(v as f64) } else { v as f64 };
            sum += corner.weight * v;
            total += corner.weight;
        }

        if total < MIN_WEIGHT {
            None
        } else {
            Some(sum / total)
        }
    }
}
