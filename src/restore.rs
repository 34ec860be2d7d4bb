// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The restorer (component G): convolve clean components with a
//! Gaussian restoring beam and add the CLEAN residual back in, with an
//! optional primary-beam correction.
//!
//! Established components are restored first, then tentative ones, so a
//! caller previewing an uncommitted CLEAN run sees the established
//! source structure underneath it rather than tentative-only flux.

use ndarray::Array2;

use crate::constants::FWHM_TO_SIGMA;
use crate::grid::{GridError, GridState, MapBeamGrid};
use crate::model::{Model, ModelStore};

/// The Gaussian restoring beam and optional primary-beam model.
#[derive(Clone, Copy, Debug)]
pub struct RestoreParams {
    /// Major axis FWHM, radians.
    pub bmaj: f64,
    /// Minor axis FWHM, radians.
    pub bmin: f64,
    /// Position angle, radians east of north.
    pub pa: f64,
    /// Primary beam FWHM, radians; `None` disables primary-beam
    /// correction (division by the primary beam response).
    pub primary_beam_fwhm: Option<f64>,
    /// Omit the residual entirely, leaving a pure clean-component map.
    pub noresid: bool,
    /// Smooth the residual by the target Gaussian before adding it, so
    /// its resolution matches the restored components. Ignored if
    /// `noresid` is set.
    pub dosm: bool,
}

/// Convolve `model`'s components with the restoring beam and add the
/// current residual (`grid.dirty_map`), storing the result in
/// `grid.restored_map`. Requires a dirty map/beam pair to already be
/// current.
pub fn restore(
    grid: &mut MapBeamGrid,
    model: &ModelStore,
    params: RestoreParams,
    freq: f64,
) -> Result<(), GridError> {
    let model_gen = match grid.state {
        GridState::Stale => return Err(GridError::NoBeam),
        GridState::DirtyMap { vis_gen } => vis_gen,
        GridState::Restored { model_gen } => model_gen,
        GridState::PolResidual | GridState::PolRestored => 0,
    };

    let (ny, nx) = grid.dirty_map.dim();
    let mut clean_map = Array2::<f64>::zeros((ny, nx));

    let sigma_x = (params.bmaj * FWHM_TO_SIGMA) / grid.cell_size;
    let sigma_y = (params.bmin * FWHM_TO_SIGMA) / grid.cell_size;

    restore_model(&mut clean_map, &model.established, freq, nx, ny, grid.cell_size, sigma_x, sigma_y, params.pa);
    restore_model(&mut clean_map, &model.tentative, freq, nx, ny, grid.cell_size, sigma_x, sigma_y, params.pa);

    if !params.noresid {
        if params.dosm {
            clean_map += &smooth_gaussian(&grid.dirty_map, sigma_x, sigma_y, params.pa);
        } else {
            clean_map += &grid.dirty_map;
        }
    }

    if let Some(pb_fwhm) = params.primary_beam_fwhm {
        let pb_sigma = (pb_fwhm * FWHM_TO_SIGMA) / grid.cell_size;
        for ((y, x), val) in clean_map.indexed_iter_mut() {
            let dx = x as f64 - nx as f64 / 2.0;
            let dy = y as f64 - ny as f64 / 2.0;
            let r2 = dx * dx + dy * dy;
            let response = (-r2 / (2.0 * pb_sigma * pb_sigma)).exp().max(1e-3);
            *val /= response;
        }
    }

    grid.restored_map = Some(clean_map);
    grid.state = GridState::Restored { model_gen };
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn restore_model(
    clean_map: &mut Array2<f64>,
    model: &Model,
    freq: f64,
    nx: usize,
    ny: usize,
    cell_size: f64,
    sigma_x: f64,
    sigma_y: f64,
    pa: f64,
) {
    for c in &model.components {
        let flux = c.flux_at(freq);
        let cx = nx as f64 / 2.0 + c.x / cell_size;
        let cy = ny as f64 / 2.0 - c.y / cell_size;
        add_gaussian(clean_map, cx, cy, flux, sigma_x, sigma_y, pa);
    }
}

/// Add a unit-integral elliptical Gaussian scaled by `flux` centred on
/// fractional pixel `(cx, cy)`, restricted to a `+-5 sigma` bounding box
/// for tractability.
fn add_gaussian(
    map: &mut Array2<f64>,
    cx: f64,
    cy: f64,
    flux: f64,
    sigma_x: f64,
    sigma_y: f64,
    pa: f64,
) {
    let (ny, nx) = map.dim();
    if sigma_x <= 0.0 || sigma_y <= 0.0 {
        let px = cx.round();
        let py = cy.round();
        if px >= 0.0 && py >= 0.0 && (px as usize) < nx && (py as usize) < ny {
            map[(py as usize, px as usize)] += flux;
        }
        return;
    }
    let radius = (5.0 * sigma_x.max(sigma_y)).ceil() as isize;
    let (s, c) = pa.sin_cos();
    let norm = 1.0 / (2.0 * std::f64::consts::PI * sigma_x * sigma_y);

    let x0 = (cx.floor() as isize - radius).max(0);
    let x1 = (cx.ceil() as isize + radius).min(nx as isize - 1);
    let y0 = (cy.floor() as isize - radius).max(0);
    let y1 = (cy.ceil() as isize + radius).min(ny as isize - 1);

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            // Rotate into the beam's major/minor frame.
            let u = dx * c + dy * s;
            let v = -dx * s + dy * c;
            let exponent = -0.5 * ((u * u) / (sigma_x * sigma_x) + (v * v) / (sigma_y * sigma_y));
            map[(y as usize, x as usize)] += flux * norm * exponent.exp();
        }
    }
}

/// Convolve `map` with the same elliptical Gaussian kernel used to
/// restore components, for the `dosm` residual-smoothing option.
fn smooth_gaussian(map: &Array2<f64>, sigma_x: f64, sigma_y: f64, pa: f64) -> Array2<f64> {
    let (ny, nx) = map.dim();
    if sigma_x <= 0.0 || sigma_y <= 0.0 {
        return map.clone();
    }
    let radius = (5.0 * sigma_x.max(sigma_y)).ceil() as isize;
    let (s, c) = pa.sin_cos();
    let mut kernel = Vec::new();
    let mut norm = 0.0;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let u = dx as f64 * c + dy as f64 * s;
            let v = -(dx as f64) * s + dy as f64 * c;
            let w = (-0.5 * ((u * u) / (sigma_x * sigma_x) + (v * v) / (sigma_y * sigma_y))).exp();
            kernel.push((dx, dy, w));
            norm += w;
        }
    }
    let mut out = Array2::zeros((ny, nx));
    for ((y, x), &val) in map.indexed_iter() {
        if val == 0.0 {
            continue;
        }
        for &(dx, dy, w) in &kernel {
            let ty = y as isize + dy;
            let tx = x as isize + dx;
            if ty >= 0 && tx >= 0 && (ty as usize) < ny && (tx as usize) < nx {
                out[(ty as usize, tx as usize)] += val * w / norm;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MapBeamGrid;
    use crate::model::Component;

    fn fresh_grid() -> MapBeamGrid {
        let mut grid = MapBeamGrid::new(32, 32, 1.0e-2).unwrap();
        grid.dirty_map = Array2::zeros((32, 32));
        grid.beam = Array2::zeros((32, 32));
        grid.state = GridState::DirtyMap { vis_gen: 1 };
        grid
    }

    #[test]
    fn restore_requires_non_stale_grid() {
        let mut grid = MapBeamGrid::new(16, 16, 1.0e-2).unwrap();
        let model = ModelStore::default();
        let err = restore(
            &mut grid,
            &model,
            RestoreParams {
                bmaj: 1.0e-3,
                bmin: 1.0e-3,
                pa: 0.0,
                primary_beam_fwhm: None,
                noresid: false,
                dosm: false,
            },
            1.0e9,
        )
        .unwrap_err();
        assert!(matches!(err, GridError::NoBeam));
    }

    #[test]
    fn restore_conserves_total_flux_roughly() {
        let mut grid = fresh_grid();
        let mut model = ModelStore::default();
        model.add(Component::point(1.0, 0.0, 0.0), false);
        restore(
            &mut grid,
            &model,
            RestoreParams {
                bmaj: 5.0e-2,
                bmin: 5.0e-2,
                pa: 0.0,
                primary_beam_fwhm: None,
                noresid: false,
                dosm: false,
            },
            1.0e9,
        )
        .unwrap();
        let total: f64 = grid.restored_map.as_ref().unwrap().iter().sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn established_and_tentative_both_appear() {
        let mut grid = fresh_grid();
        let mut model = ModelStore::default();
        model.add(Component::point(1.0, 0.0, 0.0), false);
        model.add(Component::point(0.5, 0.1, 0.0), true);
        restore(
            &mut grid,
            &model,
            RestoreParams {
                bmaj: 5.0e-2,
                bmin: 5.0e-2,
                pa: 0.0,
                primary_beam_fwhm: None,
                noresid: false,
                dosm: false,
            },
            1.0e9,
        )
        .unwrap();
        let total: f64 = grid.restored_map.as_ref().unwrap().iter().sum();
        assert!((total - 1.5).abs() < 1e-2);
    }
}
