// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The deconvolver (component F): a Hogbom-style iterative CLEAN.
//!
//! Each iteration finds the window-admitted residual peak, deposits a
//! point component at that pixel into the model store's tentative list,
//! and subtracts a gain-scaled, shifted copy of the dirty beam from the
//! residual. The beam is wrapped at the map edges rather than truncated,
//! which is the classic simplification real CLEAN implementations make
//! when they don't pad the map to avoid aliasing.

use thiserror::Error;

use crate::grid::{GridState, MapBeamGrid};
use crate::model::{Component, ModelStore};
use crate::windows::WindowList;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("the map is stale; run `invert` before `clean`")]
    MapStale,
    #[error("the dirty beam is unusable (no positive peak); run `invert` with usable data first")]
    NoBeam,
    #[error("no clean windows admit any map pixel")]
    NoAdmittedPixels,
    #[error("clean loop gain must be in (0, 1], got {0}")]
    BadGain(f64),
}

/// CLEAN loop control parameters.
#[derive(Clone, Copy, Debug)]
pub struct CleanParams {
    pub gain: f64,
    pub niter: usize,
    /// Stop once the residual peak drops below this absolute flux.
    pub cutoff: f64,
}

impl Default for CleanParams {
    fn default() -> Self {
        CleanParams {
            gain: crate::constants::DEFAULT_CLEAN_GAIN,
            niter: 100,
            cutoff: 0.0,
        }
    }
}

/// Outcome of a `clean` run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CleanResult {
    pub n_components: usize,
    pub total_flux: f64,
    pub peak_residual: f64,
    pub converged: bool,
}

/// Run CLEAN against the map's current dirty map, depositing components
/// into `model`'s tentative list and leaving the residual in
/// `grid.dirty_map`. The caller decides whether to accept the result via
/// [`crate::model::ModelStore::commit_tentative`] or discard it via
/// [`crate::model::ModelStore::clear_tentative`].
pub fn clean(
    grid: &mut MapBeamGrid,
    windows: &WindowList,
    model: &mut ModelStore,
    params: CleanParams,
) -> Result<CleanResult, CleanError> {
    if matches!(grid.state, GridState::Stale) {
        return Err(CleanError::MapStale);
    }
    if !grid.has_beam() {
        return Err(CleanError::NoBeam);
    }
    if !(0.0 < params.gain && params.gain <= 1.0) {
        return Err(CleanError::BadGain(params.gain));
    }

    let (ny, nx) = grid.dirty_map.dim();
    if !(0..ny).any(|y| (0..nx).any(|x| windows.admits(x, y))) {
        return Err(CleanError::NoAdmittedPixels);
    }

    let mut n_components = 0;
    let mut total_flux = 0.0;
    let mut peak_residual = 0.0;
    let mut converged = false;

    for _ in 0..params.niter {
        let (py, px, peak) = find_admitted_peak(&grid.dirty_map, windows);
        peak_residual = peak.abs();
        if peak_residual <= params.cutoff {
            converged = true;
            break;
        }

        let delta_flux = params.gain * peak;
        subtract_beam(&mut grid.dirty_map, &grid.beam, py, px, delta_flux);

        let east = (px as f64 - nx as f64 / 2.0) * grid.cell_size;
        let north = (ny as f64 / 2.0 - py as f64) * grid.cell_size;
        model.add(Component::point(delta_flux, east, north), true);

        n_components += 1;
        total_flux += delta_flux;
    }

    // The dirty beam (PSF) is untouched by CLEAN; only the residual map
    // changes, which is exactly what `restore` expects to consume next.
    // The grid is left in its current `DirtyMap`/`Restored` state rather
    // than forced `Stale`.
    Ok(CleanResult {
        n_components,
        total_flux,
        peak_residual,
        converged,
    })
}

fn find_admitted_peak(
    residual: &ndarray::Array2<f64>,
    windows: &WindowList,
) -> (usize, usize, f64) {
    let mut best = (0usize, 0usize, 0.0f64);
    let mut best_mag = f64::MIN;
    for ((y, x), &val) in residual.indexed_iter() {
        if !windows.admits(x, y) {
            continue;
        }
        if val.abs() > best_mag {
            best_mag = val.abs();
            best = (y, x, val);
        }
    }
    best
}

fn subtract_beam(
    residual: &mut ndarray::Array2<f64>,
    beam: &ndarray::Array2<f64>,
    py: usize,
    px: usize,
    flux: f64,
) {
    let (ny, nx) = residual.dim();
    let (byc, bxc) = (ny / 2, nx / 2);
    let dy = py as isize - byc as isize;
    let dx = px as isize - bxc as isize;
    for ((by, bx), &bval) in beam.indexed_iter() {
        let ry = ((by as isize + dy).rem_euclid(ny as isize)) as usize;
        let rx = ((bx as isize + dx).rem_euclid(nx as isize)) as usize;
        residual[(ry, rx)] -= flux * bval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Selection;
    use crate::visibility::{IfDescriptor, Integration, SubArray, Telescope, Visibility};

    fn single_point_source_grid() -> (MapBeamGrid, ModelStore) {
        let telescopes = vec![
            Telescope {
                name: "A".into(),
                xyz: (0.0, 0.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
            Telescope {
                name: "B".into(),
                xyz: (100.0, 0.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
            Telescope {
                name: "C".into(),
                xyz: (0.0, 100.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
        ];
        let mut sa = SubArray::new(telescopes, 1);
        let uv_points = [
            (20.0, 0.0),
            (0.0, 20.0),
            (15.0, 15.0),
            (-15.0, 15.0),
            (25.0, 5.0),
        ];
        let mut vis = Vec::new();
        for &(u, v) in &uv_points {
            vis.push(vec![vec![Visibility {
                amp: 1.0,
                phase: 0.0,
                weight: 1.0,
                flagged: false,
                u,
                v,
                w: 0.0,
                model_amp: 0.0,
                model_phase: 0.0,
            }]]);
        }
        sa.integrations.push(Integration { time: 0.0, vis });
        let store = crate::visibility::VisibilityStore::new(
            vec![sa],
            vec![IfDescriptor {
                freq: 1.0,
                df: 1.0,
                bandwidth: 1.0,
                channel_offset: 0,
                nchan: 1,
            }],
        );
        let mut grid = MapBeamGrid::new(32, 32, 5.0e-2).unwrap();
        let selection = Selection::default();
        grid.invert(&store, &selection, None, 1).unwrap();
        (grid, ModelStore::default())
    }

    #[test]
    fn clean_requires_fresh_map() {
        let (mut grid, mut model) = single_point_source_grid();
        grid.state = crate::grid::GridState::Stale;
        let windows = WindowList::default();
        let err = clean(&mut grid, &windows, &mut model, CleanParams::default()).unwrap_err();
        assert!(matches!(err, CleanError::MapStale));
    }

    #[test]
    fn clean_deposits_components_and_reduces_peak() {
        let (mut grid, mut model) = single_point_source_grid();
        let windows = WindowList::default();
        let peak_before = grid
            .dirty_map
            .iter()
            .cloned()
            .fold(0.0_f64, |a, b| a.max(b.abs()));
        let result = clean(
            &mut grid,
            &windows,
            &mut model,
            CleanParams {
                gain: 0.1,
                niter: 20,
                cutoff: 0.0,
            },
        )
        .unwrap();
        assert_eq!(result.n_components, 20);
        assert_eq!(model.tentative.components.len(), 20);
        assert!(result.peak_residual < peak_before);
    }

    #[test]
    fn clean_rejects_unusable_beam() {
        let (mut grid, mut model) = single_point_source_grid();
        grid.beam = ndarray::Array2::zeros(grid.beam.dim());
        let windows = WindowList::default();
        let err = clean(&mut grid, &windows, &mut model, CleanParams::default()).unwrap_err();
        assert!(matches!(err, CleanError::NoBeam));
    }

    #[test]
    fn clean_rejects_bad_gain() {
        let (mut grid, mut model) = single_point_source_grid();
        let windows = WindowList::default();
        let err = clean(
            &mut grid,
            &windows,
            &mut model,
            CleanParams {
                gain: 1.5,
                ..CleanParams::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, CleanError::BadGain(_)));
    }
}
