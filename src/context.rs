// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The observation context: a single, explicit handle onto every
//! component (visibility store, selection, model store, map/beam grid,
//! clean windows, edit queue) rather than a process-wide implicit
//! global, per the "global observation handle" redesign.
//!
//! Generation counters (`vis_gen`, `model_gen`) are bumped by any
//! mutation that invalidates downstream state, and are what
//! [`crate::grid::GridState`] records against so a consumer can tell a
//! cached map apart from a stale one without re-diffing the arrays.

use crate::clean::{self, CleanParams, CleanResult};
use crate::config::Settings;
use crate::edit::{EditEngine, EditOp};
use crate::error::DifmapError;
use crate::grid::{MapBeamGrid, WeightingParams};
use crate::model::ModelStore;
use crate::projection::Projection;
use crate::restore::{self, RestoreParams};
use crate::selection::{ChannelRangeList, Polarization, Selection};
use crate::selfcal::{self, SelfCalParams, SelfCalResult};
use crate::snapshot::Snapshot;
use crate::visibility::VisibilityStore;
use crate::windows::WindowList;

/// The phase-tracking centre and projection an observation was loaded
/// with.
#[derive(Clone, Copy, Debug)]
pub struct PhaseCentre {
    pub ra0: f64,
    pub dec0: f64,
    pub projection: Projection,
}

/// The single handle tying every component together for one
/// interactive session.
pub struct Observation {
    pub settings: Settings,
    pub vis: VisibilityStore,
    pub selection: Selection,
    pub model: ModelStore,
    pub grid: Option<MapBeamGrid>,
    pub windows: WindowList,
    pub edits: EditEngine,
    pub snapshot: Snapshot,
    pub phase_centre: PhaseCentre,

    /// When enabled, `select` swaps the established/tentative model out
    /// to (and in from) the multi-model table under the old/new
    /// selection's key, rather than leaving it resident across
    /// selections.
    multi_model: bool,

    vis_gen: u64,
    model_gen: u64,
    accumulated_east: f64,
    accumulated_north: f64,
}

impl Observation {
    pub fn new(settings: Settings, phase_centre: PhaseCentre) -> Self {
        Observation {
            settings,
            vis: VisibilityStore::default(),
            selection: Selection::default(),
            model: ModelStore::default(),
            grid: None,
            windows: WindowList::default(),
            edits: EditEngine::default(),
            snapshot: Snapshot::default(),
            phase_centre,
            multi_model: false,
            vis_gen: 0,
            model_gen: 0,
            accumulated_east: 0.0,
            accumulated_north: 0.0,
        }
    }

    /// Enable or disable multi-model mode. Disabling it leaves whatever
    /// model happens to be resident in place; it does not flush the
    /// multi-model table.
    pub fn set_multi_model(&mut self, enabled: bool) {
        self.multi_model = enabled;
    }

    /// Change the active polarization/channel selection. In multi-model
    /// mode, the model resident for the outgoing selection is recorded
    /// into the multi-model table under its key, and the model recorded
    /// under the incoming selection's key (empty if none) is installed
    /// in its place.
    pub fn select(
        &mut self,
        polarization: Polarization,
        channels: ChannelRangeList,
        available: &[Polarization],
    ) -> Result<(), DifmapError> {
        let old_key = self.selection.key();
        self.selection.select(polarization, channels, available)?;
        if self.multi_model {
            let new_key = self.selection.key();
            self.model.record_selection(old_key);
            self.model.install_selection(&new_key);
        }
        Ok(())
    }

    /// Replace the visibility store wholesale (as `observe` does when
    /// loading a new file) and bump the visibility generation so the
    /// grid is understood to be stale even if its arrays happen to
    /// still be allocated at the right size.
    pub fn observe(&mut self, store: VisibilityStore) {
        self.vis = store;
        self.vis_gen += 1;
        if let Some(grid) = &mut self.grid {
            grid.invalidate();
        }
    }

    pub fn mapsize(&mut self, nx: usize, ny: usize, cell_size: f64) -> Result<(), DifmapError> {
        match &mut self.grid {
            Some(grid) => grid.mapsize(nx, ny, cell_size)?,
            None => self.grid = Some(MapBeamGrid::new(nx, ny, cell_size)?),
        }
        Ok(())
    }

    pub fn set_weighting(&mut self, weighting: WeightingParams) -> Result<(), DifmapError> {
        let grid = self.grid.as_mut().ok_or(DifmapError::NoMap)?;
        grid.weighting = weighting;
        grid.invalidate();
        Ok(())
    }

    /// Grid the current selection and invert to a dirty map/beam.
    pub fn invert(&mut self) -> Result<(), DifmapError> {
        let grid = self.grid.as_mut().ok_or(DifmapError::NoMap)?;
        grid.invert(&self.vis, &self.selection, None, self.vis_gen)?;
        Ok(())
    }

    /// Grid the residual of the current selection against the
    /// established+tentative model.
    pub fn invert_residual(&mut self) -> Result<(), DifmapError> {
        let grid = self.grid.as_mut().ok_or(DifmapError::NoMap)?;
        grid.invert(&self.vis, &self.selection, Some(&self.model), self.vis_gen)?;
        Ok(())
    }

    pub fn clean(&mut self, params: CleanParams) -> Result<CleanResult, DifmapError> {
        let grid = self.grid.as_mut().ok_or(DifmapError::NoMap)?;
        let result = clean::clean(grid, &self.windows, &mut self.model, params)?;
        Ok(result)
    }

    pub fn commit_clean(&mut self) {
        self.model.commit_tentative();
        self.model_gen += 1;
    }

    pub fn discard_clean(&mut self) {
        self.model.clear_tentative();
    }

    pub fn restore(&mut self, params: RestoreParams, freq: f64) -> Result<(), DifmapError> {
        let grid = self.grid.as_mut().ok_or(DifmapError::NoMap)?;
        restore::restore(grid, &self.model, params, freq)?;
        Ok(())
    }

    /// Self-calibrate every sub-array's telescopes on `if_index`,
    /// partitioning each sub-array's integrations into `params.solint`
    /// minute-long intervals (or one interval per integration when
    /// `solint` is `0.0`) and solving each independently.
    pub fn selfcal(&mut self, if_index: usize, freq: f64, params: SelfCalParams) -> Result<Vec<SelfCalResult>, DifmapError> {
        if self.model.total_flux(freq) <= 0.0 {
            return Err(crate::selfcal::SelfCalError::NoModel.into());
        }
        let mut results = Vec::new();
        for sa in &mut self.vis.sub_arrays {
            for (start, end) in selfcal::solve_intervals(&sa.integrations, params.solint) {
                let result = selfcal::calibrate(sa, start, end, if_index, &self.model, freq, params)?;
                results.push(result);
            }
        }
        self.vis_gen += 1;
        if let Some(grid) = &mut self.grid {
            grid.invalidate();
        }
        Ok(results)
    }

    pub fn gscale(&mut self, if_index: usize, freq: f64, dophs: bool) -> Result<Vec<f64>, DifmapError> {
        let mut scales = Vec::with_capacity(self.vis.sub_arrays.len());
        for sa in &mut self.vis.sub_arrays {
            scales.push(selfcal::gscale(sa, if_index, &self.model, freq, dophs)?);
        }
        self.vis_gen += 1;
        Ok(scales)
    }

    pub fn uncalib(&mut self, amp: bool, phs: bool) {
        self.vis.uncalib(amp, phs);
        self.vis_gen += 1;
        if let Some(grid) = &mut self.grid {
            grid.invalidate();
        }
    }

    pub fn ed_integ(&mut self, op: EditOp) {
        self.edits.ed_integ(op);
    }

    pub fn ed_flush(&mut self) -> Result<usize, DifmapError> {
        let changed = self.edits.ed_flush(&mut self.vis)?;
        if changed > 0 {
            self.vis_gen += 1;
            if let Some(grid) = &mut self.grid {
                grid.invalidate();
            }
        }
        Ok(changed)
    }

    /// Shift the phase centre and every model component by `(east,
    /// north)` radians, relative to wherever the phase centre is now.
    pub fn shift(&mut self, east: f64, north: f64) {
        self.model.shift(east, north);
        self.accumulated_east += east;
        self.accumulated_north += north;
        self.model_gen += 1;
        if let Some(grid) = &mut self.grid {
            grid.invalidate();
        }
    }

    /// Shift toward a target offset `(east, north)` from the originally
    /// loaded phase centre, taking account of any shift already applied.
    ///
    /// This mirrors `shiftto_fn`'s arithmetic exactly: the target minus
    /// the accumulated offset gives the remaining distance to travel,
    /// but that distance is then negated before being handed to `shift`
    /// (the same sign flip `shiftto_fn` applies via `radtoxy(-east)`/
    /// `radtoxy(-north)`). The net effect does not land the accumulated
    /// offset on `(east, north)`; it overshoots in the opposite
    /// direction. Surprising, but it is what the original command does.
    pub fn shiftto(&mut self, east: f64, north: f64) {
        let delta_east = east - self.accumulated_east;
        let delta_north = north - self.accumulated_north;
        self.shift(-delta_east, -delta_north);
    }

    pub fn vis_gen(&self) -> u64 {
        self.vis_gen
    }

    pub fn model_gen(&self) -> u64 {
        self.model_gen
    }
}
