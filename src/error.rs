// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all difmap-related errors. This should be the *only*
//! error enum that is publicly visible outside subsystem modules.

use thiserror::Error;

use crate::{
    clean::CleanError, grid::GridError, model::ModelError, selfcal::SelfCalError,
    snapshot::SnapshotError, visibility::VisError,
};

/// The *only* publicly visible error from difmap. Each subsystem keeps its
/// own fine-grained error enum (so unit tests can match on specifics); this
/// type aggregates them for callers that just want one thing to propagate
/// with `?`.
#[derive(Error, Debug)]
pub enum DifmapError {
    /// An error from the visibility store (load/write/edit/correction).
    #[error("visibility store error: {0}")]
    Visibility(#[from] VisError),

    /// An error from the map/beam grid (inversion, weighting, sizing).
    #[error("map/beam grid error: {0}")]
    Grid(#[from] GridError),

    /// An error from the CLEAN deconvolver.
    #[error("clean error: {0}")]
    Clean(#[from] CleanError),

    /// An error from the model store (parsing, component ops).
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// An error from the self-calibration solver.
    #[error("self-cal error: {0}")]
    SelfCal(#[from] SelfCalError),

    /// An error from the parameter snapshot subsystem.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// An operation was requested before `observe`.
    #[error("no data has been loaded; run `observe` first")]
    NoData,

    /// An operation was requested before `mapsize`.
    #[error("no map has been allocated; run `mapsize` first")]
    NoMap,

    /// The observation is not in the preparation state the operation
    /// requires (e.g. `invert` before `select`).
    #[error("required state missing: {0}")]
    StateRequired(String),

    /// A numeric input violated its contract.
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// IO error, generic across subsystems.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
