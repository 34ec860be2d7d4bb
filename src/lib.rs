// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Interactive aperture-synthesis imaging and self-calibration for VLBI
//! visibility data.
//!
//! This crate is the core imaging/calibration engine of a difmap-like
//! system: a visibility store, selection stream, model store, gridder,
//! CLEAN deconvolver, restorer and self-calibration solver, coupled
//! through a single [`Observation`](context::Observation) context. The
//! command language, plotting front-end and UV FITS/image FITS codecs
//! are treated as external collaborators and are not implemented here.

pub mod clean;
pub mod config;
pub(crate) mod constants;
pub mod context;
pub mod edit;
pub mod error;
pub mod grid;
pub mod logging;
pub mod model;
pub mod projection;
pub mod restore;
pub mod selection;
pub mod selfcal;
pub mod snapshot;
pub mod units;
pub mod visibility;
pub mod windows;

pub use context::Observation;
pub use error::DifmapError;
