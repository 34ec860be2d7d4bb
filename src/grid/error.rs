// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("map dimensions must be positive and even, got {0}x{1}")]
    BadMapSize(usize, usize),

    #[error("cell size must be positive, got {0}")]
    BadCellSize(f64),

    #[error("no visibilities are selected to grid")]
    NoData,

    #[error("the beam has not been estimated yet; run `invert` first")]
    NoBeam,

    #[error("uv taper parameter must be positive, got {0}")]
    BadTaper(f64),
}
