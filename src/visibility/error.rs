// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Error type for the visibility store.
*/

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisError {
    #[error("IO error reading/writing visibility data: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse visibility data: {0}")]
    Parse(String),

    #[error("unsupported axis in visibility data: {0}")]
    UnsupportedAxis(String),

    #[error("baseline selector {0:?} matched no telescopes")]
    BadBaselineSpec(String),

    #[error("sub-array index {0} out of range (have {1})")]
    BadSubArray(usize, usize),

    #[error("requested polarization {0} cannot be derived from the products present")]
    PolarizationUnavailable(String),
}
