// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error reading/writing a model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model file at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("component index {0} out of range (have {1})")]
    BadComponent(usize, usize),

    #[error("component shape {0:?} does not support parameter {1:?}")]
    UnsupportedParameter(String, String),
}
