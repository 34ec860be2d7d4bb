// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelfCalError {
    #[error("solution interval has only {0} unflagged telescopes, need at least {1}")]
    NotEnoughTelescopes(usize, usize),

    #[error("self-cal did not converge after {0} iterations (largest update {1:e})")]
    DidNotConverge(usize, f64),

    #[error("no model is loaded to self-calibrate against")]
    NoModel,

    #[error("solution interval is empty")]
    EmptyInterval,
}
