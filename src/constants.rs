// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All constants *must* be double precision. Conversions to a lower
precision, if ever required, should happen as late as possible.
*/

pub use std::f64::consts::{FRAC_PI_2, LN_2, PI, TAU};

/// Default CLEAN loop gain.
pub const DEFAULT_CLEAN_GAIN: f64 = 0.05;

/// Default minimum number of telescopes required for a self-cal solution
/// interval to be considered "closed" (observable).
pub const DEFAULT_MINTEL: usize = 3;

/// Antenna solutions with fewer than this many unflagged telescopes
/// remaining in the array cannot be trusted; see `calibrate()`.
pub const MIN_UNFLAGGED_FOR_SOLUTION: usize = 4;

/// Default number of self-cal Gauss-Newton iterations before giving up.
pub const DEFAULT_MAX_SELFCAL_ITERATIONS: usize = 100;

/// Default self-cal stopping precision (the iteration converges when the
/// largest per-antenna gain update is smaller than this).
pub const DEFAULT_SELFCAL_STOP_THRESHOLD: f64 = 1e-8;

/// Default self-cal minimum acceptable precision; if the iteration stops
/// without reaching this, the solution is marked as failed.
pub const DEFAULT_SELFCAL_MIN_THRESHOLD: f64 = 1e-4;

/// Conversion factor: FWHM of a Gaussian to its 1-sigma half-width.
pub const FWHM_TO_SIGMA: f64 = 1.0 / (2.0 * (2.0 * LN_2).sqrt());

/// The fraction of the full map grid considered "significant" on each
/// axis; the remainder is scratch space for FFT overscan and polarized
/// intensity/angle side-maps.
pub const SIGNIFICANT_REGION_FRACTION: f64 = 0.5;
