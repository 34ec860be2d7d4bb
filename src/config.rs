// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Typed settings, replacing an untyped variable registry with a single
//! `clap`-derived struct: every setting has a concrete type and a
//! documented default, checkable at compile time rather than only when
//! a verb happens to read it.

use clap::{Parser, Subcommand};

use crate::clean::CleanParams;
use crate::grid::{WeightMode, WeightingParams};
use crate::selfcal::SelfCalParams;
use crate::units::SkyUnit;

#[derive(Parser, Clone, Debug)]
#[clap(
    name = "difmap",
    about = "Interactive aperture-synthesis imaging and self-calibration for VLBI visibility data"
)]
pub struct Settings {
    /// Input visibility file.
    #[clap(long)]
    pub input: Option<String>,

    /// Output image/model prefix.
    #[clap(long, default_value = "map")]
    pub output: String,

    /// Map width in pixels (must be even).
    #[clap(long, default_value_t = 512)]
    pub mapsize_x: usize,

    /// Map height in pixels (must be even).
    #[clap(long, default_value_t = 512)]
    pub mapsize_y: usize,

    /// Map cell size, milli-arcseconds.
    #[clap(long, default_value_t = 0.1)]
    pub cellsize_mas: f64,

    /// CLEAN loop gain.
    #[clap(long, default_value_t = crate::constants::DEFAULT_CLEAN_GAIN)]
    pub gain: f64,

    /// Maximum CLEAN iterations per run.
    #[clap(long, default_value_t = 100)]
    pub niter: usize,

    /// CLEAN stops once the residual peak drops below this flux (Jy).
    #[clap(long, default_value_t = 0.0)]
    pub cutoff: f64,

    /// Minimum unflagged telescopes for a self-cal solution to be
    /// considered trustworthy.
    #[clap(long, default_value_t = crate::constants::DEFAULT_MINTEL)]
    pub mintel: usize,

    /// Maximum self-cal Gauss-Newton iterations per interval.
    #[clap(long, default_value_t = crate::constants::DEFAULT_MAX_SELFCAL_ITERATIONS)]
    pub selfcal_max_iterations: usize,

    /// Solve for antenna amplitude gains during self-cal.
    #[clap(long)]
    pub selfcal_amp: bool,

    /// Solve for antenna phase gains during self-cal.
    #[clap(long, default_value_t = true)]
    pub selfcal_phase: bool,

    /// Let the self-cal overall amplitude scale float free instead of
    /// normalising solving antennas to unit geometric-mean gain.
    #[clap(long)]
    pub selfcal_dofloat: bool,

    /// Clip self-cal gain amplitudes to `[1/ratio, ratio]`; 0 disables.
    #[clap(long, default_value_t = 0.0)]
    pub selfcal_maxamp_ratio: f64,

    /// Clip self-cal gain phases to `+-maxphs` degrees; 0 disables.
    #[clap(long, default_value_t = 0.0)]
    pub selfcal_maxphs_deg: f64,

    /// Self-cal UV range lower bound, kilo-wavelengths.
    #[clap(long, default_value_t = 0.0)]
    pub selfcal_uvmin_klambda: f64,

    /// Self-cal UV range upper bound, kilo-wavelengths; 0 disables.
    #[clap(long, default_value_t = 0.0)]
    pub selfcal_uvmax_klambda: f64,

    /// Self-cal Gaussian UV taper 1/e half-width, kilo-wavelengths; 0
    /// disables.
    #[clap(long, default_value_t = 0.0)]
    pub selftaper_klambda: f64,

    /// Self-cal solution interval, minutes; 0 solves each integration
    /// independently.
    #[clap(long, default_value_t = 0.0)]
    pub solint_minutes: f64,

    /// Flag samples that fail the self-cal closure check instead of
    /// erroring out.
    #[clap(long)]
    pub selfcal_doflag: bool,

    /// UV weighting: "natural", "uniform", or "errorpower:<alpha>".
    #[clap(long, default_value = "natural")]
    pub weighting: String,

    /// Radial UV weighting exponent.
    #[clap(long, default_value_t = 0.0)]
    pub uvweight_radial: f64,

    /// Gaussian UV taper 1/e half-width, kilo-wavelengths; 0 disables.
    #[clap(long, default_value_t = 0.0)]
    pub uvtaper_klambda: f64,

    /// Display/report unit for map coordinates.
    #[clap(long, default_value = "mas")]
    pub unit: String,

    /// Logging verbosity: repeat for more detail (-v, -vv, -vvv).
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run a single verb instead of the default invert/clean/restore
    /// pass. Omitting this runs the default pass, for compatibility with
    /// existing non-interactive callers.
    #[clap(subcommand)]
    pub command: Option<Verb>,
}

/// The verb table of the scriptable subset this crate's binary exposes,
/// one subcommand per core [`crate::context::Observation`] operation.
#[derive(Subcommand, Clone, Debug)]
pub enum Verb {
    /// Grid the current selection and invert to a dirty map/beam.
    Invert,
    /// Run CLEAN against the current dirty map.
    Clean {
        #[clap(long, default_value_t = crate::constants::DEFAULT_CLEAN_GAIN)]
        gain: f64,
        #[clap(long, default_value_t = 100)]
        niter: usize,
        #[clap(long, default_value_t = 0.0)]
        cutoff: f64,
    },
    /// Commit the tentative CLEAN components into the established model.
    Keep,
    /// Convolve the model with the restoring beam and add the residual.
    Restore {
        #[clap(long)]
        noresid: bool,
        #[clap(long)]
        dosm: bool,
    },
    /// Solve antenna gains against the current model.
    Selfcal {
        #[clap(long, default_value_t = 0)]
        if_index: usize,
        #[clap(long, default_value_t = 1.0e9)]
        freq: f64,
    },
    /// Solve a single overall amplitude scale factor.
    Gscale {
        #[clap(long, default_value_t = 0)]
        if_index: usize,
        #[clap(long, default_value_t = 1.0e9)]
        freq: f64,
        #[clap(long)]
        dophs: bool,
    },
    /// Change the active polarization/channel selection.
    Select {
        polarization: String,
        #[clap(long)]
        start: Option<usize>,
        #[clap(long)]
        end: Option<usize>,
        /// Comma-separated polarizations known to be present; the store
        /// carries no polarization tag per sample, so this has to be
        /// told rather than derived.
        #[clap(long, default_value = "")]
        available: String,
    },
    /// Shift the phase centre by a relative offset, radians.
    Shift { east: f64, north: f64 },
    /// Shift the phase centre toward an absolute target offset, radians.
    Shiftto { east: f64, north: f64 },
    /// Undo calibration corrections.
    Uncalib {
        #[clap(long)]
        amp: bool,
        #[clap(long)]
        phs: bool,
    },
    /// Add, clear, save, or load clean windows.
    Window {
        #[clap(subcommand)]
        action: WindowAction,
    },
    /// Queue or flush flagging edits.
    Edit {
        #[clap(subcommand)]
        action: EditAction,
    },
    /// Save or load a parameter snapshot file.
    Snapshot {
        #[clap(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum WindowAction {
    /// Add a square window of half-width `radius` pixels around `(x, y)`.
    Add { x: usize, y: usize, radius: usize },
    /// Remove every active window.
    Clear,
    /// Write the active windows to a text file.
    Save { path: String },
    /// Replace the active windows with those read from a text file.
    Load { path: String },
}

#[derive(Subcommand, Clone, Debug)]
pub enum EditAction {
    /// Queue a flag edit for one sub-array/integration.
    Flag { sub: usize, integ: usize },
    /// Queue an unflag edit for one sub-array/integration.
    Unflag { sub: usize, integ: usize },
    /// Apply every queued edit to the visibility store.
    Flush,
}

#[derive(Subcommand, Clone, Debug)]
pub enum SnapshotAction {
    /// Write the current scalar settings to a parameter file.
    Save { path: String },
    /// Replace the in-memory snapshot with one read from a parameter file.
    Load { path: String },
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            input: None,
            output: "map".to_string(),
            mapsize_x: 512,
            mapsize_y: 512,
            cellsize_mas: 0.1,
            gain: crate::constants::DEFAULT_CLEAN_GAIN,
            niter: 100,
            cutoff: 0.0,
            mintel: crate::constants::DEFAULT_MINTEL,
            selfcal_max_iterations: crate::constants::DEFAULT_MAX_SELFCAL_ITERATIONS,
            selfcal_amp: false,
            selfcal_phase: true,
            selfcal_dofloat: false,
            selfcal_maxamp_ratio: 0.0,
            selfcal_maxphs_deg: 0.0,
            selfcal_uvmin_klambda: 0.0,
            selfcal_uvmax_klambda: 0.0,
            selftaper_klambda: 0.0,
            solint_minutes: 0.0,
            selfcal_doflag: false,
            weighting: "natural".to_string(),
            uvweight_radial: 0.0,
            uvtaper_klambda: 0.0,
            unit: "mas".to_string(),
            verbose: 0,
            command: None,
        }
    }
}

impl Settings {
    pub fn clean_params(&self) -> CleanParams {
        CleanParams {
            gain: self.gain,
            niter: self.niter,
            cutoff: self.cutoff,
        }
    }

    pub fn selfcal_params(&self) -> SelfCalParams {
        SelfCalParams {
            max_iterations: self.selfcal_max_iterations,
            mintel: self.mintel,
            solve_amp: self.selfcal_amp,
            solve_phase: self.selfcal_phase,
            dofloat: self.selfcal_dofloat,
            maxamp_ratio: self.selfcal_maxamp_ratio,
            maxphs_rad: self.selfcal_maxphs_deg.to_radians(),
            uvmin: self.selfcal_uvmin_klambda * 1.0e3,
            uvmax: if self.selfcal_uvmax_klambda > 0.0 {
                self.selfcal_uvmax_klambda * 1.0e3
            } else {
                f64::INFINITY
            },
            taper_sigma: if self.selftaper_klambda > 0.0 {
                Some(self.selftaper_klambda * 1.0e3)
            } else {
                None
            },
            solint: self.solint_minutes,
            doflag: self.selfcal_doflag,
            ..SelfCalParams::default()
        }
    }

    pub fn weighting_params(&self) -> WeightingParams {
        let mode = if self.weighting == "uniform" {
            WeightMode::Uniform
        } else if let Some(alpha) = self
            .weighting
            .strip_prefix("errorpower:")
            .and_then(|s| s.parse::<f64>().ok())
        {
            WeightMode::ErrorPower(alpha)
        } else {
            WeightMode::Natural
        };
        WeightingParams {
            mode,
            radial_power: self.uvweight_radial,
            taper_sigma: if self.uvtaper_klambda > 0.0 {
                Some(self.uvtaper_klambda * 1.0e3)
            } else {
                None
            },
            uvrange: None,
        }
    }

    pub fn unit(&self) -> SkyUnit {
        SkyUnit::parse(&self.unit).unwrap_or_default()
    }

    pub fn cell_size_radians(&self) -> f64 {
        SkyUnit::MilliArcsec.to_radians(self.cellsize_mas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weighting_is_natural() {
        let settings = Settings::default();
        assert_eq!(settings.weighting_params().mode, WeightMode::Natural);
    }

    #[test]
    fn errorpower_weighting_parses_alpha() {
        let mut settings = Settings::default();
        settings.weighting = "errorpower:0.5".to_string();
        assert_eq!(
            settings.weighting_params().mode,
            WeightMode::ErrorPower(0.5)
        );
    }

    #[test]
    fn taper_disabled_by_default() {
        let settings = Settings::default();
        assert_eq!(settings.weighting_params().taper_sigma, None);
    }
}
