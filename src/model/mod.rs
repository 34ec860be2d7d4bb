// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The model store (component C): established and tentative component
//! lists, a continuum model spanning every channel selection, and, for
//! multi-model mode, a per-selection table of models.
//!
//! CLEAN deposits new components into the tentative list (component F);
//! accepting a CLEAN run promotes them into the established list, which
//! is what self-cal and the restorer treat as ground truth.

mod error;
pub mod io;

pub use error::ModelError;

use num_complex::Complex64;
use std::collections::HashMap;
use std::f64::consts::{LN_2, PI};

use crate::selection::SelectionKey;

/// The brightness-distribution shape of a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentShape {
    /// Point source.
    Delta,
    /// Elliptical Gaussian.
    Gaussian,
    /// Uniformly bright optically-thin sphere.
    Sphere,
    /// Infinitesimally thin ring.
    Ring,
    /// Uniformly bright disk.
    Disk,
}

/// Which parameters of a component are free to vary during model
/// fitting. Self-cal and CLEAN only ever produce components with every
/// parameter fixed; this bookkeeping exists for interactive model
/// fitting (`modelfit`), which this crate does not implement the solver
/// for, but whose persisted state must round-trip through `.mod` files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FreeParams {
    pub flux: bool,
    pub x: bool,
    pub y: bool,
    pub major: bool,
    pub minor: bool,
    pub phi: bool,
}

/// A single model component.
///
/// `x`, `y` are offsets from the phase centre in radians (east, north).
/// `major`, `minor` are FWHM in radians for [`ComponentShape::Gaussian`]
/// and diameters in radians for [`ComponentShape::Sphere`],
/// [`ComponentShape::Ring`], and [`ComponentShape::Disk`]. `phi` is the
/// major-axis position angle in radians, east of north.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Component {
    pub shape: ComponentShape,
    pub flux: f64,
    pub x: f64,
    pub y: f64,
    pub major: f64,
    pub minor: f64,
    pub phi: f64,
    pub freq_ref: f64,
    pub spectral_index: f64,
    pub free: FreeParams,
}

impl Component {
    pub fn point(flux: f64, x: f64, y: f64) -> Self {
        Component {
            shape: ComponentShape::Delta,
            flux,
            x,
            y,
            major: 0.0,
            minor: 0.0,
            phi: 0.0,
            freq_ref: 0.0,
            spectral_index: 0.0,
            free: FreeParams::default(),
        }
    }

    /// Scale flux for a given observing frequency using this component's
    /// power-law spectral index relative to `freq_ref`. A zero reference
    /// frequency disables spectral scaling (flux is frequency-independent).
    pub fn flux_at(&self, freq: f64) -> f64 {
        if self.freq_ref <= 0.0 || freq <= 0.0 {
            self.flux
        } else {
            self.flux * (freq / self.freq_ref).powf(self.spectral_index)
        }
    }

    /// Complex visibility this component contributes at `(u, v)`
    /// (wavelengths), at `freq` (Hz).
    pub fn visibility(&self, u: f64, v: f64, freq: f64) -> Complex64 {
        let flux = self.flux_at(freq);
        let phase_shift = Complex64::from_polar(1.0, -2.0 * PI * (u * self.x + v * self.y));
        let envelope = match self.shape {
            ComponentShape::Delta => 1.0,
            ComponentShape::Gaussian => {
                let (up, vp) = self.rotate(u, v);
                let k = (PI * PI) / (4.0 * LN_2);
                (-k * (self.major * self.major * up * up + self.minor * self.minor * vp * vp))
                    .exp()
            }
            ComponentShape::Disk => {
                let (up, vp) = self.rotate(u, v);
                let rho = (up * up + vp * vp).sqrt();
                let x = PI * self.major * rho;
                if x.abs() < 1e-8 {
                    1.0
                } else {
                    2.0 * bessel_j1(x) / x
                }
            }
            ComponentShape::Ring => {
                let (up, vp) = self.rotate(u, v);
                let rho = (up * up + vp * vp).sqrt();
                let x = PI * self.major * rho;
                bessel_j0(x)
            }
            ComponentShape::Sphere => {
                let (up, vp) = self.rotate(u, v);
                let rho = (up * up + vp * vp).sqrt();
                let x = PI * self.major * rho;
                if x.abs() < 1e-6 {
                    1.0
                } else {
                    3.0 * (x.sin() - x * x.cos()) / (x * x * x)
                }
            }
        };
        flux * envelope * phase_shift
    }

    /// Rotate `(u, v)` into this component's major/minor axis frame.
    fn rotate(&self, u: f64, v: f64) -> (f64, f64) {
        let (s, c) = self.phi.sin_cos();
        (u * c + v * s, -u * s + v * c)
    }
}

/// Zeroth-order Bessel function of the first kind, via the rational
/// approximation of Abramowitz & Stegun 9.4.1/9.4.3.
fn bessel_j0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 8.0 {
        let y = x * x;
        let p1 = -2957821389.0
            + y * (57568490411.0
                + y * (-13362590354.0 + y * (651619640.7 + y * (-11214424.18 + y * (77392.33017 + y * (-184.9052456))))));
        let p2 = 57568490411.0
            + y * (1029532985.0
                + y * (9494680.718 + y * (59272.64853 + y * (267.8532712 + y))));
        p1 / p2
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 0.785398164;
        let p1 = 1.0 + y * (-0.1098628627e-2 + y * (0.2734510407e-4 + y * (-0.2073370639e-5 + y * 0.2093887211e-6)));
        let p2 = -0.1562499995e-1
            + y * (0.1430488765e-3 + y * (-0.6911147651e-5 + y * (0.7621095161e-6 - y * 0.934935152e-7)));
        (0.636619772 / ax).sqrt() * (xx.cos() * p1 - z * xx.sin() * p2)
    }
}

/// First-order Bessel function of the first kind, same source family as
/// [`bessel_j0`].
fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    let result = if ax < 8.0 {
        let y = x * x;
        let p1 = x
            * (72362614232.0
                + y * (-7895059235.0
                    + y * (242396853.1 + y * (-2972611.439 + y * (15704.48260 + y * (-30.16036606))))));
        let p2 = 144725228442.0
            + y * (2300535178.0
                + y * (18583304.74 + y * (99447.43394 + y * (376.9991397 + y))));
        p1 / p2
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p1 = 1.0 + y * (0.183105e-2 + y * (-0.3516396496e-4 + y * (0.2457520174e-5 - y * 0.240337019e-6)));
        let p2 = 0.04687499995
            + y * (-0.2002690873e-3 + y * (0.8449199096e-5 + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        let ans = (0.636619772 / ax).sqrt() * (xx.cos() * p1 - z * xx.sin() * p2);
        if x < 0.0 {
            -ans
        } else {
            ans
        }
    };
    result
}

/// A list of components sharing a frequency/spectral convention.
#[derive(Clone, Debug, Default)]
pub struct Model {
    pub components: Vec<Component>,
}

impl Model {
    pub fn total_flux(&self, freq: f64) -> f64 {
        self.components.iter().map(|c| c.flux_at(freq)).sum()
    }

    pub fn visibility(&self, u: f64, v: f64, freq: f64) -> Complex64 {
        self.components
            .iter()
            .map(|c| c.visibility(u, v, freq))
            .sum()
    }

    /// Shift every component's position by `(east, north)` radians, used
    /// to keep the model co-moving with the phase centre.
    pub fn shift(&mut self, east: f64, north: f64) {
        for c in &mut self.components {
            c.x += east;
            c.y += north;
        }
    }
}

/// An established/tentative pair, the unit that gets swapped wholesale
/// in and out of residency for a channel selection.
#[derive(Clone, Debug, Default)]
pub struct ModelPair {
    pub established: Model,
    pub tentative: Model,
}

impl ModelPair {
    fn total_flux(&self, freq: f64) -> f64 {
        self.established.total_flux(freq) + self.tentative.total_flux(freq)
    }

    fn visibility(&self, u: f64, v: f64, freq: f64) -> Complex64 {
        self.established.visibility(u, v, freq) + self.tentative.visibility(u, v, freq)
    }

    fn shift(&mut self, east: f64, north: f64) {
        self.established.shift(east, north);
        self.tentative.shift(east, north);
    }
}

/// Established and tentative component lists, a continuum pair that
/// contributes across every channel selection, and, for multi-model
/// mode, a per-selection table of the established/tentative pairs not
/// currently resident, per `spec.md` §3.
#[derive(Clone, Debug, Default)]
pub struct ModelStore {
    pub established: Model,
    pub tentative: Model,
    /// Parallel established/tentative pair applying across all channel
    /// selections, independent of whichever per-selection model is
    /// currently resident in `established`/`tentative`.
    pub continuum: ModelPair,
    /// Per-`(pol, channel_ranges)` table used in multi-model mode; holds
    /// the pairs *not* currently resident. Empty in single-model mode.
    pub multi: HashMap<SelectionKey, ModelPair>,
}

impl ModelStore {
    pub fn add(&mut self, component: Component, tentative: bool) {
        if tentative {
            self.tentative.components.push(component);
        } else {
            self.established.components.push(component);
        }
    }

    pub fn clear_tentative(&mut self) {
        self.tentative.components.clear();
    }

    pub fn clear(&mut self) {
        self.established.components.clear();
        self.tentative.components.clear();
    }

    /// Fold the tentative list into the established list, as happens
    /// when a CLEAN run's new components are accepted.
    pub fn commit_tentative(&mut self) {
        self.established
            .components
            .append(&mut self.tentative.components);
    }

    /// Total flux of the resident established+tentative model plus the
    /// continuum model, which contributes regardless of which selection
    /// is resident.
    pub fn total_flux(&self, freq: f64) -> f64 {
        self.established.total_flux(freq)
            + self.tentative.total_flux(freq)
            + self.continuum.total_flux(freq)
    }

    /// Predicted visibility of the resident established+tentative model
    /// plus the continuum model.
    pub fn predict(&self, u: f64, v: f64, freq: f64) -> Complex64 {
        self.established.visibility(u, v, freq)
            + self.tentative.visibility(u, v, freq)
            + self.continuum.visibility(u, v, freq)
    }

    pub fn shift(&mut self, east: f64, north: f64) {
        self.established.shift(east, north);
        self.tentative.shift(east, north);
        self.continuum.shift(east, north);
        for pair in self.multi.values_mut() {
            pair.shift(east, north);
        }
    }

    /// Record the currently-resident established/tentative pair into
    /// the multi-model table under `key`, emptying the resident model in
    /// the process. Used when switching away from the selection `key`
    /// names.
    pub fn record_selection(&mut self, key: SelectionKey) {
        let pair = ModelPair {
            established: std::mem::take(&mut self.established),
            tentative: std::mem::take(&mut self.tentative),
        };
        self.multi.insert(key, pair);
    }

    /// Install the pair last recorded under `key` as the resident
    /// established/tentative model, removing it from the table. If no
    /// pair was ever recorded under `key`, the resident model becomes
    /// empty, per the "empty if none" testable property.
    pub fn install_selection(&mut self, key: &SelectionKey) {
        let pair = self.multi.remove(key).unwrap_or_default();
        self.established = pair.established;
        self.tentative = pair.tentative;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn delta_visibility_has_unit_amplitude_at_origin() {
        let c = Component::point(2.0, 0.0, 0.0);
        let v = c.visibility(0.0, 0.0, 1.0e9);
        assert_relative_eq!(v.re, 2.0, epsilon = 1e-9);
        assert_relative_eq!(v.im, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn gaussian_envelope_decays_with_baseline() {
        let c = Component {
            shape: ComponentShape::Gaussian,
            flux: 1.0,
            x: 0.0,
            y: 0.0,
            major: 1.0e-6,
            minor: 1.0e-6,
            phi: 0.0,
            freq_ref: 0.0,
            spectral_index: 0.0,
            free: FreeParams::default(),
        };
        let near = c.visibility(0.0, 0.0, 1.0e9).norm();
        let far = c.visibility(1.0e6, 0.0, 1.0e9).norm();
        assert!(far < near);
        assert_relative_eq!(near, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn commit_tentative_moves_components_and_clears() {
        let mut store = ModelStore::default();
        store.add(Component::point(1.0, 0.0, 0.0), true);
        store.add(Component::point(2.0, 0.0, 0.0), true);
        assert_eq!(store.established.components.len(), 0);
        store.commit_tentative();
        assert_eq!(store.established.components.len(), 2);
        assert_eq!(store.tentative.components.len(), 0);
    }

    #[test]
    fn shift_moves_all_lists_together() {
        let mut store = ModelStore::default();
        store.add(Component::point(1.0, 0.1, 0.2), false);
        store.add(Component::point(1.0, 0.0, 0.0), true);
        store.shift(0.01, -0.02);
        assert_relative_eq!(store.established.components[0].x, 0.11, epsilon = 1e-12);
        assert_relative_eq!(store.tentative.components[0].y, -0.02, epsilon = 1e-12);
    }

    #[test]
    fn spectral_index_scales_flux() {
        let mut c = Component::point(1.0, 0.0, 0.0);
        c.freq_ref = 1.0e9;
        c.spectral_index = -1.0;
        assert_relative_eq!(c.flux_at(2.0e9), 0.5, epsilon = 1e-12);
        assert_relative_eq!(c.flux_at(1.0e9), 1.0, epsilon = 1e-12);
    }
}
