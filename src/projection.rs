// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Sky-to-map coordinate projections.
//!
//! Radio-interferometric imaging projects `(ra, dec)` onto a tangent
//! plane `(l, m)` relative to a phase centre `(ra0, dec0)`. Eight
//! projections are supported, matching classic synthesis-imaging
//! convention (Perley, *Imaging and Interferometry in Radio Astronomy*,
//! and the radio-astronomy subset of the FITS WCS zenithal/cylindrical
//! families). Every projection must round-trip `(ra, dec) <-> (l, m)`
//! for points within one radian of the phase centre; rather than hand-
//! deriving eight analytic inverses, a single Newton-Raphson solver
//! inverts whichever forward map is selected, which keeps the eight
//! formulas the only place where projection-specific maths lives.

use crate::constants::{FRAC_PI_2, PI};

/// A supported sky-plane projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    /// Orthographic (SIN): `l = L, m = M`. Valid for the visible hemisphere.
    Sin,
    /// North Celestial Pole approximation, historically used for arrays
    /// whose phase tracking assumed a polar mount.
    Ncp,
    /// Gnomonic (TAN): great circles map to straight lines.
    Tan,
    /// Zenithal equidistant (ARC): radius from the pole is proportional
    /// to angular distance.
    Arc,
    /// Stereographic (STG): conformal zenithal projection.
    Stg,
    /// Hammer-Aitoff (AIT): equal-area, whole-sky.
    Ait,
    /// Global sinusoidal (GLS, a.k.a. Sanson-Flamsteed).
    Gls,
    /// Mercator (MER): conformal cylindrical.
    Mer,
}

impl Projection {
    pub const ALL: [Projection; 8] = [
        Projection::Sin,
        Projection::Ncp,
        Projection::Tan,
        Projection::Arc,
        Projection::Stg,
        Projection::Ait,
        Projection::Gls,
        Projection::Mer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Projection::Sin => "SIN",
            Projection::Ncp => "NCP",
            Projection::Tan => "TAN",
            Projection::Arc => "ARC",
            Projection::Stg => "STG",
            Projection::Ait => "AIT",
            Projection::Gls => "GLS",
            Projection::Mer => "MER",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    /// Direction cosines of `(ra, dec)` relative to tangent point
    /// `(ra0, dec0)`. Used by the zenithal projections (SIN/NCP/TAN/ARC/STG).
    fn direction_cosines(ra: f64, dec: f64, ra0: f64, dec0: f64) -> (f64, f64, f64) {
        let dra = ra - ra0;
        let l = dec.cos() * dra.sin();
        let m = dec.sin() * dec0.cos() - dec.cos() * dec0.sin() * dra.cos();
        let n = dec.sin() * dec0.sin() + dec.cos() * dec0.cos() * dra.cos();
        (l, m, n)
    }

    /// Forward-project `(ra, dec)` onto the `(l, m)` plane about phase
    /// centre `(ra0, dec0)` (all in radians).
    pub fn to_lm(self, ra: f64, dec: f64, ra0: f64, dec0: f64) -> (f64, f64) {
        match self {
            Projection::Sin => {
                let (l, m, _n) = Self::direction_cosines(ra, dec, ra0, dec0);
                (l, m)
            }
            Projection::Tan => {
                let (l, m, n) = Self::direction_cosines(ra, dec, ra0, dec0);
                (l / n, m / n)
            }
            Projection::Arc => {
                let (l, m, n) = Self::direction_cosines(ra, dec, ra0, dec0);
                let r = (l * l + m * m).sqrt();
                if r < 1e-15 {
                    (0.0, 0.0)
                } else {
                    let theta = r.atan2(n);
                    (l * theta / r, m * theta / r)
                }
            }
            Projection::Stg => {
                let (l, m, n) = Self::direction_cosines(ra, dec, ra0, dec0);
                let k = 2.0 / (1.0 + n);
                (k * l, k * m)
            }
            Projection::Ncp => {
                let dra = ra - ra0;
                let l = dec.cos() * dra.sin();
                let m = (dec0.cos() - dec.cos() * dra.cos()) / dec0.sin();
                (l, m)
            }
            Projection::Ait => {
                // Hammer-Aitoff in coordinates relative to the phase
                // centre (beta = dec - dec0 stands in for latitude), so
                // that the phase centre always maps to the plane origin.
                let dra = wrap_pi(ra - ra0);
                let beta = dec - dec0;
                let gamma = (1.0 + beta.cos() * (dra / 2.0).cos()).sqrt();
                let l = 2.0 * beta.cos() * (dra / 2.0).sin() / gamma;
                let m = beta.sin() / gamma;
                (l, m)
            }
            Projection::Gls => {
                let dra = wrap_pi(ra - ra0);
                (dra * dec.cos(), dec - dec0)
            }
            Projection::Mer => {
                let dra = wrap_pi(ra - ra0);
                let y = (FRAC_PI_2 / 2.0 + dec / 2.0).tan().ln();
                let y0 = (FRAC_PI_2 / 2.0 + dec0 / 2.0).tan().ln();
                (dra, y - y0)
            }
        }
    }

    /// Inverse-project `(l, m)` back to `(ra, dec)` about phase centre
    /// `(ra0, dec0)`, via Newton-Raphson on the forward map. Converges in
    /// a handful of iterations for points within one radian of the phase
    /// centre, which is the documented domain of validity.
    pub fn from_lm(self, l: f64, m: f64, ra0: f64, dec0: f64) -> (f64, f64) {
        // Initial guess: flat-sky approximation.
        let mut ra = ra0 + l / dec0.cos().max(1e-6);
        let mut dec = dec0 + m;

        const H: f64 = 1e-7;
        for _ in 0..60 {
            let (fx, fy) = self.to_lm(ra, dec, ra0, dec0);
            let gx = fx - l;
            let gy = fy - m;
            if gx.abs() < 1e-14 && gy.abs() < 1e-14 {
                break;
            }

            // Numerical Jacobian via central differences.
            let (fx_ra_p, fy_ra_p) = self.to_lm(ra + H, dec, ra0, dec0);
            let (fx_ra_m, fy_ra_m) = self.to_lm(ra - H, dec, ra0, dec0);
            let (fx_dec_p, fy_dec_p) = self.to_lm(ra, dec + H, ra0, dec0);
            let (fx_dec_m, fy_dec_m) = self.to_lm(ra, dec - H, ra0, dec0);

            let j11 = (fx_ra_p - fx_ra_m) / (2.0 * H);
            let j12 = (fx_dec_p - fx_dec_m) / (2.0 * H);
            let j21 = (fy_ra_p - fy_ra_m) / (2.0 * H);
            let j22 = (fy_dec_p - fy_dec_m) / (2.0 * H);

            let det = j11 * j22 - j12 * j21;
            if det.abs() < 1e-300 {
                break;
            }
            let d_ra = (j22 * gx - j12 * gy) / det;
            let d_dec = (-j21 * gx + j11 * gy) / det;

            ra -= d_ra;
            dec -= d_dec;
        }
        (ra, dec)
    }
}

/// Wrap an angle into `(-pi, pi]`.
fn wrap_pi(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}
