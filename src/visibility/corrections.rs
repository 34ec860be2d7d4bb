// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-baseline calibration corrections that act directly on stored
//! samples rather than on the running per-antenna gain table: clock/phase
//! offsets and residual-fringe-rate offsets.

use super::{SubArray, VisError};
use num_complex::Complex64;

/// Apply a constant clock offset (seconds) and phase offset (radians)
/// to one telescope's visibilities, affecting every baseline it
/// participates in. A positive `clock_offset` delays that telescope's
/// signal, which rotates the phase of every baseline it forms by
/// `2*pi*freq*clock_offset` (sign depends on which antenna of the
/// baseline it is).
pub fn clroff(
    sa: &mut SubArray,
    telescope: usize,
    clock_offset: f64,
    phase_offset: f64,
    if_freqs: &[f64],
) -> Result<(), VisError> {
    if telescope >= sa.telescopes.len() {
        return Err(VisError::BadBaselineSpec(format!(
            "telescope index {} out of range",
            telescope
        )));
    }
    for integ in &mut sa.integrations {
        for (bi, bl) in sa.baselines.iter().enumerate() {
            if !bl.contains(telescope) {
                continue;
            }
            // Sign convention: telescope as tel_a contributes +offset,
            // as tel_b contributes -offset, matching a conjugate-baseline
            // phase convention.
            let sign = if bl.tel_a == telescope { 1.0 } else { -1.0 };
            for (if_idx, chans) in integ.vis[bi].iter_mut().enumerate() {
                let freq = if_freqs.get(if_idx).copied().unwrap_or(0.0);
                let rot = sign * (2.0 * std::f64::consts::PI * freq * clock_offset + phase_offset);
                let rotor = Complex64::from_polar(1.0, rot);
                for v in chans.iter_mut() {
                    v.set_complex(v.complex() * rotor);
                }
            }
        }
    }
    Ok(())
}

/// Apply a residual fringe-rate offset (radians/second) to one
/// telescope's visibilities, rotating phase linearly with integration
/// time. Used to remove a slowly-varying phase drift left over after
/// self-calibration.
pub fn resoff(sa: &mut SubArray, telescope: usize, rate: f64) -> Result<(), VisError> {
    if telescope >= sa.telescopes.len() {
        return Err(VisError::BadBaselineSpec(format!(
            "telescope index {} out of range",
            telescope
        )));
    }
    let t0 = sa.integrations.first().map(|i| i.time).unwrap_or(0.0);
    for integ in &mut sa.integrations {
        let dt = integ.time - t0;
        for (bi, bl) in sa.baselines.iter().enumerate() {
            if !bl.contains(telescope) {
                continue;
            }
            let sign = if bl.tel_a == telescope { 1.0 } else { -1.0 };
            let rotor = Complex64::from_polar(1.0, sign * rate * dt);
            for chans in integ.vis[bi].iter_mut() {
                for v in chans.iter_mut() {
                    v.set_complex(v.complex() * rotor);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::{Integration, Telescope, Visibility};

    fn sample_sa() -> SubArray {
        let telescopes = vec![
            Telescope {
                name: "A".into(),
                xyz: (0.0, 0.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
            Telescope {
                name: "B".into(),
                xyz: (1.0, 0.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
        ];
        let mut sa = SubArray::new(telescopes, 1);
        let vis = vec![vec![vec![Visibility {
            amp: 1.0,
            phase: 0.0,
            weight: 1.0,
            flagged: false,
            u: 0.0,
            v: 0.0,
            w: 0.0,
            model_amp: 0.0,
            model_phase: 0.0,
        }]]];
        sa.integrations.push(Integration { time: 0.0, vis });
        sa
    }

    #[test]
    fn clroff_rotates_phase() {
        let mut sa = sample_sa();
        clroff(&mut sa, 0, 0.0, std::f64::consts::FRAC_PI_2, &[1.0e9]).unwrap();
        let v = sa.integrations[0].get(0, 0, 0);
        assert!((v.phase - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn resoff_no_op_at_t0() {
        let mut sa = sample_sa();
        resoff(&mut sa, 0, 1.0).unwrap();
        let v = sa.integrations[0].get(0, 0, 0);
        assert!((v.phase - 0.0).abs() < 1e-9);
    }
}
