// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The visibility store (component A): owns per-baseline/per-integration/
//! per-channel samples and the running calibration corrections applied to
//! them.
//!
//! Visibility samples are kept in a flat, indexed arena per sub-array
//! (one [`Integration`] per observation time, one [`Visibility`] per
//! baseline of that integration) rather than an intrusive linked list,
//! per the "Model lists" redesign flag in `spec.md` §9 generalised to
//! this store too: baseline/channel indices are plain `usize`s into
//! contiguous `Vec`s.

mod error;
pub use error::VisError;

pub mod corrections;
pub mod io;
pub mod stats;

use num_complex::Complex64;

/// A telescope (antenna/station) within a sub-array.
#[derive(Clone, Debug)]
pub struct Telescope {
    pub name: String,
    pub xyz: (f64, f64, f64),
    /// A priori antenna-based weight applied during self-cal.
    pub antwt: f64,
    /// If true, the self-cal solver holds this antenna's gain at unity.
    pub antfix: bool,
}

/// An unordered pair of telescope indices within a sub-array. Conjugate
/// baselines are never stored twice; the canonical form has `tel_a <=
/// tel_b`, and conjugation is applied at read points by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Baseline {
    pub tel_a: usize,
    pub tel_b: usize,
}

impl Baseline {
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Baseline { tel_a: a, tel_b: b }
        } else {
            Baseline { tel_a: b, tel_b: a }
        }
    }

    pub fn contains(&self, tel: usize) -> bool {
        self.tel_a == tel || self.tel_b == tel
    }
}

/// Description of a single IF (intermediate frequency band).
#[derive(Clone, Copy, Debug)]
pub struct IfDescriptor {
    /// Sky frequency of the first channel \[Hz\].
    pub freq: f64,
    /// Channel spacing \[Hz\].
    pub df: f64,
    /// Total IF bandwidth \[Hz\].
    pub bandwidth: f64,
    /// Offset of this IF's first channel in the global channel axis.
    pub channel_offset: usize,
    /// Number of channels in this IF.
    pub nchan: usize,
}

impl IfDescriptor {
    /// Per-IF scale factor converting seconds-of-delay UVW to wavelengths
    /// at this IF's reference frequency.
    pub fn uvscale(&self) -> f64 {
        self.freq
    }
}

/// A single complex visibility sample.
///
/// `weight <= 0.0` or `flagged` excludes the sample from all sums.
/// `u, v, w` are stored in seconds-of-delay; multiply by the owning IF's
/// `uvscale()` to reach wavelengths.
#[derive(Clone, Copy, Debug)]
pub struct Visibility {
    pub amp: f64,
    pub phase: f64,
    pub weight: f64,
    pub flagged: bool,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub model_amp: f64,
    pub model_phase: f64,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility {
            amp: 0.0,
            phase: 0.0,
            weight: 0.0,
            flagged: true,
            u: 0.0,
            v: 0.0,
            w: 0.0,
            model_amp: 0.0,
            model_phase: 0.0,
        }
    }
}

impl Visibility {
    pub fn complex(&self) -> Complex64 {
        Complex64::from_polar(self.amp, self.phase)
    }

    pub fn set_complex(&mut self, c: Complex64) {
        self.amp = c.norm();
        self.phase = c.arg();
    }

    pub fn model_complex(&self) -> Complex64 {
        Complex64::from_polar(self.model_amp, self.model_phase)
    }

    pub fn set_model_complex(&mut self, c: Complex64) {
        self.model_amp = c.norm();
        self.model_phase = c.arg();
    }

    /// A sample participates in sums only when it has positive weight and
    /// is not flagged.
    pub fn is_usable(&self) -> bool {
        self.weight > 0.0 && !self.flagged
    }

    /// UV radius in whatever units `u, v` happen to be in.
    pub fn uvradius(&self) -> f64 {
        (self.u * self.u + self.v * self.v).sqrt()
    }
}

/// One observation time-step: one [`Visibility`] per baseline of the
/// owning sub-array, per channel, per IF. Stored as a flat array indexed
/// `[baseline_index][if_index][channel_index]` for cache-friendly access
/// during gridding.
#[derive(Clone, Debug)]
pub struct Integration {
    /// Observation time, seconds since an arbitrary epoch (monotonic
    /// within a sub-array).
    pub time: f64,
    /// `vis[baseline_index][if_index]` is a `Vec<Visibility>` of length
    /// `if_descriptor.nchan`.
    pub vis: Vec<Vec<Vec<Visibility>>>,
}

impl Integration {
    pub fn get(&self, baseline_index: usize, if_index: usize, chan: usize) -> &Visibility {
        &self.vis[baseline_index][if_index][chan]
    }

    pub fn get_mut(&mut self, baseline_index: usize, if_index: usize, chan: usize) -> &mut Visibility {
        &mut self.vis[baseline_index][if_index][chan]
    }
}

/// A contiguous group of telescopes sharing array geometry: owns
/// telescopes, baselines, integrations, per-antenna weight/fix flags, and
/// the running per-antenna-per-IF complex gain corrections.
#[derive(Clone, Debug)]
pub struct SubArray {
    pub telescopes: Vec<Telescope>,
    pub baselines: Vec<Baseline>,
    pub integrations: Vec<Integration>,
    /// `gains[telescope_index][if_index]`; identity (1+0i) when uncalibrated.
    pub gains: Vec<Vec<Complex64>>,
    /// Minimum gap \[seconds\] between two integrations that marks a new scan.
    pub scan_gap: f64,
}

impl SubArray {
    pub fn new(telescopes: Vec<Telescope>, nif: usize) -> Self {
        let ntel = telescopes.len();
        let mut baselines = Vec::with_capacity(ntel * (ntel - 1) / 2);
        for a in 0..ntel {
            for b in (a + 1)..ntel {
                baselines.push(Baseline::new(a, b));
            }
        }
        SubArray {
            telescopes,
            baselines,
            integrations: Vec::new(),
            gains: vec![vec![Complex64::new(1.0, 0.0); nif]; ntel],
            scan_gap: 0.0,
        }
    }

    pub fn baseline_index(&self, bl: Baseline) -> Option<usize> {
        self.baselines.iter().position(|&b| b == bl)
    }

    /// Reset all gain corrections to unity; used by `uncalib`.
    pub fn zero_gains(&mut self) {
        for tel_gains in &mut self.gains {
            for g in tel_gains.iter_mut() {
                *g = Complex64::new(1.0, 0.0);
            }
        }
    }
}

/// The visibility store: as-read data plus running calibration.
#[derive(Clone, Debug, Default)]
pub struct VisibilityStore {
    pub sub_arrays: Vec<SubArray>,
    pub ifs: Vec<IfDescriptor>,
}

impl VisibilityStore {
    pub fn new(sub_arrays: Vec<SubArray>, ifs: Vec<IfDescriptor>) -> Self {
        VisibilityStore { sub_arrays, ifs }
    }

    pub fn total_nchan(&self) -> usize {
        self.ifs.iter().map(|f| f.nchan).sum()
    }

    /// Set the inter-scan gap threshold for a sub-array, used by
    /// time-based plotters and the self-cal solver to delimit scans.
    pub fn scan_gap(&mut self, seconds: f64, sub: usize) -> Result<(), VisError> {
        let sa = self
            .sub_arrays
            .get_mut(sub)
            .ok_or_else(|| VisError::BadSubArray(sub, self.sub_arrays.len()))?;
        sa.scan_gap = seconds;
        Ok(())
    }

    /// Undo all running gain corrections, i.e. set every per-antenna gain
    /// back to unity. `amp`/`phs` select which part to reset; if both are
    /// false, nothing happens.
    pub fn uncalib(&mut self, amp: bool, phs: bool) {
        if !amp && !phs {
            return;
        }
        for sa in &mut self.sub_arrays {
            for tel_gains in &mut sa.gains {
                for g in tel_gains.iter_mut() {
                    let (mut r, mut theta) = g.to_polar();
                    if amp {
                        r = 1.0;
                    }
                    if phs {
                        theta = 0.0;
                    }
                    *g = Complex64::from_polar(r, theta);
                }
            }
        }
    }

    /// Toggle the flagged state of visibilities matching a baseline
    /// selector within a time range. `all_channels = false` restricts the
    /// edit to the channels of the current selection (callers pass the
    /// concrete channel list already resolved).
    pub fn edit_baselines(
        &mut self,
        sub: usize,
        telescopes: &[usize],
        flag: bool,
        channels: Option<&[(usize, usize)]>, // (if_index, chan) pairs; None = all
        t_start: f64,
        t_end: f64,
    ) -> Result<usize, VisError> {
        let sa = self
            .sub_arrays
            .get_mut(sub)
            .ok_or_else(|| VisError::BadSubArray(sub, self.sub_arrays.len()))?;
        let mut count = 0;
        let matching_baselines: Vec<usize> = sa
            .baselines
            .iter()
            .enumerate()
            .filter(|(_, bl)| telescopes.is_empty() || telescopes.iter().any(|&t| bl.contains(t)))
            .map(|(i, _)| i)
            .collect();
        for integ in &mut sa.integrations {
            if integ.time < t_start || integ.time > t_end {
                continue;
            }
            for &bi in &matching_baselines {
                for (if_idx, chans) in integ.vis[bi].iter_mut().enumerate() {
                    for (c, v) in chans.iter_mut().enumerate() {
                        let selected = match channels {
                            None => true,
                            Some(list) => list.contains(&(if_idx, c)),
                        };
                        if selected && v.flagged != flag {
                            v.flagged = flag;
                            count += 1;
                        }
                    }
                }
            }
        }
        Ok(count)
    }

    /// Coherently average consecutive integrations separated by at most
    /// `av_seconds` within a scan (as delimited by `SubArray::scan_gap`).
    /// Outputs are freshly allocated integrations; the caller must stamp
    /// the map/beam grid stale afterwards.
    pub fn uvaver(&mut self, av_seconds: f64, derive_weights_from_scatter: bool) {
        for sa in &mut self.sub_arrays {
            if sa.integrations.is_empty() {
                continue;
            }
            let scan_gap = sa.scan_gap;
            let nbaseline = sa.baselines.len();
            let nif = sa.integrations[0].vis.get(0).map(|v| v.len()).unwrap_or(0);

            let mut grouped: Vec<Vec<&Integration>> = Vec::new();
            {
                let mut current: Vec<&Integration> = Vec::new();
                let mut last_time: Option<f64> = None;
                for integ in &sa.integrations {
                    let starts_new_scan = match last_time {
                        Some(t) => scan_gap > 0.0 && (integ.time - t) > scan_gap,
                        None => false,
                    };
                    let exceeds_bin = match current.first() {
                        Some(first) => (integ.time - first.time) > av_seconds,
                        None => false,
                    };
                    if starts_new_scan || exceeds_bin {
                        if !current.is_empty() {
                            grouped.push(std::mem::take(&mut current));
                        }
                    }
                    last_time = Some(integ.time);
                    current.push(integ);
                }
                if !current.is_empty() {
                    grouped.push(current);
                }
            }

            let mut new_integrations = Vec::with_capacity(grouped.len());
            for group in grouped {
                let mean_time = group.iter().map(|i| i.time).sum::<f64>() / group.len() as f64;
                let mut vis: Vec<Vec<Vec<Visibility>>> = Vec::with_capacity(nbaseline);
                for bi in 0..nbaseline {
                    let mut per_if = Vec::with_capacity(nif);
                    for ifi in 0..nif {
                        let nchan = group[0].vis[bi][ifi].len();
                        let mut per_chan = Vec::with_capacity(nchan);
                        for ci in 0..nchan {
                            per_chan.push(average_samples(
                                group.iter().map(|g| &g.vis[bi][ifi][ci]),
                                derive_weights_from_scatter,
                            ));
                        }
                        per_if.push(per_chan);
                    }
                    vis.push(per_if);
                }
                new_integrations.push(Integration {
                    time: mean_time,
                    vis,
                });
            }
            sa.integrations = new_integrations;
        }
    }

    pub fn nrec(&self) -> usize {
        self.sub_arrays
            .iter()
            .map(|sa| sa.integrations.len() * sa.baselines.len())
            .sum()
    }
}

fn average_samples<'a>(
    samples: impl Iterator<Item = &'a Visibility>,
    derive_weights_from_scatter: bool,
) -> Visibility {
    let mut sum_c = Complex64::new(0.0, 0.0);
    let mut sum_model = Complex64::new(0.0, 0.0);
    let mut sum_w = 0.0;
    let mut sum_u = 0.0;
    let mut sum_v = 0.0;
    let mut sum_w_uvw = 0.0;
    let mut n = 0usize;
    let mut values: Vec<Complex64> = Vec::new();

    for v in samples {
        if !v.is_usable() {
            continue;
        }
        sum_c += v.complex() * v.weight;
        sum_model += v.model_complex() * v.weight;
        sum_w += v.weight;
        sum_u += v.u;
        sum_v += v.v;
        sum_w_uvw += v.w;
        values.push(v.complex());
        n += 1;
    }

    if n == 0 || sum_w <= 0.0 {
        return Visibility::default();
    }

    let mean = sum_c / sum_w;
    let mean_model = sum_model / sum_w;
    let weight = if derive_weights_from_scatter && n > 1 {
        let var = values
            .iter()
            .map(|c| (c - mean).norm_sqr())
            .sum::<f64>()
            / (n - 1) as f64;
        if var > 0.0 {
            1.0 / var
        } else {
            sum_w
        }
    } else {
        sum_w
    };

    let mut out = Visibility {
        amp: mean.norm(),
        phase: mean.arg(),
        weight,
        flagged: false,
        u: sum_u / n as f64,
        v: sum_v / n as f64,
        w: sum_w_uvw / n as f64,
        model_amp: mean_model.norm(),
        model_phase: mean_model.arg(),
    };
    out.set_complex(mean);
    out.set_model_complex(mean_model);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store(n_integ: usize) -> VisibilityStore {
        let telescopes = vec![
            Telescope {
                name: "A".into(),
                xyz: (0.0, 0.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
            Telescope {
                name: "B".into(),
                xyz: (100.0, 0.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
            Telescope {
                name: "C".into(),
                xyz: (0.0, 100.0, 0.0),
                antwt: 1.0,
                antfix: false,
            },
        ];
        let mut sa = SubArray::new(telescopes, 1);
        for t in 0..n_integ {
            let vis = sa
                .baselines
                .iter()
                .map(|_| vec![vec![Visibility {
                    amp: 1.0,
                    phase: 0.0,
                    weight: 1.0,
                    flagged: false,
                    u: 1.0,
                    v: 2.0,
                    w: 0.0,
                    model_amp: 1.0,
                    model_phase: 0.0,
                }]])
                .collect();
            sa.integrations.push(Integration {
                time: t as f64 * 10.0,
                vis,
            });
        }
        VisibilityStore::new(
            vec![sa],
            vec![IfDescriptor {
                freq: 1.0e9,
                df: 1.0e6,
                bandwidth: 1.0e6,
                channel_offset: 0,
                nchan: 1,
            }],
        )
    }

    #[test]
    fn edit_then_unedit_is_identity() {
        let mut store = make_store(3);
        let before = store.clone();
        store
            .edit_baselines(0, &[0], true, None, 0.0, 100.0)
            .unwrap();
        store
            .edit_baselines(0, &[0], false, None, 0.0, 100.0)
            .unwrap();
        for (sa1, sa2) in store.sub_arrays.iter().zip(before.sub_arrays.iter()) {
            for (i1, i2) in sa1.integrations.iter().zip(sa2.integrations.iter()) {
                for (bl1, bl2) in i1.vis.iter().zip(i2.vis.iter()) {
                    for (if1, if2) in bl1.iter().zip(bl2.iter()) {
                        for (v1, v2) in if1.iter().zip(if2.iter()) {
                            assert_eq!(v1.flagged, v2.flagged);
                            assert_eq!(v1.amp, v2.amp);
                            assert_eq!(v1.weight, v2.weight);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn uvaver_reduces_integration_count() {
        // 10 integrations 10s apart, average over 60s bins with no scan
        // gap set (scan_gap=0 disables scan splitting).
        let mut store = make_store(10);
        assert_eq!(store.nrec(), 30);
        store.uvaver(59.0, false);
        // bins: [0,10,20,30,40,50] within 59s of first => all 10 fall in
        // one bin since (90-0)=90 > 59, so it should split at some point.
        assert!(store.sub_arrays[0].integrations.len() > 1);
        assert!(store.sub_arrays[0].integrations.len() < 10);
    }

    #[test]
    fn uncalib_resets_to_unity() {
        let mut store = make_store(1);
        store.sub_arrays[0].gains[0][0] = Complex64::new(2.0, 1.0);
        store.uncalib(true, true);
        assert_eq!(store.sub_arrays[0].gains[0][0], Complex64::new(1.0, 0.0));
    }
}
