// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `ob_vis_stats`: summary statistics over the visibilities currently
//! selected, used by the command surface to report what `select` and
//! `uvrange` actually matched.

use super::VisibilityStore;

/// Summary statistics over a set of visibilities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisStats {
    pub nvis: usize,
    pub nflagged: usize,
    pub mean_amp: f64,
    pub mean_weight: f64,
    pub rms_residual: f64,
    pub max_uvradius: f64,
    pub min_uvradius: f64,
}

impl Default for VisStats {
    fn default() -> Self {
        VisStats {
            nvis: 0,
            nflagged: 0,
            mean_amp: 0.0,
            mean_weight: 0.0,
            rms_residual: 0.0,
            max_uvradius: 0.0,
            min_uvradius: 0.0,
        }
    }
}

/// Compute statistics over every usable sample in the store. Flagged and
/// non-positive-weight samples are counted in `nflagged` but excluded
/// from every mean/rms.
pub fn ob_vis_stats(store: &VisibilityStore) -> VisStats {
    let mut nvis = 0usize;
    let mut nflagged = 0usize;
    let mut sum_amp = 0.0;
    let mut sum_weight = 0.0;
    let mut sum_sq_residual = 0.0;
    let mut max_uvradius = f64::MIN;
    let mut min_uvradius = f64::MAX;

    for sa in &store.sub_arrays {
        for integ in &sa.integrations {
            for bl_vis in &integ.vis {
                for if_vis in bl_vis {
                    for v in if_vis {
                        nvis += 1;
                        if !v.is_usable() {
                            nflagged += 1;
                            continue;
                        }
                        sum_amp += v.amp;
                        sum_weight += v.weight;
                        let residual = v.complex() - v.model_complex();
                        sum_sq_residual += residual.norm_sqr();
                        let r = v.uvradius();
                        if r > max_uvradius {
                            max_uvradius = r;
                        }
                        if r < min_uvradius {
                            min_uvradius = r;
                        }
                    }
                }
            }
        }
    }

    let nusable = nvis - nflagged;
    if nusable == 0 {
        return VisStats {
            nvis,
            nflagged,
            ..VisStats::default()
        };
    }

    VisStats {
        nvis,
        nflagged,
        mean_amp: sum_amp / nusable as f64,
        mean_weight: sum_weight / nusable as f64,
        rms_residual: (sum_sq_residual / nusable as f64).sqrt(),
        max_uvradius,
        min_uvradius,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::{IfDescriptor, Integration, SubArray, Telescope, Visibility};

    #[test]
    fn empty_store_has_zero_stats() {
        let store = VisibilityStore::default();
        let stats = ob_vis_stats(&store);
        assert_eq!(stats.nvis, 0);
        assert_eq!(stats.mean_amp, 0.0);
    }

    #[test]
    fn all_flagged_yields_zero_nusable() {
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
        sa.integrations.push(Integration {
            time: 0.0,
            vis: vec![vec![vec![Visibility::default()]]],
        });
        let store = VisibilityStore::new(
            vec![sa],
            vec![IfDescriptor {
                freq: 1.0e9,
                df: 1.0,
                bandwidth: 1.0,
                channel_offset: 0,
                nchan: 1,
            }],
        );
        let stats = ob_vis_stats(&store);
        assert_eq!(stats.nvis, 1);
        assert_eq!(stats.nflagged, 1);
        assert_eq!(stats.mean_amp, 0.0);
    }

    #[test]
    fn mean_amp_matches_single_sample() {
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
        sa.integrations.push(Integration {
            time: 0.0,
            vis: vec![vec![vec![Visibility {
                amp: 3.0,
                phase: 0.0,
                weight: 2.0,
                flagged: false,
                u: 3.0,
                v: 4.0,
                w: 0.0,
                model_amp: 3.0,
                model_phase: 0.0,
            }]]],
        });
        let store = VisibilityStore::new(
            vec![sa],
            vec![IfDescriptor {
                freq: 1.0e9,
                df: 1.0,
                bandwidth: 1.0,
                channel_offset: 0,
                nchan: 1,
            }],
        );
        let stats = ob_vis_stats(&store);
        assert_eq!(stats.nvis, 1);
        assert_eq!(stats.nflagged, 0);
        assert_eq!(stats.mean_amp, 3.0);
        assert_eq!(stats.max_uvradius, 5.0);
        assert_eq!(stats.rms_residual, 0.0);
    }
}
