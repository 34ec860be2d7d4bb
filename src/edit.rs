// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The edit engine (component I): a queue of pending flag/unflag edits
//! plus a flush step that applies them to the visibility store.
//!
//! Queuing an edit only ever records "this target's flag state should
//! become X"; flushing the same queue twice, or queuing the same edit
//! twice before flushing, leaves the store in the same state as
//! flushing it once. This idempotence is what lets interactive editing
//! retry a flush after a failed write without double-applying anything.

use crate::visibility::{Baseline, VisError, VisibilityStore};

/// A single pending edit: set the flag state of every visibility in
/// sub-array `sub`, integration `integ`, optionally restricted to one
/// baseline and/or one `(if_index, channel)`, to `flag`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EditOp {
    pub sub: usize,
    pub integ: usize,
    pub baseline: Option<Baseline>,
    pub if_chan: Option<(usize, usize)>,
    pub flag: bool,
}

/// A queue of pending edits.
#[derive(Clone, Debug, Default)]
pub struct EditEngine {
    pending: Vec<EditOp>,
}

impl EditEngine {
    /// Queue an edit against a single integration. Queuing the same
    /// `(sub, integ, baseline, if_chan)` target twice just overwrites
    /// the pending flag state with the most recent call.
    pub fn ed_integ(&mut self, op: EditOp) {
        if let Some(existing) = self.pending.iter_mut().find(|p| {
            p.sub == op.sub && p.integ == op.integ && p.baseline == op.baseline && p.if_chan == op.if_chan
        }) {
            existing.flag = op.flag;
        } else {
            self.pending.push(op);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Apply every queued edit to `store` and clear the queue. Returns
    /// the number of visibility samples whose flag state actually
    /// changed. Flushing an empty queue is a no-op that returns 0.
    pub fn ed_flush(&mut self, store: &mut VisibilityStore) -> Result<usize, VisError> {
        let mut changed = 0;
        for op in self.pending.drain(..) {
            let sa = store
                .sub_arrays
                .get_mut(op.sub)
                .ok_or_else(|| VisError::BadSubArray(op.sub, store.sub_arrays.len()))?;
            let integ = match sa.integrations.get_mut(op.integ) {
                Some(i) => i,
                None => continue,
            };
            for (bi, bl) in sa.baselines.iter().enumerate() {
                if let Some(target) = op.baseline {
                    if *bl != target {
                        continue;
                    }
                }
                for (if_idx, chans) in integ.vis[bi].iter_mut().enumerate() {
                    for (c, v) in chans.iter_mut().enumerate() {
                        if let Some((target_if, target_chan)) = op.if_chan {
                            if if_idx != target_if || c != target_chan {
                                continue;
                            }
                        }
                        if v.flagged != op.flag {
                            v.flagged = op.flag;
                            changed += 1;
                        }
                    }
                }
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::{IfDescriptor, Integration, SubArray, Telescope, Visibility};

    fn store_with_one_integration() -> VisibilityStore {
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
                amp: 1.0,
                phase: 0.0,
                weight: 1.0,
                flagged: false,
                u: 0.0,
                v: 0.0,
                w: 0.0,
                model_amp: 0.0,
                model_phase: 0.0,
            }]]],
        });
        VisibilityStore::new(
            vec![sa],
            vec![IfDescriptor {
                freq: 1.0,
                df: 1.0,
                bandwidth: 1.0,
                channel_offset: 0,
                nchan: 1,
            }],
        )
    }

    #[test]
    fn flush_applies_and_then_is_idempotent() {
        let mut store = store_with_one_integration();
        let mut engine = EditEngine::default();
        engine.ed_integ(EditOp {
            sub: 0,
            integ: 0,
            baseline: None,
            if_chan: None,
            flag: true,
        });
        let changed = engine.ed_flush(&mut store).unwrap();
        assert_eq!(changed, 1);
        assert!(store.sub_arrays[0].integrations[0].get(0, 0, 0).flagged);

        // Flushing again with an empty queue changes nothing.
        let changed2 = engine.ed_flush(&mut store).unwrap();
        assert_eq!(changed2, 0);
    }

    #[test]
    fn requeuing_same_target_overwrites_rather_than_duplicates() {
        let mut engine = EditEngine::default();
        let op = EditOp {
            sub: 0,
            integ: 0,
            baseline: None,
            if_chan: None,
            flag: true,
        };
        engine.ed_integ(op);
        engine.ed_integ(EditOp { flag: false, ..op });
        assert_eq!(engine.pending_count(), 1);
    }

    #[test]
    fn flushing_same_edit_twice_leaves_store_unchanged_the_second_time() {
        let mut store = store_with_one_integration();
        let mut engine = EditEngine::default();
        let op = EditOp {
            sub: 0,
            integ: 0,
            baseline: None,
            if_chan: None,
            flag: true,
        };
        engine.ed_integ(op);
        engine.ed_flush(&mut store).unwrap();
        engine.ed_integ(op);
        let changed = engine.ed_flush(&mut store).unwrap();
        assert_eq!(changed, 0);
    }
}
