// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The selection stream (component B): which polarization and which
//! channels of which IFs are currently active, plus a cursor for
//! iterating IF-by-IF.
//!
//! The polarization set matches the full Stokes/correlation vocabulary
//! a visibility archive can carry (`difmap_src/stokes.c`): true Stokes
//! parameters, circular and linear correlation products, and the
//! `PI` (total intensity from either circular or linear products)
//! pseudo-Stokes code used when true Stokes `I` isn't directly present.

use crate::visibility::{IfDescriptor, VisError};

/// A polarization or correlation product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Polarization {
    I,
    Q,
    U,
    V,
    RR,
    LL,
    RL,
    LR,
    XX,
    YY,
    XY,
    YX,
    /// Pseudo total intensity, derived from `(RR+LL)/2` or `(XX+YY)/2`.
    PI,
}

impl Polarization {
    pub const ALL: [Polarization; 13] = [
        Polarization::I,
        Polarization::Q,
        Polarization::U,
        Polarization::V,
        Polarization::RR,
        Polarization::LL,
        Polarization::RL,
        Polarization::LR,
        Polarization::XX,
        Polarization::YY,
        Polarization::XY,
        Polarization::YX,
        Polarization::PI,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Polarization::I => "I",
            Polarization::Q => "Q",
            Polarization::U => "U",
            Polarization::V => "V",
            Polarization::RR => "RR",
            Polarization::LL => "LL",
            Polarization::RL => "RL",
            Polarization::LR => "LR",
            Polarization::XX => "XX",
            Polarization::YY => "YY",
            Polarization::XY => "XY",
            Polarization::YX => "YX",
            Polarization::PI => "PI",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }

    pub fn is_stokes(self) -> bool {
        matches!(
            self,
            Polarization::I | Polarization::Q | Polarization::U | Polarization::V
        )
    }

    pub fn is_circular(self) -> bool {
        matches!(
            self,
            Polarization::RR | Polarization::LL | Polarization::RL | Polarization::LR
        )
    }

    pub fn is_linear(self) -> bool {
        matches!(
            self,
            Polarization::XX | Polarization::YY | Polarization::XY | Polarization::YX
        )
    }

    /// The pair of correlation products `PI` is derived from, preferring
    /// circular products when both are present (matching `stokes.c`'s
    /// precedence for pseudo total-intensity).
    pub fn pi_sources(available: &[Polarization]) -> Option<(Polarization, Polarization)> {
        if available.contains(&Polarization::RR) && available.contains(&Polarization::LL) {
            Some((Polarization::RR, Polarization::LL))
        } else if available.contains(&Polarization::XX) && available.contains(&Polarization::YY) {
            Some((Polarization::XX, Polarization::YY))
        } else {
            None
        }
    }

    /// Whether `target` can be derived from the polarizations present in
    /// `available` (including the identity case where it's already there).
    pub fn derivable_from(target: Polarization, available: &[Polarization]) -> bool {
        if available.contains(&target) {
            return true;
        }
        match target {
            Polarization::PI => Self::pi_sources(available).is_some(),
            Polarization::I => {
                (available.contains(&Polarization::RR) && available.contains(&Polarization::LL))
                    || (available.contains(&Polarization::XX)
                        && available.contains(&Polarization::YY))
            }
            Polarization::V => {
                available.contains(&Polarization::RR) && available.contains(&Polarization::LL)
            }
            Polarization::Q | Polarization::U => {
                available.contains(&Polarization::RL) && available.contains(&Polarization::LR)
            }
            _ => false,
        }
    }
}

/// An inclusive range of global channel indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelRange {
    pub start: usize,
    pub end: usize,
}

impl ChannelRange {
    pub fn contains(&self, chan: usize) -> bool {
        chan >= self.start && chan <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A set of global channel ranges, as accepted by `select`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChannelRangeList(pub Vec<ChannelRange>);

impl ChannelRangeList {
    /// Sort ranges by start and merge any that overlap or abut, giving a
    /// canonical form suitable for use as a stable multi-model table key.
    pub fn canonicalize(&self) -> Self {
        let mut ranges = self.0.clone();
        ranges.sort_by_key(|r| r.start);
        let mut merged: Vec<ChannelRange> = Vec::with_capacity(ranges.len());
        for r in ranges {
            match merged.last_mut() {
                Some(last) if r.start <= last.end + 1 => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }
        ChannelRangeList(merged)
    }

    pub fn all(total_nchan: usize) -> Self {
        if total_nchan == 0 {
            ChannelRangeList(Vec::new())
        } else {
            ChannelRangeList(vec![ChannelRange {
                start: 0,
                end: total_nchan - 1,
            }])
        }
    }

    pub fn contains(&self, chan: usize) -> bool {
        self.0.iter().any(|r| r.contains(chan))
    }

    /// Resolve this channel-range list, expressed in global channel
    /// indices, against a concrete IF layout, returning `(if_index,
    /// local_chan)` pairs.
    pub fn resolve(&self, ifs: &[IfDescriptor]) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (if_idx, descr) in ifs.iter().enumerate() {
            for local in 0..descr.nchan {
                let global = descr.channel_offset + local;
                if self.contains(global) {
                    out.push((if_idx, local));
                }
            }
        }
        out
    }
}

/// The key a selection is recorded/installed under in the multi-model
/// table: `(pol, channel_ranges)`, with ranges canonicalised so that
/// equivalent selections compare equal regardless of insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SelectionKey {
    pub polarization: Polarization,
    pub channels: ChannelRangeList,
}

impl SelectionKey {
    pub fn new(polarization: Polarization, channels: &ChannelRangeList) -> Self {
        SelectionKey {
            polarization,
            channels: channels.canonicalize(),
        }
    }
}

/// The active polarization/channel selection, plus an IF cursor used by
/// `next_if`/`get_if` to step through the IFs the current channel
/// ranges touch.
#[derive(Clone, Debug)]
pub struct Selection {
    pub polarization: Polarization,
    pub channels: ChannelRangeList,
    cursor: Option<usize>,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            polarization: Polarization::I,
            channels: ChannelRangeList::default(),
            cursor: None,
        }
    }
}

impl Selection {
    /// Set the active polarization and channel ranges, resetting the IF
    /// cursor. `available` is the set of polarizations actually present
    /// in the visibility store, used to reject an unrealizable request.
    pub fn select(
        &mut self,
        polarization: Polarization,
        channels: ChannelRangeList,
        available: &[Polarization],
    ) -> Result<(), VisError> {
        if !Polarization::derivable_from(polarization, available) {
            return Err(VisError::PolarizationUnavailable(
                polarization.name().to_string(),
            ));
        }
        self.polarization = polarization;
        self.channels = channels;
        self.cursor = None;
        Ok(())
    }

    /// The multi-model table key for the selection currently active.
    pub fn key(&self) -> SelectionKey {
        SelectionKey::new(self.polarization, &self.channels)
    }

    /// Advance the IF cursor to the next IF (in ascending order) that the
    /// current channel selection touches, returning its index. Returns
    /// `None` once every matching IF has been visited; a subsequent call
    /// restarts from the first matching IF.
    pub fn next_if(&mut self, ifs: &[IfDescriptor]) -> Option<usize> {
        let matching: Vec<usize> = ifs
            .iter()
            .enumerate()
            .filter(|(_, descr)| {
                (0..descr.nchan).any(|local| self.channels.contains(descr.channel_offset + local))
            })
            .map(|(i, _)| i)
            .collect();
        if matching.is_empty() {
            self.cursor = None;
            return None;
        }
        let next_pos = match self.cursor {
            None => 0,
            Some(current) => match matching.iter().position(|&i| i == current) {
                Some(pos) if pos + 1 < matching.len() => pos + 1,
                _ => {
                    self.cursor = None;
                    return None;
                }
            },
        };
        let next_if = matching[next_pos];
        self.cursor = Some(next_if);
        Some(next_if)
    }

    /// The IF the cursor currently points at, if `next_if` has been
    /// called since the last `select`.
    pub fn get_if(&self) -> Option<usize> {
        self.cursor
    }
}
