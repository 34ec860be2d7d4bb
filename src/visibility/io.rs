// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The boundary between the visibility store and a concrete UV FITS
//! reader/writer.
//!
//! A full UV FITS codec is out of scope: the store instead depends on
//! the [`VisibilityIo`] trait, and callers supply whatever concrete
//! reader the deployment needs. [`InMemoryVisibilityIo`] is the
//! reference implementation used by tests and by callers who construct
//! a [`VisibilityStore`] programmatically rather than from a file.

use super::{VisError, VisibilityStore};

/// Read/write visibility data from/to an external representation. A
/// concrete UV FITS implementation lives outside this crate; see
/// `SPEC_FULL.md` for the division of responsibility.
pub trait VisibilityIo {
    fn read(&mut self) -> Result<VisibilityStore, VisError>;
    fn write(&mut self, store: &VisibilityStore) -> Result<(), VisError>;
}

/// An in-memory `VisibilityIo` that just clones the store it's handed;
/// useful for round-trip tests and scripted scenarios that never touch
/// a real file.
#[derive(Default)]
pub struct InMemoryVisibilityIo {
    stored: Option<VisibilityStore>,
}

impl InMemoryVisibilityIo {
    pub fn new(store: VisibilityStore) -> Self {
        InMemoryVisibilityIo {
            stored: Some(store),
        }
    }
}

impl VisibilityIo for InMemoryVisibilityIo {
    fn read(&mut self) -> Result<VisibilityStore, VisError> {
        self.stored
            .clone()
            .ok_or_else(|| VisError::Parse("no visibility data has been written yet".into()))
    }

    fn write(&mut self, store: &VisibilityStore) -> Result<(), VisError> {
        self.stored = Some(store.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::IfDescriptor;

    #[test]
    fn round_trips_through_memory() {
        let store = VisibilityStore::new(
            vec![],
            vec![IfDescriptor {
                freq: 1.0e9,
                df: 1.0,
                bandwidth: 1.0,
                channel_offset: 0,
                nchan: 1,
            }],
        );
        let mut io = InMemoryVisibilityIo::default();
        io.write(&store).unwrap();
        let read_back = io.read().unwrap();
        assert_eq!(read_back.ifs.len(), 1);
    }

    #[test]
    fn read_before_write_errors() {
        let mut io = InMemoryVisibilityIo::default();
        assert!(io.read().is_err());
    }
}
