// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::{CorrOrder, Field, FieldSet, Link, VisBuffer, VisBufferError};

impl VisBuffer {
    /// Copy this buffer. The copy holds the same valid fields.
    ///
    /// A copy of an attached buffer is linked one way to the iterator: it
    /// can fill more fields while the iterator stays where it was when the
    /// copy was made, and gets [`VisBufferError::StalePosition`] after. The
    /// iterator never invalidates it.
    ///
    /// Sorted buffers can't be copied; unsort first.
    pub fn try_copy(&mut self) -> Result<VisBuffer, VisBufferError> {
        self.sync();
        self.check_copyable("copy")?;
        let link = match &self.link {
            Link::Attached(weak) => match weak.upgrade() {
                Some(iter) => Link::OneWay {
                    iter: weak.clone(),
                    generation: iter.borrow().generation(),
                },
                None => Link::Detached,
            },
            Link::OneWay { iter, generation } => Link::OneWay {
                iter: iter.clone(),
                generation: *generation,
            },
            Link::Detached => Link::Detached,
        };
        let valid = self.valid_fields();
        let mut copy = VisBuffer::new();
        for field in valid.iter() {
            copy.store.copy_field(&self.store, field);
        }
        copy.shared.valid.set(valid);
        copy.link = link;
        copy.dirty = self.dirty;
        copy.chan_averaged = self.chan_averaged;
        copy.stokes_formed = self.stokes_formed;
        Ok(copy)
    }

    /// Fill every field that can be filled, then copy into a detached
    /// buffer. Fields a destructive operation has made unfillable are left
    /// invalid in the copy. Like [`VisBuffer::try_copy`], this refuses
    /// sorted buffers.
    pub fn deep_copy(&mut self) -> Result<VisBuffer, VisBufferError> {
        self.sync();
        self.check_copyable("deep copy")?;
        if !matches!(self.link, Link::Detached) {
            for field in Field::ALL {
                match self.ensure_inner(field) {
                    Ok(()) | Err(VisBufferError::DestructiveState { .. }) => (),
                    Err(e) => return Err(e),
                }
            }
        }
        let valid = self.valid_fields();
        let mut copy = VisBuffer::new();
        for field in valid.iter() {
            copy.store.copy_field(&self.store, field);
        }
        copy.shared.valid.set(valid);
        copy.chan_averaged = self.chan_averaged;
        copy.stokes_formed = self.stokes_formed;
        Ok(copy)
    }

    fn check_copyable(&self, operation: &'static str) -> Result<(), VisBufferError> {
        if matches!(self.corr_order, CorrOrder::Canonical(_)) {
            Err(VisBufferError::DestructiveState {
                operation,
                state: "correlation-sorted",
            })
        } else {
            Ok(())
        }
    }

    /// Forget every field. A detached buffer can't refill them.
    pub fn invalidate(&mut self) {
        self.sync();
        for field in self.valid_fields().iter() {
            self.store.clear(field);
        }
        self.shared.valid.set(FieldSet::empty());
        self.dirty = FieldSet::empty();
    }
}
