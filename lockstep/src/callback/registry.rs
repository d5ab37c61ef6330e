//! CallbackRegistry: CallbackId → handle routing.
//!
//! Dense table indexed by [`CallbackId`]. Every rank owns its own replica;
//! replicas stay identical because every rank performs the same sequence of
//! `register`/`unregister` operations. No id is ever negotiated.
//!
//! New registrations take the lowest free slot, or append when there is none.
//! Each registration is stamped with a generation, so a slot that was freed
//! and reused can be told apart from its previous occupant.

use std::collections::BTreeSet;
use std::rc::Rc;

use lockstep_core::{CallbackId, MessageCodec};

use super::CallbackHandle;
use crate::error::DispatchError;

struct Slot<K: MessageCodec> {
    handle: Rc<dyn CallbackHandle<K>>,
    generation: u64,
}

/// Replicated table of callback handles.
pub struct CallbackRegistry<K: MessageCodec> {
    /// Slot table; `None` marks a freed slot awaiting reuse.
    slots: Vec<Option<Slot<K>>>,

    /// Freed slot indices, lowest reused first.
    free: BTreeSet<u32>,

    registration_count: u64,
    deregistration_count: u64,
}

impl<K: MessageCodec> Default for CallbackRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MessageCodec> CallbackRegistry<K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
            registration_count: 0,
            deregistration_count: 0,
        }
    }

    /// Store a handle and return its id.
    ///
    /// # Errors
    ///
    /// Returns `RegistryFull` once every registrable id is in use.
    pub fn register(
        &mut self,
        handle: Rc<dyn CallbackHandle<K>>,
    ) -> Result<CallbackId, DispatchError> {
        let slot = Slot {
            handle,
            generation: self.registration_count,
        };
        let id = match self.free.pop_first() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                CallbackId::new(index)
            }
            None => {
                let index = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|index| *index < CallbackId::MAX_REGISTRABLE)
                    .ok_or(DispatchError::RegistryFull {
                        capacity: CallbackId::MAX_REGISTRABLE,
                    })?;
                self.slots.push(Some(slot));
                CallbackId::new(index)
            }
        };

        self.registration_count += 1;
        tracing::trace!(%id, live = self.len(), "Callback registered");
        Ok(id)
    }

    /// Remove the handle at `id` and free its slot.
    ///
    /// # Returns
    ///
    /// The removed handle, or `None` if nothing was registered at `id`.
    pub fn unregister(&mut self, id: CallbackId) -> Option<Rc<dyn CallbackHandle<K>>> {
        let removed = self.slots.get_mut(id.index()).and_then(Option::take)?;
        self.free.insert(id.get());
        self.deregistration_count += 1;
        tracing::trace!(%id, live = self.len(), "Callback unregistered");
        Some(removed.handle)
    }

    /// Remove the handle at `id` only if it is still the registration
    /// stamped with `generation`.
    ///
    /// # Returns
    ///
    /// The removed handle, or `None` if the slot is empty or now holds a
    /// later registration.
    pub fn unregister_generation(
        &mut self,
        id: CallbackId,
        generation: u64,
    ) -> Option<Rc<dyn CallbackHandle<K>>> {
        if self.generation(id) != Some(generation) {
            return None;
        }
        self.unregister(id)
    }

    /// Look up the handle registered at `id`.
    pub fn get(&self, id: CallbackId) -> Option<Rc<dyn CallbackHandle<K>>> {
        self.slot(id).map(|slot| Rc::clone(&slot.handle))
    }

    /// Generation stamped on the registration currently at `id`.
    pub fn generation(&self, id: CallbackId) -> Option<u64> {
        self.slot(id).map(|slot| slot.generation)
    }

    fn slot(&self, id: CallbackId) -> Option<&Slot<K>> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    /// Whether a handle is registered at `id`.
    pub fn contains(&self, id: CallbackId) -> bool {
        matches!(self.slots.get(id.index()), Some(Some(_)))
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether no handle is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of freed slots awaiting reuse.
    pub fn free_slots(&self) -> usize {
        self.free.len()
    }

    /// Release every slot without invoking anything.
    pub fn clear(&mut self) {
        let released = self.len();
        self.slots.clear();
        self.free.clear();
        if released > 0 {
            tracing::debug!(released, "Callback registry cleared");
        }
    }

    /// Get total registration count (for metrics).
    pub fn registration_count(&self) -> u64 {
        self.registration_count
    }

    /// Get total deregistration count (for metrics).
    pub fn deregistration_count(&self) -> u64 {
        self.deregistration_count
    }
}
