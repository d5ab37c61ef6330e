//! Scoped lifetime guard for registered callbacks.
//!
//! A [`ScopedCallback`] unregisters its callback when dropped, on every exit
//! path including unwinding. Dropping the guard is a collective operation
//! like any other deregistration: each rank holds its own guard for the same
//! id, and all of them must be dropped at the same logical point. Guards
//! held by objects that are created and destroyed inside callbacks satisfy
//! this automatically, since callbacks run on every rank.

use std::rc::Weak;

use lockstep_core::{BincodeCodec, CallbackId, Communicator, MessageCodec};

use crate::callback::Arguments;
use crate::dispatcher::CollectiveDispatcher;
use crate::error::DispatchError;

/// Owning guard over a registered callback id.
///
/// Holds only a weak reference to its dispatcher. If the dispatcher has
/// already been torn down, the slot is gone and dropping the guard does
/// nothing. The same holds once the guarded registration was unregistered
/// directly: the guard never touches a later occupant of its slot.
pub struct ScopedCallback<C: Communicator, K: MessageCodec = BincodeCodec> {
    id: CallbackId,
    generation: u64,
    dispatcher: Weak<CollectiveDispatcher<C, K>>,
    armed: bool,
}

impl<C: Communicator, K: MessageCodec> ScopedCallback<C, K> {
    pub(crate) fn new(
        id: CallbackId,
        generation: u64,
        dispatcher: Weak<CollectiveDispatcher<C, K>>,
    ) -> Self {
        Self {
            id,
            generation,
            dispatcher,
            armed: true,
        }
    }

    /// The guarded id.
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// Invoke the guarded callback on every rank. Coordinator only.
    ///
    /// # Errors
    ///
    /// Returns `DispatcherClosed` if the dispatcher is gone,
    /// `GuardReleased` if the guarded registration was unregistered
    /// directly, otherwise the errors of [`CollectiveDispatcher::call`].
    pub fn call<Args: Arguments>(&self, args: Args) -> Result<(), DispatchError> {
        let dispatcher = self
            .dispatcher
            .upgrade()
            .ok_or(DispatchError::DispatcherClosed { id: self.id })?;
        if !dispatcher.holds_generation(self.id, self.generation) {
            return Err(DispatchError::GuardReleased { id: self.id });
        }
        dispatcher.call(self.id, args)
    }

    /// Disarm the guard and keep the callback registered.
    pub fn release(mut self) -> CallbackId {
        self.armed = false;
        self.id
    }
}

impl<C: Communicator, K: MessageCodec> Drop for ScopedCallback<C, K> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Some(dispatcher) = self.dispatcher.upgrade() else {
            return;
        };

        if !dispatcher.release_scoped(self.id, self.generation) {
            tracing::debug!(id = %self.id, "Scoped callback already unregistered");
        }
    }
}

impl<C: Communicator, K: MessageCodec> std::fmt::Debug for ScopedCallback<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedCallback")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("armed", &self.armed)
            .finish()
    }
}
