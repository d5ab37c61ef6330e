//! Error types for collective dispatch.
//!
//! Every [`DispatchError`] is fatal to the run. A collective either completes
//! on all ranks or the group is compromised, so there is no partial state to
//! roll back to. Callers are expected to log the diagnostic and abort.

use lockstep_core::{CallbackId, CodecError, Rank, TransportError};
use lockstep_transport::WireError;

/// Errors that can occur while registering, calling or dispatching callbacks.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No handle at `id`: the registries of the group have diverged.
    #[error("{rank}: no callback registered at {id} (registry desynchronized)")]
    UnknownCallback {
        /// The id that could not be resolved.
        id: CallbackId,
        /// Rank that detected the problem.
        rank: Rank,
    },

    /// The payload does not decode exactly into the handle's argument types.
    #[error("{rank}: payload for {id} does not match signature {signature}: {source}")]
    DecodeMismatch {
        /// Target callback.
        id: CallbackId,
        /// Rank that detected the problem.
        rank: Rank,
        /// Argument tuple the handle expects.
        signature: &'static str,
        /// Underlying codec failure.
        #[source]
        source: CodecError,
    },

    /// The coordinator called `id` with arguments of a different type.
    #[error("{id} expects arguments {expected}, called with {found}")]
    SignatureMismatch {
        /// Target callback.
        id: CallbackId,
        /// Argument tuple the handle expects.
        expected: &'static str,
        /// Argument tuple supplied by the caller.
        found: &'static str,
    },

    /// Arguments could not be encoded.
    #[error("failed to encode arguments for {id}: {source}")]
    EncodeFailed {
        /// Target callback.
        id: CallbackId,
        /// Underlying codec failure.
        #[source]
        source: CodecError,
    },

    /// A reserved control id was used as a callback id.
    #[error("{id} is reserved")]
    ReservedId {
        /// The offending id.
        id: CallbackId,
    },

    /// Every registrable id is in use.
    #[error("callback registry full: {capacity} ids in use")]
    RegistryFull {
        /// Number of registrable ids.
        capacity: u32,
    },

    /// A coordinator-only operation was attempted on a worker.
    #[error("{rank} is not the coordinator")]
    NotCoordinator {
        /// The worker rank.
        rank: Rank,
    },

    /// The coordinator tried to enter the worker loop.
    #[error("{rank} is the coordinator and cannot run the worker loop")]
    NotWorker {
        /// The coordinator rank.
        rank: Rank,
    },

    /// The dispatcher behind a scoped callback was already torn down.
    #[error("dispatcher for {id} was torn down")]
    DispatcherClosed {
        /// The guarded callback.
        id: CallbackId,
    },

    /// The slot a scoped callback guarded was unregistered without the guard.
    #[error("{id} is no longer held by its scoped callback")]
    GuardReleased {
        /// The guarded callback.
        id: CallbackId,
    },

    /// The communicator failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A received frame was malformed.
    #[error("malformed frame: {0}")]
    Wire(#[from] WireError),
}

impl DispatchError {
    /// The callback id this error concerns, when there is one.
    pub fn callback_id(&self) -> Option<CallbackId> {
        match self {
            DispatchError::UnknownCallback { id, .. }
            | DispatchError::DecodeMismatch { id, .. }
            | DispatchError::SignatureMismatch { id, .. }
            | DispatchError::EncodeFailed { id, .. }
            | DispatchError::ReservedId { id }
            | DispatchError::DispatcherClosed { id }
            | DispatchError::GuardReleased { id } => Some(*id),
            _ => None,
        }
    }
}
