//! # lockstep
//!
//! Collective callback dispatch for SPMD process groups.
//!
//! One coordinator rank invokes statically-typed callbacks identically on
//! every rank of a fixed-size group, using nothing but an integer
//! [`CallbackId`] and an encoded argument payload. Every rank executes the
//! same program, registers the same callbacks in the same order, and so
//! agrees on what each id means without ever exchanging names or types.
//!
//! ## Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              lockstep (this crate)                          │
//! │   Callback handles • Registry • Dispatcher • Scoped guard   │
//! ├─────────────────────────────────────────────────────────────┤
//! │              lockstep-transport                             │
//! │   Frame format (CRC32C) • GroupConfig • LocalGroup          │
//! ├─────────────────────────────────────────────────────────────┤
//! │              lockstep-core                                  │
//! │   CallbackId • Rank • MessageCodec • Communicator           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! - [`CollectiveDispatcher::register_callback`] and
//!   [`CollectiveDispatcher::unregister`] run on every rank, in order.
//! - [`CollectiveDispatcher::call`] on the coordinator broadcasts
//!   `(id, payload)` and then invokes its own handle directly.
//! - [`CollectiveDispatcher::run_worker_loop`] on every other rank decodes
//!   and invokes until [`CollectiveDispatcher::stop_worker_loop`] sends the
//!   loop-terminate sentinel.
//! - [`ScopedCallback`] releases its slot when dropped.
//!
//! Every [`DispatchError`] is fatal: the group has diverged or lost a member
//! and the run must be aborted.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use lockstep_core::{
    BincodeCodec, CallbackId, CodecError, Communicator, JsonCodec, MessageCodec, Rank,
    TransportError,
};
pub use lockstep_transport::{GroupConfig, LocalCommunicator, LocalGroup, WireError};

/// Callback handles and the replicated registry.
pub mod callback;

/// Dispatcher configuration.
pub mod config;

/// Error types for collective dispatch.
pub mod error;

mod dispatcher;
mod guard;

pub use callback::{Arguments, Callback, CallbackHandle, CallbackRegistry, TypedCallback};
pub use config::DispatcherConfig;
pub use dispatcher::{CollectiveDispatcher, LoopReport};
pub use error::DispatchError;
pub use guard::ScopedCallback;
