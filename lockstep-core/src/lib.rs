//! # lockstep-core
//!
//! Core abstractions shared by every lockstep crate.
//!
//! - **Core types**: [`CallbackId`] and [`Rank`], the two integers the
//!   collective protocol is built on
//! - **Argument codecs**: [`MessageCodec`] with the compact [`BincodeCodec`]
//!   (default) and the human-readable [`JsonCodec`]
//! - **Communicator trait**: [`Communicator`], the opaque reliable, ordered,
//!   collective delivery primitive the dispatcher runs on
//!
//! ## Collective model
//!
//! A group is a fixed set of ranks executing the same program. Exactly one
//! rank is the coordinator; it broadcasts frames. Every other rank is a
//! worker and receives those frames in the order they were sent. Nothing in
//! this crate negotiates ids or types across ranks: symmetry comes from every
//! rank executing the same sequence of operations.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod codec;
mod communicator;
mod types;

pub use codec::{BincodeCodec, CodecError, JsonCodec, MessageCodec};
pub use communicator::{Communicator, TransportError};
pub use types::{CallbackId, Rank};
