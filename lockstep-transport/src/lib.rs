//! # lockstep transport layer
//!
//! Moves pending calls between the ranks of a collective group.
//!
//! This crate provides:
//! - **Wire format**: framed `(id, payload)` messages with CRC32C checksums
//! - **Group configuration**: size, coordinator and channel capacity
//! - **Local transport**: an in-process group with one thread per rank

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use lockstep_core::{Communicator, Rank, TransportError};

/// Group configuration.
pub mod config;

/// In-process collective transport.
pub mod local;

/// Frame format with CRC32C checksums.
pub mod wire;

pub use config::GroupConfig;
pub use local::{LocalCommunicator, LocalGroup};
pub use wire::{
    FrameHeader, HEADER_SIZE, MAX_ENCODABLE_PAYLOAD, MAX_PAYLOAD_SIZE, WireError, deserialize_frame,
    deserialize_frame_unverified, serialize_frame, serialize_frame_with_limit,
};
