//! Core types for collective dispatch.
//!
//! - [`CallbackId`]: dense index of a registered callback, plus the reserved
//!   control ids
//! - [`Rank`]: position of a process inside its group

use serde::{Deserialize, Serialize};

/// Dense identifier of a registered callback.
///
/// Ids are meaningful only because every rank registers callbacks in the same
/// order. Values at or above [`CallbackId::MAX_REGISTRABLE`] are reserved for
/// protocol control and are never handed out by a registry.
///
/// # Examples
///
/// ```
/// use lockstep_core::CallbackId;
///
/// let id = CallbackId::new(3);
/// assert_eq!(id.index(), 3);
/// assert!(!id.is_reserved());
/// assert!(CallbackId::LOOP_TERMINATE.is_reserved());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct CallbackId(u32);

impl CallbackId {
    /// Sentinel that tells workers to leave their receive loop.
    pub const LOOP_TERMINATE: CallbackId = CallbackId(u32::MAX);

    /// First reserved raw value. Registrable ids are `0..MAX_REGISTRABLE`.
    pub const MAX_REGISTRABLE: u32 = u32::MAX - 1;

    /// Create an id from its raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Slot index inside a registry table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this id lies in the reserved control range.
    pub const fn is_reserved(self) -> bool {
        self.0 >= Self::MAX_REGISTRABLE
    }

    /// Whether this id is the loop-terminate sentinel.
    pub const fn is_loop_terminate(self) -> bool {
        self.0 == Self::LOOP_TERMINATE.0
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_loop_terminate() {
            write!(f, "callback#loop-terminate")
        } else {
            write!(f, "callback#{}", self.0)
        }
    }
}

/// Position of a process inside a collective group (`0..size`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Rank(u32);

impl Rank {
    /// Create a rank from its raw value.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw rank value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Rank as an index into per-rank tables.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rank {}", self.0)
    }
}
