//! Communicator abstraction for collective delivery.
//!
//! The dispatcher never talks to a concrete transport. It sees a
//! [`Communicator`]: a reliable, ordered channel from one coordinator rank to
//! every other rank of a fixed-size group. Implementations decide how frames
//! actually move (threads and channels, MPI, sockets).

use crate::Rank;

/// Errors raised by a communicator.
///
/// Every variant is fatal to the collective: once a frame cannot be delivered
/// to all ranks, the group can no longer agree on its state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The peer on the other end of a channel is gone.
    #[error("{rank} disconnected")]
    Disconnected {
        /// The rank that could not be reached.
        rank: Rank,
    },

    /// Only the coordinator may broadcast.
    #[error("{rank} is not the coordinator and cannot broadcast")]
    NotCoordinator {
        /// The rank that attempted to broadcast.
        rank: Rank,
    },

    /// The coordinator never receives its own broadcasts.
    #[error("{rank} is the coordinator and cannot receive")]
    CoordinatorCannotReceive {
        /// The coordinator rank.
        rank: Rank,
    },

    /// The group could not be formed.
    #[error("invalid group: {reason}")]
    InvalidGroup {
        /// Why the group was rejected.
        reason: String,
    },
}

/// Reliable, ordered, one-to-all delivery inside a fixed group.
///
/// # Contract
///
/// - Frames broadcast by the coordinator arrive at every worker in the order
///   they were broadcast.
/// - [`broadcast`](Communicator::broadcast) returns once the transport has
///   accepted the frame for every worker.
/// - [`receive`](Communicator::receive) blocks until the next frame arrives.
///   There is no timeout.
pub trait Communicator {
    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the group, coordinator included.
    fn size(&self) -> usize;

    /// The rank that issues calls.
    fn coordinator(&self) -> Rank;

    /// Whether this process is the coordinator.
    fn is_coordinator(&self) -> bool {
        self.rank() == self.coordinator()
    }

    /// Send `frame` to every worker. Coordinator only.
    ///
    /// # Errors
    ///
    /// Returns `NotCoordinator` when called on a worker, or `Disconnected`
    /// when a worker can no longer be reached.
    fn broadcast(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Block until the next frame from the coordinator arrives. Workers only.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorCannotReceive` when called on the coordinator, or
    /// `Disconnected` when the coordinator is gone.
    fn receive(&self) -> Result<Vec<u8>, TransportError>;
}
