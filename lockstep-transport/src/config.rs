//! Configuration structures for collective groups.

use lockstep_core::{Rank, TransportError};

/// Configuration for forming a collective group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupConfig {
    /// Number of ranks, coordinator included.
    pub size: usize,

    /// Rank that issues calls; every other rank runs a worker loop.
    pub coordinator: Rank,

    /// Per-worker channel capacity.
    ///
    /// `None` means unbounded: a broadcast is accepted as soon as it is
    /// queued. `Some(0)` makes every send a rendezvous, so the coordinator
    /// blocks until each worker takes the frame.
    pub channel_capacity: Option<usize>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            size: 1,
            coordinator: Rank::new(0),
            channel_capacity: None,
        }
    }
}

impl GroupConfig {
    /// Group of `size` ranks, coordinator 0, unbounded FIFO channels.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Group of `size` ranks whose broadcasts block until every worker has
    /// taken the frame.
    pub fn synchronous(size: usize) -> Self {
        Self {
            size,
            channel_capacity: Some(0),
            ..Self::default()
        }
    }

    /// Use a different coordinator rank.
    pub fn with_coordinator(mut self, coordinator: Rank) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Bound each worker's channel to `capacity` frames.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Check that the group can be formed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGroup` for an empty group or an out-of-range
    /// coordinator.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.size == 0 {
            return Err(TransportError::InvalidGroup {
                reason: "group must contain at least one rank".to_string(),
            });
        }
        if u32::try_from(self.size).is_err() {
            return Err(TransportError::InvalidGroup {
                reason: format!("group size {} exceeds the rank range", self.size),
            });
        }
        if self.coordinator.index() >= self.size {
            return Err(TransportError::InvalidGroup {
                reason: format!(
                    "coordinator {} outside group of size {}",
                    self.coordinator, self.size
                ),
            });
        }
        Ok(())
    }
}
