//! In-process collective transport.
//!
//! A [`LocalGroup`] stands a whole SPMD group up inside one process: every
//! rank gets a [`LocalCommunicator`], meant to be moved onto its own thread.
//! The coordinator holds one sender per worker; each worker holds the single
//! receiver fed by the coordinator, which gives per-worker FIFO delivery.

use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use lockstep_core::{Communicator, Rank, TransportError};

use crate::GroupConfig;

enum Link {
    Coordinator { workers: Vec<(Rank, Sender<Vec<u8>>)> },
    Worker { inbox: Receiver<Vec<u8>> },
}

/// One rank's view of a [`LocalGroup`].
///
/// Dropping the coordinator's communicator disconnects every worker: a worker
/// blocked in [`receive`](Communicator::receive) then gets
/// [`TransportError::Disconnected`] instead of hanging.
pub struct LocalCommunicator {
    rank: Rank,
    size: usize,
    coordinator: Rank,
    link: Link,
}

impl std::fmt::Debug for LocalCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCommunicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl LocalCommunicator {
    /// Frames delivered to this worker but not yet received. Always 0 on the
    /// coordinator.
    pub fn pending(&self) -> usize {
        match &self.link {
            Link::Coordinator { .. } => 0,
            Link::Worker { inbox } => inbox.len(),
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn coordinator(&self) -> Rank {
        self.coordinator
    }

    fn broadcast(&self, frame: &[u8]) -> Result<(), TransportError> {
        let Link::Coordinator { workers } = &self.link else {
            return Err(TransportError::NotCoordinator { rank: self.rank });
        };

        for (rank, sender) in workers {
            sender
                .send(frame.to_vec())
                .map_err(|_| TransportError::Disconnected { rank: *rank })?;
        }
        tracing::trace!(
            rank = %self.rank,
            workers = workers.len(),
            bytes = frame.len(),
            "Broadcast frame"
        );
        Ok(())
    }

    fn receive(&self) -> Result<Vec<u8>, TransportError> {
        let Link::Worker { inbox } = &self.link else {
            return Err(TransportError::CoordinatorCannotReceive { rank: self.rank });
        };

        inbox.recv().map_err(|_| TransportError::Disconnected {
            rank: self.coordinator,
        })
    }
}

/// Factory and runner for in-process groups.
pub struct LocalGroup;

impl LocalGroup {
    /// Create one communicator per rank, ordered by rank.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGroup` if the configuration does not validate.
    pub fn form(config: &GroupConfig) -> Result<Vec<LocalCommunicator>, TransportError> {
        config.validate()?;

        let mut senders = Vec::with_capacity(config.size.saturating_sub(1));
        let mut members = Vec::with_capacity(config.size);

        for index in 0..config.size {
            let rank = Rank::new(index as u32);
            if rank == config.coordinator {
                continue;
            }
            let (tx, rx) = match config.channel_capacity {
                Some(capacity) => channel::bounded(capacity),
                None => channel::unbounded(),
            };
            senders.push((rank, tx));
            members.push(LocalCommunicator {
                rank,
                size: config.size,
                coordinator: config.coordinator,
                link: Link::Worker { inbox: rx },
            });
        }

        members.insert(
            config.coordinator.index(),
            LocalCommunicator {
                rank: config.coordinator,
                size: config.size,
                coordinator: config.coordinator,
                link: Link::Coordinator { workers: senders },
            },
        );

        tracing::info!(
            size = config.size,
            coordinator = %config.coordinator,
            capacity = ?config.channel_capacity,
            "Local group formed"
        );
        Ok(members)
    }

    /// Form a group and run `rank_main` on one thread per rank.
    ///
    /// Returns the per-rank results ordered by rank. If any rank panics, the
    /// other ranks are still joined and the first panic is then resumed on
    /// the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGroup` if the configuration does not validate or a
    /// rank thread cannot be spawned.
    ///
    /// # Example
    ///
    /// ```
    /// use lockstep_core::Communicator;
    /// use lockstep_transport::{GroupConfig, LocalGroup};
    ///
    /// let ranks = LocalGroup::run(&GroupConfig::new(3), |comm| comm.rank().get())
    ///     .expect("group");
    /// assert_eq!(ranks, vec![0, 1, 2]);
    /// ```
    pub fn run<T, F>(config: &GroupConfig, rank_main: F) -> Result<Vec<T>, TransportError>
    where
        T: Send,
        F: Fn(LocalCommunicator) -> T + Sync,
    {
        let members = Self::form(config)?;
        let rank_main = &rank_main;

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(members.len());
            for comm in members {
                let name = format!("rank-{}", comm.rank().get());
                let handle = thread::Builder::new()
                    .name(name)
                    .spawn_scoped(scope, move || rank_main(comm))
                    .map_err(|e| TransportError::InvalidGroup {
                        reason: format!("failed to spawn rank thread: {e}"),
                    })?;
                handles.push(handle);
            }

            let mut results = Vec::with_capacity(handles.len());
            let mut first_panic = None;
            for handle in handles {
                match handle.join() {
                    Ok(value) => results.push(value),
                    Err(payload) => {
                        first_panic.get_or_insert(payload);
                    }
                }
            }

            if let Some(payload) = first_panic {
                std::panic::resume_unwind(payload);
            }
            Ok(results)
        })
    }
}
