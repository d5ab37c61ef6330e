//! Collective dispatcher: the call/loop protocol.
//!
//! # Coordinator
//!
//! ```text
//! Idle ──call(id, args)──► encode args ──► broadcast (id, payload) ──► invoke local handle ──► Idle
//! ```
//!
//! The local invocation receives `args` directly; only workers decode.
//!
//! # Worker
//!
//! ```text
//! Awaiting ──frame──► decode id ──► LOOP_TERMINATE? ──yes──► Stopped
//!    ▲                                   │ no
//!    └──── invoke handle ◄── decode payload ◄── look up handle
//! ```
//!
//! A worker finishes the handle it is running before reading the next frame,
//! so termination is ordered after every call already sent.
//!
//! # Collective operations
//!
//! `register_callback`, `unregister` and `call` must be executed by every
//! rank, in the same relative order. Registration and deregistration run
//! locally on each rank: either before workers enter their loop, or inside a
//! callback, which executes on every rank. Nothing checks this at runtime;
//! divergence shows up as [`DispatchError::UnknownCallback`], a
//! [`DispatchError::DecodeMismatch`], or a call landing on the wrong handle.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lockstep_core::{BincodeCodec, CallbackId, Communicator, MessageCodec, Rank};
use lockstep_transport::{
    deserialize_frame, deserialize_frame_unverified, serialize_frame, serialize_frame_with_limit,
};

use crate::callback::{Arguments, Callback, CallbackHandle, CallbackRegistry, TypedCallback};
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::guard::ScopedCallback;

/// Summary of one worker loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Callbacks invoked before the loop-terminate sentinel arrived.
    pub calls_executed: u64,
}

/// Dispatches callbacks identically on every rank of a group.
///
/// Owns the rank's communicator and its replica of the callback registry.
/// The registry lives exactly as long as the dispatcher: dropping the
/// dispatcher releases every slot without dispatching anything.
///
/// Callables that need to reach the dispatcher should capture a
/// `Weak` reference; an `Rc` captured by a registered callable keeps the
/// dispatcher alive forever.
///
/// # Example
///
/// ```
/// use lockstep::{CollectiveDispatcher, GroupConfig, LocalGroup};
///
/// let received = LocalGroup::run(&GroupConfig::new(3), |comm| {
///     let dispatcher = CollectiveDispatcher::new(comm);
///     let seen = std::rc::Rc::new(std::cell::Cell::new(0));
///     let sink = seen.clone();
///     let id = dispatcher
///         .register_callback(move |i: i32, d: f64| sink.set(i + d as i32))
///         .expect("register");
///
///     if dispatcher.is_coordinator() {
///         dispatcher.call(id, (537, 3.4)).expect("call");
///         dispatcher.stop_worker_loop().expect("stop");
///     } else {
///         dispatcher.run_worker_loop().expect("loop");
///     }
///     seen.get()
/// })
/// .expect("group");
///
/// assert_eq!(received, vec![540, 540, 540]);
/// ```
pub struct CollectiveDispatcher<C: Communicator, K: MessageCodec = BincodeCodec> {
    comm: C,
    codec: K,
    config: DispatcherConfig,
    registry: RefCell<CallbackRegistry<K>>,
    calls_issued: Cell<u64>,
}

impl<C: Communicator> CollectiveDispatcher<C, BincodeCodec> {
    /// Create a dispatcher with the default codec and configuration.
    pub fn new(comm: C) -> Self {
        Self::with_codec(comm, BincodeCodec, DispatcherConfig::default())
    }
}

impl<C: Communicator, K: MessageCodec> CollectiveDispatcher<C, K> {
    /// Create a dispatcher with an explicit codec and configuration.
    ///
    /// Every rank of the group must use the same codec and configuration.
    pub fn with_codec(comm: C, codec: K, config: DispatcherConfig) -> Self {
        tracing::info!(
            rank = %comm.rank(),
            size = comm.size(),
            coordinator = %comm.coordinator(),
            "Collective dispatcher created"
        );
        Self {
            comm,
            codec,
            config,
            registry: RefCell::new(CallbackRegistry::new()),
            calls_issued: Cell::new(0),
        }
    }

    /// This rank.
    pub fn rank(&self) -> Rank {
        self.comm.rank()
    }

    /// Number of ranks in the group.
    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// Whether this rank issues calls.
    pub fn is_coordinator(&self) -> bool {
        self.comm.is_coordinator()
    }

    /// The active configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// The underlying communicator.
    pub fn communicator(&self) -> &C {
        &self.comm
    }

    /// Number of calls this coordinator has broadcast.
    pub fn calls_issued(&self) -> u64 {
        self.calls_issued.get()
    }

    /// Whether a callback is registered at `id` on this rank.
    pub fn contains(&self, id: CallbackId) -> bool {
        self.registry.borrow().contains(id)
    }

    /// Inspect this rank's registry replica.
    pub fn with_registry<R>(&self, inspect: impl FnOnce(&CallbackRegistry<K>) -> R) -> R {
        inspect(&self.registry.borrow())
    }

    /// Register a callable and return its id. Collective.
    ///
    /// # Errors
    ///
    /// Returns `RegistryFull` once every registrable id is in use.
    pub fn register_callback<Args, F>(&self, callable: F) -> Result<CallbackId, DispatchError>
    where
        Args: Arguments,
        F: Callback<Args>,
    {
        let handle: Rc<dyn CallbackHandle<K>> = Rc::new(TypedCallback::new(callable));
        self.registry.borrow_mut().register(handle)
    }

    /// Register a callable whose slot is released when the returned guard
    /// drops. Collective, and so is dropping the guard.
    ///
    /// The guard only releases the registration it was created for. If the
    /// id is unregistered explicitly and the slot reused, dropping the guard
    /// leaves the new occupant alone.
    ///
    /// # Errors
    ///
    /// Returns `RegistryFull` once every registrable id is in use.
    pub fn register_scoped<Args, F>(
        self: &Rc<Self>,
        callable: F,
    ) -> Result<ScopedCallback<C, K>, DispatchError>
    where
        Args: Arguments,
        F: Callback<Args>,
    {
        let handle: Rc<dyn CallbackHandle<K>> = Rc::new(TypedCallback::new(callable));
        let mut registry = self.registry.borrow_mut();
        let id = registry.register(handle)?;
        let generation = registry.generation(id).ok_or(DispatchError::UnknownCallback {
            id,
            rank: self.rank(),
        })?;
        Ok(ScopedCallback::new(id, generation, Rc::downgrade(self)))
    }

    /// Release a scoped slot if it still holds the guarded registration.
    ///
    /// Returns `false` when the slot was already unregistered, possibly
    /// reused since, in which case nothing is removed.
    pub(crate) fn release_scoped(&self, id: CallbackId, generation: u64) -> bool {
        let removed = self
            .registry
            .borrow_mut()
            .unregister_generation(id, generation);
        match removed {
            Some(handle) => {
                drop(handle);
                true
            }
            None => false,
        }
    }

    /// Whether `id` still holds the registration stamped with `generation`.
    pub(crate) fn holds_generation(&self, id: CallbackId, generation: u64) -> bool {
        self.registry.borrow().generation(id) == Some(generation)
    }

    /// Release the slot at `id`. Collective.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCallback` if nothing is registered at `id`.
    pub fn unregister(&self, id: CallbackId) -> Result<(), DispatchError> {
        // The removed handle may own guards of its own; drop it outside the borrow.
        let removed = self.registry.borrow_mut().unregister(id);
        match removed {
            Some(handle) => {
                drop(handle);
                Ok(())
            }
            None => Err(self.fatal(DispatchError::UnknownCallback {
                id,
                rank: self.rank(),
            })),
        }
    }

    /// Invoke the callback at `id` with `args` on every rank. Coordinator only.
    ///
    /// Workers receive `(id, encoded args)`; the coordinator invokes its own
    /// handle with `args` directly after the broadcast has been accepted.
    ///
    /// # Errors
    ///
    /// - `NotCoordinator` on a worker
    /// - `ReservedId`, `UnknownCallback` if `id` is not registered here
    /// - `SignatureMismatch` if `Args` is not the registered argument tuple
    /// - `EncodeFailed`, `Wire`, `Transport` if the broadcast fails
    pub fn call<Args: Arguments>(&self, id: CallbackId, args: Args) -> Result<(), DispatchError> {
        let handle = self.resolve_for_call(id)?;
        let Some(typed) = handle.as_any().downcast_ref::<TypedCallback<Args>>() else {
            return Err(self.signature_mismatch::<Args>(id, handle.as_ref()));
        };

        self.send(id, &args)?;
        typed.call(args);
        Ok(())
    }

    /// Invoke the callback at `id` on every worker, but not on the
    /// coordinator. Coordinator only.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub fn call_remote<Args: Arguments>(
        &self,
        id: CallbackId,
        args: Args,
    ) -> Result<(), DispatchError> {
        let handle = self.resolve_for_call(id)?;
        if !handle.as_any().is::<TypedCallback<Args>>() {
            return Err(self.signature_mismatch::<Args>(id, handle.as_ref()));
        }
        self.send(id, &args)
    }

    /// Make every worker leave its loop. Coordinator only.
    ///
    /// # Errors
    ///
    /// Returns `NotCoordinator` on a worker, or `Transport` if the sentinel
    /// cannot be delivered.
    pub fn stop_worker_loop(&self) -> Result<(), DispatchError> {
        self.ensure_coordinator()?;
        let frame = serialize_frame(CallbackId::LOOP_TERMINATE, &[])?;
        self.comm
            .broadcast(&frame)
            .map_err(|e| self.fatal(e.into()))?;
        tracing::info!(rank = %self.rank(), "Worker loop stop broadcast");
        Ok(())
    }

    /// Receive and execute calls until the coordinator stops the loop.
    /// Every worker enters this; the coordinator never does.
    ///
    /// The loop may be entered again after it returns.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the group: `NotWorker` on the coordinator,
    /// `Transport` when the coordinator is gone, `Wire` for a malformed
    /// frame, `UnknownCallback`/`ReservedId` when the registries have
    /// diverged, `DecodeMismatch` when a payload does not fit its handle.
    pub fn run_worker_loop(&self) -> Result<LoopReport, DispatchError> {
        let rank = self.rank();
        if self.is_coordinator() {
            return Err(DispatchError::NotWorker { rank });
        }

        tracing::info!(%rank, live = self.registry.borrow().len(), "Entering worker loop");
        let mut report = LoopReport::default();

        loop {
            let frame = self.comm.receive().map_err(|e| self.fatal(e.into()))?;
            match self.dispatch_frame(&frame).map_err(|e| self.fatal(e))? {
                Some(_) => report.calls_executed += 1,
                None => {
                    tracing::info!(
                        %rank,
                        calls = report.calls_executed,
                        "Worker loop terminated"
                    );
                    return Ok(report);
                }
            }
        }
    }

    /// Execute one received frame. `None` means the loop-terminate sentinel.
    fn dispatch_frame(&self, frame: &[u8]) -> Result<Option<CallbackId>, DispatchError> {
        let (id, payload) = if self.config.verify_checksums {
            deserialize_frame(frame)?
        } else {
            deserialize_frame_unverified(frame)?
        };

        if id.is_loop_terminate() {
            return Ok(None);
        }

        let handle = self.lookup(id)?;
        tracing::debug!(rank = %self.rank(), %id, bytes = payload.len(), "Dispatching callback");
        handle
            .invoke(&self.codec, payload)
            .map_err(|source| DispatchError::DecodeMismatch {
                id,
                rank: self.rank(),
                signature: handle.signature(),
                source,
            })?;
        Ok(Some(id))
    }

    fn resolve_for_call(&self, id: CallbackId) -> Result<Rc<dyn CallbackHandle<K>>, DispatchError> {
        self.ensure_coordinator()?;
        self.lookup(id).map_err(|e| self.fatal(e))
    }

    fn lookup(&self, id: CallbackId) -> Result<Rc<dyn CallbackHandle<K>>, DispatchError> {
        if id.is_reserved() {
            return Err(DispatchError::ReservedId { id });
        }
        self.registry
            .borrow()
            .get(id)
            .ok_or(DispatchError::UnknownCallback {
                id,
                rank: self.rank(),
            })
    }

    fn send<Args: Arguments>(&self, id: CallbackId, args: &Args) -> Result<(), DispatchError> {
        let payload = self
            .codec
            .encode(args)
            .map_err(|source| DispatchError::EncodeFailed { id, source })?;
        let frame = serialize_frame_with_limit(id, &payload, self.config.max_payload_size)?;

        self.comm
            .broadcast(&frame)
            .map_err(|e| self.fatal(e.into()))?;
        self.calls_issued.set(self.calls_issued.get() + 1);
        tracing::debug!(rank = %self.rank(), %id, bytes = payload.len(), "Call broadcast");
        Ok(())
    }

    fn ensure_coordinator(&self) -> Result<(), DispatchError> {
        if self.is_coordinator() {
            Ok(())
        } else {
            Err(DispatchError::NotCoordinator { rank: self.rank() })
        }
    }

    fn signature_mismatch<Args: Arguments>(
        &self,
        id: CallbackId,
        handle: &dyn CallbackHandle<K>,
    ) -> DispatchError {
        self.fatal(DispatchError::SignatureMismatch {
            id,
            expected: handle.signature(),
            found: std::any::type_name::<Args>(),
        })
    }

    /// Log a fatal condition with its callback id, then hand it back.
    fn fatal(&self, error: DispatchError) -> DispatchError {
        match error.callback_id() {
            Some(id) => tracing::error!(rank = %self.rank(), %id, %error, "Collective dispatch failed"),
            None => tracing::error!(rank = %self.rank(), %error, "Collective dispatch failed"),
        }
        error
    }
}

impl<C: Communicator, K: MessageCodec> Drop for CollectiveDispatcher<C, K> {
    fn drop(&mut self) {
        self.registry.get_mut().clear();
    }
}

impl<C: Communicator, K: MessageCodec> std::fmt::Debug for CollectiveDispatcher<C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectiveDispatcher")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .field("registered", &self.registry.borrow().len())
            .field("calls_issued", &self.calls_issued.get())
            .finish()
    }
}
