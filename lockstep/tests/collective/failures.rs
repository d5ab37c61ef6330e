//! Fatal conditions: desynchronized registries, bad payloads, lost peers.

use std::rc::Rc;

use lockstep::{
    CallbackId, CollectiveDispatcher, Communicator, DispatchError, DispatcherConfig, GroupConfig,
    LocalGroup, Rank, TransportError, WireError,
};

use crate::common::{Event, init_tracing, new_log, snapshot};

#[test]
fn missing_registration_on_workers_is_detected() {
    init_tracing();

    let results = LocalGroup::run(&GroupConfig::new(3), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        dispatcher.register_callback(|| {}).expect("register");

        if dispatcher.is_coordinator() {
            // Registered only here: the group is now desynchronized.
            let extra = dispatcher.register_callback(|| {}).expect("register");
            dispatcher.call(extra, ()).expect("call");
            Ok(Default::default())
        } else {
            dispatcher.run_worker_loop()
        }
    })
    .expect("group");

    for (rank, result) in results.into_iter().enumerate().skip(1) {
        match result {
            Err(DispatchError::UnknownCallback { id, rank: reported }) => {
                assert_eq!(id, CallbackId::new(1));
                assert_eq!(reported, Rank::new(rank as u32));
            }
            other => panic!("rank {rank}: expected UnknownCallback, got {other:?}"),
        }
    }
}

#[test]
fn signature_divergence_is_a_decode_mismatch() {
    init_tracing();

    let results = LocalGroup::run(&GroupConfig::new(3), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let log = new_log();

        if dispatcher.is_coordinator() {
            let sink = Rc::clone(&log);
            let id = dispatcher
                .register_callback(move |i: i32, d: f64| sink.borrow_mut().push(Event::Pair(i, d)))
                .expect("register");
            dispatcher.call(id, (537, 3.4)).expect("call");
            (snapshot(&log), None)
        } else {
            let sink = Rc::clone(&log);
            dispatcher
                .register_callback(move |n: u32| sink.borrow_mut().push(Event::Step(n)))
                .expect("register");
            let err = dispatcher.run_worker_loop().expect_err("must fail");
            (snapshot(&log), Some(err))
        }
    })
    .expect("group");

    assert_eq!(results[0].0, vec![Event::Pair(537, 3.4)]);
    for (events, err) in &results[1..] {
        assert!(events.is_empty(), "mismatched handle must not run");
        match err {
            Some(DispatchError::DecodeMismatch { id, signature, .. }) => {
                assert_eq!(*id, CallbackId::new(0));
                assert!(signature.contains("u32"));
            }
            other => panic!("expected DecodeMismatch, got {other:?}"),
        }
    }
}

#[test]
fn coordinator_rejects_wrong_argument_types_before_sending() {
    let results = LocalGroup::run(&GroupConfig::new(2), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let id = dispatcher
            .register_callback(|_: i32, _: f64| {})
            .expect("register");

        if dispatcher.is_coordinator() {
            let err = dispatcher.call(id, (1_u8,)).expect_err("must fail");
            assert!(matches!(err, DispatchError::SignatureMismatch { .. }));
            let err = dispatcher.call_remote(id, ()).expect_err("must fail");
            assert!(matches!(err, DispatchError::SignatureMismatch { .. }));
            dispatcher.stop_worker_loop().expect("stop");
            None
        } else {
            Some(dispatcher.run_worker_loop().expect("loop").calls_executed)
        }
    })
    .expect("group");

    assert_eq!(results, vec![None, Some(0)]);
}

#[test]
fn role_violations() {
    let results = LocalGroup::run(&GroupConfig::new(2), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let id = dispatcher.register_callback(|| {}).expect("register");

        if dispatcher.is_coordinator() {
            let err = dispatcher.run_worker_loop().expect_err("must fail");
            assert!(matches!(err, DispatchError::NotWorker { .. }));
            dispatcher.stop_worker_loop().expect("stop");
        } else {
            let err = dispatcher.call(id, ()).expect_err("must fail");
            assert!(matches!(err, DispatchError::NotCoordinator { .. }));
            let err = dispatcher.stop_worker_loop().expect_err("must fail");
            assert!(matches!(err, DispatchError::NotCoordinator { .. }));
            dispatcher.run_worker_loop().expect("loop");
        }
    })
    .expect("group");

    assert_eq!(results.len(), 2);
}

#[test]
fn reserved_and_unknown_ids_are_rejected_locally() {
    let results = LocalGroup::run(&GroupConfig::new(1), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let reserved = dispatcher.call(CallbackId::LOOP_TERMINATE, ());
        let unknown = dispatcher.call(CallbackId::new(3), ());
        let unregister = dispatcher.unregister(CallbackId::new(3));
        (
            matches!(reserved, Err(DispatchError::ReservedId { .. })),
            matches!(unknown, Err(DispatchError::UnknownCallback { .. })),
            matches!(unregister, Err(DispatchError::UnknownCallback { .. })),
            dispatcher.calls_issued(),
        )
    })
    .expect("group");

    assert_eq!(results, vec![(true, true, true, 0)]);
}

#[test]
fn oversized_payload_is_not_sent() {
    let results = LocalGroup::run(&GroupConfig::new(2), |comm| {
        let config = DispatcherConfig::default().with_max_payload_size(16);
        let dispatcher = CollectiveDispatcher::with_codec(comm, lockstep::BincodeCodec, config);
        let id = dispatcher
            .register_callback(|_: Vec<u8>| {})
            .expect("register");

        if dispatcher.is_coordinator() {
            let err = dispatcher.call(id, (vec![0_u8; 64],)).expect_err("must fail");
            assert!(matches!(
                err,
                DispatchError::Wire(WireError::PayloadTooLarge { max: 16, .. })
            ));
            dispatcher.call(id, (vec![1_u8; 4],)).expect("small call");
            dispatcher.stop_worker_loop().expect("stop");
            0
        } else {
            dispatcher.run_worker_loop().expect("loop").calls_executed
        }
    })
    .expect("group");

    assert_eq!(results, vec![0, 1]);
}

#[test]
fn corrupted_frame_is_fatal() {
    let results = LocalGroup::run(&GroupConfig::new(2), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        dispatcher.register_callback(|_: u64| {}).expect("register");

        if dispatcher.is_coordinator() {
            let mut frame = lockstep_transport::serialize_frame(
                CallbackId::new(0),
                &7_u64.to_le_bytes(),
            )
            .expect("serialize");
            let last = frame.len() - 1;
            frame[last] ^= 0x80;
            dispatcher
                .communicator()
                .broadcast(&frame)
                .expect("broadcast");
            None
        } else {
            Some(dispatcher.run_worker_loop())
        }
    })
    .expect("group");

    assert!(matches!(
        results[1],
        Some(Err(DispatchError::Wire(WireError::ChecksumMismatch { .. })))
    ));
}

#[test]
fn vanished_coordinator_surfaces_as_transport_failure() {
    let results = LocalGroup::run(&GroupConfig::new(3), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        if dispatcher.is_coordinator() {
            // Leaves without sending the loop-terminate sentinel.
            None
        } else {
            Some(dispatcher.run_worker_loop())
        }
    })
    .expect("group");

    for result in &results[1..] {
        assert!(matches!(
            result,
            Some(Err(DispatchError::Transport(TransportError::Disconnected { .. })))
        ));
    }
}

#[test]
fn lost_worker_fails_the_broadcast() {
    let results = LocalGroup::run(&GroupConfig::new(2), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let id = dispatcher.register_callback(|| {}).expect("register");

        if dispatcher.is_coordinator() {
            // Wait until the worker has gone.
            while dispatcher.call(id, ()).is_ok() {
                std::thread::yield_now();
            }
            true
        } else {
            drop(dispatcher);
            false
        }
    })
    .expect("group");

    assert_eq!(results, vec![true, false]);
}
