//! End-to-end dispatch scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use lockstep::{
    CallbackId, CollectiveDispatcher, DispatcherConfig, GroupConfig, JsonCodec, LocalGroup, Rank,
};

use crate::common::{Event, init_tracing, new_log, serve, snapshot};

#[test]
fn register_call_reuse_and_stop() {
    init_tracing();

    let results = LocalGroup::run(&GroupConfig::new(4), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let log = new_log();

        let sink = Rc::clone(&log);
        let a = dispatcher
            .register_callback(move || sink.borrow_mut().push(Event::NoArgs))
            .expect("register A");
        let sink = Rc::clone(&log);
        let b = dispatcher
            .register_callback(move |i: i32, d: f64| sink.borrow_mut().push(Event::Pair(i, d)))
            .expect("register B");
        assert_eq!((a, b), (CallbackId::new(0), CallbackId::new(1)));

        let first = serve(&dispatcher, || {
            dispatcher.call(b, (537, 3.4))?;
            dispatcher.call(a, ())
        })
        .expect("first phase");

        // Every rank is out of its loop: reconfigure symmetrically.
        dispatcher.unregister(b).expect("unregister B");
        let sink = Rc::clone(&log);
        let c = dispatcher
            .register_callback(move |name: String| sink.borrow_mut().push(Event::Named(name)))
            .expect("register C");
        assert_eq!(c, b);

        let second = serve(&dispatcher, || {
            dispatcher.call(c, ("lennard-jones".to_string(),))
        })
        .expect("second phase");

        (
            snapshot(&log),
            first.map(|r| r.calls_executed),
            second.map(|r| r.calls_executed),
            dispatcher.communicator().pending(),
        )
    })
    .expect("group");

    let expected = vec![
        Event::Pair(537, 3.4),
        Event::NoArgs,
        Event::Named("lennard-jones".to_string()),
    ];
    for (rank, (events, first, second, pending)) in results.into_iter().enumerate() {
        assert_eq!(events, expected, "rank {rank}");
        assert_eq!(pending, 0, "rank {rank}");
        if rank == 0 {
            assert_eq!((first, second), (None, None));
        } else {
            assert_eq!((first, second), (Some(2), Some(1)), "rank {rank}");
        }
    }
}

#[test]
fn coordinator_and_workers_observe_identical_arguments() {
    init_tracing();

    let results = LocalGroup::run(&GroupConfig::new(3), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let log = new_log();

        let sink = Rc::clone(&log);
        let id = dispatcher
            .register_callback(move |i: i32, d: f64| sink.borrow_mut().push(Event::Pair(i, d)))
            .expect("register");

        serve(&dispatcher, || {
            dispatcher.call(id, (-1, f64::MIN_POSITIVE))?;
            dispatcher.call(id, (i32::MAX, 1e300))
        })
        .expect("serve");

        snapshot(&log)
    })
    .expect("group");

    assert_eq!(
        results[0],
        vec![
            Event::Pair(-1, f64::MIN_POSITIVE),
            Event::Pair(i32::MAX, 1e300)
        ]
    );
    assert!(results.iter().all(|events| events == &results[0]));
}

#[test]
fn calls_execute_in_issue_order() {
    init_tracing();

    let results = LocalGroup::run(&GroupConfig::new(5), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let log = new_log();

        let sink = Rc::clone(&log);
        let step = dispatcher
            .register_callback(move |n: u32| sink.borrow_mut().push(Event::Step(n)))
            .expect("register");

        serve(&dispatcher, || (0..200_u32).try_for_each(|n| dispatcher.call(step, (n,))))
            .expect("serve");
        assert_eq!(dispatcher.calls_issued(), if dispatcher.is_coordinator() { 200 } else { 0 });

        snapshot(&log)
    })
    .expect("group");

    let expected: Vec<Event> = (0..200).map(Event::Step).collect();
    for events in results {
        assert_eq!(events, expected);
    }
}

#[test]
fn call_remote_skips_the_coordinator() {
    let results = LocalGroup::run(&GroupConfig::new(3), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let log = new_log();

        let sink = Rc::clone(&log);
        let id = dispatcher
            .register_callback(move |n: u32| sink.borrow_mut().push(Event::Step(n)))
            .expect("register");

        serve(&dispatcher, || dispatcher.call_remote(id, (9_u32,))).expect("serve");
        snapshot(&log)
    })
    .expect("group");

    assert!(results[0].is_empty());
    assert_eq!(results[1], vec![Event::Step(9)]);
    assert_eq!(results[2], vec![Event::Step(9)]);
}

#[test]
fn json_codec_and_rendezvous_channels() {
    init_tracing();

    let results = LocalGroup::run(&GroupConfig::synchronous(3), |comm| {
        let dispatcher = CollectiveDispatcher::with_codec(
            comm,
            JsonCodec,
            DispatcherConfig::default().with_checksums(false),
        );
        let log = new_log();

        let sink = Rc::clone(&log);
        let id = dispatcher
            .register_callback(move |name: String, i: i32, d: f64| {
                let mut log = sink.borrow_mut();
                log.push(Event::Named(name));
                log.push(Event::Pair(i, d));
            })
            .expect("register");

        serve(&dispatcher, || {
            dispatcher.call(id, ("dpd".to_string(), 2, 0.5))?;
            dispatcher.call(id, ("langevin".to_string(), 3, 1.5))
        })
        .expect("serve");

        snapshot(&log)
    })
    .expect("group");

    let expected = vec![
        Event::Named("dpd".to_string()),
        Event::Pair(2, 0.5),
        Event::Named("langevin".to_string()),
        Event::Pair(3, 1.5),
    ];
    for events in results {
        assert_eq!(events, expected);
    }
}

#[test]
fn json_codec_floats_match_on_every_rank() {
    init_tracing();

    let values = [1.0715660391465826e-75_f64, 0.1 + 0.2, 5e-324, 3.4];
    let results = LocalGroup::run(&GroupConfig::new(3), |comm| {
        let dispatcher =
            CollectiveDispatcher::with_codec(comm, JsonCodec, DispatcherConfig::default());
        let bits = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&bits);
        let id = dispatcher
            .register_callback(move |i: i32, d: f64| sink.borrow_mut().push((i, d.to_bits())))
            .expect("register");

        serve(&dispatcher, || {
            for value in values {
                dispatcher.call(id, (537, value))?;
            }
            Ok(())
        })
        .expect("serve");

        let seen = bits.borrow().clone();
        seen
    })
    .expect("group");

    let expected: Vec<(i32, u64)> = values.iter().map(|v| (537, v.to_bits())).collect();
    for seen in results {
        assert_eq!(seen, expected);
    }
}

#[test]
fn non_zero_coordinator_drives_the_group() {
    let config = GroupConfig::new(3).with_coordinator(Rank::new(1));
    let results = LocalGroup::run(&config, |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let log = new_log();

        let sink = Rc::clone(&log);
        let id = dispatcher
            .register_callback(move || sink.borrow_mut().push(Event::NoArgs))
            .expect("register");

        let report = serve(&dispatcher, || dispatcher.call(id, ())).expect("serve");
        (snapshot(&log), report)
    })
    .expect("group");

    for (events, _) in &results {
        assert_eq!(events, &vec![Event::NoArgs]);
    }
    assert!(results[0].1.is_some());
    assert!(results[1].1.is_none());
    assert!(results[2].1.is_some());
}

#[test]
fn single_rank_group_runs_locally() {
    let results = LocalGroup::run(&GroupConfig::new(1), |comm| {
        let dispatcher = CollectiveDispatcher::new(comm);
        let log = new_log();

        let sink = Rc::clone(&log);
        let id = dispatcher
            .register_callback(move |i: i32, d: f64| sink.borrow_mut().push(Event::Pair(i, d)))
            .expect("register");

        dispatcher.call(id, (1, 2.0)).expect("call");
        dispatcher.stop_worker_loop().expect("stop");
        snapshot(&log)
    })
    .expect("group");

    assert_eq!(results, vec![vec![Event::Pair(1, 2.0)]]);
}
