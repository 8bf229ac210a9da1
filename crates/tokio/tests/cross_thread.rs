//! Cross-thread producer scenarios against the tokio host.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use canopy_machine::{Envelope, Lane, Machine, Policy};
use canopy_tokio::TokioHost;
use tokio::sync::Notify;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum St {
    Counting,
    Done,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum Kind {
    Tick,
    Finish,
}

#[derive(Debug)]
enum Ev {
    Tick(u32),
    Finish,
}

struct Meter;

impl Policy for Meter {
    type StateId = St;
    type Kind = Kind;
    type Event = Ev;

    fn kind_of(event: &Ev) -> Kind {
        match event {
            Ev::Tick(_) => Kind::Tick,
            Ev::Finish => Kind::Finish,
        }
    }

    fn state_name(id: St) -> &'static str {
        match id {
            St::Counting => "Counting",
            St::Done => "Done",
        }
    }

    fn kind_name(kind: Kind) -> &'static str {
        match kind {
            Kind::Tick => "TICK",
            Kind::Finish => "FINISH",
        }
    }
}

/// A producer thread posts 100 payload events interleaved with sleeps; the
/// dispatcher task observes every one of them, in posting order, and ends
/// in the expected terminal state.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cross_thread_producer_dispatches_in_posting_order() {
    let host = TokioHost::new();
    let mut machine = Machine::<Meter>::new("Root", host.notifier());
    machine.create_states(&[St::Counting, St::Done]);
    machine.add_internal_transition(St::Counting, Kind::Tick);
    machine.add_transition(St::Counting, Kind::Finish, St::Done);

    let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let probe = seen.clone();
    machine.on_transition(St::Counting, Kind::Tick, move |event| {
        if let Ev::Tick(seq) = event {
            probe.lock().unwrap().push(*seq);
        }
        Ok(())
    });

    let done = Arc::new(Notify::new());
    let finished = done.clone();
    machine.on_state_entered(St::Done, move || {
        finished.notify_one();
        Ok(())
    });

    let handle = machine.handle();
    machine.start();
    let running = host.spawn(machine);

    let producer = handle.clone();
    let worker = std::thread::spawn(move || {
        for seq in 0..100u32 {
            producer.send(Ev::Tick(seq));
            std::thread::sleep(Duration::from_millis(1));
        }
        producer.send(Ev::Finish);
    });

    tokio::time::timeout(Duration::from_secs(10), done.notified())
        .await
        .expect("machine should reach Done");
    worker.join().unwrap();

    let machine = running.shutdown().await.unwrap();
    assert!(machine.is_state_active(St::Done));
    assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<u32>>());
    assert_eq!(machine.stats().events_dispatched, 101);
    assert_eq!(machine.stats().events_unmatched, 0);
}

/// Events posted after `stop` stay queued (no wake is delivered for them)
/// and their deletion hooks fire in the single teardown, once the machine
/// and every handle are gone.
#[tokio::test]
async fn stop_leaves_queued_events_until_teardown() {
    let host = TokioHost::new();
    let mut machine = Machine::<Meter>::new("Root", host.notifier());
    machine.create_states(&[St::Counting, St::Done]);

    let handle = machine.handle();
    machine.start();
    handle.stop();

    let deleted = Arc::new(AtomicUsize::new(0));
    let probe = deleted.clone();
    let mut tracked = Envelope::new(Ev::Tick(7));
    tracked.on_delete(move || {
        probe.fetch_add(1, Ordering::SeqCst);
    });
    handle.post(tracked, Lane::Normal);

    let running = host.spawn(machine);
    let machine = running.shutdown().await.unwrap();

    // Still queued, hook not yet fired.
    assert_eq!(machine.queued_events(), 1);
    assert_eq!(deleted.load(Ordering::SeqCst), 0);

    drop(machine);
    assert_eq!(deleted.load(Ordering::SeqCst), 0, "handle still owns the queue");
    drop(handle);
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
}
