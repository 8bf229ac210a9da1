//! Two-lane event queue.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::{Envelope, Notifier, Policy};

/// Priority lane selection for [`EventQueue::push`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Lane {
    /// Ordinary events, dispatched in posting order.
    Normal,
    /// Urgent events, dispatched before any normal-lane event observed on
    /// the same pop.
    High,
}

/// The producer-to-dispatcher handoff: two FIFO lanes behind one mutex.
///
/// `push` and `pop` are callable from any thread. The mutex is held only
/// around the deque operation itself; the wake signal is sent after it is
/// released, exactly once per push. `pop` prefers the high lane, strict
/// FIFO within each lane. An in-progress dispatch of a normal event is
/// never unwound when a high event arrives; the high event is simply
/// observed on the next pop.
pub struct EventQueue<P: Policy> {
    lanes: Mutex<Lanes<P>>,
    notifier: Arc<dyn Notifier>,
}

struct Lanes<P: Policy> {
    normal: VecDeque<Envelope<P>>,
    high: VecDeque<Envelope<P>>,
}

impl<P: Policy> EventQueue<P> {
    /// Create an empty queue wired to the host's wake primitive.
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                normal: VecDeque::new(),
                high: VecDeque::new(),
            }),
            notifier,
        }
    }

    /// Append an event to the chosen lane and signal the dispatcher wake.
    pub fn push(&self, envelope: Envelope<P>, lane: Lane) {
        trace!(event = P::kind_name(envelope.kind()), ?lane, "event queued");
        {
            let mut lanes = self.lanes.lock();
            match lane {
                Lane::Normal => lanes.normal.push_back(envelope),
                Lane::High => lanes.high.push_back(envelope),
            }
        }
        self.notifier.signal();
    }

    /// Remove and return the head event: high lane first, then normal.
    pub fn pop(&self) -> Option<Envelope<P>> {
        let mut lanes = self.lanes.lock();
        if let Some(envelope) = lanes.high.pop_front() {
            return Some(envelope);
        }
        lanes.normal.pop_front()
    }

    /// Number of queued events across both lanes.
    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock();
        lanes.normal.len() + lanes.high.len()
    }

    /// Whether both lanes are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<P: Policy> fmt::Debug for EventQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lanes = self.lanes.lock();
        f.debug_struct("EventQueue")
            .field("normal", &lanes.normal.len())
            .field("high", &lanes.high.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Signal, SignalPolicy};
    use crate::FlagNotifier;

    fn queue_with_flag() -> (EventQueue<SignalPolicy>, Arc<FlagNotifier>) {
        let flag = Arc::new(FlagNotifier::new());
        flag.enable();
        (EventQueue::new(flag.clone()), flag)
    }

    #[test]
    fn fifo_within_a_lane() {
        let (q, _) = queue_with_flag();
        q.push(Envelope::new(Signal::Go), Lane::Normal);
        q.push(Envelope::new(Signal::Halt), Lane::Normal);

        assert_eq!(q.pop().unwrap().kind(), Signal::Go);
        assert_eq!(q.pop().unwrap().kind(), Signal::Halt);
        assert!(q.pop().is_none());
    }

    #[test]
    fn high_lane_preferred_on_pop() {
        let (q, _) = queue_with_flag();
        q.push(Envelope::new(Signal::Go), Lane::Normal);
        q.push(Envelope::new(Signal::Halt), Lane::High);

        assert_eq!(q.pop().unwrap().kind(), Signal::Halt);
        assert_eq!(q.pop().unwrap().kind(), Signal::Go);
    }

    #[test]
    fn push_signals_the_notifier() {
        let (q, flag) = queue_with_flag();
        assert!(!flag.take());

        q.push(Envelope::new(Signal::Go), Lane::Normal);
        assert!(flag.take());
        assert!(!flag.take());
    }

    #[test]
    fn concurrent_producers_lose_no_events() {
        let (q, _) = queue_with_flag();
        let q = Arc::new(q);

        let mut producers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            producers.push(std::thread::spawn(move || {
                for _ in 0..250 {
                    q.push(Envelope::new(Signal::Go), Lane::Normal);
                }
            }));
        }
        for p in producers {
            p.join().unwrap();
        }

        assert_eq!(q.len(), 1000);
    }
}
