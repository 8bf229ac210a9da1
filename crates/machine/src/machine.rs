//! The machine: state registry, transition table, dispatch loop.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use canopy_core::{Envelope, EventQueue, HookResult, Lane, Notifier, Policy};
use tracing::{debug, trace, warn};

use crate::node::Node;
use crate::transition::Transition;
use crate::{NodeIdx, ROOT};

/// Run phase, shared between the machine and its handles.
const PHASE_SETUP: u8 = 0;
const PHASE_RUNNING: u8 = 1;
const PHASE_STOPPED: u8 = 2;

struct Shared {
    phase: AtomicU8,
}

impl Shared {
    fn phase(&self) -> u8 {
        self.phase.load(Ordering::Acquire)
    }
}

/// Counters for the dispatch loop.
///
/// Cheap observability without a metrics stack: how many events were
/// dispatched, how many transitions fired, how many events found no
/// matching transition and were dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchStats {
    /// Events popped and dispatched.
    pub events_dispatched: u64,
    /// Transitions taken (internal transitions included).
    pub transitions_fired: u64,
    /// Events dispatched with no matching transition in the active tree.
    pub events_unmatched: u64,
}

/// Cloneable producer and control surface of a machine.
///
/// Handles are callable from any thread and from inside dispatch
/// callbacks. Posting is a mutex-guarded queue append plus one wake
/// signal; no machine state is touched.
pub struct Handle<P: Policy> {
    queue: Arc<EventQueue<P>>,
    notifier: Arc<dyn Notifier>,
    shared: Arc<Shared>,
}

impl<P: Policy> Clone for Handle<P> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            notifier: self.notifier.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<P: Policy> Handle<P> {
    /// Post an event on the normal lane.
    pub fn send(&self, event: P::Event) {
        self.queue.push(Envelope::new(event), Lane::Normal);
    }

    /// Post an event on the high-priority lane.
    pub fn send_high(&self, event: P::Event) {
        self.queue.push(Envelope::new(event), Lane::High);
    }

    /// Post a pre-built envelope (e.g. one carrying a deletion hook).
    pub fn post(&self, envelope: Envelope<P>, lane: Lane) {
        self.queue.push(envelope, lane);
    }

    /// Halt dispatch: no further wakes are delivered. The drain pass in
    /// progress (if any) completes; queued events stay queued until
    /// teardown.
    pub fn stop(&self) {
        self.shared.phase.store(PHASE_STOPPED, Ordering::Release);
        self.notifier.disable();
    }

    /// Whether the machine is between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.shared.phase() == PHASE_RUNNING
    }
}

impl<P: Policy> fmt::Debug for Handle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("queued", &self.queue.len())
            .field("running", &self.is_running())
            .finish()
    }
}

/// A hierarchical state machine.
///
/// Owns the state tree (a flat arena indexed by [`NodeIdx`]), the
/// transition table, and the event queue. All dispatch happens in
/// [`drain`](Machine::drain), on whichever single thread the host calls
/// it from; producers post through [`Handle`]s.
pub struct Machine<P: Policy> {
    nodes: Vec<Node<P>>,
    registry: HashMap<P::StateId, NodeIdx>,
    transitions: Vec<Transition<P>>,
    table: HashMap<(NodeIdx, P::Kind), usize>,
    queue: Arc<EventQueue<P>>,
    notifier: Arc<dyn Notifier>,
    shared: Arc<Shared>,
    /// Root entry scheduled by `start`, performed by the first drain.
    init_pending: bool,
    stats: DispatchStats,
}

impl<P: Policy> Machine<P> {
    /// Create a machine bound to the host's wake primitive. `name` is the
    /// root state's display name.
    pub fn new(name: impl Into<String>, notifier: Arc<dyn Notifier>) -> Self {
        let shared = Arc::new(Shared {
            phase: AtomicU8::new(PHASE_SETUP),
        });
        Self {
            nodes: vec![Node::new(None, name.into(), None)],
            registry: HashMap::new(),
            transitions: Vec::new(),
            table: HashMap::new(),
            queue: Arc::new(EventQueue::new(notifier.clone())),
            notifier,
            shared,
            init_pending: false,
            stats: DispatchStats::default(),
        }
    }

    // ─── Setup API ──────────────────────────────────────────────────────

    /// Register new states as children of the root. The first id listed
    /// becomes the root's initial child (if none was registered before).
    pub fn create_states(&mut self, ids: &[P::StateId]) {
        for &id in ids {
            self.create_state(ROOT, id);
        }
    }

    /// Register new states as children of `parent`. The first id ever
    /// listed under `parent` becomes its initial child.
    pub fn create_substates(&mut self, parent: P::StateId, ids: &[P::StateId]) {
        let parent = self.node_idx(parent);
        for &id in ids {
            self.create_state(parent, id);
        }
    }

    /// Set the parallel flag on a composite: entering it enters all of its
    /// children concurrently instead of only the initial child.
    pub fn set_parallel(&mut self, id: P::StateId, parallel: bool) {
        self.assert_setup("set_parallel");
        let idx = self.node_idx(id);
        self.nodes[idx].is_parallel = parallel;
    }

    /// Register a transition `source --kind--> target`.
    pub fn add_transition(&mut self, source: P::StateId, kind: P::Kind, target: P::StateId) {
        let target = self.node_idx(target);
        self.insert_transition(source, kind, Some(target));
    }

    /// Register an internal transition: callbacks fire on `kind` while
    /// `source` is active, but no state is exited or entered.
    pub fn add_internal_transition(&mut self, source: P::StateId, kind: P::Kind) {
        self.insert_transition(source, kind, None);
    }

    fn insert_transition(&mut self, source: P::StateId, kind: P::Kind, target: Option<NodeIdx>) {
        self.assert_setup("add_transition");
        let source = self.node_idx(source);
        if self.table.contains_key(&(source, kind)) {
            panic!(
                "duplicate transition: ({}, {}) is already registered",
                self.nodes[source].name,
                P::kind_name(kind),
            );
        }
        let idx = self.transitions.len();
        self.transitions.push(Transition::new(source, target, kind));
        self.table.insert((source, kind), idx);
    }

    /// Register a callback on the `(source, kind)` transition, fired in
    /// registration order each time the transition is taken.
    pub fn on_transition(
        &mut self,
        source: P::StateId,
        kind: P::Kind,
        callback: impl FnMut(&P::Event) -> HookResult + Send + 'static,
    ) {
        self.assert_setup("on_transition");
        let idx = self.transition_idx(source, kind);
        self.transitions[idx].callbacks.push(Box::new(callback));
    }

    /// Register a failure callback on the `(source, kind)` transition.
    ///
    /// Reserved surface: the dispatch loop never fires these; their
    /// semantics are intentionally left undefined.
    pub fn on_transition_failed(
        &mut self,
        source: P::StateId,
        kind: P::Kind,
        callback: impl FnMut(&P::Event) -> HookResult + Send + 'static,
    ) {
        self.assert_setup("on_transition_failed");
        let idx = self.transition_idx(source, kind);
        self.transitions[idx]
            .failed_callbacks
            .push(Box::new(callback));
    }

    /// Register an entry callback on a state, fired in registration order
    /// after the state becomes active.
    pub fn on_state_entered(
        &mut self,
        id: P::StateId,
        callback: impl FnMut() -> HookResult + Send + 'static,
    ) {
        self.assert_setup("on_state_entered");
        let idx = self.node_idx(id);
        self.nodes[idx].entered.push(Box::new(callback));
    }

    /// Register an exit callback on a state, fired in registration order
    /// after the state becomes inactive.
    pub fn on_state_exited(
        &mut self,
        id: P::StateId,
        callback: impl FnMut() -> HookResult + Send + 'static,
    ) {
        self.assert_setup("on_state_exited");
        let idx = self.node_idx(id);
        self.nodes[idx].exited.push(Box::new(callback));
    }

    // ─── Runtime API ────────────────────────────────────────────────────

    /// Validate the wiring, freeze the topology and schedule the initial
    /// entry of the root. The entry itself runs on the dispatcher thread,
    /// in the first [`drain`](Machine::drain) after this call.
    ///
    /// # Panics
    ///
    /// Panics when called twice, or when wiring validation fails; both are
    /// programming errors in the client's setup.
    pub fn start(&mut self) {
        if self.shared.phase() != PHASE_SETUP {
            panic!("start() called twice on machine '{}'", self.nodes[ROOT].name);
        }
        if let Err(error) = self.validate() {
            panic!("invalid wiring on machine '{}': {error}", self.nodes[ROOT].name);
        }
        self.shared.phase.store(PHASE_RUNNING, Ordering::Release);
        self.init_pending = true;
        self.notifier.enable();
        self.notifier.signal();
    }

    /// Halt dispatch. Equivalent to [`Handle::stop`].
    pub fn stop(&self) {
        self.shared.phase.store(PHASE_STOPPED, Ordering::Release);
        self.notifier.disable();
    }

    /// A cloneable producer/control handle for this machine.
    pub fn handle(&self) -> Handle<P> {
        Handle {
            queue: self.queue.clone(),
            notifier: self.notifier.clone(),
            shared: self.shared.clone(),
        }
    }

    /// Drain the event queue: the host's wake callback.
    ///
    /// Performs the initial root entry if scheduled, then pops and
    /// dispatches events until the queue is empty, and returns the number
    /// of events dispatched. Events posted re-entrantly from callbacks are
    /// picked up by the same pass. A `stop` issued mid-pass does not
    /// interrupt the pass.
    ///
    /// Must only ever be called from one thread at a time; that thread is
    /// the dispatcher thread.
    pub fn drain(&mut self) -> usize {
        if self.shared.phase() != PHASE_RUNNING {
            return 0;
        }
        if mem::take(&mut self.init_pending) {
            debug!(machine = %self.nodes[ROOT].name, "initialize");
            self.enter(ROOT);
        }

        let mut dispatched = 0;
        while let Some(envelope) = self.queue.pop() {
            dispatched += 1;
            self.dispatch(&envelope);
            // `envelope` drops here: deletion hook fires.
        }
        dispatched
    }

    fn dispatch(&mut self, envelope: &Envelope<P>) {
        let kind = envelope.kind();
        trace!(event = P::kind_name(kind), "dispatching");

        let matched = self.collect_transitions(kind);
        if matched.is_empty() {
            trace!(event = P::kind_name(kind), "no matching transition");
            self.stats.events_unmatched += 1;
        }

        for t in matched {
            match self.transitions[t].target {
                None => {
                    self.invoke_transition(t, envelope.event());
                    self.stats.transitions_fired += 1;
                }
                Some(target) => {
                    // Re-check: an earlier transition for this event may
                    // have deactivated this source (preemption).
                    let source = self.transitions[t].source;
                    if self.nodes[source].is_active {
                        self.do_transition(envelope.event(), source, target, t);
                        self.stats.transitions_fired += 1;
                    }
                }
            }
        }
        self.stats.events_dispatched += 1;

        #[cfg(debug_assertions)]
        self.verify_active_tree();
    }

    // ─── Observability ──────────────────────────────────────────────────

    /// Whether the machine is between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.shared.phase() == PHASE_RUNNING
    }

    /// Whether `id` is in the active configuration.
    pub fn is_state_active(&self, id: P::StateId) -> bool {
        self.nodes[self.node_idx(id)].is_active
    }

    /// The active configuration in leaf-first walk order (root excluded).
    pub fn active_states(&self) -> Vec<P::StateId> {
        let mut out = Vec::new();
        self.walk_active(ROOT, &mut |machine, idx| {
            if let Some(id) = machine.nodes[idx].id {
                out.push(id);
            }
        });
        out
    }

    /// Dispatch counters since construction.
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Number of events currently queued.
    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    /// The root display name.
    pub fn name(&self) -> &str {
        &self.nodes[ROOT].name
    }

    // ─── Tree operations ────────────────────────────────────────────────

    /// Enter a node: ensure its ancestors are active, mark it active, fire
    /// its entry callbacks, then descend: into every child for a parallel
    /// composite, into the initial child otherwise.
    fn enter(&mut self, idx: NodeIdx) {
        debug_assert!(!self.nodes[idx].is_active, "enter() on an active state");

        if let Some(parent) = self.nodes[idx].parent {
            self.enter_child(parent, idx);
        }

        debug!(state = %self.nodes[idx].name, "enter state");
        self.nodes[idx].is_active = true;
        self.run_state_hooks(idx, HookKind::Entered);

        if self.nodes[idx].is_parallel {
            let children = self.nodes[idx].children.clone();
            for child in children {
                self.enter(child);
            }
            self.nodes[idx].active_child = None;
        } else if let Some(&first) = self.nodes[idx].children.first() {
            self.nodes[idx].active_child = Some(first);
            self.enter(first);
        }
    }

    /// Record `child` as the active child of `idx` and, if `idx` itself is
    /// not active yet, activate it (and its ancestors) without descending.
    /// Wiring validation guarantees no parallel composite is activated
    /// through this bottom-up path.
    fn enter_child(&mut self, idx: NodeIdx, child: NodeIdx) {
        self.nodes[idx].active_child = Some(child);
        if self.nodes[idx].is_active {
            return;
        }

        if let Some(parent) = self.nodes[idx].parent {
            self.enter_child(parent, idx);
        }

        debug!(state = %self.nodes[idx].name, "enter state");
        self.nodes[idx].is_active = true;
        self.run_state_hooks(idx, HookKind::Entered);
    }

    /// Exit a node: exit its active descendants leaf-first, mark it
    /// inactive, fire its exit callbacks.
    fn exit(&mut self, idx: NodeIdx) {
        debug_assert!(self.nodes[idx].is_active, "exit() on an inactive state");

        if let Some(child) = self.nodes[idx].active_child.take() {
            self.exit(child);
        }
        if self.nodes[idx].is_parallel {
            let children = self.nodes[idx].children.clone();
            for child in children {
                debug_assert!(self.nodes[child].is_active);
                self.exit(child);
            }
        }

        debug!(state = %self.nodes[idx].name, "exit state");
        self.nodes[idx].is_active = false;
        self.run_state_hooks(idx, HookKind::Exited);
    }

    /// Visit the active subtree under `idx` leaf-first: deepest active
    /// descendants first, ancestors after. Parallel children are visited
    /// in insertion order.
    fn walk_active(&self, idx: NodeIdx, visit: &mut dyn FnMut(&Self, NodeIdx)) {
        let node = &self.nodes[idx];
        if !node.is_active {
            return;
        }
        if node.is_parallel {
            for &child in &node.children {
                self.walk_active(child, visit);
            }
        } else if let Some(child) = node.active_child {
            self.walk_active(child, visit);
        }
        visit(self, idx);
    }

    /// Transitions for `kind` registered on currently active states, in
    /// leaf-first order: the most specific source wins the first slot.
    fn collect_transitions(&self, kind: P::Kind) -> Vec<usize> {
        let mut matched = Vec::new();
        self.walk_active(ROOT, &mut |machine, idx| {
            if let Some(&t) = machine.table.get(&(idx, kind)) {
                matched.push(t);
            }
        });
        matched
    }

    /// Apply one transition along the least-common-ancestor path: exit the
    /// source-side chain below the LCA (leaf-first), fire the transition
    /// callbacks, enter the target (root-first below the LCA). The LCA
    /// itself neither exits nor re-enters. A self-transition exits and
    /// re-enters its state.
    fn do_transition(&mut self, event: &P::Event, source: NodeIdx, target: NodeIdx, t: usize) {
        if source == target {
            self.exit(source);
            self.invoke_transition(t, event);
            self.enter(target);
            return;
        }

        let mut below_lca: Option<NodeIdx> = None;
        let mut s = Some(source);
        while let Some(si) = s {
            let mut ti = Some(target);
            while let Some(candidate) = ti {
                if candidate == si {
                    // `si` is the LCA; exit the source chain below it.
                    if let Some(exit_from) = below_lca {
                        self.exit(exit_from);
                    }
                    self.invoke_transition(t, event);
                    self.enter(target);
                    return;
                }
                ti = self.nodes[candidate].parent;
            }
            below_lca = Some(si);
            s = self.nodes[si].parent;
        }

        // Unreachable for states of one machine: everything shares the root.
        warn!(
            source = %self.nodes[source].name,
            target = %self.nodes[target].name,
            "transition endpoints share no ancestor; ignoring"
        );
    }

    fn invoke_transition(&mut self, t: usize, event: &P::Event) {
        let mut callbacks = mem::take(&mut self.transitions[t].callbacks);
        for callback in callbacks.iter_mut() {
            if let Err(error) = callback(event) {
                warn!(
                    event = P::kind_name(self.transitions[t].kind),
                    %error,
                    "transition callback failed"
                );
            }
        }
        self.transitions[t].callbacks = callbacks;
    }

    fn run_state_hooks(&mut self, idx: NodeIdx, which: HookKind) {
        let mut hooks = match which {
            HookKind::Entered => mem::take(&mut self.nodes[idx].entered),
            HookKind::Exited => mem::take(&mut self.nodes[idx].exited),
        };
        for hook in hooks.iter_mut() {
            if let Err(error) = hook() {
                warn!(
                    state = %self.nodes[idx].name,
                    hook = which.name(),
                    %error,
                    "state callback failed"
                );
            }
        }
        match which {
            HookKind::Entered => self.nodes[idx].entered = hooks,
            HookKind::Exited => self.nodes[idx].exited = hooks,
        }
    }

    // ─── Internal helpers ───────────────────────────────────────────────

    fn create_state(&mut self, parent: NodeIdx, id: P::StateId) {
        self.assert_setup("create_states");
        if self.registry.contains_key(&id) {
            panic!("state {:?} registered twice", id);
        }
        let idx = self.nodes.len();
        self.nodes.push(Node::new(
            Some(id),
            P::state_name(id).to_string(),
            Some(parent),
        ));
        self.nodes[parent].children.push(idx);
        self.registry.insert(id, idx);
    }

    fn assert_setup(&self, operation: &str) {
        if self.shared.phase() != PHASE_SETUP {
            panic!(
                "{operation}: the topology of machine '{}' is frozen after start()",
                self.nodes[ROOT].name
            );
        }
    }

    fn node_idx(&self, id: P::StateId) -> NodeIdx {
        match self.registry.get(&id) {
            Some(&idx) => idx,
            None => panic!("unknown state {:?}", id),
        }
    }

    fn transition_idx(&self, source: P::StateId, kind: P::Kind) -> usize {
        let source = self.node_idx(source);
        match self.table.get(&(source, kind)) {
            Some(&idx) => idx,
            None => panic!(
                "no transition registered for ({}, {})",
                self.nodes[source].name,
                P::kind_name(kind),
            ),
        }
    }

    pub(crate) fn nodes(&self) -> &[Node<P>] {
        &self.nodes
    }

    pub(crate) fn transition_entries(&self) -> &[Transition<P>] {
        &self.transitions
    }

    /// Active-tree structural invariants, checked after every dispatched
    /// event in debug builds: active non-root nodes have active parents;
    /// active non-parallel composites have exactly one active child, equal
    /// to `active_child`; active parallel composites have all children
    /// active.
    #[cfg(debug_assertions)]
    fn verify_active_tree(&self) {
        for node in &self.nodes {
            if !node.is_active {
                continue;
            }
            if let Some(parent) = node.parent {
                debug_assert!(
                    self.nodes[parent].is_active,
                    "active state '{}' under inactive parent",
                    node.name
                );
            }
            let active_children: Vec<NodeIdx> = node
                .children
                .iter()
                .copied()
                .filter(|&c| self.nodes[c].is_active)
                .collect();
            if node.is_parallel {
                debug_assert_eq!(
                    active_children.len(),
                    node.children.len(),
                    "active parallel composite '{}' with inactive children",
                    node.name
                );
            } else if !node.children.is_empty() {
                debug_assert_eq!(
                    active_children.len(),
                    1,
                    "active composite '{}' without exactly one active child",
                    node.name
                );
                debug_assert_eq!(node.active_child, Some(active_children[0]));
            }
        }
    }
}

impl<P: Policy> fmt::Debug for Machine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.nodes[ROOT].name)
            .field("states", &(self.nodes.len() - 1))
            .field("transitions", &self.transitions.len())
            .field("running", &self.is_running())
            .field("queued", &self.queue.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum HookKind {
    Entered,
    Exited,
}

impl HookKind {
    fn name(self) -> &'static str {
        match self {
            HookKind::Entered => "entered",
            HookKind::Exited => "exited",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::WiringError;
    use canopy_core::FlagNotifier;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum St {
        A,
        B,
        P,
        X,
        Y,
    }

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum Ev {
        Go,
        Hop,
    }

    struct TestPolicy;

    impl Policy for TestPolicy {
        type StateId = St;
        type Kind = Ev;
        type Event = Ev;

        fn kind_of(event: &Ev) -> Ev {
            *event
        }

        fn state_name(id: St) -> &'static str {
            match id {
                St::A => "A",
                St::B => "B",
                St::P => "P",
                St::X => "X",
                St::Y => "Y",
            }
        }

        fn kind_name(kind: Ev) -> &'static str {
            match kind {
                Ev::Go => "Go",
                Ev::Hop => "Hop",
            }
        }
    }

    fn machine() -> (Machine<TestPolicy>, Arc<FlagNotifier>) {
        let wake = Arc::new(FlagNotifier::new());
        (Machine::new("Root", wake.clone()), wake)
    }

    #[test]
    fn start_enters_the_initial_configuration() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::B]);
        m.start();
        m.drain();

        assert!(m.is_state_active(St::A));
        assert!(!m.is_state_active(St::B));
        assert_eq!(m.active_states(), vec![St::A]);
    }

    #[test]
    fn active_states_are_listed_leaf_first() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::P]);
        m.create_substates(St::P, &[St::X, St::Y]);
        m.add_transition(St::A, Ev::Go, St::P);
        m.start();
        m.drain();
        assert_eq!(m.active_states(), vec![St::A]);

        m.handle().send(Ev::Go);
        m.drain();
        assert_eq!(m.active_states(), vec![St::X, St::P]);
    }

    #[test]
    fn parallel_composite_activates_every_region() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::P]);
        m.create_substates(St::P, &[St::X, St::Y]);
        m.set_parallel(St::P, true);
        m.add_transition(St::A, Ev::Go, St::P);
        m.start();
        m.drain();

        m.handle().send(Ev::Go);
        m.drain();
        assert_eq!(m.active_states(), vec![St::X, St::Y, St::P]);
    }

    #[test]
    fn unmatched_events_are_counted_and_dropped() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::B]);
        m.add_transition(St::B, Ev::Go, St::A);
        m.start();
        m.drain();

        m.handle().send(Ev::Go); // B is not active: no match
        m.handle().send(Ev::Hop); // no transition at all
        m.drain();

        let stats = m.stats();
        assert_eq!(stats.events_dispatched, 2);
        assert_eq!(stats.events_unmatched, 2);
        assert_eq!(stats.transitions_fired, 0);
        assert!(m.is_state_active(St::A));
    }

    #[test]
    fn internal_transition_leaves_the_configuration_alone() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        m.add_internal_transition(St::A, Ev::Go);

        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let probe = fired.clone();
        m.on_transition(St::A, Ev::Go, move |_| {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        m.start();
        m.drain();

        m.handle().send(Ev::Go);
        m.drain();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(m.is_state_active(St::A));
        assert_eq!(m.stats().transitions_fired, 1);
    }

    #[test]
    fn failing_callbacks_do_not_stop_dispatch() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::B]);
        m.add_transition(St::A, Ev::Go, St::B);
        m.on_transition(St::A, Ev::Go, |_| Err("boom".into()));

        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let probe = fired.clone();
        m.on_transition(St::A, Ev::Go, move |_| {
            probe.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        m.start();
        m.drain();

        m.handle().send(Ev::Go);
        m.drain();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(m.is_state_active(St::B));
    }

    #[test]
    fn drain_is_a_no_op_before_start_and_after_stop() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        assert_eq!(m.drain(), 0);

        m.start();
        m.drain();
        m.handle().send(Ev::Go);
        m.stop();
        assert_eq!(m.drain(), 0);
        assert_eq!(m.queued_events(), 1);
    }

    #[test]
    fn stop_is_visible_through_the_handle() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        let handle = m.handle();
        assert!(!handle.is_running());
        m.start();
        assert!(handle.is_running());
        handle.stop();
        assert!(!handle.is_running());
        assert!(!m.is_running());
    }

    #[test]
    #[should_panic(expected = "duplicate transition")]
    fn duplicate_transition_panics() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::B]);
        m.add_transition(St::A, Ev::Go, St::B);
        m.add_transition(St::A, Ev::Go, St::A);
    }

    #[test]
    #[should_panic(expected = "state A registered twice")]
    fn duplicate_state_panics() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::A]);
    }

    #[test]
    #[should_panic(expected = "unknown state")]
    fn unknown_transition_source_panics() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        m.add_transition(St::B, Ev::Go, St::A);
    }

    #[test]
    #[should_panic(expected = "no transition registered")]
    fn callback_on_missing_transition_panics() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        m.on_transition(St::A, Ev::Go, |_| Ok(()));
    }

    #[test]
    #[should_panic(expected = "frozen after start()")]
    fn setup_after_start_panics() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        m.start();
        m.create_states(&[St::B]);
    }

    #[test]
    #[should_panic(expected = "start() called twice")]
    fn start_twice_panics() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        m.start();
        m.start();
    }

    #[test]
    #[should_panic(expected = "invalid wiring")]
    fn start_rejects_ancestral_transition_endpoints() {
        let (mut m, _) = machine();
        m.create_states(&[St::A]);
        m.create_substates(St::A, &[St::X]);
        m.add_transition(St::X, Ev::Go, St::A);
        m.start();
    }

    #[test]
    fn validate_rejects_bottom_up_parallel_entry() {
        let (mut m, _) = machine();
        m.create_states(&[St::A, St::P]);
        m.create_substates(St::P, &[St::X, St::Y]);
        m.set_parallel(St::P, true);
        m.add_transition(St::A, Ev::Go, St::X);

        let error = m.validate().unwrap_err();
        assert!(matches!(error, WiringError::ParallelEntryPath { .. }));
    }

    #[test]
    fn validate_accepts_transitions_within_one_parallel_region() {
        let (mut m, _) = machine();
        m.create_states(&[St::P]);
        m.create_substates(St::P, &[St::A, St::B]);
        m.set_parallel(St::P, true);
        m.create_substates(St::A, &[St::X, St::Y]);
        m.add_transition(St::X, Ev::Go, St::Y);

        assert!(m.validate().is_ok());
    }
}
