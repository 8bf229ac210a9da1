//! State-tree node.

use std::fmt;

use canopy_core::{HookResult, Policy};

use crate::NodeIdx;

/// Zero-argument entry/exit hook.
pub(crate) type StateHook = Box<dyn FnMut() -> HookResult + Send>;

/// One node in the state tree.
///
/// Nodes live in a flat arena owned by the machine; parent/child relations
/// are arena indices. The root node has no id and carries the machine's
/// display name. Entry and exit behavior lives on the machine
/// (`enter`/`exit` walk the arena); the node itself is passive data plus
/// its registered hooks.
pub(crate) struct Node<P: Policy> {
    /// Client id; `None` for the root sentinel.
    pub(crate) id: Option<P::StateId>,
    /// Display name for logs.
    pub(crate) name: String,
    pub(crate) parent: Option<NodeIdx>,
    /// Insertion order; the first child is the initial child.
    pub(crate) children: Vec<NodeIdx>,
    /// When set, entering this node enters all children concurrently.
    pub(crate) is_parallel: bool,
    pub(crate) is_active: bool,
    /// Currently active child of a non-parallel composite. Unused (`None`)
    /// while a parallel composite is active.
    pub(crate) active_child: Option<NodeIdx>,
    pub(crate) entered: Vec<StateHook>,
    pub(crate) exited: Vec<StateHook>,
}

impl<P: Policy> Node<P> {
    pub(crate) fn new(id: Option<P::StateId>, name: String, parent: Option<NodeIdx>) -> Self {
        Self {
            id,
            name,
            parent,
            children: Vec::new(),
            is_parallel: false,
            is_active: false,
            active_child: None,
            entered: Vec::new(),
            exited: Vec::new(),
        }
    }
}

// Hook lists are not Debug; render everything else.
impl<P: Policy> fmt::Debug for Node<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("is_parallel", &self.is_parallel)
            .field("is_active", &self.is_active)
            .field("active_child", &self.active_child)
            .finish()
    }
}
