//! Start-time wiring validation.

use canopy_core::Policy;
use thiserror::Error;

use crate::machine::Machine;
use crate::node::Node;
use crate::NodeIdx;

/// A structural mistake in the client's wiring.
///
/// Wiring errors are programmer errors: `start()` formats them into a
/// panic instead of returning them, since the machine cannot run with a
/// broken topology. [`Machine::validate`] is public for clients that want
/// a pre-flight check without the panic.
#[derive(Debug, Error)]
pub enum WiringError {
    /// Transition endpoints are ancestor and descendant of one another.
    /// The exit/enter cascade along the least common ancestor is undefined
    /// for such pairs; only self-transitions and transitions between
    /// separate branches are supported.
    #[error(
        "transition on {event}: source {src_state} and target {target} are \
         ancestrally related; only self or sibling-branch transitions are supported"
    )]
    AncestralEndpoints {
        event: String,
        src_state: String,
        target: String,
    },

    /// Taking the transition would activate a parallel composite from
    /// below. Parallel composites are entered top-down through their own
    /// entry only.
    #[error(
        "transition on {event}: entering {target} would activate parallel \
         composite {ancestor} bottom-up; target a parallel region only from \
         outside the composite or from within the same region"
    )]
    ParallelEntryPath {
        event: String,
        target: String,
        ancestor: String,
    },
}

impl<P: Policy> Machine<P> {
    /// Check every registered transition against the frozen topology.
    ///
    /// Called by `start()`; public so clients can pre-flight their wiring
    /// and render the error themselves.
    pub fn validate(&self) -> Result<(), WiringError> {
        let nodes = self.nodes();
        for transition in self.transition_entries() {
            let source = transition.source;
            let Some(target) = transition.target else {
                continue;
            };
            if source == target {
                continue;
            }

            if is_strict_ancestor(nodes, source, target) || is_strict_ancestor(nodes, target, source)
            {
                return Err(WiringError::AncestralEndpoints {
                    event: P::kind_name(transition.kind).to_string(),
                    src_state: nodes[source].name.clone(),
                    target: nodes[target].name.clone(),
                });
            }

            // The entry cascade activates target's ancestors strictly
            // below the LCA; none of them may be parallel.
            let lca = lowest_common_ancestor(nodes, source, target);
            let mut ancestor = nodes[target].parent;
            while let Some(idx) = ancestor {
                if Some(idx) == lca {
                    break;
                }
                if nodes[idx].is_parallel {
                    return Err(WiringError::ParallelEntryPath {
                        event: P::kind_name(transition.kind).to_string(),
                        target: nodes[target].name.clone(),
                        ancestor: nodes[idx].name.clone(),
                    });
                }
                ancestor = nodes[idx].parent;
            }
        }
        Ok(())
    }
}

/// Whether `candidate` is a strict ancestor of `of`.
fn is_strict_ancestor<P: Policy>(nodes: &[Node<P>], candidate: NodeIdx, of: NodeIdx) -> bool {
    let mut cursor = nodes[of].parent;
    while let Some(idx) = cursor {
        if idx == candidate {
            return true;
        }
        cursor = nodes[idx].parent;
    }
    false
}

/// Deepest node on both ancestor chains (the chains include the endpoints
/// themselves, so siblings resolve to their parent).
fn lowest_common_ancestor<P: Policy>(
    nodes: &[Node<P>],
    source: NodeIdx,
    target: NodeIdx,
) -> Option<NodeIdx> {
    let mut s = Some(source);
    while let Some(si) = s {
        let mut t = Some(target);
        while let Some(ti) = t {
            if si == ti {
                return Some(si);
            }
            t = nodes[ti].parent;
        }
        s = nodes[si].parent;
    }
    None
}
