use std::cell::Cell;
use std::cmp::Ordering;

use crate::state::{Bounds, State};

/// Identifier assigned to a state when it is ingested; a contiguous sequence
/// starting at 0 in ingestion order.
pub type NodeId = usize;

/// Engine-side bookkeeping wrapped around a user state.
///
/// Nodes are shared between the frontier and the dominance index through
/// `Rc`, so the mutable lifecycle flags and the bounds (which final pruning
/// tests may tighten after insertion) live in `Cell`s.
pub struct Node<S> {
    id: NodeId,
    parent: Option<NodeId>,
    depth: usize,
    time_to_explore: usize,
    dominance_key: i64,
    lower: Cell<f64>,
    upper: Cell<f64>,
    dominated: Cell<bool>,
    processed: Cell<bool>,
    state: S,
}

impl<S: State> Node<S> {
    /// Creates a node around a state, with unbounded initial bounds.
    pub fn new(id: NodeId, parent: Option<NodeId>, state: S) -> Self {
        Self {
            id,
            parent,
            depth: state.depth(),
            time_to_explore: state.time_to_explore(),
            dominance_key: state.dominance_key(),
            lower: Cell::new(f64::NEG_INFINITY),
            upper: Cell::new(f64::INFINITY),
            dominated: Cell::new(false),
            processed: Cell::new(false),
            state,
        }
    }

    /// Returns the node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the id of the node's parent, or `None` for a root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns the depth reported by the state at ingestion.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the deferral threshold reported by the state at ingestion.
    pub fn time_to_explore(&self) -> usize {
        self.time_to_explore
    }

    /// Returns the dominance class key reported by the state at ingestion.
    pub fn dominance_key(&self) -> i64 {
        self.dominance_key
    }

    /// Returns the node's current bounds.
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.lower.get(), self.upper.get())
    }

    /// Replaces the node's bounds.
    pub fn set_bounds(&self, bounds: Bounds) {
        self.lower.set(bounds.lower);
        self.upper.set(bounds.upper);
    }

    /// Returns whether the node has been marked dominated. Once set, the
    /// flag is never cleared.
    pub fn is_dominated(&self) -> bool {
        self.dominated.get()
    }

    /// Marks the node dominated.
    pub fn mark_dominated(&self) {
        self.dominated.set(true);
    }

    /// Returns whether the node's state has been branched on.
    pub fn was_processed(&self) -> bool {
        self.processed.get()
    }

    /// Marks the node as branched on.
    pub fn mark_processed(&self) {
        self.processed.set(true);
    }

    /// Returns the wrapped state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns the wrapped state mutably. Only the driver uses this, before
    /// the node is shared.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }
}

impl<S: State> PartialEq for Node<S> {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
    }
}

impl<S: State> Eq for Node<S> {}

impl<S: State> Ord for Node<S> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.state.cmp(&other.state)
    }
}

impl<S: State> PartialOrd for Node<S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Expander;
    use std::ops::ControlFlow;

    #[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct MockState {
        priority: i64,
        level: usize,
    }

    impl std::fmt::Display for MockState {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.priority)
        }
    }

    impl State for MockState {
        fn depth(&self) -> usize {
            self.level
        }

        fn objective(&self) -> f64 {
            self.priority as f64
        }

        fn is_terminal(&self) -> bool {
            false
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::UNBOUNDED
        }

        fn branch(&self, _search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            ControlFlow::Continue(())
        }

        fn dominance_key(&self) -> i64 {
            7
        }

        fn time_to_explore(&self) -> usize {
            3
        }
    }

    fn node(priority: i64) -> Node<MockState> {
        Node::new(0, None, MockState { priority, level: 2 })
    }

    #[test]
    fn test_new_caches_state_attributes() {
        let node = Node::new(5, Some(1), MockState { priority: 9, level: 2 });

        assert_eq!(node.id(), 5);
        assert_eq!(node.parent(), Some(1));
        assert_eq!(node.depth(), 2);
        assert_eq!(node.time_to_explore(), 3);
        assert_eq!(node.dominance_key(), 7);
        assert_eq!(node.bounds(), Bounds::UNBOUNDED);
        assert!(!node.is_dominated());
        assert!(!node.was_processed());
    }

    #[test]
    fn test_flags() {
        let node = node(1);

        node.mark_dominated();
        node.mark_processed();
        assert!(node.is_dominated());
        assert!(node.was_processed());
    }

    #[test]
    fn test_set_bounds() {
        let node = node(1);

        node.set_bounds(Bounds::new(2.0, 4.0));
        assert_eq!(node.bounds(), Bounds::new(2.0, 4.0));
    }

    #[test]
    fn test_ord_delegates_to_state() {
        let small = node(1);
        let large = node(2);

        assert!(small < large);
        assert!(small == node(1));
        assert!(large > small);
    }
}
