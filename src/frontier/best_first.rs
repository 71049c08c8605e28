use std::collections::BinaryHeap;
use std::rc::Rc;

use super::Frontier;
use crate::node::Node;
use crate::state::State;
use crate::stats::TreeStats;

/// Single best-first frontier keyed by the state comparator, greatest state
/// first.
pub struct BestFirst<S: State> {
    heap: BinaryHeap<Rc<Node<S>>>,
}

impl<S: State> Default for BestFirst<S> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<S: State> Frontier<S> for BestFirst<S> {
    fn name(&self) -> &'static str {
        "BFS"
    }

    fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn push(&mut self, node: Rc<Node<S>>) {
        self.heap.push(node);
    }

    fn pop_next(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>> {
        while let Some(node) = self.heap.pop() {
            if node.is_dominated() {
                stats.pruned_by_dom_before_exploration += 1;
                continue;
            }
            return Some(node);
        }
        None
    }
}
