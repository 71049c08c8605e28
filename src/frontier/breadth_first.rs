use std::collections::VecDeque;
use std::rc::Rc;

use super::Frontier;
use crate::node::Node;
use crate::state::State;
use crate::stats::TreeStats;

/// First-in, first-out frontier.
pub struct BreadthFirst<S> {
    queue: VecDeque<Rc<Node<S>>>,
}

impl<S> Default for BreadthFirst<S> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<S: State> Frontier<S> for BreadthFirst<S> {
    fn name(&self) -> &'static str {
        "BrFS"
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn push(&mut self, node: Rc<Node<S>>) {
        self.queue.push_back(node);
    }

    fn pop_next(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>> {
        while let Some(node) = self.queue.pop_front() {
            if node.is_dominated() {
                stats.pruned_by_dom_before_exploration += 1;
                continue;
            }
            return Some(node);
        }
        None
    }
}
