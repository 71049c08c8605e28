use std::collections::BinaryHeap;
use std::rc::Rc;

use super::Frontier;
use crate::node::Node;
use crate::state::State;
use crate::stats::TreeStats;

/// Contour/dive best-first frontier: per-depth priority queues plus a
/// singleton `next_best` slot that carries a dive one level deeper.
///
/// The best-looking child of the state just explored claims the slot and is
/// popped next, so the search dives along the best child at each level until
/// bounds or dominance stop it, then restarts from the cyclically next
/// non-empty depth.
pub struct ContourBestFirst<S: State> {
    queues: Vec<BinaryHeap<Rc<Node<S>>>>,
    next_best: Option<Rc<Node<S>>>,
    last_dive_level: usize,
    last_level_explored: Option<usize>,
    len: usize,
}

impl<S: State> Default for ContourBestFirst<S> {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            next_best: None,
            last_dive_level: 0,
            last_level_explored: None,
            len: 0,
        }
    }
}

impl<S: State> Frontier<S> for ContourBestFirst<S> {
    fn name(&self) -> &'static str {
        "CDBFS"
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, node: Rc<Node<S>>) {
        let level = node.depth();
        if level >= self.queues.len() {
            self.queues.resize_with(level + 1, BinaryHeap::new);
        }
        self.len += 1;

        if Some(level) == self.last_level_explored {
            // Re-queue at the level just explored.
            self.queues[level].push(node);
            return;
        }

        if self.next_best.is_none() {
            self.next_best = Some(node);
        } else if self
            .next_best
            .as_deref()
            .is_some_and(|best| *node > *best)
        {
            if let Some(demoted) = self.next_best.replace(node) {
                self.queues[demoted.depth()].push(demoted);
            }
        } else {
            self.queues[level].push(node);
        }
    }

    fn pop_next(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>> {
        if let Some(best) = self.next_best.take() {
            self.len -= 1;
            if best.is_dominated() {
                stats.pruned_by_dom_before_exploration += 1;
            } else {
                // Continue the dive one level deeper.
                self.last_level_explored = Some(best.depth());
                return Some(best);
            }
        }

        while self.len > 0 {
            let mut level = (self.last_dive_level + 1) % self.queues.len();
            while self.queues[level].is_empty() {
                level = if level + 1 >= self.queues.len() {
                    0
                } else {
                    level + 1
                };
            }

            while let Some(node) = self.queues[level].pop() {
                self.len -= 1;
                if node.is_dominated() {
                    stats.pruned_by_dom_before_exploration += 1;
                    continue;
                }
                self.last_dive_level = node.depth();
                self.last_level_explored = Some(node.depth());
                return Some(node);
            }

            // Level exhausted by dominated states; advance the cycle from it.
            self.last_dive_level = level;
        }

        None
    }
}
