use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Frontier;
use crate::node::Node;
use crate::state::State;
use crate::stats::TreeStats;

/// How the cyclic best-first frontier selects within the front level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Take the best state of the front level, then rotate.
    Standard = 0,
    /// Take one of the `k` best states of the front level, uniformly at
    /// random, then rotate.
    RandomFromTopK = 1,
    /// Stay at the front level for up to `k` consecutive pops before
    /// rotating.
    KBestAtLevel = 2,
}

/// Cyclic best-first frontier: one priority queue per depth, rotated
/// round-robin over the depths that currently hold states.
pub struct CyclicBestFirst<S: State> {
    queues: Vec<BinaryHeap<Rc<Node<S>>>>,
    // Rotation order over the non-empty levels.
    active: VecDeque<usize>,
    selection: Selection,
    num_to_select: usize,
    explored_at_current: usize,
    last_level_explored: Option<usize>,
    rng: StdRng,
}

impl<S: State> CyclicBestFirst<S> {
    /// Creates a cyclic best-first frontier with the given selection method,
    /// per-level count `k`, and random seed.
    pub fn new(selection: Selection, num_to_select: usize, seed: u64) -> Self {
        Self {
            queues: Vec::new(),
            active: VecDeque::new(),
            selection,
            num_to_select: num_to_select.max(1),
            explored_at_current: 0,
            last_level_explored: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pop_standard(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>> {
        let mut level = self.active.pop_front()?;
        loop {
            let Some(node) = self.queues[level].pop() else {
                level = self.active.pop_front()?;
                continue;
            };
            if node.is_dominated() {
                stats.pruned_by_dom_before_exploration += 1;
                continue;
            }
            if !self.queues[level].is_empty() {
                self.active.push_back(level);
            }
            self.last_level_explored = Some(node.depth());
            return Some(node);
        }
    }

    fn pop_random_from_top_k(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>> {
        let mut level = self.active.pop_front()?;
        loop {
            // The up-to-k best live states at this level, selection without
            // replacement.
            let mut best = Vec::with_capacity(self.num_to_select);
            while best.len() < self.num_to_select {
                let Some(node) = self.queues[level].pop() else {
                    break;
                };
                if node.is_dominated() {
                    stats.pruned_by_dom_before_exploration += 1;
                    continue;
                }
                best.push(node);
            }

            if best.is_empty() {
                level = self.active.pop_front()?;
                continue;
            }

            let chosen = best.swap_remove(self.rng.gen_range(0..best.len()));
            for node in best {
                self.queues[level].push(node);
            }
            if !self.queues[level].is_empty() {
                self.active.push_back(level);
            }
            self.last_level_explored = Some(chosen.depth());
            return Some(chosen);
        }
    }

    fn pop_k_best_at_level(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>> {
        let mut level = *self.active.front()?;
        let node = loop {
            let Some(node) = self.queues[level].pop() else {
                self.active.pop_front();
                self.explored_at_current = 0;
                level = *self.active.front()?;
                continue;
            };
            if node.is_dominated() {
                stats.pruned_by_dom_before_exploration += 1;
                if self.queues[level].is_empty() {
                    self.active.pop_front();
                    self.explored_at_current = 0;
                    level = *self.active.front()?;
                }
                continue;
            }
            break node;
        };

        self.explored_at_current += 1;
        if self.queues[level].is_empty() {
            self.active.pop_front();
            self.explored_at_current = 0;
        } else if self.explored_at_current >= self.num_to_select {
            self.active.pop_front();
            self.explored_at_current = 0;
            self.active.push_back(level);
        }
        self.last_level_explored = Some(node.depth());
        Some(node)
    }
}

impl<S: State> Frontier<S> for CyclicBestFirst<S> {
    fn name(&self) -> &'static str {
        "CBFS"
    }

    fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn push(&mut self, node: Rc<Node<S>>) {
        let level = node.depth();
        if level >= self.queues.len() {
            self.queues.resize_with(level + 1, BinaryHeap::new);
        }

        let was_empty = self.queues[level].is_empty();
        self.queues[level].push(node);
        if !was_empty {
            return;
        }

        if Some(level) == self.last_level_explored {
            // Re-insertion after exploration at this level: rotate to the
            // back.
            self.active.push_back(level);
            return;
        }

        let previous_level_empty = level == 0 || self.queues[level - 1].is_empty();
        if self.selection != Selection::KBestAtLevel
            || previous_level_empty
            || self.explored_at_current >= self.num_to_select
        {
            self.active.push_front(level);
        } else {
            // The previous level is still under its per-level quota at the
            // front; slot in behind it.
            let behind_front = 1.min(self.active.len());
            self.active.insert(behind_front, level);
        }
    }

    fn pop_next(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>> {
        match self.selection {
            Selection::Standard => self.pop_standard(stats),
            Selection::RandomFromTopK => self.pop_random_from_top_k(stats),
            Selection::KBestAtLevel => self.pop_k_best_at_level(stats),
        }
    }
}
