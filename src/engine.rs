use std::ops::ControlFlow;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

use crate::dominance::DominanceIndex;
use crate::error::{SearchError, SearchResult};
use crate::frontier::{
    BestFirst, BreadthFirst, ContourBestFirst, CyclicBestFirst, DepthFirst, Frontier, Selection,
};
use crate::node::{Node, NodeId};
use crate::state::{Bounds, Sense, State, EPSILON};
use crate::stats::{ProgressRecord, TreeStats};
use crate::timer::Timer;
use crate::trace::TraceWriter;

/// Options for the search driver.
#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Turns the dominance subsystem on. Dominance comparisons only see
    /// states kept by `retain_states`.
    pub use_dominance: bool,
    /// Keeps every stored state alive in its dominance class until
    /// teardown. Required when `use_dominance` is on.
    pub retain_states: bool,
    /// Runs `apply_final_pruning_tests` on a popped state after the cheap
    /// pruning tests fail, then re-checks.
    pub use_final_tests: bool,
    /// Updates the incumbent even on ties within tolerance.
    pub find_all_solutions: bool,
    /// Treats every ingested state's objective as an incumbent candidate,
    /// not only terminals.
    pub save_non_terminal: bool,
    /// The user's `branch` computes children's bounds itself and submits
    /// them through `process_state_with_bounds`; the driver never calls
    /// `compute_bounds`.
    pub state_computes_bounds: bool,
    /// Halts as soon as any incumbent update occurs.
    pub stop_at_first_improvement: bool,
    /// Maximum number of states to explore; 0 disables the limit.
    pub node_limit: usize,
    /// Wall-time limit in seconds; 0.0 disables the limit.
    pub time_limit: f64,
    /// Progress is printed every this many explored states.
    pub output_rate: usize,
    /// Verbosity level, 0 to 3.
    pub debug: u8,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            use_dominance: false,
            retain_states: true,
            use_final_tests: false,
            find_all_solutions: false,
            save_non_terminal: false,
            state_computes_bounds: false,
            stop_at_first_improvement: false,
            node_limit: 0,
            time_limit: 0.0,
            output_rate: 1000,
            debug: 1,
        }
    }
}

/// Everything the driver owns apart from the frontier: bounds, incumbent,
/// dominance index, statistics, trace, and configuration.
struct SearchCore<S: State> {
    options: SearchOptions,
    sense: Sense,
    opt_is_integral: bool,
    global_lower: f64,
    global_upper: f64,
    best_state: Option<S>,
    keep_exploring: bool,
    next_node_id: NodeId,
    dominance: DominanceIndex<S>,
    stats: TreeStats,
    timer: Timer,
    trace: Option<TraceWriter>,
    fatal: Option<SearchError>,
}

impl<S: State> SearchCore<S> {
    fn new(sense: Sense, opt_is_integral: bool, options: SearchOptions) -> Self {
        let timer = Timer::with_limit(options.time_limit);
        Self {
            options,
            sense,
            opt_is_integral,
            global_lower: f64::NEG_INFINITY,
            global_upper: f64::INFINITY,
            best_state: None,
            keep_exploring: true,
            next_node_id: 0,
            dominance: DominanceIndex::default(),
            stats: TreeStats::default(),
            timer,
            trace: None,
            fatal: None,
        }
    }

    fn global_bounds(&self) -> Bounds {
        Bounds::new(self.global_lower, self.global_upper)
    }

    fn take_fatal(&mut self) -> SearchResult<()> {
        match self.fatal.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Ingests a state. Returns true iff the state was kept, either as a
    /// terminal incumbent candidate or stored for later exploration.
    fn process_state(
        &mut self,
        frontier: &mut dyn Frontier<S>,
        state: S,
        supplied_bounds: Option<Bounds>,
        is_root: bool,
        parent: Option<NodeId>,
    ) -> bool {
        let id = self.next_node_id;
        self.next_node_id += 1;
        if let Some(trace) = self.trace.as_mut() {
            trace.record_node(id, parent);
        }
        self.stats.record_identified(state.depth());

        if state.is_terminal() {
            self.process_terminal_state(&state, true, Some(id));
            return true;
        }

        if self.options.save_non_terminal {
            self.save_best_state(&state, true);
        }

        let mut node = Node::new(id, parent, state);

        if self.options.use_dominance && self.dominance.assess(&node) {
            self.stats.pruned_by_dom_before_insertion += 1;
            if let Some(trace) = self.trace.as_mut() {
                trace.mark_pruned_by_dominance(id);
            }
            return false;
        }

        let bounds = match supplied_bounds {
            Some(bounds) => bounds,
            None if self.options.state_computes_bounds => Bounds::UNBOUNDED,
            None => {
                let global = self.global_bounds();
                node.state_mut().compute_bounds(global)
            }
        };
        node.set_bounds(bounds);

        if self.exceeds_bounds(bounds) {
            self.stats.pruned_by_bounds_before_insertion += 1;
            if let Some(trace) = self.trace.as_mut() {
                trace.mark_pruned_by_bounds(id);
            }
            return false;
        }

        if is_root {
            match self.sense {
                Sense::Minimize => self.global_lower = bounds.lower,
                Sense::Maximize => self.global_upper = bounds.upper,
            }
            let integral_close = self.opt_is_integral
                && self.global_lower.ceil() == self.global_upper.floor();
            if integral_close || (self.global_lower - self.global_upper).abs() < EPSILON {
                // Solved at the root; nothing to explore.
                return false;
            }
        }

        let depth = node.depth();
        let node = Rc::new(node);
        if self.options.retain_states {
            self.dominance.insert(node.clone());
        }
        self.stats.record_stored(depth);
        frontier.push(node);
        true
    }

    fn process_terminal_state(&mut self, state: &S, is_tree_node: bool, id: Option<NodeId>) {
        if is_tree_node {
            self.stats.terminal_states_identified += 1;
        } else {
            self.stats.heuristic_states_processed += 1;
        }

        if let (Some(trace), Some(id)) = (self.trace.as_mut(), id) {
            trace.mark_terminal(id);
        }

        self.save_best_state(state, is_tree_node);
    }

    /// Updates the incumbent with a candidate objective, tightening the
    /// matching global bound on strict improvement.
    fn save_best_state(&mut self, state: &S, is_tree_node: bool) {
        let objective = state.objective();
        let best_seen = match self.sense {
            Sense::Minimize => self.global_upper,
            Sense::Maximize => self.global_lower,
        };

        if (objective - best_seen).abs() <= EPSILON {
            // Comparable quality to the best known.
            if is_tree_node {
                self.stats.num_optimal_terminal_states += 1;
            } else {
                self.stats.num_optimal_heuristic_states += 1;
            }
            if self.best_state.is_none() || self.options.find_all_solutions {
                self.stats.times_best_state_was_updated += 1;
                self.best_state = Some(state.clone());
                if self.options.debug > 0 {
                    self.print_progress(true);
                }
            }
            return;
        }

        let improves = match self.sense {
            Sense::Minimize => objective < self.global_upper - EPSILON,
            Sense::Maximize => objective > self.global_lower + EPSILON,
        };
        if !improves {
            return;
        }

        self.best_state = Some(state.clone());
        match self.sense {
            Sense::Minimize => self.global_upper = objective,
            Sense::Maximize => self.global_lower = objective,
        }

        if self.global_upper < self.global_lower {
            self.fatal = Some(SearchError::BoundInconsistency {
                lower: self.global_lower,
                upper: self.global_upper,
            });
            return;
        }

        if self.options.debug > 0 {
            self.print_progress(true);
        }
        self.stats.record_improvement();
        if is_tree_node {
            self.stats.num_optimal_terminal_states = 1;
            self.stats.num_optimal_heuristic_states = 0;
        } else {
            self.stats.num_optimal_terminal_states = 0;
            self.stats.num_optimal_heuristic_states = 1;
        }
    }

    fn exceeds_bounds(&self, bounds: Bounds) -> bool {
        match self.sense {
            Sense::Minimize => bounds.lower >= self.global_upper - EPSILON,
            Sense::Maximize => bounds.upper <= self.global_lower + EPSILON,
        }
    }

    /// The cheap pruning re-check applied to a popped state.
    ///
    /// Frontiers discard dominated states on pop, so only the bounds can
    /// have moved between insertion and exploration.
    fn state_is_prunable(&mut self, node: &Node<S>) -> bool {
        debug_assert!(
            !node.is_dominated(),
            "dominated states are filtered on pop"
        );

        let bounds = node.bounds();
        if self.exceeds_bounds(bounds) {
            self.stats.pruned_by_bounds_before_exploration += 1;
            if self.options.debug >= 3 {
                match self.sense {
                    Sense::Minimize => println!(
                        "State at depth {} exceeds bounds: LB({:.2}) > GUB({:.2})",
                        node.depth(),
                        bounds.lower,
                        self.global_upper
                    ),
                    Sense::Maximize => println!(
                        "State at depth {} exceeds bounds: UB({:.2}) < GLB({:.2})",
                        node.depth(),
                        bounds.upper,
                        self.global_lower
                    ),
                }
            }
            if let Some(trace) = self.trace.as_mut() {
                trace.mark_pruned_by_bounds(node.id());
            }
            return true;
        }

        false
    }

    fn attempt_heuristic_completion(&self, bounds: Bounds) -> bool {
        match self.sense {
            Sense::Minimize => bounds.lower < self.global_upper - EPSILON,
            Sense::Maximize => bounds.upper > self.global_lower + EPSILON,
        }
    }

    fn progress_record(&self, new_incumbent: bool) -> ProgressRecord {
        ProgressRecord {
            new_incumbent,
            explored: self.stats.states_explored,
            stored: self.stats.states_stored_in_tree,
            lower: self.global_lower,
            upper: self.global_upper,
            elapsed: self.timer.elapsed(),
            time_to_opt: self.stats.time_to_opt,
        }
    }

    fn print_progress(&self, new_incumbent: bool) {
        println!("{}", self.progress_record(new_incumbent));
    }
}

/// Engine handle passed to [`State::branch`].
///
/// Exposes ingestion of children and heuristic solutions plus read-only
/// access to the global bounds. A bound inconsistency detected while
/// processing a child is latched and surfaced by the driver as soon as
/// `branch` returns.
pub struct Expander<'a, S: State> {
    core: &'a mut SearchCore<S>,
    frontier: &'a mut dyn Frontier<S>,
    parent: Option<NodeId>,
}

impl<'a, S: State> Expander<'a, S> {
    /// Ingests a child state. Returns true iff the state was kept.
    pub fn process_state(&mut self, state: S) -> bool {
        self.core
            .process_state(&mut *self.frontier, state, None, false, self.parent)
    }

    /// Ingests a child state whose bounds the caller already computed.
    pub fn process_state_with_bounds(&mut self, state: S, bounds: Bounds) -> bool {
        self.core
            .process_state(&mut *self.frontier, state, Some(bounds), false, self.parent)
    }

    /// Feeds a complete solution produced outside the tree to the incumbent
    /// check. The state is not stored and receives no id.
    pub fn process_heuristic_state(&mut self, state: S) {
        self.core.process_terminal_state(&state, false, None);
    }

    /// Returns whether a state with the given bounds could still improve on
    /// the incumbent, i.e. whether completing it heuristically is worthwhile.
    pub fn attempt_heuristic_completion(&self, bounds: Bounds) -> bool {
        self.core.attempt_heuristic_completion(bounds)
    }

    /// Returns the current global bounds.
    pub fn global_bounds(&self) -> Bounds {
        self.core.global_bounds()
    }

    /// Returns the direction of optimisation.
    pub fn sense(&self) -> Sense {
        self.core.sense
    }

    /// Returns the number of states explored so far.
    pub fn states_explored(&self) -> usize {
        self.core.stats.states_explored
    }
}

/// A branch-and-bound search tree: the shared driver combined with one
/// frontier strategy.
///
/// The driver orchestrates ingestion, pruning, bound maintenance,
/// termination, and statistics; the frontier only decides which stored state
/// is expanded next.
pub struct SearchTree<S: State, F: Frontier<S>> {
    core: SearchCore<S>,
    frontier: F,
}

impl<S: State> SearchTree<S, DepthFirst<S>> {
    /// Creates a depth-first search tree.
    pub fn depth_first(sense: Sense, opt_is_integral: bool, options: SearchOptions) -> Self {
        Self::with_frontier(sense, opt_is_integral, DepthFirst::default(), options)
    }
}

impl<S: State> SearchTree<S, BreadthFirst<S>> {
    /// Creates a breadth-first search tree.
    pub fn breadth_first(sense: Sense, opt_is_integral: bool, options: SearchOptions) -> Self {
        Self::with_frontier(sense, opt_is_integral, BreadthFirst::default(), options)
    }
}

impl<S: State> SearchTree<S, BestFirst<S>> {
    /// Creates a best-first search tree.
    pub fn best_first(sense: Sense, opt_is_integral: bool, options: SearchOptions) -> Self {
        Self::with_frontier(sense, opt_is_integral, BestFirst::default(), options)
    }
}

impl<S: State> SearchTree<S, CyclicBestFirst<S>> {
    /// Creates a cyclic best-first search tree with the given selection
    /// method, per-level count `k`, and random seed.
    pub fn cyclic_best_first(
        sense: Sense,
        opt_is_integral: bool,
        selection: Selection,
        num_to_select: usize,
        seed: u64,
        options: SearchOptions,
    ) -> Self {
        Self::with_frontier(
            sense,
            opt_is_integral,
            CyclicBestFirst::new(selection, num_to_select, seed),
            options,
        )
    }
}

impl<S: State> SearchTree<S, ContourBestFirst<S>> {
    /// Creates a contour/dive best-first search tree.
    pub fn contour_best_first(
        sense: Sense,
        opt_is_integral: bool,
        options: SearchOptions,
    ) -> Self {
        Self::with_frontier(sense, opt_is_integral, ContourBestFirst::default(), options)
    }
}

impl<S: State, F: Frontier<S>> SearchTree<S, F> {
    /// Creates a search tree over a caller-supplied frontier.
    pub fn with_frontier(
        sense: Sense,
        opt_is_integral: bool,
        frontier: F,
        options: SearchOptions,
    ) -> Self {
        Self {
            core: SearchCore::new(sense, opt_is_integral, options),
            frontier,
        }
    }

    /// Ingests a state, transferring ownership to the engine. Returns true
    /// iff the state was kept (as a terminal incumbent candidate, or stored
    /// for later exploration).
    pub fn process_state(&mut self, state: S, is_root: bool) -> SearchResult<bool> {
        let kept = self
            .core
            .process_state(&mut self.frontier, state, None, is_root, None);
        self.core.take_fatal()?;
        Ok(kept)
    }

    /// Ingests a state whose bounds the caller already computed.
    pub fn process_state_with_bounds(
        &mut self,
        state: S,
        bounds: Bounds,
        is_root: bool,
    ) -> SearchResult<bool> {
        let kept =
            self.core
                .process_state(&mut self.frontier, state, Some(bounds), is_root, None);
        self.core.take_fatal()?;
        Ok(kept)
    }

    /// Feeds a complete solution produced outside the tree to the incumbent
    /// check only.
    pub fn process_heuristic_state(&mut self, state: S) -> SearchResult<()> {
        self.core.process_terminal_state(&state, false, None);
        self.core.take_fatal()
    }

    /// Returns whether a state with the given bounds could still improve on
    /// the incumbent.
    pub fn attempt_heuristic_completion(&self, bounds: Bounds) -> bool {
        self.core.attempt_heuristic_completion(bounds)
    }

    /// Seeds the global lower bound.
    pub fn set_global_lower_bound(&mut self, bound: f64) {
        self.core.global_lower = bound;
    }

    /// Seeds the global upper bound.
    pub fn set_global_upper_bound(&mut self, bound: f64) {
        self.core.global_upper = bound;
    }

    /// Configures trace output: opens the file and writes the graph header.
    pub fn set_trace_output(
        &mut self,
        path: impl AsRef<Path>,
        instance: &str,
        seed: i64,
        deep: bool,
    ) -> SearchResult<()> {
        self.core.trace = Some(TraceWriter::open(path.as_ref(), instance, seed, deep)?);
        Ok(())
    }

    /// Runs the main search loop until the frontier empties or a
    /// termination condition fires.
    pub fn explore(&mut self) -> SearchResult<()> {
        self.core.timer.start();
        let mut finished = true;

        while !self.frontier.is_empty() && self.core.keep_exploring {
            let iteration_start = Instant::now();
            let updates_before = self.core.stats.times_best_state_was_updated;

            let flow = self.explore_next_state();
            if let Some(error) = self.core.fatal.take() {
                self.core.timer.stop();
                return Err(error);
            }
            if flow.is_break() {
                self.core.keep_exploring = false;
                finished = false;
            }

            self.core.stats.total_time += iteration_start.elapsed();
            if self.core.stats.times_best_state_was_updated != updates_before {
                self.core.stats.time_to_opt = self.core.stats.total_time;
            }

            if self.core.options.debug > 0
                && self.core.options.output_rate > 0
                && self.core.stats.states_explored % self.core.options.output_rate == 0
            {
                self.core.print_progress(false);
            }

            self.core.keep_exploring &= (self.core.options.node_limit == 0
                || self.core.stats.states_explored < self.core.options.node_limit)
                && !self.core.timer.limit_reached()
                && (!self.core.options.stop_at_first_improvement
                    || self.core.stats.times_best_state_was_updated == 0)
                && (self.core.global_lower < self.core.global_upper);
        }

        self.core.timer.stop();

        if self.core.options.debug > 0 {
            println!("* Finished *");
            if self.core.global_lower < self.core.global_upper
                && (!self.frontier.is_empty() || !finished)
            {
                println!("Failed to explore entire tree; cannot guarantee optimality");
            }
            if self.core.options.debug >= 2 {
                self.print_opt_solution();
            }
            self.print_tree_stats();
            println!(
                "{:.2}s total CPU time",
                self.core.stats.total_time.as_secs_f64()
            );
            println!(
                "{:.2}s time to opt",
                self.core.stats.time_to_opt.as_secs_f64()
            );
        }

        Ok(())
    }

    /// Pops one state and either defers, prunes, or branches on it.
    fn explore_next_state(&mut self) -> ControlFlow<()> {
        let Some(node) = self.frontier.pop_next(&mut self.core.stats) else {
            return ControlFlow::Continue(());
        };

        if node.time_to_explore() > self.core.stats.states_explored {
            self.frontier.push(node);
            return ControlFlow::Continue(());
        }

        if let Some(trace) = self.core.trace.as_mut() {
            trace.mark_explored(node.id());
        }

        if self.core.state_is_prunable(&node) {
            return ControlFlow::Continue(());
        }

        if self.core.options.use_final_tests {
            let global = self.core.global_bounds();
            if let Some(tightened) = node.state().apply_final_pruning_tests(global, node.bounds())
            {
                node.set_bounds(tightened);
            }
            if self.core.state_is_prunable(&node) {
                return ControlFlow::Continue(());
            }
        }

        self.core.stats.record_explored(node.depth());
        node.mark_processed();

        let mut expander = Expander {
            core: &mut self.core,
            frontier: &mut self.frontier,
            parent: Some(node.id()),
        };
        node.state().branch(&mut expander)
    }

    /// Clears the incumbent and re-enables exploration, for restart-style
    /// drivers.
    pub fn reset_best(&mut self) {
        self.core.best_state = None;
        self.core.keep_exploring = true;
        self.core.stats.times_best_state_was_updated = 0;
    }

    /// Returns the incumbent, if any.
    pub fn get_opt_solution(&self) -> Option<&S> {
        self.core.best_state.as_ref()
    }

    /// Returns the global lower bound.
    pub fn get_global_lower_bound(&self) -> f64 {
        self.core.global_lower
    }

    /// Returns the global upper bound.
    pub fn get_global_upper_bound(&self) -> f64 {
        self.core.global_upper
    }

    /// Returns the number of states explored.
    pub fn get_num_explored_states(&self) -> usize {
        self.core.stats.states_explored
    }

    /// Returns the statistics block.
    pub fn get_stats(&self) -> &TreeStats {
        &self.core.stats
    }

    /// Returns the name of the frontier strategy.
    pub fn strategy_name(&self) -> &'static str {
        self.frontier.name()
    }

    /// Prints the incumbent, or which initial bound stands in for it.
    pub fn print_opt_solution(&self) {
        match &self.core.best_state {
            Some(best) => {
                if self.core.stats.num_optimal_terminal_states > 0 {
                    println!("The best solution (found in the tree) is:");
                } else {
                    println!("The best solution (found heuristically) is:");
                }
                println!("{}", best);
            }
            None => match self.core.sense {
                Sense::Minimize => {
                    println!("The best solution is the initial global upper bound.")
                }
                Sense::Maximize => {
                    println!("The best solution is the initial global lower bound.")
                }
            },
        }
    }

    /// Prints the optimal value and the statistics block.
    pub fn print_tree_stats(&self) {
        match self.core.sense {
            Sense::Minimize => println!("The optimal value is: {:.2}", self.core.global_upper),
            Sense::Maximize => println!("The optimal value is: {:.2}", self.core.global_lower),
        }
        print!("{}", self.core.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::cmp::Ordering;
    use std::fmt;

    fn quiet() -> SearchOptions {
        SearchOptions {
            debug: 0,
            ..SearchOptions::default()
        }
    }

    // Toy 0/1 knapsack: items (weight, value), capacity 8, maximisation.
    // The optimum packs items 1 and 3 for a value of 10.
    const WEIGHTS: [i64; 4] = [2, 3, 4, 5];
    const VALUES: [i64; 4] = [3, 4, 5, 6];
    const CAPACITY: i64 = 8;

    #[derive(Clone)]
    struct Knapsack {
        level: usize,
        weight: i64,
        value: i64,
    }

    impl Knapsack {
        fn root() -> Self {
            Knapsack {
                level: 0,
                weight: 0,
                value: 0,
            }
        }

        fn bound_value(&self) -> i64 {
            self.value + VALUES[self.level..].iter().sum::<i64>()
        }

        fn child(&self, take: bool) -> Self {
            let mut next = self.clone();
            if take {
                next.weight += WEIGHTS[self.level];
                next.value += VALUES[self.level];
            }
            next.level += 1;
            next
        }
    }

    impl PartialEq for Knapsack {
        fn eq(&self, other: &Self) -> bool {
            self.bound_value() == other.bound_value()
        }
    }

    impl Eq for Knapsack {}

    impl Ord for Knapsack {
        fn cmp(&self, other: &Self) -> Ordering {
            self.bound_value().cmp(&other.bound_value())
        }
    }

    impl PartialOrd for Knapsack {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Knapsack {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "value {} at weight {}", self.value, self.weight)
        }
    }

    impl State for Knapsack {
        fn depth(&self) -> usize {
            self.level
        }

        fn objective(&self) -> f64 {
            self.value as f64
        }

        fn is_terminal(&self) -> bool {
            self.level == WEIGHTS.len()
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::new(self.value as f64, self.bound_value() as f64)
        }

        fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            search.process_state(self.child(false));
            if self.weight + WEIGHTS[self.level] <= CAPACITY {
                search.process_state(self.child(true));
            }
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn test_dfs_finds_knapsack_optimum() {
        let mut tree = SearchTree::depth_first(Sense::Maximize, true, quiet());

        assert!(tree.process_state(Knapsack::root(), true).unwrap());
        tree.explore().unwrap();

        assert_eq!(tree.get_opt_solution().unwrap().objective(), 10.0);
        assert_eq!(tree.get_global_lower_bound(), 10.0);
        assert!(tree.get_stats().times_best_state_was_updated >= 1);
        assert!(tree.get_num_explored_states() > 0);
    }

    #[test]
    fn test_histograms_sum_to_totals() {
        let mut tree = SearchTree::depth_first(Sense::Maximize, true, quiet());
        tree.process_state(Knapsack::root(), true).unwrap();
        tree.explore().unwrap();

        let stats = tree.get_stats();
        assert_eq!(
            stats.states_identified,
            stats.num_identified_at_level.iter().sum::<usize>()
        );
        assert_eq!(
            stats.states_explored,
            stats.num_explored_at_level.iter().sum::<usize>()
        );
        assert_eq!(
            stats.states_stored_in_tree,
            stats.num_stored_at_level.iter().sum::<usize>()
        );
    }

    #[test]
    fn test_bfs_finds_knapsack_optimum() {
        let mut tree = SearchTree::best_first(Sense::Maximize, true, quiet());
        tree.process_state(Knapsack::root(), true).unwrap();
        tree.explore().unwrap();

        assert_eq!(tree.get_opt_solution().unwrap().objective(), 10.0);
        assert!(!tree.get_stats().num_explored_at_level.is_empty());
    }

    #[test]
    fn test_all_strategies_agree_on_the_optimum() {
        let objectives: Vec<f64> = vec![
            {
                let mut tree = SearchTree::depth_first(Sense::Maximize, true, quiet());
                tree.process_state(Knapsack::root(), true).unwrap();
                tree.explore().unwrap();
                tree.get_opt_solution().unwrap().objective()
            },
            {
                let mut tree = SearchTree::breadth_first(Sense::Maximize, true, quiet());
                tree.process_state(Knapsack::root(), true).unwrap();
                tree.explore().unwrap();
                tree.get_opt_solution().unwrap().objective()
            },
            {
                let mut tree = SearchTree::best_first(Sense::Maximize, true, quiet());
                tree.process_state(Knapsack::root(), true).unwrap();
                tree.explore().unwrap();
                tree.get_opt_solution().unwrap().objective()
            },
            {
                let mut tree = SearchTree::cyclic_best_first(
                    Sense::Maximize,
                    true,
                    Selection::Standard,
                    1,
                    0,
                    quiet(),
                );
                tree.process_state(Knapsack::root(), true).unwrap();
                tree.explore().unwrap();
                tree.get_opt_solution().unwrap().objective()
            },
            {
                let mut tree = SearchTree::cyclic_best_first(
                    Sense::Maximize,
                    true,
                    Selection::RandomFromTopK,
                    2,
                    42,
                    quiet(),
                );
                tree.process_state(Knapsack::root(), true).unwrap();
                tree.explore().unwrap();
                tree.get_opt_solution().unwrap().objective()
            },
            {
                let mut tree = SearchTree::cyclic_best_first(
                    Sense::Maximize,
                    true,
                    Selection::KBestAtLevel,
                    2,
                    0,
                    quiet(),
                );
                tree.process_state(Knapsack::root(), true).unwrap();
                tree.explore().unwrap();
                tree.get_opt_solution().unwrap().objective()
            },
            {
                let mut tree = SearchTree::contour_best_first(Sense::Maximize, true, quiet());
                tree.process_state(Knapsack::root(), true).unwrap();
                tree.explore().unwrap();
                tree.get_opt_solution().unwrap().objective()
            },
        ];

        assert!(objectives.iter().all(|&objective| objective == 10.0));
    }

    #[test]
    fn test_node_limit_stops_the_search() {
        let options = SearchOptions {
            node_limit: 5,
            ..quiet()
        };
        let mut tree = SearchTree::breadth_first(Sense::Maximize, true, options);
        tree.process_state(Knapsack::root(), true).unwrap();
        tree.explore().unwrap();

        assert_eq!(tree.get_num_explored_states(), 5);
        assert!(tree.get_global_lower_bound() < tree.get_global_upper_bound());
    }

    #[test]
    fn test_reset_best_and_restart_reaches_the_same_objective() {
        let options = SearchOptions {
            stop_at_first_improvement: true,
            ..quiet()
        };
        let mut tree = SearchTree::depth_first(Sense::Maximize, true, options);
        tree.process_state(Knapsack::root(), true).unwrap();

        for _ in 0..64 {
            tree.explore().unwrap();
            if tree.get_stats().times_best_state_was_updated == 0 {
                break;
            }
            tree.reset_best();
        }

        assert_eq!(tree.get_global_lower_bound(), 10.0);
    }

    // Lattice walk: each level steps x by +/-1, objective is the final x.
    // Distinct paths meet at the same (level, x), so key-equal states are
    // true duplicates.
    #[derive(Clone)]
    struct Walk {
        level: usize,
        x: i64,
        horizon: usize,
    }

    impl Walk {
        fn root(horizon: usize) -> Self {
            Walk {
                level: 0,
                x: 0,
                horizon,
            }
        }

        fn step(&self, delta: i64) -> Self {
            Walk {
                level: self.level + 1,
                x: self.x + delta,
                horizon: self.horizon,
            }
        }

        fn remaining(&self) -> i64 {
            (self.horizon - self.level) as i64
        }
    }

    impl PartialEq for Walk {
        fn eq(&self, other: &Self) -> bool {
            self.x == other.x
        }
    }

    impl Eq for Walk {}

    impl Ord for Walk {
        fn cmp(&self, other: &Self) -> Ordering {
            self.x.cmp(&other.x)
        }
    }

    impl PartialOrd for Walk {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Walk {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "x {} at level {}", self.x, self.level)
        }
    }

    impl State for Walk {
        fn depth(&self) -> usize {
            self.level
        }

        fn objective(&self) -> f64 {
            self.x as f64
        }

        fn is_terminal(&self) -> bool {
            self.level == self.horizon
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::new(
                (self.x - self.remaining()) as f64,
                (self.x + self.remaining()) as f64,
            )
        }

        fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            search.process_state(self.step(1));
            search.process_state(self.step(-1));
            ControlFlow::Continue(())
        }

        fn dominance_key(&self) -> i64 {
            self.level as i64 * 1000 + self.x
        }

        fn assess_dominance(&self, _other: &Self) -> Option<Ordering> {
            // Key-equal walk states are identical.
            Some(Ordering::Equal)
        }
    }

    #[test]
    fn test_dominance_prunes_duplicates_without_changing_the_optimum() {
        let mut plain = SearchTree::breadth_first(Sense::Maximize, true, quiet());
        plain.process_state(Walk::root(4), true).unwrap();
        plain.explore().unwrap();

        let options = SearchOptions {
            use_dominance: true,
            ..quiet()
        };
        let mut dominated = SearchTree::breadth_first(Sense::Maximize, true, options);
        dominated.process_state(Walk::root(4), true).unwrap();
        dominated.explore().unwrap();

        assert_eq!(plain.get_global_lower_bound(), 4.0);
        assert_eq!(dominated.get_global_lower_bound(), 4.0);
        assert_eq!(plain.get_stats().pruned_by_dom_before_insertion, 0);
        assert!(dominated.get_stats().pruned_by_dom_before_insertion > 0);
        assert!(
            dominated.get_stats().states_stored_in_tree
                < plain.get_stats().states_stored_in_tree
        );
    }

    #[test]
    fn test_time_limit_stops_an_open_search() {
        let options = SearchOptions {
            time_limit: 0.05,
            ..quiet()
        };
        let mut tree = SearchTree::depth_first(Sense::Maximize, true, options);
        tree.process_state(Walk::root(26), true).unwrap();
        tree.explore().unwrap();

        assert!(tree.get_num_explored_states() > 0);
        assert!(tree.get_global_lower_bound() < tree.get_global_upper_bound());
    }

    // A state with caller-fixed bounds and objective; branches to nothing.
    #[derive(Clone)]
    struct Fixed {
        lower: f64,
        upper: f64,
        objective: f64,
    }

    impl PartialEq for Fixed {
        fn eq(&self, other: &Self) -> bool {
            self.objective == other.objective
        }
    }

    impl Eq for Fixed {}

    impl Ord for Fixed {
        fn cmp(&self, other: &Self) -> Ordering {
            self.objective
                .partial_cmp(&other.objective)
                .unwrap_or(Ordering::Equal)
        }
    }

    impl PartialOrd for Fixed {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Fixed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "objective {}", self.objective)
        }
    }

    impl State for Fixed {
        fn depth(&self) -> usize {
            0
        }

        fn objective(&self) -> f64 {
            self.objective
        }

        fn is_terminal(&self) -> bool {
            false
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::new(self.lower, self.upper)
        }

        fn branch(&self, _search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn test_gap_closed_at_root_skips_exploration() {
        let mut tree = SearchTree::depth_first(Sense::Minimize, true, quiet());
        let heuristic = Fixed {
            lower: 5.9,
            upper: 5.9,
            objective: 5.9,
        };
        tree.process_heuristic_state(heuristic).unwrap();
        assert_eq!(tree.get_global_upper_bound(), 5.9);

        let root = Fixed {
            lower: 5.0,
            upper: 5.9,
            objective: 5.9,
        };
        let kept = tree.process_state(root, true).unwrap();
        tree.explore().unwrap();

        assert!(!kept);
        assert_eq!(tree.get_num_explored_states(), 0);
        assert_eq!(tree.get_global_lower_bound(), 5.0);
        assert_eq!(tree.get_opt_solution().unwrap().objective(), 5.9);
    }

    #[test]
    fn test_save_non_terminal_accepts_partial_objectives() {
        let options = SearchOptions {
            save_non_terminal: true,
            ..quiet()
        };
        let mut tree = SearchTree::depth_first(Sense::Maximize, false, options);
        let root = Fixed {
            lower: 0.0,
            upper: 10.0,
            objective: 5.0,
        };
        tree.process_state(root, true).unwrap();
        tree.explore().unwrap();

        assert_eq!(tree.get_global_lower_bound(), 5.0);
        assert_eq!(tree.get_opt_solution().unwrap().objective(), 5.0);
        assert_eq!(tree.get_stats().times_best_state_was_updated, 1);
    }

    #[test]
    fn test_attempt_heuristic_completion_compares_against_the_slack_bound() {
        let mut tree = SearchTree::depth_first(Sense::Maximize, false, quiet());
        tree.process_heuristic_state(Fixed {
            lower: 7.0,
            upper: 7.0,
            objective: 7.0,
        })
        .unwrap();

        assert!(tree.attempt_heuristic_completion(Bounds::new(0.0, 8.0)));
        assert!(!tree.attempt_heuristic_completion(Bounds::new(0.0, 7.0)));
    }

    #[test]
    fn test_heuristic_state_updates_the_incumbent() {
        let mut tree = SearchTree::depth_first(Sense::Minimize, false, quiet());
        tree.process_heuristic_state(Fixed {
            lower: 3.0,
            upper: 3.0,
            objective: 3.0,
        })
        .unwrap();

        assert_eq!(tree.get_global_upper_bound(), 3.0);
        assert_eq!(tree.get_stats().heuristic_states_processed, 1);
        assert_eq!(tree.get_stats().num_optimal_heuristic_states, 1);
        assert_eq!(tree.get_opt_solution().unwrap().objective(), 3.0);
    }

    // Root whose two children are terminals with the same objective.
    #[derive(Clone, PartialEq, Eq)]
    struct Twin {
        level: usize,
    }

    impl Ord for Twin {
        fn cmp(&self, _other: &Self) -> Ordering {
            Ordering::Equal
        }
    }

    impl PartialOrd for Twin {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Twin {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "twin at level {}", self.level)
        }
    }

    impl State for Twin {
        fn depth(&self) -> usize {
            self.level
        }

        fn objective(&self) -> f64 {
            7.0
        }

        fn is_terminal(&self) -> bool {
            self.level == 1
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::new(0.0, 7.0)
        }

        fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            search.process_state(Twin { level: 1 });
            search.process_state(Twin { level: 1 });
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn test_tie_updates_count_optima_but_keep_the_first_incumbent() {
        let mut tree = SearchTree::depth_first(Sense::Maximize, false, quiet());
        tree.process_state(Twin { level: 0 }, true).unwrap();
        tree.explore().unwrap();

        let stats = tree.get_stats();
        assert_eq!(stats.num_optimal_terminal_states, 2);
        assert_eq!(stats.times_best_state_was_updated, 1);
    }

    #[test]
    fn test_find_all_solutions_updates_on_ties() {
        let options = SearchOptions {
            find_all_solutions: true,
            ..quiet()
        };
        let mut tree = SearchTree::depth_first(Sense::Maximize, false, options);
        tree.process_state(Twin { level: 0 }, true).unwrap();
        tree.explore().unwrap();

        let stats = tree.get_stats();
        assert_eq!(stats.num_optimal_terminal_states, 2);
        assert_eq!(stats.times_best_state_was_updated, 2);
    }

    // Root with a lower bound above the terminal its branch produces, so
    // tightening the upper bound trips the consistency check.
    #[derive(Clone, PartialEq, Eq)]
    struct Trap {
        level: usize,
    }

    impl Ord for Trap {
        fn cmp(&self, _other: &Self) -> Ordering {
            Ordering::Equal
        }
    }

    impl PartialOrd for Trap {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Trap {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "trap at level {}", self.level)
        }
    }

    impl State for Trap {
        fn depth(&self) -> usize {
            self.level
        }

        fn objective(&self) -> f64 {
            5.0
        }

        fn is_terminal(&self) -> bool {
            self.level == 1
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::new(10.0, 20.0)
        }

        fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            search.process_state(Trap { level: 1 });
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn test_bound_inconsistency_is_fatal() {
        let mut tree = SearchTree::depth_first(Sense::Minimize, false, quiet());
        tree.process_state(Trap { level: 0 }, true).unwrap();

        let error = tree.explore().unwrap_err();

        assert!(matches!(
            error,
            SearchError::BoundInconsistency { lower, upper }
                if lower == 10.0 && upper == 5.0
        ));
    }

    // Root fans out three children, one of which defers its expansion.
    #[derive(Clone)]
    struct Deferred {
        tag: char,
        level: usize,
        defer_until: usize,
        log: Rc<RefCell<Vec<char>>>,
    }

    impl PartialEq for Deferred {
        fn eq(&self, other: &Self) -> bool {
            self.tag == other.tag
        }
    }

    impl Eq for Deferred {}

    impl Ord for Deferred {
        fn cmp(&self, other: &Self) -> Ordering {
            self.tag.cmp(&other.tag)
        }
    }

    impl PartialOrd for Deferred {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Deferred {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.tag)
        }
    }

    impl State for Deferred {
        fn depth(&self) -> usize {
            self.level
        }

        fn objective(&self) -> f64 {
            0.0
        }

        fn is_terminal(&self) -> bool {
            false
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::UNBOUNDED
        }

        fn time_to_explore(&self) -> usize {
            self.defer_until
        }

        fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            self.log.borrow_mut().push(self.tag);
            if self.level == 0 {
                for (tag, defer_until) in [('A', 3), ('B', 0), ('C', 0)] {
                    search.process_state(Deferred {
                        tag,
                        level: 1,
                        defer_until,
                        log: self.log.clone(),
                    });
                }
            }
            ControlFlow::Continue(())
        }
    }

    #[test]
    fn test_deferred_state_is_requeued_until_its_threshold() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tree = SearchTree::breadth_first(Sense::Maximize, false, quiet());
        tree.process_state(
            Deferred {
                tag: 'R',
                level: 0,
                defer_until: 0,
                log: log.clone(),
            },
            true,
        )
        .unwrap();
        tree.explore().unwrap();

        assert_eq!(*log.borrow(), vec!['R', 'B', 'C', 'A']);
        assert_eq!(tree.get_num_explored_states(), 4);
    }

    // Root whose child aborts the search from inside branch.
    #[derive(Clone, PartialEq, Eq)]
    struct Aborting {
        level: usize,
    }

    impl Ord for Aborting {
        fn cmp(&self, _other: &Self) -> Ordering {
            Ordering::Equal
        }
    }

    impl PartialOrd for Aborting {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl fmt::Display for Aborting {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "aborting at level {}", self.level)
        }
    }

    impl State for Aborting {
        fn depth(&self) -> usize {
            self.level
        }

        fn objective(&self) -> f64 {
            0.0
        }

        fn is_terminal(&self) -> bool {
            false
        }

        fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
            Bounds::UNBOUNDED
        }

        fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()> {
            if self.level == 0 {
                search.process_state(Aborting { level: 1 });
                search.process_state(Aborting { level: 1 });
                return ControlFlow::Continue(());
            }
            ControlFlow::Break(())
        }
    }

    #[test]
    fn test_branch_abort_stops_the_search_cleanly() {
        let mut tree = SearchTree::depth_first(Sense::Maximize, false, quiet());
        tree.process_state(Aborting { level: 0 }, true).unwrap();

        tree.explore().unwrap();

        // Root and the first aborting child; the sibling stays unexplored.
        assert_eq!(tree.get_num_explored_states(), 2);
    }

    #[test]
    fn test_trace_records_contiguous_ids() {
        let path = std::env::temp_dir().join(format!(
            "bnbtree-engine-trace-{}.tlp",
            std::process::id()
        ));
        {
            let mut tree = SearchTree::depth_first(Sense::Maximize, true, quiet());
            tree.set_trace_output(&path, "knapsack", 7, true).unwrap();
            tree.process_state(Knapsack::root(), true).unwrap();
            tree.explore().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(contents.starts_with("(tlp \"2.3\"\n"));
        assert!(contents.trim_end().ends_with(')'));

        let ids: Vec<usize> = contents
            .lines()
            .filter_map(|line| line.strip_prefix("(nodes "))
            .map(|rest| rest.trim_end_matches(')').parse().unwrap())
            .collect();
        assert!(!ids.is_empty());
        assert_eq!(ids, (0..ids.len()).collect::<Vec<_>>());
    }
}
