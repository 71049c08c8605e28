use std::fmt;
use std::time::Duration;

/// Counters and per-level histograms maintained by the search driver.
///
/// Every field is observable; the driver is the only writer. The per-level
/// histograms grow on demand and always sum to their companion totals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeStats {
    /// States ingested through `process_state`.
    pub states_identified: usize,
    /// States branched on.
    pub states_explored: usize,
    /// States stored into the frontier.
    pub states_stored_in_tree: usize,
    /// Terminal states ingested from the tree.
    pub terminal_states_identified: usize,
    /// Complete solutions fed from outside the tree.
    pub heuristic_states_processed: usize,

    /// Pruned by bounds during ingestion.
    pub pruned_by_bounds_before_insertion: usize,
    /// Pruned by bounds after being popped for exploration.
    pub pruned_by_bounds_before_exploration: usize,
    /// Pruned by dominance during ingestion.
    pub pruned_by_dom_before_insertion: usize,
    /// Pruned by dominance after being popped (or skipped on pop).
    pub pruned_by_dom_before_exploration: usize,

    /// Incumbent updates, counting ties accepted under `find_all_solutions`.
    pub times_best_state_was_updated: usize,
    /// Snapshot of `states_identified` at the last strict improvement.
    pub states_identified_at_last_update: usize,
    /// Snapshot of `states_explored` at the last strict improvement.
    pub states_explored_at_last_update: usize,
    /// Snapshot of `states_stored_in_tree` at the last strict improvement.
    pub states_stored_at_last_update: usize,

    /// Terminal states matching the best objective within tolerance.
    pub num_optimal_terminal_states: usize,
    /// Heuristic solutions matching the best objective within tolerance.
    pub num_optimal_heuristic_states: usize,

    /// Wall time spent inside the explore loop.
    pub total_time: Duration,
    /// Value of `total_time` when the incumbent last changed.
    pub time_to_opt: Duration,

    /// States identified per depth.
    pub num_identified_at_level: Vec<usize>,
    /// States explored per depth.
    pub num_explored_at_level: Vec<usize>,
    /// States stored per depth.
    pub num_stored_at_level: Vec<usize>,
}

fn bump(levels: &mut Vec<usize>, depth: usize) {
    if depth >= levels.len() {
        levels.resize(depth + 1, 0);
    }
    levels[depth] += 1;
}

impl TreeStats {
    /// Counts a state ingested at the given depth.
    pub fn record_identified(&mut self, depth: usize) {
        bump(&mut self.num_identified_at_level, depth);
        self.states_identified += 1;
    }

    /// Counts a state branched on at the given depth.
    pub fn record_explored(&mut self, depth: usize) {
        bump(&mut self.num_explored_at_level, depth);
        self.states_explored += 1;
    }

    /// Counts a state stored into the frontier at the given depth.
    pub fn record_stored(&mut self, depth: usize) {
        bump(&mut self.num_stored_at_level, depth);
        self.states_stored_in_tree += 1;
    }

    /// Snapshots the identification counters for a strict incumbent
    /// improvement.
    pub fn record_improvement(&mut self) {
        self.times_best_state_was_updated += 1;
        self.states_identified_at_last_update = self.states_identified;
        self.states_stored_at_last_update = self.states_stored_in_tree;
        self.states_explored_at_last_update = self.states_explored;
    }
}

fn write_level_histogram(f: &mut fmt::Formatter<'_>, levels: &[usize]) -> fmt::Result {
    write!(f, "{{{}", levels[0])?;
    let mut zero_run = 0;
    for &count in &levels[1..] {
        if count == 0 {
            zero_run += 1;
            continue;
        }
        if zero_run > 0 {
            write!(f, ", <{} empty levels>", zero_run)?;
            zero_run = 0;
        }
        write!(f, ", {}", count)?;
    }
    writeln!(f, "}};")
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Search statistics:\n------------------")?;
        writeln!(f, "{} states were identified", self.states_identified)?;
        writeln!(f, "{} states were explored", self.states_explored)?;
        writeln!(f, "{} states were stored in the tree", self.states_stored_in_tree)?;
        writeln!(
            f,
            "{} terminal states were identified",
            self.terminal_states_identified
        )?;
        writeln!(
            f,
            "{} heuristic states were processed",
            self.heuristic_states_processed
        )?;
        writeln!(
            f,
            "{} updates of the best state performed\n",
            self.times_best_state_was_updated
        )?;
        writeln!(f, "Bounds statistics:\n------------------")?;
        writeln!(
            f,
            "{} states were pruned by bounds before insertion",
            self.pruned_by_bounds_before_insertion
        )?;
        writeln!(
            f,
            "{} states were pruned by bounds before exploration\n",
            self.pruned_by_bounds_before_exploration
        )?;
        writeln!(f, "Dominance statistics:\n---------------------")?;
        writeln!(
            f,
            "{} states were pruned by dominance rules before insertion",
            self.pruned_by_dom_before_insertion
        )?;
        writeln!(
            f,
            "{} states were pruned by dominance rules before exploration\n",
            self.pruned_by_dom_before_exploration
        )?;
        writeln!(f, "Optimality statistics:\n----------------------")?;
        writeln!(
            f,
            "{} optimal terminal states found",
            self.num_optimal_terminal_states
        )?;
        writeln!(
            f,
            "{} optimal heuristic solutions processed\n",
            self.num_optimal_heuristic_states
        )?;
        writeln!(
            f,
            "{} states were identified when the optimal solution was found",
            self.states_identified_at_last_update
        )?;
        writeln!(
            f,
            "{} states had been stored in the tree when the optimal solution was found",
            self.states_stored_at_last_update
        )?;
        writeln!(
            f,
            "{} states were explored when the optimal solution was found",
            self.states_explored_at_last_update
        )?;
        writeln!(
            f,
            "{} = {} - {} states remained in tree when optimal solution was found\n",
            self.states_stored_at_last_update
                .saturating_sub(self.states_explored_at_last_update),
            self.states_stored_at_last_update,
            self.states_explored_at_last_update
        )?;

        if !self.num_identified_at_level.is_empty() {
            writeln!(f, "Identified states at level:")?;
            write_level_histogram(f, &self.num_identified_at_level)?;
        }
        if !self.num_explored_at_level.is_empty() {
            writeln!(f, "Explored states at level:")?;
            write_level_histogram(f, &self.num_explored_at_level)?;
        }
        if !self.num_stored_at_level.is_empty() {
            writeln!(f, "Stored states at level:")?;
            write_level_histogram(f, &self.num_stored_at_level)?;
        }
        Ok(())
    }
}

/// One line of progress, emitted every `output_rate` explored states and on
/// incumbent updates.
#[derive(Clone, Copy, Debug)]
pub struct ProgressRecord {
    /// Whether this record announces a new incumbent.
    pub new_incumbent: bool,
    /// States explored so far.
    pub explored: usize,
    /// States stored so far.
    pub stored: usize,
    /// Global lower bound.
    pub lower: f64,
    /// Global upper bound.
    pub upper: f64,
    /// Wall time elapsed.
    pub elapsed: Duration,
    /// Wall time at which the incumbent last changed.
    pub time_to_opt: Duration,
}

impl fmt::Display for ProgressRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.new_incumbent { "*" } else { " " };
        write!(
            f,
            "{} Explored {:>10}/{} states: ",
            marker, self.explored, self.stored
        )?;
        if self.lower.is_finite() {
            write!(f, "< {:>10.2} ", self.lower)?;
        } else {
            write!(f, "<       -Inf ")?;
        }
        if self.upper.is_finite() {
            write!(f, "| {:>10.2} >", self.upper)?;
        } else {
            write!(f, "|        Inf >")?;
        }
        write!(
            f,
            " ({:6.2}s) (TTB {:6.2}s)",
            self.elapsed.as_secs_f64(),
            self.time_to_opt.as_secs_f64()
        )
    }
}
