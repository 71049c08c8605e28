use std::cmp::Ordering;
use std::fmt::Display;
use std::ops::ControlFlow;

use crate::engine::Expander;

/// Absolute tolerance for all objective and bound comparisons.
pub const EPSILON: f64 = 1e-5;

/// Direction of optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    /// The goal is to minimise the objective.
    Minimize = 0,
    /// The goal is to maximise the objective.
    Maximize = 1,
}

/// A closed interval of objective values.
///
/// Also serves as the read-only view of the engine's global bounds handed to
/// user code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Lower end of the interval.
    pub lower: f64,
    /// Upper end of the interval.
    pub upper: f64,
}

impl Bounds {
    /// The interval (-inf, +inf), carried by every state until its bounds
    /// are computed.
    pub const UNBOUNDED: Bounds = Bounds {
        lower: f64::NEG_INFINITY,
        upper: f64::INFINITY,
    };

    /// Creates an interval from its two ends.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// Trait for states in a branch-and-bound tree.
///
/// A state is a node of the search tree: the root is seeded by the user, and
/// every other state is constructed inside [`State::branch`] and handed to
/// the engine through the [`Expander`]. The `Ord` supertrait is the state's
/// priority: frontiers that prioritise pop the *greatest* state first.
///
/// # Examples
///
/// ```
/// use bnbtree::prelude::*;
/// use fixedbitset::FixedBitSet;
/// use std::cmp::Ordering;
/// use std::fmt;
/// use std::ops::ControlFlow;
///
/// const WEIGHTS: [i64; 4] = [2, 3, 4, 5];
/// const VALUES: [i64; 4] = [3, 4, 5, 6];
/// const CAPACITY: i64 = 8;
///
/// #[derive(Clone)]
/// struct Packing {
///     chosen: FixedBitSet,
///     level: usize,
///     weight: i64,
///     value: i64,
/// }
///
/// impl Packing {
///     fn root() -> Self {
///         Packing {
///             chosen: FixedBitSet::with_capacity(WEIGHTS.len()),
///             level: 0,
///             weight: 0,
///             value: 0,
///         }
///     }
///
///     fn child(&self, take: bool) -> Self {
///         let mut next = self.clone();
///         if take {
///             next.chosen.insert(self.level);
///             next.weight += WEIGHTS[self.level];
///             next.value += VALUES[self.level];
///         }
///         next.level += 1;
///         next
///     }
/// }
///
/// impl State for Packing {
///     fn depth(&self) -> usize {
///         self.level
///     }
///
///     fn objective(&self) -> f64 {
///         self.value as f64
///     }
///
///     fn is_terminal(&self) -> bool {
///         self.level == WEIGHTS.len()
///     }
///
///     fn compute_bounds(&mut self, _global: Bounds) -> Bounds {
///         let optimistic: i64 = (self.level..WEIGHTS.len()).map(|i| VALUES[i]).sum();
///         Bounds::new(self.value as f64, (self.value + optimistic) as f64)
///     }
///
///     fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()> {
///         search.process_state(self.child(false));
///         if self.weight + WEIGHTS[self.level] <= CAPACITY {
///             search.process_state(self.child(true));
///         }
///         ControlFlow::Continue(())
///     }
/// }
///
/// impl PartialEq for Packing {
///     fn eq(&self, other: &Self) -> bool {
///         self.value == other.value
///     }
/// }
///
/// impl Eq for Packing {}
///
/// impl Ord for Packing {
///     fn cmp(&self, other: &Self) -> Ordering {
///         self.value.cmp(&other.value)
///     }
/// }
///
/// impl PartialOrd for Packing {
///     fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
///         Some(self.cmp(other))
///     }
/// }
///
/// impl fmt::Display for Packing {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         write!(f, "value {} at weight {}", self.value, self.weight)
///     }
/// }
///
/// let mut root = Packing::root();
/// assert!(!root.is_terminal());
/// let bounds = root.compute_bounds(Bounds::UNBOUNDED);
/// assert_eq!(bounds.lower, 0.0);
/// assert_eq!(bounds.upper, 18.0);
///
/// let options = SearchOptions {
///     debug: 0,
///     ..SearchOptions::default()
/// };
/// let mut tree = SearchTree::depth_first(Sense::Maximize, true, options);
/// tree.process_state(root, true).unwrap();
/// tree.explore().unwrap();
/// assert_eq!(tree.get_opt_solution().unwrap().objective(), 10.0);
/// ```
pub trait State: Clone + Ord + Display + Sized {
    /// Returns the depth of the state in the tree. The root is 0 and
    /// children are conventionally one deeper than their parent, but the
    /// engine trusts whatever value the state reports.
    fn depth(&self) -> usize;

    /// Returns the objective value of the state, meaningful whenever the
    /// state represents a feasible candidate.
    fn objective(&self) -> f64;

    /// Returns whether the state is a complete feasible solution.
    fn is_terminal(&self) -> bool;

    /// Computes the state's own lower and upper bounds, given the current
    /// global bounds.
    ///
    /// Not called when the engine is configured with
    /// `state_computes_bounds`; in that mode bounds travel through
    /// [`Expander::process_state_with_bounds`].
    fn compute_bounds(&mut self, global: Bounds) -> Bounds;

    /// Constructs the children of the state and hands each to
    /// [`Expander::process_state`].
    ///
    /// Returning `ControlFlow::Break(())` aborts the search cleanly after
    /// this call returns.
    fn branch(&self, search: &mut Expander<'_, Self>) -> ControlFlow<()>;

    /// Returns the state's dominance class key. Two states may dominate one
    /// another only if their keys are equal.
    fn dominance_key(&self) -> i64 {
        1
    }

    /// A deferral threshold: a state popped from the frontier while fewer
    /// states than this have been explored is re-queued instead of expanded.
    fn time_to_explore(&self) -> usize {
        0
    }

    /// Compares two states of the same dominance class.
    ///
    /// `Some(Ordering::Greater)` means `self` dominates `other`;
    /// `Some(Ordering::Less)` or `Some(Ordering::Equal)` means `other` is at
    /// least as good, so `self` is dominated; `None` means the states are
    /// incomparable.
    fn assess_dominance(&self, _other: &Self) -> Option<Ordering> {
        None
    }

    /// A more expensive pruning test, run only when the engine is configured
    /// with `use_final_tests` and the cheap tests failed to prune.
    ///
    /// Returns tightened bounds for the state, or `None` to leave them
    /// unchanged.
    fn apply_final_pruning_tests(&self, _global: Bounds, _current: Bounds) -> Option<Bounds> {
        None
    }
}
