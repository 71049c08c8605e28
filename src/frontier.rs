//! Frontier strategies for the search driver.

mod best_first;
mod breadth_first;
mod contour_best_first;
mod cyclic_best_first;
mod depth_first;

pub use best_first::BestFirst;
pub use breadth_first::BreadthFirst;
pub use contour_best_first::ContourBestFirst;
pub use cyclic_best_first::{CyclicBestFirst, Selection};
pub use depth_first::DepthFirst;

use std::rc::Rc;

use crate::node::Node;
use crate::state::State;
use crate::stats::TreeStats;

/// The collection of states waiting to be explored.
///
/// Strategies only decide the exploration order; ingestion, pruning, and
/// bookkeeping live in the driver. Every implementation filters dominated
/// states lazily on pop, counting each discard into
/// `pruned_by_dom_before_exploration`.
pub trait Frontier<S: State> {
    /// Short name of the strategy, for reports.
    fn name(&self) -> &'static str;

    /// Returns whether no states are waiting.
    fn is_empty(&self) -> bool;

    /// Saves a state for later exploration.
    fn push(&mut self, node: Rc<Node<S>>);

    /// Pops the next state to expand, discarding dominated states until a
    /// live one is found or the frontier empties.
    fn pop_next(&mut self, stats: &mut TreeStats) -> Option<Rc<Node<S>>>;
}
