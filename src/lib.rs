mod dominance;
mod engine;
mod error;
pub mod frontier;
mod node;
mod state;
mod stats;
mod timer;
mod trace;

pub use dominance::DominanceIndex;
pub use engine::{Expander, SearchOptions, SearchTree};
pub use error::{SearchError, SearchResult};
pub use node::{Node, NodeId};
pub use state::{Bounds, Sense, State, EPSILON};
pub use stats::{ProgressRecord, TreeStats};
pub use timer::Timer;
pub use trace::TraceWriter;

pub mod prelude {
    pub use super::frontier::{Frontier, Selection};
    pub use super::{Bounds, Expander, SearchOptions, SearchTree, Sense, State};
}
