use std::cmp::Ordering;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::node::Node;
use crate::state::State;

/// Maps a dominance class key to the states stored under it.
///
/// Two states are compared only when their keys are equal, so the key
/// partitions the comparison space and each scan runs over one, typically
/// small, equivalence class. When the engine retains states, the index also
/// owns them until teardown; dominated members are never removed eagerly,
/// only flagged and filtered lazily wherever they are encountered.
pub struct DominanceIndex<S> {
    classes: FxHashMap<i64, SmallVec<[Rc<Node<S>>; 1]>>,
}

impl<S> Default for DominanceIndex<S> {
    fn default() -> Self {
        Self {
            classes: FxHashMap::default(),
        }
    }
}

impl<S: State> DominanceIndex<S> {
    /// Compares a candidate against every live state in its class.
    ///
    /// Stored states the candidate dominates are flagged; if the candidate
    /// is itself dominated, it is flagged, the scan stops, and `true` is
    /// returned.
    pub fn assess(&self, candidate: &Node<S>) -> bool {
        let Some(class) = self.classes.get(&candidate.dominance_key()) else {
            return false;
        };

        for stored in class {
            if stored.is_dominated() {
                continue;
            }
            match candidate.state().assess_dominance(stored.state()) {
                Some(Ordering::Greater) => stored.mark_dominated(),
                Some(Ordering::Less) | Some(Ordering::Equal) => {
                    candidate.mark_dominated();
                    return true;
                }
                None => {}
            }
        }

        false
    }

    /// Stores a node under its class key, creating the class if absent.
    pub fn insert(&mut self, node: Rc<Node<S>>) {
        self.classes
            .entry(node.dominance_key())
            .or_default()
            .push(node);
    }

    /// Returns the number of states stored under the given class key.
    pub fn class_len(&self, key: i64) -> usize {
        self.classes.get(&key).map_or(0, |class| class.len())
    }
}
