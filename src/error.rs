//! Error types for the search engine.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised by the search engine.
///
/// Normal terminations (empty frontier, node or time limit, a gap closed at
/// the root, a user abort raised from `branch`) are not errors; they are
/// reported through the engine's statistics and final printout.
#[derive(Error, Debug)]
pub enum SearchError {
    /// An incumbent update left the global upper bound below the global
    /// lower bound.
    #[error("global upper bound {upper} is less than global lower bound {lower}")]
    BoundInconsistency {
        /// Global lower bound at the time of the update.
        lower: f64,
        /// Global upper bound at the time of the update.
        upper: f64,
    },

    /// The trace output file could not be opened.
    #[error("could not open trace file {path:?} for writing")]
    TraceOutput {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for engine operations.
pub type SearchResult<T> = Result<T, SearchError>;
