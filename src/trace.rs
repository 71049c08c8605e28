use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{SearchError, SearchResult};
use crate::node::NodeId;

/// Writes the search tree as a Tulip 2.3 graph stream for an external
/// viewer: one node record per ingested state, one edge per parent relation,
/// colour updates on lifecycle transitions, and a visible label when a state
/// is popped for exploration.
///
/// Only the open can fail; later writes are a diagnostic stream and errors
/// on them are ignored.
#[derive(Debug)]
pub struct TraceWriter {
    out: BufWriter<File>,
    next_edge_id: usize,
    explored_labels: usize,
}

impl TraceWriter {
    /// Opens the trace file and writes the graph header.
    pub fn open(path: &Path, instance: &str, seed: i64, deep: bool) -> SearchResult<Self> {
        let file = File::create(path).map_err(|source| SearchError::TraceOutput {
            path: path.to_path_buf(),
            source,
        })?;
        let mut out = BufWriter::new(file);

        let style = if deep { "Deep" } else { "Wide" };
        let _ = writeln!(out, "(tlp \"2.3\"");
        let _ = writeln!(
            out,
            "(comments \"{} branch-and-bound tree for {}; seed {}.\")",
            style, instance, seed
        );
        let _ = writeln!(
            out,
            "(property 0 color \"viewColor\" (default \"(0,0,0,255)\" \"(0,0,0,255)\"))"
        );
        let _ = writeln!(out, "(property 0 string \"viewLabel\" (default \"0\" \"0\"))");
        let _ = writeln!(
            out,
            "(property 0 color \"viewLabelColor\" (default \"(255,255,255,255)\" \"(0,0,0,255)\"))"
        );
        let _ = writeln!(out, "(property 0 int \"viewShape\" (default \"14\" \"4\"))");

        Ok(Self {
            out,
            next_edge_id: 0,
            explored_labels: 0,
        })
    }

    /// Records an ingested state and, when it has a parent, the tree edge.
    pub fn record_node(&mut self, id: NodeId, parent: Option<NodeId>) {
        let _ = writeln!(self.out, "(nodes {})", id);
        if let Some(parent) = parent {
            let _ = writeln!(self.out, "(edge {} {} {})", self.next_edge_id, id, parent);
            self.next_edge_id += 1;
        }
    }

    /// Labels a state with the running exploration count.
    pub fn mark_explored(&mut self, id: NodeId) {
        let _ = writeln!(
            self.out,
            "(property 0 string \"viewLabel\" (node {} \"{}\"))",
            id, self.explored_labels
        );
        self.explored_labels += 1;
    }

    /// Colours a state magenta: pruned by dominance.
    pub fn mark_pruned_by_dominance(&mut self, id: NodeId) {
        self.write_color(id, "(255, 0, 255, 255)");
    }

    /// Colours a state red: pruned by bounds.
    pub fn mark_pruned_by_bounds(&mut self, id: NodeId) {
        self.write_color(id, "(255, 0, 0, 255)");
    }

    /// Colours a state green: terminal.
    pub fn mark_terminal(&mut self, id: NodeId) {
        self.write_color(id, "(0, 255, 0, 255)");
    }

    fn write_color(&mut self, id: NodeId, rgba: &str) {
        let _ = writeln!(
            self.out,
            "(property 0 color \"viewColor\" (node {} \"{}\"))",
            id, rgba
        );
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        let _ = writeln!(self.out, ")");
        let _ = self.out.flush();
    }
}
