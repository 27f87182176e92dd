//! Blow-up tree description.
//!
//! A resolution run records its chart hierarchy as a plain-text edge
//! list, one covering relation per line in the form `a--b;`. The graph
//! is a forest rooted at chart `1`; its leaves are the charts that carry
//! intersection lattices and contribute terms to the integral.
//!
//! ## File format
//!
//! The file is named [`EDGE_FILE`] and sits in the resolution output
//! directory. Blank lines are ignored and lines without the `--`
//! separator are skipped rather than rejected, since resolution scripts
//! interleave comments with the relation rows. A leaf that was blown up
//! further ships a nested file `Edges<k>` whose subtree is grafted in
//! under dotted compound labels `k.<child>`.

use std::collections::BTreeSet;
use std::fs;

use regex_lite::Regex;
use thiserror::Error;
use tracing::debug;

use crate::types::ChartId;

/// File name of the edge list inside a resolution directory.
pub const EDGE_FILE: &str = "Edges";

/// Failure reading the blow-up tree description.
#[derive(Debug, Error)]
pub enum EdgeError {
    /// The edge file could not be read.
    #[error("cannot read edge file `{path}`")]
    Io {
        /// Path that failed to open.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

/// Path of the edge file for `directory`, or of the nested edge file for
/// subtree `vertex` when one is given.
pub fn edge_path(directory: &str, vertex: Option<u64>) -> String {
    let sep = if directory.ends_with('/') { "" } else { "/" };
    match vertex {
        Some(k) => format!("{directory}{sep}{EDGE_FILE}{k}"),
        None => format!("{directory}{sep}{EDGE_FILE}"),
    }
}

/// Extracts `(parent, child)` pairs from edge-list text.
///
/// Accepts lines of the form `a--b;` with arbitrary interior whitespace.
/// Anything else, including blank lines, is skipped.
pub fn parse_edges(text: &str) -> Vec<(u64, u64)> {
    let Ok(line) = Regex::new(r"^\s*(\d+)\s*--\s*(\d+)\s*;") else {
        return Vec::new();
    };
    let mut pairs = Vec::new();
    for raw in text.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        let Some(caps) = line.captures(raw) else {
            debug!(line = raw.trim(), "skipping non-edge line");
            continue;
        };
        let (Ok(parent), Ok(child)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) else {
            debug!(line = raw.trim(), "skipping edge with oversized label");
            continue;
        };
        pairs.push((parent, child));
    }
    pairs
}

/// The directed forest of blow-up charts.
///
/// Edges run from a chart to the charts produced by blowing it up.
/// Chart `1` is always the root, whether or not it appears in the edge
/// list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeGraph {
    edges: Vec<(ChartId, ChartId)>,
}

impl EdgeGraph {
    /// Builds a graph from explicit id pairs.
    pub fn new(edges: Vec<(ChartId, ChartId)>) -> Self {
        EdgeGraph { edges }
    }

    /// Parses edge-list text into a graph over numbered chart ids.
    pub fn parse(text: &str) -> Self {
        let edges = parse_edges(text)
            .into_iter()
            .map(|(a, b)| (ChartId::from_number(a), ChartId::from_number(b)))
            .collect();
        EdgeGraph { edges }
    }

    /// Reads and parses `<directory>/Edges`.
    pub fn from_directory(directory: &str) -> Result<Self, EdgeError> {
        let path = edge_path(directory, None);
        let text = fs::read_to_string(&path).map_err(|source| EdgeError::Io {
            path: path.clone(),
            source,
        })?;
        let graph = EdgeGraph::parse(&text);
        debug!(path = %path, edges = graph.edges.len(), "parsed edge file");
        Ok(graph)
    }

    /// The `(parent, child)` pairs in file order.
    pub fn edges(&self) -> &[(ChartId, ChartId)] {
        &self.edges
    }

    /// Whether the graph has no edges at all.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of distinct charts: every child plus the root, which need
    /// not appear as a child itself.
    pub fn total_charts(&self) -> usize {
        let root = ChartId::root();
        let mut seen: BTreeSet<&ChartId> = self.edges.iter().map(|(_, child)| child).collect();
        seen.insert(&root);
        seen.len()
    }

    /// Charts that were never blown up further, in order of first
    /// appearance in the edge list.
    pub fn leaves(&self) -> Vec<ChartId> {
        let parents: BTreeSet<&ChartId> = self.edges.iter().map(|(parent, _)| parent).collect();
        let mut leaves = Vec::new();
        for (parent, child) in &self.edges {
            for vertex in [parent, child] {
                if !parents.contains(vertex) && !leaves.contains(vertex) {
                    leaves.push(vertex.clone());
                }
            }
        }
        leaves
    }

    /// Splices a nested subtree under `vertex`. The subtree's root label
    /// `1` becomes `vertex` itself; every other label `j` becomes the
    /// compound id `vertex.j`.
    pub fn graft(&mut self, vertex: &ChartId, subtree: &EdgeGraph) {
        let relabel = |id: &ChartId| match id.as_str().parse::<u64>() {
            Ok(1) => vertex.clone(),
            Ok(n) => vertex.compound(n),
            Err(_) => ChartId::new(format!("{vertex}.{id}")),
        };
        for (parent, child) in subtree.edges() {
            self.edges.push((relabel(parent), relabel(child)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(label: &str) -> ChartId {
        ChartId::new(label)
    }

    #[test]
    fn test_parse_accepts_edge_lines() {
        assert_eq!(parse_edges("1--2;\n1--3;\n"), vec![(1, 2), (1, 3)]);
    }

    #[test]
    fn test_parse_tolerates_interior_whitespace() {
        assert_eq!(parse_edges("  1 -- 12 ;\n"), vec![(1, 12)]);
    }

    #[test]
    fn test_blank_and_malformed_lines_are_skipped() {
        let text = "\n   \ngraph G {\n1--2;\n4--;\n}\n";
        assert_eq!(parse_edges(text), vec![(1, 2)]);
    }

    #[test]
    fn test_total_charts_counts_children_and_root() {
        let graph = EdgeGraph::parse("1--2;\n1--3;\n");
        assert_eq!(graph.total_charts(), 3);
    }

    #[test]
    fn test_total_charts_of_an_empty_graph_is_the_root_alone() {
        assert_eq!(EdgeGraph::default().total_charts(), 1);
    }

    #[test]
    fn test_leaves_exclude_parents() {
        let graph = EdgeGraph::parse("1--2;\n1--3;\n");
        assert_eq!(graph.leaves(), vec![id("2"), id("3")]);
    }

    #[test]
    fn test_leaves_in_first_seen_order() {
        let graph = EdgeGraph::parse("1--3;\n1--2;\n2--4;\n");
        assert_eq!(graph.leaves(), vec![id("3"), id("4")]);
    }

    #[test]
    fn test_graft_relabels_subtree() {
        let mut graph = EdgeGraph::parse("1--2;\n1--3;\n");
        let nested = EdgeGraph::parse("1--2;\n1--3;\n");
        graph.graft(&id("3"), &nested);
        assert_eq!(graph.leaves(), vec![id("2"), id("3.2"), id("3.3")]);
        assert_eq!(graph.total_charts(), 5);
    }

    #[test]
    fn test_edge_paths() {
        assert_eq!(edge_path("run", None), "run/Edges");
        assert_eq!(edge_path("run/", None), "run/Edges");
        assert_eq!(edge_path("run", Some(5)), "run/Edges5");
    }

    #[test]
    fn test_from_directory_reads_the_edge_file() {
        let dir = std::env::temp_dir().join("zeta_atlas_edges_unit");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(EDGE_FILE), "1--2;\n1--3;\n").unwrap();
        let graph = EdgeGraph::from_directory(dir.to_str().unwrap()).unwrap();
        assert_eq!(graph.total_charts(), 3);
        std::fs::remove_file(dir.join(EDGE_FILE)).ok();
    }

    #[test]
    fn test_missing_edge_file_is_an_io_error() {
        let err = EdgeGraph::from_directory("/nonexistent/zeta_atlas").unwrap_err();
        assert!(matches!(err, EdgeError::Io { .. }));
    }
}
