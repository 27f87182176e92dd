//! Chart identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a chart within an atlas.
///
/// The root chart is `1`. A monomial subchart concatenates its parent's
/// id with the 1-based labels of its lattice vertex, so vertex `{0, 2}`
/// under chart `4` yields `413`. A leaf loaded from a nested chart
/// directory gets a dotted compound id such as `4.2`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChartId(String);

impl ChartId {
    /// The root chart id, `1`.
    pub fn root() -> Self {
        ChartId("1".to_string())
    }

    /// Wraps an already-formatted id.
    pub fn new(id: impl Into<String>) -> Self {
        ChartId(id.into())
    }

    /// The id of a numbered top-level chart.
    pub fn from_number(n: u64) -> Self {
        ChartId(n.to_string())
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Child id for a lattice vertex, given 0-based divisor indices in
    /// ascending order.
    pub fn child(&self, vertex_indices: impl IntoIterator<Item = usize>) -> ChartId {
        let mut id = self.0.clone();
        for index in vertex_indices {
            id.push_str(&(index + 1).to_string());
        }
        ChartId(id)
    }

    /// Compound id for chart `n` nested under this chart's directory.
    pub fn compound(&self, n: u64) -> ChartId {
        ChartId(format!("{}.{}", self.0, n))
    }

    /// Label for this chart's `k`-th lattice vertex, used to name
    /// placeholder counts.
    pub fn vertex_label(&self, k: usize) -> String {
        format!("{}.{}", self.0, k)
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChartId {
    fn from(s: &str) -> Self {
        ChartId(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_concatenates_one_based_labels() {
        let parent = ChartId::from_number(4);
        assert_eq!(parent.child([0usize, 2]).as_str(), "413");
    }

    #[test]
    fn test_empty_vertex_keeps_parent_id() {
        let parent = ChartId::root();
        assert_eq!(parent.child([]).as_str(), "1");
    }

    #[test]
    fn test_compound_ids_are_dotted() {
        assert_eq!(ChartId::from_number(4).compound(2).as_str(), "4.2");
    }

    #[test]
    fn test_vertex_labels() {
        assert_eq!(ChartId::new("4.2").vertex_label(0), "4.2.0");
    }
}
