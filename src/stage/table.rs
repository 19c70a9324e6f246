// src/stage/table.rs

//! Hand-maintained dependency table between pipeline stages.

use std::collections::BTreeSet;

use crate::types::StageName;

/// Which stage depends on which.
///
/// Can be filled in map form (`depends_on(stage, [upstream, ...])`), as an
/// explicit edge list (`edge(upstream, downstream)`), or both. Every name that
/// appears anywhere in the table is a stage; repeated pairs collapse into a
/// single edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyTable {
    stages: BTreeSet<StageName>,
    /// `(upstream, downstream)` pairs.
    edges: BTreeSet<(StageName, StageName)>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stage that may have no dependencies at all.
    pub fn stage(mut self, name: impl Into<String>) -> Self {
        self.add_stage(name);
        self
    }

    /// Map form: `stage` runs after every stage in `upstream`.
    pub fn depends_on<I, S>(mut self, stage: impl Into<String>, upstream: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let stage = stage.into();
        self.add_stage(stage.clone());
        for up in upstream {
            self.add_edge(up, stage.clone());
        }
        self
    }

    /// Edge-list form.
    pub fn edge(mut self, upstream: impl Into<String>, downstream: impl Into<String>) -> Self {
        self.add_edge(upstream, downstream);
        self
    }

    pub fn add_stage(&mut self, name: impl Into<String>) -> bool {
        self.stages.insert(name.into())
    }

    /// Returns `false` when the pair was already present.
    pub fn add_edge(&mut self, upstream: impl Into<String>, downstream: impl Into<String>) -> bool {
        let upstream = upstream.into();
        let downstream = downstream.into();
        self.stages.insert(upstream.clone());
        self.stages.insert(downstream.clone());
        self.edges.insert((upstream, downstream))
    }

    /// Every distinct stage name, sorted.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(String::as_str)
    }

    /// Every distinct `(upstream, downstream)` pair, sorted.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().map(|(u, d)| (u.as_str(), d.as_str()))
    }

    /// Direct dependencies of `stage`.
    pub fn upstream_of<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(_, d)| d == stage)
            .map(|(u, _)| u.as_str())
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.stages.contains(stage)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl<U, D> FromIterator<(U, D)> for DependencyTable
where
    U: Into<String>,
    D: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (U, D)>>(iter: T) -> Self {
        let mut table = DependencyTable::new();
        for (up, down) in iter {
            table.add_edge(up, down);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_form_collects_stages_from_keys_and_values() {
        let table = DependencyTable::new()
            .depends_on("split", ["join"])
            .depends_on("join", ["left", "right"]);

        let stages: Vec<&str> = table.stages().collect();
        assert_eq!(stages, vec!["join", "left", "right", "split"]);
        assert_eq!(table.edge_count(), 3);

        let mut ups: Vec<&str> = table.upstream_of("join").collect();
        ups.sort();
        assert_eq!(ups, vec!["left", "right"]);
    }

    #[test]
    fn repeated_declarations_collapse() {
        let mut table = DependencyTable::new().edge("a", "b").depends_on("b", ["a", "a"]);
        assert!(!table.add_edge("a", "b"));
        assert_eq!(table.edge_count(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn edge_list_form_matches_map_form() {
        let from_edges: DependencyTable = [("a", "c"), ("b", "c")].into_iter().collect();
        let from_map = DependencyTable::new().depends_on("c", ["a", "b"]);
        assert_eq!(from_edges, from_map);
    }

    #[test]
    fn isolated_stage_is_kept() {
        let table = DependencyTable::new().stage("lonely");
        assert!(table.contains("lonely"));
        assert_eq!(table.edge_count(), 0);
    }
}
