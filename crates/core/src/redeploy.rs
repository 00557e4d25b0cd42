//! Library dependency graph and the redeploy closure

use crate::presets::LibraryAddressTable;
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Declared library dependencies, with reverse edges for "who depends on
/// me" lookups
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryDependencyGraph {
    dependencies: BTreeMap<String, Vec<String>>,
    dependants: BTreeMap<String, Vec<String>>,
}

impl LibraryDependencyGraph {
    pub fn new(edges: BTreeMap<String, Vec<String>>) -> Self {
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut dependants: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (library, deps) in edges {
            let entry = dependencies.entry(library.clone()).or_default();
            for dep in deps {
                if entry.contains(&dep) {
                    continue;
                }
                entry.push(dep.clone());
                dependants.entry(dep).or_default().push(library.clone());
            }
        }

        Self {
            dependencies,
            dependants,
        }
    }

    /// Libraries `library` depends on directly
    pub fn dependencies_of(&self, library: &str) -> &[String] {
        self.dependencies.get(library).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Libraries depending on `library` directly
    pub fn dependants_of(&self, library: &str) -> &[String] {
        self.dependants.get(library).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Libraries that must be (re)deployed: every library without an address
    /// plus everything depending on one of those, directly or transitively.
    ///
    /// Ordered by seed (address table order) then discovery. This is not a
    /// deployment order.
    pub fn redeploy_set(&self, addresses: &LibraryAddressTable) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();

        for library in addresses.pending() {
            if visited.insert(library.to_string()) {
                result.push(library.to_string());
                queue.push_back(library.to_string());
            }
        }

        while let Some(library) = queue.pop_front() {
            for dependant in self.dependants_of(&library) {
                if visited.insert(dependant.clone()) {
                    result.push(dependant.clone());
                    queue.push_back(dependant.clone());
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> LibraryDependencyGraph {
        LibraryDependencyGraph::new(
            edges
                .iter()
                .map(|(lib, deps)| (lib.to_string(), deps.iter().map(|d| d.to_string()).collect()))
                .collect(),
        )
    }

    fn table(entries: &[(&str, &str)]) -> LibraryAddressTable {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_dependant_of_undeployed_library() {
        let graph = graph(&[("X", &["Y"])]);
        let addresses = table(&[("X", "0xA"), ("Y", "")]);
        assert_eq!(graph.redeploy_set(&addresses), vec!["Y", "X"]);
    }

    #[test]
    fn test_fully_deployed_table_needs_nothing() {
        let graph = graph(&[("X", &["Y"]), ("Y", &["Z"]), ("Z", &["X"])]);
        let addresses = table(&[("X", "0x1"), ("Y", "0x2"), ("Z", "0x3")]);
        assert!(graph.redeploy_set(&addresses).is_empty());
    }

    #[test]
    fn test_transitive_closure_and_diamond() {
        // D <- B <- A, D <- C <- A, E unrelated
        let graph = graph(&[("A", &["B", "C"]), ("B", &["D"]), ("C", &["D"]), ("E", &[])]);
        let addresses = table(&[("A", "0x1"), ("B", "0x2"), ("C", "0x3"), ("D", ""), ("E", "0x5")]);

        let set = graph.redeploy_set(&addresses);
        assert_eq!(set, vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn test_cycle_terminates() {
        let graph = graph(&[("A", &["B"]), ("B", &["A"])]);
        let addresses = table(&[("A", ""), ("B", "0x2")]);
        assert_eq!(graph.redeploy_set(&addresses), vec!["A", "B"]);
    }

    #[test]
    fn test_untracked_dependants_are_included() {
        // dependants discovered through edges need not be in the table
        let graph = graph(&[("User", &["Lib"])]);
        let addresses = table(&[("Lib", "")]);
        assert_eq!(graph.redeploy_set(&addresses), vec!["Lib", "User"]);
    }

    #[test]
    fn test_closed_under_reverse_dependencies_and_idempotent() {
        let graph = graph(&[
            ("A", &["B"]),
            ("B", &["C"]),
            ("D", &["C", "E"]),
            ("F", &["E"]),
        ]);
        let addresses = table(&[
            ("A", "0x1"),
            ("B", "0x2"),
            ("C", ""),
            ("D", "0x4"),
            ("E", "0x5"),
            ("F", "0x6"),
        ]);

        let set = graph.redeploy_set(&addresses);
        for pending in addresses.pending() {
            assert!(set.iter().any(|l| l == pending));
        }
        for library in &set {
            for dependant in graph.dependants_of(library) {
                assert!(set.contains(dependant), "{dependant} missing");
            }
        }
        assert!(!set.contains(&"F".to_string()));
        assert_eq!(graph.redeploy_set(&addresses), set);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let graph = graph(&[("A", &["B", "B"])]);
        assert_eq!(graph.dependencies_of("A"), ["B".to_string()]);
        assert_eq!(graph.dependants_of("B"), ["A".to_string()]);
    }
}
