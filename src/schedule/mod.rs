//! # Dependency Scheduler
//!
//! Orders a batch so every object is written after the objects it
//! references, and removed before them.
//!
//! Nodes live in an arena: object id → stable index, edges are index pairs
//! from a dependency to its dependent. A node without an `EncodedUnit` in
//! the batch is a *missing-dependency candidate* until the store confirms it
//! exists.
//!
//! ## Algorithm
//!
//! 1. Candidates the store does not hold are missing; every unit that
//!    reaches one through dependency edges fails with it.
//! 2. Level-wise Kahn over the remaining units: each level is one layer,
//!    ordered by discovery index.
//! 3. Units left over sit on or behind a cycle; Tarjan's algorithm
//!    separates the members of cycles from the units merely blocked by one.

use hashbrown::HashSet;
use indexmap::{IndexMap, IndexSet};

const UNVISITED: usize = usize::MAX;

/// Outcome of scheduling one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Units in commit order; units within a layer are independent.
    pub layers: Vec<Vec<String>>,
    /// Unit id → the absent ids it (transitively) depends on.
    pub missing: IndexMap<String, Vec<String>>,
    /// Units on a dependency cycle.
    pub cyclical: Vec<String>,
    /// Units that are not on a cycle but depend on one.
    pub blocked: Vec<String>,
}

impl Plan {
    pub fn has_cycle(&self) -> bool {
        !self.cyclical.is_empty()
    }

    /// Ids scheduled for commit, in order.
    pub fn ordered(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().flatten().map(String::as_str)
    }
}

/// Batch-scoped dependency graph.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    ids: IndexSet<String>,
    is_unit: Vec<bool>,
    /// dependency → dependents
    dependents: Vec<Vec<usize>>,
    /// dependent → dependencies
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, id: &str) -> usize {
        if let Some(index) = self.ids.get_index_of(id) {
            return index;
        }
        let (index, _) = self.ids.insert_full(id.to_string());
        self.is_unit.push(false);
        self.dependents.push(Vec::new());
        self.dependencies.push(Vec::new());
        index
    }

    /// Register a unit of the batch with the ids it references.
    pub fn add_unit<'a>(&mut self, id: &str, dependency_ids: impl IntoIterator<Item = &'a str>) {
        let unit = self.node(id);
        self.is_unit[unit] = true;
        for dependency in dependency_ids {
            let dep = self.node(dependency);
            if dep == unit || self.dependencies[unit].contains(&dep) {
                continue;
            }
            self.dependencies[unit].push(dep);
            self.dependents[dep].push(unit);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Referenced ids with no unit in the batch.
    pub fn missing_candidates(&self) -> Vec<String> {
        self.ids
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.is_unit[*i])
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Insertion order: dependencies before dependents. `existing` holds
    /// the candidates the store already has.
    pub fn plan_insertion(&self, existing: &HashSet<String>) -> Plan {
        let n = self.len();
        let mut plan = Plan::default();

        // missing ids and everything downstream of them
        let mut reasons: Vec<Vec<usize>> = vec![Vec::new(); n];
        for root in 0..n {
            if self.is_unit[root] || existing.contains(&self.ids[root]) {
                continue;
            }
            let mut seen = vec![false; n];
            let mut queue = vec![root];
            while let Some(node) = queue.pop() {
                for &dependent in &self.dependents[node] {
                    if !seen[dependent] {
                        seen[dependent] = true;
                        reasons[dependent].push(root);
                        queue.push(dependent);
                    }
                }
            }
        }
        let active: Vec<bool> = (0..n).map(|i| self.is_unit[i] && reasons[i].is_empty()).collect();
        for (i, causes) in reasons.iter().enumerate() {
            if self.is_unit[i] && !causes.is_empty() {
                let ids = causes.iter().map(|c| self.ids[*c].clone()).collect();
                plan.missing.insert(self.ids[i].clone(), ids);
            }
        }

        let (layers, leftover) = layered(&active, &self.dependencies, &self.dependents);
        plan.layers = self.named_layers(layers);
        self.classify_leftover(&leftover, &self.dependents, &mut plan);
        plan
    }

    /// Removal order: dependents before dependencies. Only units of the
    /// batch take part; referenced ids outside it are left alone.
    pub fn plan_removal(&self) -> Plan {
        let mut plan = Plan::default();
        let (layers, leftover) = layered(&self.is_unit, &self.dependents, &self.dependencies);
        plan.layers = self.named_layers(layers);
        self.classify_leftover(&leftover, &self.dependencies, &mut plan);
        plan
    }

    fn named_layers(&self, layers: Vec<Vec<usize>>) -> Vec<Vec<String>> {
        layers
            .into_iter()
            .map(|layer| layer.into_iter().map(|i| self.ids[i].clone()).collect())
            .collect()
    }

    fn classify_leftover(&self, leftover: &[bool], successors: &[Vec<usize>], plan: &mut Plan) {
        if !leftover.iter().any(|l| *l) {
            return;
        }
        let on_cycle = cyclic_members(successors, leftover);
        for (i, left) in leftover.iter().enumerate() {
            if !left {
                continue;
            }
            let id = self.ids[i].clone();
            if on_cycle[i] {
                plan.cyclical.push(id);
            } else {
                plan.blocked.push(id);
            }
        }
    }
}

/// Level-wise Kahn over the `active` nodes. `predecessors` must be ordered
/// before a node, `successors` after it. Returns the layers and the nodes
/// that never became ready.
fn layered(active: &[bool], predecessors: &[Vec<usize>], successors: &[Vec<usize>]) -> (Vec<Vec<usize>>, Vec<bool>) {
    let n = active.len();
    let mut in_degree: Vec<usize> = (0..n)
        .map(|i| predecessors[i].iter().filter(|p| active[**p]).count())
        .collect();
    let mut frontier: Vec<usize> = (0..n).filter(|i| active[*i] && in_degree[*i] == 0).collect();
    let mut placed = vec![false; n];
    let mut layers = Vec::new();

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for &node in &frontier {
            placed[node] = true;
            for &succ in &successors[node] {
                if !active[succ] {
                    continue;
                }
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    next.push(succ);
                }
            }
        }
        next.sort_unstable();
        layers.push(std::mem::replace(&mut frontier, next));
    }

    let leftover = (0..n).map(|i| active[i] && !placed[i]).collect();
    (layers, leftover)
}

/// Iterative Tarjan: which `active` nodes lie on a cycle (a strongly
/// connected component with more than one node, or a self-loop).
fn cyclic_members(successors: &[Vec<usize>], active: &[bool]) -> Vec<bool> {
    let n = successors.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut next_index = 0;
    let mut on_cycle = vec![false; n];

    for root in 0..n {
        if !active[root] || index[root] != UNVISITED {
            continue;
        }
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut work: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(&(v, pos)) = work.last() {
            if pos < successors[v].len() {
                let top = work.len() - 1;
                work[top].1 += 1;
                let w = successors[v][pos];
                if !active[w] {
                    continue;
                }
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    low[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    work.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                if component.len() > 1 || successors[v].contains(&v) {
                    for w in component {
                        on_cycle[w] = true;
                    }
                }
            }
        }
    }
    on_cycle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(units: &[(&str, Vec<&str>)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (id, deps) in units {
            g.add_unit(id, deps.iter().copied());
        }
        g
    }

    #[test]
    fn test_layers_follow_dependencies() {
        let g = graph(&[("report", vec!["indicator", "identity"]), ("indicator", vec!["identity"]), ("identity", vec![])]);
        let plan = g.plan_insertion(&HashSet::new());
        assert_eq!(plan.layers, vec![vec!["identity"], vec!["indicator"], vec!["report"]]);
        assert!(plan.missing.is_empty());
        assert!(!plan.has_cycle());
    }

    #[test]
    fn test_independent_units_share_a_layer_in_discovery_order() {
        let g = graph(&[("b", vec![]), ("a", vec![]), ("c", vec!["a"])]);
        let plan = g.plan_insertion(&HashSet::new());
        assert_eq!(plan.layers, vec![vec!["b", "a"], vec!["c"]]);
    }

    #[test]
    fn test_existing_candidates_resolve() {
        let g = graph(&[("tool", vec!["identity--stored"])]);
        assert_eq!(g.missing_candidates(), vec!["identity--stored".to_string()]);
        let existing: HashSet<String> = ["identity--stored".to_string()].into_iter().collect();
        let plan = g.plan_insertion(&existing);
        assert_eq!(plan.layers, vec![vec!["tool"]]);
    }

    #[test]
    fn test_missing_propagates_transitively() {
        let g = graph(&[("a", vec!["ghost"]), ("b", vec!["a"]), ("c", vec![])]);
        let plan = g.plan_insertion(&HashSet::new());
        assert_eq!(plan.missing.get("a"), Some(&vec!["ghost".to_string()]));
        assert_eq!(plan.missing.get("b"), Some(&vec!["ghost".to_string()]));
        assert_eq!(plan.layers, vec![vec!["c"]]);
    }

    #[test]
    fn test_cycle_members_and_blocked() {
        let g = graph(&[("a", vec!["b"]), ("b", vec!["a"]), ("c", vec!["b"]), ("d", vec![])]);
        let plan = g.plan_insertion(&HashSet::new());
        assert_eq!(plan.cyclical, vec!["a", "b"]);
        assert_eq!(plan.blocked, vec!["c"]);
        assert_eq!(plan.layers, vec![vec!["d"]]);
    }

    #[test]
    fn test_removal_inverts_order() {
        let g = graph(&[("identity", vec![]), ("indicator", vec!["identity"]), ("report", vec!["indicator"])]);
        let plan = g.plan_removal();
        assert_eq!(plan.layers, vec![vec!["report"], vec!["indicator"], vec!["identity"]]);
    }

    #[test]
    fn test_removal_ignores_outside_references() {
        let g = graph(&[("tool", vec!["identity--kept"])]);
        assert_eq!(g.plan_removal().layers, vec![vec!["tool"]]);
    }
}
