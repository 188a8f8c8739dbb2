use std::collections::HashMap;

use cti_graph::schedule::{DependencyGraph, Plan};
use hashbrown::HashSet;
use proptest::prelude::*;

/// Unit ids plus (dependent, dependency) pairs, always pointing at a lower index.
fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..30).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..(n * 3));
        (Just(n), edges).prop_map(|(n, pairs)| {
            let edges = pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.max(b), a.min(b)))
                .collect();
            (n, edges)
        })
    })
}

fn unit(i: usize) -> String {
    format!("indicator--{i:04}")
}

fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..n {
        let deps: Vec<String> = edges.iter().filter(|(d, _)| *d == i).map(|(_, dep)| unit(*dep)).collect();
        graph.add_unit(&unit(i), deps.iter().map(String::as_str));
    }
    graph
}

fn depth_of(plan: &Plan) -> HashMap<String, usize> {
    let mut depth = HashMap::new();
    for (layer, ids) in plan.layers.iter().enumerate() {
        for id in ids {
            assert!(depth.insert(id.clone(), layer).is_none(), "{id} scheduled twice");
        }
    }
    depth
}

proptest! {
    #[test]
    fn prop_insertion_layers_respect_dependencies((n, edges) in arb_dag()) {
        let plan = build(n, &edges).plan_insertion(&HashSet::new());
        prop_assert!(!plan.has_cycle());
        prop_assert!(plan.missing.is_empty());

        let depth = depth_of(&plan);
        prop_assert_eq!(depth.len(), n);
        for (dependent, dependency) in &edges {
            prop_assert!(depth[&unit(*dependency)] < depth[&unit(*dependent)]);
        }
    }

    #[test]
    fn prop_removal_layers_invert_dependencies((n, edges) in arb_dag()) {
        let plan = build(n, &edges).plan_removal();
        let depth = depth_of(&plan);
        prop_assert_eq!(depth.len(), n);
        for (dependent, dependency) in &edges {
            prop_assert!(depth[&unit(*dependent)] < depth[&unit(*dependency)]);
        }
    }

    #[test]
    fn prop_ring_is_entirely_cyclical(n in 2usize..20) {
        let edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
        let plan = build(n, &edges).plan_insertion(&HashSet::new());
        prop_assert_eq!(plan.cyclical.len(), n);
        prop_assert!(plan.blocked.is_empty());
        prop_assert!(plan.layers.is_empty());
    }

    #[test]
    fn prop_absent_root_fails_its_whole_cone((n, edges) in arb_dag()) {
        // every unit depending (transitively) on unit 0 is missing once 0 leaves the batch
        let mut graph = DependencyGraph::new();
        for i in 1..n {
            let deps: Vec<String> = edges.iter().filter(|(d, _)| *d == i).map(|(_, dep)| unit(*dep)).collect();
            graph.add_unit(&unit(i), deps.iter().map(String::as_str));
        }
        let plan = graph.plan_insertion(&HashSet::new());

        let mut reaches = vec![false; n];
        reaches[0] = true;
        for i in 1..n {
            reaches[i] = edges.iter().any(|(d, dep)| *d == i && reaches[*dep]);
        }
        for i in 1..n {
            prop_assert_eq!(plan.missing.contains_key(&unit(i)), reaches[i], "unit {}", i);
        }
        prop_assert_eq!(depth_of(&plan).len() + plan.missing.len(), n - 1);
    }
}
