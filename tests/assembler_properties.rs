// tests/assembler_properties.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use stagedag::dag::RetryPolicy;
use stagedag::errors::StagedagError;
use stagedag::pipeline::{PipelineRunner, RunContext};
use stagedag::stage::{DependencyTable, GraphAssembler};
use stagedag_test_utils::FakeRunner;

fn assembler() -> GraphAssembler {
    let runner: Arc<dyn PipelineRunner> = Arc::new(FakeRunner::new());
    GraphAssembler::new("pkg", RunContext::new(".", "test"), runner)
        .with_default_retry(RetryPolicy::none())
}

fn stage(i: usize) -> String {
    format!("stage_{i}")
}

// Acyclic by construction: an edge always points from a lower to a higher
// index. Pairs may repeat.
fn acyclic_pairs() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..10usize).prop_flat_map(|n| {
        let pairs = proptest::collection::vec((0..n, 0..n), 0..30).prop_map(|raw| {
            raw.into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.min(b), a.max(b)))
                .collect::<Vec<_>>()
        });
        (Just(n), pairs)
    })
}

proptest! {
    #[test]
    fn one_node_per_stage_and_one_edge_per_pair((n, pairs) in acyclic_pairs()) {
        let mut table = DependencyTable::new();
        for i in 0..n {
            table.add_stage(stage(i));
        }
        for &(up, down) in &pairs {
            table.add_edge(stage(up), stage(down));
            // Declaring twice never adds anything.
            table.add_edge(stage(up), stage(down));
        }

        let graph = assembler().assemble(&table).unwrap();
        let distinct: BTreeSet<_> = pairs.iter().collect();

        prop_assert_eq!(graph.len(), n);
        prop_assert_eq!(graph.edge_count(), distinct.len());
        for &(up, down) in &pairs {
            let up_id = format!("stage-{up}");
            let down_id = format!("stage-{down}");
            prop_assert!(graph.precedes(&up_id, &down_id));
        }
    }

    #[test]
    fn edge_list_and_map_forms_agree((_n, pairs) in acyclic_pairs()) {
        let from_edges: DependencyTable = pairs
            .iter()
            .map(|&(up, down)| (stage(up), stage(down)))
            .collect();

        let mut from_map = DependencyTable::new();
        for &(up, down) in &pairs {
            from_map = from_map.depends_on(stage(down), [stage(up)]);
        }

        let a = assembler().assemble(&from_edges).unwrap();
        let b = assembler().assemble(&from_map).unwrap();
        let edges_a: Vec<_> = a.edges().map(|(u, d)| (u.to_string(), d.to_string())).collect();
        let edges_b: Vec<_> = b.edges().map(|(u, d)| (u.to_string(), d.to_string())).collect();
        prop_assert_eq!(edges_a, edges_b);
    }

    #[test]
    fn any_cycle_fails_assembly(
        len in 2..8usize,
        extra in proptest::collection::vec((0..8usize, 0..8usize), 0..10)
    ) {
        let mut table = DependencyTable::new();
        for i in 0..len {
            table.add_edge(stage(i), stage((i + 1) % len));
        }
        for (a, b) in extra {
            if a != b {
                table.add_edge(stage(a), stage(b));
            }
        }

        let err = assembler().assemble(&table).unwrap_err();
        prop_assert!(matches!(err, StagedagError::DagCycle(_)), "unexpected error: {err}");
    }
}

#[test]
fn undeclared_stage_fails_in_strict_mode() {
    let table = DependencyTable::new().edge("load", "train");
    let err = assembler()
        .with_stage("train", Default::default())
        .strict(true)
        .assemble(&table)
        .unwrap_err();

    assert!(matches!(err, StagedagError::UnknownStage(ref s) if s == "load"));
    assert!(err.is_assembly());
}
