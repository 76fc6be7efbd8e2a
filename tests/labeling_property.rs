//! Property tests: on random graphs, the distributed engine must agree with
//! a sequential union-find for every optimization level, doubling setting,
//! and rank count.

mod common;

use common::*;
use distconn::labeling::{LabelingConfig, Optimization};
use proptest::prelude::*;

fn optimization_levels() -> impl Strategy<Value = Optimization> {
    prop_oneof![
        Just(Optimization::Naive),
        Just(Optimization::StablePartitionRemoved),
        Just(Optimization::LoadBalanced),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn engine_partition_matches_union_find(
        seed in any::<u64>(),
        vertices in 2u64..80,
        density in 1usize..6,
        ranks in 1usize..4,
        optimization in optimization_levels(),
        doubling in any::<bool>(),
    ) {
        let edge_count = vertices as usize * density;
        let edges = undirected(&random_graph(seed, vertices, edge_count));
        prop_assume!(edges.len() >= ranks);

        let config = LabelingConfig { optimization, doubling, iteration_cap: None };
        let outcomes = run_labeling(&edges, ranks, config);
        assert_matches_reference(&edges, &outcomes);
    }

    #[test]
    fn component_count_is_rank_invariant(
        seed in any::<u64>(),
        vertices in 2u64..60,
    ) {
        let edges = undirected(&random_graph(seed, vertices, vertices as usize * 2));
        prop_assume!(edges.len() >= 3);

        let single = run_labeling(&edges, 1, LabelingConfig::default());
        let triple = run_labeling(&edges, 3, LabelingConfig::default());
        prop_assert_eq!(single[0].count, triple[0].count);
        prop_assert_eq!(single[0].count, reference_component_count(&edges));
    }
}
