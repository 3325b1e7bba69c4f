//! Property tests for pipeline delivery guarantees

use closable_pipeline::pipeline::stages::{DropEvery, Identity};
use closable_pipeline::pipeline::PipelineBuilder;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_single_worker_chain_preserves_order(
        items in prop::collection::vec(any::<u32>(), 0..200),
        stages in 1usize..5,
        capacity in 0usize..8,
    ) {
        let builder = (0..stages).fold(
            PipelineBuilder::<u32>::new().capacity(capacity),
            |builder, idx| builder.stage(format!("s{}", idx), Identity),
        );
        let mut pipeline = builder.build().unwrap();
        for &item in &items {
            pipeline.submit(item).unwrap();
        }

        let report = pipeline.run_to_completion().unwrap();
        // Property: FIFO end to end with one worker per stage
        prop_assert_eq!(report.items, items);
    }

    #[test]
    fn test_fan_out_delivers_every_item_once(
        count in 0u32..300,
        workers in 1usize..6,
    ) {
        let mut pipeline = PipelineBuilder::<u32>::new()
            .stage_with_workers("wide", workers, Identity)
            .stage("narrow", Identity)
            .build()
            .unwrap();
        for item in 0..count {
            pipeline.submit(item).unwrap();
        }

        let report = pipeline.run_to_completion().unwrap();
        let mut items = report.items;
        items.sort_unstable();
        // Property: no loss and no duplication regardless of worker count
        prop_assert_eq!(items, (0..count).collect::<Vec<_>>());
    }

    #[test]
    fn test_counters_balance(count in 0u64..200, n in 0u64..6) {
        let mut pipeline = PipelineBuilder::<u64>::new()
            .stage("thin", DropEvery::new(n))
            .build()
            .unwrap();
        for item in 0..count {
            pipeline.submit(item).unwrap();
        }

        let report = pipeline.run_to_completion().unwrap();
        let stats = &report.stages()[0];
        let expected_dropped = if n == 0 { 0 } else { count / n };
        prop_assert_eq!(stats.received, count);
        prop_assert_eq!(stats.dropped, expected_dropped);
        prop_assert_eq!(stats.forwarded + stats.dropped, stats.received);
        prop_assert_eq!(report.count() as u64, count - expected_dropped);
    }
}
