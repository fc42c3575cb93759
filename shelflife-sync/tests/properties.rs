//! Property tests over generated datasets.

use proptest::prelude::*;
use shelflife_core::{Connectivity, ProductRecord};
use shelflife_sync::{LoadOutcome, ProbeResponse};
use shelflife_test_utils::generators::arb_dataset;
use shelflife_test_utils::{sorted, sorted_records, FetchScript, Harness, ScriptedSource};

fn load_with(script: FetchScript) -> (LoadOutcome, Vec<ProductRecord>, Option<Vec<ProductRecord>>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build");

    runtime.block_on(async {
        let h = Harness::new(
            ScriptedSource::new(Ok(ProbeResponse::NotModified), script),
            Connectivity::Online,
        );
        let report = h.orchestrator.load().await;
        let cached = h.store.load().await.map(|entry| entry.data);
        (report.outcome, sorted_records(&h.orchestrator.index()), cached)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Property: a fetched dataset is indexed and cached exactly, whatever
    /// the body framing and chunking.
    #[test]
    fn prop_fetched_dataset_is_indexed_exactly(
        dataset in arb_dataset(24),
        chunk_size in 1usize..64,
        ndjson in any::<bool>(),
    ) {
        let script = if ndjson {
            FetchScript::ndjson(&dataset, Some("\"p\""), chunk_size)
        } else {
            FetchScript::json(&dataset, Some("\"p\""))
        };

        let (outcome, indexed, cached) = load_with(script);

        prop_assert_eq!(outcome, LoadOutcome::Fetched);
        prop_assert_eq!(indexed, sorted(dataset.clone()));
        prop_assert_eq!(cached, Some(dataset));
    }

    /// Property: a failed fetch with no cache still ends with a non-empty index.
    #[test]
    fn prop_failed_fetch_never_leaves_index_empty(reason in "[a-z ]{1,20}") {
        let script = FetchScript::Fail(shelflife_core::TransportError::Unreachable { reason });
        let (outcome, indexed, _) = load_with(script);
        prop_assert_eq!(outcome, LoadOutcome::Fallback);
        prop_assert!(!indexed.is_empty());
    }
}
