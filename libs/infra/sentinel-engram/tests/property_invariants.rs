use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use sentinel_engram::{EngramStore, FilesystemObjectStore, SessionIndex, SessionOutcome};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// P5: recomputing the content hash of a closed session's serialized
    /// bytes always equals its recorded address, regardless of how many
    /// actions/dead-ends were recorded or what the summary text says.
    #[test]
    fn closed_session_verifies_against_its_recorded_address(
        agent_id in "[a-z-]{3,12}",
        intent in "[a-z-]{3,20}",
        action_count in 0usize..8,
        summary in "[a-zA-Z0-9 ,.]{0,80}",
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let objects = std::sync::Arc::new(FilesystemObjectStore::new(dir.path()));
            let index = SessionIndex::connect(":memory:").await.unwrap();
            let (store, _dropped_rx) = EngramStore::new(objects, index);

            let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            let mut handle = store.open("tenant-a", agent_id, intent, serde_json::json!({}), now);
            let session_id = handle.session_id().to_string();
            for i in 0..action_count {
                handle.record_action(
                    "enumerate",
                    format!("resource-{i}"),
                    "ok",
                    serde_json::json!({ "index": i }),
                    now,
                );
            }

            store
                .close(handle, SessionOutcome::Success, summary, now)
                .await
                .unwrap();

            assert!(store.verify(&session_id).await.unwrap());
        });
    }
}
