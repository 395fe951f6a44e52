use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use sentinel_core::{Criticality, Host, NodeKind, TenantContext, TenantId};
use sentinel_graph::{GraphClient, GraphStore, NodeFilter, Page};

fn arb_host() -> impl Strategy<Value = Host> {
    (
        "[a-z0-9.]{1,15}",
        proptest::option::of("i-[a-f0-9]{8}"),
    )
        .prop_map(|(ip, instance_id)| Host {
            ip,
            hostname: None,
            os: None,
            mac: None,
            provider: Some("aws".into()),
            instance_id,
            region: None,
            criticality: Criticality::Medium,
            tags: Vec::new(),
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// P2: repeated `upsert_node` with the same natural key is idempotent —
    /// `first_seen` is preserved across re-discovery and `last_seen` never
    /// moves backward, no matter how far apart in time the resource is
    /// re-observed.
    #[test]
    fn upsert_node_preserves_first_seen_across_repeated_discovery(
        host in arb_host(),
        gap_minutes in 0i64..500,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let client = GraphClient::connect(":memory:", None).await.unwrap();
            let store = GraphStore::new(client);
            let ctx = TenantContext::new(TenantId::new("tenant-a"));

            let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            let t1 = t0 + Duration::minutes(gap_minutes);

            let first = store
                .upsert_node(&ctx, NodeKind::Host(host.clone()), t0)
                .await
                .unwrap();
            assert!(first.created);

            let second = store
                .upsert_node(&ctx, NodeKind::Host(host), t1)
                .await
                .unwrap();
            assert!(!second.created);
            assert_eq!(first.id, second.id);

            let stored = store
                .list_nodes(&ctx, "Host", &NodeFilter::default(), Page::default())
                .await
                .unwrap();
            let node = stored.into_iter().find(|n| n.id == first.id).unwrap();
            assert_eq!(node.first_seen, t0);
            assert!(node.last_seen >= node.first_seen);
        });
    }
}
