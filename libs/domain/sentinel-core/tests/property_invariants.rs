use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use sentinel_core::{Criticality, Host, Node, NodeKind, TenantId};

fn arb_host() -> impl Strategy<Value = Host> {
    (
        "[a-z0-9.]{1,15}",
        proptest::option::of("[a-zA-Z0-9-]{1,20}"),
        proptest::option::of("aws|azure|gcp"),
        proptest::option::of("i-[a-f0-9]{8}"),
    )
        .prop_map(|(ip, hostname, provider, instance_id)| Host {
            ip,
            hostname,
            os: None,
            mac: None,
            provider,
            instance_id,
            region: None,
            criticality: Criticality::Medium,
            tags: Vec::new(),
        })
}

proptest! {
    /// I6: re-running discovery against unchanged source-native identifiers
    /// reproduces the same node id, no matter how many times it's computed.
    #[test]
    fn natural_key_is_stable_across_repeated_construction(host in arb_host()) {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let tenant = TenantId::new("tenant-a");
        let first = Node::new(tenant.clone(), NodeKind::Host(host.clone()), now);
        let second = Node::new(tenant, NodeKind::Host(host), now);
        prop_assert_eq!(first.id, second.id);
    }

    /// I6, continued: two hosts that differ in any source-native identifier
    /// never collide on the same natural key.
    #[test]
    fn distinct_hosts_never_share_a_natural_key(a in arb_host(), b in arb_host()) {
        prop_assume!(a.provider != b.provider || a.instance_id != b.instance_id || a.ip != b.ip);
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let tenant = TenantId::new("tenant-a");
        let node_a = Node::new(tenant.clone(), NodeKind::Host(a), now);
        let node_b = Node::new(tenant, NodeKind::Host(b), now);
        prop_assert_ne!(node_a.id, node_b.id);
    }

    /// I2: a freshly discovered node always has `first_seen == last_seen`,
    /// and neither field can be constructed out of order.
    #[test]
    fn fresh_node_has_first_seen_equal_last_seen(host in arb_host(), offset_secs in 0i64..10_000_000) {
        let now = Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap();
        let node = Node::new(TenantId::new("tenant-a"), NodeKind::Host(host), now);
        prop_assert_eq!(node.first_seen, node.last_seen);
        prop_assert!(node.first_seen <= node.last_seen);
    }
}
