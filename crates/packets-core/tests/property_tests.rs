//! Property-based tests for registry pruning and mirror convergence
//!
//! Uses proptest to drive whole sessions with generated packet sets.

mod common;

use std::collections::BTreeMap;

use common::{gm_caps, player_caps, TestSession};
use packets_core::{PacketDraft, PacketRecord, Payload, Registry};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Strategy Generators
// ============================================================================

/// Packet ids mapped to whether their record file exists
fn listed_packets_strategy() -> impl Strategy<Value = BTreeMap<String, bool>> {
    prop::collection::btree_map("[a-z][a-z0-9_-]{0,7}", any::<bool>(), 0..12)
}

/// Packet ids mapped to a value to store
fn packet_values_strategy() -> impl Strategy<Value = BTreeMap<String, i64>> {
    prop::collection::btree_map("[a-z][a-z0-9]{0,7}", any::<i64>(), 1..8)
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Pruning keeps every present path, in order, and nothing else
    #[test]
    fn prune_keeps_order_of_present_paths(listed in listed_packets_strategy()) {
        let mut registry = Registry {
            modules: vec!["oif".into()],
            packets: listed.keys().map(|id| format!("oif/{}.json", id)).collect(),
        };
        let present: Vec<String> = listed
            .iter()
            .filter(|(_, exists)| **exists)
            .map(|(id, _)| format!("oif/{}.json", id))
            .collect();

        let removed = registry.prune_missing(|path| !present.iter().any(|p| p == path));

        prop_assert_eq!(&registry.packets, &present);
        prop_assert_eq!(removed.len() + present.len(), listed.len());
    }

    /// Initialization drops exactly the entries with no record file, and
    /// writes the registry back only when something was dropped
    #[test]
    fn initialize_prunes_exactly_missing(listed in listed_packets_strategy()) {
        let session = TestSession::new();
        let registry = Registry {
            modules: vec!["oif".into()],
            packets: listed.keys().map(|id| format!("oif/{}.json", id)).collect(),
        };
        session
            .storage
            .insert(&session.config.registry_path(), registry.to_json().unwrap());
        for (id, exists) in &listed {
            if *exists {
                let record = PacketRecord::new(id.as_str(), "oif", Payload::new(json!({"id": id})));
                session.storage.insert(
                    &session.record_path("oif", id),
                    serde_json::to_vec(&record).unwrap(),
                );
            }
        }

        let gm = session.join("gm", gm_caps());
        runtime().block_on(gm.store.initialize());

        let expected: Vec<String> = listed
            .iter()
            .filter(|(_, exists)| **exists)
            .map(|(id, _)| format!("oif/{}.json", id))
            .collect();
        let any_missing = listed.values().any(|exists| !exists);

        prop_assert_eq!(gm.store.registry().packets, expected.clone());
        prop_assert_eq!(gm.store.records().len(), expected.len());
        prop_assert_eq!(
            session.storage.writes_to(&session.config.registry_path()),
            usize::from(any_missing)
        );
    }

    /// A lone participant loading the mirror sees exactly what the last
    /// capable writer had in memory
    #[test]
    fn mirror_reproduces_writer_state(values in packet_values_strategy()) {
        let session = TestSession::new();
        let gm = session.join("gm", gm_caps());
        let rt = runtime();

        rt.block_on(async {
            gm.store.initialize().await;
            gm.store.register_module("oif").await.unwrap();
            for (id, value) in &values {
                let draft = PacketDraft::from_value(json!({"id": id, "module": "oif", "value": value}));
                gm.store.create(draft, false).await.unwrap();
            }
            gm.store.flush().await;
        });
        session.hub.leave(gm.store.participant());

        let player = session.join("player", player_caps());
        rt.block_on(player.store.initialize());

        prop_assert_eq!(player.store.registry(), gm.store.registry());
        prop_assert_eq!(player.store.records(), gm.store.records());
    }

    /// Re-creating the same packets never duplicates registry entries
    #[test]
    fn create_lists_each_path_once(values in packet_values_strategy(), repeats in 1..4usize) {
        let session = TestSession::new();
        let gm = session.join("gm", gm_caps());

        runtime().block_on(async {
            gm.store.initialize().await;
            gm.store.register_module("oif").await.unwrap();
            for _ in 0..repeats {
                for (id, value) in &values {
                    let draft = PacketDraft::from_value(json!({"id": id, "module": "oif", "value": value}));
                    gm.store.create(draft, false).await.unwrap();
                }
            }
            gm.store.flush().await;
        });

        let registry = gm.store.registry();
        prop_assert_eq!(registry.packets.len(), values.len());
        prop_assert_eq!(session.stored_registry().unwrap(), registry);
    }
}
