//! LedgerBackend interface tests.
//!
//! These tests verify the contract of the LedgerBackend trait.
//! Each storage implementation should run these tests.

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use silo_ledger::model::SyncState;
use silo_ledger::storage::{Collection, Document, Filter, LedgerBackend, StorageError, WriteMode};

/// Create a test document for a silo.
pub fn make_doc(silo: &str, state: SyncState) -> Document {
    let key = Uuid::new_v4().to_string();
    Document {
        key: key.clone(),
        silo_id: Some(silo.to_string()),
        sync_state: Some(state),
        created_at: Utc::now(),
        body: json!({ "event_id": key, "silo_id": silo, "note": "O'Brien said \"hi\"" }),
    }
}

fn unique_silo(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

// =============================================================================
// write / get
// =============================================================================

pub async fn test_insert_then_get<B: LedgerBackend + ?Sized>(backend: &B) {
    let doc = make_doc(&unique_silo("test_get"), SyncState::Pending);

    backend
        .write(Collection::Events, doc.clone(), WriteMode::Insert)
        .await
        .expect("insert should succeed");

    let fetched = backend
        .get(Collection::Events, &doc.key)
        .await
        .expect("get should succeed")
        .expect("document should exist");
    assert_eq!(fetched.body, doc.body);
    assert_eq!(fetched.silo_id, doc.silo_id);
    assert_eq!(fetched.sync_state, doc.sync_state);
    assert_eq!(
        fetched.created_at.timestamp_micros(),
        doc.created_at.timestamp_micros()
    );
}

pub async fn test_get_missing<B: LedgerBackend + ?Sized>(backend: &B) {
    let missing = backend
        .get(Collection::Silos, &Uuid::new_v4().to_string())
        .await
        .expect("get should succeed");
    assert!(missing.is_none());
}

pub async fn test_insert_conflict_keeps_original<B: LedgerBackend + ?Sized>(backend: &B) {
    let doc = make_doc(&unique_silo("test_conflict"), SyncState::Pending);
    backend
        .write(Collection::Events, doc.clone(), WriteMode::Insert)
        .await
        .expect("insert should succeed");

    let mut changed = doc.clone();
    changed.body = json!({ "changed": true });
    let err = backend
        .write(Collection::Events, changed, WriteMode::Insert)
        .await
        .expect_err("duplicate insert should fail");
    assert!(matches!(err, StorageError::Conflict { .. }), "got {err:?}");

    let fetched = backend
        .get(Collection::Events, &doc.key)
        .await
        .expect("get should succeed")
        .expect("document should exist");
    assert_eq!(fetched.body, doc.body);
}

pub async fn test_upsert_replaces<B: LedgerBackend + ?Sized>(backend: &B) {
    let silo = unique_silo("test_upsert");
    let doc = make_doc(&silo, SyncState::Pending);
    backend
        .write(Collection::Events, doc.clone(), WriteMode::Upsert)
        .await
        .expect("first upsert should succeed");

    let mut synced = doc.clone();
    synced.sync_state = Some(SyncState::Synced);
    backend
        .write(Collection::Events, synced.clone(), WriteMode::Upsert)
        .await
        .expect("second upsert should succeed");
    backend
        .write(Collection::Events, synced, WriteMode::Upsert)
        .await
        .expect("repeated upsert should succeed");

    let docs = backend
        .find(Collection::Events, &Filter::BySilo(silo))
        .await
        .expect("find should succeed");
    assert_eq!(docs.len(), 1, "upsert must not duplicate");
    assert_eq!(docs[0].sync_state, Some(SyncState::Synced));
}

// =============================================================================
// find / count
// =============================================================================

pub async fn test_find_filters<B: LedgerBackend + ?Sized>(backend: &B) {
    let silo_a = unique_silo("test_find_a");
    let silo_b = unique_silo("test_find_b");

    let pending_a = make_doc(&silo_a, SyncState::Pending);
    backend
        .write_batch(
            Collection::Events,
            vec![
                pending_a.clone(),
                make_doc(&silo_a, SyncState::Synced),
                make_doc(&silo_b, SyncState::Pending),
            ],
        )
        .await
        .expect("batch should succeed");

    let a = backend
        .find(Collection::Events, &Filter::BySilo(silo_a.clone()))
        .await
        .expect("find should succeed");
    assert_eq!(a.len(), 2);

    let a_pending = backend
        .find(
            Collection::Events,
            &Filter::BySiloAndState(silo_a.clone(), SyncState::Pending),
        )
        .await
        .expect("find should succeed");
    assert_eq!(a_pending.len(), 1);
    assert_eq!(a_pending[0].key, pending_a.key);

    let b_count = backend
        .count(Collection::Events, &Filter::BySilo(silo_b))
        .await
        .expect("count should succeed");
    assert_eq!(b_count, 1);

    let a_synced = backend
        .count(
            Collection::Events,
            &Filter::BySiloAndState(silo_a, SyncState::Synced),
        )
        .await
        .expect("count should succeed");
    assert_eq!(a_synced, 1);
}

pub async fn test_find_preserves_timestamps<B: LedgerBackend + ?Sized>(backend: &B) {
    let silo = unique_silo("test_time");
    let mut old = make_doc(&silo, SyncState::Pending);
    old.created_at = Utc::now() - Duration::days(3);
    backend
        .write(Collection::Analyses, old.clone(), WriteMode::Insert)
        .await
        .expect("insert should succeed");

    let docs = backend
        .find(Collection::Analyses, &Filter::BySilo(silo))
        .await
        .expect("find should succeed");
    assert_eq!(docs.len(), 1);
    assert_eq!(
        docs[0].created_at.timestamp_micros(),
        old.created_at.timestamp_micros()
    );
}

// =============================================================================
// delete
// =============================================================================

pub async fn test_delete<B: LedgerBackend + ?Sized>(backend: &B) {
    let doc = make_doc(&unique_silo("test_delete"), SyncState::Synced);
    backend
        .write(Collection::Silos, doc.clone(), WriteMode::Insert)
        .await
        .expect("insert should succeed");

    assert!(backend
        .delete(Collection::Silos, &doc.key)
        .await
        .expect("delete should succeed"));
    assert!(!backend
        .delete(Collection::Silos, &doc.key)
        .await
        .expect("second delete should succeed"));
    assert!(backend
        .get(Collection::Silos, &doc.key)
        .await
        .expect("get should succeed")
        .is_none());
}

pub async fn test_collection_isolation<B: LedgerBackend + ?Sized>(backend: &B) {
    let doc = make_doc(&unique_silo("test_isolation"), SyncState::Pending);
    backend
        .write(Collection::Silos, doc.clone(), WriteMode::Insert)
        .await
        .expect("insert should succeed");

    for other in [Collection::Events, Collection::Analyses] {
        assert!(backend
            .get(other, &doc.key)
            .await
            .expect("get should succeed")
            .is_none());
    }
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all LedgerBackend interface tests against a backend implementation.
#[macro_export]
macro_rules! run_ledger_backend_tests {
    ($backend:expr) => {
        use $crate::storage::ledger_backend_tests::*;

        test_insert_then_get($backend).await;
        println!("  test_insert_then_get: PASSED");

        test_get_missing($backend).await;
        println!("  test_get_missing: PASSED");

        test_insert_conflict_keeps_original($backend).await;
        println!("  test_insert_conflict_keeps_original: PASSED");

        test_upsert_replaces($backend).await;
        println!("  test_upsert_replaces: PASSED");

        test_find_filters($backend).await;
        println!("  test_find_filters: PASSED");

        test_find_preserves_timestamps($backend).await;
        println!("  test_find_preserves_timestamps: PASSED");

        test_delete($backend).await;
        println!("  test_delete: PASSED");

        test_collection_isolation($backend).await;
        println!("  test_collection_isolation: PASSED");
    };
}
