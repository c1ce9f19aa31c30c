//! Integration tests for cache invalidation driven by the policy change feed.

mod common;

use rspolicy_domain::model::PolicyImports;
use rspolicy_domain::PolicyCommand;
use rspolicy_server::enforcement::EnforcementMetadata;

use common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_evicts_both_caches() {
    let service = start_service();
    let created = persist(
        &service,
        PolicyCommand::CreatePolicy {
            policy: policy("com.example:p1", [entry("EndUser", "google:alice", "thing:/", &["READ"])]),
        },
    )
    .await;
    wait_for_updater(&service).await;
    let cached = service
        .read_enforcer(&EnforcementMetadata::from_event(&created))
        .await;
    assert!(cached.exists());
    let p1 = id("com.example:p1");

    persist(
        &service,
        PolicyCommand::ModifyPolicyEntry {
            policy_id: p1.clone(),
            entry: entry("Admin", "google:bob", "thing:/", &["WRITE"]),
        },
    )
    .await;

    wait_for_enforcer_eviction(&service, &p1).await;
    wait_for_policy_eviction(&service, &p1).await;
    service.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_imported_change_cascades_to_importer_enforcer_only() {
    // Arrange: p1 imports p2, both cached
    let service = start_service();
    let (p1, p2) = (id("com.example:p1"), id("com.example:p2"));
    persist(
        &service,
        PolicyCommand::CreatePolicy {
            policy: policy("com.example:p2", [entry("Admin", "google:bob", "thing:/", &["WRITE"])]),
        },
    )
    .await;
    persist(
        &service,
        PolicyCommand::CreatePolicy {
            policy: policy("com.example:p1", [entry("EndUser", "google:alice", "thing:/", &["READ"])]),
        },
    )
    .await;
    let imported = persist(
        &service,
        PolicyCommand::ModifyPolicyImports {
            policy_id: p1.clone(),
            imports: imports(&["com.example:p2"]),
        },
    )
    .await;
    wait_for_updater(&service).await;
    let before = service
        .read_enforcer(&EnforcementMetadata::from_event(&imported))
        .await;
    assert!(!before
        .value()
        .unwrap()
        .has_permission(&sid("google:carol"), &key("thing:/x"), "WRITE"));
    assert_eq!(service.policy_cache().tracker().dependents_of(&p2).len(), 1);

    // Act: change the imported policy only
    persist(
        &service,
        PolicyCommand::ModifyPolicyEntry {
            policy_id: p2.clone(),
            entry: entry("Admin", "google:carol", "thing:/", &["WRITE"]),
        },
    )
    .await;

    // Assert
    wait_for_enforcer_eviction(&service, &p1).await;
    assert!(service.policy_cache().get_if_present(&p1).await.is_some());

    let after = service
        .read_enforcer(&EnforcementMetadata::from_event(&imported))
        .await;
    assert_eq!(after.revision(), imported.revision);
    assert!(after
        .value()
        .unwrap()
        .has_permission(&sid("google:carol"), &key("thing:/x"), "WRITE"));
    service.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_removed_import_stops_contributing_entries() {
    let service = start_service();
    let p1 = id("com.example:p1");
    persist(
        &service,
        PolicyCommand::CreatePolicy {
            policy: policy("com.example:p2", [entry("Admin", "google:bob", "thing:/", &["WRITE"])]),
        },
    )
    .await;
    persist(
        &service,
        PolicyCommand::CreatePolicy {
            policy: policy("com.example:p1", [entry("EndUser", "google:alice", "thing:/", &["READ"])]),
        },
    )
    .await;
    persist(
        &service,
        PolicyCommand::ModifyPolicyImports {
            policy_id: p1.clone(),
            imports: imports(&["com.example:p2"]),
        },
    )
    .await;

    let cleared = persist(
        &service,
        PolicyCommand::ModifyPolicyImports {
            policy_id: p1.clone(),
            imports: PolicyImports::default(),
        },
    )
    .await;
    let entry = service
        .read_enforcer(&EnforcementMetadata::from_event(&cleared))
        .await;

    let enforcer = entry.value().unwrap();
    assert_eq!(enforcer.revision(), cleared.revision);
    assert!(enforcer.entries().iter().all(|e| !e.label.is_imported()));
    assert!(!enforcer.has_permission(&sid("google:bob"), &key("thing:/x"), "WRITE"));
    service.shutdown();
}
