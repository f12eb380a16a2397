mod common;

use std::sync::Arc;

use civic_storage::{
    adapters::repositories::{InMemoryOperationRepository, InMemoryStorageFileRepository},
    application::{
        dto::storage_config_dto::StorageConfigDTO,
        error::{StorageError, ValidationError},
        repositories::file_repository::StorageFileRepository,
        services::{
            health_checker::HealthStatus, CloudUuidStorageService, StorageDependencies,
        },
    },
    domain::{
        config::storage::{OrphanPolicy, RetentionAction, StorageFolder},
        models::{
            file::FileUpdate,
            operation::OperationKind,
            quota::QuotaScope,
        },
    },
    resilience::circuit_breaker::CircuitPhase,
    services::DefaultBackendFactory,
};
use common::{config, content, local_config, upload, Harness, StaticCredentials};

const MB: usize = 1024 * 1024;

// ==================== Upload Tests ====================

#[tokio::test]
async fn test_upload_round_trip() {
    let h = Harness::start(config(&["primary"])).await;

    let result = h
        .service
        .upload_file(upload("public", "minutes.pdf", 1024, "clerk").with_description("March"))
        .await;
    assert!(result.success, "{:?}", result.error);
    let file = result.file.unwrap();

    let fetched = h.service.get_file_by_id(file.id).await.unwrap();
    assert_eq!(fetched, file);
    assert_eq!(fetched.description.as_deref(), Some("March"));
    assert_eq!(fetched.provider, "primary");

    let stored = h.service.get_file_content(file.id).await.unwrap();
    assert_eq!(stored.as_ref(), content(1024).as_slice());

    let listed = h.service.list_files("public").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, file.id);
}

#[tokio::test]
async fn test_public_notice_scenario() {
    let h = Harness::start(config(&["primary"])).await;

    let accepted = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 2 * MB, "clerk"))
        .await
        .unwrap();
    assert_eq!(accepted.stored_filename, format!("notice.{}.pdf", accepted.id));
    assert_eq!(
        accepted.relative_path,
        format!("public/notice.{}.pdf", accepted.id)
    );
    assert_eq!(accepted.size, (2 * MB) as u64);
    assert_eq!(h.files.len(), 1);
    assert_eq!(h.total_puts(), 1);

    let oversized = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 15 * MB, "clerk"))
        .await;
    assert!(matches!(
        oversized,
        Err(StorageError::Validation(ValidationError::SizeExceeded { .. }))
    ));
    assert_eq!(h.files.len(), 1);
    assert_eq!(h.total_puts(), 1);

    let executable = h
        .service
        .upload_file(upload("public", "setup.exe", 10, "clerk"))
        .await;
    assert!(!executable.success);
    assert!(executable.error.unwrap().contains("exe"));
    assert_eq!(h.total_puts(), 1);
    assert_eq!(h.files.len(), 1);
}

#[tokio::test]
async fn test_each_upload_gets_a_new_id() {
    let h = Harness::start(config(&["primary"])).await;

    let first = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk"))
        .await
        .unwrap();
    let second = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk"))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.provider_path, second.provider_path);
}

#[tokio::test]
async fn test_idempotency_key_replays_first_upload() {
    let h = Harness::start(config(&["primary"])).await;

    let first = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk").with_idempotency_key("req-1"))
        .await
        .unwrap();
    let replay = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk").with_idempotency_key("req-1"))
        .await
        .unwrap();

    assert_eq!(first.id, replay.id);
    assert_eq!(h.total_puts(), 1);
    assert_eq!(h.files.len(), 1);
}

#[tokio::test]
async fn test_same_idempotency_key_in_flight_is_busy() {
    let (h, files) = Harness::start_pausing(config(&["primary"])).await;
    files.arm();

    let first = tokio::spawn({
        let service = h.service.clone();
        async move {
            service
                .try_upload_file(upload("public", "notice.pdf", 10, "clerk").with_idempotency_key("req-1"))
                .await
        }
    });
    files.created.notified().await;

    let second = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk").with_idempotency_key("req-1"))
        .await;
    assert!(matches!(second, Err(StorageError::Busy(_))));

    files.resume.notify_one();
    let stored = first.await.unwrap().unwrap();

    let replay = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk").with_idempotency_key("req-1"))
        .await
        .unwrap();
    assert_eq!(replay.id, stored.id);
    assert_eq!(h.total_puts(), 1);
    assert_eq!(h.files.len(), 1);
}

#[tokio::test]
async fn test_failed_upload_frees_idempotency_key() {
    let h = Harness::start(config(&["primary"])).await;
    h.backend("primary").set_disk_full(true);

    let request = || upload("public", "notice.pdf", 10, "clerk").with_idempotency_key("req-1");
    assert!(h.service.try_upload_file(request()).await.is_err());

    h.backend("primary").set_disk_full(false);
    let file = h.service.try_upload_file(request()).await.unwrap();
    assert_eq!(file.provider, "primary");
}

#[tokio::test]
async fn test_unknown_folder_is_not_found() {
    let h = Harness::start(config(&["primary"])).await;

    let result = h
        .service
        .try_upload_file(upload("secret", "a.pdf", 10, "clerk"))
        .await;
    assert!(matches!(result, Err(StorageError::NotFound(_))));
    assert!(matches!(
        h.service.list_files("secret").await,
        Err(StorageError::NotFound(_))
    ));
    assert_eq!(h.total_puts(), 0);
}

#[tokio::test]
async fn test_calls_before_initialize_fail() {
    let h = Harness::build(config(&["primary"]), &[]);
    let result = h
        .service
        .try_upload_file(upload("public", "a.pdf", 10, "clerk"))
        .await;
    assert!(matches!(result, Err(StorageError::Configuration(_))));
}

// ==================== Delete / Update Tests ====================

#[tokio::test]
async fn test_delete_removes_content_and_row() {
    let h = Harness::start(config(&["primary"])).await;
    let file = h
        .service
        .try_upload_file(upload("private", "memo.txt", 100, "clerk"))
        .await
        .unwrap();
    assert!(h.backend("primary").contains(&file.provider_path));

    h.service.delete_file(file.id, Some("clerk")).await.unwrap();

    assert!(!h.backend("primary").contains(&file.provider_path));
    assert!(matches!(
        h.service.get_file_by_id(file.id).await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        h.service.delete_file(file.id, Some("clerk")).await,
        Err(StorageError::NotFound(_))
    ));

    let audit = h.operations.all();
    let delete = audit
        .iter()
        .find(|op| op.kind == OperationKind::Delete && op.success)
        .unwrap();
    assert_eq!(delete.user_id.as_deref(), Some("clerk"));
}

#[tokio::test]
async fn test_delete_with_missing_object_still_removes_row() {
    let h = Harness::start(config(&["primary"])).await;
    let file = h
        .service
        .try_upload_file(upload("private", "memo.txt", 100, "clerk"))
        .await
        .unwrap();
    h.backend("primary").remove(&file.provider_path);

    h.service.delete_file(file.id, None).await.unwrap();
    assert!(h.files.is_empty());
}

#[tokio::test]
async fn test_update_invalidates_cached_metadata() {
    let h = Harness::start(config(&["primary"])).await;
    let file = h
        .service
        .try_upload_file(upload("public", "agenda.pdf", 10, "clerk"))
        .await
        .unwrap();

    // Warm the cache.
    h.service.get_file_by_id(file.id).await.unwrap();
    h.service.get_file_by_id(file.id).await.unwrap();
    assert!(h.service.metrics().cache.unwrap().hits >= 1);

    let updated = h
        .service
        .update_file(
            file.id,
            FileUpdate {
                description: Some("Revised agenda".to_string()),
                updated_by: Some("mayor".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("Revised agenda"));

    let fetched = h.service.get_file_by_id(file.id).await.unwrap();
    assert_eq!(fetched.description.as_deref(), Some("Revised agenda"));
    assert_eq!(fetched.updated_by.as_deref(), Some("mayor"));

    h.service.delete_file(file.id, None).await.unwrap();
    assert!(matches!(
        h.service.get_file_by_id(file.id).await,
        Err(StorageError::NotFound(_))
    ));
}

// ==================== Quota Tests ====================

#[tokio::test]
async fn test_folder_quota_admits_single_winner() {
    let mut cfg = config(&["primary"]);
    cfg.folders.get_mut("private").unwrap().quota = Some("3KB".to_string());
    let h = Harness::start(cfg).await;

    let service = h.service.clone();
    let (a, b) = tokio::join!(
        service.try_upload_file(upload("private", "a.txt", 2048, "clerk")),
        service.try_upload_file(upload("private", "b.txt", 2048, "mayor")),
    );

    let winners = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(winners, 1);
    let loser = if a.is_err() { a } else { b };
    assert!(matches!(loser, Err(StorageError::QuotaExceeded { .. })));
    assert_eq!(h.files.len(), 1);
}

#[tokio::test]
async fn test_delete_releases_quota() {
    let mut cfg = config(&["primary"]);
    cfg.quotas.default_uploader_limit = Some("1KB".to_string());
    let h = Harness::start(cfg).await;

    let file = h
        .service
        .try_upload_file(upload("private", "a.txt", 1000, "clerk"))
        .await
        .unwrap();
    assert!(matches!(
        h.service
            .try_upload_file(upload("private", "b.txt", 100, "clerk"))
            .await,
        Err(StorageError::QuotaExceeded { .. })
    ));

    h.service.delete_file(file.id, None).await.unwrap();
    h.service
        .try_upload_file(upload("private", "b.txt", 100, "clerk"))
        .await
        .unwrap();

    let quotas = h.service.metrics().quotas;
    let clerk = quotas
        .iter()
        .find(|q| q.scope == QuotaScope::Uploader("clerk".to_string()))
        .unwrap();
    assert_eq!(clerk.used_bytes, 100);
    assert_eq!(clerk.limit_bytes, Some(1024));
}

#[tokio::test]
async fn test_reinitialize_keeps_quota_usage() {
    let mut cfg = config(&["primary"]);
    cfg.folders.get_mut("private").unwrap().quota = Some("1KB".to_string());
    let h = Harness::start(cfg).await;

    h.service
        .try_upload_file(upload("private", "a.txt", 1000, "clerk"))
        .await
        .unwrap();

    // Re-seeding from the stored rows keeps the bytes already used.
    h.service.initialize().await.unwrap();
    assert!(matches!(
        h.service
            .try_upload_file(upload("private", "b.txt", 100, "clerk"))
            .await,
        Err(StorageError::QuotaExceeded { .. })
    ));
}

#[tokio::test]
async fn test_quota_reseed_waits_for_inflight_upload() {
    let mut cfg = config(&["primary"]);
    cfg.folders.get_mut("private").unwrap().quota = Some("4KB".to_string());
    let (h, files) = Harness::start_pausing(cfg).await;
    files.arm();

    let uploader = tokio::spawn({
        let service = h.service.clone();
        async move {
            service
                .try_upload_file(upload("private", "a.txt", 1024, "clerk"))
                .await
        }
    });
    // The row exists, the quota commit has not happened yet.
    files.created.notified().await;

    let cleanup = tokio::spawn({
        let service = h.service.clone();
        async move { service.run_cleanup().await }
    });
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    files.resume.notify_one();
    uploader.await.unwrap().unwrap();
    cleanup.await.unwrap().unwrap();

    let quotas = h.service.metrics().quotas;
    let private = quotas
        .iter()
        .find(|q| q.scope == QuotaScope::Folder("private".to_string()))
        .unwrap();
    assert_eq!(private.used_bytes, 1024);

    // Exactly 3KB left.
    h.service
        .try_upload_file(upload("private", "b.txt", 3072, "mayor"))
        .await
        .unwrap();
    assert!(matches!(
        h.service
            .try_upload_file(upload("private", "c.txt", 1, "mayor"))
            .await,
        Err(StorageError::QuotaExceeded { .. })
    ));
}

// ==================== Failover Tests ====================

#[tokio::test]
async fn test_upload_fails_over_and_audits_attempts() {
    let h = Harness::start(config(&["primary", "secondary"])).await;
    h.backend("primary").set_failing(true);

    let file = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk"))
        .await
        .unwrap();

    assert_eq!(file.provider, "secondary");
    assert!(h.backend("secondary").contains(&file.provider_path));
    assert_eq!(h.backend("primary").put_count(), 2);

    let audit = h.operations.all();
    let upload_op = audit
        .iter()
        .find(|op| op.kind == OperationKind::Upload)
        .unwrap();
    assert!(upload_op.success);
    assert_eq!(
        upload_op.metadata["attemptedProviders"],
        serde_json::json!(["primary", "secondary"])
    );

    // Reads go to the provider that holds the object.
    let stored = h.service.get_file_content(file.id).await.unwrap();
    assert_eq!(stored.as_ref(), content(10).as_slice());
}

#[tokio::test]
async fn test_permanent_write_fault_fails_over() {
    let h = Harness::start(config(&["primary", "secondary"])).await;
    h.backend("primary").set_disk_full(true);

    let file = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 300, "clerk"))
        .await
        .unwrap();

    assert_eq!(file.provider, "secondary");
    // Not a transient fault: one attempt only.
    assert_eq!(h.backend("primary").put_count(), 1);
    let stored = h.service.get_file_content(file.id).await.unwrap();
    assert_eq!(stored.as_ref(), content(300).as_slice());

    let circuits = h.service.metrics().circuits;
    let primary = circuits.iter().find(|c| c.provider == "primary").unwrap();
    assert_eq!(primary.consecutive_failures, 1);
}

#[tokio::test]
async fn test_permanent_write_fault_without_failover_is_provider_unavailable() {
    let h = Harness::start(config(&["primary"])).await;
    h.backend("primary").set_disk_full(true);

    let result = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk"))
        .await;
    assert!(matches!(result, Err(StorageError::ProviderUnavailable { .. })));
    assert!(h.files.is_empty());
}

#[tokio::test]
async fn test_all_providers_down_is_provider_unavailable() {
    let h = Harness::start(config(&["primary", "secondary"])).await;
    h.backend("primary").set_failing(true);
    h.backend("secondary").set_failing(true);

    let result = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk"))
        .await;
    match result {
        Err(StorageError::ProviderUnavailable { attempted, .. }) => {
            assert_eq!(attempted, vec!["primary", "secondary"]);
        }
        other => panic!("unexpected result: {:?}", other.map(|f| f.id)),
    }
    assert!(h.files.is_empty());

    let audit = h.operations.all();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
    assert!(audit[0].error.is_some());
    assert_eq!(
        audit[0].metadata["attemptedProviders"],
        serde_json::json!(["primary", "secondary"])
    );
}

#[tokio::test]
async fn test_repeated_faults_open_the_primary_circuit() {
    let h = Harness::start(config(&["primary", "secondary"])).await;
    h.backend("primary").set_failing(true);

    for i in 0..3 {
        h.service
            .try_upload_file(upload("public", &format!("n{}.pdf", i), 10, "clerk"))
            .await
            .unwrap();
    }

    let circuits = h.service.metrics().circuits;
    let primary = circuits.iter().find(|c| c.provider == "primary").unwrap();
    assert_eq!(primary.phase, CircuitPhase::Open);

    let puts_before = h.backend("primary").put_count();
    h.service
        .try_upload_file(upload("public", "later.pdf", 10, "clerk"))
        .await
        .unwrap();
    assert_eq!(h.backend("primary").put_count(), puts_before);

    h.service.reset_circuit("primary").unwrap();
    let circuits = h.service.metrics().circuits;
    let primary = circuits.iter().find(|c| c.provider == "primary").unwrap();
    assert_eq!(primary.phase, CircuitPhase::Closed);
}

#[tokio::test]
async fn test_failover_disabled_stays_on_primary() {
    let mut cfg = config(&["primary", "secondary"]);
    cfg.resilience.failover_enabled = false;
    let h = Harness::start(cfg).await;
    h.backend("primary").set_failing(true);

    let result = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk"))
        .await;
    assert!(matches!(result, Err(StorageError::ProviderUnavailable { .. })));
    assert_eq!(h.backend("secondary").put_count(), 0);
}

// ==================== Initialization / Config Tests ====================

#[tokio::test]
async fn test_broken_secondary_is_excluded() {
    let h = Harness::build(config(&["primary", "secondary"]), &["secondary"]);
    h.service.initialize().await.unwrap();
    h.backend("primary").set_failing(true);

    let result = h
        .service
        .try_upload_file(upload("public", "notice.pdf", 10, "clerk"))
        .await;
    match result {
        Err(StorageError::ProviderUnavailable { attempted, .. }) => {
            assert_eq!(attempted, vec!["primary"])
        }
        other => panic!("unexpected result: {:?}", other.map(|f| f.id)),
    }
}

#[tokio::test]
async fn test_broken_active_provider_is_fatal() {
    let h = Harness::build(config(&["primary", "secondary"]), &["primary"]);
    assert!(matches!(
        h.service.initialize().await,
        Err(StorageError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_update_config_keeps_old_config_on_failure() {
    let h = Harness::start(config(&["primary", "secondary"])).await;

    let invalid = StorageConfigDTO {
        active_provider: Some("nowhere".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        h.service.update_config(invalid).await,
        Err(StorageError::Configuration(_))
    ));
    assert_eq!(h.service.get_config().active_provider, "primary");

    let mut folders = std::collections::HashMap::new();
    folders.insert(
        "minutes".to_string(),
        StorageFolder::new("minutes", &["pdf"], "5MB"),
    );
    let switch = StorageConfigDTO {
        active_provider: Some("secondary".to_string()),
        folders: Some(folders),
        ..Default::default()
    };
    let updated = h.service.update_config(switch).await.unwrap();
    assert_eq!(updated.active_provider, "secondary");
    assert!(updated.folders.contains_key("public"));

    let file = h
        .service
        .try_upload_file(upload("minutes", "m.pdf", 10, "clerk"))
        .await
        .unwrap();
    assert_eq!(file.provider, "secondary");
}

// ==================== Health / Metrics / Usage Tests ====================

#[tokio::test]
async fn test_health_aggregation() {
    let h = Harness::start(config(&["primary", "secondary"])).await;
    assert_eq!(h.service.health().await.unwrap().status, HealthStatus::Healthy);

    h.backend("secondary").set_healthy(false);
    assert_eq!(h.service.health().await.unwrap().status, HealthStatus::Degraded);

    h.backend("primary").set_healthy(false);
    let report = h.service.health().await.unwrap();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.active_provider, "primary");
}

#[tokio::test]
async fn test_metrics_and_usage_reflect_uploads() {
    let h = Harness::start(config(&["primary"])).await;
    for (name, user) in [("a.pdf", "clerk"), ("b.pdf", "clerk"), ("c.pdf", "mayor")] {
        h.service
            .try_upload_file(upload("public", name, 100, user))
            .await
            .unwrap();
    }

    let usage = h.service.usage().await.unwrap();
    assert_eq!(usage.total.file_count, 3);
    assert_eq!(usage.folders["public"].total_bytes, 300);
    assert_eq!(usage.uploaders["clerk"].file_count, 2);

    let metrics = h.service.metrics();
    let uploads = metrics
        .operations
        .iter()
        .find(|m| m.provider == "primary" && m.operation == OperationKind::Upload)
        .unwrap();
    assert_eq!(uploads.stats.count, 3);
    assert_eq!(uploads.stats.errors, 0);
    assert_eq!(metrics.in_flight["provider:primary"], 0);
}

// ==================== Maintenance Tests ====================

#[tokio::test]
async fn test_cleanup_reports_orphans_without_deleting() {
    let h = Harness::start(config(&["primary"])).await;
    let file = h
        .service
        .try_upload_file(upload("public", "kept.pdf", 10, "clerk"))
        .await
        .unwrap();
    h.backend("primary").insert("public/stray.pdf", b"stray");

    let report = h.service.run_cleanup().await.unwrap();
    assert_eq!(report.cleanup.policy, OrphanPolicy::Report);
    assert_eq!(report.cleanup.orphans.len(), 1);
    assert_eq!(report.cleanup.orphans[0].locator, "public/stray.pdf");
    assert!(report.cleanup.dangling.is_empty());
    assert!(h.backend("primary").contains("public/stray.pdf"));
    assert!(h.backend("primary").contains(&file.provider_path));
}

#[tokio::test]
async fn test_cleanup_with_local_backend_removes_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = local_config(dir.path().join("storage"));
    cfg.cleanup.orphan_policy = OrphanPolicy::Delete;

    let files = Arc::new(InMemoryStorageFileRepository::new());
    let operations = Arc::new(InMemoryOperationRepository::new());
    let service = CloudUuidStorageService::new(
        cfg,
        StorageDependencies {
            files: files.clone(),
            operations: operations.clone(),
            credentials: Arc::new(StaticCredentials),
            backends: Arc::new(DefaultBackendFactory),
            cache: None,
        },
    )
    .unwrap();
    service.initialize().await.unwrap();
    assert!(dir.path().join("storage/public").is_dir());

    let kept = service
        .try_upload_file(upload("public", "kept.pdf", 10, "clerk"))
        .await
        .unwrap();
    let lost = service
        .try_upload_file(upload("public", "lost.pdf", 10, "clerk"))
        .await
        .unwrap();
    tokio::fs::remove_file(dir.path().join("storage").join(&lost.provider_path))
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("storage/public/stray.pdf"), b"stray")
        .await
        .unwrap();

    let report = service.run_cleanup().await.unwrap();
    assert_eq!(report.cleanup.removed_orphans, 1);
    assert_eq!(report.cleanup.removed_dangling, 1);
    assert!(!dir.path().join("storage/public/stray.pdf").exists());
    assert!(files.get_storage_file_by_id(lost.id).await.unwrap().is_none());

    assert_eq!(
        service.get_file_content(kept.id).await.unwrap().as_ref(),
        content(10).as_slice()
    );
    let usage = service.usage().await.unwrap();
    assert_eq!(usage.total.file_count, 1);
    assert!(operations
        .all()
        .iter()
        .any(|op| op.kind == OperationKind::OrphanCleanup));
}

#[tokio::test]
async fn test_lifecycle_expires_old_files() {
    let mut cfg = config(&["primary"]);
    {
        let drafts = StorageFolder {
            retention_days: Some(30),
            retention_action: RetentionAction::Delete,
            ..StorageFolder::new("drafts", &[], "1MB")
        };
        cfg.folders.insert("drafts".to_string(), drafts);
    }
    let h = Harness::start(cfg).await;

    let old = h
        .service
        .try_upload_file(upload("drafts", "old.txt", 10, "clerk"))
        .await
        .unwrap();
    let fresh = h
        .service
        .try_upload_file(upload("drafts", "fresh.txt", 10, "clerk"))
        .await
        .unwrap();

    // Age one row past the retention window.
    let mut aged = h.files.get_storage_file_by_id(old.id).await.unwrap().unwrap();
    h.files.delete_storage_file(old.id).await.unwrap();
    aged.created_at = aged.created_at - chrono::Duration::days(31);
    h.files.create_storage_file(aged).await.unwrap();

    let report = h.service.run_cleanup().await.unwrap();
    assert_eq!(report.lifecycle.expired(), 1);
    assert!(!h.backend("primary").contains(&old.provider_path));
    assert!(h.files.get_storage_file_by_id(old.id).await.unwrap().is_none());
    assert!(h.files.get_storage_file_by_id(fresh.id).await.unwrap().is_some());
    assert!(h
        .operations
        .all()
        .iter()
        .any(|op| op.kind == OperationKind::Expire && op.success));
}

#[tokio::test(start_paused = true)]
async fn test_background_cleanup_runs_on_interval() {
    let mut cfg = config(&["primary"]);
    cfg.cleanup.interval_secs = 60;
    let h = Harness::start(cfg).await;

    let task = h.service.start_background_tasks().unwrap();
    tokio::time::sleep(std::time::Duration::from_secs(61)).await;

    assert!(h
        .operations
        .all()
        .iter()
        .any(|op| op.kind == OperationKind::OrphanCleanup));
    task.abort();
}
