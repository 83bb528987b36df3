//! Durable backends and collection policies behind `Stores`.

use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;

use clawyer_store::collections::{EmailRecord, JobRecord, JobStatus};
use clawyer_store::config::{
    CacheConfig, CollectionsConfig, LoggingConfig, StorageBackend, StorageConfig,
};
use clawyer_store::graph::Matter;
use clawyer_store::ids::WorkspaceId;
use clawyer_store::{StoreConfig, Stores};

fn ws() -> WorkspaceId {
    WorkspaceId::new("tiers").unwrap_or_else(|| panic!("invalid workspace id"))
}

fn config(backend: StorageBackend, path: &std::path::Path, cache: CacheConfig) -> StoreConfig {
    StoreConfig {
        storage: StorageConfig {
            backend,
            path: path.to_path_buf(),
            cache,
            text_field_budget: 1024,
        },
        collections: CollectionsConfig {
            job_ttl: Some(Duration::from_secs(60 * 60)),
            job_max_items: None,
            email_max_items: Some(3),
            audit_max_items: Some(100),
        },
        logging: LoggingConfig {
            filter: "clawyer_store=debug".to_string(),
            json: false,
        },
    }
}

fn roomy_cache() -> CacheConfig {
    CacheConfig {
        max_entries: 64,
        max_value_bytes: 64 * 1024,
        max_total_bytes: 1024 * 1024,
    }
}

#[tokio::test]
async fn fs_backend_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(StorageBackend::Fs, dir.path(), roomy_cache());

    let stores = Stores::open(&config).await.expect("open");
    stores
        .graph
        .upsert_matter(
            &ws(),
            Matter {
                id: "m1".to_string(),
                title: "Estate".to_string(),
                ..Matter::default()
            },
        )
        .await
        .expect("upsert");
    drop(stores);

    let reopened = Stores::open(&config).await.expect("reopen");
    let graph = reopened.graph.get(&ws()).await.expect("graph");
    assert_eq!(graph.matters["m1"].title, "Estate");
    assert!(dir.path().join("tiers").join("graph.json").exists());
}

#[cfg(feature = "libsql")]
#[tokio::test]
async fn libsql_backend_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(StorageBackend::LibSql, dir.path(), roomy_cache());

    {
        let stores = Stores::open(&config).await.expect("open");
        stores
            .emails
            .upsert(
                &ws(),
                EmailRecord {
                    id: "e1".to_string(),
                    subject: "Settlement".to_string(),
                    created_at: Utc::now(),
                    ..EmailRecord::default()
                },
            )
            .await
            .expect("upsert");
    }

    let reopened = Stores::open(&config).await.expect("reopen");
    let emails = reopened.emails.get(&ws()).await.expect("emails");
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].subject, "Settlement");
}

#[tokio::test]
async fn graph_too_big_for_cache_is_still_persisted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tiny = CacheConfig {
        max_entries: 4,
        max_value_bytes: 2048,
        max_total_bytes: 4096,
    };
    let stores = Stores::open(&config(StorageBackend::Fs, dir.path(), tiny))
        .await
        .expect("open");

    for n in 0..40 {
        stores
            .graph
            .upsert_matter(
                &ws(),
                Matter {
                    id: format!("m{n:02}"),
                    title: format!("Matter number {n}"),
                    ..Matter::default()
                },
            )
            .await
            .expect("upsert");
    }

    assert!(stores.tiers.stats().cache_write_failures > 0);
    let graph = stores.graph.get(&ws()).await.expect("graph");
    assert_eq!(graph.matters.len(), 40);
}

fn job(id: &str, age: chrono::Duration) -> JobRecord {
    let at = Utc::now() - age;
    JobRecord {
        id: id.to_string(),
        kind: "ocr".to_string(),
        status: JobStatus::Succeeded,
        created_at: at,
        updated_at: at,
        ..JobRecord::default()
    }
}

#[tokio::test]
async fn expired_jobs_are_purged() {
    let config = config(StorageBackend::Memory, std::path::Path::new(""), roomy_cache());
    let stores = Stores::open(&config).await.expect("open");

    stores
        .tiers
        .set_json(
            &clawyer_store::StorageKey::new(&ws(), "jobs"),
            &vec![
                job("old", chrono::Duration::hours(5)),
                job("fresh", chrono::Duration::minutes(5)),
            ],
        )
        .await
        .expect("seed");

    assert_eq!(stores.jobs.purge_expired(&ws()).await.expect("purge"), 1);
    let ids: Vec<String> = stores
        .jobs
        .get(&ws())
        .await
        .expect("jobs")
        .into_iter()
        .map(|j| j.id)
        .collect();
    assert_eq!(ids, vec!["fresh"]);

    let stored = stores
        .jobs
        .upsert(&ws(), job("stale", chrono::Duration::hours(2)))
        .await
        .expect("upsert");
    assert!(stored.is_none());
    assert!(stores.jobs.find(&ws(), "stale").await.expect("find").is_none());
}

#[tokio::test]
async fn email_cap_keeps_newest() {
    let stores = Stores::open(&config(
        StorageBackend::Memory,
        std::path::Path::new(""),
        roomy_cache(),
    ))
    .await
    .expect("open");

    for n in 0..5i64 {
        stores
            .emails
            .upsert(
                &ws(),
                EmailRecord {
                    id: format!("e{n}"),
                    sent_at: Some(Utc::now() - chrono::Duration::minutes(10 - n)),
                    ..EmailRecord::default()
                },
            )
            .await
            .expect("upsert");
    }

    let ids: Vec<String> = stores
        .emails
        .get(&ws())
        .await
        .expect("emails")
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["e2", "e3", "e4"]);
}

#[tokio::test]
async fn watch_sees_collection_writes() {
    use tokio_stream::StreamExt as _;

    let stores = Stores::open(&StoreConfig::in_memory()).await.expect("open");
    let mut stream = stores.emails.watch(&ws()).await.expect("watch");
    assert_eq!(stream.next().await, Some(Vec::new()));

    stores
        .emails
        .upsert(
            &ws(),
            EmailRecord {
                id: "e1".to_string(),
                created_at: Utc::now(),
                ..EmailRecord::default()
            },
        )
        .await
        .expect("upsert");
    let next = stream.next().await.expect("update");
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, "e1");
}
