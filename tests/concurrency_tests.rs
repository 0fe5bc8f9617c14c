//! Concurrency tests for HomeVault.
//!
//! Shared state is only the user store, the token store and the disk, so
//! these tests hammer each of them from many tasks at once.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};
use homevault::models::file::UploadedFile;
use homevault::models::user::User;
use homevault::repository::{InMemoryTokenStore, JsonUserStore, TokenStore, UserStore};
use homevault::services::storage::StorageService;
use tempfile::TempDir;

// ===== Uploads =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_all_land() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageService::new(dir.path(), 1024 * 1024).await.unwrap());
    let sb = storage.sandbox_for("alice").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let storage = storage.clone();
        let sb = sb.clone();
        handles.push(tokio::spawn(async move {
            let file = UploadedFile {
                name: format!("file-{i}.txt"),
                data: Bytes::from(vec![b'x'; 100]),
            };
            storage.upload(&sb, "", vec![file]).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(storage.usage(&sb).await.unwrap().used, 1600);
    let tree = storage.list_tree(&sb).await.unwrap();
    assert_eq!(tree.children.unwrap().len(), 16, "no temp files may remain");
}

/// Quota checks read usage from disk without a reservation, so two uploads
/// racing each other can both pass against the same figure. The cap still
/// holds for every request issued after they finished.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quota_is_enforced_once_uploads_settle() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageService::new(dir.path(), 1000).await.unwrap());
    let sb = storage.sandbox_for("alice").await.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let storage = storage.clone();
        let sb = sb.clone();
        handles.push(tokio::spawn(async move {
            let file = UploadedFile {
                name: format!("chunk-{i}.bin"),
                data: Bytes::from(vec![0u8; 400]),
            };
            storage.upload(&sb, "", vec![file]).await
        }));
    }
    let accepted = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    assert!(accepted >= 2, "at least the first two uploads fit");

    let late = UploadedFile {
        name: "late.bin".to_string(),
        data: Bytes::from(vec![0u8; 400]),
    };
    assert!(storage.upload(&sb, "", vec![late]).await.is_err());
}

// ===== Stores =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_are_all_persisted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("users.json");
    let store = Arc::new(JsonUserStore::load(&path).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.insert(User::new(&format!("user{i}"), "hash".to_string())).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let reloaded = JsonUserStore::load(&path).await.unwrap();
    for i in 0..20 {
        assert!(
            reloaded.find_by_username(&format!("user{i}")).await.unwrap().is_some(),
            "user{i} must survive a reload"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_registration_race_has_one_winner() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonUserStore::load(dir.path().join("users.json")).await.unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.insert(User::new("carol", "hash".to_string())).await
        }));
    }
    let winners = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(()))))
        .count();

    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reset_token_is_taken_once() {
    let tokens = Arc::new(InMemoryTokenStore::new());
    tokens
        .save_reset_token(
            "hash".to_string(),
            homevault::models::user::ResetTokenRecord {
                username: "alice".to_string(),
                expires_at: Utc::now() + Duration::minutes(5),
            },
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let tokens = tokens.clone();
        handles.push(tokio::spawn(async move { tokens.take_reset_token("hash").await }));
    }
    let taken = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(Some(_)))))
        .count();

    assert_eq!(taken, 1);
}
