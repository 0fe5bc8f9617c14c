//! Account and session tests for HomeVault.

use std::sync::Arc;

use async_trait::async_trait;
use homevault::config::Config;
use homevault::models::user::{ProfileUpdate, User};
use homevault::repository::{InMemoryTokenStore, InMemoryUserStore, JsonUserStore, UserStore};
use homevault::services::auth::{hash_password, AuthError, AuthService, Identity};
use homevault::services::notification::Notifier;
use homevault::services::storage::StorageService;
use parking_lot::Mutex;
use tempfile::TempDir;

const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

#[derive(Default)]
struct RecordingNotifier {
    links: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    fn last_token(&self) -> Option<String> {
        let links = self.links.lock();
        let (_, link) = links.last()?;
        link.split("token=").nth(1).map(str::to_string)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_password_reset(&self, user: &User, reset_link: &str) -> anyhow::Result<()> {
        self.links
            .lock()
            .push((user.username.clone(), reset_link.to_string()));
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    auth: AuthService,
    users: Arc<InMemoryUserStore>,
    notifier: Arc<RecordingNotifier>,
    storage: StorageService,
}

async fn harness(allow_registration: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = Config::new(dir.path().join("users"), dir.path().join("users.json"), SECRET);
    config.allow_registration = allow_registration;

    let mut alice = User::new("alice", hash_password("correct horse").unwrap());
    alice.email = Some("alice@example.com".to_string());
    let users = Arc::new(InMemoryUserStore::with_users([alice]));
    let notifier = Arc::new(RecordingNotifier::default());

    let auth = AuthService::new(
        &config,
        users.clone(),
        Arc::new(InMemoryTokenStore::new()),
        notifier.clone(),
    );
    let storage = StorageService::new(&config.base_dir, config.quota_bytes)
        .await
        .unwrap();

    Harness {
        _dir: dir,
        auth,
        users,
        notifier,
        storage,
    }
}

async fn signed_in(h: &Harness, username: &str, password: &str) -> (String, Identity) {
    let session = h.auth.login(username, password).await.unwrap();
    let identity = h.auth.verify(&session.token).await.unwrap();
    (session.token, identity)
}

// ===== Login =====

#[tokio::test]
async fn test_login_issues_verifiable_token() {
    let h = harness(false).await;

    let session = h.auth.login("Alice", "correct horse").await.unwrap();
    assert_eq!(session.username, "alice");

    let identity = h.auth.verify(&session.token).await.unwrap();
    assert_eq!(identity.username, "alice");
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let h = harness(false).await;

    let wrong_password = h.auth.login("alice", "battery staple").await.unwrap_err();
    let unknown_user = h.auth.login("mallory", "battery staple").await.unwrap_err();

    assert!(matches!(wrong_password, AuthError::InvalidCredentials));
    assert!(matches!(unknown_user, AuthError::InvalidCredentials));
    assert_eq!(wrong_password.to_string(), unknown_user.to_string());
}

#[tokio::test]
async fn test_legacy_bcrypt_account_logs_in_and_is_upgraded() {
    let dir = TempDir::new().unwrap();
    let users_file = dir.path().join("users.json");
    let legacy_hash = bcrypt::hash("leo password", 4).unwrap();
    let records = serde_json::json!([
        { "username": "Leo", "password": legacy_hash, "isPublic": true }
    ]);
    std::fs::write(&users_file, serde_json::to_vec(&records).unwrap()).unwrap();

    let config = Config::new(dir.path().join("users"), &users_file, SECRET);
    let users = Arc::new(JsonUserStore::load(&users_file).await.unwrap());
    let auth = AuthService::new(
        &config,
        users.clone(),
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(RecordingNotifier::default()),
    );

    assert!(matches!(
        auth.login("leo", "wrong password").await,
        Err(AuthError::InvalidCredentials)
    ));
    let session = auth.login("leo", "leo password").await.unwrap();
    assert_eq!(session.username, "leo");
    assert!(auth.verify(&session.token).await.is_ok());

    let stored = users.find_by_username("leo").await.unwrap().unwrap();
    assert!(stored.password_hash.starts_with("$argon2"));

    let reloaded = JsonUserStore::load(&users_file).await.unwrap();
    let on_disk = reloaded.find_by_username("leo").await.unwrap().unwrap();
    assert!(on_disk.password_hash.starts_with("$argon2"));
    assert_eq!(on_disk.id, stored.id, "account id is stable across reloads");
    assert!(auth.login("leo", "leo password").await.is_ok());
}

#[tokio::test]
async fn test_unreadable_stored_hash_is_a_failed_login() {
    let h = harness(false).await;
    h.users
        .insert(User::new("broken", "not-a-hash".to_string()))
        .await
        .unwrap();

    let err = h.auth.login("broken", "whatever").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
}

// ===== Tokens =====

#[tokio::test]
async fn test_tampered_token_is_rejected() {
    let h = harness(false).await;
    let session = h.auth.login("alice", "correct horse").await.unwrap();

    let mut tampered = session.token.clone();
    tampered.push('x');
    assert!(matches!(
        h.auth.verify(&tampered).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(matches!(
        h.auth.verify("not-a-jwt").await,
        Err(AuthError::InvalidToken)
    ));
}

#[tokio::test]
async fn test_logout_revokes_only_that_session() {
    let h = harness(false).await;
    let first = h.auth.login("alice", "correct horse").await.unwrap();
    let second = h.auth.login("alice", "correct horse").await.unwrap();

    let identity = h.auth.verify(&first.token).await.unwrap();
    h.auth.logout(&identity).await.unwrap();

    assert!(matches!(
        h.auth.verify(&first.token).await,
        Err(AuthError::InvalidToken)
    ));
    assert!(h.auth.verify(&second.token).await.is_ok());
}

// ===== Registration =====

#[tokio::test]
async fn test_registration_is_disabled_by_default() {
    let h = harness(false).await;

    let err = h.auth.register("bob", "long enough", None).await.unwrap_err();
    assert!(matches!(err, AuthError::RegistrationDisabled));
}

#[tokio::test]
async fn test_registration_checks_name_password_and_uniqueness() {
    let h = harness(true).await;

    let session = h.auth.register("Bob", "long enough", None).await.unwrap();
    assert_eq!(session.username, "bob");
    assert!(h.auth.login("bob", "long enough").await.is_ok());

    assert!(matches!(
        h.auth.register("bob", "long enough", None).await,
        Err(AuthError::Conflict(_))
    ));
    assert!(matches!(
        h.auth.register("carol", "short", None).await,
        Err(AuthError::Validation(_))
    ));
    assert!(matches!(
        h.auth.register("../carol", "long enough", None).await,
        Err(AuthError::Validation(_))
    ));
}

// ===== Password reset =====

#[tokio::test]
async fn test_password_reset_flow() {
    let h = harness(false).await;

    h.auth.forgot_password("ALICE@example.com").await.unwrap();
    let token = h.notifier.last_token().expect("reset link must be delivered");

    h.auth.reset_password(&token, "new password!").await.unwrap();

    assert!(h.auth.login("alice", "new password!").await.is_ok());
    assert!(h.auth.login("alice", "correct horse").await.is_err());
    assert!(
        matches!(
            h.auth.reset_password(&token, "another one").await,
            Err(AuthError::Validation(_))
        ),
        "a reset token works only once"
    );
}

#[tokio::test]
async fn test_forgot_password_for_unknown_address_is_silent() {
    let h = harness(false).await;

    h.auth.forgot_password("nobody@example.com").await.unwrap();
    assert!(h.notifier.links.lock().is_empty());
}

#[tokio::test]
async fn test_newer_reset_link_replaces_older_one() {
    let h = harness(false).await;

    h.auth.forgot_password("alice@example.com").await.unwrap();
    let old = h.notifier.last_token().unwrap();
    h.auth.forgot_password("alice@example.com").await.unwrap();
    let new = h.notifier.last_token().unwrap();

    assert!(h.auth.reset_password(&old, "new password!").await.is_err());
    assert!(h.auth.reset_password(&new, "new password!").await.is_ok());
}

// ===== Profile =====

#[tokio::test]
async fn test_profile_update_without_password_change() {
    let h = harness(false).await;

    let update = ProfileUpdate {
        full_name: Some("Alice Liddell".to_string()),
        is_public: Some(true),
        ..Default::default()
    };
    let (_, me) = signed_in(&h, "alice", "correct horse").await;
    let (user, token) = h.auth.update_profile(&me, update, &h.storage).await.unwrap();

    assert!(token.is_none());
    assert_eq!(user.full_name.as_deref(), Some("Alice Liddell"));
    assert!(user.profile().is_public);
}

#[tokio::test]
async fn test_password_change_requires_current_password() {
    let h = harness(false).await;

    let update = ProfileUpdate {
        new_password: Some("brand new pass".to_string()),
        current_password: Some("wrong".to_string()),
        ..Default::default()
    };
    let (_, me) = signed_in(&h, "alice", "correct horse").await;
    assert!(matches!(
        h.auth.update_profile(&me, update, &h.storage).await,
        Err(AuthError::Validation(_))
    ));
    assert!(h.auth.login("alice", "correct horse").await.is_ok());
}

#[tokio::test]
async fn test_username_change_moves_files_and_retires_old_tokens() {
    let h = harness(false).await;
    let (old_token, me) = signed_in(&h, "alice", "correct horse").await;
    let other_session = h.auth.login("alice", "correct horse").await.unwrap();
    let sb = h.storage.sandbox_for("alice").await.unwrap();
    h.storage.write_text(&sb, "diary.txt", "dear diary").await.unwrap();

    let update = ProfileUpdate {
        username: Some("alicia".to_string()),
        current_password: Some("correct horse".to_string()),
        ..Default::default()
    };
    let (user, token) = h.auth.update_profile(&me, update, &h.storage).await.unwrap();

    assert_eq!(user.username, "alicia");
    let token = token.expect("a renamed account gets a new token");
    assert_eq!(h.auth.verify(&token).await.unwrap().username, "alicia");
    assert!(h.auth.verify(&old_token).await.is_err());
    assert!(h.auth.verify(&other_session.token).await.is_err());

    let moved = h.storage.sandbox_for("alicia").await.unwrap();
    assert_eq!(h.storage.read_text(&moved, "diary.txt").await.unwrap(), "dear diary");
}

#[tokio::test]
async fn test_email_must_stay_unique() {
    let h = harness(false).await;
    let mut bob = User::new("bob", hash_password("bob password").unwrap());
    bob.email = Some("bob@example.com".to_string());
    h.users.insert(bob).await.unwrap();

    let update = ProfileUpdate {
        email: Some("alice@example.com".to_string()),
        ..Default::default()
    };
    let (_, me) = signed_in(&h, "bob", "bob password").await;
    assert!(matches!(
        h.auth.update_profile(&me, update, &h.storage).await,
        Err(AuthError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_old_tokens_do_not_follow_a_freed_username() {
    let h = harness(false).await;
    h.users
        .insert(User::new("bob", hash_password("bob password").unwrap()))
        .await
        .unwrap();

    let (alice_token, alice) = signed_in(&h, "alice", "correct horse").await;
    let alice_phone = h.auth.login("alice", "correct horse").await.unwrap();
    let rename_alice = ProfileUpdate {
        username: Some("alice2".to_string()),
        current_password: Some("correct horse".to_string()),
        ..Default::default()
    };
    h.auth.update_profile(&alice, rename_alice, &h.storage).await.unwrap();

    let (_, bob) = signed_in(&h, "bob", "bob password").await;
    let bob_home = h.storage.sandbox_for("bob").await.unwrap();
    h.storage.write_text(&bob_home, "secret.txt", "bob secret").await.unwrap();
    let take_name = ProfileUpdate {
        username: Some("alice".to_string()),
        current_password: Some("bob password".to_string()),
        ..Default::default()
    };
    h.auth.update_profile(&bob, take_name, &h.storage).await.unwrap();

    assert!(matches!(
        h.auth.verify(&alice_token).await,
        Err(AuthError::InvalidToken)
    ));
    // Never revoked, but issued to a different account than the one now named alice.
    assert!(matches!(
        h.auth.verify(&alice_phone.token).await,
        Err(AuthError::InvalidToken)
    ));

    let (_, renamed) = signed_in(&h, "alice2", "correct horse").await;
    assert_eq!(renamed.username, "alice2");
    let (_, new_alice) = signed_in(&h, "alice", "bob password").await;
    let home = h.storage.sandbox_for(&new_alice.username).await.unwrap();
    assert_eq!(h.storage.read_text(&home, "secret.txt").await.unwrap(), "bob secret");
}
