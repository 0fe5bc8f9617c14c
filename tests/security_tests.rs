//! Path containment tests for HomeVault.
//!
//! Every path a client sends must resolve inside the caller's own storage
//! root, whatever mix of `..`, backslashes, absolute prefixes or symlinks it
//! contains.

use homevault::storage::{Sandbox, SandboxError};
use tempfile::TempDir;

async fn sandbox() -> (TempDir, Sandbox) {
    let dir = TempDir::new().unwrap();
    let sandbox = Sandbox::open(dir.path().join("alice")).await.unwrap();
    (dir, sandbox)
}

// ===== Lexical containment =====

#[tokio::test]
async fn test_relative_paths_resolve_inside_root() {
    let (_dir, sb) = sandbox().await;

    let resolved = sb.resolve_lexical("docs/notes.txt").unwrap();
    assert_eq!(resolved, sb.root().join("docs").join("notes.txt"));

    let root = sb.resolve_lexical("").unwrap();
    assert_eq!(root, sb.root());
}

#[tokio::test]
async fn test_absolute_path_inside_root_is_accepted() {
    let (_dir, sb) = sandbox().await;
    let inside = sb.root().join("a").join("b.txt");

    let resolved = sb.resolve_lexical(inside.to_str().unwrap()).unwrap();
    assert_eq!(resolved, inside);
}

#[tokio::test]
async fn test_parent_traversal_is_rejected() {
    let (_dir, sb) = sandbox().await;

    for attempt in ["..", "../bob", "docs/../../bob/secret.txt", "../../../../etc/passwd"] {
        assert_eq!(
            sb.resolve_lexical(attempt),
            Err(SandboxError::PathEscape),
            "{attempt} must not leave the root"
        );
    }
}

#[tokio::test]
async fn test_traversal_that_returns_inside_is_allowed() {
    let (_dir, sb) = sandbox().await;

    let resolved = sb.resolve_lexical("docs/../music/song.mp3").unwrap();
    assert_eq!(resolved, sb.root().join("music").join("song.mp3"));
}

#[tokio::test]
async fn test_sibling_with_common_prefix_is_rejected() {
    let (_dir, sb) = sandbox().await;
    let sibling = format!("{}-evil/loot.txt", sb.root().display());

    assert_eq!(sb.resolve_lexical(&sibling), Err(SandboxError::PathEscape));
}

#[tokio::test]
async fn test_backslash_separators_are_normalised() {
    let (_dir, sb) = sandbox().await;

    assert_eq!(
        sb.resolve_lexical("..\\bob\\secret.txt"),
        Err(SandboxError::PathEscape)
    );
    let resolved = sb.resolve_lexical("docs\\a.txt").unwrap();
    assert_eq!(resolved, sb.root().join("docs").join("a.txt"));
}

#[tokio::test]
async fn test_nul_byte_is_rejected() {
    let (_dir, sb) = sandbox().await;

    assert_eq!(
        sb.resolve_lexical("docs/a.txt\0.png"),
        Err(SandboxError::PathEscape)
    );
}

#[tokio::test]
async fn test_foreign_absolute_path_is_rejected() {
    let (_dir, sb) = sandbox().await;

    assert_eq!(sb.resolve_lexical("/etc/passwd"), Err(SandboxError::PathEscape));
}

// ===== Root protection =====

#[tokio::test]
async fn test_root_cannot_be_targeted() {
    let (_dir, sb) = sandbox().await;

    assert_eq!(sb.resolve_target("").await, Err(SandboxError::RootProtected));
    assert_eq!(sb.resolve_target("docs/..").await, Err(SandboxError::RootProtected));
    assert_eq!(
        sb.resolve_target(sb.root().to_str().unwrap()).await,
        Err(SandboxError::RootProtected)
    );
}

#[tokio::test]
async fn test_child_name_cannot_climb_out() {
    let (_dir, sb) = sandbox().await;

    assert_eq!(
        sb.resolve_child(sb.root(), "..").await,
        Err(SandboxError::PathEscape)
    );
}

#[tokio::test]
async fn test_display_never_shows_server_layout() {
    let (_dir, sb) = sandbox().await;

    assert_eq!(sb.display(sb.root()), "/");
    assert_eq!(sb.display(&sb.root().join("docs").join("a.txt")), "/docs/a.txt");
    assert_eq!(sb.display(std::path::Path::new("/etc/passwd")), "<outside>");
}

// ===== Symlinks =====

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_to_outside_is_rejected() {
    let (dir, sb) = sandbox().await;
    let outside = dir.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::write(outside.join("secret.txt"), b"top secret").unwrap();
    std::os::unix::fs::symlink(&outside, sb.root().join("escape")).unwrap();

    // Lexically fine, only the real filesystem shows the escape.
    assert!(sb.resolve_lexical("escape/secret.txt").is_ok());
    assert_eq!(
        sb.resolve("escape/secret.txt").await,
        Err(SandboxError::PathEscape)
    );
    assert_eq!(
        sb.resolve("escape/new-file.txt").await,
        Err(SandboxError::PathEscape),
        "creating through the link must be refused too"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_within_root_is_allowed() {
    let (_dir, sb) = sandbox().await;
    std::fs::create_dir_all(sb.root().join("real")).unwrap();
    std::os::unix::fs::symlink(sb.root().join("real"), sb.root().join("alias")).unwrap();

    assert!(sb.resolve("alias/file.txt").await.is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn test_dangling_symlink_is_rejected() {
    let (dir, sb) = sandbox().await;
    std::os::unix::fs::symlink(dir.path().join("nowhere"), sb.root().join("dangling")).unwrap();

    assert_eq!(sb.resolve("dangling").await, Err(SandboxError::PathEscape));
}

#[cfg(unix)]
#[tokio::test]
async fn test_outside_symlink_itself_can_be_targeted() {
    let (dir, sb) = sandbox().await;
    let outside = dir.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    std::os::unix::fs::symlink(&outside, sb.root().join("escape")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("nowhere"), sb.root().join("dangling")).unwrap();

    assert_eq!(sb.resolve_target("escape").await, Ok(sb.root().join("escape")));
    assert_eq!(sb.resolve_target("dangling").await, Ok(sb.root().join("dangling")));
    // Anything below the link is still reached through it.
    assert_eq!(
        sb.resolve_target("escape/secret.txt").await,
        Err(SandboxError::PathEscape)
    );
}
