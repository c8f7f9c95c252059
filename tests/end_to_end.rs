//! End-to-end exercise of the public API against a throwaway upstream
//! repository: clone, update, query, and the seeder-change lookup.

use sourcekeeper::{Config, SourcesManager};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed:\n{}{}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn commit_file(dir: &Path, path: &str, content: &str, message: &str) -> String {
    let full = dir.join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, content).unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", message]);
    git(dir, &["rev-parse", "HEAD"]).trim().to_string()
}

fn init_upstream(temp: &TempDir) -> PathBuf {
    let upstream = temp.path().join("upstream");
    fs::create_dir_all(&upstream).unwrap();
    git(&upstream, &["init", "-b", "trunk"]);
    git(&upstream, &["config", "user.name", "Test"]);
    git(&upstream, &["config", "user.email", "test@example.com"]);
    upstream
}

#[tokio::test]
async fn clone_update_query_roundtrip() {
    let _ = tracing_subscriber::fmt::try_init();
    let temp = TempDir::new().unwrap();
    let upstream = init_upstream(&temp);
    let first = commit_file(&upstream, "README.md", "# repo", "initial commit");
    commit_file(&upstream, "src/lib.c", "int x;", "add library");

    let config = Config {
        repo_url: format!("file://{}", upstream.display()),
        access_token: None,
        main_branch: "trunk".to_string(),
        data_dir: temp.path().join("data"),
    };
    let manager = SourcesManager::new(config);

    // First call clones and synchronizes.
    manager.ensure_sources_updated().await.unwrap();
    assert!(temp.path().join("data/sources/.git").exists());
    assert_eq!(manager.get_git_log(0, 100, false).await.unwrap().len(), 2);

    // A new upstream commit arrives; the second call pulls and re-reconciles.
    let third = commit_file(&upstream, "src/more.c", "int y;", "add more");
    manager.ensure_sources_updated().await.unwrap();

    let log = manager.get_git_log(0, 100, false).await.unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].commit_hash, third);
    assert!(manager.commit_exists(&third).await);

    // include_oldest pins the initial commit onto any window.
    let windowed = manager.get_git_log(0, 1, true).await.unwrap();
    assert_eq!(windowed.len(), 2);
    assert_eq!(windowed[0].commit_hash, third);
    assert_eq!(windowed[1].commit_hash, first);
}

#[tokio::test]
async fn seeder_lookup_restores_mainline_checkout() {
    let temp = TempDir::new().unwrap();
    let upstream = init_upstream(&temp);
    let seeder_commit = commit_file(
        &upstream,
        "tools/shard-seeder/shard-seeder.cpp",
        "void seed() {}",
        "add seeder",
    );
    let tip = commit_file(&upstream, "other.txt", "z", "unrelated");

    let config = Config {
        repo_url: format!("file://{}", upstream.display()),
        access_token: None,
        main_branch: "trunk".to_string(),
        data_dir: temp.path().join("data"),
    };
    let manager = SourcesManager::new(config);
    manager.ensure_sources_updated().await.unwrap();

    let located = manager
        .find_most_recent_commit_changing_seeder(&tip)
        .await
        .unwrap();
    assert_eq!(located, seeder_commit);

    let head = git(
        &temp.path().join("data/sources"),
        &["rev-parse", "--abbrev-ref", "HEAD"],
    );
    assert_eq!(head.trim(), "trunk");
}
