use std::path::Path;
use std::process::Command;

use cinder_core::{Error, SourceControl, SourceControlConfig};
use cinder_vcs::command::ERROR_LOG_FILE;
use cinder_vcs::{GitAdapter, detect};

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command");
    if !out.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
    }
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn init_remote(dir: &Path) {
    std::fs::create_dir_all(dir).expect("mkdir remote");
    git(dir, &["init", "--quiet"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
    commit(dir, "README.md", "hello\n", "initial commit");
}

fn commit(dir: &Path, file: &str, content: &str, message: &str) -> String {
    std::fs::write(dir.join(file), content).expect("write");
    git(dir, &["add", "."]);
    git(dir, &["commit", "--quiet", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

#[tokio::test]
async fn checkout_then_detect_new_commit() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }

    let td = tempfile::tempdir().expect("tempdir");
    let remote = td.path().join("remote");
    init_remote(&remote);

    let project = td.path().join("demo");
    std::fs::create_dir_all(&project).expect("mkdir project");
    let work = project.join("work");

    let adapter = GitAdapter::new(remote.to_string_lossy());
    adapter.checkout(&work).await.expect("checkout");
    assert!(work.join("README.md").exists());
    assert!(!project.join(ERROR_LOG_FILE).exists());

    let mut reasons = Vec::new();
    assert!(adapter.up_to_date(&work, None, &mut reasons).await.expect("poll"));
    assert!(reasons.is_empty());

    let first = adapter.latest_revision(&work, None).await.expect("latest");
    assert_eq!(first.message, "initial commit");

    let new_head = commit(&remote, "lib.txt", "code\n", "add library");
    let latest = adapter.latest_revision(&work, Some(&first)).await.expect("latest");
    assert_eq!(latest.number, new_head);
    assert!(latest.message.contains("add library"));
    // latest_revision must not touch the working copy
    assert!(!work.join("lib.txt").exists());

    assert!(!adapter.up_to_date(&work, Some(&first), &mut reasons).await.expect("poll"));
    assert_eq!(reasons.len(), 1);
    assert_eq!(reasons[0].number, new_head);
    assert_eq!(reasons[0].committed_by, "Test");
    assert!(work.join("lib.txt").exists());
    assert_eq!(git(&work, &["rev-parse", "HEAD"]), new_head);
}

#[tokio::test]
async fn update_discards_local_changes() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }

    let td = tempfile::tempdir().expect("tempdir");
    let remote = td.path().join("remote");
    init_remote(&remote);
    let work = td.path().join("demo").join("work");
    std::fs::create_dir_all(work.parent().unwrap()).unwrap();

    let adapter = GitAdapter::new(remote.to_string_lossy());
    adapter.checkout(&work).await.expect("checkout");

    std::fs::write(work.join("README.md"), "scribbled\n").unwrap();
    adapter.update(&work).await.expect("update");
    assert_eq!(
        std::fs::read_to_string(work.join("README.md")).unwrap(),
        "hello\n"
    );
}

#[tokio::test]
async fn checkout_of_missing_repository_fails() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }

    let td = tempfile::tempdir().expect("tempdir");
    let project = td.path().join("demo");
    std::fs::create_dir_all(&project).unwrap();

    let adapter = GitAdapter::new(td.path().join("no-such-repo").to_string_lossy());
    let err = adapter
        .checkout(&project.join("work"))
        .await
        .expect_err("checkout should fail");

    match err {
        Error::Checkout { message, .. } => assert!(!message.is_empty()),
        other => panic!("expected Checkout error, got {:?}", other),
    }
    assert!(!project.join(ERROR_LOG_FILE).exists());
}

#[tokio::test]
async fn detect_reads_remote_from_working_copy() {
    if !git_available() {
        eprintln!("skipping: git not found");
        return;
    }

    let td = tempfile::tempdir().expect("tempdir");
    let remote = td.path().join("remote");
    init_remote(&remote);
    let work = td.path().join("demo").join("work");
    std::fs::create_dir_all(work.parent().unwrap()).unwrap();
    GitAdapter::new(remote.to_string_lossy())
        .checkout(&work)
        .await
        .expect("checkout");

    let detected = detect(&work).await.expect("detect").expect("git working copy");
    match detected {
        SourceControlConfig::Git {
            repository,
            submodules,
            ..
        } => {
            assert_eq!(repository, remote.to_string_lossy());
            assert!(!submodules);
        }
        other => panic!("expected git, got {:?}", other),
    }

    let empty = td.path().join("empty").join("work");
    std::fs::create_dir_all(&empty).unwrap();
    assert!(detect(&empty).await.expect("detect").is_none());
}
