use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn watch_requires_worker_id() {
    let mut cmd = Command::cargo_bin("chainwatch").unwrap();
    cmd.arg("watch");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("required arguments were not provided"));
}

#[test]
fn watch_without_credential_fails_fast() {
    let home = tempfile::tempdir().unwrap();
    let workspace = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("chainwatch").unwrap();
    cmd.arg("watch")
        .arg("w-123")
        .arg("--workspace")
        .arg(workspace.path())
        .env_remove("CHAINWATCH_API_KEY")
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"));
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no API credential found"));
}

#[test]
fn watch_rejects_inverted_thresholds_in_config() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(
        workspace.path().join(".chainwatch.toml"),
        "[watch]\nwarn_threshold = 90000\nforce_threshold = 50000\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("chainwatch").unwrap();
    cmd.arg("watch")
        .arg("w-123")
        .arg("--workspace")
        .arg(workspace.path());
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("warn_threshold"));
}

#[test]
fn check_reports_unchecked_items() {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(
        workspace.path().join("TASKS.md"),
        "- [x] done\n- [ ] open one\n- [ ] open two\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("chainwatch").unwrap();
    cmd.arg("check").arg("--workspace").arg(workspace.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("incomplete: 2 unchecked item(s)"));
}

#[test]
fn check_handles_missing_checklist() {
    let workspace = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("chainwatch").unwrap();
    cmd.arg("check").arg("--workspace").arg(workspace.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("no checklist at"));
}
