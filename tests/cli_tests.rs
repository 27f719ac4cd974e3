use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use std::fs;

/// Helper to create a temporary database and set it as the data location
fn setup_test_env() -> (TempDir, std::sync::MutexGuard<'static, ()>) {
    let guard = test_env::lock_test_env();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let config_dir = temp_dir.path().join(".atelier");
    fs::create_dir_all(&config_dir).unwrap();
    let config_file = config_dir.join("rc");
    fs::write(&config_file, format!("data.location={}\n", db_path.display())).unwrap();

    std::env::set_var("HOME", temp_dir.path().to_str().unwrap());
    (temp_dir, guard)
}

fn atelier_cmd(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("atelier").unwrap();
    cmd.env("HOME", temp_dir.path());
    cmd
}

fn create_order(temp_dir: &TempDir, of: &str) {
    atelier_cmd(temp_dir)
        .args([
            "create", of,
            "--model", "CIN-01",
            "--label", "Cendrillon",
            "--color", "410",
            "--quantity", "10",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created OF"));
}

#[test]
fn test_create_and_list() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-2025-001");

    atelier_cmd(&temp_dir)
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OF-2025-001"))
        .stdout(predicate::str::contains("pending"));
}

#[test]
fn test_duplicate_of_is_user_error() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    atelier_cmd(&temp_dir)
        .args(["create", "OF-1", "--model", "X", "--label", "Y", "--color", "1", "--quantity", "5"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_full_run_through_the_stages() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    atelier_cmd(&temp_dir).args(["start", "OF-1", "cut"]).assert().success();
    atelier_cmd(&temp_dir).args(["pause", "OF-1", "cut"]).assert().success();
    atelier_cmd(&temp_dir).args(["resume", "OF-1", "cut"]).assert().success();
    atelier_cmd(&temp_dir).args(["finish", "OF-1", "cut"]).assert().success();

    atelier_cmd(&temp_dir).args(["control", "start", "OF-1", "10"]).assert().success();
    atelier_cmd(&temp_dir)
        .args(["control", "record", "OF-1", "--accepted", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved"));

    atelier_cmd(&temp_dir).args(["start", "OF-1", "stitch"]).assert().success();
    atelier_cmd(&temp_dir).args(["finish", "OF-1", "stitch"]).assert().success();

    atelier_cmd(&temp_dir)
        .args(["show", "OF-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10/10 controlled"))
        .stdout(predicate::str::contains("outcome: approved"));
}

#[test]
fn test_invalid_transition_is_user_error() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    atelier_cmd(&temp_dir)
        .args(["finish", "OF-1", "cut"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot finish"));
}

#[test]
fn test_user_error_wording_does_not_change_exit_code() {
    // Exit codes are classified by error type, not message text: an OF
    // number that happens to contain "database" is still a user error.
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    atelier_cmd(&temp_dir)
        .args(["show", "OF-database-1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));

    atelier_cmd(&temp_dir)
        .args(["start", "Failed to", "cut"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_unknown_of_is_user_error() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    atelier_cmd(&temp_dir)
        .args(["show", "OF-404"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_recut_flow_via_cli() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    atelier_cmd(&temp_dir).args(["start", "OF-1", "cut"]).assert().success();
    atelier_cmd(&temp_dir).args(["finish", "OF-1", "cut"]).assert().success();
    atelier_cmd(&temp_dir).args(["control", "start", "OF-1", "10"]).assert().success();
    atelier_cmd(&temp_dir)
        .args(["control", "record", "OF-1", "--accepted", "5", "--rejected", "2", "--rework", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rework"));

    atelier_cmd(&temp_dir)
        .args(["recut", "OF-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("5 pairs to reproduce"));

    atelier_cmd(&temp_dir)
        .args(["show", "OF-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("recut"))
        .stdout(predicate::str::contains("5 returned through recut"));
}

#[test]
fn test_list_json_output() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    let output = atelier_cmd(&temp_dir)
        .args(["list", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed[0]["of_number"], "OF-1");
    assert_eq!(parsed[0]["quantity"], 10);
    assert_eq!(parsed[0]["cut"]["status"], "pending");
    assert_eq!(parsed[0]["stitch_eligible"], false);
}

#[test]
fn test_status_dashboard() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");
    atelier_cmd(&temp_dir).args(["start", "OF-1", "cut"]).assert().success();

    atelier_cmd(&temp_dir)
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 orders"))
        .stdout(predicate::str::contains("1 timers running"));
}

#[test]
fn test_history_command() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");
    atelier_cmd(&temp_dir).args(["start", "OF-1", "cut"]).assert().success();
    atelier_cmd(&temp_dir).args(["pause", "OF-1", "cut"]).assert().success();

    atelier_cmd(&temp_dir)
        .args(["history", "OF-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-> active"))
        .stdout(predicate::str::contains("(paused)"));
}

#[test]
fn test_tick_command() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");
    atelier_cmd(&temp_dir).args(["start", "OF-1", "cut"]).assert().success();

    atelier_cmd(&temp_dir)
        .args(["tick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 timers examined"));
}

#[test]
fn test_delete_requires_confirmation() {
    let (temp_dir, _guard) = setup_test_env();
    create_order(&temp_dir, "OF-1");

    atelier_cmd(&temp_dir)
        .args(["delete", "OF-1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--yes"));

    atelier_cmd(&temp_dir)
        .args(["delete", "OF-1", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted OF OF-1"));

    atelier_cmd(&temp_dir)
        .args(["show", "OF-1"])
        .assert()
        .failure()
        .code(1);
}
