use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SLIP: &str = "BANCO UNION S.A.\nTOTAL Bs. 45.50\nCod. AB12XZ\nFecha: 03/05/2024\n";

const FIXTURES: &str = r#"{
    "registrations": [
        {
            "id": "17",
            "receipt_code": "AB12XZ",
            "status": "pending",
            "subject_name": "Ana Rojas",
            "subject_identifier": "8812345",
            "offerings": [{"area": "Matematica", "level": "3ro"}]
        },
        {
            "id": "18",
            "receipt_code": "AB12XZ",
            "status": "rejected",
            "subject_name": "Luis Choque",
            "subject_identifier": "4455667"
        }
    ],
    "orders": {"AB12XZ": "50.00"}
}"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn boleta(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("boleta").unwrap();
    cmd.env("XDG_CONFIG_HOME", home).env("HOME", home);
    cmd
}

#[test]
fn scan_transcript_prints_receipt_json() {
    let dir = TempDir::new().unwrap();
    let slip = write(&dir, "slip.txt", SLIP);

    boleta(dir.path())
        .args(["scan", "--text"])
        .arg(&slip)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""receipt_code": "AB12XZ""#))
        .stdout(predicate::str::contains(r#""amount": "45.50""#))
        .stdout(predicate::str::contains(r#""receipt_date": "2024-05-03""#));
}

#[test]
fn scan_transcript_as_csv() {
    let dir = TempDir::new().unwrap();
    let slip = write(&dir, "slip.txt", SLIP);

    boleta(dir.path())
        .args(["scan", "--text", "--format", "csv"])
        .arg(&slip)
        .assert()
        .success()
        .stdout(predicate::str::contains("45.50,AB12XZ,03/05/2024"));
}

#[test]
fn scan_rejects_unsupported_files() {
    let dir = TempDir::new().unwrap();
    let pdf = write(&dir, "slip.pdf", "%PDF-1.4");

    boleta(dir.path())
        .arg("scan")
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported media type"));

    boleta(dir.path())
        .args(["scan", "missing.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn reconcile_finds_candidates_without_approving() {
    let dir = TempDir::new().unwrap();
    let slip = write(&dir, "slip.txt", SLIP);
    let fixtures = write(&dir, "fixtures.json", FIXTURES);

    boleta(dir.path())
        .args(["reconcile", "--text", "--fixtures"])
        .arg(&fixtures)
        .arg(&slip)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 registration(s) reference receipt AB12XZ"))
        .stdout(predicate::str::contains("Ana Rojas"))
        .stdout(predicate::str::contains("Amount mismatch: slip says 45.50, order expects 50.00"))
        .stdout(predicate::str::contains("--approve"));
}

#[test]
fn reconcile_approves_pending_registrations() {
    let dir = TempDir::new().unwrap();
    let slip = write(&dir, "slip.txt", SLIP);
    let fixtures = write(&dir, "fixtures.json", FIXTURES);

    boleta(dir.path())
        .args(["reconcile", "--text", "--approve", "--format", "json", "--fixtures"])
        .arg(&fixtures)
        .arg(&slip)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state": "approved""#))
        .stdout(predicate::str::contains(r#""error": "approval_failed""#))
        .stdout(predicate::str::contains(r#""kind": "not_pending""#));
}

#[test]
fn reconcile_without_code_is_not_found() {
    let dir = TempDir::new().unwrap();
    let slip = write(&dir, "slip.txt", "TOTAL Bs. 45.50\nilegible\n");
    let fixtures = write(&dir, "fixtures.json", FIXTURES);

    boleta(dir.path())
        .args(["reconcile", "--text", "--format", "json", "--fixtures"])
        .arg(&fixtures)
        .arg(&slip)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""state": "not_found""#))
        .stdout(predicate::str::contains(r#""reason": "no_code_extracted""#))
        .stdout(predicate::str::contains(r#""retryable": false"#));
}

#[test]
fn config_init_and_get() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("boleta").join("config.json");

    boleta(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created configuration file"));

    boleta(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    boleta(dir.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "get", "store.timeout_secs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("30"));
}

#[test]
fn config_show_with_missing_explicit_path_prints_defaults() {
    let dir = TempDir::new().unwrap();
    let default_dir = dir.path().join("boleta");
    std::fs::create_dir_all(&default_dir).unwrap();
    std::fs::write(
        default_dir.join("config.json"),
        r#"{"store": {"timeout_secs": 99}}"#,
    )
    .unwrap();

    boleta(dir.path())
        .arg("--config")
        .arg(dir.path().join("elsewhere.json"))
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""timeout_secs": 30"#))
        .stdout(predicate::str::contains(r#""timeout_secs": 99"#).not())
        .stderr(predicate::str::contains("showing defaults"));
}
