use serde_json::Value;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

fn run_identity<I, S>(db: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_identity"))
        .arg("--db")
        .arg(db)
        .args(["--log-level", "warn"])
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute identity binary: {err}"))
}

fn run_json<I, S>(db: &Path, args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_identity(db, args);
    if !output.status.success() {
        panic!(
            "identity command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

#[test]
fn identify_links_observations_across_invocations() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("identity.sqlite3");

    let first = run_json(&db, ["identify", "--email", "lorraine@hillvalley.edu", "--phone", "123456"]);
    assert_eq!(first["contact"]["primaryContactId"], 1);

    let second = run_json(&db, ["identify", "--email", "mcfly@hillvalley.edu", "--phone", "123456"]);
    let contact = &second["contact"];
    assert_eq!(contact["primaryContactId"], 1);
    assert_eq!(
        contact["emails"],
        serde_json::json!(["lorraine@hillvalley.edu", "mcfly@hillvalley.edu"])
    );
    assert_eq!(contact["phoneNumbers"], serde_json::json!(["123456"]));
    assert_eq!(contact["secondaryContactIds"], serde_json::json!([2]));

    let shown = run_json(&db, ["show", "2"]);
    assert_eq!(shown, second);
}

#[test]
fn identify_merges_two_primaries() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("identity.sqlite3");

    run_json(&db, ["identify", "--email", "george@hillvalley.edu", "--phone", "919191"]);
    run_json(&db, ["identify", "--email", "biffsucks@hillvalley.edu", "--phone", "717171"]);
    let merged = run_json(&db, ["identify", "--email", "george@hillvalley.edu", "--phone", "717171"]);

    assert_eq!(
        merged["contact"],
        serde_json::json!({
            "primaryContactId": 1,
            "emails": ["george@hillvalley.edu", "biffsucks@hillvalley.edu"],
            "phoneNumbers": ["919191", "717171"],
            "secondaryContactIds": [2]
        })
    );
}

#[test]
fn identify_without_contact_points_exits_with_validation_status() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("identity.sqlite3");

    let output = run_identity(&db, ["identify"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("email or phoneNumber"));
}

#[test]
fn show_unknown_contact_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("identity.sqlite3");

    let output = run_identity(&db, ["show", "42"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("contact 42 not found"));
}

#[test]
fn schema_version_reports_migrated_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("identity.sqlite3");

    let version = run_json(&db, ["schema-version"]);

    assert_eq!(version["schemaVersion"], version["latestSupported"]);
    assert!(version["schemaVersion"].as_u64().unwrap() >= 1);
}
