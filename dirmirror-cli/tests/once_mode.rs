use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn dirmirror_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dirmirror"));
    cmd.env("RUST_LOG", "info").env("NO_COLOR", "1");
    cmd
}

fn roots(tmp: &TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
    let source = tmp.path().join("source");
    let replica = tmp.path().join("replica");
    fs::create_dir_all(&source).expect("mkdir source");
    fs::create_dir_all(&replica).expect("mkdir replica");
    (source, replica)
}

fn once(source: &Path, replica: &Path) -> Command {
    let mut cmd = dirmirror_cmd();
    cmd.arg("-s")
        .arg(source)
        .arg("-r")
        .arg(replica)
        .args(["-i", "10", "--once"]);
    cmd
}

#[test]
fn once_mirrors_tree_and_prints_summary() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    fs::create_dir_all(source.join("b")).unwrap();
    fs::write(source.join("a.txt"), "X").unwrap();
    fs::write(source.join("b/c.txt"), "Y").unwrap();
    fs::write(replica.join("stale.txt"), "old").unwrap();

    once(&source, &replica)
        .assert()
        .success()
        .stdout(contains("2 copied"))
        .stdout(contains("deleted files"));

    assert_eq!(fs::read_to_string(replica.join("a.txt")).unwrap(), "X");
    assert_eq!(fs::read_to_string(replica.join("b/c.txt")).unwrap(), "Y");
    assert!(!replica.join("stale.txt").exists());

    once(&source, &replica)
        .assert()
        .success()
        .stdout(contains("already in sync"));
}

#[test]
fn once_json_emits_pass_report() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    fs::write(source.join("a.txt"), "hello").unwrap();

    let output = once(&source, &replica).arg("--json").output().expect("run");
    assert!(
        output.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(report["copied"], 1);
    assert_eq!(report["bytes_copied"], 5);
    assert_eq!(report["cancelled"], false);
    assert!(report["aborted"].is_null());
}

#[test]
fn log_lines_carry_day_month_year_timestamp() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    let log = tmp.path().join("sync.log");
    fs::write(source.join("a.txt"), "X").unwrap();

    once(&source, &replica).arg("-l").arg(&log).assert().success();

    let contents = fs::read_to_string(&log).expect("log file written");
    let line = contents
        .lines()
        .find(|l| l.contains("copied"))
        .expect("copy logged");
    let stamp: Vec<char> = line.chars().take(19).collect();
    assert_eq!(stamp[2], '-', "{line}");
    assert_eq!(stamp[5], '-', "{line}");
    assert_eq!(stamp[10], ' ', "{line}");
    assert!(line.contains("INFO"), "{line}");
    assert!(!line.contains('\u{1b}'), "file log must not contain ANSI codes");
}

#[test]
fn config_file_supplies_settings() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    fs::write(source.join("a.txt"), "X").unwrap();
    let config = tmp.path().join("dirmirror.yaml");
    fs::write(
        &config,
        format!(
            "source: {}\nreplica: {}\ninterval_secs: 30\ncompare: content\n",
            source.display(),
            replica.display()
        ),
    )
    .unwrap();

    dirmirror_cmd()
        .arg("-c")
        .arg(&config)
        .arg("--once")
        .assert()
        .success();
    assert!(replica.join("a.txt").exists());
}

#[test]
fn negative_interval_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    dirmirror_cmd()
        .arg("-s")
        .arg(&source)
        .arg("-r")
        .arg(&replica)
        .args(["-i", "-5", "--once"])
        .assert()
        .failure()
        .stderr(contains("invalid configuration"))
        .stderr(contains("positive"));
}

#[test]
fn non_integer_interval_is_rejected() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    dirmirror_cmd()
        .arg("-s")
        .arg(&source)
        .arg("-r")
        .arg(&replica)
        .args(["-i", "soon", "--once"])
        .assert()
        .failure();
}

#[test]
fn missing_source_is_rejected_before_touching_replica() {
    let tmp = TempDir::new().expect("tmp");
    let (_, replica) = roots(&tmp);
    fs::write(replica.join("keep.txt"), "keep").unwrap();

    dirmirror_cmd()
        .arg("-s")
        .arg(tmp.path().join("absent"))
        .arg("-r")
        .arg(&replica)
        .args(["-i", "10", "--once"])
        .assert()
        .failure()
        .stderr(contains("does not exist"));
    assert!(replica.join("keep.txt").exists());
}

#[test]
fn missing_interval_is_reported() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    dirmirror_cmd()
        .arg("-s")
        .arg(&source)
        .arg("-r")
        .arg(&replica)
        .arg("--once")
        .assert()
        .failure()
        .stderr(contains("interval"));
}

#[test]
fn unwritable_log_file_only_warns() {
    let tmp = TempDir::new().expect("tmp");
    let (source, replica) = roots(&tmp);
    fs::write(source.join("a.txt"), "X").unwrap();
    let blocker = tmp.path().join("file_not_dir");
    fs::write(&blocker, "x").unwrap();

    once(&source, &replica)
        .arg("-l")
        .arg(blocker.join("sync.log"))
        .assert()
        .success()
        .stderr(contains("warning"));
    assert!(replica.join("a.txt").exists());
}
