use chrono::Utc;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

const BIN: &str = env!("CARGO_BIN_EXE_pareto");

fn temp_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "pareto_cli_{}_{}_{}",
        tag,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    std::fs::create_dir_all(&root).expect("temp dir");
    root
}

fn submit(front: &Path, extra: &[&str], candidate: &str) -> Output {
    Command::new(BIN)
        .arg("submit")
        .arg("--front")
        .arg(front)
        .args(extra)
        .arg(candidate)
        .output()
        .expect("run pareto submit")
}

fn front_lines(front: &Path) -> Vec<String> {
    std::fs::read_to_string(front)
        .expect("front file")
        .lines()
        .map(str::to_string)
        .collect()
}

fn compare(args: &[&str], stdin: &str) -> Option<i32> {
    let mut child = Command::new(BIN)
        .arg("dominates")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn comparator");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(stdin.as_bytes())
        .expect("write stdin");
    child.wait().expect("wait").code()
}

#[test]
fn submit_maintains_the_front_file() {
    let root = temp_root("submit");
    let front = root.join("pareto.txt");

    assert!(submit(&front, &[], "1;4;0.5;sol_a").status.success());
    assert!(submit(&front, &[], "2;2;0.9;sol_d").status.success());
    assert!(submit(&front, &[], "2;6;0.9;sol_c").status.success());
    assert_eq!(front_lines(&front), vec!["1;4;0.5;sol_a", "2;2;0.9;sol_d"]);

    let out = submit(&front, &["--json"], "2;3;0.4;sol_b");
    assert!(out.status.success());
    let payload: Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["report"]["status"], "committed");
    assert_eq!(payload["report"]["evicted"][0]["record"], "1;4;0.5;sol_a");
    assert_eq!(front_lines(&front), vec!["2;2;0.9;sol_d", "2;3;0.4;sol_b"]);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn invalid_candidate_is_reported_but_not_fatal() {
    let root = temp_root("invalid");
    let front = root.join("pareto.txt");
    assert!(submit(&front, &[], "1;4;0.5;sol_a").status.success());

    let out = submit(&front, &[], "1;not-a-number;0.5;x");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("[INVALID Candidate: 1;not-a-number;0.5;x]"));
    assert_eq!(front_lines(&front), vec!["1;4;0.5;sol_a"]);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn multi_line_candidate_is_rejected_whole() {
    let root = temp_root("multiline");
    let front = root.join("pareto.txt");
    assert!(submit(&front, &[], "1;4;0.5;sol_a").status.success());

    let out = submit(&front, &[], "2;2;0.9;sol_d\n9;0;0;smuggled");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("contains a line terminator"));
    assert_eq!(front_lines(&front), vec!["1;4;0.5;sol_a"]);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn submission_outcome_is_logged_at_info() {
    let root = temp_root("logging");
    let front = root.join("pareto.txt");
    let out = Command::new(BIN)
        .env("PARETO_LOG", "info")
        .arg("submit")
        .arg("--front")
        .arg(&front)
        .arg("1;4;0.5;sol_a")
        .output()
        .expect("run pareto submit");
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("submission finished"), "stderr: {}", stderr);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn allow_duplicate_keeps_distinct_solutions() {
    let root = temp_root("dup");
    let front = root.join("pareto.txt");
    assert!(submit(&front, &[], "1;4;0.5;sol_a").status.success());
    assert!(submit(&front, &[], "1;4;0.5;sol_e").status.success());
    assert_eq!(front_lines(&front), vec!["1;4;0.5;sol_a"]);
    assert!(submit(&front, &["--allow-duplicate"], "1;4;0.5;sol_e").status.success());
    assert_eq!(front_lines(&front), vec!["1;4;0.5;sol_a", "1;4;0.5;sol_e"]);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn comparator_contract_exit_codes() {
    assert_eq!(compare(&["-t", "less", "-a", "dominates", "3,0.4"], "4,0.5\n"), Some(0));
    assert_eq!(compare(&["-t", "less", "-a", "dominates", "3,0.4"], "2,0.9\n"), Some(1));
    assert_eq!(compare(&["-t", "less", "-a", "dominated", "4,0.5"], "9,9\n3,0.4\n"), Some(0));
    assert_eq!(compare(&["-t", "greater", "-a", "dominates", "4,0.5"], "3,0.4\n"), Some(0));
    assert_eq!(compare(&["-a", "dominates", "3,0.4"], "oops\n"), Some(2));
    assert_eq!(compare(&["-a", "dominates", "3,0.4"], "1,2,3\n"), Some(2));
}

#[test]
fn binary_serves_as_its_own_external_oracle() {
    let root = temp_root("oracle");
    let front = root.join("pareto.txt");
    let oracle = format!("{} dominates", BIN);
    let args = ["--oracle-command", oracle.as_str()];
    assert!(submit(&front, &args, "1;4;0.5;sol_a").status.success());
    assert!(submit(&front, &args, "2;2;0.9;sol_d").status.success());
    assert!(submit(&front, &args, "3;1;0.3;sol_z").status.success());
    assert_eq!(front_lines(&front), vec!["3;1;0.3;sol_z"]);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn check_fails_on_a_corrupted_front() {
    let root = temp_root("check");
    let front = root.join("pareto.txt");
    std::fs::write(&front, "1;4;0.5;a\n2;3;0.4;b\ngarbage\n").expect("seed");

    let out = Command::new(BIN)
        .args(["check", "--json", "--front"])
        .arg(&front)
        .output()
        .expect("run check");
    assert_eq!(out.status.code(), Some(1));
    let payload: Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(payload["ok"], false);
    assert_eq!(payload["dropped"], 1);
    assert_eq!(payload["violations"][0]["winner"], "2;3;0.4;b");

    let out = Command::new(BIN)
        .args(["show", "--json", "--front"])
        .arg(&front)
        .output()
        .expect("run show");
    assert!(out.status.success());
    let payload: Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(payload["snapshot"]["members"].as_array().map(Vec::len), Some(2));
    let _ = std::fs::remove_dir_all(root);
}
