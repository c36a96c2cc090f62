#![expect(clippy::expect_used)]

//! End-to-end CLI tests driven through the compiled `runbox-exec` binary.
//! No Docker daemon is assumed to be present, so every case here runs
//! through the Fallback Executor and is skipped when `python3` is absent.

use assert_cmd::Command;

fn has_python3() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

#[test]
fn plain_print_succeeds_and_prints_output() {
    if !has_python3() {
        return;
    }
    Command::cargo_bin("runbox-exec")
        .expect("binary built")
        .args(["--color", "never", "print(2 + 2)"])
        .assert()
        .success()
        .stdout(predicates::str::contains("4"));
}

#[test]
fn blocked_import_fails_with_nonzero_exit() {
    if !has_python3() {
        return;
    }
    Command::cargo_bin("runbox-exec")
        .expect("binary built")
        .args(["--color", "never", "import socket"])
        .assert()
        .failure();
}

#[test]
fn json_mode_emits_parseable_result_line() {
    if !has_python3() {
        return;
    }
    let output = Command::cargo_bin("runbox-exec")
        .expect("binary built")
        .args(["--json", "--color", "never", "print(1)"])
        .output()
        .expect("spawn");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let result_line = stdout
        .lines()
        .last()
        .expect("at least a result line printed");
    let parsed: serde_json::Value =
        serde_json::from_str(result_line).expect("result line is valid JSON");
    assert_eq!(parsed["success"], serde_json::Value::Bool(true));
}

#[test]
fn stdin_flag_is_echoed_back() {
    if !has_python3() {
        return;
    }
    Command::cargo_bin("runbox-exec")
        .expect("binary built")
        .args([
            "--color",
            "never",
            "--stdin",
            "hello",
            "print(input())",
        ])
        .assert()
        .success()
        .stdout(predicates::str::contains("hello"));
}
