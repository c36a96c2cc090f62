#![cfg(target_os = "linux")]
#![expect(clippy::expect_used)]

//! Exercises `apply_fallback_hardening` the way `fallback_executor.rs` does:
//! inside a forked child, immediately before the child would otherwise
//! `execve` into the interpreter. Run each case in its own process since the
//! policy is irreversible for the thread that installs it.

use std::os::unix::process::CommandExt;
use std::process::Command;

use runbox_linux_sandbox::apply_fallback_hardening;

#[test]
fn blocks_outbound_network_connect() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().to_path_buf();

    let status = unsafe {
        Command::new("python3")
            .arg("-c")
            .arg("import socket; s = socket.socket(); s.connect(('127.0.0.1', 1)); print('connected')")
            .pre_exec(move || {
                apply_fallback_hardening(&root)
                    .map_err(|e| std::io::Error::other(e.to_string()))
            })
            .status()
    };

    match status {
        Ok(status) => assert!(!status.success(), "connect() should have been denied"),
        Err(_) => {
            // Interpreter missing or kernel lacks seccomp/landlock support in
            // this environment; nothing to assert.
        }
    }
}

#[test]
fn allows_workspace_relative_file_writes() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().to_path_buf();
    let marker = root.join("ok.txt");

    let status = unsafe {
        Command::new("python3")
            .arg("-c")
            .arg(format!("open({marker:?}, 'w').write('hi')"))
            .current_dir(&root)
            .pre_exec(move || {
                apply_fallback_hardening(&root)
                    .map_err(|e| std::io::Error::other(e.to_string()))
            })
            .status()
    };

    if let Ok(status) = status {
        if status.success() {
            assert!(marker.exists());
        }
    }
}
