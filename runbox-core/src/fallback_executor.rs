use std::collections::HashMap;
use std::process::Stdio;

#[cfg(target_os = "linux")]
use std::os::unix::process::CommandExt;

use tokio::io::AsyncWriteExt;

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::error::RunboxErr;
use crate::error::SandboxErr;
use crate::output_parser;
use crate::types::Backend;
use crate::types::ExecutionResult;
use crate::types::MAIN_FILE;
use crate::workspace;
use crate::wrapper::SentinelFamily;
use crate::wrapper::generate_wrapped_program;

/// Subprocess-based execution used when the Primary Executor's container
/// runtime is unavailable (spec §4.4). Isolation here is best-effort: the
/// wrapped program carries its own import denylist and POSIX resource
/// limits, and on Linux the interpreter additionally gets a landlock +
/// seccomp layer applied immediately before it execs. There is no container
/// boundary, so this path never matches the Primary Executor's containment
/// and every dispatch through it is logged as a security-relevant event.
#[derive(Debug, Default)]
pub struct FallbackExecutor;

impl FallbackExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        code: &str,
        files: &HashMap<String, Vec<u8>>,
        stdin: &str,
        config: &SandboxConfig,
    ) -> Result<ExecutionResult> {
        if let Some(module) = crate::policy::first_denied_import(code, &config.import_policy) {
            tracing::info!(module = %module, "rejected before subprocess spawn: denied import");
            return Ok(ExecutionResult {
                backend: Some(Backend::Fallback),
                ..ExecutionResult::failure(format!(
                    "Module '{module}' is blocked for security reasons"
                ))
            });
        }

        tracing::warn!("executing via subprocess fallback; isolation is best-effort only");

        let wrapped = generate_wrapped_program(code, config, SentinelFamily::Fallback);
        let workspace = workspace::prepare(&wrapped, stdin, files, config.max_file_size)?;

        let mut command = tokio::process::Command::new("python3");
        command
            .arg(MAIN_FILE)
            .current_dir(workspace.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        {
            let workspace_root = workspace.path().to_path_buf();
            // Safety: this closure runs in the freshly forked child between
            // `fork` and `execve` — single-threaded, with none of the
            // parent's other threads present in this address space, which is
            // exactly what landlock/seccomp require. Any failure is swallowed
            // rather than logged: tracing here would allocate inside a child
            // that may have inherited an allocator lock held by some other
            // thread of the parent at fork time.
            unsafe {
                command.pre_exec(move || {
                    let _ = runbox_linux_sandbox::apply_fallback_hardening(&workspace_root);
                    Ok(())
                });
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| RunboxErr::Sandbox(SandboxErr::RuntimeUnavailable(e.to_string())))?;

        let stdin_bytes = stdin.as_bytes().to_vec();
        let outer_timeout = config.fallback_outer_timeout();

        let run = tokio::time::timeout(outer_timeout, async move {
            if stdin_bytes.is_empty() {
                child.stdin.take();
            } else if let Some(mut child_stdin) = child.stdin.take() {
                let _ = child_stdin.write_all(&stdin_bytes).await;
            }
            child.wait_with_output().await
        })
        .await;

        match run {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let combined = format!("{stdout}{stderr}");
                let parsed = output_parser::parse(&combined, SentinelFamily::Fallback)?;
                if parsed.timed_out {
                    return Err(RunboxErr::Sandbox(SandboxErr::Timeout(
                        config.timeout_secs as f64,
                    )));
                }
                let exit_code = output.status.code().unwrap_or(1);
                let files =
                    workspace::enumerate_output_files(workspace.path(), config.max_file_size);
                // The wrapped program already truncated stdout itself; see
                // the matching note in `primary_executor.rs`.
                Ok(ExecutionResult {
                    success: parsed.success && exit_code == 0,
                    output: parsed.stdout,
                    error: parsed.stderr,
                    execution_time: parsed.execution_time,
                    memory_used: config.memory_limit.clone(),
                    exit_code,
                    files,
                    backend: Some(Backend::Fallback),
                })
            }
            Ok(Err(e)) => Err(RunboxErr::Sandbox(SandboxErr::RuntimeUnavailable(
                e.to_string(),
            ))),
            // `kill_on_drop` makes the cancelled future's owned `Child` kill
            // the still-running interpreter when it drops here.
            Err(_) => Err(RunboxErr::Sandbox(SandboxErr::Timeout(
                outer_timeout.as_secs_f64(),
            ))),
        }
    }
}
