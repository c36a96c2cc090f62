use std::collections::HashMap;
use std::sync::Arc;

use bollard::Docker;
use bollard::container::Config as ContainerConfig;
use bollard::container::CreateContainerOptions;
use bollard::container::LogOutput;
use bollard::container::LogsOptions;
use bollard::container::RemoveContainerOptions;
use bollard::container::WaitContainerOptions;
use bollard::models::HostConfig;
use futures_util::StreamExt;
use futures_util::TryStreamExt;

use crate::config::SandboxConfig;
use crate::error::Result;
use crate::error::RunboxErr;
use crate::error::SandboxErr;
use crate::image_manager::ImageManager;
use crate::output_parser;
use crate::types::Backend;
use crate::types::ExecutionResult;
use crate::types::RuntimeProfile;
use crate::workspace;
use crate::wrapper::SentinelFamily;
use crate::wrapper::generate_wrapped_program;

/// Substrings in the generated program that select the `enhanced` image
/// profile over `basic` (spec §4.3 step 2's profile selector). Checked
/// against the wrapped program text, not the raw user code, so an import
/// pulled in transitively still matches.
const ENHANCED_MARKERS: &[&str] = &[
    "numpy", "np.", "scipy", "pandas", "pd.", "matplotlib", "plt.", "sklearn", "sympy", "requests",
];

/// Runs user code inside a locked-down, short-lived Docker container. Every
/// invocation gets its own workspace and container; nothing persists across
/// calls except the [`ImageManager`]'s built images.
pub struct PrimaryExecutor {
    docker: Docker,
    images: Arc<ImageManager>,
}

impl PrimaryExecutor {
    pub fn new(docker: Docker, images: Arc<ImageManager>) -> Self {
        Self { docker, images }
    }

    pub async fn execute(
        &self,
        code: &str,
        files: &HashMap<String, Vec<u8>>,
        stdin: &str,
        config: &SandboxConfig,
        profile_hint: Option<RuntimeProfile>,
    ) -> Result<ExecutionResult> {
        if let Some(module) = crate::policy::first_denied_import(code, &config.import_policy) {
            tracing::info!(module = %module, "rejected before container launch: denied import");
            return Ok(ExecutionResult {
                backend: Some(Backend::Primary),
                ..ExecutionResult::failure(format!(
                    "Module '{module}' is blocked for security reasons"
                ))
            });
        }
        let wrapped = generate_wrapped_program(code, config, SentinelFamily::Sandbox);
        let profile = resolve_profile(select_profile(&wrapped), profile_hint);

        let workspace = workspace::prepare(&wrapped, stdin, files, config.max_file_size)?;
        let out_dir = workspace.join("out");
        std::fs::create_dir_all(&out_dir).map_err(RunboxErr::Io)?;
        // The wrapped program chdirs into /out before running user code
        // (wrapper.rs), so a user-attached file read back by its relative
        // name needs a copy there too; /app (read-only) keeps the original.
        for (name, contents) in files {
            let dest = out_dir.join(name);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(RunboxErr::Io)?;
            }
            std::fs::write(&dest, contents).map_err(RunboxErr::Io)?;
        }

        let tag = self.acquire_image(profile).await?;
        let container_name = format!("runbox-px-{}", uuid::Uuid::new_v4());

        let host_config = HostConfig {
            network_mode: Some("none".to_string()),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            pids_limit: Some(64),
            memory: Some(crate::config::parse_memory_bytes(&config.memory_limit) as i64),
            nano_cpus: Some(f64_to_nano_cpu(config.cpu_limit)?),
            binds: Some(vec![
                format!("{}:/app:ro", workspace.path().display()),
                format!("{}:/out:rw", workspace.join("out").display()),
            ]),
            tmpfs: Some(HashMap::from([(
                "/tmp".to_string(),
                "size=64m,noexec".to_string(),
            )])),
            ..Default::default()
        };

        let container_config = ContainerConfig {
            image: Some(tag),
            cmd: Some(vec![
                "python3".to_string(),
                "-u".to_string(),
                "/app/main.py".to_string(),
            ]),
            working_dir: Some("/app".to_string()),
            user: Some("sandbox".to_string()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.clone(),
            platform: None,
        };

        self.docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| RunboxErr::ContainerRuntime(e.to_string()))?;

        let result = self
            .run_and_collect(&container_name, config.primary_outer_timeout())
            .await;

        let cleanup = self
            .docker
            .remove_container(
                &container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = cleanup {
            tracing::warn!(container = %container_name, error = %e, "failed to remove sandbox container");
        }

        match result {
            Ok(parsed) => {
                if parsed.timed_out {
                    return Err(RunboxErr::Sandbox(SandboxErr::Timeout(
                        config.timeout_secs as f64,
                    )));
                }
                let out_files: Vec<String> =
                    workspace::enumerate_output_files(&workspace.join("out"), config.max_file_size)
                        .into_iter()
                        .filter(|name| !files.contains_key(name))
                        .collect();
                // The wrapped program already truncated stdout to
                // `max_output_size` and appended the truncation marker
                // itself; truncating again here would cut the marker off
                // and risk splitting a multi-byte character.
                Ok(ExecutionResult {
                    success: parsed.success,
                    output: parsed.stdout,
                    error: parsed.stderr,
                    execution_time: parsed.execution_time,
                    memory_used: config.memory_limit.clone(),
                    exit_code: if parsed.success { 0 } else { 1 },
                    files: out_files,
                    backend: Some(Backend::Primary),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve `profile` to a launchable image tag, retrying once against
    /// `basic` if the preferred profile isn't ready (spec §4.3 step 3: "If
    /// unavailable, fall back to basic. If still unavailable, return a
    /// failure result"). A request for `basic` itself has no further
    /// fallback and surfaces the error directly.
    async fn acquire_image(&self, profile: RuntimeProfile) -> Result<String> {
        match self.images.get_image(profile).await {
            Ok(tag) => Ok(tag),
            Err(e) if profile == RuntimeProfile::Basic => Err(e),
            Err(e) => {
                tracing::warn!(profile = %profile, error = %e, "preferred image unavailable, falling back to basic");
                self.images.get_image(RuntimeProfile::Basic).await
            }
        }
    }

    /// Start the container, wait for it to exit (bounded by `outer_timeout`),
    /// then pull its combined log and parse the sentinel report out of it.
    async fn run_and_collect(
        &self,
        container_name: &str,
        outer_timeout: std::time::Duration,
    ) -> Result<output_parser::ParsedOutput> {
        self.docker
            .start_container::<String>(container_name, None)
            .await
            .map_err(|e| RunboxErr::ContainerRuntime(e.to_string()))?;

        let wait = self
            .docker
            .wait_container(
                container_name,
                Some(WaitContainerOptions {
                    condition: "not-running",
                }),
            )
            .try_collect::<Vec<_>>();

        let waited = tokio::time::timeout(outer_timeout, wait).await;

        let log = self.collect_logs(container_name).await?;

        match waited {
            Ok(Ok(_)) => output_parser::parse(&log, SentinelFamily::Sandbox),
            Ok(Err(e)) => Err(RunboxErr::ContainerRuntime(e.to_string())),
            Err(_) => {
                // Outer watchdog fired: the inner `signal.alarm` should have
                // already produced a TIMEOUT sentinel, but if the container
                // is simply wedged the parse will fail and the caller's
                // Timeout error takes over via the `timed_out` flag below.
                match output_parser::parse(&log, SentinelFamily::Sandbox) {
                    Ok(mut parsed) => {
                        parsed.timed_out = true;
                        Ok(parsed)
                    }
                    Err(_) => Err(RunboxErr::Sandbox(SandboxErr::Timeout(
                        outer_timeout.as_secs_f64(),
                    ))),
                }
            }
        }
    }

    async fn collect_logs(&self, container_name: &str) -> Result<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = self.docker.logs(container_name, Some(options));
        let mut combined = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message } | LogOutput::StdErr { message }) => {
                    combined.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => return Err(RunboxErr::ContainerRuntime(e.to_string())),
            }
        }
        Ok(combined)
    }
}

fn select_profile(wrapped_program: &str) -> RuntimeProfile {
    if ENHANCED_MARKERS.iter().any(|m| wrapped_program.contains(m)) {
        RuntimeProfile::Enhanced
    } else {
        RuntimeProfile::Basic
    }
}

/// Merge the heuristic's pick with the caller's optional hint. The hint only
/// ever raises the floor: a caller-supplied `enhanced` hint wins even if the
/// heuristic alone would have picked `basic`, but a `basic` hint can't
/// downgrade code the heuristic flags as needing the bigger image.
fn resolve_profile(heuristic: RuntimeProfile, hint: Option<RuntimeProfile>) -> RuntimeProfile {
    match (heuristic, hint) {
        (RuntimeProfile::Enhanced, _) | (_, Some(RuntimeProfile::Enhanced)) => {
            RuntimeProfile::Enhanced
        }
        _ => RuntimeProfile::Basic,
    }
}

/// Convert a fractional-CPU limit into Docker's nanocpu unit, rejecting
/// non-finite or non-positive inputs before they reach the Docker API.
fn f64_to_nano_cpu(cpu_limit: f64) -> Result<i64> {
    if !cpu_limit.is_finite() || cpu_limit <= 0.0 {
        return Err(RunboxErr::Config(format!(
            "cpu_limit must be a positive finite number, got {cpu_limit}"
        )));
    }
    let nanos = (cpu_limit * 1_000_000_000.0).round();
    if nanos <= 0.0 || nanos > i64::MAX as f64 {
        return Err(RunboxErr::Config(format!(
            "cpu_limit out of range: {cpu_limit}"
        )));
    }
    Ok(nanos as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_enhanced_profile_on_numpy_marker() {
        assert_eq!(select_profile("import numpy as np"), RuntimeProfile::Enhanced);
        assert_eq!(select_profile("print(1)"), RuntimeProfile::Basic);
    }

    #[test]
    fn profile_hint_raises_but_never_lowers_the_floor() {
        assert_eq!(
            resolve_profile(RuntimeProfile::Basic, Some(RuntimeProfile::Enhanced)),
            RuntimeProfile::Enhanced
        );
        assert_eq!(
            resolve_profile(RuntimeProfile::Enhanced, Some(RuntimeProfile::Basic)),
            RuntimeProfile::Enhanced
        );
        assert_eq!(
            resolve_profile(RuntimeProfile::Basic, Some(RuntimeProfile::Basic)),
            RuntimeProfile::Basic
        );
        assert_eq!(resolve_profile(RuntimeProfile::Basic, None), RuntimeProfile::Basic);
    }

    #[test]
    fn nano_cpu_rejects_non_positive() {
        assert!(f64_to_nano_cpu(0.0).is_err());
        assert!(f64_to_nano_cpu(-1.0).is_err());
        assert!(f64_to_nano_cpu(f64::NAN).is_err());
    }

    #[test]
    fn nano_cpu_converts_fraction() {
        assert_eq!(f64_to_nano_cpu(0.5).expect("ok"), 500_000_000);
    }
}
