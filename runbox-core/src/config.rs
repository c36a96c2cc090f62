use std::path::Path;

use serde::Deserialize;

use crate::error::RunboxErr;
use crate::error::Result;
use crate::policy::ImportPolicy;

/// Immutable per-execution configuration. Supplied per call or inherited
/// from [`SandboxConfig::default`]. Loadable in three layers, each
/// overriding the previous: compiled-in defaults, an optional TOML file,
/// then environment-variable overrides (see `SPEC_FULL.md` §10.3).
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Wall-clock budget, in whole seconds, enforced by the SWG inside the
    /// wrapped program (the inner timeout).
    pub timeout_secs: u64,
    /// Memory cap in Docker's string form, e.g. `"128m"`.
    pub memory_limit: String,
    /// Fraction of one CPU, e.g. `0.5`.
    pub cpu_limit: f64,
    /// Maximum captured stdout length, in characters.
    pub max_output_size: usize,
    /// Maximum size, in bytes, of any single user-supplied file.
    pub max_file_size: u64,
    pub import_policy: ImportPolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            memory_limit: "128m".to_string(),
            cpu_limit: 0.5,
            max_output_size: 8192,
            max_file_size: 1024 * 1024,
            import_policy: ImportPolicy::default(),
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    /// Outer watchdog budget for the Primary (container) Executor:
    /// `timeout + 5s`, per spec §4.3 step 5.
    pub fn primary_outer_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs + 5)
    }

    /// Outer watchdog budget for the Fallback (subprocess) Executor:
    /// `timeout + 2s`, per spec §4.4.
    pub fn fallback_outer_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs + 2)
    }

    pub const TRUNCATION_MARKER: &'static str = "\n... (output truncated)";

    /// Load defaults, then merge a TOML file if it exists, then apply
    /// environment-variable overrides. Mirrors the teacher's layered
    /// `ConfigToml` → `Config` precedence, collapsed to the handful of
    /// scalar fields `SandboxConfig` actually has.
    pub fn load(toml_path: Option<&Path>) -> Result<Self> {
        let mut cfg = SandboxConfig::default();

        if let Some(path) = toml_path {
            match std::fs::read_to_string(path) {
                Ok(contents) => {
                    let file_cfg: SandboxConfigToml = toml::from_str(&contents)?;
                    file_cfg.apply_to(&mut cfg);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "sandbox config file not found, using defaults");
                }
                Err(e) => return Err(RunboxErr::Io(e)),
            }
        }

        apply_env_overrides(&mut cfg)?;
        Ok(cfg)
    }
}

/// Partial, file-shaped view of [`SandboxConfig`]; every field optional so
/// an absent key leaves the prior layer's value untouched.
#[derive(Debug, Default, Deserialize)]
struct SandboxConfigToml {
    timeout_secs: Option<u64>,
    memory_limit: Option<String>,
    cpu_limit: Option<f64>,
    max_output_size: Option<usize>,
    max_file_size: Option<u64>,
}

impl SandboxConfigToml {
    fn apply_to(self, cfg: &mut SandboxConfig) {
        if let Some(v) = self.timeout_secs {
            cfg.timeout_secs = v;
        }
        if let Some(v) = self.memory_limit {
            cfg.memory_limit = v;
        }
        if let Some(v) = self.cpu_limit {
            cfg.cpu_limit = v;
        }
        if let Some(v) = self.max_output_size {
            cfg.max_output_size = v;
        }
        if let Some(v) = self.max_file_size {
            cfg.max_file_size = v;
        }
    }
}

/// Parse Docker's `"128m"`-style memory strings into a byte count. Defaults
/// to 128 MiB on anything unparsable so a malformed config value degrades to
/// a safe cap instead of an unbounded container or subprocess. Shared by the
/// Primary Executor (Docker's `i64` memory field) and the Security Wrapper
/// Generator (the `resource.RLIMIT_AS` byte count FX's wrapper embeds).
pub(crate) fn parse_memory_bytes(limit: &str) -> u64 {
    let trimmed = limit.trim();
    let (digits, unit) = trimmed.split_at(
        trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len()),
    );
    let value: u64 = digits.parse().unwrap_or(128);
    let multiplier: u64 = match unit.to_ascii_lowercase().as_str() {
        "g" | "gb" => 1024 * 1024 * 1024,
        "k" | "kb" => 1024,
        _ => 1024 * 1024, // "m"/"mb"/empty
    };
    value * multiplier
}

const ENV_PREFIX: &str = "RUNBOX_SANDBOX_";

fn apply_env_overrides(cfg: &mut SandboxConfig) -> Result<()> {
    if let Ok(v) = std::env::var(format!("{ENV_PREFIX}TIMEOUT_SECS")) {
        cfg.timeout_secs = v
            .parse()
            .map_err(|_| RunboxErr::Config(format!("invalid {ENV_PREFIX}TIMEOUT_SECS: {v}")))?;
    }
    if let Ok(v) = std::env::var(format!("{ENV_PREFIX}MEMORY_LIMIT")) {
        cfg.memory_limit = v;
    }
    if let Ok(v) = std::env::var(format!("{ENV_PREFIX}CPU_LIMIT")) {
        cfg.cpu_limit = v
            .parse()
            .map_err(|_| RunboxErr::Config(format!("invalid {ENV_PREFIX}CPU_LIMIT: {v}")))?;
    }
    if let Ok(v) = std::env::var(format!("{ENV_PREFIX}MAX_OUTPUT_SIZE")) {
        cfg.max_output_size = v
            .parse()
            .map_err(|_| RunboxErr::Config(format!("invalid {ENV_PREFIX}MAX_OUTPUT_SIZE: {v}")))?;
    }
    if let Ok(v) = std::env::var(format!("{ENV_PREFIX}MAX_FILE_SIZE")) {
        cfg.max_file_size = v
            .parse()
            .map_err(|_| RunboxErr::Config(format!("invalid {ENV_PREFIX}MAX_FILE_SIZE: {v}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.memory_limit, "128m");
        assert_eq!(cfg.cpu_limit, 0.5);
        assert_eq!(cfg.max_output_size, 8192);
        assert_eq!(cfg.max_file_size, 1024 * 1024);
        assert!(cfg.import_policy.is_module_denied("socket"));
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "timeout_secs = 30\nmax_output_size = 4096").expect("write");
        let cfg = SandboxConfig::load(Some(file.path())).expect("load");
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_output_size, 4096);
        // Untouched field retains its default.
        assert_eq!(cfg.memory_limit, "128m");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = SandboxConfig::load(Some(Path::new("/nonexistent/runbox.toml")))
            .expect("missing file is not an error");
        assert_eq!(cfg, SandboxConfig::default());
    }

    #[test]
    fn outer_timeouts_add_watchdog_margin() {
        let cfg = SandboxConfig {
            timeout_secs: 10,
            ..Default::default()
        };
        assert_eq!(cfg.primary_outer_timeout().as_secs(), 15);
        assert_eq!(cfg.fallback_outer_timeout().as_secs(), 12);
    }

    #[test]
    fn parses_memory_strings() {
        assert_eq!(parse_memory_bytes("128m"), 128 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("1g"), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("512k"), 512 * 1024);
    }
}
