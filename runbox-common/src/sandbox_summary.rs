use runbox_core::config::SandboxConfig;

/// One-line rendering of the effective config the demonstration CLI prints
/// before dispatching a request, so a user can see what limits applied
/// without re-reading a TOML file or the environment.
pub fn summarize_config(config: &SandboxConfig) -> String {
    let mut summary = format!(
        "timeout={}s memory={} cpu={}",
        config.timeout_secs, config.memory_limit, config.cpu_limit
    );
    if !config.import_policy.denied_modules.is_empty() {
        summary.push_str(&format!(
            " denied_modules=[{}]",
            config.import_policy.denied_modules.join(",")
        ));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_defaults() {
        let summary = summarize_config(&SandboxConfig::default());
        assert!(summary.contains("timeout=10s"));
        assert!(summary.contains("memory=128m"));
        assert!(summary.contains("denied_modules="));
    }
}
