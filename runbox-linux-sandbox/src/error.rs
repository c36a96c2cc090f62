use thiserror::Error;

pub type Result<T> = std::result::Result<T, HardeningError>;

/// Failures from applying best-effort Linux hardening to the calling thread.
/// Kept local to this crate (rather than reusing `runbox-core`'s error type)
/// so `runbox-core` can depend on `runbox-linux-sandbox` without a cycle.
#[derive(Error, Debug)]
pub enum HardeningError {
    #[error("landlock ruleset error")]
    LandlockRuleset(#[from] landlock::RulesetError),

    #[error("seccomp filter error")]
    SeccompInstall(#[from] seccompiler::Error),

    #[error("seccomp backend error")]
    SeccompBackend(#[from] seccompiler::BackendError),

    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),
}
