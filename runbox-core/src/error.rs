use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunboxErr>;

/// Failures specific to sandboxed execution, as distinct from ambient I/O or
/// configuration errors. The Dispatcher matches on these variants instead of
/// inspecting error strings.
#[derive(Error, Debug)]
pub enum SandboxErr {
    #[error("execution timed out after {0:.1}s")]
    Timeout(f64),

    #[error("no image ready for profile `{0}`")]
    ImageUnavailable(String),

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("could not parse sandbox output: {0}")]
    ParseFailure(String),
}

#[derive(Error, Debug)]
pub enum RunboxErr {
    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("rejected file `{0}`: {1}")]
    UnsafeFile(String, String),

    #[error("image manager error: {0}")]
    ImageManager(String),

    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxErr),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Render any internal error as the short, user-facing cause string that
/// populates `ExecutionResult.error`. Never empty, never panics.
pub fn error_message(e: &RunboxErr) -> String {
    match e {
        RunboxErr::Sandbox(SandboxErr::Timeout(secs)) => {
            format!("timed out after {secs:.1} s")
        }
        _ => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_is_never_empty() {
        let errs: Vec<RunboxErr> = vec![
            RunboxErr::Workspace("boom".into()),
            RunboxErr::UnsafeFile("../x".into(), "path traversal".into()),
            RunboxErr::ImageManager("no runtime".into()),
            RunboxErr::Sandbox(SandboxErr::Timeout(10.0)),
            RunboxErr::Sandbox(SandboxErr::ImageUnavailable("basic".into())),
        ];
        for e in errs {
            assert!(!error_message(&e).is_empty());
        }
    }

    #[test]
    fn timeout_message_reports_seconds() {
        let e = RunboxErr::Sandbox(SandboxErr::Timeout(2.0));
        assert_eq!(error_message(&e), "timed out after 2.0 s");
    }
}
