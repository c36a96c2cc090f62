use std::collections::HashMap;
use std::path::PathBuf;

/// Which backend produced an [`ExecutionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Backend {
    Primary,
    Fallback,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Primary => write!(f, "primary"),
            Backend::Fallback => write!(f, "fallback"),
        }
    }
}

/// Runtime flavor of a pre-built image; the profile selector (PX §4.3 step 2)
/// maps every request onto one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RuntimeProfile {
    Basic,
    Enhanced,
}

impl RuntimeProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeProfile::Basic => "basic",
            RuntimeProfile::Enhanced => "enhanced",
        }
    }
}

impl std::fmt::Display for RuntimeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the caller provides for one execution.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub files: HashMap<String, Vec<u8>>,
    pub stdin: String,
    pub profile_hint: Option<RuntimeProfile>,
    pub config: crate::config::SandboxConfig,
    /// When true, the Dispatcher will not retry via the Fallback Executor if
    /// the Primary Executor cannot run (see spec §9's "high-risk" open
    /// question decision): FX's isolation is weaker than PX's, so callers
    /// handling untrusted input at elevated risk can opt out of the weaker
    /// backend entirely.
    pub high_risk: bool,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, config: crate::config::SandboxConfig) -> Self {
        Self {
            code: code.into(),
            files: HashMap::new(),
            stdin: String::new(),
            profile_hint: None,
            config,
            high_risk: false,
        }
    }
}

/// The result returned for every call to the Dispatcher. Exactly one is
/// produced per execution; no panic propagates out from the components that
/// build it.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub execution_time: f64,
    pub memory_used: String,
    pub exit_code: i32,
    pub files: Vec<String>,
    pub backend: Option<Backend>,
}

impl ExecutionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            ..Default::default()
        }
    }
}

/// A private, ephemeral directory holding the wrapped program, optional
/// stdin file, and user-supplied files for a single execution. Deleted
/// unconditionally on exit, regardless of success, failure, or timeout.
#[derive(Debug)]
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    pub fn create() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("runbox-").tempdir()?,
        })
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Per-profile bookkeeping owned by the Image Manager. `built` images
/// reference a launchable tag; `building` entries have at most one in-flight
/// build and no launchable image yet.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub profile: RuntimeProfile,
    pub state: ImageState,
    pub tag: Option<String>,
    pub last_used: std::time::Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Absent,
    Building,
    Built,
}

pub const MAIN_FILE: &str = "main.py";
pub const STDIN_FILE: &str = "input.txt";
