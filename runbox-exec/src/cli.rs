use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

#[derive(Parser, Debug)]
#[command(version, about = "Run a source program inside the runbox sandbox")]
pub struct Cli {
    /// Source code to execute. Reads from stdin when omitted or passed as `-`.
    pub code: Option<String>,

    /// Auxiliary file to place in the workspace, as `host_path[:workspace_name]`.
    /// May be repeated.
    #[arg(long = "file", short = 'f', value_name = "PATH[:NAME]")]
    pub files: Vec<String>,

    /// Standard input fed to the executed program.
    #[arg(long = "stdin", conflicts_with = "stdin_file")]
    pub stdin: Option<String>,

    /// Read standard input for the executed program from a file.
    #[arg(long = "stdin-file", value_name = "PATH")]
    pub stdin_file: Option<PathBuf>,

    /// Path to a `SandboxConfig` TOML file; defaults apply for anything it
    /// leaves unset.
    #[arg(long = "config", value_name = "PATH")]
    pub config_path: Option<PathBuf>,

    /// Wall-clock timeout in seconds, overriding the config file/environment.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Docker-style memory limit, e.g. `128m`.
    #[arg(long)]
    pub memory_limit: Option<String>,

    /// Fraction of one CPU.
    #[arg(long)]
    pub cpu_limit: Option<f64>,

    /// Maximum captured stdout size, in characters.
    #[arg(long)]
    pub max_output_size: Option<usize>,

    /// Maximum size, in bytes, of any single attached file.
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Runtime profile hint (`basic` or `enhanced`). The Primary Executor
    /// still re-derives a profile from the code itself; this only raises the
    /// floor when the heuristic alone would under-select.
    #[arg(long, value_enum)]
    pub profile: Option<ProfileArg>,

    /// Refuse to retry via the weaker subprocess fallback if the container
    /// executor is unavailable for this request.
    #[arg(long)]
    pub high_risk: bool,

    /// Emit the result as a single line of JSON instead of formatted text.
    #[arg(long)]
    pub json: bool,

    /// Specifies color settings for use in the output.
    #[arg(long = "color", value_enum, default_value_t = Color::Auto)]
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ProfileArg {
    Basic,
    Enhanced,
}

impl From<ProfileArg> for runbox_core::types::RuntimeProfile {
    fn from(value: ProfileArg) -> Self {
        match value {
            ProfileArg::Basic => runbox_core::types::RuntimeProfile::Basic,
            ProfileArg::Enhanced => runbox_core::types::RuntimeProfile::Enhanced,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Color {
    Always,
    Never,
    #[default]
    Auto,
}
