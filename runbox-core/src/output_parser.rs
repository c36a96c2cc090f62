use crate::error::Result;
use crate::error::RunboxErr;
use crate::error::SandboxErr;
use crate::wrapper::SentinelFamily;

/// The result of walking one sentinel-delimited log in a single pass
/// (spec §4.3 step 6, §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOutput {
    pub stdout: String,
    pub stderr: String,
    pub execution_time: f64,
    pub success: bool,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Stdout,
    Stderr,
}

/// Walk `log` line by line, switching section on sentinel lines belonging to
/// `family` and accumulating content otherwise. Mirrors the state machine
/// duplicated between the original `utils/sandboxing.py` and
/// `utils/fallback_sandbox.py`, written once here and shared by PX and FX.
///
/// Returns a parse-failure error carrying the first 1000 characters of `log`
/// when no sentinel line of the expected family is ever observed (spec §4.3
/// failure table, §7 item 7).
pub fn parse(log: &str, family: SentinelFamily) -> Result<ParsedOutput> {
    let prefix = match family {
        SentinelFamily::Sandbox => "__SANDBOX_",
        SentinelFamily::Fallback => "__FALLBACK_",
    };
    let stdout_sentinel = format!("{prefix}STDOUT__");
    let stderr_sentinel = format!("{prefix}STDERR__");
    let time_sentinel = format!("{prefix}TIME__");
    let success_sentinel = format!("{prefix}SUCCESS__");
    let error_sentinel = format!("{prefix}ERROR__");
    let timeout_sentinel = format!("{prefix}TIMEOUT__");

    let mut section = Section::None;
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut execution_time = 0.0_f64;
    let mut success = false;
    let mut timed_out = false;
    let mut saw_any_sentinel = false;

    for line in log.lines() {
        if line == stdout_sentinel {
            section = Section::Stdout;
            saw_any_sentinel = true;
        } else if line == stderr_sentinel {
            section = Section::Stderr;
            saw_any_sentinel = true;
        } else if let Some(rest) = line.strip_prefix(&time_sentinel) {
            execution_time = rest.parse().unwrap_or(0.0);
            saw_any_sentinel = true;
        } else if line == success_sentinel {
            success = true;
            saw_any_sentinel = true;
        } else if line == error_sentinel {
            success = false;
            saw_any_sentinel = true;
        } else if line == timeout_sentinel {
            timed_out = true;
            success = false;
            saw_any_sentinel = true;
        } else {
            match section {
                Section::Stdout => {
                    stdout.push_str(line);
                    stdout.push('\n');
                }
                Section::Stderr => {
                    stderr.push_str(line);
                    stderr.push('\n');
                }
                Section::None => {}
            }
        }
    }

    if !saw_any_sentinel {
        let prefix_chars: String = log.chars().take(1000).collect();
        return Err(RunboxErr::Sandbox(SandboxErr::ParseFailure(prefix_chars)));
    }

    Ok(ParsedOutput {
        stdout: trim_trailing_newline(&stdout),
        stderr: trim_trailing_newline(&stderr),
        execution_time,
        success,
        timed_out,
    })
}

fn trim_trailing_newline(s: &str) -> String {
    s.strip_suffix('\n').unwrap_or(s).to_string()
}
