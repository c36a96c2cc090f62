use crate::config::SandboxConfig;

/// Which sentinel family a generated wrapper should emit. PX uses
/// `__SANDBOX_*`; FX uses the analogous `__FALLBACK_*` family (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelFamily {
    Sandbox,
    Fallback,
}

impl SentinelFamily {
    fn prefix(self) -> &'static str {
        match self {
            SentinelFamily::Sandbox => "__SANDBOX_",
            SentinelFamily::Fallback => "__FALLBACK_",
        }
    }
}

/// Generate a single self-contained Python program that installs an import
/// blocker, a wall-clock deadline, and stdout/stderr capture around `code`,
/// then emits a sentinel-delimited report (spec §4.1). For the Sandbox
/// family it also chdirs into `/out` right before `code` runs, so relative
/// file writes land in PX's writable mount rather than the read-only one.
///
/// `signal.alarm` is available only on Unix; it is what the original
/// implementation under retrieval uses for the inner deadline, and POSIX is
/// this crate's only supported host platform for the interpreter subprocess
/// and container entrypoint, so it is kept as-is rather than polyfilled.
pub fn generate_wrapped_program(
    code: &str,
    config: &SandboxConfig,
    family: SentinelFamily,
) -> String {
    let prefix = family.prefix();
    let blocked_modules = python_list_literal(&config.import_policy.denied_modules);
    let blocked_builtins = python_list_literal(&config.import_policy.denied_builtins);
    // An all-whitespace (including empty) program indents down to a blank
    // line, which Python rejects as an empty `with` body; substitute a
    // no-op statement so `code = ""` still yields a clean, successful run
    // (spec §8 boundary behavior) instead of a wrapper-level IndentationError.
    let effective_code = if code.trim().is_empty() { "pass" } else { code };
    let indented_with_stdin = indent(effective_code, 16);
    let indented_without_stdin = indent(effective_code, 12);
    let timeout = config.timeout_secs;
    let max_output = config.max_output_size;
    let memory_bytes = crate::config::parse_memory_bytes(&config.memory_limit);
    let rlimit_setup = match family {
        SentinelFamily::Sandbox => String::new(),
        // FX has no container memory cgroup to fall back on, so the wrapped
        // program caps its own address space and CPU time directly (mirrors
        // the original `_wrap_code_for_subprocess`'s `resource.setrlimit`
        // calls, applied right after the import blocker and before the
        // SIGALRM handler is installed).
        SentinelFamily::Fallback => format!(
            "import resource\n\
             resource.setrlimit(resource.RLIMIT_AS, ({memory_bytes}, {memory_bytes}))\n\
             resource.setrlimit(resource.RLIMIT_CPU, ({timeout}, {timeout}))\n"
        ),
    };
    // PX mounts the workspace read-only at /app and a sibling writable
    // directory at /out (primary_executor.rs); user code writing relative
    // paths needs its cwd there, not at /app, or every write fails against
    // the read-only bind. The chdir happens only after `input.txt` has
    // already been opened from /app, and only for the Sandbox family: FX has
    // no split mount and keeps running in its single writable workspace.
    let (chdir_with_stdin, chdir_without_stdin) = match family {
        SentinelFamily::Sandbox => (
            format!("{}os.chdir('/out')\n", " ".repeat(16)),
            format!("{}os.chdir('/out')\n", " ".repeat(12)),
        ),
        SentinelFamily::Fallback => (String::new(), String::new()),
    };

    format!(
        r#"import sys
import os
import signal
import traceback
import time
import io
from contextlib import redirect_stdout, redirect_stderr

BLOCKED_MODULES = {blocked_modules}
BLOCKED_BUILTINS = {blocked_builtins}

class ImportBlock:
    def __init__(self, blocked_modules):
        self.blocked_modules = set(blocked_modules)
        self.original_import = __builtins__.__import__

    def __call__(self, name, *args, **kwargs):
        root = name.split('.')[0]
        if name in self.blocked_modules or root in self.blocked_modules:
            raise ImportError(f"Module '{{name}}' is blocked for security reasons")
        if name.startswith('.'):
            raise ImportError("Relative imports are not allowed")
        return self.original_import(name, *args, **kwargs)

__builtins__.__import__ = ImportBlock(BLOCKED_MODULES)
_real_open = __builtins__.open  # saved before blocking: the wrapper itself still needs it for input.txt
for _name in BLOCKED_BUILTINS:
    if _name != "__import__" and hasattr(__builtins__, _name):
        setattr(__builtins__, _name, None)

{rlimit_setup}
def timeout_handler(signum, frame):
    raise TimeoutError(f"Code execution timed out after {timeout} seconds")

signal.signal(signal.SIGALRM, timeout_handler)
signal.alarm({timeout})

stdout_capture = io.StringIO()
stderr_capture = io.StringIO()

try:
    start_time = time.time()

    try:
        with _real_open('input.txt', 'r') as f:
            sys.stdin = f
            with redirect_stdout(stdout_capture), redirect_stderr(stderr_capture):
{chdir_with_stdin}{indented_with_stdin}
    except FileNotFoundError:
        with redirect_stdout(stdout_capture), redirect_stderr(stderr_capture):
{chdir_without_stdin}{indented_without_stdin}

    end_time = time.time()
    execution_time = end_time - start_time

    stdout_content = stdout_capture.getvalue()
    stderr_content = stderr_capture.getvalue()

    max_size = {max_output}
    if len(stdout_content) > max_size:
        stdout_content = stdout_content[:max_size] + "\n... (output truncated)"

    print("{prefix}STDOUT__")
    print(stdout_content)
    print("{prefix}STDERR__")
    print(stderr_content)
    print(f"{prefix}TIME__{{execution_time}}")
    print("{prefix}SUCCESS__")

except Exception as e:
    error_msg = traceback.format_exc()
    print("{prefix}STDOUT__")
    print("")
    print("{prefix}STDERR__")
    print(error_msg)
    if "timed out" in str(e).lower():
        print("{prefix}TIMEOUT__")
    print("{prefix}ERROR__")
finally:
    signal.alarm(0)
"#
    )
}

fn indent(code: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    code.split('\n')
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn python_list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("{s:?}")).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_sentinels_in_order_for_sandbox_family() {
        let program = generate_wrapped_program(
            "print(2 + 2)",
            &SandboxConfig::default(),
            SentinelFamily::Sandbox,
        );
        let stdout_pos = program.find("__SANDBOX_STDOUT__").expect("stdout sentinel");
        let stderr_pos = program.find("__SANDBOX_STDERR__").expect("stderr sentinel");
        let time_pos = program.find("__SANDBOX_TIME__").expect("time sentinel");
        let success_pos = program
            .find("__SANDBOX_SUCCESS__")
            .expect("success sentinel");
        assert!(stdout_pos < stderr_pos);
        assert!(stderr_pos < time_pos);
        assert!(time_pos < success_pos);
    }

    #[test]
    fn uses_fallback_prefix_for_fallback_family() {
        let program = generate_wrapped_program(
            "print(1)",
            &SandboxConfig::default(),
            SentinelFamily::Fallback,
        );
        assert!(program.contains("__FALLBACK_STDOUT__"));
        assert!(!program.contains("__SANDBOX_STDOUT__"));
    }

    #[test]
    fn fallback_family_embeds_rlimit_calls_sandbox_family_does_not() {
        let config = SandboxConfig::default();
        let fallback = generate_wrapped_program("print(1)", &config, SentinelFamily::Fallback);
        assert!(fallback.contains("resource.setrlimit(resource.RLIMIT_AS"));
        assert!(fallback.contains("resource.setrlimit(resource.RLIMIT_CPU"));
        assert!(fallback.contains(&format!("({}, {})", 128 * 1024 * 1024, 128 * 1024 * 1024)));

        let sandbox = generate_wrapped_program("print(1)", &config, SentinelFamily::Sandbox);
        assert!(!sandbox.contains("resource.setrlimit"));
    }

    #[test]
    fn embeds_denylisted_modules() {
        let program = generate_wrapped_program(
            "import socket",
            &SandboxConfig::default(),
            SentinelFamily::Sandbox,
        );
        assert!(program.contains("\"socket\""));
        assert!(program.contains("import socket"));
    }

    #[test]
    fn indents_user_code_under_both_stdin_branches() {
        let program =
            generate_wrapped_program("x = 1", &SandboxConfig::default(), SentinelFamily::Sandbox);
        assert!(program.contains("                x = 1"));
        assert!(program.contains("            x = 1"));
    }

    #[test]
    fn empty_code_substitutes_a_pass_statement_instead_of_a_blank_block() {
        let program =
            generate_wrapped_program("", &SandboxConfig::default(), SentinelFamily::Sandbox);
        assert!(program.contains("            pass"));
        assert!(program.contains("                pass"));

        let whitespace_only = generate_wrapped_program(
            "   \n\t\n",
            &SandboxConfig::default(),
            SentinelFamily::Sandbox,
        );
        assert!(whitespace_only.contains("pass"));
    }

    #[test]
    fn sandbox_family_chdirs_to_out_after_opening_input_but_before_user_code() {
        let program = generate_wrapped_program(
            "open('result.txt', 'w').write('done')",
            &SandboxConfig::default(),
            SentinelFamily::Sandbox,
        );
        let input_open_pos = program
            .find("_real_open('input.txt', 'r')")
            .expect("input.txt open");
        let chdir_pos = program.find("os.chdir('/out')").expect("chdir to /out");
        let user_code_pos = program
            .find("open('result.txt', 'w')")
            .expect("user code");
        assert!(input_open_pos < chdir_pos);
        assert!(chdir_pos < user_code_pos);

        let fallback = generate_wrapped_program(
            "open('result.txt', 'w').write('done')",
            &SandboxConfig::default(),
            SentinelFamily::Fallback,
        );
        assert!(!fallback.contains("os.chdir"));
    }

    #[test]
    fn saves_real_open_before_blocking_builtins_so_stdin_redirect_still_works() {
        // A custom policy may re-add `open` to the denylist; the wrapper's
        // own `input.txt` read must use a reference captured before the
        // blocking loop runs, or it would crash on its own stdin setup.
        let mut config = SandboxConfig::default();
        config.import_policy.denied_builtins.push("open".to_string());
        let program = generate_wrapped_program("print(1)", &config, SentinelFamily::Sandbox);
        let real_open_pos = program.find("_real_open = __builtins__.open").expect("saved ref");
        let block_loop_pos = program.find("for _name in BLOCKED_BUILTINS").expect("block loop");
        assert!(real_open_pos < block_loop_pos);
        assert!(program.contains("_real_open('input.txt', 'r')"));
        assert!(!program.contains("with open('input.txt'"));
    }
}
