mod cli;
mod result_printer;

use std::collections::HashMap;
use std::io::IsTerminal;
use std::io::Read;

pub use cli::Cli;
use result_printer::HumanPrinter;
use result_printer::JsonPrinter;
use result_printer::ResultPrinter;
use runbox_core::Dispatcher;
use runbox_core::config::SandboxConfig;
use runbox_core::types::ExecutionRequest;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Parse and run one sandboxed execution request, printing the result and
/// returning the process exit code (0 on success, 1 otherwise). Never
/// propagates a panic: every failure this function can't recover from
/// terminates via `std::process::exit` after printing an explanation, just
/// like the CLI this crate's layout is grounded on.
pub async fn run_main(cli: Cli) -> anyhow::Result<i32> {
    let Cli {
        code,
        files,
        stdin,
        stdin_file,
        config_path,
        timeout_secs,
        memory_limit,
        cpu_limit,
        max_output_size,
        max_file_size,
        profile,
        high_risk,
        json,
        color,
    } = cli;

    let default_level = "error";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let code = match code {
        Some(c) if c != "-" => c,
        maybe_dash => {
            let force_stdin = matches!(maybe_dash.as_deref(), Some("-"));
            if std::io::stdin().is_terminal() && !force_stdin {
                eprintln!(
                    "No code provided. Either pass it as an argument or pipe it into stdin."
                );
                std::process::exit(1);
            }
            if !force_stdin {
                eprintln!("Reading code from stdin...");
            }
            let mut buffer = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
                eprintln!("Failed to read code from stdin: {e}");
                std::process::exit(1);
            }
            buffer
        }
    };

    let program_stdin = match stdin_file {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                eprintln!("Failed to read --stdin-file {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => stdin.unwrap_or_default(),
    };

    let mut attached = HashMap::new();
    for spec in &files {
        let (host_path, workspace_name) = match spec.split_once(':') {
            Some((path, name)) => (path, name.to_string()),
            None => {
                let name = std::path::Path::new(spec)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| spec.clone());
                (spec.as_str(), name)
            }
        };
        match std::fs::read(host_path) {
            Ok(contents) => {
                attached.insert(workspace_name, contents);
            }
            Err(e) => {
                eprintln!("Failed to read --file {host_path}: {e}");
                std::process::exit(1);
            }
        }
    }

    let mut config = SandboxConfig::load(config_path.as_deref())?;
    if let Some(v) = timeout_secs {
        config.timeout_secs = v;
    }
    if let Some(v) = memory_limit {
        config.memory_limit = v;
    }
    if let Some(v) = cpu_limit {
        config.cpu_limit = v;
    }
    if let Some(v) = max_output_size {
        config.max_output_size = v;
    }
    if let Some(v) = max_file_size {
        config.max_file_size = v;
    }

    let with_ansi = match color {
        cli::Color::Always => true,
        cli::Color::Never => false,
        cli::Color::Auto => std::io::stdout().is_terminal(),
    };

    let mut printer: Box<dyn ResultPrinter> = if json {
        Box::new(JsonPrinter::new())
    } else {
        Box::new(HumanPrinter::create_with_ansi(with_ansi))
    };
    printer.print_config_summary(&config, &code);

    let mut request = ExecutionRequest::new(code, config);
    request.files = attached;
    request.stdin = program_stdin;
    request.profile_hint = profile.map(Into::into);
    request.high_risk = high_risk;

    let dispatcher = Dispatcher::new().await;
    let result = dispatcher.execute(request).await;
    info!(success = result.success, backend = ?result.backend, "execution finished");
    printer.print_result(&result);

    Ok(if result.success { 0 } else { 1 })
}
