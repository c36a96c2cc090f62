use chrono::Utc;
use owo_colors::OwoColorize;
use owo_colors::Style;
use runbox_common::elapsed::format_duration;
use runbox_common::sandbox_summary::summarize_config;
use runbox_core::config::SandboxConfig;
use runbox_core::types::ExecutionResult;

/// Renders a finished [`ExecutionResult`] to the terminal. Mirrors the
/// teacher's `EventProcessor` split between a human-readable renderer and a
/// machine-readable one selected by a CLI flag, collapsed here to a single
/// print (this CLI issues one request and prints one result, not a stream of
/// agent events).
pub trait ResultPrinter {
    fn print_config_summary(&mut self, config: &SandboxConfig, code: &str);
    fn print_result(&mut self, result: &ExecutionResult);
}

pub struct HumanPrinter {
    bold: Style,
    dimmed: Style,
    green: Style,
    red: Style,
}

impl HumanPrinter {
    pub fn create_with_ansi(with_ansi: bool) -> Self {
        if with_ansi {
            Self {
                bold: Style::new().bold(),
                dimmed: Style::new().dimmed(),
                green: Style::new().green(),
                red: Style::new().red(),
            }
        } else {
            Self {
                bold: Style::new(),
                dimmed: Style::new(),
                green: Style::new(),
                red: Style::new(),
            }
        }
    }
}

macro_rules! ts_println {
    ($($arg:tt)*) => {{
        let now = Utc::now();
        let formatted = now.format("%Y-%m-%dT%H:%M:%S").to_string();
        print!("[{}] ", formatted);
        println!($($arg)*);
    }};
}

impl ResultPrinter for HumanPrinter {
    fn print_config_summary(&mut self, config: &SandboxConfig, code: &str) {
        let summary = summarize_config(config).style(self.dimmed);
        ts_println!("{summary}");
        let first_line = code.lines().next().unwrap_or("");
        ts_println!("{} {}", "running:".style(self.bold), first_line);
    }

    fn print_result(&mut self, result: &ExecutionResult) {
        let backend = result
            .backend
            .map(|b| b.to_string())
            .unwrap_or_else(|| "none".to_string());
        let duration = format_duration(std::time::Duration::from_secs_f64(
            result.execution_time.max(0.0),
        ));

        if result.success {
            let title = format!("succeeded via {backend} in {duration}:");
            ts_println!("{}", title.style(self.green));
        } else {
            let title = format!("failed via {backend} in {duration}:");
            ts_println!("{}", title.style(self.red));
        }

        if !result.output.is_empty() {
            println!("{}", result.output);
        }
        if !result.error.is_empty() {
            eprintln!("{}", result.error.style(self.red));
        }
        if !result.files.is_empty() {
            let files = format!("files created: {}", result.files.join(", "));
            ts_println!("{}", files.style(self.dimmed));
        }
    }
}

pub struct JsonPrinter;

impl JsonPrinter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultPrinter for JsonPrinter {
    fn print_config_summary(&mut self, config: &SandboxConfig, code: &str) {
        let summary = serde_json::json!({
            "config": summarize_config(config),
            "code": code,
        });
        println!("{summary}");
    }

    fn print_result(&mut self, result: &ExecutionResult) {
        match serde_json::to_string(result) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("failed to serialize result: {e}"),
        }
    }
}
