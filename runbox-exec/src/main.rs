//! Entry-point for the `runbox-exec` binary: a one-shot CLI that runs a
//! single source program through the sandbox and prints its result. It is a
//! thin demonstration harness around `runbox-core`'s `Dispatcher`; the chat
//! front-end this subsystem serves is out of scope here.
use clap::Parser;
use runbox_exec::Cli;
use runbox_exec::run_main;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let exit_code = run_main(cli).await?;
    std::process::exit(exit_code);
}
