use std::io;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use shellbroker::config::{self, FileConfig};
use shellbroker::logs::LogStore;
use shellbroker::logs::file_sink::FileSink;
use shellbroker::server::{McpServer, ServerState};

mod cli;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    // stdout carries the protocol stream; all logging goes to stderr
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "off" }),
    )
    .init();

    if let Err(e) = run(cli) {
        eprintln!("shellbroker: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let file = match &cli.config {
        Some(path) => config::load_file(path)?,
        None => FileConfig::default(),
    };
    let resolved = config::resolve(&file, &cli.overrides())?;
    log::debug!(
        "enabled shells: {}",
        resolved
            .shells
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let sink = match &cli.log_dir {
        Some(dir) => Some(
            FileSink::new(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?,
        ),
        None => None,
    };

    let logs = Arc::new(LogStore::new(resolved.logging.clone(), sink));
    logs.start_sweep();

    let state = Arc::new(ServerState::new(resolved, Arc::clone(&logs)));
    McpServer::new(state).run(io::stdin().lock(), io::stdout());

    logs.stop_sweep();
    Ok(())
}
