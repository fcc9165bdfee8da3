use clap::Parser;
use std::path::PathBuf;

use shellbroker::ShellKind;
use shellbroker::config::CliOverrides;

#[derive(Parser)]
#[command(name = "shellbroker")]
#[command(about = "MCP server brokering policy-checked shell command execution", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file path (TOML)
    #[arg(long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Initial working directory for commands
    #[arg(long, value_name = "path")]
    pub initial_dir: Option<String>,

    /// Enable exactly this shell and disable all others
    #[arg(long, value_enum, value_name = "shell")]
    pub shell: Option<ShellKind>,

    /// Developer mode: enable powershell, bash, and wsl
    #[arg(long)]
    pub dev: bool,

    /// Run without directory restriction when no allowed paths are configured
    #[arg(long)]
    pub allow_all_dirs: bool,

    /// Clear the deny lists and injection protection, keep directory restriction
    #[arg(long)]
    pub yolo: bool,

    /// As --yolo, and drop directory restriction too
    #[arg(long = "unsafe")]
    pub unsafe_mode: bool,

    /// Replace the blocked-command list (repeatable; a single "" clears it)
    #[arg(long = "blocked-command", value_name = "name")]
    pub blocked_commands: Vec<String>,

    /// Replace the blocked-argument list (repeatable; a single "" clears it)
    #[arg(long = "blocked-argument", value_name = "flag")]
    pub blocked_arguments: Vec<String>,

    /// Replace the blocked-operator list (repeatable; a single "" clears it)
    #[arg(long = "blocked-operator", value_name = "op")]
    pub blocked_operators: Vec<String>,

    /// Replace the allowed-path list (repeatable; a single "" clears it)
    #[arg(long = "allowed-path", value_name = "path")]
    pub allowed_paths: Vec<String>,

    /// Default command timeout in seconds [1, 3600]
    #[arg(long, value_name = "seconds")]
    pub command_timeout: Option<i64>,

    /// Lines of command output returned inline
    #[arg(long, value_name = "lines")]
    pub max_output_lines: Option<i64>,

    /// Mirror each stored log entry as a JSON file into this directory
    #[arg(long, value_name = "path")]
    pub log_dir: Option<PathBuf>,

    /// Show commands and debug info on stderr
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            initial_dir: self.initial_dir.clone(),
            shell: self.shell,
            dev_mode: self.dev,
            yolo: self.yolo,
            unsafe_mode: self.unsafe_mode,
            allow_all_dirs: self.allow_all_dirs,
            blocked_commands: override_list(&self.blocked_commands),
            blocked_arguments: override_list(&self.blocked_arguments),
            blocked_operators: override_list(&self.blocked_operators),
            allowed_paths: override_list(&self.allowed_paths),
            command_timeout: self.command_timeout,
            max_output_lines: self.max_output_lines,
        }
    }
}

/// Absent flags keep the earlier config layer; a single empty value clears
/// the list; anything else replaces it.
fn override_list(values: &[String]) -> Option<Vec<String>> {
    match values {
        [] => None,
        [only] if only.is_empty() => Some(Vec::new()),
        values => Some(values.to_vec()),
    }
}
