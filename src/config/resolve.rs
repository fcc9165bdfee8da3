//! Layered config resolution: defaults → config file → CLI overrides.
//!
//! Scalars replace, objects deep-merge field by field, and arrays have
//! replacement semantics (absent keeps, non-empty replaces, empty clears).
//! The output contains only enabled shells, each with its allowed-path set
//! already normalized into the shell's native convention and, for WSL-like
//! shells inheriting global paths, augmented with the converted global
//! Windows entries.

use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ConfigError;
use crate::path;
use crate::shell::ShellKind;
use crate::validate;

use super::file::{
    FileConfig, LoggingSection, PathsSection, RestrictionsSection, SecuritySection,
};

/// Deny lists applied when no layer overrides them.
pub const DEFAULT_BLOCKED_COMMANDS: &[&str] = &[
    "rm", "del", "rmdir", "format", "mkfs", "dd", "shutdown", "restart", "reg", "regedit", "net",
    "netsh", "takeown", "icacls",
];

pub const DEFAULT_BLOCKED_ARGUMENTS: &[&str] = &[
    "--exec",
    "-e",
    "/c",
    "-enc",
    "-encodedcommand",
    "-command",
    "--interactive",
    "-i",
    "--login",
    "--system",
];

pub const DEFAULT_BLOCKED_OPERATORS: &[&str] = &["&", "|", ";", "`"];

const DEFAULT_MAX_COMMAND_LENGTH: i64 = 2000;
const DEFAULT_COMMAND_TIMEOUT_SECS: i64 = 30;

/// Overrides collected from the command line; the last layer of the merge.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub initial_dir: Option<String>,
    /// Enable exactly this shell and disable all others.
    pub shell: Option<ShellKind>,
    /// Developer mode: enable `powershell`, `bash`, and `wsl`.
    pub dev_mode: bool,
    /// Clear deny lists and injection protection; keep directory restriction.
    pub yolo: bool,
    /// As yolo, and additionally drop directory restriction.
    pub unsafe_mode: bool,
    /// Escape hatch: with nothing else configured, run without directory
    /// restriction or injection protection.
    pub allow_all_dirs: bool,
    pub blocked_commands: Option<Vec<String>>,
    pub blocked_arguments: Option<Vec<String>>,
    pub blocked_operators: Option<Vec<String>>,
    pub allowed_paths: Option<Vec<String>>,
    pub command_timeout: Option<i64>,
    pub max_output_lines: Option<i64>,
}

/// A shell's fully merged, request-time configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedShellConfig {
    pub kind: ShellKind,
    pub name: String,
    pub enabled: bool,
    pub executable: Executable,
    pub security: SecuritySettings,
    pub restrictions: Restrictions,
    /// Allowed paths in the shell's native convention.
    pub allowed_paths: Vec<String>,
    /// `allowed_paths` plus WSL-converted global Windows paths when
    /// `wsl.inherit_global_paths` applies. This is the set the validator
    /// checks against.
    pub effective_allowed_paths: Vec<String>,
    pub wsl: WslConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Executable {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySettings {
    pub max_command_length: usize,
    pub command_timeout_secs: u64,
    pub enable_injection_protection: bool,
    pub restrict_working_directory: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Restrictions {
    pub blocked_commands: Vec<String>,
    pub blocked_arguments: Vec<String>,
    pub blocked_operators: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WslConfig {
    pub mount_point: String,
    pub inherit_global_paths: bool,
}

/// Bounded-log settings shared by the store and the dispatcher.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub max_output_lines: usize,
    pub enable_truncation: bool,
    pub max_stored_logs: usize,
    pub max_log_size: usize,
    pub max_total_storage_size: usize,
    pub enable_log_resources: bool,
    pub log_retention_minutes: u64,
    pub cleanup_interval_minutes: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            max_output_lines: 20,
            enable_truncation: true,
            max_stored_logs: 50,
            max_log_size: 1024 * 1024,
            max_total_storage_size: 50 * 1024 * 1024,
            enable_log_resources: true,
            log_retention_minutes: 24 * 60,
            cleanup_interval_minutes: 5,
        }
    }
}

/// Everything the server needs after a successful load.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Enabled shells only, in registry order.
    pub shells: IndexMap<String, ResolvedShellConfig>,
    pub logging: LoggingConfig,
    /// Startup current directory, already checked against the allowed sets.
    pub initial_dir: Option<String>,
}

/// Resolve the layered configuration into per-shell request-time configs.
pub fn resolve(file: &FileConfig, cli: &CliOverrides) -> Result<ResolvedConfig, ConfigError> {
    if cli.yolo && cli.unsafe_mode {
        return Err(ConfigError::ConflictingModes);
    }

    for name in file.shells.keys() {
        ShellKind::from_str(name).map_err(|_| ConfigError::UnknownShell(name.clone()))?;
    }

    let cli_security = SecuritySection {
        command_timeout: cli.command_timeout,
        ..Default::default()
    };
    let cli_restrictions = RestrictionsSection {
        blocked_commands: cli.blocked_commands.clone(),
        blocked_arguments: cli.blocked_arguments.clone(),
        blocked_operators: cli.blocked_operators.clone(),
    };
    let cli_paths = PathsSection {
        allowed_paths: cli.allowed_paths.clone(),
        initial_dir: cli.initial_dir.clone(),
    };

    // Global layers, used both directly and as the base for per-shell merges
    let mut global_paths = PathsSection::default();
    global_paths.merge_from(&file.global.paths);
    global_paths.merge_from(&cli_paths);

    let paths_configured = global_paths
        .allowed_paths
        .as_ref()
        .is_some_and(|v| !v.is_empty())
        || global_paths.initial_dir.is_some();
    let allow_all = cli.allow_all_dirs && !paths_configured;
    if cli.allow_all_dirs && paths_configured {
        log::warn!("--allow-all-dirs ignored: allowed paths or an initial directory are configured");
    }

    // With nothing configured and no escape hatch, the server's own working
    // directory is the default allowed root.
    let global_allowed_raw: Vec<String> = match &global_paths.allowed_paths {
        Some(list) => list.clone(),
        None if allow_all => Vec::new(),
        None => default_allowed_paths(),
    };

    let logging = resolve_logging(&file.logging, cli)?;

    let mut shells = IndexMap::new();
    for kind in ShellKind::all() {
        let name = kind.to_string();
        let section = file.shells.get(&name).cloned().unwrap_or_default();

        let mut enabled = section.enabled.unwrap_or_else(|| kind.enabled_by_default());
        if cli.dev_mode
            && matches!(kind, ShellKind::Powershell | ShellKind::Bash | ShellKind::Wsl)
        {
            enabled = true;
        }
        if let Some(selected) = cli.shell {
            enabled = kind == selected;
        }
        if !enabled {
            continue;
        }

        let mut security = default_security();
        security.merge_from(&file.global.security);
        security.merge_from(&section.security);
        security.merge_from(&cli_security);
        let mut security = validate_security(&name, &security)?;

        let mut restrictions = default_restrictions();
        restrictions.merge_from(&file.global.restrictions);
        restrictions.merge_from(&section.restrictions);
        restrictions.merge_from(&cli_restrictions);
        let mut restrictions = materialize_restrictions(&restrictions);

        if cli.yolo || cli.unsafe_mode {
            restrictions = Restrictions {
                blocked_commands: Vec::new(),
                blocked_arguments: Vec::new(),
                blocked_operators: Vec::new(),
            };
            security.enable_injection_protection = false;
        }
        if cli.unsafe_mode {
            security.restrict_working_directory = false;
        }
        if allow_all {
            security.restrict_working_directory = false;
            security.enable_injection_protection = false;
        }

        let (default_command, default_args) = kind.default_executable();
        let executable = Executable {
            command: section
                .executable
                .command
                .clone()
                .unwrap_or_else(|| default_command_for(kind, default_command)),
            args: section
                .executable
                .args
                .clone()
                .unwrap_or_else(|| default_args.iter().map(|s| s.to_string()).collect()),
        };
        if executable.command.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "shell '{name}' is enabled but its executable command is empty"
            )));
        }

        let wsl = WslConfig {
            mount_point: section
                .wsl
                .mount_point
                .clone()
                .unwrap_or_else(|| path::DEFAULT_WSL_MOUNT.to_string()),
            inherit_global_paths: section.wsl.inherit_global_paths.unwrap_or(true),
        };

        // Shell-native allowed set: global list unless the shell section
        // replaced it, CLI last
        let mut shell_paths = PathsSection {
            allowed_paths: Some(global_allowed_raw.clone()),
            initial_dir: None,
        };
        shell_paths.merge_from(&section.paths);
        shell_paths.merge_from(&PathsSection {
            allowed_paths: cli_paths.allowed_paths.clone(),
            initial_dir: None,
        });
        let raw_allowed = shell_paths.allowed_paths.unwrap_or_default();

        let mut allowed_paths: Vec<String> = Vec::new();
        for raw in &raw_allowed {
            match path::normalize_for_shell(raw, kind, &wsl.mount_point) {
                Ok(normalized) => {
                    if !allowed_paths.contains(&normalized) {
                        allowed_paths.push(normalized);
                    }
                }
                Err(e) => {
                    log::warn!("allowed path '{raw}' skipped for shell '{name}': {e}");
                }
            }
        }

        let mut effective_allowed_paths = allowed_paths.clone();
        if kind.is_wsl_shell() && wsl.inherit_global_paths {
            for global in &global_allowed_raw {
                if path::is_windows_drive_path(global)
                    && let Ok(converted) = path::windows_to_wsl_mount(global, &wsl.mount_point)
                    && !effective_allowed_paths.contains(&converted)
                {
                    effective_allowed_paths.push(converted);
                }
            }
        }

        if security.restrict_working_directory && effective_allowed_paths.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "shell '{name}' restricts working directories but has no usable allowed \
                 paths; configure global.paths.allowed-paths or pass --allow-all-dirs"
            )));
        }

        shells.insert(
            name.clone(),
            ResolvedShellConfig {
                kind,
                name,
                enabled,
                executable,
                security,
                restrictions,
                allowed_paths,
                effective_allowed_paths,
                wsl,
            },
        );
    }

    let initial_dir = resolve_initial_dir(global_paths.initial_dir.as_deref(), &shells);

    Ok(ResolvedConfig {
        shells,
        logging,
        initial_dir,
    })
}

/// Sanitized configuration for `get_config` and `cli://config`: enabled
/// shells only, executables removed.
pub fn sanitized(resolved: &ResolvedConfig) -> serde_json::Value {
    let mut shells = serde_json::Map::new();
    for (name, cfg) in &resolved.shells {
        let mut value = serde_json::to_value(cfg).expect("shell config serializes");
        if let Some(obj) = value.as_object_mut() {
            obj.remove("executable");
            obj.remove("enabled");
            obj.remove("name");
        }
        shells.insert(name.clone(), value);
    }
    serde_json::json!({
        "shells": shells,
        "logging": resolved.logging,
        "initialDir": resolved.initial_dir,
    })
}

/// Default executable for a kind, with Git Bash located at runtime on
/// Windows: PATH often lists the WSL launcher (`C:\Windows\System32\bash.exe`)
/// ahead of Git Bash, so the location is derived from `git.exe` instead.
#[cfg(windows)]
fn default_command_for(kind: ShellKind, fallback: &str) -> String {
    if kind != ShellKind::Gitbash {
        return fallback.to_string();
    }
    let Some(git) = which::which("git").ok() else {
        return fallback.to_string();
    };
    let Some(root) = git.parent().and_then(|p| p.parent()) else {
        return fallback.to_string();
    };
    for candidate in [
        root.join("bin").join("bash.exe"),
        root.join("usr").join("bin").join("bash.exe"),
    ] {
        if candidate.exists() {
            return candidate.display().to_string();
        }
    }
    fallback.to_string()
}

#[cfg(not(windows))]
fn default_command_for(_kind: ShellKind, fallback: &str) -> String {
    fallback.to_string()
}

fn default_security() -> SecuritySection {
    SecuritySection {
        max_command_length: Some(DEFAULT_MAX_COMMAND_LENGTH),
        command_timeout: Some(DEFAULT_COMMAND_TIMEOUT_SECS),
        enable_injection_protection: Some(true),
        restrict_working_directory: Some(true),
    }
}

fn default_restrictions() -> RestrictionsSection {
    RestrictionsSection {
        blocked_commands: Some(
            DEFAULT_BLOCKED_COMMANDS.iter().map(|s| s.to_string()).collect(),
        ),
        blocked_arguments: Some(
            DEFAULT_BLOCKED_ARGUMENTS.iter().map(|s| s.to_string()).collect(),
        ),
        blocked_operators: Some(
            DEFAULT_BLOCKED_OPERATORS.iter().map(|s| s.to_string()).collect(),
        ),
    }
}

fn default_allowed_paths() -> Vec<String> {
    match std::env::current_dir() {
        Ok(dir) => vec![dir.display().to_string()],
        Err(_) => Vec::new(),
    }
}

fn materialize_restrictions(section: &RestrictionsSection) -> Restrictions {
    Restrictions {
        blocked_commands: section.blocked_commands.clone().unwrap_or_default(),
        blocked_arguments: section.blocked_arguments.clone().unwrap_or_default(),
        blocked_operators: section.blocked_operators.clone().unwrap_or_default(),
    }
}

fn validate_security(
    shell: &str,
    section: &SecuritySection,
) -> Result<SecuritySettings, ConfigError> {
    let timeout = section.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
    if !(1..=3600).contains(&timeout) {
        return Err(ConfigError::Bounds {
            field: "command-timeout",
            message: format!("{timeout}s for shell '{shell}' is outside [1, 3600]"),
        });
    }
    let max_len = section
        .max_command_length
        .unwrap_or(DEFAULT_MAX_COMMAND_LENGTH);
    if max_len < 1 {
        return Err(ConfigError::Bounds {
            field: "max-command-length",
            message: format!("{max_len} for shell '{shell}' is below 1"),
        });
    }
    Ok(SecuritySettings {
        max_command_length: max_len as usize,
        command_timeout_secs: timeout as u64,
        enable_injection_protection: section.enable_injection_protection.unwrap_or(true),
        restrict_working_directory: section.restrict_working_directory.unwrap_or(true),
    })
}

fn resolve_logging(
    section: &LoggingSection,
    cli: &CliOverrides,
) -> Result<LoggingConfig, ConfigError> {
    let defaults = LoggingConfig::default();
    let mut merged = LoggingSection {
        max_output_lines: Some(defaults.max_output_lines as i64),
        enable_truncation: Some(defaults.enable_truncation),
        max_stored_logs: Some(defaults.max_stored_logs as i64),
        max_log_size: Some(defaults.max_log_size as i64),
        max_total_storage_size: Some(defaults.max_total_storage_size as i64),
        enable_log_resources: Some(defaults.enable_log_resources),
        log_retention_minutes: Some(defaults.log_retention_minutes as i64),
        cleanup_interval_minutes: Some(defaults.cleanup_interval_minutes as i64),
    };
    merged.merge_from(section);
    merged.merge_from(&LoggingSection {
        max_output_lines: cli.max_output_lines,
        ..Default::default()
    });

    let nonneg = |field: &'static str, value: i64| -> Result<usize, ConfigError> {
        usize::try_from(value).map_err(|_| ConfigError::Bounds {
            field,
            message: format!("{value} is negative"),
        })
    };

    let max_output_lines = nonneg("max-output-lines", merged.max_output_lines.unwrap())?;
    if max_output_lines < 1 {
        return Err(ConfigError::Bounds {
            field: "max-output-lines",
            message: "must be at least 1".to_string(),
        });
    }

    Ok(LoggingConfig {
        max_output_lines,
        enable_truncation: merged.enable_truncation.unwrap(),
        max_stored_logs: nonneg("max-stored-logs", merged.max_stored_logs.unwrap())?,
        max_log_size: nonneg("max-log-size", merged.max_log_size.unwrap())?,
        max_total_storage_size: nonneg(
            "max-total-storage-size",
            merged.max_total_storage_size.unwrap(),
        )?,
        enable_log_resources: merged.enable_log_resources.unwrap(),
        log_retention_minutes: nonneg(
            "log-retention-minutes",
            merged.log_retention_minutes.unwrap(),
        )? as u64,
        cleanup_interval_minutes: nonneg(
            "cleanup-interval-minutes",
            merged.cleanup_interval_minutes.unwrap(),
        )? as u64,
    })
}

/// Pick the server's startup current directory.
///
/// With no configured initial dir the current directory stays unset and the
/// `set_current_directory` tool surfaces it. A configured dir that exists
/// and sits inside some enabled shell's allowed set wins; a configured but
/// unusable one logs a warning and falls back to the first allowed path.
fn resolve_initial_dir(
    configured: Option<&str>,
    shells: &IndexMap<String, ResolvedShellConfig>,
) -> Option<String> {
    let raw = configured?;

    match dunce::canonicalize(raw) {
        Ok(dir) => {
            let dir = dir.display().to_string();
            if shells.values().any(|cfg| validate::is_path_allowed(&dir, cfg)) {
                return Some(dir);
            }
            log::warn!("initial directory '{dir}' is outside all allowed paths; falling back");
        }
        Err(e) => {
            log::warn!("initial directory '{raw}' is not usable: {e}; falling back");
        }
    }

    shells
        .values()
        .flat_map(|cfg| cfg.effective_allowed_paths.first())
        .next()
        .cloned()
}
