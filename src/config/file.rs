//! Raw configuration file layer.
//!
//! Everything in the file is optional; absent fields fall through to the
//! layer below during resolution. Numeric fields deserialize as signed so
//! out-of-range values surface as bounds errors with a helpful message
//! instead of an opaque parse failure.
//!
//! ```toml
//! [global.security]
//! command-timeout = 30
//! restrict-working-directory = true
//!
//! [global.restrictions]
//! blocked-commands = ["rm", "format"]
//!
//! [global.paths]
//! allowed-paths = ["/home/alice"]
//!
//! [shells.bash]
//! enabled = true
//!
//! [shells.bash.executable]
//! command = "/bin/bash"
//! args = ["-c"]
//!
//! [logging]
//! max-output-lines = 20
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level config file shape. Unknown keys are captured and rejected at
/// load time with a message naming them.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    #[serde(default)]
    pub global: GlobalSection,

    /// Per-shell sections, keyed by shell name (`cmd`, `powershell`,
    /// `gitbash`, `bash`, `wsl`).
    #[serde(default)]
    pub shells: BTreeMap<String, ShellSection>,

    #[serde(default)]
    pub logging: LoggingSection,

    /// Captures unknown top-level keys for the load-time rejection message
    #[serde(flatten, default, skip_serializing)]
    pub unknown: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GlobalSection {
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub restrictions: RestrictionsSection,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SecuritySection {
    pub max_command_length: Option<i64>,
    /// Seconds; bounds-checked to [1, 3600] at resolve time
    pub command_timeout: Option<i64>,
    pub enable_injection_protection: Option<bool>,
    pub restrict_working_directory: Option<bool>,
}

impl SecuritySection {
    pub fn merge_from(&mut self, later: &SecuritySection) {
        merge_scalar(&mut self.max_command_length, &later.max_command_length);
        merge_scalar(&mut self.command_timeout, &later.command_timeout);
        merge_scalar(
            &mut self.enable_injection_protection,
            &later.enable_injection_protection,
        );
        merge_scalar(
            &mut self.restrict_working_directory,
            &later.restrict_working_directory,
        );
    }
}

/// Deny lists. Arrays have replacement semantics across layers: an absent
/// field keeps the earlier value, a non-empty array replaces it, and an
/// empty array clears it.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RestrictionsSection {
    pub blocked_commands: Option<Vec<String>>,
    pub blocked_arguments: Option<Vec<String>>,
    pub blocked_operators: Option<Vec<String>>,
}

impl RestrictionsSection {
    pub fn merge_from(&mut self, later: &RestrictionsSection) {
        merge_array(&mut self.blocked_commands, &later.blocked_commands);
        merge_array(&mut self.blocked_arguments, &later.blocked_arguments);
        merge_array(&mut self.blocked_operators, &later.blocked_operators);
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PathsSection {
    pub allowed_paths: Option<Vec<String>>,
    pub initial_dir: Option<String>,
}

impl PathsSection {
    pub fn merge_from(&mut self, later: &PathsSection) {
        merge_array(&mut self.allowed_paths, &later.allowed_paths);
        merge_scalar(&mut self.initial_dir, &later.initial_dir);
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct WslSection {
    pub mount_point: Option<String>,
    pub inherit_global_paths: Option<bool>,
}

impl WslSection {
    pub fn merge_from(&mut self, later: &WslSection) {
        merge_scalar(&mut self.mount_point, &later.mount_point);
        merge_scalar(&mut self.inherit_global_paths, &later.inherit_global_paths);
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExecutableSection {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
}

/// One `[shells.<name>]` block. The nested sections deep-merge over the
/// global ones field by field.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ShellSection {
    pub enabled: Option<bool>,
    #[serde(default)]
    pub executable: ExecutableSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub restrictions: RestrictionsSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub wsl: WslSection,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LoggingSection {
    pub max_output_lines: Option<i64>,
    pub enable_truncation: Option<bool>,
    pub max_stored_logs: Option<i64>,
    /// Bytes
    pub max_log_size: Option<i64>,
    /// Bytes
    pub max_total_storage_size: Option<i64>,
    pub enable_log_resources: Option<bool>,
    pub log_retention_minutes: Option<i64>,
    pub cleanup_interval_minutes: Option<i64>,
}

impl LoggingSection {
    pub fn merge_from(&mut self, later: &LoggingSection) {
        merge_scalar(&mut self.max_output_lines, &later.max_output_lines);
        merge_scalar(&mut self.enable_truncation, &later.enable_truncation);
        merge_scalar(&mut self.max_stored_logs, &later.max_stored_logs);
        merge_scalar(&mut self.max_log_size, &later.max_log_size);
        merge_scalar(
            &mut self.max_total_storage_size,
            &later.max_total_storage_size,
        );
        merge_scalar(&mut self.enable_log_resources, &later.enable_log_resources);
        merge_scalar(
            &mut self.log_retention_minutes,
            &later.log_retention_minutes,
        );
        merge_scalar(
            &mut self.cleanup_interval_minutes,
            &later.cleanup_interval_minutes,
        );
    }
}

/// Later layer replaces when present.
fn merge_scalar<T: Clone>(base: &mut Option<T>, later: &Option<T>) {
    if let Some(value) = later {
        *base = Some(value.clone());
    }
}

/// Replacement semantics for arrays: `Some` (even empty) replaces, `None`
/// keeps. An empty array therefore clears the earlier layer's value.
fn merge_array<T: Clone>(base: &mut Option<Vec<T>>, later: &Option<Vec<T>>) {
    if let Some(value) = later {
        *base = Some(value.clone());
    }
}

/// Load and parse a config file, rejecting unknown top-level keys.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Invalid(format!("cannot read config file {}: {e}", path.display()))
    })?;
    let parsed: FileConfig = toml::from_str(&raw).map_err(|e| {
        ConfigError::Invalid(format!("cannot parse config file {}: {e}", path.display()))
    })?;
    if !parsed.unknown.is_empty() {
        let keys: Vec<&str> = parsed.unknown.keys().map(String::as_str).collect();
        return Err(ConfigError::Invalid(format!(
            "unknown configuration keys: {} (expected 'global', 'shells', 'logging')",
            keys.join(", ")
        )));
    }
    Ok(parsed)
}
