//! Shell kinds and their execution capabilities.
//!
//! Every brokered command runs inside one of five shell kinds. The kind
//! decides three things that the rest of the crate keys off:
//!
//! - which path convention the child expects for its working directory
//!   (Windows drive paths, POSIX paths, or either for Git Bash),
//! - how command strings are tokenized and escaped when validating them,
//! - whether working directories must be translated through a WSL mount
//!   point before the child sees them.
//!
//! The capability queries here are a table over the enum, not per-shell
//! boolean flags, so validator and executor dispatch stays a `match`.

use serde::{Deserialize, Serialize};

/// Path convention a shell expects for its working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathFormat {
    /// Windows drive paths (`C:\Users\alice`).
    Windows,
    /// POSIX absolute paths (`/home/alice`, `/mnt/c/Users/alice`).
    Posix,
    /// Either form accepted (`C:\Users\alice` or `/c/Users/alice`).
    Mixed,
}

/// The supported shell kinds.
///
/// Registry names are the lowercase kind names; the default configuration
/// registers one shell per kind.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ShellKind {
    /// Windows `cmd.exe`
    Cmd,
    /// Windows PowerShell / PowerShell Core
    Powershell,
    /// Git Bash (MSYS bash on Windows)
    Gitbash,
    /// POSIX bash
    Bash,
    /// Windows Subsystem for Linux (`wsl.exe -e`)
    Wsl,
}

impl ShellKind {
    /// All kinds, in registry order.
    pub fn all() -> [ShellKind; 5] {
        use ShellKind::*;
        [Cmd, Powershell, Gitbash, Bash, Wsl]
    }

    /// Shells whose command syntax follows Windows conventions
    /// (double-quote only, caret escaping).
    pub fn is_windows_shell(self) -> bool {
        matches!(self, ShellKind::Cmd | ShellKind::Powershell)
    }

    /// Shells whose command syntax follows POSIX conventions
    /// (single and double quotes, backslash escaping).
    pub fn is_unix_shell(self) -> bool {
        matches!(self, ShellKind::Gitbash | ShellKind::Bash | ShellKind::Wsl)
    }

    /// Shells whose working directory must be expressed in POSIX form,
    /// translating Windows drives through a WSL-style mount point.
    pub fn is_wsl_shell(self) -> bool {
        matches!(self, ShellKind::Bash | ShellKind::Wsl)
    }

    /// The path convention this shell expects for its working directory.
    pub fn path_format(self) -> PathFormat {
        match self {
            ShellKind::Cmd | ShellKind::Powershell => PathFormat::Windows,
            ShellKind::Bash | ShellKind::Wsl => PathFormat::Posix,
            ShellKind::Gitbash => PathFormat::Mixed,
        }
    }

    /// Whether path comparisons for this shell fold case.
    ///
    /// Windows filesystems are case-insensitive; Git Bash paths alias a
    /// Windows filesystem even in their `/c/...` spelling. WSL paths are
    /// genuine POSIX paths and compare case-sensitively.
    pub fn folds_path_case(self) -> bool {
        matches!(
            self,
            ShellKind::Cmd | ShellKind::Powershell | ShellKind::Gitbash
        )
    }

    /// Default executable and fixed argument prefix for this kind.
    ///
    /// The prefix is everything that goes before the command string itself,
    /// e.g. `bash -c <command>` or `wsl.exe -e <command>`.
    pub fn default_executable(self) -> (&'static str, &'static [&'static str]) {
        match self {
            ShellKind::Cmd => ("cmd.exe", &["/c"]),
            ShellKind::Powershell => ("powershell.exe", &["-NoProfile", "-Command"]),
            ShellKind::Gitbash => (r"C:\Program Files\Git\bin\bash.exe", &["-c"]),
            ShellKind::Bash => ("/bin/bash", &["-c"]),
            ShellKind::Wsl => ("wsl.exe", &["-e"]),
        }
    }

    /// Whether this kind is enabled in the default (no config file) setup
    /// on the current platform.
    pub fn enabled_by_default(self) -> bool {
        #[cfg(windows)]
        {
            matches!(self, ShellKind::Cmd | ShellKind::Powershell)
        }
        #[cfg(not(windows))]
        {
            matches!(self, ShellKind::Bash)
        }
    }
}
