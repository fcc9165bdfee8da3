//! Configuration system for shellbroker
//!
//! Configuration is resolved once at startup from three layers:
//!
//! # Defaults
//!
//! **Purpose**: a usable, restrictive baseline with no file at all
//!
//! One platform-default shell enabled, the built-in deny lists active,
//! injection protection on, and the server's own working directory as the
//! only allowed path.
//!
//! # Config file (TOML, `--config <path>`)
//!
//! **Purpose**: the operator's persistent policy
//!
//! A `[global]` block (security scalars, deny lists, allowed paths) plus
//! optional `[shells.<name>]` blocks that deep-merge over it. Array-valued
//! fields replace rather than merge: a shell block with its own
//! `blocked-commands` fully replaces the global list, and an empty array
//! clears it.
//!
//! # CLI flags
//!
//! **Purpose**: per-launch overrides, applied last
//!
//! Shell selection (`--shell`, `--dev`), deny-list replacements, the fast
//! modes (`--yolo`, `--unsafe`), and the `--allow-all-dirs` escape hatch.
//!
//! The resolved output contains only enabled shells; each carries its fully
//! merged security settings and an allowed-path set already normalized into
//! the shell's native path convention.

mod file;
mod resolve;

// Re-export public types
pub use file::{
    ExecutableSection, FileConfig, GlobalSection, LoggingSection, PathsSection,
    RestrictionsSection, SecuritySection, ShellSection, WslSection, load_file,
};
pub use resolve::{
    CliOverrides, DEFAULT_BLOCKED_ARGUMENTS, DEFAULT_BLOCKED_COMMANDS, DEFAULT_BLOCKED_OPERATORS,
    Executable, LoggingConfig, ResolvedConfig, ResolvedShellConfig, Restrictions,
    SecuritySettings, WslConfig, resolve, sanitized,
};
