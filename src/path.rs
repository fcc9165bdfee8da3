//! Path conversion between Windows, POSIX, WSL-mount, and Git Bash forms.
//!
//! Everything here is pure string work. The host's `std::path` is never
//! consulted: the *shell kind* dictates which convention a working directory
//! must be expressed in, and on any given host we may be preparing paths for
//! a shell with the opposite convention (e.g. `wsl.exe` children on Windows).
//!
//! Dot segments are resolved lexically, with no filesystem access. A path that
//! would escape its root via `..` is rejected rather than clamped.

use crate::error::ValidationError;
use crate::shell::{PathFormat, ShellKind};

/// Default mount point under which WSL exposes Windows drives.
pub const DEFAULT_WSL_MOUNT: &str = "/mnt/";

fn invalid(path: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// True for `C:\...`, `C:/...`, or a bare `C:`.
pub fn is_windows_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'\\' || bytes[2] == b'/')
}

/// True for the Git Bash drive spelling: `/c` or `/c/...`.
pub fn is_gitbash_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && (bytes.len() == 2 || bytes[2] == b'/')
}

/// Normalize a Windows drive path: `\` separators, uppercase drive letter,
/// lexical `.`/`..` resolution, no trailing separator except at the drive
/// root.
pub fn normalize_windows(path: &str) -> Result<String, ValidationError> {
    if path.is_empty() {
        return Err(invalid(path, "path is empty"));
    }
    let unified = path.replace('/', "\\");
    if !is_windows_drive_path(&unified) {
        return Err(invalid(path, "not an absolute Windows drive path"));
    }

    let drive = unified.as_bytes()[0].to_ascii_uppercase() as char;
    let rest = &unified[2..];

    let mut segments: Vec<&str> = Vec::new();
    for segment in rest.split('\\') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(invalid(path, "path escapes the drive root"));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        Ok(format!("{drive}:\\"))
    } else {
        Ok(format!("{drive}:\\{}", segments.join("\\")))
    }
}

/// Normalize an absolute POSIX path: collapse repeated `/`, resolve `.` and
/// `..` lexically, no trailing slash except at the root.
pub fn normalize_posix(path: &str) -> Result<String, ValidationError> {
    if path.is_empty() {
        return Err(invalid(path, "path is empty"));
    }
    if !path.starts_with('/') {
        return Err(invalid(path, "not an absolute POSIX path"));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(invalid(path, "path escapes the root"));
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Convert a Windows drive path to its WSL mount form:
/// `C:\foo\bar` → `/mnt/c/foo/bar` (for the default mount point).
pub fn windows_to_wsl_mount(path: &str, mount: &str) -> Result<String, ValidationError> {
    let normalized = normalize_windows(path)?;
    let drive = normalized.as_bytes()[0].to_ascii_lowercase() as char;
    let mount = mount_prefix(mount);

    let rest = normalized[2..].trim_matches('\\').replace('\\', "/");
    if rest.is_empty() {
        Ok(format!("{mount}{drive}"))
    } else {
        Ok(format!("{mount}{drive}/{rest}"))
    }
}

/// Convert a WSL mount path back to its Windows drive form:
/// `/mnt/c/foo/bar` → `C:\foo\bar`. Returns `None` when the path does not
/// lie under the mount point.
pub fn wsl_mount_to_windows(path: &str, mount: &str) -> Option<String> {
    let normalized = normalize_posix(path).ok()?;
    let mount = mount_prefix(mount);

    let rest = normalized.strip_prefix(&mount)?;
    let mut parts = rest.splitn(2, '/');
    let drive = parts.next()?;
    if drive.len() != 1 || !drive.as_bytes()[0].is_ascii_alphabetic() {
        return None;
    }
    let drive = drive.as_bytes()[0].to_ascii_uppercase() as char;

    match parts.next() {
        None | Some("") => Some(format!("{drive}:\\")),
        Some(tail) => Some(format!("{drive}:\\{}", tail.replace('/', "\\"))),
    }
}

/// Convert the Git Bash drive spelling to Windows form: `/c/foo` → `C:\foo`.
/// Returns `None` when the path is not in the `/x/...` shape.
pub fn gitbash_to_windows(path: &str) -> Option<String> {
    if !is_gitbash_drive_path(path) {
        return None;
    }
    let drive = path.as_bytes()[1].to_ascii_uppercase() as char;
    let rest = path[2..].trim_start_matches('/');
    let candidate = if rest.is_empty() {
        format!("{drive}:\\")
    } else {
        format!("{drive}:\\{}", rest.replace('/', "\\"))
    };
    normalize_windows(&candidate).ok()
}

/// Convert a normalized Windows drive path to the Git Bash spelling:
/// `C:\foo\bar` → `/c/foo/bar`.
pub fn windows_to_gitbash(path: &str) -> Result<String, ValidationError> {
    let normalized = normalize_windows(path)?;
    let drive = normalized.as_bytes()[0].to_ascii_lowercase() as char;
    let rest = normalized[2..].trim_matches('\\').replace('\\', "/");
    if rest.is_empty() {
        Ok(format!("/{drive}"))
    } else {
        Ok(format!("/{drive}/{rest}"))
    }
}

/// Normalize a path into the canonical form for the given shell kind.
///
/// - Windows shells: Windows drive form, rejected otherwise.
/// - WSL-like shells (`bash`, `wsl`): POSIX form; Windows drive inputs are
///   translated through the shell's mount point.
/// - Git Bash: drive-like inputs (either spelling) canonicalize to the
///   Windows form (that is what spawn needs), while genuine POSIX paths
///   (e.g. `/tmp`) stay POSIX.
pub fn normalize_for_shell(
    path: &str,
    kind: ShellKind,
    wsl_mount: &str,
) -> Result<String, ValidationError> {
    match kind.path_format() {
        PathFormat::Windows => normalize_windows(path),
        PathFormat::Posix => {
            if is_windows_drive_path(path) {
                windows_to_wsl_mount(path, wsl_mount)
            } else {
                normalize_posix(path)
            }
        }
        PathFormat::Mixed => {
            if is_windows_drive_path(path) {
                normalize_windows(path)
            } else if let Some(windows) = gitbash_to_windows(path) {
                Ok(windows)
            } else {
                normalize_posix(path)
            }
        }
    }
}

/// Compare two already-normalized paths, optionally folding ASCII case.
pub fn paths_equal(a: &str, b: &str, fold_case: bool) -> bool {
    comparable(a, fold_case) == comparable(b, fold_case)
}

/// Whether `dir` equals `base` or lies below it. Both inputs must already be
/// normalized (same family, no trailing separators except roots).
pub fn is_within(dir: &str, base: &str, fold_case: bool) -> bool {
    let dir = comparable(dir, fold_case);
    let base = comparable(base, fold_case);
    if dir == base {
        return true;
    }
    let prefix = if base.ends_with('/') {
        base
    } else {
        format!("{base}/")
    };
    dir.starts_with(&prefix)
}

/// Separator-unified (and optionally case-folded) spelling used for
/// comparisons only, never handed to a shell.
fn comparable(path: &str, fold_case: bool) -> String {
    let unified = path.replace('\\', "/");
    if fold_case {
        unified.to_ascii_lowercase()
    } else {
        unified
    }
}

/// Mount point with exactly one leading and one trailing slash.
fn mount_prefix(mount: &str) -> String {
    let trimmed = mount.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
