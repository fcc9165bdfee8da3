//! Shell-aware command and working-directory validation.
//!
//! Everything here is pure: no side effects, no filesystem access, no
//! retries. Tokenization and operator scanning follow the conventions of the
//! shell that will run the command: Windows shells split on whitespace with
//! `"..."` quoting and caret escapes, Unix shells add `'...'` quoting and
//! backslash escapes. A backtick is an ordinary character to a Windows shell
//! and a substitution operator to a Unix one.

use crate::config::ResolvedShellConfig;
use crate::error::ValidationError;
use crate::path;
use crate::shell::ShellKind;

/// Validate a command string against the shell's policy.
///
/// Checks, in order: length, injection operators (when protection is on),
/// then per chain segment the blocked-command and blocked-argument lists.
pub fn validate_command(command: &str, cfg: &ResolvedShellConfig) -> Result<(), ValidationError> {
    let kind = cfg.kind;

    if command.len() > cfg.security.max_command_length {
        return Err(ValidationError::CommandTooLong {
            len: command.len(),
            max: cfg.security.max_command_length,
        });
    }

    if cfg.security.enable_injection_protection
        && let Some(operator) =
            find_blocked_operator(command, kind, &cfg.restrictions.blocked_operators)
    {
        return Err(ValidationError::BlockedOperator { operator });
    }

    // Each segment of a `;`/`&&`/`||`/`|` chain is checked independently.
    // With injection protection on, chaining operators in the deny list have
    // already been rejected above; with it off, chains are accepted but every
    // segment still faces the deny lists.
    for segment in split_chain(command, kind) {
        let tokens = tokenize(&segment, kind);
        let Some(first) = tokens.first() else {
            continue;
        };

        let name = command_name(first, kind);
        for entry in &cfg.restrictions.blocked_commands {
            if command_entry_matches(entry, first, &name, kind) {
                return Err(ValidationError::BlockedCommand { name });
            }
        }

        for token in &tokens[1..] {
            let candidate = flag_key(token);
            for entry in &cfg.restrictions.blocked_arguments {
                let hit = if kind.is_windows_shell() {
                    entry.eq_ignore_ascii_case(candidate)
                } else {
                    entry == candidate
                };
                if hit {
                    return Err(ValidationError::BlockedArgument {
                        argument: candidate.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Validate a working directory and return it normalized into the shell's
/// native convention.
pub fn validate_working_directory(
    dir: &str,
    cfg: &ResolvedShellConfig,
) -> Result<String, ValidationError> {
    let normalized = path::normalize_for_shell(dir, cfg.kind, &cfg.wsl.mount_point)?;
    if !cfg.security.restrict_working_directory {
        return Ok(normalized);
    }
    if allowed_set_contains(&normalized, cfg) {
        Ok(normalized)
    } else {
        Err(ValidationError::WorkingDirectoryNotAllowed {
            dir: normalized,
            allowed: cfg.effective_allowed_paths.clone(),
        })
    }
}

/// Pure predicate form of [`validate_working_directory`], used by the
/// `validate_directories` tool and the config resolver.
pub fn is_path_allowed(dir: &str, cfg: &ResolvedShellConfig) -> bool {
    if !cfg.security.restrict_working_directory {
        return true;
    }
    match path::normalize_for_shell(dir, cfg.kind, &cfg.wsl.mount_point) {
        Ok(normalized) => allowed_set_contains(&normalized, cfg),
        Err(_) => false,
    }
}

fn allowed_set_contains(normalized_dir: &str, cfg: &ResolvedShellConfig) -> bool {
    let fold = cfg.kind.folds_path_case();
    cfg.effective_allowed_paths
        .iter()
        .any(|entry| path::is_within(normalized_dir, entry, fold))
}

/// Split into whitespace-separated tokens honoring the shell's quoting and
/// escaping rules. Quotes are stripped; escaped characters are kept literal.
fn tokenize(input: &str, kind: ShellKind) -> Vec<String> {
    let windows = kind.is_windows_shell();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_double = false;
    let mut in_single = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' if !windows && !in_single => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '^' if windows && !in_double => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '"' if !in_single => in_double = !in_double,
            '\'' if !windows && !in_double => in_single = !in_single,
            c if c.is_whitespace() && !in_double && !in_single => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// First blocked operator appearing outside quotes and escapes, longest
/// candidates first so `&&` is reported rather than `&` when both are listed.
fn find_blocked_operator(
    command: &str,
    kind: ShellKind,
    operators: &[String],
) -> Option<String> {
    let windows = kind.is_windows_shell();
    let mut candidates: Vec<&String> = operators
        .iter()
        // A backtick is literal text to a Windows shell
        .filter(|op| !(windows && op.as_str() == "`"))
        .collect();
    candidates.sort_by_key(|op| std::cmp::Reverse(op.len()));
    if candidates.is_empty() {
        return None;
    }

    let mut in_double = false;
    let mut in_single = false;
    let mut escaped = false;
    for (i, c) in command.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !windows && !in_single => {
                escaped = true;
                continue;
            }
            '^' if windows && !in_double => {
                escaped = true;
                continue;
            }
            '"' if !in_single => {
                in_double = !in_double;
                continue;
            }
            '\'' if !windows && !in_double => {
                in_single = !in_single;
                continue;
            }
            _ => {}
        }
        if in_double || in_single {
            continue;
        }
        for op in &candidates {
            if command[i..].starts_with(op.as_str()) {
                return Some((*op).clone());
            }
        }
    }
    None
}

/// Split a command into its chain segments at unquoted `;`, `&&`, `||`, `|`.
fn split_chain(command: &str, kind: ShellKind) -> Vec<String> {
    let windows = kind.is_windows_shell();
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_double = false;
    let mut in_single = false;
    let mut chars = command.chars().peekable();

    let flush = |current: &mut String, segments: &mut Vec<String>| {
        let segment = current.trim().to_string();
        if !segment.is_empty() {
            segments.push(segment);
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '\\' if !windows && !in_single => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            '^' if windows && !in_double => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
                continue;
            }
            '\'' if !windows && !in_double => {
                in_single = !in_single;
                current.push(c);
                continue;
            }
            _ => {}
        }

        if !in_double && !in_single {
            match c {
                ';' => {
                    flush(&mut current, &mut segments);
                    continue;
                }
                '&' if chars.peek() == Some(&'&') => {
                    chars.next();
                    flush(&mut current, &mut segments);
                    continue;
                }
                '|' => {
                    if chars.peek() == Some(&'|') {
                        chars.next();
                    }
                    flush(&mut current, &mut segments);
                    continue;
                }
                _ => {}
            }
        }
        current.push(c);
    }
    flush(&mut current, &mut segments);
    segments
}

/// The name used for deny-list matching: basename of the token, lowercased
/// with any `.exe`/`.bat`/`.cmd` suffix stripped on Windows shells, case and
/// extension preserved on Unix shells.
fn command_name(token: &str, kind: ShellKind) -> String {
    let base = token
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(token);
    if kind.is_windows_shell() {
        let lower = base.to_ascii_lowercase();
        for suffix in [".exe", ".bat", ".cmd"] {
            if let Some(stripped) = lower.strip_suffix(suffix) {
                return stripped.to_string();
            }
        }
        lower
    } else {
        base.to_string()
    }
}

/// A deny-list entry matches when its normalized name equals the token's
/// normalized name, or when the entry equals the full original token (the
/// absolute-path case), case-folded on Windows shells.
fn command_entry_matches(
    entry: &str,
    original_token: &str,
    token_name: &str,
    kind: ShellKind,
) -> bool {
    if command_name(entry, kind) == token_name {
        return true;
    }
    if kind.is_windows_shell() {
        entry.eq_ignore_ascii_case(original_token)
    } else {
        entry == original_token
    }
}

/// For `--flag=value` tokens the deny-list candidate is the key before `=`.
fn flag_key(token: &str) -> &str {
    if token.starts_with("--")
        && let Some(eq) = token.find('=')
    {
        &token[..eq]
    } else {
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Executable, Restrictions, SecuritySettings, WslConfig};
    use rstest::rstest;

    fn test_cfg(kind: ShellKind) -> ResolvedShellConfig {
        let (command, args) = kind.default_executable();
        ResolvedShellConfig {
            kind,
            name: kind.to_string(),
            enabled: true,
            executable: Executable {
                command: command.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
            },
            security: SecuritySettings {
                max_command_length: 2000,
                command_timeout_secs: 30,
                enable_injection_protection: true,
                restrict_working_directory: true,
            },
            restrictions: Restrictions {
                blocked_commands: vec!["rm".into(), "format".into()],
                blocked_arguments: vec!["--exec".into(), "-e".into()],
                blocked_operators: vec!["&".into(), "|".into(), ";".into(), "`".into()],
            },
            allowed_paths: vec![],
            effective_allowed_paths: vec![],
            wsl: WslConfig {
                mount_point: "/mnt/".to_string(),
                inherit_global_paths: true,
            },
        }
    }

    fn bash_cfg() -> ResolvedShellConfig {
        let mut cfg = test_cfg(ShellKind::Bash);
        cfg.allowed_paths = vec!["/home/alice".into()];
        cfg.effective_allowed_paths = vec!["/home/alice".into()];
        cfg
    }

    // ---- tokenizer ----------------------------------------------------

    #[rstest]
    #[case("echo hello world", &["echo", "hello", "world"])]
    #[case(r#"echo "hello world""#, &["echo", "hello world"])]
    #[case(r#"echo 'single quoted'"#, &["echo", "single quoted"])]
    #[case(r"echo escaped\ space", &["echo", "escaped space"])]
    #[case(r#"grep -r "a b" ./src"#, &["grep", "-r", "a b", "./src"])]
    fn unix_tokenizing(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(tokenize(input, ShellKind::Bash), expected);
    }

    #[rstest]
    #[case(r#"echo "hello world""#, &["echo", "hello world"])]
    // Single quotes are ordinary characters to cmd
    #[case("echo 'a b'", &["echo", "'a", "b'"])]
    // Caret escapes the following character
    #[case("echo a^ b", &["echo", "a b"])]
    // Backslashes are path separators, not escapes
    #[case(r"dir C:\Users\alice", &["dir", r"C:\Users\alice"])]
    fn windows_tokenizing(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(tokenize(input, ShellKind::Cmd), expected);
    }

    // ---- operator scanning --------------------------------------------

    #[test]
    fn finds_unquoted_operators() {
        let ops: Vec<String> = ["&", "|", ";"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            find_blocked_operator("echo hi; ls", ShellKind::Bash, &ops),
            Some(";".to_string())
        );
        assert_eq!(find_blocked_operator("echo hi", ShellKind::Bash, &ops), None);
    }

    #[test]
    fn quoted_operators_are_literal() {
        let ops = vec!["|".to_string()];
        assert_eq!(
            find_blocked_operator(r#"echo "a|b""#, ShellKind::Bash, &ops),
            None
        );
        assert_eq!(
            find_blocked_operator("echo 'a|b'", ShellKind::Bash, &ops),
            None
        );
    }

    #[test]
    fn escaped_operators_are_literal() {
        let ops = vec![";".to_string()];
        assert_eq!(
            find_blocked_operator(r"echo a\; b", ShellKind::Bash, &ops),
            None
        );
        assert_eq!(
            find_blocked_operator("echo a^; b", ShellKind::Cmd, &ops),
            None
        );
        // An unescaped one still trips
        assert_eq!(
            find_blocked_operator("echo a; b", ShellKind::Cmd, &ops),
            Some(";".to_string())
        );
    }

    #[test]
    fn backtick_is_literal_on_windows_and_an_operator_on_unix() {
        let ops = vec!["`".to_string()];
        assert_eq!(
            find_blocked_operator("echo `whoami`", ShellKind::Powershell, &ops),
            None
        );
        assert_eq!(
            find_blocked_operator("echo `whoami`", ShellKind::Bash, &ops),
            Some("`".to_string())
        );
    }

    #[test]
    fn longest_operator_wins_the_report() {
        let ops: Vec<String> = ["&", "&&"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            find_blocked_operator("a && b", ShellKind::Bash, &ops),
            Some("&&".to_string())
        );
    }

    // ---- chain splitting ----------------------------------------------

    #[rstest]
    #[case("a; b && c || d | e", &["a", "b", "c", "d", "e"])]
    #[case("single", &["single"])]
    #[case("a;;b", &["a", "b"])]
    #[case(r#"echo "x; y"; ls"#, &["echo \"x; y\"", "ls"])]
    // A lone & is a background marker, not a chain separator
    #[case("sleep 5 & echo done", &["sleep 5 & echo done"])]
    fn chain_splitting(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(split_chain(input, ShellKind::Bash), expected);
    }

    // ---- command name normalization -----------------------------------

    #[rstest]
    #[case(r"C:\Windows\System32\RM.EXE", ShellKind::Cmd, "rm")]
    #[case("Format.cmd", ShellKind::Cmd, "format")]
    #[case("./rm", ShellKind::Bash, "rm")]
    #[case("/usr/bin/RM", ShellKind::Bash, "RM")]
    #[case("rm.exe", ShellKind::Bash, "rm.exe")]
    fn name_normalization(#[case] token: &str, #[case] kind: ShellKind, #[case] expected: &str) {
        assert_eq!(command_name(token, kind), expected);
    }

    // ---- validate_command ---------------------------------------------

    #[test]
    fn plain_command_passes() {
        assert!(validate_command("echo hello", &bash_cfg()).is_ok());
    }

    #[test]
    fn blocked_command_is_rejected_with_its_name() {
        let err = validate_command("rm -rf /tmp/x", &bash_cfg()).unwrap_err();
        match err {
            ValidationError::BlockedCommand { name } => assert_eq!(name, "rm"),
            other => panic!("expected BlockedCommand, got {other:?}"),
        }
    }

    #[test]
    fn blocked_command_matches_path_spellings() {
        let err = validate_command("./rm file", &bash_cfg()).unwrap_err();
        assert!(matches!(err, ValidationError::BlockedCommand { .. }));

        let mut cfg = test_cfg(ShellKind::Cmd);
        cfg.restrictions.blocked_commands = vec![r"C:\tools\danger.exe".into()];
        let err = validate_command(r"c:\TOOLS\DANGER.EXE /x", &cfg).unwrap_err();
        assert!(matches!(err, ValidationError::BlockedCommand { .. }));
    }

    #[test]
    fn command_too_long() {
        let mut cfg = bash_cfg();
        cfg.security.max_command_length = 10;
        let err = validate_command("echo aaaaaaaaaaaa", &cfg).unwrap_err();
        assert!(matches!(err, ValidationError::CommandTooLong { .. }));
    }

    #[test]
    fn injection_operator_is_rejected() {
        let err = validate_command("echo hi; rm -rf /", &bash_cfg()).unwrap_err();
        assert!(matches!(err, ValidationError::BlockedOperator { .. }));
    }

    #[test]
    fn blocked_argument_including_key_value_form() {
        let err = validate_command("ssh -e none host", &bash_cfg()).unwrap_err();
        assert!(matches!(err, ValidationError::BlockedArgument { .. }));

        let mut cfg = bash_cfg();
        cfg.restrictions.blocked_arguments = vec!["--exec".into()];
        let err = validate_command("tool --exec=/bin/sh", &cfg).unwrap_err();
        match err {
            ValidationError::BlockedArgument { argument } => assert_eq!(argument, "--exec"),
            other => panic!("expected BlockedArgument, got {other:?}"),
        }
    }

    #[test]
    fn chain_segments_each_face_the_deny_list_when_protection_is_off() {
        let mut cfg = bash_cfg();
        cfg.security.enable_injection_protection = false;
        cfg.restrictions.blocked_operators.clear();

        // The chain itself is accepted...
        assert!(validate_command("echo a && echo b", &cfg).is_ok());
        // ...but a blocked command in any segment still fails
        let err = validate_command("echo a && rm -rf /", &cfg).unwrap_err();
        assert!(matches!(err, ValidationError::BlockedCommand { .. }));
        let err = validate_command("cat f | rm", &cfg).unwrap_err();
        assert!(matches!(err, ValidationError::BlockedCommand { .. }));
    }

    #[test]
    fn deny_list_growth_never_unblocks() {
        let mut cfg = bash_cfg();
        cfg.security.enable_injection_protection = false;
        cfg.restrictions.blocked_operators.clear();
        let commands = ["echo hi", "ls -la", "rm -rf /", "format c:"];
        let before: Vec<bool> = commands
            .iter()
            .map(|c| validate_command(c, &cfg).is_ok())
            .collect();
        cfg.restrictions.blocked_commands.push("ls".into());
        for (i, command) in commands.iter().enumerate() {
            if !before[i] {
                assert!(validate_command(command, &cfg).is_err());
            }
        }
    }

    // ---- working directory --------------------------------------------

    #[test]
    fn working_dir_inside_allowed_path() {
        let cfg = bash_cfg();
        assert_eq!(
            validate_working_directory("/home/alice/project", &cfg).unwrap(),
            "/home/alice/project"
        );
        assert!(is_path_allowed("/home/alice", &cfg));
    }

    #[test]
    fn working_dir_outside_allowed_paths_reports_the_set() {
        let cfg = bash_cfg();
        let err = validate_working_directory("/etc", &cfg).unwrap_err();
        match err {
            ValidationError::WorkingDirectoryNotAllowed { dir, allowed } => {
                assert_eq!(dir, "/etc");
                assert_eq!(allowed, vec!["/home/alice".to_string()]);
            }
            other => panic!("expected WorkingDirectoryNotAllowed, got {other:?}"),
        }
    }

    #[test]
    fn dotdot_cannot_escape_an_allowed_root() {
        let cfg = bash_cfg();
        assert!(!is_path_allowed("/home/alice/../bob", &cfg));
        assert!(is_path_allowed("/home/alice/sub/..", &cfg));
    }

    #[test]
    fn unrestricted_shell_accepts_anything_parsable() {
        let mut cfg = bash_cfg();
        cfg.security.restrict_working_directory = false;
        assert!(is_path_allowed("/anywhere/at/all", &cfg));
        assert!(validate_working_directory("/etc", &cfg).is_ok());
    }

    #[test]
    fn allow_set_growth_never_rejects() {
        let mut cfg = bash_cfg();
        let dirs = ["/home/alice/x", "/srv/data", "/etc"];
        let before: Vec<bool> = dirs.iter().map(|d| is_path_allowed(d, &cfg)).collect();
        cfg.effective_allowed_paths.push("/srv/data".into());
        for (i, dir) in dirs.iter().enumerate() {
            if before[i] {
                assert!(is_path_allowed(dir, &cfg), "{dir} must stay allowed");
            }
        }
        assert!(is_path_allowed("/srv/data/sub", &cfg));
    }

    #[test]
    fn windows_shell_folds_case_for_working_dirs() {
        let mut cfg = test_cfg(ShellKind::Cmd);
        cfg.effective_allowed_paths = vec![r"C:\Users\alice".into()];
        assert!(is_path_allowed(r"c:\users\ALICE\repo", &cfg));
        assert!(!is_path_allowed(r"C:\Users\bob", &cfg));
    }

    #[test]
    fn gitbash_accepts_either_spelling() {
        let mut cfg = test_cfg(ShellKind::Gitbash);
        cfg.effective_allowed_paths = vec![r"C:\Users\alice".into()];
        assert!(is_path_allowed(r"C:\Users\alice\repo", &cfg));
        assert!(is_path_allowed("/c/Users/alice/repo", &cfg));
        assert!(!is_path_allowed("/d/other", &cfg));
    }

    #[test]
    fn wsl_working_dir_matches_inherited_converted_paths() {
        let mut cfg = test_cfg(ShellKind::Wsl);
        cfg.effective_allowed_paths = vec!["/home/alice".into(), "/mnt/c/Work".into()];
        assert!(is_path_allowed("/mnt/c/Work/proj", &cfg));
        // Windows-form input is translated through the mount point first
        assert!(is_path_allowed(r"C:\Work\proj", &cfg));
        assert!(!is_path_allowed(r"D:\Other", &cfg));
    }
}
