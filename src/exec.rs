//! Command execution: spawn the shell child, enforce the timeout, capture
//! output, and store the log entry.
//!
//! Children get their own process group on Unix so a timeout can terminate
//! the whole tree (SIGTERM, a short grace, then SIGKILL); on Windows the
//! process handle is terminated directly. Output pipes are drained on
//! dedicated reader threads while the executor waits, so a chatty child can
//! never deadlock against a full pipe.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use wait_timeout::ChildExt;

use crate::config::ResolvedShellConfig;
use crate::error::{ExecError, ValidationError};
use crate::logs::{LogStore, StoreRequest};
use crate::truncate::{self, Truncation};
use crate::validate;

/// How long a terminated child gets to exit before the hard kill.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// One `execute_command` call.
#[derive(Debug)]
pub struct ExecRequest<'a> {
    pub shell_name: &'a str,
    pub command: &'a str,
    pub working_dir: Option<&'a str>,
    /// Raw per-call timeout; validated here so fractional or out-of-range
    /// values get their dedicated error codes.
    pub timeout_secs: Option<f64>,
    /// Per-call inline line cap, already schema-checked by the dispatcher.
    pub max_output_lines: Option<usize>,
}

/// The result of a completed (or timed-out) execution.
#[derive(Debug)]
pub struct ExecOutcome {
    /// Truncated or full output, with a timeout banner when applicable.
    pub text: String,
    pub exit_code: Option<i32>,
    pub execution_id: String,
    pub total_lines: usize,
    pub returned_lines: usize,
    pub was_truncated: bool,
    pub timed_out: bool,
    pub working_directory: String,
    pub shell_name: String,
}

impl ExecOutcome {
    /// A nonzero exit or a timeout is a command-level failure, not a
    /// transport error.
    pub fn is_error(&self) -> bool {
        self.timed_out || self.exit_code != Some(0)
    }
}

/// Why an execution never produced an outcome.
#[derive(Debug)]
pub enum ExecRejection {
    Validation(ValidationError),
    Spawn(ExecError),
}

impl ExecRejection {
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            ExecRejection::Validation(e) => e.to_value(),
            ExecRejection::Spawn(e) => e.to_value(),
        }
    }
}

impl From<ValidationError> for ExecRejection {
    fn from(e: ValidationError) -> Self {
        ExecRejection::Validation(e)
    }
}

impl From<ExecError> for ExecRejection {
    fn from(e: ExecError) -> Self {
        ExecRejection::Spawn(e)
    }
}

/// Validate and run one command to completion or timeout.
///
/// This is the only place in the crate that spawns child processes.
pub fn execute(
    shells: &IndexMap<String, ResolvedShellConfig>,
    current_dir: &Mutex<Option<String>>,
    logs: &LogStore,
    req: ExecRequest<'_>,
) -> Result<ExecOutcome, ExecRejection> {
    let cfg = shells
        .get(req.shell_name)
        .ok_or_else(|| ValidationError::ShellNotEnabled(req.shell_name.to_string()))?;

    let requested_dir = match req.working_dir {
        Some(dir) => dir.to_string(),
        None => current_dir
            .lock()
            .expect("current dir lock poisoned")
            .clone()
            .ok_or(ValidationError::NoCurrentDirectory)?,
    };

    validate::validate_command(req.command, cfg)?;
    // Normalization also converts the directory into the child's native
    // convention (POSIX via the WSL mount for wsl/bash, Windows for the rest)
    let working_directory = validate::validate_working_directory(&requested_dir, cfg)?;
    let timeout_secs = effective_timeout(req.timeout_secs, cfg)?;

    let mut command = Command::new(&cfg.executable.command);
    command
        .args(&cfg.executable.args)
        .arg(req.command)
        .current_dir(&working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    log::debug!("$ {} [{}]", req.command, req.shell_name);
    let start = Instant::now();
    let mut child = command.spawn().map_err(|e| ExecError::SpawnFailed {
        shell: req.shell_name.to_string(),
        source: e,
    })?;

    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let (status, timed_out) = match child
        .wait_timeout(Duration::from_secs(timeout_secs))
        .map_err(|e| ExecError::SpawnFailed {
            shell: req.shell_name.to_string(),
            source: e,
        })? {
        Some(status) => (Some(status), false),
        None => {
            terminate(&mut child);
            (child.wait().ok(), true)
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    let exit_code = status.and_then(|s| s.code());
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    log::debug!(
        "[broker-trace] shell={} cmd_len={} dur={:.1}ms exit={:?} timeout={}",
        req.shell_name,
        req.command.len(),
        duration_ms,
        exit_code,
        timed_out,
    );

    let mut combined = stdout.clone();
    if !stderr.is_empty() {
        combined.push('\n');
        combined.push_str(&stderr);
    }

    let inline_max = if logs.config().enable_truncation {
        Some(req.max_output_lines.unwrap_or(logs.config().max_output_lines))
    } else {
        None
    };
    let execution_id = logs.store(StoreRequest {
        shell_name: req.shell_name,
        command: req.command,
        working_directory: &working_directory,
        exit_code,
        stdout: &stdout,
        stderr: &stderr,
        inline_max_lines: inline_max,
    });

    let Truncation {
        text,
        was_truncated,
        total_lines,
        returned_lines,
    } = match inline_max {
        Some(max) => truncate::truncate_lines(&combined, max, &execution_id),
        None => Truncation {
            total_lines: truncate::count_lines(&combined),
            returned_lines: truncate::count_lines(&combined),
            text: combined.clone(),
            was_truncated: false,
        },
    };

    let text = if timed_out {
        let banner = format!("Command timed out after {timeout_secs}s");
        if text.is_empty() {
            banner
        } else {
            format!("{banner}\n{text}")
        }
    } else {
        text
    };

    Ok(ExecOutcome {
        text,
        exit_code,
        execution_id,
        total_lines,
        returned_lines,
        was_truncated,
        timed_out,
        working_directory,
        shell_name: req.shell_name.to_string(),
    })
}

/// Per-call timeout override, validated against [1, 3600] and integrality.
fn effective_timeout(
    raw: Option<f64>,
    cfg: &ResolvedShellConfig,
) -> Result<u64, ValidationError> {
    let Some(t) = raw else {
        return Ok(cfg.security.command_timeout_secs);
    };
    if t.fract() != 0.0 || !t.is_finite() {
        return Err(ValidationError::TimeoutNotInteger);
    }
    if t < 1.0 {
        return Err(ValidationError::TimeoutTooSmall(t.max(0.0) as u64));
    }
    if t > 3600.0 {
        return Err(ValidationError::TimeoutTooLarge(t as u64));
    }
    Ok(t as u64)
}

/// Drain a child pipe to a string on a background thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Terminate the child's whole process group: SIGTERM, a short grace, then
/// SIGKILL. Windows has no group signal here, so the process handle is
/// terminated directly.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // process_group(0) at spawn made the child its own group leader
        let group = Pid::from_raw(child.id() as i32);
        let _ = killpg(group, Signal::SIGTERM);
        match child.wait_timeout(KILL_GRACE) {
            Ok(Some(_)) => {}
            _ => {
                let _ = killpg(group, Signal::SIGKILL);
            }
        }
    }
    #[cfg(windows)]
    {
        let _ = child.kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{
        Executable, LoggingConfig, Restrictions, SecuritySettings, WslConfig,
    };
    use crate::shell::ShellKind;
    use std::sync::Arc;

    fn bash_shells(allowed: &[&str]) -> IndexMap<String, ResolvedShellConfig> {
        let mut shells = IndexMap::new();
        shells.insert(
            "bash".to_string(),
            ResolvedShellConfig {
                kind: ShellKind::Bash,
                name: "bash".to_string(),
                enabled: true,
                executable: Executable {
                    command: "/bin/bash".to_string(),
                    args: vec!["-c".to_string()],
                },
                security: SecuritySettings {
                    max_command_length: 2000,
                    command_timeout_secs: 10,
                    enable_injection_protection: false,
                    restrict_working_directory: !allowed.is_empty(),
                },
                restrictions: Restrictions {
                    blocked_commands: vec!["rm".to_string()],
                    blocked_arguments: vec![],
                    blocked_operators: vec![],
                },
                allowed_paths: allowed.iter().map(|s| s.to_string()).collect(),
                effective_allowed_paths: allowed.iter().map(|s| s.to_string()).collect(),
                wsl: WslConfig {
                    mount_point: "/mnt/".to_string(),
                    inherit_global_paths: false,
                },
            },
        );
        shells
    }

    fn run(
        shells: &IndexMap<String, ResolvedShellConfig>,
        logs: &LogStore,
        command: &str,
        working_dir: Option<&str>,
        timeout: Option<f64>,
    ) -> Result<ExecOutcome, ExecRejection> {
        execute(
            shells,
            &Mutex::new(Some("/tmp".to_string())),
            logs,
            ExecRequest {
                shell_name: "bash",
                command,
                working_dir,
                timeout_secs: timeout,
                max_output_lines: None,
            },
        )
    }

    fn logs() -> Arc<LogStore> {
        Arc::new(LogStore::new(LoggingConfig::default(), None))
    }

    #[test]
    fn echo_round_trip() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let outcome = run(&shells, &logs, "echo hello", None, None).unwrap();
        assert_eq!(outcome.text, "hello\n");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.is_error());
        assert!(!outcome.was_truncated);
        // The stored entry carries the same output
        let entry = logs.get(&outcome.execution_id).unwrap();
        assert_eq!(entry.combined_output, "hello\n");
        assert_eq!(entry.exit_code, Some(0));
    }

    #[test]
    fn nonzero_exit_sets_the_error_flag_but_returns_output() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let outcome = run(&shells, &logs, "echo oops >&2; exit 3", None, None).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.is_error());
        assert!(outcome.text.contains("oops"));
    }

    #[test]
    fn stderr_follows_stdout_in_the_stored_entry() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let outcome = run(&shells, &logs, "echo out; echo err >&2", None, None).unwrap();
        let entry = logs.get(&outcome.execution_id).unwrap();
        assert_eq!(entry.combined_output, "out\n\nerr\n");
        assert_eq!(entry.stdout, "out\n");
        assert_eq!(entry.stderr, "err\n");
    }

    #[test]
    fn unknown_shell_is_rejected_without_spawning() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let err = execute(
            &shells,
            &Mutex::new(None),
            &logs,
            ExecRequest {
                shell_name: "zsh",
                command: "echo hi",
                working_dir: Some("/tmp"),
                timeout_secs: None,
                max_output_lines: None,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExecRejection::Validation(ValidationError::ShellNotEnabled(_))
        ));
        assert_eq!(logs.stats().count, 0);
    }

    #[test]
    fn blocked_command_is_rejected_without_spawning() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let err = run(&shells, &logs, "rm -rf /tmp/x", None, None).unwrap_err();
        assert!(matches!(
            err,
            ExecRejection::Validation(ValidationError::BlockedCommand { .. })
        ));
        assert_eq!(logs.stats().count, 0);
    }

    #[test]
    fn missing_working_directory_everywhere_is_an_error() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let err = execute(
            &shells,
            &Mutex::new(None),
            &logs,
            ExecRequest {
                shell_name: "bash",
                command: "pwd",
                working_dir: None,
                timeout_secs: None,
                max_output_lines: None,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ExecRejection::Validation(ValidationError::NoCurrentDirectory)
        ));
    }

    #[test]
    fn working_directory_restriction_applies() {
        let shells = bash_shells(&["/tmp"]);
        let logs = logs();
        let err = run(&shells, &logs, "pwd", Some("/etc"), None).unwrap_err();
        assert!(matches!(
            err,
            ExecRejection::Validation(ValidationError::WorkingDirectoryNotAllowed { .. })
        ));

        let outcome = run(&shells, &logs, "pwd", Some("/tmp"), None).unwrap();
        // /tmp may resolve through a symlink (e.g. /private/tmp)
        assert!(outcome.text.trim_end().ends_with("tmp"));
        assert_eq!(outcome.working_directory, "/tmp");
    }

    #[test]
    fn per_call_timeout_bounds() {
        let shells = bash_shells(&[]);
        let logs = logs();
        for (raw, expected_not_integer, too_small, too_large) in [
            (0.5, true, false, false),
            (0.0, false, true, false),
            (4000.0, false, false, true),
        ] {
            let err = run(&shells, &logs, "echo hi", None, Some(raw)).unwrap_err();
            let ExecRejection::Validation(v) = err else {
                panic!("expected validation rejection");
            };
            assert_eq!(matches!(v, ValidationError::TimeoutNotInteger), expected_not_integer);
            assert_eq!(matches!(v, ValidationError::TimeoutTooSmall(_)), too_small);
            assert_eq!(matches!(v, ValidationError::TimeoutTooLarge(_)), too_large);
        }
    }

    #[test]
    fn timeout_kills_the_child_within_the_grace_window() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let start = Instant::now();
        let outcome = run(&shells, &logs, "echo started; sleep 30", None, Some(1.0)).unwrap();
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "timeout must not wait for the sleep"
        );
        assert!(outcome.timed_out);
        assert!(outcome.is_error());
        assert!(outcome.text.starts_with("Command timed out after 1s"));
        // Partial output is delivered and stored
        assert!(outcome.text.contains("started"));
        let entry = logs.get(&outcome.execution_id).unwrap();
        assert!(entry.combined_output.contains("started"));
    }

    #[test]
    fn long_output_is_tail_truncated_with_banner() {
        let shells = bash_shells(&[]);
        let logs = logs();
        let outcome = execute(
            &shells,
            &Mutex::new(Some("/tmp".to_string())),
            &logs,
            ExecRequest {
                shell_name: "bash",
                command: "for i in $(seq 1 10); do echo line$i; done",
                working_dir: None,
                timeout_secs: None,
                max_output_lines: Some(3),
            },
        )
        .unwrap();
        assert!(outcome.was_truncated);
        assert_eq!(outcome.returned_lines, 3);
        assert!(outcome.text.starts_with("[Output truncated: showing last 3 of"));
        assert!(outcome.text.contains(&format!(
            "cli://logs/commands/{}",
            outcome.execution_id
        )));
        assert!(outcome.text.ends_with("line9\nline10\n"));
        // Full output is retrievable from the store
        let entry = logs.get(&outcome.execution_id).unwrap();
        assert!(entry.combined_output.contains("line1\n"));
        assert_eq!(entry.total_lines, 10);
    }

    #[test]
    fn spawn_failure_is_reported() {
        let mut shells = bash_shells(&[]);
        shells.get_mut("bash").unwrap().executable.command =
            "/nonexistent/shell-binary".to_string();
        let logs = logs();
        let err = run(&shells, &logs, "echo hi", None, None).unwrap_err();
        assert!(matches!(err, ExecRejection::Spawn(ExecError::SpawnFailed { .. })));
    }
}
