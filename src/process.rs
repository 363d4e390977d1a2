use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{AppError, Result};

/// One external command: program plus arguments.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// A POSIX shell script with positional arguments ($1, $2, ...).
    pub fn shell(script: &str, args: &[&str]) -> Self {
        let mut all = vec!["-c".to_string(), script.to_string(), "sh".to_string()];
        all.extend(args.iter().map(|a| a.to_string()));
        Self {
            program: "sh".to_string(),
            args: all,
        }
    }
}

/// What came back from one invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// `None` when the process was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run one external command to completion or until `timeout` elapses.
///
/// A non-zero exit is not an error here; the exit code and stderr are
/// returned for the caller to interpret. The only failure surfaced as
/// `AppError::Spawn` is an inability to start the process at all.
///
/// On timeout the child's whole process group is killed, so nothing
/// leaks past this call even when the command spawned children of its
/// own.
pub async fn invoke(spec: &CommandSpec, timeout: Duration) -> Result<ProcessOutcome> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so a timeout can take down the whole tree, not
    // just the direct child.
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd
        .spawn()
        .map_err(|e| AppError::Spawn(format!("{}: {e}", spec.program)))?;

    #[cfg(unix)]
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output = output.map_err(|e| AppError::Spawn(format!("{}: {e}", spec.program)))?;
            Ok(ProcessOutcome {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            })
        }
        Err(_) => {
            // `kill_on_drop` only reaches the direct child; a hung git
            // under the sh wrapper needs the group kill.
            #[cfg(unix)]
            if let Some(pid) = pid {
                unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
            }
            Ok(ProcessOutcome {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_captures_stdout() {
        let spec = CommandSpec::shell("printf 'hello'", &[]);
        let outcome = invoke(&spec, Duration::from_secs(5)).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout, "hello");
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let spec = CommandSpec::shell("echo oops >&2; exit 3", &[]);
        let outcome = invoke(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.stderr.contains("oops"));
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_positional_args_reach_the_script() {
        let spec = CommandSpec::shell("printf '%s-%s' \"$1\" \"$2\"", &["a", "b"]);
        let outcome = invoke(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome.stdout, "a-b");
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let spec = CommandSpec::shell("sleep 30", &[]);
        let started = std::time::Instant::now();
        let outcome = invoke(&spec, Duration::from_millis(100)).await.unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.exit_code.is_none());
        // Must return at the deadline, not when sleep would have finished
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_whole_process_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("survivor");
        // The backgrounded subshell outlives the direct child unless the
        // group kill reaches it.
        let spec = CommandSpec::shell(
            "( sleep 1; touch \"$1\" ) & sleep 30",
            &[marker.to_str().unwrap()],
        );

        let outcome = invoke(&spec, Duration::from_millis(100)).await.unwrap();
        assert!(outcome.timed_out);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "grandchild outlived the timeout");
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_spawn_error() {
        let spec = CommandSpec::new("githerd-no-such-binary");
        let result = invoke(&spec, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(AppError::Spawn(_))));
    }
}
