// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Bounded-timeout script execution for schedule firing (§4.7 point 5).

use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of running a schedule's script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Non-empty stdout: becomes the fired message text.
    Message(String),
    /// Empty/whitespace-only output: no message is fired.
    NoOp,
    /// The script exited non-zero, or timed out.
    Error(String),
}

/// Run `script` via `bash -c` in `cwd`, bounded by `timeout_duration`
/// (§4.7: "bounded timeout... script errors produce a `[script error] ...`
/// message"). On timeout the child's process group is killed by the
/// caller via `process::kill_process_group` since this function only owns
/// the tokio `Child`, not the supervised process-group contract. `run_as`,
/// when set, runs the script under that OS user (§4.7 point 5: "The script
/// process runs under the mind's user when isolation is enabled").
pub async fn run_script(script: &str, cwd: &Path, timeout_duration: Duration, run_as: Option<&str>) -> ScriptOutcome {
    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(script).current_dir(cwd);
    #[cfg(unix)]
    {
        cmd.process_group(0);
        if let Some(username) = run_as {
            match crate::process::resolve_user(username) {
                Ok((uid, gid)) => {
                    cmd.uid(uid).gid(gid);
                }
                Err(e) => return ScriptOutcome::Error(format!("[script error] {e}")),
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = run_as;
    }

    let spawn_result = cmd.output();
    match timeout(timeout_duration, spawn_result).await {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout.trim().is_empty() {
                ScriptOutcome::NoOp
            } else {
                ScriptOutcome::Message(stdout.trim().to_string())
            }
        }
        Ok(Ok(output)) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            ScriptOutcome::Error(format!("[script error] {}", stderr.trim()))
        }
        Ok(Err(e)) => ScriptOutcome::Error(format!("[script error] {e}")),
        Err(_) => ScriptOutcome::Error(format!("[script error] timed out after {timeout_duration:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_output_is_a_no_op() {
        let outcome = run_script("true", Path::new("/tmp"), Duration::from_secs(5), None).await;
        assert_eq!(outcome, ScriptOutcome::NoOp);
    }

    #[tokio::test]
    async fn nonempty_stdout_becomes_message() {
        let outcome = run_script("echo hello", Path::new("/tmp"), Duration::from_secs(5), None).await;
        assert_eq!(outcome, ScriptOutcome::Message("hello".to_string()));
    }

    #[tokio::test]
    async fn nonzero_exit_is_script_error() {
        let outcome = run_script("echo oops >&2; exit 1", Path::new("/tmp"), Duration::from_secs(5), None).await;
        assert!(matches!(outcome, ScriptOutcome::Error(msg) if msg.contains("oops")));
    }

    #[tokio::test]
    async fn timeout_is_reported_as_script_error() {
        let outcome = run_script("sleep 5", Path::new("/tmp"), Duration::from_millis(50), None).await;
        assert!(matches!(outcome, ScriptOutcome::Error(_)));
    }
}
