// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Subprocess spawn, process-group kill, and orphan reclamation (§4.5,
//! §9 "Process-group semantics").
//!
//! Every supervised child (mind, connector, scheduled script) is detached
//! into its own process group on spawn so a kill can take the whole group
//! down, not just the directly-spawned pid — mirroring the coop adapter's
//! spawn-then-reap pattern, generalized with explicit process-group kills
//! since Volute owns process lifetimes directly rather than delegating to
//! a sidecar.

use crate::error::SpawnError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// A process spawned into its own group, with its pid retained for
/// later group kills.
#[derive(Debug)]
pub struct SpawnedProcess {
    pub pid: u32,
    child: Child,
}

impl SpawnedProcess {
    /// Detach a reaper task that waits on the child so it never becomes a
    /// zombie. Logs the exit status at `warn`, mirroring the coop
    /// adapter's reaper (exit is always newsworthy for a supervised
    /// mind/connector since it's never expected while `running=true`).
    pub fn spawn_reaper(self, label: String, on_exit: impl FnOnce(std::process::ExitStatus) + Send + 'static) {
        let mut child = self.child;
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    tracing::warn!(label = %label, status = %status, "supervised process exited");
                    on_exit(status);
                }
                Err(e) => {
                    tracing::error!(label = %label, error = %e, "failed to wait on supervised process");
                }
            }
        });
    }
}

/// Spawn `program` with `args`/`envs` in `cwd`, detached into a new
/// process group, and wait up to `ready_timeout` for `ready_needle` to
/// appear on stdout or stderr (§4.5 "Wait up to 30s for the substring
/// `listening on :<port>`"). `run_as`, when set, wraps the child under
/// that OS user's uid/gid (§4.5 "Under optional isolation... wrap the
/// command under that user's context").
pub async fn spawn_and_wait_ready(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    cwd: &Path,
    ready_needle: &str,
    ready_timeout: Duration,
    run_as: Option<&str>,
) -> Result<SpawnedProcess, SpawnError> {
    if !cwd.exists() {
        return Err(SpawnError::MissingDir(cwd.to_path_buf()));
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Environment-sanitizing: the child gets only what the spawn protocol
    // exports, not the daemon's own environment (§4.5).
    cmd.env_clear();
    #[cfg(windows)]
    {
        if let Ok(system_root) = std::env::var("SystemRoot") {
            cmd.env("SystemRoot", system_root);
        }
    }
    for (k, v) in envs {
        cmd.env(k, v);
    }
    #[cfg(unix)]
    {
        cmd.process_group(0);
        if let Some(username) = run_as {
            let (uid, gid) = resolve_user(username)?;
            cmd.uid(uid).gid(gid);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = run_as;
    }

    let mut child = cmd.spawn().map_err(SpawnError::Spawn)?;
    let pid = child.id().unwrap_or(0);

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(SpawnError::Spawn(std::io::Error::other("child missing piped stdio")));
    };

    let wait_for_needle = async move {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                line = stdout_lines.next_line() => {
                    match line {
                        Ok(Some(l)) if l.contains(ready_needle) => return Ok(()),
                        Ok(Some(_)) => continue,
                        _ => return Err(()),
                    }
                }
                line = stderr_lines.next_line() => {
                    match line {
                        Ok(Some(l)) if l.contains(ready_needle) => return Ok(()),
                        Ok(Some(_)) => continue,
                        _ => return Err(()),
                    }
                }
            }
        }
    };

    match timeout(ready_timeout, wait_for_needle).await {
        Ok(Ok(())) => Ok(SpawnedProcess { pid, child }),
        Ok(Err(())) => {
            let status = child.wait().await.ok();
            let _ = kill_process_group(pid, Duration::from_millis(0)).await;
            match status {
                Some(status) => Err(SpawnError::ExitedBeforeReady(status)),
                None => Err(SpawnError::ReadinessTimeout(ready_timeout)),
            }
        }
        Err(_) => {
            let _ = kill_process_group(pid, Duration::from_millis(0)).await;
            let _ = child.kill().await;
            Err(SpawnError::ReadinessTimeout(ready_timeout))
        }
    }
}

/// Resolve an OS username to its `(uid, gid)`, for wrapping a spawned
/// child under that user's context (§4.5).
#[cfg(unix)]
pub(crate) fn resolve_user(username: &str) -> Result<(u32, u32), std::io::Error> {
    use nix::unistd::User;
    let user = User::from_name(username)
        .map_err(|e| std::io::Error::other(e.to_string()))?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("no such user: {username}")))?;
    Ok((user.uid.as_raw(), user.gid.as_raw()))
}

/// `chown` `path` to `username`'s uid/gid (§4.5 "Under optional isolation,
/// chown the state dir to the mind's dedicated OS user"). On non-Unix
/// targets this is a no-op (§9 documented degradation).
#[cfg(unix)]
pub fn chown_to_user(path: &Path, username: &str) -> std::io::Result<()> {
    use nix::unistd::{chown, Gid, Uid};
    let (uid, gid) = resolve_user(username)?;
    chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(|e| std::io::Error::other(e.to_string()))
}

#[cfg(not(unix))]
pub fn chown_to_user(_path: &Path, _username: &str) -> std::io::Result<()> {
    Ok(())
}

/// SIGTERM a process group, wait `grace`, then SIGKILL if it is still
/// alive (§4.5 stopMind, §5 "5s grace before SIGKILL"). On non-Unix this
/// degrades to a single-process kill (§9).
#[cfg(unix)]
pub async fn kill_process_group(pid: u32, grace: Duration) -> std::io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(-(pid as i32));
    let _ = kill(pgid, Signal::SIGTERM);
    if !grace.is_zero() {
        tokio::time::sleep(grace).await;
    }
    if process_alive(pid) {
        let _ = kill(pgid, Signal::SIGKILL);
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn kill_process_group(_pid: u32, _grace: Duration) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

/// Read a bare-pid file written by a previous daemon lifetime.
pub fn read_pid_file(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

pub fn write_pid_file(path: &Path, pid: u32) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, pid.to_string())
}

/// Check whether `pid`'s command line contains `expected_exe_substring`
/// (Linux: reads `/proc/<pid>/cmdline`). Used before killing a PID-file
/// process to avoid reaping an unrelated process that happens to have
/// reused the pid (§4.5 "confirm the process command-line includes the
/// expected server executable").
#[cfg(target_os = "linux")]
pub fn cmdline_contains(pid: u32, expected_exe_substring: &str) -> bool {
    let path = PathBuf::from(format!("/proc/{pid}/cmdline"));
    match std::fs::read(path) {
        Ok(bytes) => {
            let cmdline = String::from_utf8_lossy(&bytes).replace('\0', " ");
            cmdline.contains(expected_exe_substring)
        }
        Err(_) => false,
    }
}

#[cfg(not(target_os = "linux"))]
pub fn cmdline_contains(_pid: u32, _expected_exe_substring: &str) -> bool {
    // No /proc on non-Linux targets; orphan reclamation degrades to the
    // PID-file liveness check alone.
    true
}

/// Reclaim an orphaned process left by a prior daemon lifetime (§4.5
/// "Orphan reclamation on start"): if a PID file exists and the process is
/// alive and looks like the expected mind server, kill its process group
/// and wait `settle` before returning.
pub async fn reclaim_orphan(pid_file: &Path, expected_exe_substring: &str, settle: Duration) -> bool {
    let Some(pid) = read_pid_file(pid_file) else { return false };
    if !process_alive(pid) {
        return false;
    }
    if !cmdline_contains(pid, expected_exe_substring) {
        return false;
    }
    let _ = kill_process_group(pid, Duration::ZERO).await;
    tokio::time::sleep(settle).await;
    true
}

/// List PIDs owning `port` on Linux by scanning `/proc/net/tcp` for the
/// listening socket inode, then `/proc/*/fd/*` for matching socket
/// inodes. Used when a health endpoint still responds after the PID-file
/// pass — the owning process was started outside the registry entirely
/// (§4.5 "If the reserved port's health endpoint still responds..."). On
/// non-Linux targets this returns an empty list and orphan reclamation
/// relies solely on the PID-file pass (documented degradation, §9).
#[cfg(target_os = "linux")]
pub fn find_port_owners(port: u16) -> Vec<u32> {
    let Ok(tcp) = std::fs::read_to_string("/proc/net/tcp") else { return Vec::new() };
    let target_hex = format!("{port:04X}");
    let inodes: Vec<String> = tcp
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            let local = cols.first()?;
            let (_, port_hex) = local.split_once(':')?;
            if port_hex.eq_ignore_ascii_case(&target_hex) {
                cols.get(9).map(|s| s.to_string())
            } else {
                None
            }
        })
        .collect();
    if inodes.is_empty() {
        return Vec::new();
    }

    let mut owners = Vec::new();
    let Ok(proc_dir) = std::fs::read_dir("/proc") else { return owners };
    for entry in proc_dir.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<u32>() else { continue };
        let fd_dir = entry.path().join("fd");
        let Ok(fds) = std::fs::read_dir(&fd_dir) else { continue };
        for fd in fds.flatten() {
            if let Ok(link) = std::fs::read_link(fd.path()) {
                let link = link.to_string_lossy();
                if let Some(inode) = link.strip_prefix("socket:[").and_then(|s| s.strip_suffix(']')) {
                    if inodes.iter().any(|i| i == inode) {
                        owners.push(pid);
                    }
                }
            }
        }
    }
    owners
}

#[cfg(not(target_os = "linux"))]
pub fn find_port_owners(_port: u16) -> Vec<u32> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mind.pid");
        write_pid_file(&path, 4242).unwrap();
        assert_eq!(read_pid_file(&path), Some(4242));
    }

    #[test]
    fn missing_pid_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_pid_file(&dir.path().join("missing.pid")), None);
    }

    #[tokio::test]
    async fn spawn_missing_cwd_errors() {
        let err = spawn_and_wait_ready(
            "true",
            &[],
            &[],
            Path::new("/nonexistent/path/for/volute/tests"),
            "ready",
            Duration::from_millis(100),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SpawnError::MissingDir(_)));
    }
}
