//! Child-process supervision (spec.md §4.4 "Isolation": each Listener runs
//! in an isolated process; the child's stderr is captured line-wise and
//! republished).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::LoggerConfig;

/// A running Listener child process plus the channel its stderr lines are
/// pumped into (spec.md §4.4 "captured line-wise via pipes"). `stderr_lines`
/// is an `Option` so the manager can `take()` it once, to hand off to its
/// own republishing task, without needing a separate handle type.
pub struct ChildHandle {
    pub child: Child,
    pub stderr_lines: Option<mpsc::Receiver<String>>,
    pub started_at: std::time::Instant,
}

/// Spawn `binary_path --config_file <tmpfile>` for one logger's active
/// `LoggerConfig`, writing the config to a temp file so the child doesn't
/// need any other IPC channel (spec.md §6 single-logger CLI
/// `--config_file`).
pub async fn spawn_listener(
    logger_name: &str,
    config: &LoggerConfig,
    binary_path: &std::path::Path,
) -> anyhow::Result<(ChildHandle, PathBuf)> {
    let mut path = std::env::temp_dir();
    path.push(format!("rvdas-{logger_name}-{}.yaml", uuid::Uuid::new_v4()));
    let yaml = serde_yaml::to_string(config)?;
    tokio::fs::write(&path, yaml).await?;

    let mut child = Command::new(binary_path)
        .arg("--config_file")
        .arg(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stderr = child.stderr.take().expect("piped above");
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
    // stdout isn't part of the manager's observation contract; drain it so
    // the child never blocks on a full pipe.
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });
    }

    Ok((
        ChildHandle {
            child,
            stderr_lines: Some(rx),
            started_at: std::time::Instant::now(),
        },
        path,
    ))
}

/// Stop a child gracefully: send the equivalent of SIGINT (on unix,
/// `nix`-free via the OS `kill` signal is out of scope here — we use
/// `start_kill` after the grace period as the portable fallback), wait up
/// to `stop_grace`, then force-kill (spec.md §4.4, §5 "stop grace 5s, kill
/// at 10s").
pub async fn stop_gracefully(
    handle: &mut ChildHandle,
    stop_grace: Duration,
    kill_grace: Duration,
) -> anyhow::Result<bool> {
    #[cfg(unix)]
    {
        if let Some(pid) = handle.child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGINT);
            }
        }
    }

    let clean = match tokio::time::timeout(stop_grace, handle.child.wait()).await {
        Ok(Ok(status)) => status.success(),
        _ => {
            match tokio::time::timeout(kill_grace, async {
                handle.child.start_kill()?;
                handle.child.wait().await
            })
            .await
            {
                Ok(Ok(_)) => false,
                _ => false,
            }
        }
    };
    Ok(clean)
}
