//! llama-server process lifecycle.
//!
//! The supervisor owns the single worker subprocess: it builds the argument
//! vector, spawns the process, relays its output, and terminates the whole
//! process tree on shutdown with SIGTERM/SIGKILL escalation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};

/// Grace period between SIGTERM and SIGKILL during stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of the worker process.
///
/// `Running -> Stopped` happens directly when the process exits on its own;
/// exits are detected lazily through liveness checks, not actively monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

struct Inner {
    state: WorkerState,
    child: Option<Child>,
    log_tasks: Vec<JoinHandle<()>>,
}

/// Supervisor for the single llama-server worker.
///
/// The handle is the only shared mutable state in the system: written once at
/// startup and once at shutdown, never from request-handling code.
pub struct WorkerSupervisor {
    server_binary: String,
    upstream_port: u16,
    extra_args: String,
    inner: Mutex<Inner>,
}

impl WorkerSupervisor {
    pub fn new(config: &Config) -> Self {
        Self {
            server_binary: config.server_binary.clone(),
            upstream_port: config.upstream_port,
            extra_args: config.llama_cpp_args.clone(),
            inner: Mutex::new(Inner {
                state: WorkerState::NotStarted,
                child: None,
                log_tasks: Vec::new(),
            }),
        }
    }

    /// Argument vector for the worker: fixed loopback/model flags first, then
    /// the shell-split user arguments. User flags come last on purpose so they
    /// can override the fixed ones under last-wins parsing; duplicates are not
    /// deduplicated.
    fn build_args(&self, model_path: &Path) -> Result<Vec<String>> {
        let mut args = vec![
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            self.upstream_port.to_string(),
            "--model".to_string(),
            model_path.display().to_string(),
        ];
        let extra = shell_words::split(&self.extra_args)
            .map_err(|e| Error::Configuration(format!("invalid extra worker arguments: {e}")))?;
        args.extend(extra);
        Ok(args)
    }

    /// Spawn the worker if it is not already running.
    ///
    /// A second call while the first instance is alive is a no-op.
    pub async fn start(&self, model_path: &Path) -> Result<()> {
        let mut inner = self.inner.lock().await;

        if let Some(child) = inner.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                return Ok(());
            }
            // Exited on its own since the last check.
            inner.child = None;
            inner.state = WorkerState::Stopped;
        }

        if model_path.as_os_str().is_empty() {
            return Err(Error::Configuration("no model path provided".to_string()));
        }

        let binary = which::which(&self.server_binary).map_err(|_| {
            Error::Configuration(format!("{} binary not found in PATH", self.server_binary))
        })?;
        let args = self.build_args(model_path)?;

        inner.state = WorkerState::Starting;

        let mut cmd = Command::new(&binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                inner.state = WorkerState::Stopped;
                return Err(Error::Configuration(format!(
                    "failed to spawn {}: {e}",
                    binary.display()
                )));
            }
        };

        tracing::info!(
            "spawned llama-server (pid: {:?}) with model {}",
            child.id(),
            model_path.display()
        );

        let mut log_tasks = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            log_tasks.push(spawn_log_relay(stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            log_tasks.push(spawn_log_relay(stderr));
        }

        inner.child = Some(child);
        inner.log_tasks = log_tasks;
        inner.state = WorkerState::Running;
        Ok(())
    }

    /// Terminate the worker and its descendants.
    ///
    /// Never fails: signal and enumeration errors are swallowed, and a worker
    /// that ignores SIGTERM for 10 seconds is killed. Calling stop on a
    /// never-started or already-exited supervisor is a no-op.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;

        let Some(mut child) = inner.child.take() else {
            if inner.state != WorkerState::NotStarted {
                inner.state = WorkerState::Stopped;
            }
            return;
        };

        if matches!(child.try_wait(), Ok(Some(_))) {
            for task in inner.log_tasks.drain(..) {
                task.abort();
            }
            inner.state = WorkerState::Stopped;
            return;
        }

        inner.state = WorkerState::Stopping;

        if let Some(pid) = child.id() {
            terminate_tree(pid);
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("llama-server exited with {status}"),
            Ok(Err(e)) => tracing::warn!("error waiting for llama-server: {e}"),
            Err(_) => {
                tracing::warn!("llama-server did not stop gracefully, killing");
                let _ = child.kill().await;
            }
        }

        for task in inner.log_tasks.drain(..) {
            task.abort();
        }
        inner.state = WorkerState::Stopped;
    }

    /// Check whether the worker process is alive, updating the state machine
    /// if it exited on its own.
    pub async fn is_running(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.child.as_mut() {
            Some(child) => {
                if matches!(child.try_wait(), Ok(None)) {
                    true
                } else {
                    inner.child = None;
                    inner.state = WorkerState::Stopped;
                    false
                }
            }
            None => false,
        }
    }

    pub async fn state(&self) -> WorkerState {
        self.inner.lock().await.state
    }

    #[cfg(test)]
    async fn pid(&self) -> Option<u32> {
        self.inner.lock().await.child.as_ref().and_then(|c| c.id())
    }
}

/// Re-emit worker output line-by-line until the stream closes. Read errors
/// end the relay quietly; they must never take down request handling.
fn spawn_log_relay<R>(stream: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!("[llama-server] {line}");
        }
    })
}

/// Signal the worker's descendants first, then the worker itself. Errors are
/// ignored throughout; shutdown must complete regardless.
fn terminate_tree(root: u32) {
    let mut sys = sysinfo::System::new();
    sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    for pid in descendants(&sys, root) {
        send_term(pid);
    }
    send_term(root);
}

fn descendants(sys: &sysinfo::System, root: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut frontier = vec![sysinfo::Pid::from_u32(root)];
    while let Some(parent) = frontier.pop() {
        for (pid, process) in sys.processes() {
            if process.parent() == Some(parent) {
                frontier.push(*pid);
                out.push(pid.as_u32());
            }
        }
    }
    out
}

#[cfg(unix)]
fn send_term(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(not(unix))]
fn send_term(_pid: u32) {}
