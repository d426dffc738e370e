//! Worker Supervisor
//!
//! Owns the single external search process. Starting a batch always tears the
//! previous worker down first, and termination goes through the whole process
//! tree so helper processes spawned by the worker never outlive it.

use async_trait::async_trait;
use regex::RegexSet;
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::scheduler::Batch;
use super::sink::LogSink;
use crate::config::WorkerConfig;
use crate::error::{RotorError, RotorResult};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// What the scheduler needs from whatever executes a batch.
#[async_trait]
pub trait BatchRunner: Send + Sync {
    /// Replace the current work with `batch`. Failures are handled inside.
    async fn run(&self, batch: &Batch);

    /// Stop whatever is running.
    async fn halt(&self);
}

struct WorkerHandle {
    child: Child,
    pid: Option<u32>,
    generation: u64,
    /// Detached on stop; it drains to end-of-stream on its own.
    _reader: JoinHandle<()>,
}

pub struct WorkerSupervisor {
    config: WorkerConfig,
    noise: Arc<RegexSet>,
    sink: Arc<dyn LogSink>,
    current: Mutex<Option<WorkerHandle>>,
    generations: AtomicU64,
}

impl WorkerSupervisor {
    pub fn new(config: WorkerConfig, sink: Arc<dyn LogSink>) -> RotorResult<Self> {
        let noise = RegexSet::new(&config.noise_patterns)?;
        Ok(Self {
            config,
            noise: Arc::new(noise),
            sink,
            current: Mutex::new(None),
            generations: AtomicU64::new(0),
        })
    }

    /// Arguments passed after the program name for a batch.
    pub fn arguments(&self, targets: &[String]) -> Vec<String> {
        let mut args = self.config.base_args.clone();
        args.reserve(targets.len() * 2);
        for target in targets {
            args.push(self.config.constraint_flag.clone());
            args.push(target.clone());
        }
        args
    }

    /// Launch a worker for `targets`, stopping any previous one first.
    ///
    /// The lifecycle lock is held across both steps, so a concurrent `stop`
    /// lands either before the old worker is replaced or after the new one
    /// exists; two workers never overlap.
    #[tracing::instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn start(&self, targets: &[String]) -> RotorResult<()> {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            terminate(previous).await;
        }
        *current = Some(self.spawn(targets)?);
        Ok(())
    }

    /// Kill the worker and its descendants. No-op when idle.
    #[tracing::instrument(skip(self))]
    pub async fn stop(&self) {
        // keep the lock until the old tree is dead so a racing start waits
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            terminate(previous).await;
        }
    }

    /// Whether a worker is alive. A worker that exited on its own is reaped
    /// and forgotten here, same as a stopped one.
    pub async fn is_running(&self) -> bool {
        let mut current = self.current.lock().await;
        let Some(handle) = current.as_mut() else {
            return false;
        };

        // Peek without reaping: the zombie keeps the group id reserved, so
        // leftover helpers can still be killed as a tree.
        #[cfg(target_os = "linux")]
        if let Some(pid) = handle.pid {
            match exited_unreaped(pid) {
                Ok(false) => return true,
                Ok(true) => {
                    warn!(generation = handle.generation, "Worker exited on its own");
                    if let Some(handle) = current.take() {
                        terminate(handle).await;
                    }
                    return false;
                }
                Err(e) => debug!("waitid({}) failed, falling back to try_wait: {}", pid, e),
            }
        }

        match handle.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                // already reaped, so the group id may be recycled: no tree kill
                warn!(generation = handle.generation, "Worker exited on its own: {}", status);
                current.take();
                false
            }
            Err(e) => {
                warn!("Could not poll worker status: {}", e);
                true
            }
        }
    }

    pub async fn current_pid(&self) -> Option<u32> {
        self.current.lock().await.as_ref().and_then(|h| h.pid)
    }

    fn spawn(&self, targets: &[String]) -> RotorResult<WorkerHandle> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(self.arguments(targets))
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so the whole tree can be signalled at once.
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn().map_err(|source| RotorError::Launch {
            program: self.config.program.clone(),
            source,
        })?;

        let pid = child.id();
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let reader = tokio::spawn(forward_output(
            child.stdout.take(),
            child.stderr.take(),
            self.noise.clone(),
            self.sink.clone(),
            generation,
        ));
        info!(generation, pid, "⛏️  Worker launched with {} targets", targets.len());

        Ok(WorkerHandle {
            child,
            pid,
            generation,
            _reader: reader,
        })
    }
}

#[async_trait]
impl BatchRunner for WorkerSupervisor {
    async fn run(&self, batch: &Batch) {
        if let Err(e) = self.start(&batch.targets).await {
            error!("Batch failed, retrying next rotation: {}", e);
        }
    }

    async fn halt(&self) {
        self.stop().await;
    }
}

/// Kill the process tree, then reap the direct child. The child is not reaped
/// before the tree kill, so its pid (and group id) cannot have been reused.
async fn terminate(mut handle: WorkerHandle) {
    if let Some(pid) = handle.pid {
        kill_tree(pid).await;
    }
    if let Err(e) = handle.child.kill().await {
        debug!(generation = handle.generation, "Worker already gone: {}", e);
    }
    info!(generation = handle.generation, "Worker stopped");
}

#[cfg(unix)]
async fn kill_tree(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: plain syscall on a process group we created and have not reaped.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!("killpg({}) failed: {}", pgid, std::io::Error::last_os_error());
    }
}

/// Whether the child has exited, leaving it unreaped.
#[cfg(target_os = "linux")]
fn exited_unreaped(pid: u32) -> std::io::Result<bool> {
    let Ok(id) = libc::id_t::try_from(pid) else {
        return Ok(false);
    };
    // SAFETY: siginfo_t is plain old data and waitid only writes into it.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        libc::waitid(
            libc::P_PID,
            id,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // WNOHANG leaves si_pid at zero while the child is still running
    Ok(unsafe { info.si_pid() } != 0)
}

#[cfg(windows)]
async fn kill_tree(pid: u32) {
    let status = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .creation_flags(CREATE_NO_WINDOW)
        .status()
        .await;
    if let Err(e) = status {
        debug!("taskkill for {} failed: {}", pid, e);
    }
}

async fn next_line<R>(lines: &mut Option<Lines<R>>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

/// Merge stdout and stderr into the sink, line by line, until both close.
async fn forward_output(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    noise: Arc<RegexSet>,
    sink: Arc<dyn LogSink>,
    generation: u64,
) {
    let mut out = stdout.map(|s| BufReader::new(s).lines());
    let mut err = stderr.map(|s| BufReader::new(s).lines());

    loop {
        let read = tokio::select! {
            line = next_line(&mut out), if out.is_some() => match line {
                Ok(None) => { out = None; continue; }
                other => other,
            },
            line = next_line(&mut err), if err.is_some() => match line {
                Ok(None) => { err = None; continue; }
                other => other,
            },
            else => break,
        };

        match read {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() && !noise.is_match(line) {
                    sink.emit(line);
                }
            }
            // a garbled line is skipped; the stream itself is still usable
            Err(e) if e.kind() == ErrorKind::InvalidData => continue,
            Err(e) => {
                debug!(generation, "Worker output read failed: {}", e);
                break;
            }
            Ok(None) => {}
        }
    }
    debug!(generation, "Worker output closed");
}
