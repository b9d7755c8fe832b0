//! Agent process lifecycle management
//!
//! Spawns one agent process, frames its stdout through the line codec,
//! watches stderr for error-like output, and owns graceful and forced
//! shutdown. Correlated requests wait in [`PendingRequests`] until the
//! router resolves them or the process goes away.

use crate::bridge::codec::LineProtocolCodec;
use crate::bridge::locator::{Launch, PathLocator};
use crate::bridge::protocol::{BridgeEvent, BridgeMessage, MessageKind};
use crate::config::{AgentConfig, TimeoutConfig};
use crate::error::{Error, Result};
use futures::StreamExt;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;

/// Capacity of the per-session event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Extra wait after SIGTERM before force-killing
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on waiting for the OS to reap a killed process
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Lifecycle state of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Never started
    Idle,
    /// Spawned, inside the readiness grace period
    Starting,
    /// Accepting writes
    Ready,
    /// `stop` in progress
    Stopping,
    /// Process gone; may be started again
    Closed,
}

// =============================================================================
// Pending request table
// =============================================================================

type PendingSender = oneshot::Sender<Result<Value>>;

/// Requests awaiting a correlated `response` envelope, keyed by message id
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, PendingSender>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an id and get the receiver its response will arrive on
    pub async fn register(&self, id: &str) -> oneshot::Receiver<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(id.to_string(), tx);
        rx
    }

    /// Resolve a pending request. Returns false for unknown ids.
    pub async fn resolve(&self, id: &str, payload: Value) -> bool {
        match self.inner.lock().await.remove(id) {
            Some(tx) => {
                let _ = tx.send(Ok(payload));
                true
            }
            None => false,
        }
    }

    /// Fail a pending request. Returns false for unknown ids.
    pub async fn fail(&self, id: &str, error: Error) -> bool {
        match self.inner.lock().await.remove(id) {
            Some(tx) => {
                let _ = tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) {
        self.inner.lock().await.remove(id);
    }

    /// Reject every outstanding request with `ProcessClosed`
    pub async fn reject_all(&self, reason: &str) -> usize {
        let drained: Vec<(String, PendingSender)> = self.inner.lock().await.drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::ProcessClosed(reason.to_string())));
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Exit information published by the exit monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExitInfo {
    code: Option<i32>,
}

/// Handles to a running process and its IO tasks
struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns one agent process
pub struct ProcessSupervisor {
    agent_id: String,
    timeouts: TimeoutConfig,
    state: Arc<RwLock<SupervisorState>>,
    /// Write side of the agent's stdin; the mutex serializes lines
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    pending: Arc<PendingRequests>,
    events: broadcast::Sender<BridgeEvent>,
    process: Mutex<Option<ProcessHandle>>,
}

impl ProcessSupervisor {
    /// Create an idle supervisor
    pub fn new(agent_id: impl Into<String>, timeouts: TimeoutConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            agent_id: agent_id.into(),
            timeouts,
            state: Arc::new(RwLock::new(SupervisorState::Idle)),
            stdin: Arc::new(Mutex::new(None)),
            pending: Arc::new(PendingRequests::new()),
            events,
            process: Mutex::new(None),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub async fn state(&self) -> SupervisorState {
        *self.state.read().await
    }

    pub async fn is_ready(&self) -> bool {
        self.state().await == SupervisorState::Ready
    }

    /// OS process id while running
    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|h| h.pid)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    /// Sender shared with the router for `Message` and `Error` events
    pub fn event_sender(&self) -> broadcast::Sender<BridgeEvent> {
        self.events.clone()
    }

    /// Pending request table shared with the router
    pub fn pending(&self) -> Arc<PendingRequests> {
        self.pending.clone()
    }

    // =========================================================================
    // Start
    // =========================================================================

    /// Spawn the agent and wait out the readiness grace period.
    ///
    /// Returns the stream of parsed stdout values for the router.
    pub async fn start(
        &self,
        config: &AgentConfig,
        locator: Option<&PathLocator>,
    ) -> Result<mpsc::UnboundedReceiver<Value>> {
        {
            let mut state = self.state.write().await;
            match *state {
                SupervisorState::Idle | SupervisorState::Closed => {
                    *state = SupervisorState::Starting;
                }
                other => {
                    return Err(Error::AlreadyStarted(format!(
                        "{} is {:?}",
                        self.agent_id, other
                    )));
                }
            }
        }

        let launch = Launch::resolve(config, locator);
        let mut cmd = Command::new(launch.program());
        cmd.args(launch.leading_args())
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        tracing::info!(
            agent_id = %self.agent_id,
            command = %launch.describe(),
            "Spawning agent process"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to spawn agent at {}: {}", launch.describe(), e);
                return Err(self.fail_start(message).await);
            }
        };

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(i), Some(o), Some(e)) => (i, o, e),
            _ => {
                let _ = child.start_kill();
                return Err(self.fail_start("Failed to capture agent stdio".to_string()).await);
            }
        };
        let pid = child.id();
        *self.stdin.lock().await = Some(stdin);

        // stdout → codec → router channel
        let (value_tx, value_rx) = mpsc::unbounded_channel();
        let agent_id = self.agent_id.clone();
        let stdout_task = tokio::spawn(async move {
            let mut framed = FramedRead::new(stdout, LineProtocolCodec::new());
            while let Some(item) = framed.next().await {
                match item {
                    Ok(value) => {
                        if value_tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(agent_id = %agent_id, "Agent stdout read failed: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!(agent_id = %agent_id, "Agent stdout closed");
        });

        // stderr → diagnostics; only error-like lines become events
        let agent_id = self.agent_id.clone();
        let events = self.events.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if is_error_like(&line) {
                    tracing::warn!(agent_id = %agent_id, "Agent stderr: {}", line);
                    let _ = events.send(BridgeEvent::Error {
                        agent_id: agent_id.clone(),
                        message: line,
                    });
                } else {
                    tracing::debug!(agent_id = %agent_id, "Agent stderr: {}", line);
                }
            }
        });

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, mut exit_rx) = watch::channel(None);
        self.spawn_exit_monitor(child, kill_rx, exit_tx);

        *self.process.lock().await = Some(ProcessHandle {
            pid,
            kill_tx: Some(kill_tx),
            exit_rx: exit_rx.clone(),
            tasks: vec![stdout_task, stderr_task],
        });

        tokio::time::sleep(self.timeouts.ready_grace()).await;

        // A stop() during the grace period owns teardown and the Closed event
        if *self.state.read().await != SupervisorState::Starting {
            return Err(self.stopped_during_startup());
        }

        let exited = *exit_rx.borrow_and_update();
        if let Some(exit) = exited {
            self.teardown().await;
            let message = format!(
                "Agent exited during startup (exit code {:?})",
                exit.code
            );
            return Err(self.fail_start(message).await);
        }

        {
            let mut state = self.state.write().await;
            if *state != SupervisorState::Starting {
                return Err(self.stopped_during_startup());
            }
            *state = SupervisorState::Ready;
        }

        tracing::info!(agent_id = %self.agent_id, pid = ?pid, "Agent process ready");
        let _ = self.events.send(BridgeEvent::Ready {
            agent_id: self.agent_id.clone(),
        });

        Ok(value_rx)
    }

    /// Mark a failed start, emit an error event, and build the error.
    ///
    /// When a stop is already in progress the failure is the stop's doing:
    /// no error event, and the state is left for `stop` to close.
    async fn fail_start(&self, message: String) -> Error {
        *self.stdin.lock().await = None;
        {
            let mut state = self.state.write().await;
            if *state != SupervisorState::Starting {
                tracing::debug!(agent_id = %self.agent_id, "{} after stop request", message);
                return self.stopped_during_startup();
            }
            *state = SupervisorState::Closed;
        }
        tracing::error!(agent_id = %self.agent_id, "{}", message);
        let _ = self.events.send(BridgeEvent::Error {
            agent_id: self.agent_id.clone(),
            message: message.clone(),
        });
        Error::Spawn(message)
    }

    fn stopped_during_startup(&self) -> Error {
        Error::ProcessClosed(format!("{} was stopped during startup", self.agent_id))
    }

    /// Wait for exit (or a kill request) and handle crashes
    fn spawn_exit_monitor(
        &self,
        mut child: tokio::process::Child,
        kill_rx: oneshot::Receiver<()>,
        exit_tx: watch::Sender<Option<ExitInfo>>,
    ) {
        let agent_id = self.agent_id.clone();
        let state = self.state.clone();
        let stdin = self.stdin.clone();
        let pending = self.pending.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = status.ok().and_then(|s| s.code());

            // Only an exit from Ready is a crash; Starting and Stopping are
            // handled by `start` and `stop` themselves.
            let crashed = {
                let mut guard = state.write().await;
                if *guard == SupervisorState::Ready {
                    *guard = SupervisorState::Closed;
                    true
                } else {
                    false
                }
            };

            if crashed {
                tracing::warn!(agent_id = %agent_id, exit_code = ?code, "Agent process exited unexpectedly");
                stdin.lock().await.take();
                let rejected = pending.reject_all("agent process exited").await;
                if rejected > 0 {
                    tracing::debug!(agent_id = %agent_id, rejected, "Rejected in-flight requests");
                }
                let _ = events.send(BridgeEvent::Closed {
                    agent_id: agent_id.clone(),
                    expected: false,
                    exit_code: code,
                });
            } else {
                tracing::info!(agent_id = %agent_id, exit_code = ?code, "Agent process exited");
            }

            let _ = exit_tx.send(Some(ExitInfo { code }));
        });
    }

    // =========================================================================
    // Stop
    // =========================================================================

    /// Shut the process down: close stdin, wait, SIGTERM (unix), then kill.
    ///
    /// Never fails. Safe to call before `start` and more than once.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            match *state {
                SupervisorState::Starting | SupervisorState::Ready => {
                    *state = SupervisorState::Stopping;
                }
                SupervisorState::Stopping => return,
                SupervisorState::Idle | SupervisorState::Closed => {
                    drop(state);
                    self.release().await;
                    return;
                }
            }
        }

        tracing::info!(agent_id = %self.agent_id, "Stopping agent process");
        let exit_code = self.teardown().await;

        *self.state.write().await = SupervisorState::Closed;
        let _ = self.events.send(BridgeEvent::Closed {
            agent_id: self.agent_id.clone(),
            expected: true,
            exit_code,
        });
    }

    /// Terminate the process (if any) and release resources
    async fn teardown(&self) -> Option<i32> {
        // Closing stdin is the polite shutdown request
        self.stdin.lock().await.take();

        let handle = self.process.lock().await.take();
        let mut exit_code = None;
        if let Some(mut handle) = handle {
            let mut exited = wait_exit(&mut handle.exit_rx, self.timeouts.stop_grace()).await;

            if !exited {
                if let Some(pid) = handle.pid {
                    tracing::debug!(agent_id = %self.agent_id, pid, "Sending SIGTERM");
                    terminate(pid);
                    exited = wait_exit(&mut handle.exit_rx, TERM_GRACE).await;
                }
            }

            if !exited {
                tracing::warn!(agent_id = %self.agent_id, "Force killing agent process");
                if let Some(kill_tx) = handle.kill_tx.take() {
                    let _ = kill_tx.send(());
                }
                if !wait_exit(&mut handle.exit_rx, KILL_WAIT).await {
                    tracing::error!(agent_id = %self.agent_id, "Agent process did not exit after kill");
                }
            }

            exit_code = handle.exit_rx.borrow().and_then(|e| e.code);
            for task in handle.tasks {
                task.abort();
            }
        }

        self.release().await;
        exit_code
    }

    /// Drop stdin and reject everything still waiting
    async fn release(&self) {
        self.stdin.lock().await.take();
        let rejected = self.pending.reject_all("bridge closed").await;
        if rejected > 0 {
            tracing::debug!(agent_id = %self.agent_id, rejected, "Rejected pending requests");
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write one message as a JSON line
    pub async fn write(&self, message: &BridgeMessage) -> Result<()> {
        if !self.is_ready().await {
            return Err(Error::NotReady(self.agent_id.clone()));
        }
        let line = message.to_line()?;

        let mut stdin = self.stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| Error::NotReady(self.agent_id.clone()))?;
        pipe.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Write(format!("{}: {}", self.agent_id, e)))?;
        pipe.flush()
            .await
            .map_err(|e| Error::Write(format!("{}: {}", self.agent_id, e)))?;

        tracing::trace!(agent_id = %self.agent_id, id = %message.id, "Wrote message to agent");
        Ok(())
    }

    /// Send a `request` and wait for the correlated `response` payload
    pub async fn request(&self, payload: Value, timeout: Duration) -> Result<Value> {
        let message = BridgeMessage::new(MessageKind::Request, payload);
        let rx = self.pending.register(&message.id).await;

        if let Err(e) = self.write(&message).await {
            self.pending.remove(&message.id).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ProcessClosed(format!(
                "request {} abandoned",
                message.id
            ))),
            Err(_) => {
                self.pending.remove(&message.id).await;
                Err(Error::Timeout(format!(
                    "no response to request {} within {:?}",
                    message.id, timeout
                )))
            }
        }
    }
}

/// Stderr lines that should surface as `error` events
pub fn is_error_like(line: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(error|fatal|panic(ked)?|exception|traceback|uncaught|unhandled|ENOENT|EACCES|EADDRINUSE)\b").ok()
        })
        .as_ref()
        .map(|re| re.is_match(line))
        .unwrap_or(false)
}

async fn wait_exit(rx: &mut watch::Receiver<Option<ExitInfo>>, within: Duration) -> bool {
    match tokio::time::timeout(within, rx.wait_for(|exit| exit.is_some())).await {
        Ok(Ok(_)) => true,
        // Monitor gone: the process has been reaped
        Ok(Err(_)) => true,
        Err(_) => false,
    }
}

#[cfg(unix)]
fn terminate(pid: u32) {
    // SAFETY: kill(2) with a pid we spawned and still own
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) {}
