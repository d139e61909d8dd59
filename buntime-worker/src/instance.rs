//! One worker instance: a supervisor wrapper around a single child process
//! that loads one app (spec §4.2).

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

use buntime_core::{AppIdent, BuntimeError};
use buntime_resolver::WorkerConfig;

use crate::protocol::{frame, read_message, write_message, WireMessage, WsFrameKind};
use crate::state::WorkerState;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type StdinFramed = Framed<ChildStdin, LengthDelimitedCodec>;
type StdoutFramed = Framed<ChildStdout, LengthDelimitedCodec>;

/// A request to proxy through to the worker's child process. `body` is
/// drained as a stream of chunks rather than collected up front, so the
/// wire protocol can start forwarding before the client has finished
/// sending.
pub struct ProxyRequest {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub remote_addr: Option<String>,
    pub body: mpsc::Receiver<Bytes>,
}

/// The worker's response, with its body streamed back chunk by chunk as
/// the child produces them.
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: mpsc::Receiver<Bytes>,
}

/// Reported once the background pump finishes streaming a response body.
#[derive(Debug, Clone, Copy)]
pub struct RequestOutcome {
    pub elapsed_ms: u64,
    pub crashed: bool,
}

/// The head of a WebSocket upgrade attempt, handed to the worker before any
/// HTTP response has been committed to the client (spec §4.4 step 5).
pub struct WsUpgradeRequest {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub remote_addr: Option<String>,
}

/// The child's answer to an upgrade attempt: a normal HTTP status (101 to
/// accept, anything else to decline) plus headers for the client response.
pub struct WsHandshake {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

/// One bridged WebSocket frame, decoupled from any particular HTTP
/// framework's message type so this crate need not depend on axum.
#[derive(Debug, Clone)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

/// Opaque handle to the background pump task's result: carries the child's
/// stdio back to the [`WorkerInstance`] alongside the request's outcome.
/// Only [`WorkerInstance::finish`] can unpack it.
pub struct PumpResult {
    stdin: StdinFramed,
    stdout: StdoutFramed,
    outcome: RequestOutcome,
}

/// Owns a child process, its lifecycle state, and the one in-flight
/// request slot. Never shared between concurrent requests: the pool holds
/// at most one `&mut WorkerInstance` at a time, moving it between a lane's
/// ready queue and an active `Lease`.
pub struct WorkerInstance {
    pub id: u64,
    pub app: AppIdent,
    state: WorkerState,
    child: Child,
    stdin: Option<StdinFramed>,
    stdout: Option<StdoutFramed>,
    config: WorkerConfig,
    created_at: Instant,
    last_activity_at: Instant,
    requests_served: u64,
    errors_served: u64,
    total_response_ms: u64,
}

impl WorkerInstance {
    /// Spawn the child for `app` at `abs_dir` and await its READY
    /// handshake, under a creation deadline bounded by `config.timeout_ms`
    /// (spec §4.3.2). On spawn failure or a missed deadline the child is
    /// killed and `AppUnavailable` is returned.
    pub async fn spawn(
        app: AppIdent,
        abs_dir: &Path,
        config: WorkerConfig,
    ) -> Result<Self, BuntimeError> {
        let entrypoint = abs_dir.join(&config.entrypoint);
        let mut command = Command::new(&entrypoint);
        command
            .current_dir(abs_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if config.low_memory {
            command.env("BUNTIME_LOW_MEMORY", "1");
        }

        let mut child = command
            .spawn()
            .map_err(|e| unavailable(&app, format!("spawn failed: {e}")))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        if let Some(stderr) = child.stderr.take() {
            let app_for_log = app.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(app = %app_for_log, "worker stderr: {line}");
                }
            });
        }

        let stdin = frame(stdin);
        let mut stdout = frame(stdout);

        let deadline = Duration::from_millis(config.timeout_ms);
        match time::timeout(deadline, read_message(&mut stdout)).await {
            Ok(Ok(Some(WireMessage::Ready { .. }))) => {}
            Ok(Ok(Some(other))) => {
                let _ = child.start_kill();
                return Err(unavailable(&app, format!("expected READY, got {other:?}")));
            }
            Ok(Ok(None)) => {
                let _ = child.start_kill();
                return Err(unavailable(&app, "child closed stdout before READY".into()));
            }
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(unavailable(&app, format!("handshake read failed: {e}")));
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(unavailable(&app, "timed out waiting for READY".into()));
            }
        }

        let now = Instant::now();
        Ok(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            app,
            state: WorkerState::Ready,
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            config,
            created_at: now,
            last_activity_at: now,
            requests_served: 0,
            errors_served: 0,
            total_response_ms: 0,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    pub fn errors_served(&self) -> u64 {
        self.errors_served
    }

    pub fn total_response_ms(&self) -> u64 {
        self.total_response_ms
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity_at(&self) -> Instant {
        self.last_activity_at
    }

    /// Whether this READY worker must be retired before it can be leased
    /// again (spec §4.3.3).
    pub fn retirement_due(&self, now: Instant) -> bool {
        if self.state != WorkerState::Ready {
            return false;
        }
        let ttl = self.config.ttl_ms;
        if ttl > 0 && now.saturating_duration_since(self.created_at).as_millis() as u64 > ttl {
            return true;
        }
        let idle = now.saturating_duration_since(self.last_activity_at).as_millis() as u64;
        if idle > self.config.idle_timeout_ms {
            return true;
        }
        if self.config.max_requests > 0 && self.requests_served >= self.config.max_requests {
            return true;
        }
        false
    }

    /// Ephemeral mode: this lane never reuses a worker (spec §4.3.4).
    pub fn is_ephemeral(&self) -> bool {
        self.config.ttl_ms == 0
    }

    /// Hand one request to the child, transitioning READY → ACTIVE.
    ///
    /// Returns the response head (status, headers) plus a body channel the
    /// caller streams to the client, and a join handle that must be passed
    /// to [`Self::finish`] once the body channel closes — that's what
    /// returns the child's stdio and updates counters/state. Request-body
    /// chunks and response-body chunks are pumped concurrently by a single
    /// background task that takes ownership of the child's stdio for the
    /// duration of the request.
    pub async fn handle(
        &mut self,
        request: ProxyRequest,
    ) -> Result<(ProxyResponse, JoinHandle<PumpResult>), BuntimeError> {
        if self.state != WorkerState::Ready {
            return Err(unavailable(&self.app, "worker is not READY".into()));
        }
        self.state = WorkerState::Active;

        let mut stdin = self.stdin.take().expect("stdin present while READY");
        let mut stdout = self.stdout.take().expect("stdout present while READY");
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let id = request.id;
        let app = self.app.clone();

        let head = WireMessage::Request {
            id,
            method: request.method,
            url: request.url,
            headers: request.headers,
            remote_addr: request.remote_addr,
            body: Vec::new(),
            end_of_body: false,
        };
        if let Err(e) = write_message(&mut stdin, &head).await {
            self.stdin = Some(stdin);
            self.stdout = Some(stdout);
            self.state = WorkerState::Terminating;
            return Err(crash(&app, format!("failed writing request head: {e}")));
        }

        let mut body_rx = request.body;
        let head_result = time::timeout(
            timeout,
            wait_for_response_head(&mut stdout, &mut body_rx, &mut stdin, id),
        )
        .await;
        let (head_status, head_headers) = match head_result {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => {
                self.stdin = Some(stdin);
                self.stdout = Some(stdout);
                self.state = WorkerState::Terminating;
                return Err(e);
            }
            Err(_) => {
                self.stdin = Some(stdin);
                self.stdout = Some(stdout);
                self.state = WorkerState::Terminating;
                return Err(BuntimeError::WorkerTimeout {
                    app: app.name.clone(),
                    version: app.version.clone(),
                });
            }
        };

        let (body_tx, body_out_rx) = mpsc::channel::<Bytes>(32);
        let app_for_task = app.clone();
        let join = tokio::spawn(async move {
            let start = Instant::now();
            let mut crashed = false;
            loop {
                tokio::select! {
                    biased;
                    frame = read_message(&mut stdout) => {
                        match frame {
                            Ok(Some(WireMessage::Response { body, end_of_body, .. })) => {
                                if !body.is_empty() && body_tx.send(Bytes::from(body)).await.is_err() {
                                    crashed = true;
                                    break;
                                }
                                if end_of_body {
                                    break;
                                }
                            }
                            Ok(Some(WireMessage::Error { .. })) | Ok(None) => {
                                crashed = true;
                                break;
                            }
                            Ok(Some(_)) => continue,
                            Err(e) => {
                                tracing::warn!(app = %app_for_task, "worker stream error: {e}");
                                crashed = true;
                                break;
                            }
                        }
                    }
                    chunk = body_rx.recv(), if !body_rx.is_closed() => {
                        let msg = match chunk {
                            Some(bytes) => WireMessage::Request {
                                id,
                                method: String::new(),
                                url: String::new(),
                                headers: Vec::new(),
                                remote_addr: None,
                                body: bytes.to_vec(),
                                end_of_body: false,
                            },
                            None => WireMessage::Request {
                                id,
                                method: String::new(),
                                url: String::new(),
                                headers: Vec::new(),
                                remote_addr: None,
                                body: Vec::new(),
                                end_of_body: true,
                            },
                        };
                        if write_message(&mut stdin, &msg).await.is_err() {
                            crashed = true;
                            break;
                        }
                    }
                }
            }
            PumpResult {
                stdin,
                stdout,
                outcome: RequestOutcome {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                    crashed,
                },
            }
        });

        Ok((
            ProxyResponse {
                status: head_status,
                headers: head_headers,
                body: body_out_rx,
            },
            join,
        ))
    }

    /// Await the background pump's result, restore the child's stdio, and
    /// fold its outcome into this worker's counters and state (spec §4.2
    /// "On success ... transitions back to READY" / "On ... error ...
    /// forces the child to TERMINATING").
    pub async fn finish(&mut self, join: JoinHandle<PumpResult>) -> RequestOutcome {
        match join.await {
            Ok(PumpResult { stdin, stdout, outcome }) => {
                self.stdin = Some(stdin);
                self.stdout = Some(stdout);
                self.apply_outcome(outcome);
                outcome
            }
            Err(_join_err) => {
                let outcome = RequestOutcome { elapsed_ms: 0, crashed: true };
                self.apply_outcome(outcome);
                outcome
            }
        }
    }

    /// Hand an upgrade attempt's head to the child and wait for its
    /// handshake response, without yet bridging any frames. READY → ACTIVE
    /// happens here regardless of the child's answer: a worker mid-upgrade
    /// handshake may not be leased for anything else. Only a `101` answer
    /// should be followed by [`Self::bridge_websocket`]; any other status
    /// means the caller must build a plain HTTP response and the worker
    /// returns to READY on its own.
    pub async fn begin_websocket(
        &mut self,
        request: WsUpgradeRequest,
    ) -> Result<WsHandshake, BuntimeError> {
        if self.state != WorkerState::Ready {
            return Err(unavailable(&self.app, "worker is not READY".into()));
        }
        self.state = WorkerState::Active;

        let mut stdin = self.stdin.take().expect("stdin present while READY");
        let mut stdout = self.stdout.take().expect("stdout present while READY");
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let head = WireMessage::Request {
            id: request.id,
            method: request.method,
            url: request.url,
            headers: request.headers,
            remote_addr: request.remote_addr,
            body: Vec::new(),
            end_of_body: true,
        };
        if let Err(e) = write_message(&mut stdin, &head).await {
            self.stdin = Some(stdin);
            self.stdout = Some(stdout);
            self.state = WorkerState::Terminating;
            return Err(crash(&self.app, format!("failed writing upgrade request: {e}")));
        }

        let result = time::timeout(timeout, read_message(&mut stdout)).await;
        self.stdin = Some(stdin);
        self.stdout = Some(stdout);
        match result {
            Ok(Ok(Some(WireMessage::Response { status, headers, .. }))) => {
                if status != 101 {
                    self.state = WorkerState::Ready;
                }
                Ok(WsHandshake { status, headers })
            }
            Ok(Ok(Some(WireMessage::Error { message, .. }))) => {
                self.state = WorkerState::Terminating;
                Err(crash(&self.app, message))
            }
            Ok(Ok(Some(_))) | Ok(Ok(None)) => {
                self.state = WorkerState::Terminating;
                Err(crash(&self.app, "child closed stdout before upgrade response".into()))
            }
            Ok(Err(e)) => {
                self.state = WorkerState::Terminating;
                Err(crash(&self.app, format!("upgrade handshake read failed: {e}")))
            }
            Err(_) => {
                self.state = WorkerState::Terminating;
                Err(BuntimeError::WorkerTimeout {
                    app: self.app.name.clone(),
                    version: self.app.version.clone(),
                })
            }
        }
    }

    /// Bridge client WebSocket frames to and from the child for the
    /// connection's lifetime. The worker stays ACTIVE the entire time (spec
    /// §4.2: "the worker binds the socket for the connection's lifetime;
    /// while bound, the instance is considered ACTIVE") and returns to
    /// READY once the bridge ends, unless the child crashed. Only valid
    /// immediately after [`Self::begin_websocket`] returned status 101.
    pub async fn bridge_websocket(
        &mut self,
        id: Uuid,
        mut client_rx: mpsc::Receiver<WsMessage>,
        client_tx: mpsc::Sender<WsMessage>,
    ) -> RequestOutcome {
        let mut stdin = self.stdin.take().expect("stdin present after upgrade handshake");
        let mut stdout = self.stdout.take().expect("stdout present after upgrade handshake");
        let start = Instant::now();
        let mut crashed = false;

        loop {
            tokio::select! {
                biased;
                frame = read_message(&mut stdout) => {
                    match frame {
                        Ok(Some(WireMessage::WsFrame { kind, data, .. })) => {
                            let msg = match kind {
                                WsFrameKind::Text => {
                                    WsMessage::Text(String::from_utf8_lossy(&data).into_owned())
                                }
                                WsFrameKind::Binary => WsMessage::Binary(data),
                                WsFrameKind::Ping => WsMessage::Ping(data),
                                WsFrameKind::Pong => WsMessage::Pong(data),
                            };
                            if client_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Ok(Some(WireMessage::WsClose { .. })) => break,
                        Ok(Some(WireMessage::Error { .. })) | Ok(None) => {
                            crashed = true;
                            break;
                        }
                        Ok(Some(_)) => continue,
                        Err(e) => {
                            tracing::warn!(app = %self.app, "worker ws stream error: {e}");
                            crashed = true;
                            break;
                        }
                    }
                }
                incoming = client_rx.recv() => {
                    match incoming {
                        Some(WsMessage::Text(t)) => {
                            let wire = WireMessage::WsFrame { id, kind: WsFrameKind::Text, data: t.into_bytes() };
                            if write_message(&mut stdin, &wire).await.is_err() {
                                crashed = true;
                                break;
                            }
                        }
                        Some(WsMessage::Binary(b)) => {
                            let wire = WireMessage::WsFrame { id, kind: WsFrameKind::Binary, data: b };
                            if write_message(&mut stdin, &wire).await.is_err() {
                                crashed = true;
                                break;
                            }
                        }
                        Some(WsMessage::Ping(b)) => {
                            let wire = WireMessage::WsFrame { id, kind: WsFrameKind::Ping, data: b };
                            if write_message(&mut stdin, &wire).await.is_err() {
                                crashed = true;
                                break;
                            }
                        }
                        Some(WsMessage::Pong(b)) => {
                            let wire = WireMessage::WsFrame { id, kind: WsFrameKind::Pong, data: b };
                            if write_message(&mut stdin, &wire).await.is_err() {
                                crashed = true;
                                break;
                            }
                        }
                        None => {
                            let _ = write_message(
                                &mut stdin,
                                &WireMessage::WsClose { id, code: None, reason: String::new() },
                            )
                            .await;
                            break;
                        }
                    }
                }
            }
        }

        self.stdin = Some(stdin);
        self.stdout = Some(stdout);
        let outcome = RequestOutcome { elapsed_ms: start.elapsed().as_millis() as u64, crashed };
        self.apply_outcome(outcome);
        outcome
    }

    fn apply_outcome(&mut self, outcome: RequestOutcome) {
        self.last_activity_at = Instant::now();
        self.total_response_ms += outcome.elapsed_ms;
        if outcome.crashed {
            self.errors_served += 1;
            self.state = WorkerState::Terminating;
        } else {
            self.requests_served += 1;
            self.state = WorkerState::Ready;
        }
    }

    /// Send `TERMINATE` and give the child `grace` to exit on its own
    /// before force-killing it.
    pub async fn terminate(&mut self, grace: Duration) {
        self.state = WorkerState::Terminating;
        if let Some(mut stdin) = self.stdin.take() {
            let _ = write_message(&mut stdin, &WireMessage::Terminate).await;
        }
        if time::timeout(grace, self.child.wait()).await.is_err() {
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }
        self.state = WorkerState::Terminated;
    }
}

/// Read response frames (while still draining any remaining request body
/// chunks, in case the caller streams past the point the child already
/// started responding) until the first `Response` frame arrives, yielding
/// its status/headers as the response head.
async fn wait_for_response_head(
    stdout: &mut StdoutFramed,
    body_rx: &mut mpsc::Receiver<Bytes>,
    stdin: &mut StdinFramed,
    id: Uuid,
) -> Result<(u16, Vec<(String, String)>), BuntimeError> {
    loop {
        tokio::select! {
            biased;
            frame = read_message(stdout) => {
                match frame {
                    Ok(Some(WireMessage::Response { status, headers, .. })) => return Ok((status, headers)),
                    Ok(Some(WireMessage::Error { message, .. })) => {
                        return Err(BuntimeError::WorkerCrash {
                            app: String::new(),
                            version: String::new(),
                            reason: message,
                        });
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => {
                        return Err(BuntimeError::WorkerCrash {
                            app: String::new(),
                            version: String::new(),
                            reason: "child closed stdout mid-request".into(),
                        });
                    }
                    Err(e) => {
                        return Err(BuntimeError::WorkerCrash {
                            app: String::new(),
                            version: String::new(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            chunk = body_rx.recv() => {
                let msg = match chunk {
                    Some(bytes) => WireMessage::Request {
                        id, method: String::new(), url: String::new(), headers: Vec::new(),
                        remote_addr: None, body: bytes.to_vec(), end_of_body: false,
                    },
                    None => WireMessage::Request {
                        id, method: String::new(), url: String::new(), headers: Vec::new(),
                        remote_addr: None, body: Vec::new(), end_of_body: true,
                    },
                };
                let _ = write_message(stdin, &msg).await;
            }
        }
    }
}

fn unavailable(app: &AppIdent, reason: String) -> BuntimeError {
    BuntimeError::AppUnavailable {
        app: app.name.clone(),
        version: app.version.clone(),
        reason,
    }
}

fn crash(app: &AppIdent, reason: String) -> BuntimeError {
    BuntimeError::WorkerCrash {
        app: app.name.clone(),
        version: app.version.clone(),
        reason,
    }
}

#[cfg(any(test, feature = "test-util"))]
impl WorkerInstance {
    /// Build a worker around a stub `sh` child, bypassing the READY
    /// handshake entirely. For tests in this crate and downstream crates
    /// (pool, dispatch) that need a `WorkerInstance` fixture without a
    /// real app.
    pub async fn for_test(app: AppIdent, config: WorkerConfig) -> Self {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg("sleep 300")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = command.spawn().expect("sh must be available in test env");
        let stdin = frame(child.stdin.take().unwrap());
        let stdout = frame(child.stdout.take().unwrap());
        child.stderr.take();
        let now = Instant::now();
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            app,
            state: WorkerState::Ready,
            child,
            stdin: Some(stdin),
            stdout: Some(stdout),
            config,
            created_at: now,
            last_activity_at: now,
            requests_served: 0,
            errors_served: 0,
            total_response_ms: 0,
        }
    }

    pub fn set_created_at_for_test(&mut self, at: Instant) {
        self.created_at = at;
    }

    pub fn set_last_activity_at_for_test(&mut self, at: Instant) {
        self.last_activity_at = at;
    }

    pub fn set_requests_served_for_test(&mut self, n: u64) {
        self.requests_served = n;
    }

    pub fn set_state_for_test(&mut self, state: WorkerState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A worker wrapping a long-sleeping `sh` child, for exercising state
    /// and retirement logic without a real app's handshake.
    async fn spawn_sleeper() -> WorkerInstance {
        WorkerInstance::for_test(
            AppIdent::new("test-app", "1.0.0"),
            WorkerConfig {
                entrypoint: "server.js".into(),
                timeout_ms: 1000,
                ttl_ms: 0,
                idle_timeout_ms: 1000,
                max_requests: 0,
                auto_install: false,
                low_memory: false,
            },
        )
        .await
    }

    #[tokio::test]
    async fn ttl_zero_is_ephemeral() {
        let w = spawn_sleeper().await;
        assert!(w.is_ephemeral());
    }

    #[tokio::test]
    async fn retirement_due_by_max_requests() {
        let mut w = spawn_sleeper().await;
        w.config.max_requests = 2;
        w.requests_served = 2;
        assert!(w.retirement_due(Instant::now()));
    }

    #[tokio::test]
    async fn under_max_requests_is_not_retirement_due() {
        let mut w = spawn_sleeper().await;
        w.config.max_requests = 2;
        w.requests_served = 1;
        assert!(!w.retirement_due(Instant::now()));
    }

    #[tokio::test]
    async fn retirement_due_by_idle_timeout() {
        let mut w = spawn_sleeper().await;
        w.config.idle_timeout_ms = 10;
        w.last_activity_at = Instant::now() - Duration::from_millis(50);
        assert!(w.retirement_due(Instant::now()));
    }

    #[tokio::test]
    async fn retirement_due_by_ttl() {
        let mut w = spawn_sleeper().await;
        w.config.ttl_ms = 10;
        w.config.idle_timeout_ms = 10;
        w.created_at = Instant::now() - Duration::from_millis(50);
        assert!(w.retirement_due(Instant::now()));
    }

    #[tokio::test]
    async fn active_worker_is_never_retirement_due() {
        let mut w = spawn_sleeper().await;
        w.state = WorkerState::Active;
        w.config.max_requests = 1;
        w.requests_served = 5;
        assert!(!w.retirement_due(Instant::now()));
    }

    #[tokio::test]
    async fn terminate_transitions_to_terminated() {
        let mut w = spawn_sleeper().await;
        w.terminate(Duration::from_millis(50)).await;
        assert_eq!(w.state(), WorkerState::Terminated);
    }
}
