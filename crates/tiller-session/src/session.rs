//! The protocol session: one multiplexed, correlated, reconnecting
//! connection to a browser debugging target.
//!
//! A [`Session`] owns zero-or-one live transport, a per-connection command
//! id counter, the map of in-flight commands, and the event subscriber
//! list. Many callers may issue commands concurrently against the same
//! session -- each gets its own id and its own wait point -- while a single
//! receive loop per connection correlates response frames back to their
//! callers and broadcasts event frames to prefix-matched subscribers.
//!
//! When the socket drops, every in-flight command fails with
//! `ConnectionLost` and a reconnect task redials the recorded target up to
//! the configured retry bound, re-attaching and re-applying standing
//! page-initialization scripts so a reconnect is behaviorally transparent
//! to callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::config::ConnectionConfig;
use crate::error::SessionError;
use crate::retry::RetryPolicy;
use crate::transport::{self, TargetInfo, Transport, WsSink, WsSource};

/// Bounded queue capacity for each event subscriber.
///
/// A subscriber that cannot keep up loses events (with a warning) rather
/// than stalling the receive loop.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// Domains enabled on every attach so commands and events flow.
const ENABLED_DOMAINS: &[&str] = &["Page", "DOM", "Runtime"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Connection lifecycle states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and no endpoint verified.
    Disconnected,
    /// A dial or redial is in progress.
    Connecting,
    /// The endpoint is reachable but no target is attached.
    Connected,
    /// Attached to a target; commands may be issued.
    Attached(String),
    /// Closed, either explicitly or after exhausting reconnect attempts.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Attached(id) => write!(f, "attached({id})"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// An event frame received from the browser.
#[derive(Debug, Clone)]
pub struct ProtocolEvent {
    /// Event method name (e.g. "Page.loadEventFired").
    pub method: String,
    /// Event parameters.
    pub params: Value,
}

/// Error object in a protocol response frame.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ErrorFrame {
    pub code: i64,
    pub message: String,
}

/// A parsed inbound frame: a correlated response or an event.
#[derive(Debug, Clone)]
pub enum Frame {
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<ErrorFrame>,
    },
    Event {
        method: String,
        params: Value,
    },
}

/// Parse an inbound frame. Frames carrying an `id` are responses; frames
/// without one are events. Returns `None` for frames that are neither.
pub fn parse_frame(json: &Value) -> Option<Frame> {
    if let Some(id) = json.get("id").and_then(|v| v.as_u64()) {
        return Some(Frame::Response {
            id,
            result: json.get("result").cloned(),
            error: json
                .get("error")
                .and_then(|e| serde_json::from_value(e.clone()).ok()),
        });
    }
    let method = json.get("method")?.as_str()?.to_string();
    let params = json.get("params").cloned().unwrap_or(Value::Null);
    Some(Frame::Event { method, params })
}

/// Build a request frame.
pub fn build_request_frame(id: u64, method: &str, params: &Value) -> Value {
    serde_json::json!({
        "id": id,
        "method": method,
        "params": params,
    })
}

type CommandReply = Result<Value, SessionError>;

struct Subscriber {
    id: u64,
    prefix: String,
    tx: mpsc::Sender<ProtocolEvent>,
}

/// A live event subscription. Dropping it unsubscribes.
pub struct EventSubscription {
    id: u64,
    inner: Arc<SessionInner>,
    rx: mpsc::Receiver<ProtocolEvent>,
}

impl EventSubscription {
    /// Receive the next matching event, or `None` once unsubscribed and
    /// drained.
    pub async fn recv(&mut self) -> Option<ProtocolEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.inner.remove_subscriber(self.id);
    }
}

/// One live connection: shared writer, per-connection id counter, and the
/// receive loop task. The epoch distinguishes this connection from its
/// successors so a stale read loop cannot trigger a second reconnect.
struct Connection {
    writer: Arc<tokio::sync::Mutex<WsSink>>,
    next_id: AtomicU64,
    epoch: u64,
    reader: JoinHandle<()>,
}

#[derive(Clone)]
struct AttachedTarget {
    target_id: String,
    ws_url: String,
}

struct SessionInner {
    config: ConnectionConfig,
    state: Mutex<SessionState>,
    conn: RwLock<Option<Connection>>,
    epoch: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<CommandReply>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_sub_id: AtomicU64,
    init_scripts: Mutex<Vec<String>>,
    attached: Mutex<Option<AttachedTarget>>,
    fatal: Mutex<Option<SessionError>>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The public protocol client.
///
/// Cheap to share: internally reference counted, so the executor and any
/// number of command callers can hold the same session.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session for the given endpoint configuration.
    ///
    /// The configuration is validated here; a bad config never produces a
    /// session that fails later with an obscure dial error.
    pub fn new(config: ConnectionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                state: Mutex::new(SessionState::Disconnected),
                conn: RwLock::new(None),
                epoch: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(Vec::new()),
                next_sub_id: AtomicU64::new(1),
                init_scripts: Mutex::new(Vec::new()),
                attached: Mutex::new(None),
                fatal: Mutex::new(None),
            }),
        })
    }

    /// The session's connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state.lock().expect("state lock").clone()
    }

    /// Verify the endpoint is alive and speaks the debugging protocol.
    ///
    /// Transitions `Disconnected -> Connected`. The WebSocket itself is
    /// dialed at attach time, one live transport per attached target.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Closed {
            return Err(self.closed_error());
        }
        let version = transport::fetch_version(&self.inner.config).await?;
        tracing::info!(
            endpoint = %self.inner.config.http_base(),
            browser = %version.browser,
            "debugging endpoint verified"
        );
        self.inner.set_state(SessionState::Connected);
        Ok(())
    }

    /// Attach to the target matching `selector`.
    ///
    /// The selector matches a target id exactly or a URL prefix; an empty
    /// selector picks the first page target. Returns the attached target's
    /// id.
    pub async fn attach(&self, selector: &str) -> Result<String, SessionError> {
        let targets = transport::fetch_targets(&self.inner.config).await?;
        let target = transport::select_target(&targets, selector)
            .ok_or_else(|| SessionError::TargetNotFound {
                selector: selector.to_string(),
            })?
            .clone();
        self.attach_to(&target).await
    }

    /// Attach to an already-known target.
    ///
    /// Dials the target's debugging WebSocket, starts the receive loop,
    /// enables the standard domains, and injects any standing
    /// on-new-document scripts before navigation can occur.
    pub async fn attach_to(&self, target: &TargetInfo) -> Result<String, SessionError> {
        if target.ws_url.is_empty() {
            return Err(SessionError::Protocol {
                detail: format!("target '{}' exposes no debugger URL", target.id),
            });
        }

        let mut guard = self.inner.conn.write().await;
        if self.state() == SessionState::Closed {
            return Err(self.closed_error());
        }

        // Tear down any previous attachment first.
        if let Some(old) = guard.take() {
            old.reader.abort();
            self.inner.fail_pending(SessionError::ConnectionLost);
        }

        self.inner.set_state(SessionState::Connecting);
        let conn = match SessionInner::open_connection(&self.inner, &target.ws_url).await {
            Ok(conn) => conn,
            Err(e) => {
                self.inner.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        if let Err(e) = SessionInner::bootstrap(&self.inner, &conn).await {
            conn.reader.abort();
            self.inner.set_state(SessionState::Disconnected);
            return Err(e);
        }

        *self.inner.attached.lock().expect("attached lock") = Some(AttachedTarget {
            target_id: target.id.clone(),
            ws_url: target.ws_url.clone(),
        });
        *guard = Some(conn);
        self.inner.set_state(SessionState::Attached(target.id.clone()));
        tracing::info!(target = %target.id, "attached to target");
        Ok(target.id.clone())
    }

    /// Detach from the current target, keeping the session usable.
    pub async fn detach(&self) -> Result<(), SessionError> {
        let mut guard = self.inner.conn.write().await;
        if let Some(conn) = guard.take() {
            conn.reader.abort();
            self.inner.fail_pending(SessionError::ConnectionLost);
        }
        *self.inner.attached.lock().expect("attached lock") = None;
        self.inner.set_state(SessionState::Connected);
        Ok(())
    }

    /// Issue a protocol command and wait for its correlated response.
    ///
    /// `timeout` overrides the config's default command timeout. Deadline
    /// expiry removes the pending command and returns `CommandTimeout`
    /// without closing the connection: a slow command must not punish
    /// unrelated concurrent commands. Dropping the returned future cancels
    /// the command locally; the wire protocol has no cancel verb, so a late
    /// response is simply discarded.
    pub async fn command(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, SessionError> {
        let duration = timeout.unwrap_or(self.inner.config.command_timeout);

        let (id, writer) = {
            let guard = self.inner.conn.read().await;
            match guard.as_ref() {
                Some(conn) => (
                    conn.next_id.fetch_add(1, Ordering::SeqCst),
                    Arc::clone(&conn.writer),
                ),
                None => return Err(self.unavailable_error()),
            }
        };

        SessionInner::dispatch(&self.inner, &writer, id, method, params, duration).await
    }

    /// Subscribe to events whose method starts with `method_prefix`.
    ///
    /// Subscribers are invoked in subscription order; each gets a bounded
    /// queue so a slow consumer cannot stall frame delivery. Dropping the
    /// returned subscription unsubscribes.
    pub fn subscribe(&self, method_prefix: &str) -> EventSubscription {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let id = self.inner.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subscribers
            .lock()
            .expect("subscribers lock")
            .push(Subscriber {
                id,
                prefix: method_prefix.to_string(),
                tx,
            });
        EventSubscription {
            id,
            inner: Arc::clone(&self.inner),
            rx,
        }
    }

    /// Register a script injected on every new document in the attached
    /// target, before any page script runs.
    ///
    /// The script is recorded and re-applied after every successful
    /// reconnect, not only on first attach, so countermeasure code
    /// survives a redial.
    pub async fn add_init_script(&self, source: &str) -> Result<(), SessionError> {
        self.inner
            .init_scripts
            .lock()
            .expect("init_scripts lock")
            .push(source.to_string());

        let attached = { self.inner.conn.read().await.is_some() };
        if attached {
            self.command(
                "Page.addScriptToEvaluateOnNewDocument",
                serde_json::json!({ "source": source }),
                None,
            )
            .await?;
        }
        Ok(())
    }

    /// Close the session. In-flight commands fail with `ConnectionLost`;
    /// no further commands are accepted.
    pub async fn close(&self) {
        let mut guard = self.inner.conn.write().await;
        self.inner.set_state(SessionState::Closed);
        if let Some(conn) = guard.take() {
            // Best-effort close frame; the peer may already be gone.
            {
                let mut writer = conn.writer.lock().await;
                let _ = writer.send(Message::Close(None)).await;
            }
            conn.reader.abort();
        }
        self.inner.fail_pending(SessionError::ConnectionLost);
        tracing::info!("session closed");
    }

    /// Clone a shareable handle to this session.
    pub fn handle(&self) -> Session {
        Session {
            inner: Arc::clone(&self.inner),
        }
    }

    fn closed_error(&self) -> SessionError {
        self.inner
            .fatal
            .lock()
            .expect("fatal lock")
            .clone()
            .unwrap_or(SessionError::Closed)
    }

    fn unavailable_error(&self) -> SessionError {
        match self.state() {
            SessionState::Closed => self.closed_error(),
            _ => SessionError::NotAttached,
        }
    }
}

// ---------------------------------------------------------------------------
// Correlator internals
// ---------------------------------------------------------------------------

/// Removes an abandoned pending command (deadline expiry or caller drop).
struct PendingGuard<'a> {
    inner: &'a SessionInner,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.lock().expect("pending lock").remove(&self.id);
    }
}

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        *self.state.lock().expect("state lock") = state;
    }

    fn remove_subscriber(&self, id: u64) {
        self.subscribers
            .lock()
            .expect("subscribers lock")
            .retain(|s| s.id != id);
    }

    /// Fail every in-flight command with `err`.
    fn fail_pending(&self, err: SessionError) {
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().expect("pending lock");
            pending.drain().collect()
        };
        for (id, tx) in drained {
            tracing::debug!(id, "failing in-flight command: {}", err.kind());
            let _ = tx.send(Err(err.clone()));
        }
    }

    /// Dial a target URL and start its receive loop.
    async fn open_connection(
        inner: &Arc<SessionInner>,
        ws_url: &str,
    ) -> Result<Connection, SessionError> {
        let transport = Transport::dial(&inner.config, ws_url).await?;
        let (sink, stream) = transport.into_split();
        let epoch = inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let reader = tokio::spawn(Self::read_loop(Arc::clone(inner), stream, epoch));
        Ok(Connection {
            writer: Arc::new(tokio::sync::Mutex::new(sink)),
            next_id: AtomicU64::new(1),
            epoch,
            reader,
        })
    }

    /// Enable the standard domains and re-apply standing init scripts on a
    /// freshly dialed connection.
    async fn bootstrap(inner: &Arc<SessionInner>, conn: &Connection) -> Result<(), SessionError> {
        let timeout = inner.config.command_timeout;
        for domain in ENABLED_DOMAINS {
            let id = conn.next_id.fetch_add(1, Ordering::SeqCst);
            Self::dispatch(
                inner,
                &conn.writer,
                id,
                &format!("{domain}.enable"),
                serde_json::json!({}),
                timeout,
            )
            .await?;
        }

        let scripts: Vec<String> = inner
            .init_scripts
            .lock()
            .expect("init_scripts lock")
            .clone();
        for source in scripts {
            let id = conn.next_id.fetch_add(1, Ordering::SeqCst);
            Self::dispatch(
                inner,
                &conn.writer,
                id,
                "Page.addScriptToEvaluateOnNewDocument",
                serde_json::json!({ "source": source }),
                timeout,
            )
            .await?;
        }
        Ok(())
    }

    /// Register a pending command, write the request frame, and wait for
    /// fulfillment or the deadline.
    async fn dispatch(
        inner: &SessionInner,
        writer: &Arc<tokio::sync::Mutex<WsSink>>,
        id: u64,
        method: &str,
        params: Value,
        duration: Duration,
    ) -> CommandReply {
        let (tx, rx) = oneshot::channel();
        inner.pending.lock().expect("pending lock").insert(id, tx);
        let guard = PendingGuard { inner, id };

        let frame = build_request_frame(id, method, &params).to_string();
        tracing::debug!(id, method, "sending command");

        let send_result = {
            let mut sink = writer.lock().await;
            sink.send(Message::Text(frame.into())).await
        };
        if let Err(e) = send_result {
            tracing::warn!(id, method, error = %e, "failed to write command frame");
            return Err(SessionError::ConnectionLost);
        }

        match tokio::time::timeout(duration, rx).await {
            Err(_) => Err(SessionError::CommandTimeout {
                method: method.to_string(),
                duration,
            }),
            Ok(Err(_)) => Err(SessionError::ConnectionLost),
            Ok(Ok(reply)) => {
                // Fulfilled by the read loop; nothing left to clean up.
                std::mem::forget(guard);
                reply
            }
        }
    }

    /// The single receive loop for one connection.
    ///
    /// Response frames fulfill their pending command exactly once; an id
    /// with no match (late response for a cancelled command, or a
    /// duplicate) is logged and discarded, never raised to callers. Event
    /// frames are broadcast to matching subscribers in subscription order.
    async fn read_loop(inner: Arc<SessionInner>, mut stream: WsSource, epoch: u64) {
        while let Some(message) = stream.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => {
                    tracing::info!("socket closed by remote");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "socket read error, stopping receive loop");
                    break;
                }
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unparseable frame");
                    continue;
                }
            };

            match parse_frame(&json) {
                Some(Frame::Response { id, result, error }) => {
                    inner.fulfill(id, result, error);
                }
                Some(Frame::Event { method, params }) => {
                    inner.broadcast(ProtocolEvent { method, params });
                }
                None => {
                    tracing::debug!("discarding frame that is neither response nor event");
                }
            }
        }

        inner.fail_pending(SessionError::ConnectionLost);
        tokio::spawn(Self::reconnect(Arc::clone(&inner), epoch));
    }

    fn fulfill(&self, id: u64, result: Option<Value>, error: Option<ErrorFrame>) {
        let slot = self.pending.lock().expect("pending lock").remove(&id);
        match slot {
            Some(tx) => {
                let reply = match error {
                    Some(err) => Err(SessionError::CommandFailed {
                        code: err.code,
                        message: err.message,
                    }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                // A dropped receiver means the caller cancelled; discard.
                let _ = tx.send(reply);
            }
            None => {
                tracing::debug!(id, "response for unknown or cancelled command id, discarding");
            }
        }
    }

    fn broadcast(&self, event: ProtocolEvent) {
        let subscribers = self.subscribers.lock().expect("subscribers lock");
        for subscriber in subscribers.iter() {
            if !event.method.starts_with(&subscriber.prefix) {
                continue;
            }
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        method = %event.method,
                        prefix = %subscriber.prefix,
                        "subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Subscription is being dropped; retain() will remove it.
                }
            }
        }
    }

    /// Redial the recorded target after a lost connection.
    ///
    /// Holds the exclusive connection lock for the whole loop, serializing
    /// against attach/close and against new command submissions that would
    /// otherwise race a mid-reconnect state. Ids reset on each successful
    /// redial; that is safe because every pending command was already
    /// failed when the previous connection dropped.
    fn reconnect(
        inner: Arc<SessionInner>,
        from_epoch: u64,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>> {
        Box::pin(Self::reconnect_inner(inner, from_epoch))
    }

    async fn reconnect_inner(inner: Arc<SessionInner>, from_epoch: u64) {
        let mut guard = inner.conn.write().await;

        // Only the connection that observed the drop may reconnect; a stale
        // epoch means someone already re-attached or closed the session.
        match guard.as_ref() {
            Some(conn) if conn.epoch == from_epoch => {}
            _ => return,
        }
        *guard = None;

        if *inner.state.lock().expect("state lock") == SessionState::Closed {
            return;
        }

        let Some(target) = inner.attached.lock().expect("attached lock").clone() else {
            inner.set_state(SessionState::Disconnected);
            return;
        };

        inner.set_state(SessionState::Connecting);
        let policy = RetryPolicy::from_config(&inner.config);
        let attempts = policy.max_retries();

        for (index, delay) in policy.delays().into_iter().enumerate() {
            tokio::time::sleep(delay).await;
            tracing::info!(
                attempt = index + 1,
                max = attempts,
                target = %target.target_id,
                "redialing target"
            );

            match Self::open_connection(&inner, &target.ws_url).await {
                Ok(conn) => match Self::bootstrap(&inner, &conn).await {
                    Ok(()) => {
                        *guard = Some(conn);
                        inner.set_state(SessionState::Attached(target.target_id.clone()));
                        tracing::info!(target = %target.target_id, "reconnected");
                        return;
                    }
                    Err(e) => {
                        conn.reader.abort();
                        tracing::warn!(error = %e, "redial bootstrap failed");
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "redial failed");
                }
            }
        }

        tracing::error!(attempts, "connection retries exhausted, closing session");
        *inner.fatal.lock().expect("fatal lock") =
            Some(SessionError::ConnectionExhausted { attempts });
        inner.set_state(SessionState::Closed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Frame parsing --------------------------------------------------------

    #[test]
    fn test_parse_response_frame() {
        let json = serde_json::json!({
            "id": 1,
            "result": { "frameId": "F1" }
        });
        match parse_frame(&json) {
            Some(Frame::Response { id, result, error }) => {
                assert_eq!(id, 1);
                assert_eq!(result.unwrap()["frameId"], "F1");
                assert!(error.is_none());
            }
            other => panic!("expected response frame, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_frame() {
        let json = serde_json::json!({
            "id": 7,
            "error": { "code": -32601, "message": "Method not found" }
        });
        match parse_frame(&json) {
            Some(Frame::Response { error: Some(err), .. }) => {
                assert_eq!(err.code, -32601);
                assert_eq!(err.message, "Method not found");
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_event_frame() {
        let json = serde_json::json!({
            "method": "Page.loadEventFired",
            "params": { "timestamp": 1.5 }
        });
        match parse_frame(&json) {
            Some(Frame::Event { method, params }) => {
                assert_eq!(method, "Page.loadEventFired");
                assert_eq!(params["timestamp"], 1.5);
            }
            other => panic!("expected event frame, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_with_id_is_never_an_event() {
        // A malformed peer could send both id and method; id wins.
        let json = serde_json::json!({
            "id": 3,
            "method": "Page.navigate",
            "result": {}
        });
        assert!(matches!(parse_frame(&json), Some(Frame::Response { id: 3, .. })));
    }

    #[test]
    fn test_parse_frame_rejects_garbage() {
        assert!(parse_frame(&serde_json::json!({ "params": {} })).is_none());
        assert!(parse_frame(&serde_json::json!(42)).is_none());
    }

    #[test]
    fn test_build_request_frame() {
        let frame = build_request_frame(
            9,
            "Page.navigate",
            &serde_json::json!({ "url": "https://example.com" }),
        );
        assert_eq!(frame["id"], 9);
        assert_eq!(frame["method"], "Page.navigate");
        assert_eq!(frame["params"]["url"], "https://example.com");
    }

    // -- Construction and state ----------------------------------------------

    #[test]
    fn test_new_session_validates_config() {
        let config = ConnectionConfig {
            port: 0,
            ..Default::default()
        };
        let err = Session::new(config).err().expect("must reject bad config");
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_new_session_starts_disconnected() {
        let session = Session::new(ConnectionConfig::default()).unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_command_without_attachment_fails() {
        let session = Session::new(ConnectionConfig::default()).unwrap();
        let err = session
            .command("Page.navigate", serde_json::json!({}), None)
            .await
            .err()
            .expect("must fail");
        assert_eq!(err.kind(), "not_attached");
    }

    #[tokio::test]
    async fn test_closed_session_rejects_commands() {
        let session = Session::new(ConnectionConfig::default()).unwrap();
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        let err = session
            .command("Page.navigate", serde_json::json!({}), None)
            .await
            .err()
            .expect("must fail");
        assert_eq!(err.kind(), "closed");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Disconnected.to_string(), "disconnected");
        assert_eq!(SessionState::Attached("T1".into()).to_string(), "attached(T1)");
    }

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let session = Session::new(ConnectionConfig::default()).unwrap();
        let sub = session.subscribe("Page.");
        assert_eq!(session.inner.subscribers.lock().unwrap().len(), 1);
        drop(sub);
        assert!(session.inner.subscribers.lock().unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_prefix_matching_and_order() {
        let session = Session::new(ConnectionConfig::default()).unwrap();
        let mut page_sub = session.subscribe("Page.");
        let mut all_sub = session.subscribe("");

        session.inner.broadcast(ProtocolEvent {
            method: "Page.loadEventFired".into(),
            params: Value::Null,
        });
        session.inner.broadcast(ProtocolEvent {
            method: "Network.requestWillBeSent".into(),
            params: Value::Null,
        });

        let got = page_sub.rx.try_recv().unwrap();
        assert_eq!(got.method, "Page.loadEventFired");
        assert!(page_sub.rx.try_recv().is_err(), "non-matching event leaked");

        assert_eq!(all_sub.rx.try_recv().unwrap().method, "Page.loadEventFired");
        assert_eq!(
            all_sub.rx.try_recv().unwrap().method,
            "Network.requestWillBeSent"
        );
    }

    #[test]
    fn test_fulfill_unknown_id_is_discarded() {
        let session = Session::new(ConnectionConfig::default()).unwrap();
        // Must not panic or disturb anything.
        session.inner.fulfill(99, Some(Value::Null), None);
        assert!(session.inner.pending.lock().unwrap().is_empty());
    }
}
