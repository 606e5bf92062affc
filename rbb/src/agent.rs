//! The on-robot agent.
//!
//! ARCHITECTURE
//! ============
//! Three tasks share one `Agent`:
//! - reconnect: keeps a socket to `/ws/agent/{robot_id}` open. Each new
//!   socket first carries `session_start`, then the offline buffer in order.
//! - collect: one collector snapshot per tick, sent as `telemetry`.
//! - heartbeat: host load and buffer depth every few seconds.
//!
//! The socket sink lives in `link`. Whoever holds that lock owns the
//! socket, and `connect_once` keeps it for the whole handshake and flush,
//! so live events can never overtake buffered ones. Lock order is always
//! `link` then `buffer`.
//!
//! LIFECYCLE
//! =========
//! The session id is minted once per agent run and sent again on every
//! reconnect, so the server resumes the same session. A reader task per
//! socket clears `link` when the server goes away or stops answering pings;
//! the next reconnect check notices. A `watch` channel stops all three tasks.
//!
//! ERROR HANDLING
//! ==============
//! Network errors never stop the agent. A failed or stalled send (bounded by
//! `send_timeout`) drops the socket and buffers the event; beyond
//! `buffer_max` new events are dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use events::{AgentErrorData, AgentEvent, EventError, HeartbeatData, TelemetryData};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collector::{Collector, CollectorError};
use crate::config::AgentConfig;
use crate::endpoint::{self, EndpointError};
use crate::host::{self, HostSampler};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("event encode failed: {0}")]
    Encode(#[from] EventError),
    #[error("websocket send stalled for {0:?}")]
    Timeout(Duration),
}

impl From<tokio_tungstenite::tungstenite::Error> for AgentError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connect(Box::new(error))
    }
}

// =============================================================================
// OFFLINE BUFFER
// =============================================================================

/// Encoded frames waiting for a connection, oldest first.
#[derive(Debug)]
pub struct OfflineBuffer {
    frames: VecDeque<String>,
    max: usize,
}

impl OfflineBuffer {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self { frames: VecDeque::new(), max }
    }

    /// Append a frame. Returns `false` (and drops the frame) when full.
    pub fn push(&mut self, frame: String) -> bool {
        if self.frames.len() >= self.max {
            return false;
        }
        self.frames.push_back(frame);
        true
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.frames.drain(..).collect()
    }

    /// Put frames that failed to flush back in front, keeping their order.
    pub fn requeue(&mut self, frames: Vec<String>) {
        for frame in frames.into_iter().rev() {
            self.frames.push_front(frame);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

// =============================================================================
// AGENT
// =============================================================================

/// Loop periods. Tests shrink these.
#[derive(Debug, Clone, Copy)]
pub struct AgentTimings {
    pub reconnect_check: Duration,
    pub retry_delay: Duration,
    pub heartbeat: Duration,
    /// Longest a single frame may take to reach the socket.
    pub send_timeout: Duration,
    /// Quiet time before the agent pings the server.
    pub ping_interval: Duration,
    /// How long to wait for any frame after a ping before giving up.
    pub ping_timeout: Duration,
}

impl Default for AgentTimings {
    fn default() -> Self {
        Self {
            reconnect_check: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
            heartbeat: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(20),
        }
    }
}

/// What happened to one outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Buffered,
    Dropped,
}

struct Link {
    sink: WsSink,
    generation: u64,
}

pub struct Agent {
    config: AgentConfig,
    session_id: Uuid,
    timings: AgentTimings,
    link: Mutex<Option<Link>>,
    buffer: Mutex<OfflineBuffer>,
    generation: AtomicU64,
}

impl Agent {
    #[must_use]
    pub fn new(config: AgentConfig) -> Arc<Self> {
        Self::with_timings(config, AgentTimings::default())
    }

    #[must_use]
    pub fn with_timings(config: AgentConfig, timings: AgentTimings) -> Arc<Self> {
        let buffer = OfflineBuffer::new(config.buffer_max);
        Arc::new(Self {
            config,
            session_id: Uuid::new_v4(),
            timings,
            link: Mutex::new(None),
            buffer: Mutex::new(buffer),
            generation: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    pub async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    pub async fn run(self: Arc<Self>, collector: Box<dyn Collector>, shutdown: watch::Receiver<bool>) {
        info!(
            robot_id = %self.config.robot_id,
            server = %self.config.server_url,
            session_id = %self.session_id,
            collector = collector.name(),
            hz = self.config.collection_hz,
            "agent starting"
        );

        let reconnect = tokio::spawn(Arc::clone(&self).reconnect_loop(shutdown.clone()));
        let collect = tokio::spawn(Arc::clone(&self).collect_loop(collector, shutdown.clone()));
        let heartbeat = tokio::spawn(Arc::clone(&self).heartbeat_loop(shutdown));

        let (reconnect, collect, heartbeat) = tokio::join!(reconnect, collect, heartbeat);
        for result in [reconnect, collect, heartbeat] {
            if let Err(e) = result {
                error!(error = %e, "agent task failed");
            }
        }

        self.close().await;
        let buffered = self.buffered().await;
        info!(buffered, "agent stopped");
    }

    /// Open a socket, announce the session, and flush the offline buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, the handshake fails, or the
    /// socket dies mid-flush (unsent frames go back in the buffer).
    pub async fn connect_once(self: &Arc<Self>) -> Result<(), AgentError> {
        let url = endpoint::agent_url(&self.config.server_url, &self.config.robot_id)?;
        info!(%url, "connecting");
        let (stream, _) = connect_async(url.as_str()).await?;
        let (mut sink, reader) = stream.split();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let mut link = self.link.lock().await;
        let start = events::encode(&self.session_start())?;
        send_frame(&mut sink, Message::Text(start.into()), self.timings.send_timeout).await?;

        let pending = {
            let mut buffer = self.buffer.lock().await;
            if !buffer.is_empty() {
                info!(count = buffer.len(), "flushing buffered events");
            }
            buffer.drain()
        };
        let mut pending = pending.into_iter();
        while let Some(frame) = pending.next() {
            if let Err(e) = send_frame(&mut sink, Message::Text(frame.clone().into()), self.timings.send_timeout).await {
                let mut unsent = vec![frame];
                unsent.extend(pending);
                self.buffer.lock().await.requeue(unsent);
                return Err(e);
            }
        }

        *link = Some(Link { sink, generation });
        drop(link);
        info!(session_id = %self.session_id, "connected");

        tokio::spawn(Arc::clone(self).watch_socket(reader, generation));
        Ok(())
    }

    /// Send one event now, or buffer it if there is no usable socket.
    pub async fn send_event(&self, event: &AgentEvent) -> Delivery {
        let frame = match events::encode(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!(kind = event.kind(), error = %e, "failed to encode event");
                return Delivery::Dropped;
            }
        };

        let mut link = self.link.lock().await;
        if let Some(active) = link.as_mut() {
            match send_frame(&mut active.sink, Message::Text(frame.clone().into()), self.timings.send_timeout).await {
                Ok(()) => return Delivery::Sent,
                Err(e) => {
                    warn!(error = %e, "send failed; buffering");
                    *link = None;
                }
            }
        }

        if self.buffer.lock().await.push(frame) {
            Delivery::Buffered
        } else {
            debug!(kind = event.kind(), "offline buffer full; event dropped");
            Delivery::Dropped
        }
    }

    /// Close the current socket, if any.
    pub async fn close(&self) {
        if let Some(mut link) = self.link.lock().await.take() {
            let _ = send_frame(&mut link.sink, Message::Close(None), self.timings.send_timeout).await;
            let _ = tokio::time::timeout(self.timings.send_timeout, link.sink.close()).await;
        }
    }

    /// Ping through the socket of `generation`. `false` if that socket is gone.
    async fn ping(&self, generation: u64) -> bool {
        let mut link = self.link.lock().await;
        let Some(active) = link.as_mut().filter(|l| l.generation == generation) else {
            return false;
        };
        match send_frame(&mut active.sink, Message::Ping(Vec::new().into()), self.timings.send_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "ping failed");
                *link = None;
                false
            }
        }
    }

    async fn watch_socket(self: Arc<Self>, mut reader: SplitStream<WsStream>, generation: u64) {
        let mut last_heard = Instant::now();
        let mut pinged_at: Option<Instant> = None;
        loop {
            let deadline = match pinged_at {
                Some(at) => at + self.timings.ping_timeout,
                None => last_heard + self.timings.ping_interval,
            };
            tokio::select! {
                message = reader.next() => match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        last_heard = Instant::now();
                        pinged_at = None;
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "socket read failed");
                        break;
                    }
                },
                () = tokio::time::sleep_until(deadline) => {
                    if pinged_at.is_some() {
                        warn!(timeout = ?self.timings.ping_timeout, "server stopped answering pings");
                        break;
                    }
                    if !self.ping(generation).await {
                        break;
                    }
                    pinged_at = Some(Instant::now());
                }
            }
        }

        let mut link = self.link.lock().await;
        if link.as_ref().is_some_and(|l| l.generation == generation) {
            *link = None;
            warn!("disconnected from server");
        }
    }

    async fn reconnect_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            if !self.is_connected().await
                && let Err(e) = self.connect_once().await
            {
                warn!(error = %e, retry_in = ?self.timings.retry_delay, "connection failed");
                if wait_or_shutdown(&mut shutdown, self.timings.retry_delay).await {
                    break;
                }
                continue;
            }
            if wait_or_shutdown(&mut shutdown, self.timings.reconnect_check).await {
                break;
            }
        }
    }

    async fn collect_loop(self: Arc<Self>, mut collector: Box<dyn Collector>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs_f64(1.0 / self.config.collection_hz);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            let event = match collector.snapshot() {
                Ok(data) => self.telemetry(data),
                Err(e) => {
                    warn!(error = %e, "collector failed");
                    self.collector_error(&e)
                }
            };
            self.send_event(&event).await;
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut load = HostSampler::new();
        load.cpu_percent();
        while !*shutdown.borrow() {
            if wait_or_shutdown(&mut shutdown, self.timings.heartbeat).await {
                break;
            }
            let data = HeartbeatData {
                cpu_percent: load.cpu_percent(),
                memory_percent: load.memory_percent(),
                buffer_size: self.buffered().await,
            };
            self.send_event(&AgentEvent::Heartbeat {
                session_id: Some(self.session_id),
                robot_id: Some(self.config.robot_id.clone()),
                timestamp: Some(OffsetDateTime::now_utc()),
                data,
            })
            .await;
        }
    }

    fn session_start(&self) -> AgentEvent {
        let mut metadata = Map::new();
        metadata.insert("agent_version".into(), Value::from(env!("CARGO_PKG_VERSION")));
        metadata.insert("hostname".into(), Value::from(host::hostname()));
        metadata.insert("platform".into(), Value::from(host::platform()));
        metadata.insert("share_failures".into(), Value::from(self.config.share_anonymized_failures));
        AgentEvent::SessionStart {
            session_id: Some(self.session_id),
            robot_id: Some(self.config.robot_id.clone()),
            timestamp: Some(OffsetDateTime::now_utc()),
            metadata,
        }
    }

    fn telemetry(&self, data: TelemetryData) -> AgentEvent {
        AgentEvent::Telemetry {
            session_id: Some(self.session_id),
            robot_id: Some(self.config.robot_id.clone()),
            timestamp: OffsetDateTime::now_utc(),
            data,
        }
    }

    fn collector_error(&self, error: &CollectorError) -> AgentEvent {
        AgentEvent::Error {
            session_id: Some(self.session_id),
            robot_id: Some(self.config.robot_id.clone()),
            timestamp: Some(OffsetDateTime::now_utc()),
            data: AgentErrorData { error_type: error.kind().to_owned(), error_msg: error.to_string() },
        }
    }
}

/// Send one frame, giving up after `limit`.
async fn send_frame(sink: &mut WsSink, message: Message, limit: Duration) -> Result<(), AgentError> {
    match tokio::time::timeout(limit, sink.send(message)).await {
        Ok(sent) => sent.map_err(AgentError::from),
        Err(_) => Err(AgentError::Timeout(limit)),
    }
}

/// Sleep for `period`; `true` if shutdown was requested meanwhile.
pub(crate) async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(period) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
#[path = "agent_test.rs"]
mod tests;
