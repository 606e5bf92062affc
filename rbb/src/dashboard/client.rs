//! Network side of the dashboard: REST queries and the live socket.
//!
//! LIFECYCLE
//! =========
//! `watch_live` connects to `/ws/dashboard`, subscribes to one robot, and
//! feeds every event into a `LiveFeed`. Any close or error marks the feed
//! disconnected; it reconnects after a fixed delay and subscribes again,
//! until shutdown.

use std::time::Duration;

use events::{
    DashboardCommand, DashboardEvent, EventError, FailureRecord, FailuresResponse, HealthResponse, RobotStatus,
    RobotsResponse, SessionSummary, SessionsResponse, TelemetryResponse,
};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{LiveFeed, Replay, render};
use crate::agent::wait_or_shutdown;
use crate::endpoint::{self, EndpointError};

/// Delay before a dropped dashboard socket is retried.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Failures fetched to seed the alert list before going live.
pub const SEED_FAILURES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error("invalid request url: {0}")]
    InvalidUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error(transparent)]
    Event(#[from] EventError),
}

impl From<tokio_tungstenite::tungstenite::Error> for DashboardError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}

// =============================================================================
// REST
// =============================================================================

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error for an unsupported server URL.
    pub fn new(server: &str) -> Result<Self, DashboardError> {
        Ok(Self { http: reqwest::Client::new(), base: endpoint::http_base(server)? })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, DashboardError> {
        let mut url =
            Url::parse(&format!("{}{path}", self.base)).map_err(|e| DashboardError::InvalidUrl(e.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }

        debug!(%url, "GET");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DashboardError::Status { url: url.to_string(), status: status.as_u16() });
        }
        Ok(response.json::<T>().await?)
    }

    /// # Errors
    ///
    /// Returns an error if the server is unreachable or unhealthy.
    pub async fn health(&self) -> Result<HealthResponse, DashboardError> {
        self.get("/api/health", &[]).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn sessions(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<SessionSummary>, DashboardError> {
        let params = list_params(robot_id, limit);
        let body: SessionsResponse = self.get("/api/sessions", &params).await?;
        Ok(body.sessions)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn failures(&self, robot_id: Option<&str>, limit: usize) -> Result<Vec<FailureRecord>, DashboardError> {
        let params = list_params(robot_id, limit);
        let body: FailuresResponse = self.get("/api/failures", &params).await?;
        Ok(body.failures)
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn telemetry(&self, session_id: Uuid, limit: Option<usize>) -> Result<TelemetryResponse, DashboardError> {
        let params = limit.map(|l| vec![("limit", l.to_string())]).unwrap_or_default();
        self.get(&format!("/api/sessions/{session_id}/telemetry"), &params).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn robots(&self) -> Result<Vec<RobotStatus>, DashboardError> {
        let body: RobotsResponse = self.get("/api/robots", &[]).await?;
        Ok(body.robots)
    }
}

fn list_params(robot_id: Option<&str>, limit: usize) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(2);
    if let Some(robot_id) = robot_id {
        params.push(("robot_id", robot_id.to_owned()));
    }
    params.push(("limit", limit.to_string()));
    params
}

// =============================================================================
// LIVE
// =============================================================================

/// Stream one robot's live events into `feed` until shutdown, reconnecting
/// after `reconnect_delay` whenever the socket drops.
///
/// # Errors
///
/// Returns an error only for an unsupported server URL.
pub async fn watch_live<F>(
    server: &str,
    robot_id: &str,
    feed: &mut LiveFeed,
    reconnect_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut emit: F,
) -> Result<(), DashboardError>
where
    F: FnMut(&str),
{
    let url = endpoint::dashboard_url(server)?;

    while !*shutdown.borrow() {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                feed.set_connected(true);
                info!(%url, %robot_id, "dashboard connected");
                emit(&render::status_line(feed.connection(), robot_id));
                if let Err(e) = stream_events(stream, robot_id, feed, &mut shutdown, &mut emit).await {
                    warn!(error = %e, "dashboard socket failed");
                }
                feed.set_connected(false);
            }
            Err(e) => warn!(%url, error = %e, "dashboard connect failed"),
        }

        if *shutdown.borrow() {
            break;
        }
        emit(&render::status_line(feed.connection(), robot_id));
        if wait_or_shutdown(&mut shutdown, reconnect_delay).await {
            break;
        }
    }
    Ok(())
}

async fn stream_events<F>(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    robot_id: &str,
    feed: &mut LiveFeed,
    shutdown: &mut watch::Receiver<bool>,
    emit: &mut F,
) -> Result<(), DashboardError>
where
    F: FnMut(&str),
{
    let (mut sink, mut stream) = stream.split();
    let subscribe = events::encode(&DashboardCommand::Subscribe { robot_id: Some(robot_id.to_owned()) })?;
    sink.send(Message::Text(subscribe.into())).await?;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match events::decode::<DashboardEvent>(text.as_str()) {
                    Ok(event) => {
                        feed.apply(&event);
                        if let Some(line) = render::event_line(&event) {
                            emit(&line);
                        }
                    }
                    Err(e) => debug!(error = %e, "ignoring undecodable dashboard event"),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

// =============================================================================
// REPLAY
// =============================================================================

/// Play `replay` from `start` to the end, one point per `step`.
pub async fn play<F>(replay: &mut Replay, start: usize, step: Duration, mut shutdown: watch::Receiver<bool>, mut emit: F)
where
    F: FnMut(&str),
{
    replay.seek(start);
    emit(&render::replay_line(replay));
    let (position, total) = replay.position();
    if position < total {
        replay.toggle();
    }

    while replay.is_playing() {
        if wait_or_shutdown(&mut shutdown, step).await {
            break;
        }
        if replay.tick() {
            emit(&render::replay_line(replay));
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
