//! Server URL helpers. Users may give either the HTTP or the WebSocket form
//! of the server address; every command derives the one it needs.

use events::{AGENT_WS_PREFIX, DASHBOARD_WS_PATH};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid server URL `{0}`: expected ws://, wss://, http:// or https://")]
pub struct EndpointError(pub String);

fn split(server: &str) -> Result<(bool, &str), EndpointError> {
    let server = server.trim().trim_end_matches('/');
    for (prefix, secure) in [("ws://", false), ("http://", false), ("wss://", true), ("https://", true)] {
        if let Some(rest) = server.strip_prefix(prefix) {
            if rest.is_empty() {
                break;
            }
            return Ok((secure, rest));
        }
    }
    Err(EndpointError(server.to_owned()))
}

/// `ws(s)://host[:port]` for the given server address.
///
/// # Errors
///
/// Returns an error for unsupported schemes or an empty host.
pub fn ws_base(server: &str) -> Result<String, EndpointError> {
    let (secure, rest) = split(server)?;
    Ok(format!("{}://{rest}", if secure { "wss" } else { "ws" }))
}

/// `http(s)://host[:port]` for the given server address.
///
/// # Errors
///
/// Returns an error for unsupported schemes or an empty host.
pub fn http_base(server: &str) -> Result<String, EndpointError> {
    let (secure, rest) = split(server)?;
    Ok(format!("{}://{rest}", if secure { "https" } else { "http" }))
}

/// Agent ingest socket URL for `robot_id`.
///
/// # Errors
///
/// Returns an error for an invalid server address.
pub fn agent_url(server: &str, robot_id: &str) -> Result<String, EndpointError> {
    Ok(format!("{}{AGENT_WS_PREFIX}/{robot_id}", ws_base(server)?))
}

/// Dashboard socket URL.
///
/// # Errors
///
/// Returns an error for an invalid server address.
pub fn dashboard_url(server: &str) -> Result<String, EndpointError> {
    Ok(format!("{}{DASHBOARD_WS_PATH}", ws_base(server)?))
}

#[cfg(test)]
#[path = "endpoint_test.rs"]
mod tests;
