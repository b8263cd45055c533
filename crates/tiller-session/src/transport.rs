//! WebSocket transport and debugging-target discovery.
//!
//! The transport owns exactly one WebSocket connection to a browser
//! debugging endpoint. It knows how to dial -- directly or through an HTTP
//! CONNECT proxy -- within the configured connect timeout, and how to list
//! the endpoint's debuggable targets over its `/json` HTTP surface. It has
//! no protocol semantics: frames in, frames out.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::{ConnectionConfig, ProxyConfig};
use crate::error::SessionError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a dialed connection.
pub type WsSink = SplitSink<WsStream, Message>;
/// Read half of a dialed connection.
pub type WsSource = SplitStream<WsStream>;

/// Maximum bytes accepted for a proxy CONNECT response header block.
const MAX_PROXY_RESPONSE: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// Target discovery
// ---------------------------------------------------------------------------

/// One debuggable target as reported by the endpoint's `/json/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    /// Target identifier.
    pub id: String,
    /// Target type ("page", "iframe", "service_worker", ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Page title, if any.
    #[serde(default)]
    pub title: String,
    /// Current URL of the target.
    #[serde(default)]
    pub url: String,
    /// Per-target debugging WebSocket URL.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub ws_url: String,
}

/// Browser-level metadata from `/json/version`.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointVersion {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
}

/// List the debuggable targets exposed by the endpoint.
pub async fn fetch_targets(config: &ConnectionConfig) -> Result<Vec<TargetInfo>, SessionError> {
    let url = format!("{}/json/list", config.http_base());
    let response = http_get(config, &url).await?;
    response
        .json::<Vec<TargetInfo>>()
        .await
        .map_err(|e| SessionError::Protocol {
            detail: format!("failed to parse target list: {e}"),
        })
}

/// Probe the endpoint's `/json/version`, verifying it is alive and speaks
/// the debugging protocol.
pub async fn fetch_version(config: &ConnectionConfig) -> Result<EndpointVersion, SessionError> {
    let url = format!("{}/json/version", config.http_base());
    let response = http_get(config, &url).await?;
    response
        .json::<EndpointVersion>()
        .await
        .map_err(|e| SessionError::Protocol {
            detail: format!("failed to parse endpoint version: {e}"),
        })
}

async fn http_get(
    config: &ConnectionConfig,
    url: &str,
) -> Result<reqwest::Response, SessionError> {
    let client = http_client(config)?;
    let response = tokio::time::timeout(config.connect_timeout, client.get(url).send())
        .await
        .map_err(|_| SessionError::Dial {
            url: url.to_string(),
            reason: format!("request timed out after {:?}", config.connect_timeout),
        })?
        .map_err(|e| SessionError::Dial {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    response.error_for_status().map_err(|e| SessionError::Dial {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Build an HTTP client honoring the configured proxy settings.
fn http_client(config: &ConnectionConfig) -> Result<reqwest::Client, SessionError> {
    let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);

    if config.no_proxy {
        builder = builder.no_proxy();
    } else if let Some(proxy) = &config.proxy {
        let port = required_proxy_port(proxy)?;
        let mut p = reqwest::Proxy::all(format!("http://{}:{}", proxy.host, port)).map_err(|e| {
            SessionError::Configuration {
                detail: format!("invalid proxy address: {e}"),
            }
        })?;
        if let Some(user) = &proxy.username {
            p = p.basic_auth(user, proxy.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(p);
    }

    builder.build().map_err(|e| SessionError::Protocol {
        detail: format!("failed to build HTTP client: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One dialed WebSocket connection to a debugging target.
pub struct Transport {
    stream: WsStream,
}

impl Transport {
    /// Dial a target's debugging WebSocket URL.
    ///
    /// Honors the config's proxy settings unless `no_proxy` is set. The
    /// whole dial -- TCP connect, optional CONNECT tunnel, WebSocket
    /// handshake -- is bounded by `connect_timeout`; it either completes in
    /// time or fails with [`SessionError::Dial`], never hanging past the
    /// deadline.
    pub async fn dial(config: &ConnectionConfig, ws_url: &str) -> Result<Self, SessionError> {
        let dial = async {
            match config.proxy_eligible() {
                Some(proxy) => dial_via_proxy(proxy, ws_url).await,
                None => dial_direct(ws_url).await,
            }
        };

        let stream = tokio::time::timeout(config.connect_timeout, dial)
            .await
            .map_err(|_| SessionError::Dial {
                url: ws_url.to_string(),
                reason: format!("dial timed out after {:?}", config.connect_timeout),
            })??;

        tracing::info!(url = ws_url, "debugging WebSocket connection established");
        Ok(Self { stream })
    }

    /// Split into write and read halves for the session's writer and
    /// receive loop.
    pub fn into_split(self) -> (WsSink, WsSource) {
        self.stream.split()
    }
}

async fn dial_direct(ws_url: &str) -> Result<WsStream, SessionError> {
    let (stream, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| SessionError::Dial {
            url: ws_url.to_string(),
            reason: e.to_string(),
        })?;
    Ok(stream)
}

async fn dial_via_proxy(proxy: &ProxyConfig, ws_url: &str) -> Result<WsStream, SessionError> {
    let proxy_port = required_proxy_port(proxy)?;
    let authority = ws_authority(ws_url)?;

    let mut tcp = TcpStream::connect((proxy.host.as_str(), proxy_port))
        .await
        .map_err(|e| SessionError::Dial {
            url: ws_url.to_string(),
            reason: format!("proxy {}:{} unreachable: {e}", proxy.host, proxy_port),
        })?;

    let request = build_connect_request(&authority, proxy.username.as_deref(), proxy.password.as_deref());
    tcp.write_all(request.as_bytes())
        .await
        .map_err(|e| SessionError::Dial {
            url: ws_url.to_string(),
            reason: format!("failed to send CONNECT: {e}"),
        })?;

    read_connect_response(&mut tcp, ws_url).await?;

    let (stream, _) = tokio_tungstenite::client_async(ws_url, MaybeTlsStream::Plain(tcp))
        .await
        .map_err(|e| SessionError::Dial {
            url: ws_url.to_string(),
            reason: format!("WebSocket handshake through proxy failed: {e}"),
        })?;

    tracing::debug!(url = ws_url, proxy = %proxy.host, "dialed through CONNECT tunnel");
    Ok(stream)
}

fn required_proxy_port(proxy: &ProxyConfig) -> Result<u16, SessionError> {
    proxy.port.ok_or_else(|| SessionError::Configuration {
        detail: format!("proxy host '{}' is set but proxy port is missing", proxy.host),
    })
}

/// Build the CONNECT request for tunneling to `authority` (host:port).
pub fn build_connect_request(
    authority: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> String {
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(user) = username {
        let credentials = format!("{user}:{}", password.unwrap_or(""));
        request.push_str(&format!(
            "Proxy-Authorization: Basic {}\r\n",
            B64.encode(credentials.as_bytes())
        ));
    }
    request.push_str("\r\n");
    request
}

/// Read the proxy's CONNECT response headers and verify a 200 status.
async fn read_connect_response(tcp: &mut TcpStream, ws_url: &str) -> Result<(), SessionError> {
    let mut buf = Vec::with_capacity(512);
    let mut byte = [0u8; 1];

    // Read byte-at-a-time until the end of the header block so no tunneled
    // bytes are consumed past the CRLFCRLF boundary.
    while !buf.ends_with(b"\r\n\r\n") {
        if buf.len() >= MAX_PROXY_RESPONSE {
            return Err(SessionError::Dial {
                url: ws_url.to_string(),
                reason: "proxy CONNECT response exceeded header size limit".to_string(),
            });
        }
        let n = tcp.read(&mut byte).await.map_err(|e| SessionError::Dial {
            url: ws_url.to_string(),
            reason: format!("failed to read CONNECT response: {e}"),
        })?;
        if n == 0 {
            return Err(SessionError::Dial {
                url: ws_url.to_string(),
                reason: "proxy closed the connection during CONNECT".to_string(),
            });
        }
        buf.push(byte[0]);
    }

    let header = String::from_utf8_lossy(&buf);
    let status_line = header.lines().next().unwrap_or_default();
    if !connect_status_ok(status_line) {
        return Err(SessionError::Dial {
            url: ws_url.to_string(),
            reason: format!("proxy refused CONNECT: {status_line}"),
        });
    }
    Ok(())
}

/// Whether a CONNECT status line reports success (2xx).
pub fn connect_status_ok(status_line: &str) -> bool {
    status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .is_some_and(|code| (200..300).contains(&code))
}

/// Extract the `host:port` authority from a `ws://` URL.
pub fn ws_authority(ws_url: &str) -> Result<String, SessionError> {
    let rest = ws_url
        .strip_prefix("ws://")
        .or_else(|| ws_url.strip_prefix("wss://"))
        .ok_or_else(|| SessionError::Protocol {
            detail: format!("not a WebSocket URL: {ws_url}"),
        })?;

    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(SessionError::Protocol {
            detail: format!("WebSocket URL has no authority: {ws_url}"),
        });
    }
    if authority.contains(':') {
        Ok(authority.to_string())
    } else {
        // Default WebSocket port when the URL omits it.
        let default_port = if ws_url.starts_with("wss://") { 443 } else { 80 };
        Ok(format!("{authority}:{default_port}"))
    }
}

/// Select a target matching `selector` from a discovery listing.
///
/// Matching order: exact target id, then URL prefix. An empty selector
/// picks the first "page" target.
pub fn select_target<'a>(targets: &'a [TargetInfo], selector: &str) -> Option<&'a TargetInfo> {
    if selector.is_empty() {
        return targets.iter().find(|t| t.kind == "page");
    }
    targets
        .iter()
        .find(|t| t.id == selector)
        .or_else(|| targets.iter().find(|t| t.url.starts_with(selector)))
}
