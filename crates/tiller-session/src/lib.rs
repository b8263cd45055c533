//! Tiller protocol session layer for browser debugging automation.
//!
//! This crate drives a Chromium-family browser over its remote debugging
//! protocol: JSON request/response frames plus asynchronous events over a
//! single WebSocket. It provides:
//!
//! - Target discovery over the endpoint's HTTP `/json` surface
//! - Direct and HTTP-CONNECT-proxied WebSocket dialing
//! - A multiplexed [`Session`] that correlates concurrent commands by id
//! - Prefix-filtered event subscriptions with bounded per-subscriber queues
//! - Transparent reconnect with a bounded, constant-delay retry schedule,
//!   re-attaching and re-applying standing init scripts on success
//! - A typed command surface (navigate, evaluate, click, screenshot, DOM
//!   queries) over the raw frames
//!
//! # Architecture
//!
//! The crate is split into layers:
//!
//! - **`transport`**: endpoint discovery, dialing, and the raw socket.
//! - **`session`**: the correlator, event fan-out, and the reconnect
//!   supervisor. One receive loop per live connection.
//! - **`commands`**: typed wrappers over individual protocol commands.
//!
//! # Browser Setup
//!
//! The browser must expose its debugging endpoint:
//!
//! ```sh
//! chromium --remote-debugging-port=9222
//! ```
//!
//! # Example (conceptual)
//!
//! ```ignore
//! use tiller_session::{ConnectionConfig, Session};
//!
//! let session = Session::new(ConnectionConfig::default())?;
//! session.connect().await?;
//! session.attach("").await?;
//! session.navigate("https://example.com").await?;
//! session.wait_for_load(std::time::Duration::from_secs(10)).await?;
//! let title = session.title().await?;
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod retry;
pub mod session;
pub mod transport;

// Re-export key types at the crate root for convenience.
pub use commands::{ElementBox, NodeId};
pub use config::{ConnectionConfig, ProxyConfig};
pub use error::SessionError;
pub use retry::RetryPolicy;
pub use session::{EventSubscription, ProtocolEvent, Session, SessionState};
pub use transport::{EndpointVersion, TargetInfo};
