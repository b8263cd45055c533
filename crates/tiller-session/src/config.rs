//! Connection configuration for the protocol session layer.
//!
//! A [`ConnectionConfig`] describes how to reach one browser debugging
//! endpoint: host, port, timeouts, the retry bound, and optional proxy
//! settings. The configuration is immutable once a session is constructed
//! and is validated up front so that misconfiguration fails fast instead of
//! surfacing as a confusing dial error later.

use std::time::Duration;

use crate::error::SessionError;

/// Default debugging endpoint host.
const DEFAULT_HOST: &str = "127.0.0.1";
/// Default Chrome remote-debugging port.
const DEFAULT_PORT: u16 = 9222;
/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default per-command timeout.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of redial attempts after a lost connection.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default delay between redial attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Proxy settings for dialing the debugging endpoint.
///
/// The port is optional at the type level so that a partially-configured
/// proxy can be represented and rejected with a clear configuration error,
/// rather than silently attempting a nonsensical connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host name or address.
    pub host: String,
    /// Proxy port. Required whenever `host` is set.
    pub port: Option<u16>,
    /// Optional username for Basic proxy authentication.
    pub username: Option<String>,
    /// Optional password for Basic proxy authentication.
    pub password: Option<String>,
}

/// Configuration for one browser debugging connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Debugging endpoint host.
    pub host: String,
    /// Debugging endpoint port (1-65535).
    pub port: u16,
    /// Maximum time to wait for a dial to complete.
    pub connect_timeout: Duration,
    /// Default deadline for a single command round trip.
    pub command_timeout: Duration,
    /// How many redials to attempt after a lost connection.
    pub max_retries: u32,
    /// Delay between redial attempts (constant, not exponential).
    pub retry_delay: Duration,
    /// Optional proxy to tunnel the connection through.
    pub proxy: Option<ProxyConfig>,
    /// When set, ignore `proxy` and always dial directly.
    pub no_proxy: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            proxy: None,
            no_proxy: false,
        }
    }
}

impl ConnectionConfig {
    /// Validate the configuration.
    ///
    /// Checks:
    /// - host is non-empty
    /// - port is in [1, 65535]
    /// - connect and command timeouts and the retry delay are > 0
    /// - a proxy host requires a proxy port
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.host.trim().is_empty() {
            return Err(SessionError::Configuration {
                detail: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(SessionError::Configuration {
                detail: "port must be in [1, 65535]".to_string(),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(SessionError::Configuration {
                detail: "connect_timeout must be greater than zero".to_string(),
            });
        }
        if self.command_timeout.is_zero() {
            return Err(SessionError::Configuration {
                detail: "command_timeout must be greater than zero".to_string(),
            });
        }
        if self.retry_delay.is_zero() {
            return Err(SessionError::Configuration {
                detail: "retry_delay must be greater than zero".to_string(),
            });
        }
        if let Some(proxy) = &self.proxy {
            if proxy.host.trim().is_empty() {
                return Err(SessionError::Configuration {
                    detail: "proxy host must not be empty when a proxy is configured".to_string(),
                });
            }
            if proxy.port.is_none() {
                return Err(SessionError::Configuration {
                    detail: format!("proxy host '{}' is set but proxy port is missing", proxy.host),
                });
            }
        }
        Ok(())
    }

    /// The HTTP base URL of the debugging endpoint (for `/json` discovery).
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Whether dialing should go through the configured proxy.
    pub fn proxy_eligible(&self) -> Option<&ProxyConfig> {
        if self.no_proxy {
            None
        } else {
            self.proxy.as_ref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ConnectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9222);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_port_rejected() {
        let config = ConnectionConfig {
            port: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_empty_host_rejected() {
        let config = ConnectionConfig {
            host: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = ConnectionConfig {
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            command_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConnectionConfig {
            retry_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proxy_host_without_port_rejected() {
        let config = ConnectionConfig {
            proxy: Some(ProxyConfig {
                host: "proxy.internal".to_string(),
                port: None,
                username: None,
                password: None,
            }),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("proxy port is missing"));
    }

    #[test]
    fn test_complete_proxy_accepted() {
        let config = ConnectionConfig {
            proxy: Some(ProxyConfig {
                host: "proxy.internal".to_string(),
                port: Some(3128),
                username: Some("user".to_string()),
                password: Some("secret".to_string()),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.proxy_eligible().is_some());
    }

    #[test]
    fn test_no_proxy_overrides_proxy() {
        let config = ConnectionConfig {
            proxy: Some(ProxyConfig {
                host: "proxy.internal".to_string(),
                port: Some(3128),
                ..Default::default()
            }),
            no_proxy: true,
            ..Default::default()
        };
        assert!(config.proxy_eligible().is_none());
    }

    #[test]
    fn test_http_base() {
        let config = ConnectionConfig {
            host: "10.0.0.5".to_string(),
            port: 9333,
            ..Default::default()
        };
        assert_eq!(config.http_base(), "http://10.0.0.5:9333");
    }
}
