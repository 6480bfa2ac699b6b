//! Server configuration

use lwm2m_core::{DEFAULT_LIFETIME, DEFAULT_SERVER_PORT};
use serde::{Deserialize, Serialize};
use std::net::{Ipv6Addr, SocketAddr};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP port the CoAP endpoint listens on
    pub port: u16,
    /// Lifetime in seconds for registrations without an `lt` query
    pub default_lifetime: u32,
    /// First Location-Path segment of every registration
    pub location_prefix: String,
    /// Seconds a client may overrun its lifetime before it times out
    pub lifetime_grace: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            default_lifetime: DEFAULT_LIFETIME,
            location_prefix: "rd".to_string(),
            lifetime_grace: 0,
        }
    }
}

impl ServerConfig {
    /// Wildcard address to bind the endpoint to
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5683);
        assert_eq!(config.default_lifetime, 86400);
        assert_eq!(config.location_prefix, "rd");
        assert_eq!(config.listen_addr().port(), 5683);
    }
}
