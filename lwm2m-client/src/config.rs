//! Client configuration and builder
//!
//! [`ClientConfig`] holds the settings shared by every server registration.
//! Per-server settings (lifetime, binding) live in the Server object.
//!
//! # Usage Example
//! ```rust
//! use lwm2m_client::ClientBuilder;
//!
//! let config = ClientBuilder::new()
//!     .name("urn:dev:os:0023C7-000001")
//!     .objects_path("lwm2m")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.name, "urn:dev:os:0023C7-000001");
//! ```

use crate::error::{Lwm2mError, Lwm2mResult};
use serde::{Deserialize, Serialize};

/// Fraction of the lifetime after which an update is sent
pub const DEFAULT_UPDATE_RATIO: f64 = 0.9;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint client name sent as the `ep` query
    pub name: String,
    /// Alternate path the objects are served under, if any
    pub objects_path: Option<String>,
    /// MSISDN sent as the `sms` query
    pub sms: Option<String>,
    /// Fraction of the lifetime to wait before each update, in `(0, 1]`
    pub update_ratio: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            objects_path: None,
            sms: None,
            update_ratio: DEFAULT_UPDATE_RATIO,
        }
    }
}

impl ClientConfig {
    /// Check the configuration
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the name is empty or the update ratio is
    /// outside `(0, 1]`.
    pub fn validate(&self) -> Lwm2mResult<()> {
        if self.name.is_empty() {
            return Err(Lwm2mError::InvalidArgument(
                "client name must not be empty".to_string(),
            ));
        }
        if !(self.update_ratio > 0.0 && self.update_ratio <= 1.0) {
            return Err(Lwm2mError::InvalidArgument(format!(
                "update ratio {} outside (0, 1]",
                self.update_ratio
            )));
        }
        Ok(())
    }
}

/// Builder for [`ClientConfig`]
///
/// Provides a fluent API for configuring the client. All settings except
/// the name have defaults.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint client name
    ///
    /// # Arguments
    /// * `name` - Name the client registers under, unique per server
    ///
    /// # Returns
    /// Self for method chaining
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Serve the objects under an alternate path
    ///
    /// # Returns
    /// Self for method chaining
    ///
    /// # Note
    /// The path is announced as `</path>;rt="oma.lwm2m"` at the head of the
    /// registration payload.
    pub fn objects_path(mut self, path: impl Into<String>) -> Self {
        self.config.objects_path = Some(path.into());
        self
    }

    /// Set the MSISDN announced for SMS bindings
    ///
    /// # Returns
    /// Self for method chaining
    pub fn sms(mut self, msisdn: impl Into<String>) -> Self {
        self.config.sms = Some(msisdn.into());
        self
    }

    /// Set the fraction of the lifetime after which updates are sent
    ///
    /// # Returns
    /// Self for method chaining
    ///
    /// # Note
    /// Default is 0.9, leaving a tenth of the lifetime for the update to
    /// reach the server.
    pub fn update_ratio(mut self, ratio: f64) -> Self {
        self.config.update_ratio = ratio;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Returns `InvalidArgument` if:
    /// - The name is empty
    /// - The update ratio is outside `(0, 1]`
    pub fn build(self) -> Lwm2mResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ClientBuilder::new().name("dev").build().unwrap();
        assert_eq!(config.update_ratio, DEFAULT_UPDATE_RATIO);
        assert!(config.objects_path.is_none());
        assert!(config.sms.is_none());
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, Lwm2mError::InvalidArgument(_)));
    }

    #[test]
    fn test_builder_rejects_bad_ratio() {
        assert!(ClientBuilder::new().name("dev").update_ratio(0.0).build().is_err());
        assert!(ClientBuilder::new().name("dev").update_ratio(1.5).build().is_err());
        assert!(ClientBuilder::new().name("dev").update_ratio(1.0).build().is_ok());
    }
}
