//! Protocol-level enumerations and constants

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default UDP port a LWM2M server listens on
pub const DEFAULT_SERVER_PORT: u16 = 5683;

/// Default registration lifetime in seconds
pub const DEFAULT_LIFETIME: u32 = 86400;

/// Content formats understood by the LWM2M engine
///
/// The numeric values are carried in the CoAP Content-Format option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Plain text
    Text,
    /// Binary TLV
    Tlv,
    /// LWM2M-JSON (recognised but not supported)
    Json,
    /// Raw bytes
    Opaque,
}

impl ContentType {
    /// Map a numeric content format to a content type
    ///
    /// # Returns
    ///
    /// Returns `None` for formats outside the LWM2M range.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            1541 => Some(ContentType::Text),
            1542 => Some(ContentType::Tlv),
            1543 => Some(ContentType::Json),
            1544 => Some(ContentType::Opaque),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            ContentType::Text => 1541,
            ContentType::Tlv => 1542,
            ContentType::Json => 1543,
            ContentType::Opaque => 1544,
        }
    }
}

/// Transport binding a client declares when registering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BindingMode {
    /// UDP
    #[default]
    U,
    /// UDP with queue mode
    UQ,
    /// SMS
    S,
    /// SMS with queue mode
    SQ,
    /// UDP and SMS
    US,
    /// UDP with queue mode and SMS
    UQS,
    /// Anything not listed above
    Unknown,
}

impl BindingMode {
    /// Parse the `b=` query value of a registration
    ///
    /// Unrecognised strings map to `BindingMode::Unknown` instead of failing,
    /// so a registration with an exotic binding is still accepted.
    pub fn parse(s: &str) -> Self {
        match s {
            "U" => BindingMode::U,
            "UQ" => BindingMode::UQ,
            "S" => BindingMode::S,
            "SQ" => BindingMode::SQ,
            "US" => BindingMode::US,
            "UQS" => BindingMode::UQS,
            _ => BindingMode::Unknown,
        }
    }

    /// Query string form, `None` for `Unknown`
    pub const fn as_str(self) -> Option<&'static str> {
        match self {
            BindingMode::U => Some("U"),
            BindingMode::UQ => Some("UQ"),
            BindingMode::S => Some("S"),
            BindingMode::SQ => Some("SQ"),
            BindingMode::US => Some("US"),
            BindingMode::UQS => Some("UQS"),
            BindingMode::Unknown => None,
        }
    }

    /// True if the client is reachable through SMS
    pub const fn uses_sms(self) -> bool {
        matches!(
            self,
            BindingMode::S | BindingMode::SQ | BindingMode::US | BindingMode::UQS
        )
    }

    /// True if the client runs in queue mode
    pub const fn is_queued(self) -> bool {
        matches!(self, BindingMode::UQ | BindingMode::SQ | BindingMode::UQS)
    }
}

impl fmt::Display for BindingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().unwrap_or("unknown"))
    }
}

/// Lifecycle transition reported to registration monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationEvent {
    /// A client registered
    Register,
    /// A registered client sent an update
    Update,
    /// A client deregistered
    Unregister,
    /// A client's lifetime expired without an update
    Timeout,
}

impl fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationEvent::Register => "register",
            RegistrationEvent::Update => "update",
            RegistrationEvent::Unregister => "unregister",
            RegistrationEvent::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_codes() {
        assert_eq!(ContentType::from_u16(1542), Some(ContentType::Tlv));
        assert_eq!(ContentType::Opaque.to_u16(), 1544);
        assert_eq!(ContentType::from_u16(0), None);
    }

    #[test]
    fn test_binding_mode_parse() {
        assert_eq!(BindingMode::parse("UQS"), BindingMode::UQS);
        assert_eq!(BindingMode::parse("T"), BindingMode::Unknown);
        assert_eq!(BindingMode::US.as_str(), Some("US"));
        assert!(BindingMode::SQ.uses_sms());
        assert!(BindingMode::SQ.is_queued());
        assert!(!BindingMode::U.is_queued());
    }
}
