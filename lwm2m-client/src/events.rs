//! Client registration events
//!
//! Events are queued by the client engine as registrations change and are
//! drained with [`crate::Lwm2mClient::poll_event`].

/// A change in the registration with one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The server accepted the registration
    Registered {
        short_server_id: u16,
        /// Location assigned by the server
        location: String,
    },

    /// The server accepted an update
    Updated { short_server_id: u16 },

    /// A deregistration request was sent
    ///
    /// Deregistration is best-effort: this event does not wait for the reply.
    Deregistered { short_server_id: u16 },

    /// Registration could not be established
    ///
    /// The account stays unregistered until the client is restarted.
    RegistrationFailed {
        short_server_id: u16,
        /// Error description
        error: String,
    },

    /// An update was rejected or could not be sent
    ///
    /// The registration is kept and the update retried later.
    UpdateFailed {
        short_server_id: u16,
        /// Error description
        error: String,
    },

    /// The server no longer knows the registration
    ///
    /// A fresh registration has been sent.
    RegistrationLost { short_server_id: u16 },
}

impl ClientEvent {
    /// Short Server ID of the account the event belongs to
    pub fn short_server_id(&self) -> u16 {
        match self {
            Self::Registered { short_server_id, .. }
            | Self::Updated { short_server_id }
            | Self::Deregistered { short_server_id }
            | Self::RegistrationFailed { short_server_id, .. }
            | Self::UpdateFailed { short_server_id, .. }
            | Self::RegistrationLost { short_server_id } => *short_server_id,
        }
    }
}
