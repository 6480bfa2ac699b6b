//! Registration state of one server account

/// Registration state with one server
///
/// ```text
/// Unregistered -> Registering -> Registered <-> Updating
///                                    |
///                                    v
///                              Deregistering -> Unregistered
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegistrationState {
    /// No registration exists on the server
    #[default]
    Unregistered,
    /// Registration request sent, waiting for the reply
    Registering,
    /// Registered, next update scheduled
    Registered,
    /// Update request sent, waiting for the reply
    Updating,
    /// Deregistration request sent
    Deregistering,
}

impl RegistrationState {
    /// Whether the server holds a registration for this client
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::Updating)
    }

    /// Whether a registration request is outstanding
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Registering | Self::Updating | Self::Deregistering)
    }

    /// Whether an update may be sent right now
    #[must_use]
    pub const fn can_update(self) -> bool {
        matches!(self, Self::Registered)
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unregistered => "unregistered",
            Self::Registering => "registering",
            Self::Registered => "registered",
            Self::Updating => "updating",
            Self::Deregistering => "deregistering",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!RegistrationState::Unregistered.is_registered());
        assert!(RegistrationState::Registering.is_pending());
        assert!(!RegistrationState::Registering.is_registered());
        assert!(RegistrationState::Updating.is_registered());
        assert!(RegistrationState::Registered.can_update());
        assert!(!RegistrationState::Updating.can_update());
        assert_eq!(RegistrationState::default(), RegistrationState::Unregistered);
    }
}
