//! Registration monitor and observer bookkeeping
//!
//! Several observers may watch the same path of the same client. They share
//! one protocol-level observation, established for the first observer and
//! cancelled with the last.

use lwm2m_core::Lwm2mPath;
use lwm2m_transport::Token;
use std::fmt;

/// Handle of a registration monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorId(pub(crate) u64);

/// Handle of an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor#{}", self.0)
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// One protocol-level observation and the observers sharing it
pub(crate) struct Observation<C> {
    pub client: String,
    pub path: Lwm2mPath,
    /// Token of the GET that established the observation
    pub token: Token,
    pub observers: Vec<(ObserverId, C)>,
}

impl<C> Observation<C> {
    pub fn new(client: impl Into<String>, path: Lwm2mPath, token: Token) -> Self {
        Self {
            client: client.into(),
            path,
            token,
            observers: Vec::new(),
        }
    }

    pub fn matches(&self, client: &str, path: &Lwm2mPath) -> bool {
        self.client == client && self.path == *path
    }

    pub fn holds(&self, id: ObserverId) -> bool {
        self.observers.iter().any(|(observer, _)| *observer == id)
    }

    /// Remove an observer
    ///
    /// # Returns
    /// `true` if it was present
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer, _)| *observer != id);
        self.observers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_membership() {
        let mut observation: Observation<()> = Observation::new("dev", Lwm2mPath::resource(3, 0, 0), 9);
        observation.observers.push((ObserverId(1), ()));
        observation.observers.push((ObserverId(2), ()));

        assert!(observation.matches("dev", &Lwm2mPath::resource(3, 0, 0)));
        assert!(!observation.matches("dev", &Lwm2mPath::resource(3, 0, 1)));
        assert!(observation.holds(ObserverId(2)));
        assert!(observation.remove(ObserverId(1)));
        assert!(!observation.remove(ObserverId(1)));
        assert_eq!(observation.observers.len(), 1);
    }
}
