//! Registered client information
//!
//! A [`ClientInfo`] is created when a client registers, refreshed by each
//! update and dropped on deregistration or lifetime expiry.

use lwm2m_core::BindingMode;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// An object announced by a client, with its instances
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientObject {
    pub(crate) id: u16,
    pub(crate) instances: Vec<u16>,
}

impl ClientObject {
    pub fn new(id: u16, instances: Vec<u16>) -> Self {
        Self { id, instances }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    /// Instance ids in ascending order, empty when only the object was listed
    pub fn instances(&self) -> &[u16] {
        &self.instances
    }
}

/// A registered client
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub(crate) name: String,
    /// Location-Path segments assigned at registration
    pub(crate) location: Vec<String>,
    pub(crate) sms: Option<String>,
    pub(crate) objects_path: Option<String>,
    pub(crate) lifetime: u32,
    pub(crate) binding: BindingMode,
    pub(crate) address: SocketAddr,
    pub(crate) objects: Vec<ClientObject>,
    pub(crate) last_seen: Instant,
}

impl ClientInfo {
    /// Endpoint client name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the registration, e.g. `/rd/4nJkq0Tz`
    pub fn location(&self) -> String {
        format!("/{}", self.location.join("/"))
    }

    pub fn sms(&self) -> Option<&str> {
        self.sms.as_deref()
    }

    /// Alternate path the client serves its objects under
    pub fn objects_path(&self) -> Option<&str> {
        self.objects_path.as_deref()
    }

    /// Lifetime in seconds
    pub fn lifetime(&self) -> u32 {
        self.lifetime
    }

    pub fn binding_mode(&self) -> BindingMode {
        self.binding
    }

    /// Address the last registration message came from
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn objects(&self) -> &[ClientObject] {
        &self.objects
    }

    pub fn object(&self, id: u16) -> Option<&ClientObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    /// Time of the last register or update
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub(crate) fn location_id(&self) -> Option<&str> {
        self.location.last().map(String::as_str)
    }

    pub(crate) fn expires_at(&self, grace: Duration) -> Instant {
        self.last_seen + Duration::from_secs(u64::from(self.lifetime)) + grace
    }

    /// Uri-Path segments addressing `path` segments on this client
    pub(crate) fn request_path(&self, segments: Vec<String>) -> Vec<String> {
        match self.objects_path.as_deref() {
            Some(prefix) => prefix
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .chain(segments)
                .collect(),
            None => segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(objects_path: Option<&str>) -> ClientInfo {
        ClientInfo {
            name: "dev".to_string(),
            location: vec!["rd".to_string(), "abc".to_string()],
            sms: None,
            objects_path: objects_path.map(str::to_string),
            lifetime: 60,
            binding: BindingMode::U,
            address: "127.0.0.1:40000".parse().unwrap(),
            objects: vec![ClientObject::new(3, vec![0])],
            last_seen: Instant::now(),
        }
    }

    #[test]
    fn test_location_and_expiry() {
        let info = info(None);
        assert_eq!(info.location(), "/rd/abc");
        assert_eq!(info.location_id(), Some("abc"));
        assert_eq!(
            info.expires_at(Duration::from_secs(5)),
            info.last_seen + Duration::from_secs(65)
        );
        assert_eq!(info.object(3).map(ClientObject::instances), Some(&[0u16][..]));
    }

    #[test]
    fn test_request_path_prefix() {
        let segments = vec!["3".to_string(), "0".to_string()];
        assert_eq!(info(None).request_path(segments.clone()), vec!["3", "0"]);
        assert_eq!(
            info(Some("/lwm2m/")).request_path(segments),
            vec!["lwm2m", "3", "0"]
        );
    }
}
