//! LWM2M Security object (Object ID: 0)
//!
//! Holds the URI of each server the client talks to and the Short Server ID
//! linking it to a Server object instance. Without bootstrap support the
//! object is read-only from the network; instances are added locally.
//!
//! # Resources
//!
//! - Resource 0: LWM2M Server URI (string)
//! - Resource 1: Bootstrap Server (bool)
//! - Resource 2: Security Mode (int, 3 = NoSec)
//! - Resource 10: Short Server ID (int)

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::object::{Lwm2mObject, Read};
use lwm2m_core::Resource;

pub const SECURITY_OBJECT_ID: u16 = 0;
pub const SERVER_URI: u16 = 0;
pub const BOOTSTRAP_SERVER: u16 = 1;
pub const SECURITY_MODE: u16 = 2;
pub const SHORT_SERVER_ID: u16 = 10;

/// Security mode without DTLS
pub const SECURITY_MODE_NO_SEC: i64 = 3;

/// One server account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityInstance {
    pub server_uri: String,
    pub bootstrap: bool,
    pub short_server_id: u16,
}

impl SecurityInstance {
    /// Account for a regular (non-bootstrap) server
    pub fn new(server_uri: impl Into<String>, short_server_id: u16) -> Self {
        Self {
            server_uri: server_uri.into(),
            bootstrap: false,
            short_server_id,
        }
    }
}

/// Security object definition
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityObject;

impl Read<SecurityInstance> for SecurityObject {
    fn read(&self, instance: &SecurityInstance, _iid: u16, rid: u16) -> Lwm2mResult<Resource> {
        match rid {
            SERVER_URI => Ok(Resource::string(rid, instance.server_uri.clone())),
            BOOTSTRAP_SERVER => Ok(Resource::bool(rid, instance.bootstrap)),
            SECURITY_MODE => Ok(Resource::int(rid, SECURITY_MODE_NO_SEC)),
            SHORT_SERVER_ID => Ok(Resource::int(rid, i64::from(instance.short_server_id))),
            3..=12 => Err(Lwm2mError::NotFound(format!("/0/{}", rid))),
            _ => Err(Lwm2mError::UnknownPath(format!("/0/{}", rid))),
        }
    }
}

impl Lwm2mObject for SecurityObject {
    type Instance = SecurityInstance;

    fn id(&self) -> u16 {
        SECURITY_OBJECT_ID
    }

    fn resource_count(&self) -> u16 {
        13
    }

    fn reader(&self) -> Option<&dyn Read<SecurityInstance>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ObjectRegistry;

    #[test]
    fn test_security_read_instance() {
        let mut registry = ObjectRegistry::new();
        registry.register(SecurityObject).unwrap();
        registry
            .add_instance(0, SecurityInstance::new("coap://[::1]:5683", 101))
            .unwrap();

        let resources = registry.read_instance(0, 0).unwrap();
        let ids: Vec<u16> = resources.iter().map(Resource::id).collect();
        assert_eq!(ids, vec![0, 1, 2, 10]);
        assert_eq!(
            registry.read_resource(0, 0, SHORT_SERVER_ID).unwrap(),
            Resource::int(10, 101)
        );
    }

    #[test]
    fn test_security_is_read_only() {
        let mut registry = ObjectRegistry::new();
        registry.register(SecurityObject).unwrap();
        registry.add_instance(0, SecurityInstance::new("coap://127.0.0.1", 1)).unwrap();
        let err = registry.write_resource(0, 0, &Resource::string(0, "x")).unwrap_err();
        assert!(matches!(err, Lwm2mError::Unsupported(_)));
    }
}
