//! LWM2M Server object (Object ID: 1)
//!
//! Per-server registration parameters. The lifetime, notification storing
//! and binding resources are writable; executing the Registration Update
//! Trigger asks the client to send an update to that server.
//!
//! # Resources
//!
//! - Resource 0: Short Server ID (int, read-only)
//! - Resource 1: Lifetime (int, seconds)
//! - Resource 6: Notification Storing When Disabled or Offline (bool)
//! - Resource 7: Binding (string)
//! - Resource 8: Registration Update Trigger (executable)

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::object::{bool_value, int_value, string_value, Execute, Lwm2mObject, Read, WriteResource, WriteTlv};
use lwm2m_core::{BindingMode, Resource, DEFAULT_LIFETIME};
use lwm2m_tlv::{Tlv, TlvKind};

pub const SERVER_OBJECT_ID: u16 = 1;
pub const SHORT_SERVER_ID: u16 = 0;
pub const LIFETIME: u16 = 1;
pub const NOTIFICATION_STORING: u16 = 6;
pub const BINDING: u16 = 7;
pub const REGISTRATION_UPDATE_TRIGGER: u16 = 8;

/// Registration parameters for one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInstance {
    pub short_server_id: u16,
    pub lifetime: u32,
    pub notification_storing: bool,
    pub binding: BindingMode,
}

impl ServerInstance {
    pub fn new(short_server_id: u16) -> Self {
        Self {
            short_server_id,
            lifetime: DEFAULT_LIFETIME,
            notification_storing: false,
            binding: BindingMode::U,
        }
    }

    pub fn with_lifetime(mut self, lifetime: u32) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_binding(mut self, binding: BindingMode) -> Self {
        self.binding = binding;
        self
    }
}

fn read_only(rid: u16) -> Lwm2mError {
    Lwm2mError::Unsupported(format!("/1/x/{} is read-only", rid))
}

fn parse_lifetime(value: i64) -> Lwm2mResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|lt| *lt > 0)
        .ok_or_else(|| Lwm2mError::InvalidArgument(format!("invalid lifetime {}", value)))
}

fn parse_binding(value: &str) -> Lwm2mResult<BindingMode> {
    match BindingMode::parse(value) {
        BindingMode::Unknown => Err(Lwm2mError::InvalidArgument(format!(
            "invalid binding {:?}",
            value
        ))),
        binding => Ok(binding),
    }
}

/// Server object definition
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerObject;

impl Read<ServerInstance> for ServerObject {
    fn read(&self, instance: &ServerInstance, _iid: u16, rid: u16) -> Lwm2mResult<Resource> {
        match rid {
            SHORT_SERVER_ID => Ok(Resource::int(rid, i64::from(instance.short_server_id))),
            LIFETIME => Ok(Resource::int(rid, i64::from(instance.lifetime))),
            NOTIFICATION_STORING => Ok(Resource::bool(rid, instance.notification_storing)),
            BINDING => Ok(Resource::string(rid, instance.binding.as_str().unwrap_or("U"))),
            2..=5 => Err(Lwm2mError::NotFound(format!("/1/{}", rid))),
            // executable, nothing to read
            REGISTRATION_UPDATE_TRIGGER => Err(Lwm2mError::NotFound(format!("/1/{}", rid))),
            _ => Err(Lwm2mError::UnknownPath(format!("/1/{}", rid))),
        }
    }
}

impl WriteResource<ServerInstance> for ServerObject {
    fn write_resource(&mut self, instance: &mut ServerInstance, _iid: u16, resource: &Resource)
        -> Lwm2mResult<()> {
        match resource.id() {
            LIFETIME => instance.lifetime = parse_lifetime(int_value(resource)?)?,
            NOTIFICATION_STORING => instance.notification_storing = bool_value(resource)?,
            BINDING => instance.binding = parse_binding(&string_value(resource)?)?,
            rid @ (SHORT_SERVER_ID | REGISTRATION_UPDATE_TRIGGER) => return Err(read_only(rid)),
            rid => return Err(Lwm2mError::UnknownPath(format!("/1/{}", rid))),
        }
        Ok(())
    }
}

impl WriteTlv<ServerInstance> for ServerObject {
    fn write_tlv(&mut self, instance: &mut ServerInstance, _iid: u16, tlvs: &[Tlv])
        -> Lwm2mResult<()> {
        // all or nothing
        let mut updated = instance.clone();
        for tlv in tlvs {
            if tlv.kind != TlvKind::ResourceWithValue {
                return Err(Lwm2mError::TypeMismatch(format!(
                    "unexpected {:?} entry {} in server instance",
                    tlv.kind, tlv.id
                )));
            }
            match tlv.id {
                LIFETIME => updated.lifetime = parse_lifetime(tlv.to_int()?)?,
                NOTIFICATION_STORING => updated.notification_storing = tlv.to_bool()?,
                BINDING => updated.binding = parse_binding(&tlv.to_text()?)?,
                // replacing the instance may resend its id unchanged
                SHORT_SERVER_ID if tlv.to_int()? == i64::from(instance.short_server_id) => {}
                rid @ (SHORT_SERVER_ID | REGISTRATION_UPDATE_TRIGGER) => return Err(read_only(rid)),
                rid => return Err(Lwm2mError::UnknownPath(format!("/1/{}", rid))),
            }
        }
        *instance = updated;
        Ok(())
    }
}

impl Execute<ServerInstance> for ServerObject {
    fn execute(&mut self, _instance: &mut ServerInstance, _iid: u16, rid: u16, _args: &[u8])
        -> Lwm2mResult<()> {
        match rid {
            REGISTRATION_UPDATE_TRIGGER => Ok(()),
            0..=7 => Err(Lwm2mError::Unsupported(format!("/1/x/{} is not executable", rid))),
            _ => Err(Lwm2mError::UnknownPath(format!("/1/{}", rid))),
        }
    }
}

impl Lwm2mObject for ServerObject {
    type Instance = ServerInstance;

    fn id(&self) -> u16 {
        SERVER_OBJECT_ID
    }

    fn resource_count(&self) -> u16 {
        9
    }

    fn reader(&self) -> Option<&dyn Read<ServerInstance>> {
        Some(self)
    }

    fn resource_writer(&mut self) -> Option<&mut dyn WriteResource<ServerInstance>> {
        Some(self)
    }

    fn tlv_writer(&mut self) -> Option<&mut dyn WriteTlv<ServerInstance>> {
        Some(self)
    }

    fn executor(&mut self) -> Option<&mut dyn Execute<ServerInstance>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ObjectRegistry;
    use lwm2m_tlv::{encode_int, Tlv};

    fn registry() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        registry.register(ServerObject).unwrap();
        registry.add_instance(1, ServerInstance::new(101).with_lifetime(60)).unwrap();
        registry
    }

    #[test]
    fn test_server_write_lifetime_text() {
        let mut registry = registry();
        registry.write_resource(1, 0, &Resource::string(LIFETIME, "300")).unwrap();
        assert_eq!(registry.instance::<ServerInstance>(1, 0).unwrap().lifetime, 300);
    }

    #[test]
    fn test_server_write_tlv_is_atomic() {
        let mut registry = registry();
        let tlvs = vec![
            Tlv::new(TlvKind::ResourceWithValue, LIFETIME, encode_int(120)),
            Tlv::new(TlvKind::ResourceWithValue, BINDING, &b"XX"[..]),
        ];
        assert!(registry.write_tlv(1, 0, &tlvs).is_err());
        assert_eq!(registry.instance::<ServerInstance>(1, 0).unwrap().lifetime, 60);

        let tlvs = vec![
            Tlv::new(TlvKind::ResourceWithValue, SHORT_SERVER_ID, encode_int(101)),
            Tlv::new(TlvKind::ResourceWithValue, LIFETIME, encode_int(120)),
            Tlv::new(TlvKind::ResourceWithValue, BINDING, &b"UQ"[..]),
        ];
        registry.write_tlv(1, 0, &tlvs).unwrap();
        let instance = registry.instance::<ServerInstance>(1, 0).unwrap();
        assert_eq!(instance.lifetime, 120);
        assert_eq!(instance.binding, BindingMode::UQ);
    }

    #[test]
    fn test_server_short_id_read_only() {
        let mut registry = registry();
        let err = registry
            .write_resource(1, 0, &Resource::int(SHORT_SERVER_ID, 5))
            .unwrap_err();
        assert!(matches!(err, Lwm2mError::Unsupported(_)));
    }

    #[test]
    fn test_server_update_trigger() {
        let mut registry = registry();
        registry.execute(1, 0, REGISTRATION_UPDATE_TRIGGER, &[]).unwrap();
        assert!(registry.execute(1, 0, LIFETIME, &[]).is_err());
    }

    #[test]
    fn test_server_rejects_zero_lifetime() {
        let mut registry = registry();
        assert!(registry.write_resource(1, 0, &Resource::int(LIFETIME, 0)).is_err());
    }
}
