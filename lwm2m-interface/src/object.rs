//! Object capability traits
//!
//! An object exposes only the operations it implements. Each operation is a
//! separate trait and [`Lwm2mObject`] hands out the ones it supports; an
//! accessor returning `None` means the operation is unsupported, which is
//! distinct from an operation that runs and fails.
//!
//! # Usage
//!
//! ```rust,no_run
//! use lwm2m_core::{Lwm2mError, Lwm2mResult, Resource};
//! use lwm2m_interface::object::{Lwm2mObject, Read};
//!
//! struct Temperature;
//! struct Sensor { celsius: f64 }
//!
//! impl Read<Sensor> for Temperature {
//!     fn read(&self, sensor: &Sensor, _iid: u16, rid: u16) -> Lwm2mResult<Resource> {
//!         match rid {
//!             5700 => Ok(Resource::float(5700, sensor.celsius)),
//!             _ => Err(Lwm2mError::UnknownPath(format!("/3303/{}", rid))),
//!         }
//!     }
//! }
//!
//! impl Lwm2mObject for Temperature {
//!     type Instance = Sensor;
//!     fn id(&self) -> u16 { 3303 }
//!     fn resource_count(&self) -> u16 { 5701 }
//!     fn reader(&self) -> Option<&dyn Read<Sensor>> { Some(self) }
//! }
//! ```

use crate::error::{Lwm2mError, Lwm2mResult};
use lwm2m_core::{ContentType, Resource, ResourceValue};
use lwm2m_tlv::Tlv;
use std::fmt;

/// Operation an object may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    WriteResource,
    WriteTlv,
    Execute,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::WriteResource => "write",
            Operation::WriteTlv => "write_tlv",
            Operation::Execute => "execute",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Creates instance data from a server request
pub trait Create<I> {
    fn create(&mut self, instance_id: u16, content_type: ContentType, content: &[u8])
        -> Lwm2mResult<I>;
}

/// Reads one resource of an instance
///
/// Return `Err(NotFound)` for a resource that exists but is empty and
/// `Err(UnknownPath)` for a resource id the object does not define; both are
/// skipped when a whole instance is read.
pub trait Read<I> {
    fn read(&self, instance: &I, instance_id: u16, resource_id: u16) -> Lwm2mResult<Resource>;
}

/// Writes one resource of an instance
pub trait WriteResource<I> {
    fn write_resource(&mut self, instance: &mut I, instance_id: u16, resource: &Resource)
        -> Lwm2mResult<()>;
}

/// Writes resources of an instance from decoded TLV entries
///
/// TLV carries no type information, so the object converts each entry with
/// the `Tlv::to_*` helpers according to its own schema.
pub trait WriteTlv<I> {
    fn write_tlv(&mut self, instance: &mut I, instance_id: u16, tlvs: &[Tlv]) -> Lwm2mResult<()>;
}

/// Executes an executable resource
pub trait Execute<I> {
    fn execute(&mut self, instance: &mut I, instance_id: u16, resource_id: u16, args: &[u8])
        -> Lwm2mResult<()>;
}

/// Releases an instance before it is removed
///
/// The instance is only removed when this returns `Ok`.
pub trait Delete<I> {
    fn delete(&mut self, instance: &mut I, instance_id: u16) -> Lwm2mResult<()>;
}

/// An LWM2M object definition
pub trait Lwm2mObject: Send + 'static {
    /// Per-instance data owned by the instance arena
    type Instance: Send + 'static;

    fn id(&self) -> u16;

    /// Number of resource ids a whole-instance read walks through
    fn resource_count(&self) -> u16;

    fn creator(&mut self) -> Option<&mut dyn Create<Self::Instance>> {
        None
    }

    fn reader(&self) -> Option<&dyn Read<Self::Instance>> {
        None
    }

    fn resource_writer(&mut self) -> Option<&mut dyn WriteResource<Self::Instance>> {
        None
    }

    fn tlv_writer(&mut self) -> Option<&mut dyn WriteTlv<Self::Instance>> {
        None
    }

    fn executor(&mut self) -> Option<&mut dyn Execute<Self::Instance>> {
        None
    }

    fn deleter(&mut self) -> Option<&mut dyn Delete<Self::Instance>> {
        None
    }
}

/// Integer carried by a written resource
///
/// Text writes arrive as string resources, so decimal strings are accepted.
pub fn int_value(resource: &Resource) -> Lwm2mResult<i64> {
    match resource.value() {
        Some(ResourceValue::String(s)) => s.trim().parse().map_err(|_| {
            Lwm2mError::TypeMismatch(format!("resource {} is not an integer: {:?}", resource.id(), s))
        }),
        Some(value) => value.as_int(),
        None => Err(Lwm2mError::InvalidArgument(format!(
            "resource {} has no value",
            resource.id()
        ))),
    }
}

/// Boolean carried by a written resource, accepting "0"/"1" text
pub fn bool_value(resource: &Resource) -> Lwm2mResult<bool> {
    match resource.value() {
        Some(ResourceValue::String(s)) => match s.trim() {
            "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(Lwm2mError::TypeMismatch(format!(
                "resource {} is not a boolean: {:?}",
                resource.id(),
                other
            ))),
        },
        Some(value) => value.as_bool(),
        None => Err(Lwm2mError::InvalidArgument(format!(
            "resource {} has no value",
            resource.id()
        ))),
    }
}

/// Text carried by a written resource
pub fn string_value(resource: &Resource) -> Lwm2mResult<String> {
    match resource.value() {
        Some(ResourceValue::String(s)) => Ok(s.clone()),
        Some(ResourceValue::Opaque(bytes)) => String::from_utf8(bytes.clone()).map_err(|_| {
            Lwm2mError::TypeMismatch(format!("resource {} is not valid UTF-8", resource.id()))
        }),
        Some(other) => Err(Lwm2mError::TypeMismatch(format!(
            "resource {} holds {:?}, not text",
            resource.id(),
            other.data_type()
        ))),
        None => Err(Lwm2mError::InvalidArgument(format!(
            "resource {} has no value",
            resource.id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_value_accepts_text() {
        assert_eq!(int_value(&Resource::string(1, " 300 ")).unwrap(), 300);
        assert_eq!(int_value(&Resource::int(1, 7)).unwrap(), 7);
        assert!(int_value(&Resource::string(1, "abc")).is_err());
    }

    #[test]
    fn test_bool_value() {
        assert!(bool_value(&Resource::string(6, "1")).unwrap());
        assert!(!bool_value(&Resource::bool(6, false)).unwrap());
        assert!(bool_value(&Resource::string(6, "yes")).is_err());
    }

    #[test]
    fn test_string_value() {
        assert_eq!(string_value(&Resource::opaque(7, b"UQ".to_vec())).unwrap(), "UQ");
        assert!(string_value(&Resource::int(7, 1)).is_err());
    }
}
