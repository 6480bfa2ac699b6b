//! LWM2M object model
//!
//! This crate provides the object capability traits, the instance arena the
//! client engine dispatches into, and the standard Security, Server and
//! Device objects.

pub mod error;
pub mod object;
pub mod registry;
pub mod security;
pub mod server;
pub mod device;

pub use error::{Lwm2mError, Lwm2mResult};
pub use object::{Create, Delete, Execute, Lwm2mObject, Operation, Read, WriteResource, WriteTlv};
pub use registry::ObjectRegistry;
pub use security::{SecurityInstance, SecurityObject};
pub use server::{ServerInstance, ServerObject};
pub use device::{DeviceInstance, DeviceObject};
