//! Core types and utilities for the LWM2M protocol
//!
//! This crate provides the error taxonomy, path addressing, protocol enums
//! and the typed resource model shared by every other crate of the
//! workspace.

pub mod error;
pub mod path;
pub mod types;
pub mod datatypes;

pub use error::{Lwm2mError, Lwm2mResult};
pub use path::Lwm2mPath;
pub use types::{BindingMode, ContentType, RegistrationEvent, DEFAULT_LIFETIME, DEFAULT_SERVER_PORT};
pub use datatypes::{ObjLink, Resource, ResourceDataType, ResourceKind, ResourceValue};
