//! Data types used in the LWM2M resource model

pub mod resource;

pub use resource::{ObjLink, Resource, ResourceDataType, ResourceKind, ResourceValue};
