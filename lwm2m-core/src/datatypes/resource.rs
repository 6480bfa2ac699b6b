//! Typed resource values
//!
//! A [`Resource`] is one slot of an object instance. It holds either a single
//! value or an ordered list of values (a multiple-instance resource), all of
//! the same [`ResourceDataType`].

use crate::error::{Lwm2mError, Lwm2mResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to an object instance, carried by `ObjLink` resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjLink {
    pub object_id: u16,
    pub instance_id: u16,
}

impl ObjLink {
    pub fn new(object_id: u16, instance_id: u16) -> Self {
        Self {
            object_id,
            instance_id,
        }
    }
}

impl fmt::Display for ObjLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.object_id, self.instance_id)
    }
}

/// Data type of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceDataType {
    String,
    Int,
    Float,
    Bool,
    Opaque,
    /// Seconds since the Unix epoch
    Time,
    ObjLink,
    /// No value, the state of a cleared resource
    None,
}

/// Whether a resource holds one value or many
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Single,
    Multiple,
}

/// A single typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResourceValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Opaque(#[serde(with = "serde_bytes")] Vec<u8>),
    Time(i64),
    ObjLink(ObjLink),
}

impl ResourceValue {
    /// Data type tag matching this value
    pub fn data_type(&self) -> ResourceDataType {
        match self {
            ResourceValue::String(_) => ResourceDataType::String,
            ResourceValue::Int(_) => ResourceDataType::Int,
            ResourceValue::Float(_) => ResourceDataType::Float,
            ResourceValue::Bool(_) => ResourceDataType::Bool,
            ResourceValue::Opaque(_) => ResourceDataType::Opaque,
            ResourceValue::Time(_) => ResourceDataType::Time,
            ResourceValue::ObjLink(_) => ResourceDataType::ObjLink,
        }
    }

    pub fn as_str(&self) -> Lwm2mResult<&str> {
        match self {
            ResourceValue::String(s) => Ok(s),
            other => Err(mismatch("string", other)),
        }
    }

    /// Integer view, also accepted for `Time` values
    pub fn as_int(&self) -> Lwm2mResult<i64> {
        match self {
            ResourceValue::Int(v) | ResourceValue::Time(v) => Ok(*v),
            other => Err(mismatch("int", other)),
        }
    }

    pub fn as_float(&self) -> Lwm2mResult<f64> {
        match self {
            ResourceValue::Float(v) => Ok(*v),
            other => Err(mismatch("float", other)),
        }
    }

    pub fn as_bool(&self) -> Lwm2mResult<bool> {
        match self {
            ResourceValue::Bool(v) => Ok(*v),
            other => Err(mismatch("bool", other)),
        }
    }

    /// Raw bytes of an opaque or string value
    pub fn as_bytes(&self) -> Lwm2mResult<&[u8]> {
        match self {
            ResourceValue::Opaque(v) => Ok(v),
            ResourceValue::String(s) => Ok(s.as_bytes()),
            other => Err(mismatch("opaque", other)),
        }
    }

    pub fn as_obj_link(&self) -> Lwm2mResult<ObjLink> {
        match self {
            ResourceValue::ObjLink(v) => Ok(*v),
            other => Err(mismatch("objlink", other)),
        }
    }
}

fn mismatch(expected: &str, got: &ResourceValue) -> Lwm2mError {
    Lwm2mError::TypeMismatch(format!("expected {}, got {:?}", expected, got.data_type()))
}

impl From<String> for ResourceValue {
    fn from(v: String) -> Self {
        ResourceValue::String(v)
    }
}

impl From<&str> for ResourceValue {
    fn from(v: &str) -> Self {
        ResourceValue::String(v.to_string())
    }
}

impl From<i64> for ResourceValue {
    fn from(v: i64) -> Self {
        ResourceValue::Int(v)
    }
}

impl From<f64> for ResourceValue {
    fn from(v: f64) -> Self {
        ResourceValue::Float(v)
    }
}

impl From<bool> for ResourceValue {
    fn from(v: bool) -> Self {
        ResourceValue::Bool(v)
    }
}

impl From<Vec<u8>> for ResourceValue {
    fn from(v: Vec<u8>) -> Self {
        ResourceValue::Opaque(v)
    }
}

impl From<ObjLink> for ResourceValue {
    fn from(v: ObjLink) -> Self {
        ResourceValue::ObjLink(v)
    }
}

/// One resource of an object instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    id: u16,
    kind: ResourceKind,
    data_type: ResourceDataType,
    values: Vec<ResourceValue>,
}

impl Resource {
    /// Create a resource holding `count` values of `data_type`
    ///
    /// A resource with more than one value is a multiple-instance resource.
    ///
    /// # Arguments
    ///
    /// * `id` - Resource id inside its instance
    /// * `count` - Number of values, must equal `values.len()`
    /// * `data_type` - Declared type of every value
    /// * `values` - The values, in instance order
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `count` is zero, `data_type` is `None`,
    /// `count` differs from the number of values, or a value does not match
    /// `data_type`.
    pub fn new(
        id: u16,
        count: usize,
        data_type: ResourceDataType,
        values: Vec<ResourceValue>,
    ) -> Lwm2mResult<Self> {
        if count == 0 {
            return Err(Lwm2mError::InvalidArgument(
                "Resource value count must be at least 1".to_string(),
            ));
        }
        if values.len() != count {
            return Err(Lwm2mError::InvalidArgument(format!(
                "Resource {} declares {} values but {} were given",
                id,
                count,
                values.len()
            )));
        }
        let kind = if count > 1 {
            ResourceKind::Multiple
        } else {
            ResourceKind::Single
        };
        Self::checked(id, kind, data_type, values)
    }

    /// Create a multiple-instance resource
    ///
    /// Unlike [`Resource::new`] the value list may be empty or hold a single
    /// value; the resource is still encoded as a multiple resource.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `data_type` is `None` or a value does not
    /// match `data_type`.
    pub fn multiple(
        id: u16,
        data_type: ResourceDataType,
        values: Vec<ResourceValue>,
    ) -> Lwm2mResult<Self> {
        Self::checked(id, ResourceKind::Multiple, data_type, values)
    }

    fn checked(
        id: u16,
        kind: ResourceKind,
        data_type: ResourceDataType,
        values: Vec<ResourceValue>,
    ) -> Lwm2mResult<Self> {
        if data_type == ResourceDataType::None {
            return Err(Lwm2mError::InvalidArgument(format!(
                "Resource {} needs a data type",
                id
            )));
        }
        if let Some(bad) = values.iter().find(|v| v.data_type() != data_type) {
            return Err(Lwm2mError::InvalidArgument(format!(
                "Resource {} is {:?} but holds a {:?} value",
                id,
                data_type,
                bad.data_type()
            )));
        }
        Ok(Self {
            id,
            kind,
            data_type,
            values,
        })
    }

    fn single(id: u16, value: ResourceValue) -> Self {
        Self {
            id,
            kind: ResourceKind::Single,
            data_type: value.data_type(),
            values: vec![value],
        }
    }

    pub fn string(id: u16, value: impl Into<String>) -> Self {
        Self::single(id, ResourceValue::String(value.into()))
    }

    pub fn int(id: u16, value: i64) -> Self {
        Self::single(id, ResourceValue::Int(value))
    }

    pub fn float(id: u16, value: f64) -> Self {
        Self::single(id, ResourceValue::Float(value))
    }

    pub fn bool(id: u16, value: bool) -> Self {
        Self::single(id, ResourceValue::Bool(value))
    }

    pub fn opaque(id: u16, value: impl Into<Vec<u8>>) -> Self {
        Self::single(id, ResourceValue::Opaque(value.into()))
    }

    pub fn time(id: u16, seconds: i64) -> Self {
        Self::single(id, ResourceValue::Time(seconds))
    }

    pub fn obj_link(id: u16, object_id: u16, instance_id: u16) -> Self {
        Self::single(id, ResourceValue::ObjLink(ObjLink::new(object_id, instance_id)))
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn data_type(&self) -> ResourceDataType {
        self.data_type
    }

    pub fn values(&self) -> &[ResourceValue] {
        &self.values
    }

    /// First value, the only one of a single resource
    pub fn value(&self) -> Option<&ResourceValue> {
        self.values.first()
    }

    pub fn is_multiple(&self) -> bool {
        self.kind == ResourceKind::Multiple
    }

    /// Release every value
    ///
    /// A cleared resource has no values and a `None` data type; it must be
    /// re-initialised before being encoded again.
    pub fn clear(&mut self) {
        self.values.clear();
        self.values.shrink_to_fit();
        self.data_type = ResourceDataType::None;
    }

    pub fn is_cleared(&self) -> bool {
        self.data_type == ResourceDataType::None
    }
}
