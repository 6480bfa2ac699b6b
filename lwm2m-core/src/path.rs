use crate::error::{Lwm2mError, Lwm2mResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved identifier, never valid on the wire
pub const MAX_ID: u16 = 65535;

/// Path addressing an object, an object instance or a single resource
///
/// LWM2M paths have the shape `/{object_id}/{instance_id}/{resource_id}`
/// where the trailing segments are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Lwm2mPath {
    object_id: u16,
    instance_id: Option<u16>,
    resource_id: Option<u16>,
}

impl Lwm2mPath {
    /// Path addressing a whole object
    pub fn object(object_id: u16) -> Self {
        Self {
            object_id,
            instance_id: None,
            resource_id: None,
        }
    }

    /// Path addressing one object instance
    pub fn instance(object_id: u16, instance_id: u16) -> Self {
        Self {
            object_id,
            instance_id: Some(instance_id),
            resource_id: None,
        }
    }

    /// Path addressing a single resource of an instance
    pub fn resource(object_id: u16, instance_id: u16, resource_id: u16) -> Self {
        Self {
            object_id,
            instance_id: Some(instance_id),
            resource_id: Some(resource_id),
        }
    }

    /// Parse a path from its string form
    ///
    /// The leading slash is optional, so both `/3/0/1` and `3/0/1` are
    /// accepted. At most three segments are allowed.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for empty paths, extra segments, or
    /// segments that are not identifiers in `0..65535`.
    pub fn from_string(s: &str) -> Lwm2mResult<Self> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Err(Lwm2mError::InvalidArgument(format!("Empty LWM2M path: {:?}", s)));
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        Self::from_segments(&segments)
    }

    /// Build a path from URI path segments, as carried by a CoAP request
    ///
    /// # Errors
    /// Returns `InvalidArgument` if there are zero or more than three
    /// segments, or any segment is not a valid identifier.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Lwm2mResult<Self> {
        if segments.is_empty() || segments.len() > 3 {
            return Err(Lwm2mError::InvalidArgument(format!(
                "LWM2M path must have 1 to 3 segments, got {}",
                segments.len()
            )));
        }

        let mut ids = [None; 3];
        for (slot, segment) in ids.iter_mut().zip(segments) {
            *slot = Some(parse_id(segment.as_ref())?);
        }

        Ok(Self {
            object_id: ids[0].unwrap_or_default(),
            instance_id: ids[1],
            resource_id: ids[2],
        })
    }

    pub fn object_id(&self) -> u16 {
        self.object_id
    }

    pub fn instance_id(&self) -> Option<u16> {
        self.instance_id
    }

    pub fn resource_id(&self) -> Option<u16> {
        self.resource_id
    }

    /// True if the path stops at the object level
    pub fn is_object(&self) -> bool {
        self.instance_id.is_none()
    }

    /// True if the path addresses an instance (and no resource)
    pub fn is_instance(&self) -> bool {
        self.instance_id.is_some() && self.resource_id.is_none()
    }

    /// True if the path addresses a single resource
    pub fn is_resource(&self) -> bool {
        self.resource_id.is_some()
    }

    /// The path one level up, `None` for an object path
    pub fn parent(&self) -> Option<Self> {
        match (self.instance_id, self.resource_id) {
            (Some(instance_id), Some(_)) => Some(Self::instance(self.object_id, instance_id)),
            (Some(_), None) => Some(Self::object(self.object_id)),
            _ => None,
        }
    }

    /// True if `self` equals `other` or is one of its ancestors
    pub fn contains(&self, other: &Lwm2mPath) -> bool {
        if self.object_id != other.object_id {
            return false;
        }
        let instance_ok = match self.instance_id {
            None => true,
            Some(id) => other.instance_id == Some(id),
        };
        let resource_ok = match self.resource_id {
            None => true,
            Some(id) => other.resource_id == Some(id),
        };
        instance_ok && resource_ok
    }

    /// True if one of the two paths contains the other
    pub fn is_related(&self, other: &Lwm2mPath) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// URI path segments for this path
    pub fn to_segments(&self) -> Vec<String> {
        let mut segments = vec![self.object_id.to_string()];
        if let Some(instance_id) = self.instance_id {
            segments.push(instance_id.to_string());
        }
        if let Some(resource_id) = self.resource_id {
            segments.push(resource_id.to_string());
        }
        segments
    }
}

fn parse_id(segment: &str) -> Lwm2mResult<u16> {
    let id = segment
        .parse::<u16>()
        .map_err(|_| Lwm2mError::InvalidArgument(format!("Invalid path segment: {:?}", segment)))?;
    if id == MAX_ID {
        return Err(Lwm2mError::InvalidArgument(format!(
            "Path segment {} is reserved",
            MAX_ID
        )));
    }
    Ok(id)
}

impl FromStr for Lwm2mPath {
    type Err = Lwm2mError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl fmt::Display for Lwm2mPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.object_id)?;
        if let Some(instance_id) = self.instance_id {
            write!(f, "/{}", instance_id)?;
        }
        if let Some(resource_id) = self.resource_id {
            write!(f, "/{}", resource_id)?;
        }
        Ok(())
    }
}
