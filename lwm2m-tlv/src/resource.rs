//! Bridge between [`Resource`] and TLV entries

use crate::encoder::encode;
use crate::error::{Lwm2mError, Lwm2mResult};
use crate::types::{Tlv, TlvKind};
use crate::value::encode_value;
use bytes::Bytes;
use lwm2m_core::{Resource, ResourceDataType, ResourceKind};

/// Convert a resource to its TLV entry
///
/// A single resource becomes one `ResourceWithValue` entry. A multiple
/// resource becomes a `MultipleResource` entry wrapping one
/// `ResourceInstance` per value, numbered from 0 in value order.
///
/// # Errors
///
/// Returns `InvalidArgument` for a cleared resource.
pub fn encode_resource(resource: &Resource) -> Lwm2mResult<Tlv> {
    if resource.is_cleared() {
        return Err(Lwm2mError::InvalidArgument(format!(
            "resource {} is cleared",
            resource.id()
        )));
    }

    match resource.kind() {
        ResourceKind::Single => {
            let value = resource.value().ok_or_else(|| {
                Lwm2mError::InvalidArgument(format!("resource {} has no value", resource.id()))
            })?;
            Ok(Tlv::new(
                TlvKind::ResourceWithValue,
                resource.id(),
                encode_value(value),
            ))
        }
        ResourceKind::Multiple => {
            let instances = resource
                .values()
                .iter()
                .enumerate()
                .map(|(i, value)| {
                    let id = u16::try_from(i).map_err(|_| {
                        Lwm2mError::InvalidArgument(format!(
                            "resource {} has too many instances",
                            resource.id()
                        ))
                    })?;
                    Ok(Tlv::new(TlvKind::ResourceInstance, id, encode_value(value)))
                })
                .collect::<Lwm2mResult<Vec<_>>>()?;
            Ok(Tlv::new(
                TlvKind::MultipleResource,
                resource.id(),
                encode(&instances)?,
            ))
        }
    }
}

/// Convert a TLV entry back to a resource of the given data type
///
/// Resource instances of a multiple resource are ordered by ascending
/// instance id.
///
/// # Errors
///
/// Returns `TypeMismatch` if the entry is not a resource, a nested entry is
/// not a resource instance, or the content does not match `data_type`.
pub fn decode_resource(tlv: &Tlv, data_type: ResourceDataType) -> Lwm2mResult<Resource> {
    match tlv.kind {
        TlvKind::ResourceWithValue => {
            let value = tlv.to_value(data_type)?;
            Resource::new(tlv.id, 1, data_type, vec![value])
        }
        TlvKind::MultipleResource => {
            let mut instances = tlv.children()?;
            if let Some(bad) = instances.iter().find(|t| t.kind != TlvKind::ResourceInstance) {
                return Err(Lwm2mError::TypeMismatch(format!(
                    "multiple resource {} contains a {:?} entry",
                    tlv.id, bad.kind
                )));
            }
            instances.sort_by_key(|t| t.id);
            let values = instances
                .iter()
                .map(|t| t.to_value(data_type))
                .collect::<Lwm2mResult<Vec<_>>>()?;
            Resource::multiple(tlv.id, data_type, values)
        }
        kind => Err(Lwm2mError::TypeMismatch(format!(
            "{:?} entry {} is not a resource",
            kind, tlv.id
        ))),
    }
}

/// Build the object-instance entry holding `resources`
pub fn encode_instance(instance_id: u16, resources: &[Resource]) -> Lwm2mResult<Tlv> {
    let entries = resources
        .iter()
        .map(encode_resource)
        .collect::<Lwm2mResult<Vec<_>>>()?;
    Ok(Tlv::new(TlvKind::ObjectInstance, instance_id, encode(&entries)?))
}

/// Encode resources as a flat TLV payload
pub fn encode_resources(resources: &[Resource]) -> Lwm2mResult<Bytes> {
    let entries = resources
        .iter()
        .map(encode_resource)
        .collect::<Lwm2mResult<Vec<_>>>()?;
    encode(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use lwm2m_core::ResourceValue;

    fn round_trip(resource: &Resource) -> Resource {
        let tlv = encode_resource(resource).unwrap();
        let bytes = encode(std::slice::from_ref(&tlv)).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        decode_resource(&decoded[0], resource.data_type()).unwrap()
    }

    #[test]
    fn test_resource_round_trip_every_type() {
        let resources = vec![
            Resource::string(0, "Open Mobile Alliance"),
            Resource::int(1, -42),
            Resource::int(2, i64::MAX),
            Resource::float(3, 3.25),
            Resource::float(4, 0.1),
            Resource::bool(5, true),
            Resource::opaque(6, vec![0u8, 0xFF, 0x10]),
            Resource::time(7, 1_700_000_000),
            Resource::obj_link(8, 3, 0),
        ];
        for resource in &resources {
            assert_eq!(&round_trip(resource), resource);
        }
    }

    #[test]
    fn test_multiple_resource_round_trip() {
        let resource = Resource::new(
            11,
            3,
            ResourceDataType::Int,
            vec![ResourceValue::Int(0), ResourceValue::Int(300), ResourceValue::Int(-7)],
        )
        .unwrap();
        assert_eq!(round_trip(&resource), resource);

        let empty = Resource::multiple(11, ResourceDataType::String, vec![]).unwrap();
        assert_eq!(round_trip(&empty), empty);
    }

    #[test]
    fn test_multiple_resource_layout() {
        let resource = Resource::multiple(
            6,
            ResourceDataType::Int,
            vec![ResourceValue::Int(1), ResourceValue::Int(5)],
        )
        .unwrap();
        let tlv = encode_resource(&resource).unwrap();
        assert_eq!(tlv.kind, TlvKind::MultipleResource);
        assert_eq!(&tlv.content[..], &[0x41, 0x00, 0x01, 0x41, 0x01, 0x05]);
    }

    #[test]
    fn test_multiple_resource_sorted_by_instance() {
        let content = encode(&[
            Tlv::new(TlvKind::ResourceInstance, 2, vec![0x02]),
            Tlv::new(TlvKind::ResourceInstance, 0, vec![0x00]),
        ])
        .unwrap();
        let tlv = Tlv::new(TlvKind::MultipleResource, 11, content);
        let resource = decode_resource(&tlv, ResourceDataType::Int).unwrap();
        assert_eq!(resource.values(), &[ResourceValue::Int(0), ResourceValue::Int(2)]);
    }

    #[test]
    fn test_cleared_resource_is_not_encoded() {
        let mut resource = Resource::int(1, 1);
        resource.clear();
        assert!(encode_resource(&resource).is_err());
    }

    #[test]
    fn test_encode_instance() {
        let tlv = encode_instance(0, &[Resource::int(1, 5)]).unwrap();
        assert_eq!(tlv.kind, TlvKind::ObjectInstance);
        assert_eq!(tlv.children().unwrap()[0].to_int().unwrap(), 5);
    }
}
