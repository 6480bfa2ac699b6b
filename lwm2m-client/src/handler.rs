//! Dispatch of server requests into the object registry
//!
//! | Method | Object   | Instance        | Resource          |
//! |--------|----------|-----------------|-------------------|
//! | GET    | read     | read            | read (observe)    |
//! | PUT    | -        | write TLV       | write             |
//! | POST   | create   | write TLV       | execute           |
//! | DELETE | -        | delete          | -                 |
//!
//! Reads are always answered in TLV. Errors become the matching CoAP
//! response code and never reach the caller.

use crate::error::{Lwm2mError, Lwm2mResult};
use bytes::Bytes;
use log::debug;
use lwm2m_core::{ContentType, Lwm2mPath, Resource};
use lwm2m_interface::registry::ObjectRegistry;
use lwm2m_interface::server::{REGISTRATION_UPDATE_TRIGGER, SERVER_OBJECT_ID, SHORT_SERVER_ID};
use lwm2m_tlv::{decode, encode, encode_instance, encode_resource, Tlv, TlvKind};
use lwm2m_transport::{CoapMethod, CoapRequest, CoapResponse, ResponseCode, OBSERVE_DEREGISTER, OBSERVE_REGISTER};

/// Follow-up work for the client after a request was served
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    None,
    /// Start observing the path for the requesting server
    Observe(Lwm2mPath),
    /// Stop the requesting server's observation of the path
    CancelObserve(Lwm2mPath),
    /// Values at the path were written
    Changed(Lwm2mPath),
    /// An instance was created
    Created(Lwm2mPath),
    /// An instance was deleted
    Deleted(Lwm2mPath),
    /// Registration Update Trigger executed for a Short Server ID
    UpdateTrigger(u16),
}

/// Read a path and encode it as TLV
///
/// A resource becomes one resource TLV, an instance one ObjectInstance TLV
/// and an object a sequence of ObjectInstance TLVs.
///
/// # Errors
/// Returns `UnknownPath` for an unregistered object, `NotFound` for a
/// missing instance or empty resource, and any error of the object's read
/// capability.
pub fn read_path(objects: &ObjectRegistry, path: &Lwm2mPath) -> Lwm2mResult<Bytes> {
    let oid = path.object_id();
    match (path.instance_id(), path.resource_id()) {
        (Some(iid), Some(rid)) => {
            let resource = objects.read_resource(oid, iid, rid)?;
            encode(&[encode_resource(&resource)?])
        }
        (Some(iid), None) => {
            let resources = objects.read_instance(oid, iid)?;
            encode(&[encode_instance(iid, &resources)?])
        }
        _ => {
            if !objects.contains_object(oid) {
                return Err(Lwm2mError::UnknownPath(path.to_string()));
            }
            let mut instances = Vec::new();
            for iid in objects.instance_ids(oid) {
                let resources = objects.read_instance(oid, iid)?;
                instances.push(encode_instance(iid, &resources)?);
            }
            encode(&instances)
        }
    }
}

/// Serve one request
pub(crate) fn dispatch(
    objects: &mut ObjectRegistry,
    request: &CoapRequest,
    path: Lwm2mPath,
) -> (CoapResponse, Effect) {
    debug!("{:?} {}", request.method, path);

    let result = match request.method {
        CoapMethod::Get => return handle_get(objects, request, path),
        CoapMethod::Put => handle_put(objects, request, path),
        CoapMethod::Post => handle_post(objects, request, path),
        CoapMethod::Delete => handle_delete(objects, path),
    };
    match result {
        Ok(served) => served,
        Err(e) => {
            debug!("{:?} {} failed: {}", request.method, path, e);
            (CoapResponse::from_error(&e), Effect::None)
        }
    }
}

fn handle_get(objects: &ObjectRegistry, request: &CoapRequest, path: Lwm2mPath)
    -> (CoapResponse, Effect) {
    let effect = match request.observe {
        Some(OBSERVE_REGISTER) => Effect::Observe(path),
        Some(OBSERVE_DEREGISTER) => Effect::CancelObserve(path),
        _ => Effect::None,
    };
    match read_path(objects, &path) {
        Ok(payload) => {
            let mut response = CoapResponse::content(ContentType::Tlv, payload);
            if matches!(effect, Effect::Observe(_)) {
                response.observe = Some(0);
            }
            (response, effect)
        }
        Err(e) => {
            debug!("Read {} failed: {}", path, e);
            // a failed read never starts an observation
            let effect = match effect {
                Effect::CancelObserve(_) => effect,
                _ => Effect::None,
            };
            (CoapResponse::from_error(&e), effect)
        }
    }
}

fn handle_put(objects: &mut ObjectRegistry, request: &CoapRequest, path: Lwm2mPath)
    -> Lwm2mResult<(CoapResponse, Effect)> {
    let oid = path.object_id();
    match (path.instance_id(), path.resource_id()) {
        (Some(iid), Some(rid)) => write_resource_path(objects, request, oid, iid, rid)?,
        (Some(iid), None) => write_instance_path(objects, request, oid, iid)?,
        _ => return Err(Lwm2mError::Unsupported(format!("PUT on object {}", path))),
    }
    Ok((CoapResponse::new(ResponseCode::CHANGED), Effect::Changed(path)))
}

fn handle_post(objects: &mut ObjectRegistry, request: &CoapRequest, path: Lwm2mPath)
    -> Lwm2mResult<(CoapResponse, Effect)> {
    let oid = path.object_id();
    match (path.instance_id(), path.resource_id()) {
        (Some(iid), Some(rid)) => {
            objects.execute(oid, iid, rid, &request.payload)?;
            let effect = if oid == SERVER_OBJECT_ID && rid == REGISTRATION_UPDATE_TRIGGER {
                update_trigger(objects, iid)
            } else {
                Effect::None
            };
            Ok((CoapResponse::new(ResponseCode::CHANGED), effect))
        }
        (Some(iid), None) => {
            write_instance_path(objects, request, oid, iid)?;
            Ok((CoapResponse::new(ResponseCode::CHANGED), Effect::Changed(path)))
        }
        _ => {
            let iid = create(objects, request, oid)?;
            let created = Lwm2mPath::instance(oid, iid);
            let mut response = CoapResponse::new(ResponseCode::CREATED);
            response.location_path = created.to_segments();
            Ok((response, Effect::Created(created)))
        }
    }
}

fn handle_delete(objects: &mut ObjectRegistry, path: Lwm2mPath)
    -> Lwm2mResult<(CoapResponse, Effect)> {
    match (path.instance_id(), path.resource_id()) {
        (Some(iid), None) => {
            objects.delete_instance(path.object_id(), iid)?;
            Ok((CoapResponse::new(ResponseCode::DELETED), Effect::Deleted(path)))
        }
        _ => Err(Lwm2mError::Unsupported(format!("DELETE on {}", path))),
    }
}

/// Content type of a request payload
fn payload_type(request: &CoapRequest) -> Lwm2mResult<ContentType> {
    let code = request
        .content_format
        .ok_or_else(|| Lwm2mError::InvalidArgument("missing content format".to_string()))?;
    match ContentType::from_u16(code) {
        Some(ContentType::Json) | None => Err(Lwm2mError::UnsupportedContentType(code)),
        Some(content_type) => Ok(content_type),
    }
}

fn write_resource_path(
    objects: &mut ObjectRegistry,
    request: &CoapRequest,
    oid: u16,
    iid: u16,
    rid: u16,
) -> Lwm2mResult<()> {
    match payload_type(request)? {
        ContentType::Tlv => {
            let tlvs = decode(&request.payload)?;
            if let Some(other) = tlvs.iter().find(|t| t.id != rid) {
                return Err(Lwm2mError::InvalidArgument(format!(
                    "entry {} written to resource {}",
                    other.id, rid
                )));
            }
            objects.write_tlv(oid, iid, &tlvs)
        }
        ContentType::Text => {
            let text = std::str::from_utf8(&request.payload)
                .map_err(|_| Lwm2mError::InvalidArgument("text payload is not UTF-8".to_string()))?;
            objects.write_resource(oid, iid, &Resource::string(rid, text))
        }
        ContentType::Opaque => {
            objects.write_resource(oid, iid, &Resource::opaque(rid, request.payload.to_vec()))
        }
        ContentType::Json => Err(Lwm2mError::UnsupportedContentType(ContentType::Json.to_u16())),
    }
}

fn write_instance_path(objects: &mut ObjectRegistry, request: &CoapRequest, oid: u16, iid: u16)
    -> Lwm2mResult<()> {
    let content_type = payload_type(request)?;
    if content_type != ContentType::Tlv {
        return Err(Lwm2mError::UnsupportedContentType(content_type.to_u16()));
    }
    let tlvs = instance_entries(&request.payload, iid)?;
    objects.write_tlv(oid, iid, &tlvs)
}

/// Resource entries of an instance payload
///
/// The payload is either the resource entries themselves or a single
/// ObjectInstance entry wrapping them.
fn instance_entries(payload: &[u8], iid: u16) -> Lwm2mResult<Vec<Tlv>> {
    let tlvs = decode(payload)?;
    match tlvs.as_slice() {
        [single] if single.kind == TlvKind::ObjectInstance => {
            if single.id != iid {
                return Err(Lwm2mError::InvalidArgument(format!(
                    "instance {} written to instance {}",
                    single.id, iid
                )));
            }
            single.children()
        }
        _ if tlvs.iter().any(|t| t.kind == TlvKind::ObjectInstance) => Err(
            Lwm2mError::InvalidArgument("several instances in one write".to_string()),
        ),
        _ => Ok(tlvs),
    }
}

fn create(objects: &mut ObjectRegistry, request: &CoapRequest, oid: u16) -> Lwm2mResult<u16> {
    let content_type = payload_type(request)?;
    let (iid, content) = match content_type {
        ContentType::Tlv => {
            let tlvs = decode(&request.payload)?;
            match tlvs.as_slice() {
                [single] if single.kind == TlvKind::ObjectInstance => {
                    (Some(single.id), single.content.clone())
                }
                _ => (None, request.payload.clone()),
            }
        }
        _ => (None, request.payload.clone()),
    };
    objects.create_instance(oid, iid, content_type, &content)
}

fn update_trigger(objects: &ObjectRegistry, iid: u16) -> Effect {
    let ssid = objects
        .read_resource(SERVER_OBJECT_ID, iid, SHORT_SERVER_ID)
        .ok()
        .and_then(|r| r.value().and_then(|v| v.as_int().ok()))
        .and_then(|v| u16::try_from(v).ok());
    match ssid {
        Some(ssid) => Effect::UpdateTrigger(ssid),
        None => {
            debug!("Update trigger on /1/{} without short server id", iid);
            Effect::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lwm2m_core::ResourceDataType;
    use lwm2m_interface::object::{Create, Delete, Lwm2mObject, Read, WriteTlv};
    use lwm2m_interface::{DeviceInstance, DeviceObject, ServerInstance, ServerObject};
    use lwm2m_tlv::{decode_resource, encode_float, TlvEncoder};

    const SENSOR_VALUE: u16 = 5700;

    struct Temperature {
        value: f64,
    }

    struct TemperatureObject;

    impl Create<Temperature> for TemperatureObject {
        fn create(&mut self, _iid: u16, content_type: ContentType, content: &[u8])
            -> Lwm2mResult<Temperature> {
            let mut temperature = Temperature { value: 0.0 };
            if content_type == ContentType::Tlv {
                self.write_tlv(&mut temperature, 0, &decode(content)?)?;
            }
            Ok(temperature)
        }
    }

    impl Read<Temperature> for TemperatureObject {
        fn read(&self, instance: &Temperature, _iid: u16, rid: u16) -> Lwm2mResult<Resource> {
            match rid {
                SENSOR_VALUE => Ok(Resource::float(rid, instance.value)),
                _ => Err(Lwm2mError::UnknownPath(rid.to_string())),
            }
        }
    }

    impl WriteTlv<Temperature> for TemperatureObject {
        fn write_tlv(&mut self, instance: &mut Temperature, _iid: u16, tlvs: &[Tlv])
            -> Lwm2mResult<()> {
            for tlv in tlvs {
                match tlv.id {
                    SENSOR_VALUE => instance.value = tlv.to_float()?,
                    rid => return Err(Lwm2mError::UnknownPath(rid.to_string())),
                }
            }
            Ok(())
        }
    }

    impl Delete<Temperature> for TemperatureObject {
        fn delete(&mut self, _instance: &mut Temperature, _iid: u16) -> Lwm2mResult<()> {
            Ok(())
        }
    }

    impl Lwm2mObject for TemperatureObject {
        type Instance = Temperature;

        fn id(&self) -> u16 {
            3303
        }

        fn resource_count(&self) -> u16 {
            SENSOR_VALUE + 1
        }

        fn creator(&mut self) -> Option<&mut dyn Create<Temperature>> {
            Some(self)
        }

        fn reader(&self) -> Option<&dyn Read<Temperature>> {
            Some(self)
        }

        fn tlv_writer(&mut self) -> Option<&mut dyn WriteTlv<Temperature>> {
            Some(self)
        }

        fn deleter(&mut self) -> Option<&mut dyn Delete<Temperature>> {
            Some(self)
        }
    }

    fn registry() -> ObjectRegistry {
        let mut registry = ObjectRegistry::new();
        registry.register(ServerObject).unwrap();
        registry.register(DeviceObject::new()).unwrap();
        registry.register(TemperatureObject).unwrap();
        registry.add_instance(1, ServerInstance::new(101)).unwrap();
        registry.add_instance(3, DeviceInstance::new("ACME", "M1")).unwrap();
        registry
    }

    fn request(method: CoapMethod, path: &Lwm2mPath) -> CoapRequest {
        CoapRequest::new(method, path.to_segments())
    }

    fn temperature_tlv(iid: Option<u16>, value: f64) -> Bytes {
        let value = Tlv::new(TlvKind::ResourceWithValue, SENSOR_VALUE, encode_float(value));
        let mut encoder = TlvEncoder::new();
        match iid {
            Some(iid) => encoder
                .encode_container(TlvKind::ObjectInstance, iid, &[value])
                .unwrap(),
            None => encoder.encode_tlv(&value).unwrap(),
        }
        encoder.into_bytes()
    }

    #[test]
    fn test_read_resource() {
        let mut registry = registry();
        let path = Lwm2mPath::resource(3, 0, 0);
        let (response, effect) = dispatch(&mut registry, &request(CoapMethod::Get, &path), path);
        assert_eq!(response.code, ResponseCode::CONTENT);
        assert_eq!(response.content_type(), Some(ContentType::Tlv));
        assert_eq!(effect, Effect::None);

        let tlvs = decode(&response.payload).unwrap();
        let resource = decode_resource(&tlvs[0], ResourceDataType::String).unwrap();
        assert_eq!(resource, Resource::string(0, "ACME"));
    }

    #[test]
    fn test_read_instance_is_one_object_instance() {
        let mut registry = registry();
        let path = Lwm2mPath::instance(1, 0);
        let (response, _) = dispatch(&mut registry, &request(CoapMethod::Get, &path), path);
        let tlvs = decode(&response.payload).unwrap();
        assert_eq!(tlvs.len(), 1);
        assert_eq!(tlvs[0].kind, TlvKind::ObjectInstance);
        let ids: Vec<u16> = tlvs[0].children().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1, 6, 7]);
    }

    #[test]
    fn test_read_missing_paths() {
        let mut registry = registry();
        for (path, code) in [
            (Lwm2mPath::object(9), ResponseCode::NOT_FOUND),
            (Lwm2mPath::instance(3, 4), ResponseCode::NOT_FOUND),
            (Lwm2mPath::resource(3, 0, 3), ResponseCode::NOT_FOUND),
        ] {
            let (response, _) = dispatch(&mut registry, &request(CoapMethod::Get, &path), path);
            assert_eq!(response.code, code, "{}", path);
        }
    }

    #[test]
    fn test_observe_register_and_cancel() {
        let mut registry = registry();
        let path = Lwm2mPath::resource(3, 0, 1);
        let get = request(CoapMethod::Get, &path).with_observe(OBSERVE_REGISTER);
        let (response, effect) = dispatch(&mut registry, &get, path);
        assert_eq!(response.observe, Some(0));
        assert_eq!(effect, Effect::Observe(path));

        let cancel = request(CoapMethod::Get, &path).with_observe(OBSERVE_DEREGISTER);
        let (response, effect) = dispatch(&mut registry, &cancel, path);
        assert_eq!(response.observe, None);
        assert_eq!(effect, Effect::CancelObserve(path));

        let missing = Lwm2mPath::resource(3, 0, 3);
        let get = request(CoapMethod::Get, &missing).with_observe(OBSERVE_REGISTER);
        let (_, effect) = dispatch(&mut registry, &get, missing);
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn test_write_text_resource() {
        let mut registry = registry();
        let path = Lwm2mPath::resource(1, 0, 1);
        let put = request(CoapMethod::Put, &path).with_payload(ContentType::Text.to_u16(), "300");
        let (response, effect) = dispatch(&mut registry, &put, path);
        assert_eq!(response.code, ResponseCode::CHANGED);
        assert_eq!(effect, Effect::Changed(path));
        assert_eq!(registry.instance::<ServerInstance>(1, 0).unwrap().lifetime, 300);
    }

    #[test]
    fn test_write_rejects_json_and_missing_format() {
        let mut registry = registry();
        let path = Lwm2mPath::resource(1, 0, 1);
        let put = request(CoapMethod::Put, &path).with_payload(ContentType::Json.to_u16(), "{}");
        let (response, _) = dispatch(&mut registry, &put, path);
        assert_eq!(response.code, ResponseCode::UNSUPPORTED_CONTENT_FORMAT);

        let (response, _) = dispatch(&mut registry, &request(CoapMethod::Put, &path), path);
        assert_eq!(response.code, ResponseCode::BAD_REQUEST);
    }

    #[test]
    fn test_create_with_instance_id() {
        let mut registry = registry();
        let path = Lwm2mPath::object(3303);
        let post = request(CoapMethod::Post, &path)
            .with_payload(ContentType::Tlv.to_u16(), temperature_tlv(Some(7), 21.5));
        let (response, effect) = dispatch(&mut registry, &post, path);
        assert_eq!(response.code, ResponseCode::CREATED);
        assert_eq!(response.location_path, vec!["3303", "7"]);
        assert_eq!(effect, Effect::Created(Lwm2mPath::instance(3303, 7)));
        assert_eq!(registry.instance::<Temperature>(3303, 7).unwrap().value, 21.5);
    }

    #[test]
    fn test_create_without_instance_id() {
        let mut registry = registry();
        let path = Lwm2mPath::object(3303);
        let post = request(CoapMethod::Post, &path)
            .with_payload(ContentType::Tlv.to_u16(), temperature_tlv(None, 4.0));
        let (response, _) = dispatch(&mut registry, &post, path);
        assert_eq!(response.location_path, vec!["3303", "0"]);
    }

    #[test]
    fn test_create_unsupported() {
        let mut registry = registry();
        let path = Lwm2mPath::object(3);
        let post = request(CoapMethod::Post, &path).with_payload(ContentType::Tlv.to_u16(), Bytes::new());
        let (response, effect) = dispatch(&mut registry, &post, path);
        assert_eq!(response.code, ResponseCode::METHOD_NOT_ALLOWED);
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn test_write_instance_wrapped_and_bare() {
        let mut registry = registry();
        registry.add_instance(3303, Temperature { value: 0.0 }).unwrap();
        let path = Lwm2mPath::instance(3303, 0);

        let put = request(CoapMethod::Put, &path)
            .with_payload(ContentType::Tlv.to_u16(), temperature_tlv(Some(0), 1.5));
        assert_eq!(dispatch(&mut registry, &put, path).0.code, ResponseCode::CHANGED);
        assert_eq!(registry.instance::<Temperature>(3303, 0).unwrap().value, 1.5);

        let post = request(CoapMethod::Post, &path)
            .with_payload(ContentType::Tlv.to_u16(), temperature_tlv(None, 2.5));
        assert_eq!(dispatch(&mut registry, &post, path).0.code, ResponseCode::CHANGED);
        assert_eq!(registry.instance::<Temperature>(3303, 0).unwrap().value, 2.5);

        let wrong = request(CoapMethod::Put, &path)
            .with_payload(ContentType::Tlv.to_u16(), temperature_tlv(Some(1), 9.0));
        assert_eq!(dispatch(&mut registry, &wrong, path).0.code, ResponseCode::BAD_REQUEST);
    }

    #[test]
    fn test_execute_update_trigger() {
        let mut registry = registry();
        let path = Lwm2mPath::resource(1, 0, REGISTRATION_UPDATE_TRIGGER);
        let (response, effect) = dispatch(&mut registry, &request(CoapMethod::Post, &path), path);
        assert_eq!(response.code, ResponseCode::CHANGED);
        assert_eq!(effect, Effect::UpdateTrigger(101));
    }

    #[test]
    fn test_delete() {
        let mut registry = registry();
        registry.add_instance(3303, Temperature { value: 0.0 }).unwrap();
        let path = Lwm2mPath::instance(3303, 0);
        let (response, effect) = dispatch(&mut registry, &request(CoapMethod::Delete, &path), path);
        assert_eq!(response.code, ResponseCode::DELETED);
        assert_eq!(effect, Effect::Deleted(path));
        assert!(!registry.contains_instance(3303, 0));
    }

    #[test]
    fn test_delete_without_capability_keeps_instance() {
        let mut registry = registry();
        let path = Lwm2mPath::instance(3, 0);
        let (response, effect) = dispatch(&mut registry, &request(CoapMethod::Delete, &path), path);
        assert_eq!(response.code, ResponseCode::METHOD_NOT_ALLOWED);
        assert_eq!(effect, Effect::None);
        assert!(registry.contains_instance(3, 0));
    }
}
