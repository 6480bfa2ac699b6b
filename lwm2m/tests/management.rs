//! Management operations from the server against a registered client

mod common;

use common::{Network, CLIENT_NAME};
use lwm2m::tlv::{decode, TlvKind};
use lwm2m::transport::{CoapResponse, ResponseCode};
use lwm2m::{Lwm2mPath, Lwm2mResult, Resource};
use std::sync::{Arc, Mutex};
use std::time::Instant;

type Replies = Arc<Mutex<Vec<Lwm2mResult<CoapResponse>>>>;

fn collector() -> (Replies, impl FnOnce(Lwm2mResult<CoapResponse>) + Send + 'static) {
    let replies: Replies = Arc::default();
    let seen = replies.clone();
    (replies, move |reply| seen.lock().unwrap().push(reply))
}

fn only_code(replies: &Replies) -> ResponseCode {
    let replies = replies.lock().unwrap();
    assert_eq!(replies.len(), 1);
    match &replies[0] {
        Ok(response) => response.code,
        Err(e) => panic!("operation failed: {}", e),
    }
}

#[test]
fn test_delete_without_capability() {
    let now = Instant::now();
    let mut network = Network::new();
    network.start(now);

    let (replies, callback) = collector();
    network
        .server
        .delete(CLIENT_NAME, Lwm2mPath::instance(3, 0), callback)
        .unwrap();
    network.run(now);

    assert_eq!(only_code(&replies), ResponseCode::METHOD_NOT_ALLOWED);
    assert!(network.client.objects().contains_instance(3, 0));
}

#[test]
fn test_create_without_capability() {
    let now = Instant::now();
    let mut network = Network::new();
    network.start(now);

    let (replies, callback) = collector();
    network
        .server
        .create(CLIENT_NAME, Lwm2mPath::object(3), &[Resource::string(0, "Other")], callback)
        .unwrap();
    network.run(now);

    assert_eq!(only_code(&replies), ResponseCode::METHOD_NOT_ALLOWED);
    assert_eq!(network.client.objects().instance_ids(3), vec![0]);
}

#[test]
fn test_read_instance() {
    let now = Instant::now();
    let mut network = Network::new();
    network.start(now);

    let (replies, callback) = collector();
    network
        .server
        .read(CLIENT_NAME, Lwm2mPath::instance(3, 0), callback)
        .unwrap();
    network.run(now);

    let replies = replies.lock().unwrap();
    let response = replies[0].as_ref().unwrap();
    assert_eq!(response.code, ResponseCode::CONTENT);
    let tlvs = decode(&response.payload).unwrap();
    assert_eq!((tlvs[0].kind, tlvs[0].id), (TlvKind::ObjectInstance, 0));
    let resources = tlvs[0].children().unwrap();
    let model = resources.iter().find(|t| t.id == 1).unwrap();
    assert_eq!(model.to_text().unwrap(), "Thermo 2");
}

#[test]
fn test_read_missing_path() {
    let now = Instant::now();
    let mut network = Network::new();
    network.start(now);

    let (replies, callback) = collector();
    network
        .server
        .read(CLIENT_NAME, Lwm2mPath::instance(3, 9), callback)
        .unwrap();
    network.run(now);
    assert_eq!(only_code(&replies), ResponseCode::NOT_FOUND);
}

#[test]
fn test_write_read_only_resource() {
    let now = Instant::now();
    let mut network = Network::new();
    network.start(now);

    let (replies, callback) = collector();
    network
        .server
        .write(CLIENT_NAME, Lwm2mPath::resource(3, 0, 0), &[Resource::string(0, "Evil")], callback)
        .unwrap();
    network.run(now);

    assert_eq!(only_code(&replies), ResponseCode::METHOD_NOT_ALLOWED);
    let manufacturer = network.client.objects().read_resource(3, 0, 0).unwrap();
    assert_eq!(manufacturer.value().and_then(|v| v.as_str().ok()), Some("ACME"));
}
