//! In-memory network joining one client and one server
#![allow(dead_code)]

use lwm2m::client::{ClientBuilder, Lwm2mClient};
use lwm2m::interface::{
    DeviceInstance, DeviceObject, ObjectRegistry, SecurityInstance, SecurityObject, ServerInstance,
    ServerObject,
};
use lwm2m::server::{Lwm2mServer, ServerConfig};
use lwm2m::transport::{CoapEndpoint, CoapRequest, CoapResponse, Token};
use lwm2m::Lwm2mResult;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

pub const CLIENT_NAME: &str = "sensor-7";
pub const SHORT_SERVER_ID: u16 = 101;

pub fn server_addr() -> SocketAddr {
    "[2001:db8::1]:5683".parse().unwrap()
}

pub fn client_addr() -> SocketAddr {
    "[2001:db8::2]:49152".parse().unwrap()
}

pub enum Message {
    Request {
        from: SocketAddr,
        to: SocketAddr,
        token: Token,
        request: CoapRequest,
    },
    Response {
        to: SocketAddr,
        token: Token,
        response: CoapResponse,
    },
}

pub type Wire = Rc<RefCell<VecDeque<Message>>>;

/// Endpoint that queues every message on a shared wire
pub struct LoopEndpoint {
    local: SocketAddr,
    wire: Wire,
}

impl CoapEndpoint for LoopEndpoint {
    fn send_request(&mut self, peer: SocketAddr, token: Token, request: CoapRequest)
        -> Lwm2mResult<()> {
        self.wire.borrow_mut().push_back(Message::Request {
            from: self.local,
            to: peer,
            token,
            request,
        });
        Ok(())
    }

    fn send_notification(&mut self, peer: SocketAddr, token: Token, response: CoapResponse)
        -> Lwm2mResult<()> {
        self.wire.borrow_mut().push_back(Message::Response {
            to: peer,
            token,
            response,
        });
        Ok(())
    }
}

pub fn client_objects() -> ObjectRegistry {
    let mut objects = ObjectRegistry::new();
    objects.register(SecurityObject).unwrap();
    objects.register(ServerObject).unwrap();
    objects.register(DeviceObject::new()).unwrap();
    objects
        .add_instance(0, SecurityInstance::new("coap://[2001:db8::1]:5683", SHORT_SERVER_ID))
        .unwrap();
    objects
        .add_instance(1, ServerInstance::new(SHORT_SERVER_ID).with_lifetime(300))
        .unwrap();
    objects
        .add_instance(3, DeviceInstance::new("ACME", "Thermo 2"))
        .unwrap();
    objects
}

pub struct Network {
    pub wire: Wire,
    pub client: Lwm2mClient<LoopEndpoint>,
    pub server: Lwm2mServer<LoopEndpoint>,
}

impl Network {
    pub fn new() -> Self {
        let wire: Wire = Rc::default();
        let config = ClientBuilder::new().name(CLIENT_NAME).build().unwrap();
        let client = Lwm2mClient::new(config, client_objects(), LoopEndpoint {
            local: client_addr(),
            wire: wire.clone(),
        })
        .unwrap();
        let server = Lwm2mServer::new(ServerConfig::default(), LoopEndpoint {
            local: server_addr(),
            wire: wire.clone(),
        });
        Self {
            wire,
            client,
            server,
        }
    }

    /// Deliver queued messages until the wire is idle
    pub fn run(&mut self, now: Instant) {
        loop {
            let message = self.wire.borrow_mut().pop_front();
            let Some(message) = message else {
                break;
            };
            match message {
                Message::Request {
                    from,
                    to,
                    token,
                    request,
                } => {
                    let response = if to == server_addr() {
                        self.server.handle_request(now, from, request)
                    } else {
                        self.client.handle_request(now, from, token, request)
                    };
                    self.wire.borrow_mut().push_back(Message::Response {
                        to: from,
                        token,
                        response,
                    });
                }
                Message::Response {
                    to,
                    token,
                    response,
                } => {
                    if to == server_addr() {
                        self.server.handle_response(token, response);
                    } else {
                        self.client.handle_response(now, token, response);
                    }
                }
            }
        }
    }

    /// Start the client and deliver its registration
    pub fn start(&mut self, now: Instant) {
        self.client.start(now).unwrap();
        self.run(now);
    }
}
