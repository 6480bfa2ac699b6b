//! Transport layer module for the LWM2M protocol
//!
//! This crate provides the multicast-aware UDP socket, network link
//! enumeration, socket address translation and the CoAP endpoint interface
//! the client and server engines send through.

pub mod error;
pub mod address;
pub mod link;
pub mod multicast;
pub mod socket;
pub mod coap;

pub use error::{Lwm2mError, Lwm2mResult};
pub use address::{from_sock_addr, to_sock_addr};
pub use link::{LinkProvider, NetworkLink, SystemLinks};
pub use multicast::{send_multicast, MulticastInterface, MulticastIo};
pub use socket::{DatagramSocket, ReadinessCallback, SocketFamily, SocketState, MAX_UDP_PAYLOAD_SIZE};
pub use coap::{
    CoapEndpoint, CoapMethod, CoapRequest, CoapResponse, ResponseCode, Token, LINK_FORMAT,
    OBSERVE_DEREGISTER, OBSERVE_REGISTER,
};
