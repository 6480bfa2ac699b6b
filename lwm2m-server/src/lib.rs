//! LWM2M server engine
//!
//! This crate provides the server side of the protocol: the registration
//! interface (register, update, deregister), the registry of registered
//! clients with lifetime expiry, registration monitors, observers, and the
//! management operations run against a client.
//!
//! Like the client, the engine is sans-IO and sends through a
//! [`lwm2m_transport::CoapEndpoint`].

pub mod error;
pub mod config;
pub mod client_info;
pub mod link;
pub mod observer;
pub mod server;

pub use error::{Lwm2mError, Lwm2mResult};
pub use config::ServerConfig;
pub use client_info::{ClientInfo, ClientObject};
pub use link::{parse_link_format, RegisteredObjects};
pub use observer::{MonitorId, ObserverId};
pub use server::{Lwm2mServer, MonitorCallback, ObserverCallback, ResponseCallback};
