//! LWM2M client engine
//!
//! This crate provides the client side of the protocol: server discovery
//! from the Security and Server objects, the per-server registration state
//! machine, dispatch of server requests into the object registry, and
//! client-side observations.
//!
//! The engine is sans-IO. It sends through a [`lwm2m_transport::CoapEndpoint`]
//! and is driven by its owner through `handle_request`, `handle_response`,
//! `handle_transport_error` and the `poll_timeout`/`handle_timeout` pair.

pub mod error;
pub mod config;
pub mod state;
pub mod events;
pub mod registration;
pub mod observe;
pub mod handler;
pub mod client;

pub use error::{Lwm2mError, Lwm2mResult};
pub use config::{ClientBuilder, ClientConfig, DEFAULT_UPDATE_RATIO};
pub use state::RegistrationState;
pub use events::ClientEvent;
pub use registration::{ServerAccount, discover_servers, link_format};
pub use observe::{Observation, ObservationSet};
pub use client::Lwm2mClient;
