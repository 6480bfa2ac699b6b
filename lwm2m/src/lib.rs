//! lwm2m_rs - Rust implementation of the LWM2M device management protocol
//!
//! This library implements the LWM2M object/resource model and both protocol
//! roles on top of a CoAP transport.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `lwm2m-core`: Error type, paths, protocol enums and the Resource model
//! - `lwm2m-tlv`: TLV encoding/decoding
//! - `lwm2m-transport`: Multicast-aware UDP socket and the CoAP endpoint interface
//! - `lwm2m-interface`: Object capabilities, instance registry and standard objects
//! - `lwm2m-client`: Client registration state machine and request dispatch
//! - `lwm2m-server`: Client registry, monitors, observers and management operations
//!
//! Both engines are sans-IO: the application owns the CoAP endpoint and feeds
//! requests, responses and timer expiries into them.
//!
//! # Usage
//!
//! ```no_run
//! use lwm2m::client::{ClientBuilder, Lwm2mClient};
//! use lwm2m::server::{Lwm2mServer, ServerConfig};
//! ```

// Re-export core types
pub use lwm2m_core::{
    BindingMode, ContentType, Lwm2mError, Lwm2mPath, Lwm2mResult, RegistrationEvent,
    DEFAULT_LIFETIME, DEFAULT_SERVER_PORT,
};
pub use lwm2m_core::datatypes::*;

// Re-export the TLV codec
pub mod tlv {
    pub use lwm2m_tlv::*;
}

// Re-export transport
pub mod transport {
    pub use lwm2m_transport::*;
}

// Re-export interface classes
pub mod interface {
    pub use lwm2m_interface::*;
}

// Re-export client API
pub mod client {
    pub use lwm2m_client::*;
}

// Re-export server API
pub mod server {
    pub use lwm2m_server::*;
}
