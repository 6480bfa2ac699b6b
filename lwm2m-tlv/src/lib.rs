//! TLV codec for the LWM2M protocol
//!
//! This crate provides the binary Type-Length-Value format used to carry
//! resource values, the typed conversion helpers and the bridge between
//! [`lwm2m_core::Resource`] and TLV entries.

pub mod error;
pub mod types;
pub mod decoder;
pub mod encoder;
pub mod value;
pub mod resource;

pub use error::{Lwm2mError, Lwm2mResult};
pub use types::{LengthField, Tlv, TlvKind};
pub use decoder::{decode, TlvDecoder};
pub use encoder::{encode, TlvEncoder};
pub use value::{encode_float, encode_int, encode_value};
pub use resource::{decode_resource, encode_instance, encode_resource, encode_resources};
