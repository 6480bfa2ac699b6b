//! CoAP collaborator interface
//!
//! Message framing and retransmission live outside this workspace. The LWM2M
//! engines only need the request/response shapes below and a
//! [`CoapEndpoint`] able to send them; responses and transport failures are
//! fed back to the engines by whoever drives the endpoint.

use crate::error::{Lwm2mError, Lwm2mResult};
use bytes::Bytes;
use lwm2m_core::ContentType;
use std::fmt;
use std::net::SocketAddr;

/// Content format number of CoRE link-format
pub const LINK_FORMAT: u16 = 40;

/// Observe option value registering an observation
pub const OBSERVE_REGISTER: u32 = 0;
/// Observe option value cancelling an observation
pub const OBSERVE_DEREGISTER: u32 = 1;

/// Token correlating a request with its responses
pub type Token = u64;

/// CoAP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoapMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// CoAP response code, `class.detail` packed as `class << 5 | detail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    pub const CREATED: Self = Self(0x41);
    pub const DELETED: Self = Self(0x42);
    pub const CHANGED: Self = Self(0x44);
    pub const CONTENT: Self = Self(0x45);
    pub const BAD_REQUEST: Self = Self(0x80);
    pub const UNAUTHORIZED: Self = Self(0x81);
    pub const FORBIDDEN: Self = Self(0x83);
    pub const NOT_FOUND: Self = Self(0x84);
    pub const METHOD_NOT_ALLOWED: Self = Self(0x85);
    pub const NOT_ACCEPTABLE: Self = Self(0x86);
    pub const UNSUPPORTED_CONTENT_FORMAT: Self = Self(0x8F);
    pub const INTERNAL_ERROR: Self = Self(0xA0);
    pub const SERVICE_UNAVAILABLE: Self = Self(0xA3);

    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    pub const fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    pub const fn is_success(self) -> bool {
        self.class() == 2
    }

    /// Response code reporting `error` to the peer
    pub fn from_error(error: &Lwm2mError) -> Self {
        match error {
            Lwm2mError::InvalidArgument(_)
            | Lwm2mError::MalformedTlv(_)
            | Lwm2mError::TypeMismatch(_)
            | Lwm2mError::AlreadyExists(_) => Self::BAD_REQUEST,
            Lwm2mError::NotFound(_) | Lwm2mError::UnknownPath(_) | Lwm2mError::UnknownClient(_) => {
                Self::NOT_FOUND
            }
            Lwm2mError::Unsupported(_) => Self::METHOD_NOT_ALLOWED,
            Lwm2mError::UnsupportedContentType(_) => Self::UNSUPPORTED_CONTENT_FORMAT,
            _ => Self::INTERNAL_ERROR,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

/// An outgoing or incoming CoAP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapRequest {
    pub method: CoapMethod,
    /// Uri-Path segments
    pub path: Vec<String>,
    /// Uri-Query entries, `key=value` or bare `key`
    pub queries: Vec<String>,
    pub content_format: Option<u16>,
    pub payload: Bytes,
    pub observe: Option<u32>,
}

impl CoapRequest {
    pub fn new(method: CoapMethod, path: Vec<String>) -> Self {
        Self {
            method,
            path,
            queries: Vec::new(),
            content_format: None,
            payload: Bytes::new(),
            observe: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.queries.push(format!("{}={}", key, value));
        self
    }

    pub fn with_payload(mut self, content_format: u16, payload: impl Into<Bytes>) -> Self {
        self.content_format = Some(content_format);
        self.payload = payload.into();
        self
    }

    pub fn with_observe(mut self, observe: u32) -> Self {
        self.observe = Some(observe);
        self
    }

    /// Value of the first `key=value` query with the given key
    pub fn query(&self, key: &str) -> Option<&str> {
        self.queries.iter().find_map(|q| match q.split_once('=') {
            Some((k, v)) if k == key => Some(v),
            _ => None,
        })
    }

    /// LWM2M content type of the payload, if it carries one
    pub fn content_type(&self) -> Option<ContentType> {
        self.content_format.and_then(ContentType::from_u16)
    }
}

/// An outgoing or incoming CoAP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapResponse {
    pub code: ResponseCode,
    pub content_format: Option<u16>,
    pub payload: Bytes,
    /// Location-Path segments, set on registration replies
    pub location_path: Vec<String>,
    /// Observe sequence number of a notification
    pub observe: Option<u32>,
}

impl CoapResponse {
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            content_format: None,
            payload: Bytes::new(),
            location_path: Vec::new(),
            observe: None,
        }
    }

    /// Response carrying a payload with the 2.05 Content code
    pub fn content(content_type: ContentType, payload: impl Into<Bytes>) -> Self {
        Self {
            content_format: Some(content_type.to_u16()),
            payload: payload.into(),
            ..Self::new(ResponseCode::CONTENT)
        }
    }

    pub fn from_error(error: &Lwm2mError) -> Self {
        Self::new(ResponseCode::from_error(error))
    }

    pub fn content_type(&self) -> Option<ContentType> {
        self.content_format.and_then(ContentType::from_u16)
    }
}

/// Sending half of a CoAP endpoint
///
/// Implementations hand messages to the CoAP layer and return immediately;
/// they never wait for the peer.
pub trait CoapEndpoint {
    /// Send a confirmable request identified by `token`
    fn send_request(&mut self, peer: SocketAddr, token: Token, request: CoapRequest)
        -> Lwm2mResult<()>;

    /// Push an observe notification for the observation identified by `token`
    fn send_notification(
        &mut self,
        peer: SocketAddr,
        token: Token,
        response: CoapResponse,
    ) -> Lwm2mResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_code_display() {
        assert_eq!(ResponseCode::CONTENT.to_string(), "2.05");
        assert_eq!(ResponseCode::UNSUPPORTED_CONTENT_FORMAT.to_string(), "4.15");
        assert!(ResponseCode::CREATED.is_success());
        assert!(!ResponseCode::NOT_FOUND.is_success());
    }

    #[test]
    fn test_response_code_from_error() {
        let cases = [
            (Lwm2mError::MalformedTlv("x".into()), ResponseCode::BAD_REQUEST),
            (Lwm2mError::NotFound("x".into()), ResponseCode::NOT_FOUND),
            (Lwm2mError::Unsupported("x".into()), ResponseCode::METHOD_NOT_ALLOWED),
            (Lwm2mError::UnsupportedContentType(1543), ResponseCode::UNSUPPORTED_CONTENT_FORMAT),
            (Lwm2mError::OutOfMemory, ResponseCode::INTERNAL_ERROR),
        ];
        for (error, code) in cases {
            assert_eq!(ResponseCode::from_error(&error), code);
        }
    }

    #[test]
    fn test_request_query_lookup() {
        let request = CoapRequest::new(CoapMethod::Post, vec!["rd".into()])
            .with_query("ep", "dev-1")
            .with_query("lt", 300);
        assert_eq!(request.query("lt"), Some("300"));
        assert_eq!(request.query("b"), None);
    }
}
