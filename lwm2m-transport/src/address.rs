//! Translation between socket addresses and platform socket structures

use crate::error::{Lwm2mError, Lwm2mResult};
use socket2::SockAddr;
use std::mem::size_of;
use std::net::SocketAddr;

/// Convert a platform socket address to a `SocketAddr`
///
/// # Errors
///
/// Returns `InvalidArgument` if the family is neither IPv4 nor IPv6, or the
/// address is shorter than the structure its family requires.
pub fn from_sock_addr(addr: &SockAddr) -> Lwm2mResult<SocketAddr> {
    let family = i32::from(addr.family());
    let required = if family == libc::AF_INET {
        size_of::<libc::sockaddr_in>()
    } else if family == libc::AF_INET6 {
        size_of::<libc::sockaddr_in6>()
    } else {
        return Err(Lwm2mError::InvalidArgument(format!(
            "Unsupported address family: {}",
            family
        )));
    };

    let len = addr.len() as usize;
    if len < required {
        return Err(Lwm2mError::InvalidArgument(format!(
            "Socket address of {} bytes is shorter than the {} bytes its family needs",
            len, required
        )));
    }

    addr.as_socket().ok_or_else(|| {
        Lwm2mError::InvalidArgument("Socket address is not an IP address".to_string())
    })
}

/// Convert a `SocketAddr` to a platform socket address
pub fn to_sock_addr(addr: &SocketAddr) -> SockAddr {
    SockAddr::from(*addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_v4_and_v6() {
        for text in ["192.0.2.1:5683", "[2001:db8::1]:5684"] {
            let addr: SocketAddr = text.parse().unwrap();
            assert_eq!(from_sock_addr(&to_sock_addr(&addr)).unwrap(), addr);
        }
    }

    #[test]
    fn test_short_address_rejected() {
        // SAFETY: a zeroed sockaddr_storage is a valid value and the length
        // is within its bounds
        let short = unsafe {
            let mut storage: libc::sockaddr_storage = std::mem::zeroed();
            storage.ss_family = libc::AF_INET6 as libc::sa_family_t;
            SockAddr::new(storage, size_of::<libc::sockaddr_in>() as libc::socklen_t)
        };
        let err = from_sock_addr(&short).unwrap_err();
        assert!(matches!(err, Lwm2mError::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_family_rejected() {
        // SAFETY: see above
        let unix = unsafe {
            let mut storage: libc::sockaddr_storage = std::mem::zeroed();
            storage.ss_family = libc::AF_UNIX as libc::sa_family_t;
            SockAddr::new(storage, size_of::<libc::sockaddr_storage>() as libc::socklen_t)
        };
        assert!(from_sock_addr(&unix).is_err());
    }
}
