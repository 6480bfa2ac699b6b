//! Per-interface multicast delivery
//!
//! A single multicast send only leaves through the interface selected by the
//! socket's outbound multicast option. To reach every network the send is
//! replayed once per candidate link: save the option, point it at the link,
//! send, restore.

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::link::NetworkLink;
use async_trait::async_trait;
use log::{debug, warn};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};

/// Outbound multicast interface of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MulticastInterface {
    /// IPv4 selects the interface by one of its addresses
    V4(Ipv4Addr),
    /// IPv6 selects the interface by index
    V6(u32),
}

/// Socket operations needed by the multicast fallback
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MulticastIo: Send + Sync {
    /// Current outbound multicast interface for the given family
    fn multicast_interface(&self, ipv6: bool) -> io::Result<MulticastInterface>;

    fn set_multicast_interface(&self, interface: MulticastInterface) -> io::Result<()>;

    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;
}

fn interface_for(link: &NetworkLink, ipv6: bool) -> Option<MulticastInterface> {
    if ipv6 {
        Some(MulticastInterface::V6(link.index))
    } else {
        link.ipv4().map(MulticastInterface::V4)
    }
}

/// Send `buf` to a multicast destination once per candidate link
///
/// Links that are down, loopback, not multicast-capable or lack an address
/// of the destination family are skipped. One link failing does not stop
/// the others.
///
/// # Returns
///
/// The byte count of the last successful send.
///
/// # Errors
///
/// Returns `NoRoute` if no link accepted the send.
pub async fn send_multicast<M>(
    io: &M,
    links: &[NetworkLink],
    buf: &[u8],
    dest: SocketAddr,
) -> Lwm2mResult<usize>
where
    M: MulticastIo + ?Sized,
{
    let ipv6 = dest.is_ipv6();
    let mut sent = None;

    for link in links.iter().filter(|l| l.is_multicast_candidate()) {
        let Some(interface) = interface_for(link, ipv6) else {
            continue;
        };

        let saved = match io.multicast_interface(ipv6) {
            Ok(saved) => saved,
            Err(e) => {
                debug!("Could not read multicast interface before using {}: {}", link.name, e);
                continue;
            }
        };
        if let Err(e) = io.set_multicast_interface(interface) {
            debug!("Could not select {} for multicast: {}", link.name, e);
            continue;
        }

        match io.send_to(buf, dest).await {
            Ok(n) => {
                debug!("Multicast to {} sent through {}", dest, link.name);
                sent = Some(n);
            }
            Err(e) => debug!("Multicast to {} through {} failed: {}", dest, link.name, e),
        }

        if let Err(e) = io.set_multicast_interface(saved) {
            warn!("Could not restore multicast interface after {}: {}", link.name, e);
        }
    }

    sent.ok_or(Lwm2mError::NoRoute)
}
