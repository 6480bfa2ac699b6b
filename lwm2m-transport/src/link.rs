//! Network link enumeration
//!
//! Multicast sends are replayed on every running, non-loopback,
//! multicast-capable link. The list of links comes from a [`LinkProvider`]
//! so it can be replaced in tests.

use crate::error::{Lwm2mError, Lwm2mResult};
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A network interface and its addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLink {
    /// Interface index, as used by IPv6 multicast options
    pub index: u32,
    pub name: String,
    pub running: bool,
    pub loopback: bool,
    pub multicast: bool,
    pub addrs: Vec<IpAddr>,
}

impl NetworkLink {
    /// True if multicast sends should be replayed on this link
    pub fn is_multicast_candidate(&self) -> bool {
        self.running && self.multicast && !self.loopback
    }

    /// First IPv4 address of the link
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addrs.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }
}

/// Source of the current network links
#[cfg_attr(test, mockall::automock)]
pub trait LinkProvider: Send + Sync {
    /// Enumerate the links currently present
    fn available_links(&self) -> Lwm2mResult<Vec<NetworkLink>>;
}

/// Links reported by the operating system through `getifaddrs`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLinks;

impl LinkProvider for SystemLinks {
    fn available_links(&self) -> Lwm2mResult<Vec<NetworkLink>> {
        let mut ifaddrs_ptr: *mut libc::ifaddrs = std::ptr::null_mut();
        // SAFETY: getifaddrs writes a list head into the pointer we own
        let result = unsafe { libc::getifaddrs(&mut ifaddrs_ptr) };
        if result != 0 {
            return Err(Lwm2mError::Transport(std::io::Error::last_os_error()));
        }

        let mut links: BTreeMap<String, NetworkLink> = BTreeMap::new();
        let mut current = ifaddrs_ptr;
        while !current.is_null() {
            // SAFETY: current is a non-null node of the list returned above
            let ifaddr = unsafe { &*current };
            current = ifaddr.ifa_next;

            if ifaddr.ifa_name.is_null() {
                continue;
            }
            // SAFETY: ifa_name is a NUL terminated string owned by the list
            let name_cstr = unsafe { CStr::from_ptr(ifaddr.ifa_name) };
            let name = name_cstr.to_string_lossy().to_string();

            let link = links.entry(name.clone()).or_insert_with(|| {
                let flags = ifaddr.ifa_flags;
                NetworkLink {
                    // SAFETY: name_cstr is a valid C string
                    index: unsafe { libc::if_nametoindex(name_cstr.as_ptr()) },
                    name,
                    running: flags & libc::IFF_RUNNING as libc::c_uint != 0,
                    loopback: flags & libc::IFF_LOOPBACK as libc::c_uint != 0,
                    multicast: flags & libc::IFF_MULTICAST as libc::c_uint != 0,
                    addrs: Vec::new(),
                }
            });

            if ifaddr.ifa_addr.is_null() {
                continue;
            }
            // SAFETY: ifa_addr is non-null and its family tells the layout
            let family = i32::from(unsafe { (*ifaddr.ifa_addr).sa_family });
            if family == libc::AF_INET {
                let sin = unsafe { &*(ifaddr.ifa_addr as *const libc::sockaddr_in) };
                link.addrs
                    .push(IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr))));
            } else if family == libc::AF_INET6 {
                let sin6 = unsafe { &*(ifaddr.ifa_addr as *const libc::sockaddr_in6) };
                link.addrs.push(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)));
            }
        }

        // SAFETY: the list was allocated by getifaddrs and is freed once
        unsafe { libc::freeifaddrs(ifaddrs_ptr) };

        Ok(links.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicast_candidate() {
        let mut link = NetworkLink {
            index: 2,
            name: "eth0".to_string(),
            running: true,
            loopback: false,
            multicast: true,
            addrs: vec!["fe80::1".parse().unwrap(), "192.0.2.7".parse().unwrap()],
        };
        assert!(link.is_multicast_candidate());
        assert_eq!(link.ipv4(), Some(Ipv4Addr::new(192, 0, 2, 7)));

        link.loopback = true;
        assert!(!link.is_multicast_candidate());
        link.loopback = false;
        link.running = false;
        assert!(!link.is_multicast_candidate());
    }

    #[test]
    fn test_system_links_include_loopback() {
        let links = SystemLinks.available_links().unwrap();
        assert!(links.iter().any(|l| l.loopback));
    }
}
