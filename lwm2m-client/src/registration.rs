//! Server accounts and registration payloads
//!
//! Servers are discovered from the Security object: every instance that is
//! not a bootstrap server is one account, linked by its Short Server ID to
//! a Server object instance holding the lifetime and binding.

use crate::error::{Lwm2mError, Lwm2mResult};
use crate::state::RegistrationState;
use lwm2m_core::{BindingMode, DEFAULT_LIFETIME, DEFAULT_SERVER_PORT};
use lwm2m_interface::registry::ObjectRegistry;
use lwm2m_interface::security::{self, SECURITY_OBJECT_ID};
use lwm2m_interface::server::{self, SERVER_OBJECT_ID};
use log::warn;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

const COAP_SCHEME: &str = "coap://";

/// One configured server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAccount {
    pub short_server_id: u16,
    /// LWM2M Server URI from the Security instance
    pub uri: String,
    /// Server object instance holding lifetime and binding, if any
    pub server_instance: Option<u16>,
}

impl ServerAccount {
    /// Resolve the account's URI to a socket address
    pub fn address(&self) -> Lwm2mResult<SocketAddr> {
        parse_server_uri(&self.uri)
    }

    /// Current lifetime and binding from the Server object
    ///
    /// Missing or unreadable resources fall back to the protocol defaults.
    pub fn parameters(&self, objects: &ObjectRegistry) -> (u32, BindingMode) {
        let Some(iid) = self.server_instance else {
            return (DEFAULT_LIFETIME, BindingMode::U);
        };
        let lifetime = objects
            .read_resource(SERVER_OBJECT_ID, iid, server::LIFETIME)
            .ok()
            .and_then(|r| r.value().and_then(|v| v.as_int().ok()))
            .and_then(|lt| u32::try_from(lt).ok())
            .filter(|lt| *lt > 0)
            .unwrap_or(DEFAULT_LIFETIME);
        let binding = objects
            .read_resource(SERVER_OBJECT_ID, iid, server::BINDING)
            .ok()
            .and_then(|r| r.value().and_then(|v| v.as_str().ok()).map(BindingMode::parse))
            .unwrap_or(BindingMode::U);
        (lifetime, binding)
    }
}

fn read_int(objects: &ObjectRegistry, oid: u16, iid: u16, rid: u16) -> Lwm2mResult<Option<i64>> {
    match objects.read_resource(oid, iid, rid) {
        Ok(resource) => match resource.value() {
            Some(value) => value.as_int().map(Some),
            None => Ok(None),
        },
        Err(e) if e.is_skippable_read() => Ok(None),
        Err(e) => Err(e),
    }
}

fn short_server_id(value: Option<i64>, path: &str) -> Lwm2mResult<u16> {
    value
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| Lwm2mError::InvalidArgument(format!("{} has no valid short server id", path)))
}

/// Find the configured servers
///
/// # Returns
/// One account per non-bootstrap Security instance, in instance order.
///
/// # Errors
/// Returns `InvalidArgument` if no Security object is registered or it
/// holds no usable account.
pub fn discover_servers(objects: &ObjectRegistry) -> Lwm2mResult<Vec<ServerAccount>> {
    if !objects.contains_object(SECURITY_OBJECT_ID) {
        return Err(Lwm2mError::InvalidArgument(
            "no security object registered".to_string(),
        ));
    }

    // short server id -> server instance
    let mut server_instances = Vec::new();
    for iid in objects.instance_ids(SERVER_OBJECT_ID) {
        match read_int(objects, SERVER_OBJECT_ID, iid, server::SHORT_SERVER_ID)? {
            Some(ssid) => server_instances.push((ssid, iid)),
            None => warn!("Server instance /1/{} has no short server id", iid),
        }
    }

    let mut accounts = Vec::new();
    for iid in objects.instance_ids(SECURITY_OBJECT_ID) {
        let bootstrap = match objects.read_resource(SECURITY_OBJECT_ID, iid, security::BOOTSTRAP_SERVER) {
            Ok(resource) => resource.value().map(|v| v.as_bool()).transpose()?.unwrap_or(false),
            Err(e) if e.is_skippable_read() => false,
            Err(e) => return Err(e),
        };
        if bootstrap {
            continue;
        }

        let path = format!("/0/{}", iid);
        let ssid = short_server_id(
            read_int(objects, SECURITY_OBJECT_ID, iid, security::SHORT_SERVER_ID)?,
            &path,
        )?;
        let uri = objects
            .read_resource(SECURITY_OBJECT_ID, iid, security::SERVER_URI)?
            .value()
            .ok_or_else(|| Lwm2mError::InvalidArgument(format!("{} has no server uri", path)))?
            .as_str()?
            .to_string();
        let server_instance = server_instances
            .iter()
            .find(|(id, _)| *id == i64::from(ssid))
            .map(|(_, iid)| *iid);
        if server_instance.is_none() {
            warn!("No server instance for short server id {}, using defaults", ssid);
        }

        accounts.push(ServerAccount {
            short_server_id: ssid,
            uri,
            server_instance,
        });
    }

    if accounts.is_empty() {
        return Err(Lwm2mError::InvalidArgument(
            "no server accounts configured".to_string(),
        ));
    }
    Ok(accounts)
}

/// Parse a `coap://host[:port][/path]` URI with an IP literal host
///
/// IPv6 hosts are written in brackets. The port defaults to 5683.
///
/// # Errors
/// Returns `InvalidArgument` for other schemes, host names and bad ports.
pub fn parse_server_uri(uri: &str) -> Lwm2mResult<SocketAddr> {
    let invalid = || Lwm2mError::InvalidArgument(format!("invalid server uri {:?}", uri));

    let rest = uri
        .get(..COAP_SCHEME.len())
        .filter(|scheme| scheme.eq_ignore_ascii_case(COAP_SCHEME))
        .map(|_| &uri[COAP_SCHEME.len()..])
        .ok_or_else(invalid)?;
    let authority = rest.split('/').next().unwrap_or_default();

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
        let port = match after {
            "" => None,
            p => Some(p.strip_prefix(':').ok_or_else(invalid)?),
        };
        (host, port)
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    let ip: IpAddr = host.parse().map_err(|_| invalid())?;
    let port = match port {
        Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
        None => DEFAULT_SERVER_PORT,
    };
    Ok(SocketAddr::new(ip, port))
}

/// Registration payload in CoRE link-format
///
/// Lists every instance (or the bare object when it has none) except the
/// Security object. With an alternate objects path the list starts with
/// `</path>;rt="oma.lwm2m"` and every link is prefixed by the path.
pub fn link_format(objects: &ObjectRegistry, objects_path: Option<&str>) -> String {
    let prefix = objects_path
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty());

    let mut links = Vec::new();
    let mut base = String::new();
    if let Some(prefix) = prefix {
        links.push(format!("</{}>;rt=\"oma.lwm2m\"", prefix));
        base = format!("/{}", prefix);
    }

    for oid in objects.object_ids() {
        if oid == SECURITY_OBJECT_ID {
            continue;
        }
        let instances = objects.instance_ids(oid);
        if instances.is_empty() {
            links.push(format!("<{}/{}>", base, oid));
        }
        for iid in instances {
            links.push(format!("<{}/{}/{}>", base, oid, iid));
        }
    }
    links.join(",")
}

/// Runtime registration state with one server
#[derive(Debug)]
pub(crate) struct Registration {
    pub account: ServerAccount,
    pub address: SocketAddr,
    pub state: RegistrationState,
    /// Location-Path assigned by the server
    pub location: Vec<String>,
    /// Lifetime and binding last announced to the server
    pub lifetime: u32,
    pub binding: BindingMode,
    pub next_update: Option<Instant>,
    /// Object list changed since it was last sent
    pub dirty: bool,
    /// An update was asked for while a request was in flight
    pub update_requested: bool,
}

impl Registration {
    pub fn new(account: ServerAccount, address: SocketAddr) -> Self {
        Self {
            account,
            address,
            state: RegistrationState::Unregistered,
            location: Vec::new(),
            lifetime: DEFAULT_LIFETIME,
            binding: BindingMode::U,
            next_update: None,
            dirty: false,
            update_requested: false,
        }
    }

    pub fn short_server_id(&self) -> u16 {
        self.account.short_server_id
    }

    pub fn location_string(&self) -> String {
        format!("/{}", self.location.join("/"))
    }

    pub fn reset(&mut self) {
        self.state = RegistrationState::Unregistered;
        self.location.clear();
        self.next_update = None;
        self.update_requested = false;
    }
}
