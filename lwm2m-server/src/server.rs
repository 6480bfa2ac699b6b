//! LWM2M server engine
//!
//! [`Lwm2mServer`] serves the registration interface, keeps the table of
//! registered clients and runs management operations against them. It is
//! driven by the owner of the CoAP endpoint:
//!
//! - incoming requests through [`Lwm2mServer::handle_request`]
//! - replies and notifications through [`Lwm2mServer::handle_response`]
//! - lost requests through [`Lwm2mServer::handle_transport_error`]
//! - lifetime expiry through `poll_timeout` / `handle_timeout`
//!
//! # Usage Example
//! ```rust,ignore
//! let mut server = Lwm2mServer::new(ServerConfig::default(), endpoint);
//! server.add_registration_monitor(|client, event| {
//!     println!("{} {}", client.name(), event);
//! });
//! let response = server.handle_request(Instant::now(), peer, request);
//! ```

use crate::client_info::ClientInfo;
use crate::config::ServerConfig;
use crate::error::{Lwm2mError, Lwm2mResult};
use crate::link::{parse_link_format, RegisteredObjects};
use crate::observer::{MonitorId, Observation, ObserverId};
use log::{debug, info, warn};
use lwm2m_core::{BindingMode, ContentType, Lwm2mPath, RegistrationEvent, Resource};
use lwm2m_tlv::{encode, encode_instance, encode_resource, encode_resources};
use lwm2m_transport::{
    CoapEndpoint, CoapMethod, CoapRequest, CoapResponse, ResponseCode, Token, LINK_FORMAT,
    OBSERVE_DEREGISTER, OBSERVE_REGISTER,
};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

const LOCATION_ID_LEN: usize = 10;

/// Called for every client lifecycle transition
pub type MonitorCallback = Box<dyn FnMut(&ClientInfo, RegistrationEvent) + Send>;

/// Called for every value pushed on an observed path
pub type ObserverCallback = Box<dyn FnMut(&ClientInfo, &Lwm2mPath, &CoapResponse) + Send>;

/// Called once with the outcome of a management operation
pub type ResponseCallback = Box<dyn FnOnce(Lwm2mResult<CoapResponse>) + Send>;

struct Transaction {
    client: String,
    callback: ResponseCallback,
}

/// LWM2M server
pub struct Lwm2mServer<E: CoapEndpoint> {
    config: ServerConfig,
    endpoint: E,
    /// Registered clients by endpoint name
    clients: BTreeMap<String, ClientInfo>,
    monitors: Vec<(MonitorId, MonitorCallback)>,
    observations: Vec<Observation<ObserverCallback>>,
    transactions: HashMap<Token, Transaction>,
    next_token: Token,
    next_handle: u64,
}

fn fire(monitors: &mut [(MonitorId, MonitorCallback)], client: &ClientInfo, event: RegistrationEvent) {
    for (_, monitor) in monitors.iter_mut() {
        monitor(client, event);
    }
}

fn parse_lifetime(value: &str) -> Lwm2mResult<u32> {
    value
        .parse::<u32>()
        .ok()
        .filter(|lt| *lt > 0)
        .ok_or_else(|| Lwm2mError::InvalidArgument(format!("invalid lifetime {:?}", value)))
}

fn parse_binding(value: &str) -> Lwm2mResult<BindingMode> {
    match BindingMode::parse(value) {
        BindingMode::Unknown => Err(Lwm2mError::InvalidArgument(format!(
            "invalid binding {:?}",
            value
        ))),
        binding => Ok(binding),
    }
}

/// Objects announced in a register or update payload, if it carries any
fn parse_payload(request: &CoapRequest) -> Lwm2mResult<Option<RegisteredObjects>> {
    if request.payload.is_empty() {
        return Ok(None);
    }
    match request.content_format {
        None | Some(LINK_FORMAT) => {}
        Some(other) => return Err(Lwm2mError::UnsupportedContentType(other)),
    }
    let text = std::str::from_utf8(&request.payload)
        .map_err(|_| Lwm2mError::InvalidArgument("link payload is not UTF-8".to_string()))?;
    parse_link_format(text).map(Some)
}

impl<E: CoapEndpoint> Lwm2mServer<E> {
    /// Create a server sending through `endpoint`
    pub fn new(config: ServerConfig, endpoint: E) -> Self {
        Self {
            config,
            endpoint,
            clients: BTreeMap::new(),
            monitors: Vec::new(),
            observations: Vec::new(),
            transactions: HashMap::new(),
            next_token: rand::thread_rng().next_u64(),
            next_handle: 0,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    /// Registered clients, ordered by name
    pub fn clients(&self) -> impl Iterator<Item = &ClientInfo> {
        self.clients.values()
    }

    pub fn client(&self, name: &str) -> Option<&ClientInfo> {
        self.clients.get(name)
    }

    fn allocate_token(&mut self) -> Token {
        self.next_token = self.next_token.wrapping_add(1);
        self.next_token
    }

    fn allocate_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.lifetime_grace)
    }

    /// Random location id not used by another client
    fn location_id(&self) -> String {
        loop {
            let id: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(LOCATION_ID_LEN)
                .map(char::from)
                .collect();
            if !self.clients.values().any(|c| c.location_id() == Some(id.as_str())) {
                return id;
            }
        }
    }

    fn find_by_location(&self, location_id: &str) -> Lwm2mResult<String> {
        self.clients
            .values()
            .find(|c| c.location_id() == Some(location_id))
            .map(|c| c.name.clone())
            .ok_or_else(|| Lwm2mError::UnknownClient(format!("no registration at {}", location_id)))
    }

    /// Add a registration monitor
    ///
    /// Monitors are called in the order they were added, for every
    /// register, update, deregister and timeout of every client.
    ///
    /// # Returns
    /// Handle used to remove the monitor
    pub fn add_registration_monitor(
        &mut self,
        callback: impl FnMut(&ClientInfo, RegistrationEvent) + Send + 'static,
    ) -> MonitorId {
        let id = MonitorId(self.allocate_handle());
        let callback: MonitorCallback = Box::new(callback);
        self.monitors.push((id, callback));
        id
    }

    /// Remove a registration monitor
    ///
    /// # Errors
    /// Returns `InvalidArgument` if no monitor has this handle.
    pub fn del_registration_monitor(&mut self, id: MonitorId) -> Lwm2mResult<()> {
        let index = self
            .monitors
            .iter()
            .position(|(monitor, _)| *monitor == id)
            .ok_or_else(|| Lwm2mError::InvalidArgument(format!("{} is not registered", id)))?;
        self.monitors.remove(index);
        Ok(())
    }

    /// Serve a request from a client
    ///
    /// Handles the registration interface under the configured location
    /// prefix:
    /// - `POST /rd?ep=..` registers and answers 2.01 with the location
    /// - `POST /rd/{id}` updates and answers 2.04
    /// - `DELETE /rd/{id}` deregisters and answers 2.02
    ///
    /// Errors are reported through the response code.
    pub fn handle_request(&mut self, now: Instant, peer: SocketAddr, request: CoapRequest)
        -> CoapResponse {
        let result = match (request.method, request.path.as_slice()) {
            (_, [prefix, ..]) if *prefix != self.config.location_prefix => {
                Err(Lwm2mError::UnknownPath(format!("/{}", request.path.join("/"))))
            }
            (CoapMethod::Post, [_]) => self.register(now, peer, &request),
            (CoapMethod::Post, [_, id]) => self.update(now, peer, id, &request),
            (CoapMethod::Delete, [_, id]) => self.deregister(id),
            (_, [_] | [_, _]) => Err(Lwm2mError::Unsupported(format!(
                "{:?} on /{}",
                request.method,
                request.path.join("/")
            ))),
            _ => Err(Lwm2mError::UnknownPath(format!("/{}", request.path.join("/")))),
        };
        result.unwrap_or_else(|e| {
            debug!("Registration request from {} rejected: {}", peer, e);
            CoapResponse::from_error(&e)
        })
    }

    fn register(&mut self, now: Instant, peer: SocketAddr, request: &CoapRequest)
        -> Lwm2mResult<CoapResponse> {
        let name = request
            .query("ep")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Lwm2mError::InvalidArgument("registration without endpoint name".to_string()))?
            .to_string();
        let lifetime = match request.query("lt") {
            Some(lt) => parse_lifetime(lt)?,
            None => self.config.default_lifetime,
        };
        let binding = match request.query("b") {
            Some(b) => parse_binding(b)?,
            None => BindingMode::U,
        };
        if let Some(version) = request.query("lwm2m").filter(|v| *v != "1.0") {
            warn!("Client {} announces LWM2M version {}", name, version);
        }
        let announced = parse_payload(request)?.unwrap_or_default();

        if let Some(previous) = self.clients.remove(&name) {
            info!("Client {} registered again, dropping {}", name, previous.location());
            self.drop_client(previous, RegistrationEvent::Unregister);
        }

        let client = ClientInfo {
            name: name.clone(),
            location: vec![self.config.location_prefix.clone(), self.location_id()],
            sms: request.query("sms").map(str::to_string),
            objects_path: announced.objects_path,
            lifetime,
            binding,
            address: peer,
            objects: announced.objects,
            last_seen: now,
        };
        info!("Client {} registered at {} from {}", name, client.location(), peer);

        let mut response = CoapResponse::new(ResponseCode::CREATED);
        response.location_path = client.location.clone();
        fire(&mut self.monitors, &client, RegistrationEvent::Register);
        self.clients.insert(name, client);
        Ok(response)
    }

    fn update(&mut self, now: Instant, peer: SocketAddr, location_id: &str, request: &CoapRequest)
        -> Lwm2mResult<CoapResponse> {
        let name = self.find_by_location(location_id)?;
        let lifetime = request.query("lt").map(parse_lifetime).transpose()?;
        let binding = request.query("b").map(parse_binding).transpose()?;
        let announced = parse_payload(request)?;

        let client = self
            .clients
            .get_mut(&name)
            .ok_or_else(|| Lwm2mError::UnknownClient(name.clone()))?;
        if let Some(lifetime) = lifetime {
            client.lifetime = lifetime;
        }
        if let Some(binding) = binding {
            client.binding = binding;
        }
        if let Some(sms) = request.query("sms") {
            client.sms = Some(sms.to_string());
        }
        if let Some(announced) = announced {
            client.objects = announced.objects;
            client.objects_path = announced.objects_path;
        }
        client.address = peer;
        client.last_seen = now;
        debug!("Client {} updated its registration", name);

        fire(&mut self.monitors, client, RegistrationEvent::Update);
        Ok(CoapResponse::new(ResponseCode::CHANGED))
    }

    fn deregister(&mut self, location_id: &str) -> Lwm2mResult<CoapResponse> {
        let name = self.find_by_location(location_id)?;
        let client = self
            .clients
            .remove(&name)
            .ok_or_else(|| Lwm2mError::UnknownClient(name.clone()))?;
        info!("Client {} deregistered", name);
        self.drop_client(client, RegistrationEvent::Unregister);
        Ok(CoapResponse::new(ResponseCode::DELETED))
    }

    /// Forget a client that is no longer registered
    ///
    /// Monitors see `event`, observations are dropped and pending
    /// operations complete with `UnknownClient`.
    fn drop_client(&mut self, client: ClientInfo, event: RegistrationEvent) {
        fire(&mut self.monitors, &client, event);
        self.observations.retain(|o| o.client != client.name);

        let mut tokens: Vec<Token> = self
            .transactions
            .iter()
            .filter(|(_, t)| t.client == client.name)
            .map(|(token, _)| *token)
            .collect();
        tokens.sort_unstable();
        for token in tokens {
            if let Some(transaction) = self.transactions.remove(&token) {
                (transaction.callback)(Err(Lwm2mError::UnknownClient(client.name.clone())));
            }
        }
    }

    /// Earliest lifetime expiry among the registered clients
    pub fn poll_timeout(&self) -> Option<Instant> {
        let grace = self.grace();
        self.clients.values().map(|c| c.expires_at(grace)).min()
    }

    /// Drop the clients whose lifetime has expired
    pub fn handle_timeout(&mut self, now: Instant) {
        let grace = self.grace();
        let expired: Vec<String> = self
            .clients
            .values()
            .filter(|c| c.expires_at(grace) <= now)
            .map(|c| c.name.clone())
            .collect();
        for name in expired {
            if let Some(client) = self.clients.remove(&name) {
                info!("Client {} timed out", name);
                self.drop_client(client, RegistrationEvent::Timeout);
            }
        }
    }

    /// Observe a path on a client
    ///
    /// The observation is requested from the client for the first observer
    /// of a path; later observers share it.
    ///
    /// # Returns
    /// Handle used to remove the observer
    ///
    /// # Errors
    /// Returns `UnknownClient` if the client is not registered, or the
    /// endpoint's error if the observe request cannot be sent.
    pub fn add_observer(
        &mut self,
        client: &str,
        path: Lwm2mPath,
        callback: impl FnMut(&ClientInfo, &Lwm2mPath, &CoapResponse) + Send + 'static,
    ) -> Lwm2mResult<ObserverId> {
        if !self.clients.contains_key(client) {
            return Err(Lwm2mError::UnknownClient(client.to_string()));
        }

        let index = match self.observations.iter().position(|o| o.matches(client, &path)) {
            Some(index) => index,
            None => {
                let token = self.allocate_token();
                let info = self
                    .clients
                    .get(client)
                    .ok_or_else(|| Lwm2mError::UnknownClient(client.to_string()))?;
                let request = CoapRequest::new(CoapMethod::Get, info.request_path(path.to_segments()))
                    .with_observe(OBSERVE_REGISTER);
                self.endpoint.send_request(info.address, token, request)?;
                debug!("Observing {} on {}", path, client);
                self.observations.push(Observation::new(client, path, token));
                self.observations.len() - 1
            }
        };

        let id = ObserverId(self.allocate_handle());
        let callback: ObserverCallback = Box::new(callback);
        self.observations[index].observers.push((id, callback));
        Ok(id)
    }

    /// Remove an observer
    ///
    /// Removing the last observer of a path cancels the observation on the
    /// client.
    ///
    /// # Errors
    /// Returns `UnknownPath` if no observer has this handle.
    pub fn del_observer(&mut self, id: ObserverId) -> Lwm2mResult<()> {
        let index = self
            .observations
            .iter()
            .position(|o| o.holds(id))
            .ok_or_else(|| Lwm2mError::UnknownPath(format!("{} is not registered", id)))?;
        self.observations[index].remove(id);
        if !self.observations[index].observers.is_empty() {
            return Ok(());
        }

        let observation = self.observations.remove(index);
        if let Some(info) = self.clients.get(&observation.client) {
            let request =
                CoapRequest::new(CoapMethod::Get, info.request_path(observation.path.to_segments()))
                    .with_observe(OBSERVE_DEREGISTER);
            match self.endpoint.send_request(info.address, observation.token, request) {
                Ok(()) => debug!("Cancelled observation of {} on {}", observation.path, observation.client),
                Err(e) => warn!(
                    "Cancelling observation of {} on {} failed: {}",
                    observation.path, observation.client, e
                ),
            }
        }
        Ok(())
    }

    /// Feed a reply or notification from a client
    ///
    /// Replies complete the pending operation with the same token.
    /// Notifications go to every observer of the observed path; an error
    /// notification ends the observation.
    pub fn handle_response(&mut self, token: Token, response: CoapResponse) {
        if let Some(transaction) = self.transactions.remove(&token) {
            debug!("{} answered {} for token {:#x}", transaction.client, response.code, token);
            (transaction.callback)(Ok(response));
            return;
        }

        let Some(index) = self.observations.iter().position(|o| o.token == token) else {
            warn!("Response for unknown token {:#x}", token);
            return;
        };
        let observation = &mut self.observations[index];
        if let Some(client) = self.clients.get(&observation.client) {
            for (_, observer) in observation.observers.iter_mut() {
                observer(client, &observation.path, &response);
            }
        }
        if !response.code.is_success() {
            warn!(
                "Observation of {} on {} ended with {}",
                observation.path, observation.client, response.code
            );
            self.observations.remove(index);
        }
    }

    /// Report that a request got no reply
    ///
    /// A pending operation completes with `error`; a lost observe request
    /// drops the observation and its observers.
    pub fn handle_transport_error(&mut self, token: Token, error: Lwm2mError) {
        if let Some(transaction) = self.transactions.remove(&token) {
            debug!("Request to {} failed: {}", transaction.client, error);
            (transaction.callback)(Err(error));
            return;
        }
        match self.observations.iter().position(|o| o.token == token) {
            Some(index) => {
                let observation = self.observations.remove(index);
                warn!(
                    "Observation of {} on {} lost: {}",
                    observation.path, observation.client, error
                );
            }
            None => warn!("Transport error for unknown token {:#x}: {}", token, error),
        }
    }

    fn send_transaction(&mut self, client: &str, mut request: CoapRequest, callback: ResponseCallback)
        -> Lwm2mResult<Token> {
        let token = self.allocate_token();
        let info = self
            .clients
            .get(client)
            .ok_or_else(|| Lwm2mError::UnknownClient(client.to_string()))?;
        request.path = info.request_path(std::mem::take(&mut request.path));
        debug!("{:?} /{} on {}", request.method, request.path.join("/"), client);
        self.endpoint.send_request(info.address, token, request)?;
        self.transactions.insert(token, Transaction {
            client: client.to_string(),
            callback,
        });
        Ok(token)
    }

    /// Read a path on a client
    ///
    /// The callback runs once with the client's reply (any response code)
    /// or the transport error. It is not called if this method returns an
    /// error.
    ///
    /// # Returns
    /// Token of the request
    pub fn read(
        &mut self,
        client: &str,
        path: Lwm2mPath,
        callback: impl FnOnce(Lwm2mResult<CoapResponse>) + Send + 'static,
    ) -> Lwm2mResult<Token> {
        let request = CoapRequest::new(CoapMethod::Get, path.to_segments());
        self.send_transaction(client, request, Box::new(callback))
    }

    /// Write resources on a client
    ///
    /// A resource path takes exactly that resource; an instance path takes
    /// any number of its resources. Values are sent as TLV.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an object path or resources not
    /// matching the path, and `UnknownClient` for an unregistered client.
    pub fn write(
        &mut self,
        client: &str,
        path: Lwm2mPath,
        resources: &[Resource],
        callback: impl FnOnce(Lwm2mResult<CoapResponse>) + Send + 'static,
    ) -> Lwm2mResult<Token> {
        let payload = match (path.instance_id(), path.resource_id()) {
            (Some(_), Some(rid)) => match resources {
                [resource] if resource.id() == rid => encode(&[encode_resource(resource)?])?,
                _ => {
                    return Err(Lwm2mError::InvalidArgument(format!(
                        "write to {} takes resource {} only",
                        path, rid
                    )));
                }
            },
            (Some(_), None) => encode_resources(resources)?,
            _ => {
                return Err(Lwm2mError::InvalidArgument(format!("cannot write object {}", path)));
            }
        };
        let request = CoapRequest::new(CoapMethod::Put, path.to_segments())
            .with_payload(ContentType::Tlv.to_u16(), payload);
        self.send_transaction(client, request, Box::new(callback))
    }

    /// Create an instance on a client
    ///
    /// With an object path the client picks the instance id; with an
    /// instance path the id is requested explicitly.
    pub fn create(
        &mut self,
        client: &str,
        path: Lwm2mPath,
        resources: &[Resource],
        callback: impl FnOnce(Lwm2mResult<CoapResponse>) + Send + 'static,
    ) -> Lwm2mResult<Token> {
        let payload = match (path.instance_id(), path.resource_id()) {
            (None, _) => encode_resources(resources)?,
            (Some(iid), None) => encode(&[encode_instance(iid, resources)?])?,
            _ => {
                return Err(Lwm2mError::InvalidArgument(format!(
                    "cannot create resource {}",
                    path
                )));
            }
        };
        let request = CoapRequest::new(CoapMethod::Post, Lwm2mPath::object(path.object_id()).to_segments())
            .with_payload(ContentType::Tlv.to_u16(), payload);
        self.send_transaction(client, request, Box::new(callback))
    }

    /// Delete an instance on a client
    pub fn delete(
        &mut self,
        client: &str,
        path: Lwm2mPath,
        callback: impl FnOnce(Lwm2mResult<CoapResponse>) + Send + 'static,
    ) -> Lwm2mResult<Token> {
        if !path.is_instance() {
            return Err(Lwm2mError::InvalidArgument(format!("cannot delete {}", path)));
        }
        let request = CoapRequest::new(CoapMethod::Delete, path.to_segments());
        self.send_transaction(client, request, Box::new(callback))
    }

    /// Execute a resource on a client
    ///
    /// Non-empty arguments are sent as a text payload.
    pub fn execute(
        &mut self,
        client: &str,
        path: Lwm2mPath,
        args: &[u8],
        callback: impl FnOnce(Lwm2mResult<CoapResponse>) + Send + 'static,
    ) -> Lwm2mResult<Token> {
        if !path.is_resource() {
            return Err(Lwm2mError::InvalidArgument(format!("cannot execute {}", path)));
        }
        let mut request = CoapRequest::new(CoapMethod::Post, path.to_segments());
        if !args.is_empty() {
            request = request.with_payload(ContentType::Text.to_u16(), args.to_vec());
        }
        self.send_transaction(client, request, Box::new(callback))
    }
}
