//! LWM2M client engine
//!
//! [`Lwm2mClient`] owns the object registry and one registration per
//! configured server. It never performs I/O itself: requests go out through
//! the [`CoapEndpoint`] it was built with, and its owner feeds back replies,
//! transport failures and elapsed deadlines.
//!
//! # Driving the client
//! ```text
//! start(now)                       -> registration requests sent
//! handle_response(now, token, rsp) -> registration replies
//! handle_request(now, peer, ...)   -> server reads, writes, observes
//! poll_timeout() / handle_timeout  -> periodic updates
//! poll_event()                     -> Registered, Updated, ...
//! stop()                           -> deregistration requests sent
//! ```

use crate::config::ClientConfig;
use crate::error::{Lwm2mError, Lwm2mResult};
use crate::events::ClientEvent;
use crate::handler::{dispatch, read_path, Effect};
use crate::observe::ObservationSet;
use crate::registration::{discover_servers, link_format, Registration};
use crate::state::RegistrationState;
use log::{debug, error, info, warn};
use lwm2m_core::{BindingMode, ContentType, Lwm2mPath};
use lwm2m_interface::registry::ObjectRegistry;
use lwm2m_transport::{
    CoapEndpoint, CoapMethod, CoapRequest, CoapResponse, ResponseCode, Token, LINK_FORMAT,
};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Registration interface path on the server
const REGISTRATION_PATH: &str = "rd";
const LWM2M_VERSION: &str = "1.0";
/// Delay before retrying a failed update
const UPDATE_RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Register,
    /// Carries what was announced before the update so a failure can
    /// restore it
    Update {
        objects: bool,
        lifetime: u32,
        binding: BindingMode,
    },
    Deregister,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    index: usize,
    kind: RequestKind,
}

#[derive(Debug, Default)]
struct TokenSource(Token);

impl TokenSource {
    fn next(&mut self) -> Token {
        self.0 = self.0.wrapping_add(1);
        self.0
    }
}

/// LWM2M client
pub struct Lwm2mClient<E: CoapEndpoint> {
    config: ClientConfig,
    objects: ObjectRegistry,
    endpoint: E,
    registrations: Vec<Registration>,
    observations: ObservationSet,
    pending: HashMap<Token, PendingRequest>,
    events: VecDeque<ClientEvent>,
    tokens: TokenSource,
    started: bool,
}

impl<E: CoapEndpoint> Lwm2mClient<E> {
    /// Create a client
    ///
    /// # Arguments
    /// * `config` - Client configuration
    /// * `objects` - Registry holding the Security, Server and application objects
    /// * `endpoint` - CoAP endpoint requests are sent through
    ///
    /// # Errors
    /// Returns `InvalidArgument` if the configuration is invalid.
    pub fn new(config: ClientConfig, objects: ObjectRegistry, endpoint: E) -> Lwm2mResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            objects,
            endpoint,
            registrations: Vec::new(),
            observations: ObservationSet::new(),
            pending: HashMap::new(),
            events: VecDeque::new(),
            tokens: TokenSource::default(),
            started: false,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    /// Mutable access to the registry
    ///
    /// Instances added or removed here are not announced to the servers;
    /// use [`Self::add_instance`] and [`Self::delete_instance`] for that.
    pub fn objects_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.objects
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    pub fn observations(&self) -> &ObservationSet {
        &self.observations
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Registration state with the server of the given Short Server ID
    pub fn state(&self, short_server_id: u16) -> Option<RegistrationState> {
        self.registrations
            .iter()
            .find(|r| r.short_server_id() == short_server_id)
            .map(|r| r.state)
    }

    /// Next queued registration event
    pub fn poll_event(&mut self) -> Option<ClientEvent> {
        self.events.pop_front()
    }

    /// Discover the configured servers and register with each of them
    ///
    /// A server whose URI cannot be used, or whose request cannot be sent,
    /// is reported with [`ClientEvent::RegistrationFailed`]; the others are
    /// still registered.
    ///
    /// # Errors
    /// Returns `InvalidState` if the client is already started and
    /// `InvalidArgument` if no server account is configured.
    pub fn start(&mut self, now: Instant) -> Lwm2mResult<()> {
        if self.started {
            return Err(Lwm2mError::InvalidState("client already started".to_string()));
        }
        let accounts = discover_servers(&self.objects)?;

        self.registrations.clear();
        self.pending.clear();
        self.started = true;
        info!(
            "Starting client {} with {} server account(s)",
            self.config.name,
            accounts.len()
        );

        for account in accounts {
            match account.address() {
                Ok(address) => {
                    self.registrations.push(Registration::new(account, address));
                    self.register(self.registrations.len() - 1);
                }
                Err(e) => {
                    error!("Server {}: {}", account.short_server_id, e);
                    self.events.push_back(ClientEvent::RegistrationFailed {
                        short_server_id: account.short_server_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Send an update to every registered server
    ///
    /// Servers with a request in flight get the update once it completes.
    ///
    /// # Errors
    /// Returns `InvalidState` if the client is not started.
    pub fn send_update(&mut self, now: Instant) -> Lwm2mResult<()> {
        if !self.started {
            return Err(Lwm2mError::InvalidState("client not started".to_string()));
        }
        for index in 0..self.registrations.len() {
            self.request_update(index, now);
        }
        Ok(())
    }

    /// Deregister from every server
    ///
    /// Deregistration is best-effort: requests are sent and the client does
    /// not wait for the replies. A server still answering the registration
    /// is sent the deregistration when its reply arrives. Object data is left
    /// untouched.
    ///
    /// # Errors
    /// Returns `InvalidState` if the client is not started.
    pub fn stop(&mut self) -> Lwm2mResult<()> {
        if !self.started {
            return Err(Lwm2mError::InvalidState("client not started".to_string()));
        }
        self.started = false;
        // A registration still in flight is deregistered once its reply
        // reveals the location
        self.pending.retain(|_, p| p.kind == RequestKind::Register);
        self.observations.clear();

        for index in 0..self.registrations.len() {
            let state = self.registrations[index].state;
            match state {
                state if state.is_registered() => self.deregister(index),
                RegistrationState::Registering => {
                    let reg = &mut self.registrations[index];
                    debug!(
                        "Server {} will be deregistered once it answers the registration",
                        reg.short_server_id()
                    );
                    reg.reset();
                    reg.state = RegistrationState::Deregistering;
                }
                _ => self.registrations[index].reset(),
            }
        }
        Ok(())
    }

    /// Earliest deadline the client must be woken up at
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.registrations
            .iter()
            .filter(|r| r.state == RegistrationState::Registered)
            .filter_map(|r| r.next_update)
            .min()
    }

    /// Run the updates that are due
    pub fn handle_timeout(&mut self, now: Instant) {
        for index in 0..self.registrations.len() {
            let reg = &mut self.registrations[index];
            if reg.next_update.is_some_and(|deadline| deadline <= now) {
                reg.next_update = None;
                if reg.state == RegistrationState::Registered {
                    self.update(index, now);
                }
            }
        }
    }

    /// Feed the reply to a request the client sent
    pub fn handle_response(&mut self, now: Instant, token: Token, response: CoapResponse) {
        self.complete(now, token, Ok(response));
    }

    /// Report that a request the client sent got no reply
    pub fn handle_transport_error(&mut self, now: Instant, token: Token, error: Lwm2mError) {
        self.complete(now, token, Err(error));
    }

    /// Serve a request from a server
    ///
    /// # Arguments
    /// * `now` - Current time, used to schedule updates
    /// * `peer` - Address of the requesting server
    /// * `token` - Token of the request, reused by notifications when the
    ///   request starts an observation
    /// * `request` - The decoded request
    ///
    /// # Returns
    /// The response to send back. Errors are reported through the response
    /// code.
    pub fn handle_request(
        &mut self,
        now: Instant,
        peer: SocketAddr,
        token: Token,
        request: CoapRequest,
    ) -> CoapResponse {
        let path = match Lwm2mPath::from_segments(self.object_segments(&request.path)) {
            Ok(path) => path,
            Err(e) => {
                debug!("Rejecting request for {:?}: {}", request.path, e);
                return CoapResponse::from_error(&e);
            }
        };

        let (response, effect) = dispatch(&mut self.objects, &request, path);
        match effect {
            Effect::None => {}
            Effect::Observe(path) => {
                debug!("{} observes {}", peer, path);
                self.observations.add(peer, path, token);
            }
            Effect::CancelObserve(path) => {
                if self.observations.remove(peer, &path) {
                    debug!("{} cancelled observation of {}", peer, path);
                }
            }
            Effect::Changed(path) => self.notify_quietly(&[path]),
            Effect::Created(path) => {
                self.objects_changed(now);
                self.notify_quietly(&[Lwm2mPath::object(path.object_id())]);
            }
            Effect::Deleted(path) => {
                self.observations.remove_under(&path);
                self.objects_changed(now);
                self.notify_quietly(&[Lwm2mPath::object(path.object_id())]);
            }
            Effect::UpdateTrigger(ssid) => {
                match self.registrations.iter().position(|r| r.short_server_id() == ssid) {
                    Some(index) => self.request_update(index, now),
                    None => warn!("Update trigger for unknown server {}", ssid),
                }
            }
        }
        response
    }

    /// Notify the observers of the given paths
    ///
    /// Every observation whose path equals, contains or lies below one of
    /// `paths` is notified once, in the order the paths are given. An
    /// observation whose target no longer exists receives an error and is
    /// dropped.
    ///
    /// # Errors
    /// Returns the first endpoint failure; the remaining notifications are
    /// still sent.
    pub fn notify_observers(&mut self, paths: &[Lwm2mPath]) -> Lwm2mResult<()> {
        let mut result = Ok(());
        let mut cancelled = Vec::new();

        for index in self.observations.matching(paths) {
            let Some(observation) = self.observations.get_mut(index) else {
                continue;
            };
            let response = match read_path(&self.objects, &observation.path) {
                Ok(payload) => {
                    let mut response = CoapResponse::content(ContentType::Tlv, payload);
                    response.observe = Some(observation.next_seq());
                    response
                }
                Err(e) => {
                    warn!("Observed path {} unreadable: {}", observation.path, e);
                    if e.is_skippable_read() {
                        cancelled.push(index);
                    }
                    CoapResponse::from_error(&e)
                }
            };
            if let Err(e) = self
                .endpoint
                .send_notification(observation.peer, observation.token, response)
            {
                warn!("Notification of {} to {} failed: {}", observation.path, observation.peer, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        self.observations.remove_indices(&cancelled);
        result
    }

    /// Add a local instance and announce it to the servers
    ///
    /// # Returns
    /// The id of the new instance
    pub fn add_instance<I: Send + 'static>(&mut self, now: Instant, object_id: u16, instance: I)
        -> Lwm2mResult<u16> {
        let instance_id = self.objects.add_instance(object_id, instance)?;
        self.objects_changed(now);
        self.notify_quietly(&[Lwm2mPath::object(object_id)]);
        Ok(instance_id)
    }

    /// Delete an instance through its object's delete capability and
    /// announce the removal to the servers
    pub fn delete_instance(&mut self, now: Instant, object_id: u16, instance_id: u16)
        -> Lwm2mResult<()> {
        self.objects.delete_instance(object_id, instance_id)?;
        self.observations
            .remove_under(&Lwm2mPath::instance(object_id, instance_id));
        self.objects_changed(now);
        self.notify_quietly(&[Lwm2mPath::object(object_id)]);
        Ok(())
    }

    fn notify_quietly(&mut self, paths: &[Lwm2mPath]) {
        if let Err(e) = self.notify_observers(paths) {
            debug!("Notification failed: {}", e);
        }
    }

    /// Request path with the alternate objects path removed
    fn object_segments<'a>(&self, path: &'a [String]) -> &'a [String] {
        let Some(prefix) = self.config.objects_path.as_deref() else {
            return path;
        };
        let prefix: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        if path.len() >= prefix.len() && path.iter().zip(&prefix).all(|(a, b)| a == b) {
            &path[prefix.len()..]
        } else {
            path
        }
    }

    fn update_interval(&self, lifetime: u32) -> Duration {
        Duration::from_secs_f64(f64::from(lifetime) * self.config.update_ratio)
    }

    fn retry_interval(&self, lifetime: u32) -> Duration {
        UPDATE_RETRY_INTERVAL.min(self.update_interval(lifetime))
    }

    /// Mark every registration's object list stale and update soon
    fn objects_changed(&mut self, now: Instant) {
        for reg in &mut self.registrations {
            reg.dirty = true;
            match reg.state {
                RegistrationState::Registered => reg.next_update = Some(now),
                RegistrationState::Registering | RegistrationState::Updating => {
                    reg.update_requested = true;
                }
                _ => {}
            }
        }
    }

    fn request_update(&mut self, index: usize, now: Instant) {
        let Some(reg) = self.registrations.get_mut(index) else {
            return;
        };
        let state = reg.state;
        match state {
            RegistrationState::Registered => self.update(index, now),
            RegistrationState::Registering | RegistrationState::Updating => {
                debug!("Deferring update to server {}", reg.short_server_id());
                reg.update_requested = true;
            }
            state => debug!("Server {} is {}, no update sent", reg.short_server_id(), state),
        }
    }

    fn register(&mut self, index: usize) {
        let token = self.tokens.next();
        let payload = link_format(&self.objects, self.config.objects_path.as_deref());
        let reg = &mut self.registrations[index];
        let (lifetime, binding) = reg.account.parameters(&self.objects);

        let mut request = CoapRequest::new(CoapMethod::Post, vec![REGISTRATION_PATH.to_string()])
            .with_query("ep", &self.config.name)
            .with_query("lt", lifetime);
        if let Some(binding) = binding.as_str() {
            request = request.with_query("b", binding);
        }
        if let Some(sms) = &self.config.sms {
            request = request.with_query("sms", sms);
        }
        let request = request
            .with_query("lwm2m", LWM2M_VERSION)
            .with_payload(LINK_FORMAT, payload);

        match self.endpoint.send_request(reg.address, token, request) {
            Ok(()) => {
                debug!("Registering with server {} at {}", reg.short_server_id(), reg.address);
                reg.state = RegistrationState::Registering;
                reg.lifetime = lifetime;
                reg.binding = binding;
                reg.dirty = false;
                self.pending.insert(token, PendingRequest {
                    index,
                    kind: RequestKind::Register,
                });
            }
            Err(e) => {
                error!("Registration with server {} not sent: {}", reg.short_server_id(), e);
                reg.reset();
                self.events.push_back(ClientEvent::RegistrationFailed {
                    short_server_id: reg.short_server_id(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn deregister(&mut self, index: usize) {
        let token = self.tokens.next();
        let reg = &mut self.registrations[index];
        let request = CoapRequest::new(CoapMethod::Delete, reg.location.clone());
        reg.reset();

        match self.endpoint.send_request(reg.address, token, request) {
            Ok(()) => {
                reg.state = RegistrationState::Deregistering;
                self.pending.insert(token, PendingRequest {
                    index,
                    kind: RequestKind::Deregister,
                });
            }
            Err(e) => warn!("Deregistration from server {} not sent: {}", reg.short_server_id(), e),
        }
        info!("Deregistered from server {}", reg.short_server_id());
        self.events.push_back(ClientEvent::Deregistered {
            short_server_id: reg.short_server_id(),
        });
    }

    fn update(&mut self, index: usize, now: Instant) {
        let token = self.tokens.next();
        let payload = link_format(&self.objects, self.config.objects_path.as_deref());
        let retry = {
            let lifetime = self.registrations[index].lifetime;
            self.retry_interval(lifetime)
        };
        let reg = &mut self.registrations[index];
        let (lifetime, binding) = reg.account.parameters(&self.objects);

        // only what changed since the last announcement
        let mut request = CoapRequest::new(CoapMethod::Post, reg.location.clone());
        if lifetime != reg.lifetime {
            request = request.with_query("lt", lifetime);
        }
        if binding != reg.binding {
            if let Some(b) = binding.as_str() {
                request = request.with_query("b", b);
            }
        }
        if reg.dirty {
            request = request.with_payload(LINK_FORMAT, payload);
        }

        match self.endpoint.send_request(reg.address, token, request) {
            Ok(()) => {
                debug!("Updating registration with server {}", reg.short_server_id());
                let previous = RequestKind::Update {
                    objects: reg.dirty,
                    lifetime: reg.lifetime,
                    binding: reg.binding,
                };
                reg.state = RegistrationState::Updating;
                reg.next_update = None;
                reg.lifetime = lifetime;
                reg.binding = binding;
                reg.dirty = false;
                reg.update_requested = false;
                self.pending.insert(token, PendingRequest { index, kind: previous });
            }
            Err(e) => {
                warn!("Update to server {} not sent: {}", reg.short_server_id(), e);
                reg.next_update = Some(now + retry);
                self.events.push_back(ClientEvent::UpdateFailed {
                    short_server_id: reg.short_server_id(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn complete(&mut self, now: Instant, token: Token, outcome: Result<CoapResponse, Lwm2mError>) {
        let Some(pending) = self.pending.remove(&token) else {
            warn!("Reply for unknown token {:#x}", token);
            return;
        };
        match pending.kind {
            RequestKind::Register => self.registered(pending.index, now, outcome),
            RequestKind::Update { objects, lifetime, binding } => {
                self.updated(pending.index, now, outcome, (objects, lifetime, binding));
            }
            RequestKind::Deregister => {
                if let Some(reg) = self.registrations.get_mut(pending.index) {
                    if reg.state == RegistrationState::Deregistering {
                        reg.state = RegistrationState::Unregistered;
                    }
                    debug!("Server {} acknowledged deregistration", reg.short_server_id());
                }
            }
        }
    }

    fn registered(&mut self, index: usize, now: Instant, outcome: Result<CoapResponse, Lwm2mError>) {
        let interval = match self.registrations.get(index) {
            Some(reg) if reg.state == RegistrationState::Registering => {
                self.update_interval(reg.lifetime)
            }
            Some(reg) if reg.state == RegistrationState::Deregistering => {
                self.registered_after_stop(index, outcome);
                return;
            }
            _ => return,
        };
        let reg = &mut self.registrations[index];

        let failure = match outcome {
            Ok(response) if response.code.is_success() && !response.location_path.is_empty() => {
                reg.location = response.location_path;
                reg.state = RegistrationState::Registered;
                reg.next_update = Some(now + interval);
                info!(
                    "Registered with server {} at {}",
                    reg.short_server_id(),
                    reg.location_string()
                );
                self.events.push_back(ClientEvent::Registered {
                    short_server_id: reg.short_server_id(),
                    location: reg.location_string(),
                });
                if reg.update_requested {
                    reg.update_requested = false;
                    self.update(index, now);
                }
                return;
            }
            Ok(response) if response.code.is_success() => "reply carries no location".to_string(),
            Ok(response) => format!("server replied {}", response.code),
            Err(e) => e.to_string(),
        };

        error!("Registration with server {} failed: {}", reg.short_server_id(), failure);
        reg.reset();
        self.events.push_back(ClientEvent::RegistrationFailed {
            short_server_id: reg.short_server_id(),
            error: failure,
        });
    }

    /// Registration reply for a client stopped while it was in flight
    fn registered_after_stop(&mut self, index: usize, outcome: Result<CoapResponse, Lwm2mError>) {
        match outcome {
            Ok(response) if response.code.is_success() && !response.location_path.is_empty() => {
                self.registrations[index].location = response.location_path;
                self.deregister(index);
            }
            _ => {
                let reg = &mut self.registrations[index];
                debug!("Server {} holds no registration to remove", reg.short_server_id());
                reg.reset();
            }
        }
    }

    fn updated(
        &mut self,
        index: usize,
        now: Instant,
        outcome: Result<CoapResponse, Lwm2mError>,
        previous: (bool, u32, BindingMode),
    ) {
        let (interval, retry) = match self.registrations.get(index) {
            Some(reg) if reg.state == RegistrationState::Updating => (
                self.update_interval(reg.lifetime),
                self.retry_interval(previous.1),
            ),
            _ => return,
        };
        let reg = &mut self.registrations[index];

        let failure = match outcome {
            Ok(response) if response.code.is_success() => {
                reg.state = RegistrationState::Registered;
                reg.next_update = Some(now + interval);
                debug!("Server {} accepted the update", reg.short_server_id());
                self.events.push_back(ClientEvent::Updated {
                    short_server_id: reg.short_server_id(),
                });
                if reg.update_requested {
                    reg.update_requested = false;
                    self.update(index, now);
                }
                return;
            }
            Ok(response) if response.code == ResponseCode::NOT_FOUND => {
                warn!(
                    "Server {} lost the registration, registering again",
                    reg.short_server_id()
                );
                reg.reset();
                self.events.push_back(ClientEvent::RegistrationLost {
                    short_server_id: reg.short_server_id(),
                });
                self.register(index);
                return;
            }
            Ok(response) => format!("server replied {}", response.code),
            Err(e) => e.to_string(),
        };

        warn!("Update to server {} failed: {}", reg.short_server_id(), failure);
        let (objects, lifetime, binding) = previous;
        reg.state = RegistrationState::Registered;
        reg.dirty |= objects;
        reg.lifetime = lifetime;
        reg.binding = binding;
        reg.next_update = Some(now + retry);
        self.events.push_back(ClientEvent::UpdateFailed {
            short_server_id: reg.short_server_id(),
            error: failure,
        });
    }
}
