use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use iroh::endpoint::{Connection, TransportConfig};
use iroh::{Endpoint, EndpointAddr, EndpointId, RelayMap, RelayMode, RelayUrl, SecretKey, TransportAddr};
use sendme_core::{Error, NodeAddr, RelaySetting, Result, Settings};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::protocol::ALPN;

/// How long `node_addr` waits for the endpoint to learn its addresses
const ADDR_WAIT: Duration = Duration::from_secs(5);

/// Lifecycle of an endpoint and of each connection made through it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Bound,
    Connecting,
    Connected,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Generated when absent
    pub secret_key: Option<SecretKey>,
    pub relay: RelaySetting,
    /// Publish to and resolve through the n0 discovery service
    pub discovery: bool,
    pub bind_addr_v4: Option<SocketAddrV4>,
    pub bind_addr_v6: Option<SocketAddrV6>,
    /// ALPNs accepted for inbound connections. Empty for a receive-only endpoint.
    pub accept_alpns: Vec<Vec<u8>>,
    pub direct_timeout: Duration,
    pub relay_timeout: Duration,
    pub discovery_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl EndpointConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            secret_key: None,
            relay: settings.relay.clone(),
            discovery: true,
            bind_addr_v4: None,
            bind_addr_v6: None,
            accept_alpns: Vec::new(),
            direct_timeout: settings.direct_timeout(),
            relay_timeout: settings.relay_timeout(),
            discovery_timeout: settings.discovery_timeout(),
            idle_timeout: settings.idle_timeout(),
        }
    }

    /// Loopback-only endpoint without relays or discovery.
    pub fn local() -> Self {
        Self {
            relay: RelaySetting::Disabled,
            discovery: false,
            bind_addr_v4: Some(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)),
            direct_timeout: Duration::from_secs(5),
            relay_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Accept inbound blob requests.
    pub fn serving(mut self) -> Self {
        self.accept_alpns = vec![ALPN.to_vec()];
        self
    }

    /// A serving endpoint that publishes itself to discovery only when the
    /// tickets it hands out carry no addresses.
    pub fn sending(settings: &Settings) -> Self {
        Self {
            discovery: settings.ticket_type.needs_discovery(),
            ..Self::from_settings(settings)
        }
        .serving()
    }

    /// A receive-only endpoint that resolves `addr` through discovery only
    /// when it has nothing to dial.
    pub fn receiving(settings: &Settings, addr: &NodeAddr) -> Self {
        Self {
            discovery: !addr.is_reachable(),
            ..Self::from_settings(settings)
        }
    }

    fn relay_mode(&self) -> Result<RelayMode> {
        match &self.relay {
            RelaySetting::Disabled => Ok(RelayMode::Disabled),
            RelaySetting::Default => Ok(RelayMode::Default),
            RelaySetting::Custom(urls) => {
                let urls = urls
                    .iter()
                    .map(|u| {
                        u.parse::<RelayUrl>()
                            .map_err(|e| Error::InvalidConfig(format!("relay url {u:?}: {e}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                if urls.is_empty() {
                    return Err(Error::InvalidConfig("custom relay list is empty".to_string()));
                }
                Ok(RelayMode::Custom(urls.into_iter().collect::<RelayMap>()))
            }
        }
    }

    fn transport_config(&self) -> TransportConfig {
        let mut transport_config = TransportConfig::default();
        transport_config.receive_window(iroh::endpoint::VarInt::from_u32(16 * 1024 * 1024));
        transport_config.send_window(16 * 1024 * 1024);
        transport_config.max_idle_timeout(self.idle_timeout.try_into().ok());
        transport_config.max_concurrent_bidi_streams(iroh::endpoint::VarInt::from_u32(100));
        transport_config
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("direct_timeout", self.direct_timeout),
            ("relay_timeout", self.relay_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("idle_timeout", self.idle_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::InvalidConfig(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

/// An iroh endpoint bound to one identity.
#[derive(Debug, Clone)]
pub struct SendmeEndpoint {
    endpoint: Endpoint,
    config: Arc<EndpointConfig>,
    state: Arc<Mutex<ConnectionState>>,
}

impl SendmeEndpoint {
    /// Validate `config` and bind the endpoint.
    pub async fn bind(config: EndpointConfig) -> Result<Self> {
        debug!(state = ?ConnectionState::Unbound, "binding endpoint");
        config.validate()?;
        let relay_mode = config.relay_mode()?;
        let secret_key = config
            .secret_key
            .clone()
            .unwrap_or_else(|| SecretKey::generate(&mut rand::rng()));

        let mut builder = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(config.accept_alpns.clone())
            .relay_mode(relay_mode)
            .transport_config(config.transport_config());
        if !config.discovery {
            builder = builder.clear_discovery();
        }
        if let Some(addr) = config.bind_addr_v4 {
            builder = builder.bind_addr_v4(addr);
        }
        if let Some(addr) = config.bind_addr_v6 {
            builder = builder.bind_addr_v6(addr);
        }

        let endpoint = builder.bind().await.map_err(|e| Error::Bind(e.to_string()))?;
        info!(
            endpoint_id = %endpoint.id(),
            relay = %config.relay,
            discovery = config.discovery,
            state = ?ConnectionState::Bound,
            "endpoint bound"
        );

        Ok(Self {
            endpoint,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(ConnectionState::Bound)),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn id(&self) -> EndpointId {
        self.endpoint.id()
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current reachable address.
    ///
    /// Waits a bounded time for the endpoint to learn a direct address and,
    /// when relays are enabled, its home relay.
    pub async fn node_addr(&self) -> NodeAddr {
        let relay_wanted = self.config.relay != RelaySetting::Disabled;
        let deadline = Instant::now() + ADDR_WAIT;
        loop {
            let addr = self.endpoint.addr();
            let has_relay = addr.addrs.iter().any(|a| matches!(a, TransportAddr::Relay(_)));
            let has_direct = addr.addrs.iter().any(|a| matches!(a, TransportAddr::Ip(_)));
            if (has_direct && (has_relay || !relay_wanted)) || Instant::now() >= deadline {
                return addr.into();
            }
            sleep(Duration::from_millis(50)).await;
        }
    }

    /// Address built from the bound sockets, with unspecified IPs mapped to
    /// loopback.
    pub fn loopback_addr(&self) -> NodeAddr {
        let addrs = self.endpoint.bound_sockets().into_iter().map(|sock| {
            let ip = match sock {
                SocketAddr::V4(v4) if v4.ip().is_unspecified() => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(v6) if v6.ip().is_unspecified() => Ipv6Addr::LOCALHOST.into(),
                other => other.ip(),
            };
            SocketAddr::new(ip, sock.port()).to_string()
        });
        NodeAddr::new(self.id()).with_direct_addresses(addrs)
    }

    /// Connect to a peer, trying its direct addresses, then its relay, then
    /// discovery when the address carries neither.
    ///
    /// The TLS handshake pins `addr.peer`, so a socket answering with a
    /// different key fails that attempt and ends up as
    /// `ConnectionUnreachable`, never as a connection to the wrong peer.
    /// `PeerMismatch` is left for a handshake that completes with an
    /// unexpected id.
    pub async fn connect(&self, addr: &NodeAddr) -> Result<PeerConnection> {
        let peer = addr.peer;
        info!(peer = %peer, state = ?ConnectionState::Connecting, "connecting");
        let mut attempts = Vec::new();

        let (direct, invalid) = addr.parsed_direct_addresses();
        for bad in invalid {
            attempts.push(format!("direct: invalid address {bad:?}"));
        }
        if !direct.is_empty() {
            let target = EndpointAddr {
                id: peer,
                addrs: direct.into_iter().map(TransportAddr::Ip).collect(),
            };
            match self.try_connect("direct", target, self.config.direct_timeout).await {
                Ok(conn) => return self.connected(peer, conn),
                Err(reason) => attempts.push(reason),
            }
        }

        match addr.parsed_relay_url() {
            Some(Ok(url)) => {
                let target = EndpointAddr {
                    id: peer,
                    addrs: [TransportAddr::Relay(url)].into_iter().collect(),
                };
                match self.try_connect("relay", target, self.config.relay_timeout).await {
                    Ok(conn) => return self.connected(peer, conn),
                    Err(reason) => attempts.push(reason),
                }
            }
            Some(Err(e)) => attempts.push(format!("relay: {e}")),
            None => {}
        }

        if !addr.is_reachable() {
            if self.config.discovery {
                let target = EndpointAddr::new(peer);
                match self
                    .try_connect("discovery", target, self.config.discovery_timeout)
                    .await
                {
                    Ok(conn) => return self.connected(peer, conn),
                    Err(reason) => attempts.push(reason),
                }
            } else {
                attempts.push("discovery: disabled".to_string());
            }
        }

        warn!(peer = %peer, state = ?ConnectionState::Failed, attempts = ?attempts, "peer unreachable");
        Err(Error::ConnectionUnreachable {
            peer: peer.to_string(),
            attempts,
        })
    }

    async fn try_connect(
        &self,
        strategy: &str,
        target: EndpointAddr,
        limit: Duration,
    ) -> std::result::Result<Connection, String> {
        debug!(strategy, peer = %target.id, timeout = ?limit, "trying strategy");
        match timeout(limit, self.endpoint.connect(target, ALPN)).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(format!("{strategy}: {e}")),
            Err(_) => Err(format!("{strategy}: timed out after {limit:?}")),
        }
    }

    fn connected(&self, expected: EndpointId, conn: Connection) -> Result<PeerConnection> {
        let actual = conn.remote_id();
        if actual != expected {
            conn.close(1u8.into(), b"peer mismatch");
            return Err(Error::PeerMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        info!(peer = %actual, state = ?ConnectionState::Connected, "connected");
        Ok(PeerConnection::new(conn))
    }

    /// Close every connection and the socket.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        self.endpoint.close().await;
        info!(endpoint_id = %self.id(), state = ?ConnectionState::Closed, "endpoint closed");
    }
}

/// An authenticated connection to one peer.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    conn: Connection,
    state: Arc<Mutex<ConnectionState>>,
}

impl PeerConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            state: Arc::new(Mutex::new(ConnectionState::Connected)),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn remote_id(&self) -> EndpointId {
        self.conn.remote_id()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the connection failed and close it.
    pub fn fail(&self, reason: &str) {
        self.transition(ConnectionState::Failed, 1, reason);
    }

    /// Close the connection. Calling this more than once has no effect.
    pub fn close(&self) {
        self.transition(ConnectionState::Closed, 0, "done");
    }

    fn transition(&self, next: ConnectionState, code: u8, reason: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(*state, ConnectionState::Closed | ConnectionState::Failed) {
            return;
        }
        *state = next;
        drop(state);
        self.conn.close(code.into(), reason.as_bytes());
        debug!(peer = %self.remote_id(), state = ?next, "connection closed");
    }
}
