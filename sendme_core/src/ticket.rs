//! Tickets: everything a receiver needs to fetch content from a sender.

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use bincode::Options;
use data_encoding::BASE32_NOPAD;
use iroh::{EndpointAddr, EndpointId, RelayUrl, TransportAddr};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hash::{BlobFormat, BlobHash};

/// Version prefix of the ticket text form
pub const TICKET_PREFIX: &str = "blob1";

/// How to reach a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddr {
    pub peer: EndpointId,
    pub relay_url: Option<String>,
    pub direct_addresses: BTreeSet<String>,
}

impl NodeAddr {
    pub fn new(peer: EndpointId) -> Self {
        Self {
            peer,
            relay_url: None,
            direct_addresses: BTreeSet::new(),
        }
    }

    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = Some(url.into());
        self
    }

    pub fn with_direct_addresses<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.direct_addresses.extend(addrs.into_iter().map(Into::into));
        self
    }

    /// True if the address carries a relay URL or any direct address.
    /// Otherwise the peer can only be found through discovery.
    pub fn is_reachable(&self) -> bool {
        self.relay_url.is_some() || !self.direct_addresses.is_empty()
    }

    /// Direct addresses split into parsed socket addresses and the strings
    /// that failed to parse.
    pub fn parsed_direct_addresses(&self) -> (Vec<SocketAddr>, Vec<String>) {
        let mut ok = Vec::new();
        let mut bad = Vec::new();
        for addr in &self.direct_addresses {
            match addr.parse() {
                Ok(sock) => ok.push(sock),
                Err(_) => bad.push(addr.clone()),
            }
        }
        (ok, bad)
    }

    pub fn parsed_relay_url(&self) -> Option<Result<RelayUrl, Error>> {
        self.relay_url.as_ref().map(|url| {
            url.parse::<RelayUrl>()
                .map_err(|e| Error::InvalidTicket(format!("relay url {url:?}: {e}")))
        })
    }
}

impl From<EndpointAddr> for NodeAddr {
    fn from(addr: EndpointAddr) -> Self {
        let mut node = NodeAddr::new(addr.id);
        for transport in &addr.addrs {
            match transport {
                TransportAddr::Ip(sock) => {
                    node.direct_addresses.insert(sock.to_string());
                }
                TransportAddr::Relay(url) => {
                    if node.relay_url.is_none() {
                        node.relay_url = Some(url.to_string());
                    }
                }
                _ => {}
            }
        }
        node
    }
}

impl From<&NodeAddr> for EndpointAddr {
    /// Unparseable addresses are dropped.
    fn from(node: &NodeAddr) -> Self {
        let (direct, _) = node.parsed_direct_addresses();
        let mut addrs: BTreeSet<TransportAddr> = direct.into_iter().map(TransportAddr::Ip).collect();
        if let Some(Ok(url)) = node.parsed_relay_url() {
            addrs.insert(TransportAddr::Relay(url));
        }
        EndpointAddr { id: node.peer, addrs }
    }
}

/// Which addressing information goes into a ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketType {
    /// Peer id only; the receiver resolves it through discovery.
    Id,
    #[default]
    RelayAndAddresses,
    Relay,
    Addresses,
}

impl TicketType {
    /// Strip what this policy excludes.
    pub fn apply(&self, mut addr: NodeAddr) -> NodeAddr {
        match self {
            TicketType::Id => {
                addr.relay_url = None;
                addr.direct_addresses.clear();
            }
            TicketType::RelayAndAddresses => {}
            TicketType::Relay => addr.direct_addresses.clear(),
            TicketType::Addresses => addr.relay_url = None,
        }
        addr
    }

    /// Whether the sender must publish itself to discovery for this ticket
    /// to be usable.
    pub fn needs_discovery(&self) -> bool {
        matches!(self, TicketType::Id)
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketType::Id => "id",
            TicketType::RelayAndAddresses => "relay-and-addresses",
            TicketType::Relay => "relay",
            TicketType::Addresses => "addresses",
        };
        f.write_str(s)
    }
}

impl FromStr for TicketType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(TicketType::Id),
            "relay-and-addresses" => Ok(TicketType::RelayAndAddresses),
            "relay" => Ok(TicketType::Relay),
            "addresses" => Ok(TicketType::Addresses),
            other => Err(Error::InvalidConfig(format!("unknown ticket type {other:?}"))),
        }
    }
}

/// Serialized form of a ticket
#[derive(Serialize, Deserialize)]
struct TicketWire {
    peer: [u8; 32],
    relay_url: Option<String>,
    direct_addresses: Vec<String>,
    hash: BlobHash,
    format: BlobFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    node: NodeAddr,
    hash: BlobHash,
    format: BlobFormat,
}

impl Ticket {
    pub fn new(node: NodeAddr, hash: BlobHash, format: BlobFormat) -> Self {
        Self { node, hash, format }
    }

    pub fn node_addr(&self) -> &NodeAddr {
        &self.node
    }

    pub fn hash(&self) -> BlobHash {
        self.hash
    }

    pub fn format(&self) -> BlobFormat {
        self.format
    }

    fn to_wire(&self) -> TicketWire {
        TicketWire {
            peer: *self.node.peer.as_bytes(),
            relay_url: self.node.relay_url.clone(),
            direct_addresses: self.node.direct_addresses.iter().cloned().collect(),
            hash: self.hash,
            format: self.format,
        }
    }
}

/// Fixed-width little-endian encoding that rejects trailing bytes.
fn wire_options() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = wire_options().serialize(&self.to_wire()).map_err(|_| fmt::Error)?;
        write!(
            f,
            "{}{}",
            TICKET_PREFIX,
            BASE32_NOPAD.encode(&bytes).to_ascii_lowercase()
        )
    }
}

impl FromStr for Ticket {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s
            .strip_prefix(TICKET_PREFIX)
            .ok_or_else(|| Error::InvalidTicket(format!("missing {TICKET_PREFIX:?} prefix")))?;
        let bytes = BASE32_NOPAD
            .decode(body.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidTicket(format!("invalid base32: {e}")))?;
        let wire: TicketWire = wire_options()
            .deserialize(&bytes)
            .map_err(|e| Error::InvalidTicket(format!("invalid payload: {e}")))?;
        let peer = EndpointId::from_bytes(&wire.peer)
            .map_err(|e| Error::InvalidTicket(format!("invalid peer id: {e}")))?;

        let ticket = Ticket {
            node: NodeAddr {
                peer,
                relay_url: wire.relay_url,
                direct_addresses: wire.direct_addresses.into_iter().collect(),
            },
            hash: wire.hash,
            format: wire.format,
        };
        // unsorted or repeated addresses would not survive a round trip
        let canonical = wire_options()
            .serialize(&ticket.to_wire())
            .map_err(|e| Error::InvalidTicket(format!("invalid payload: {e}")))?;
        if canonical != bytes {
            return Err(Error::InvalidTicket("non-canonical encoding".to_string()));
        }
        Ok(ticket)
    }
}
