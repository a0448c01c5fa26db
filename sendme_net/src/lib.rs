//! Peer connectivity and the blob transfer protocol for sendme.

pub mod connector;
pub mod listener;
pub mod protocol;
pub mod receiver;
pub mod sender;

pub use connector::{ConnectionState, EndpointConfig, PeerConnection, SendmeEndpoint};
pub use listener::ConnectionListener;
pub use protocol::ALPN;
pub use receiver::{FetchOptions, FetchStats, Fetched, Received, export_collection, fetch, receive};
pub use sender::ServeOptions;
