//! Content-addressed storage, collections and tickets for sendme.

pub mod collection;
pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod identity;
mod import;
pub mod progress;
pub mod session;
pub mod store;
pub mod ticket;
pub mod validation;

pub use collection::Collection;
pub use config::{RelaySetting, Settings};
pub use error::{Error, ErrorKind, Result};
pub use hash::{BlobFormat, BlobHash, HashAndFormat, HashFormat};
pub use progress::{ProgressEvent, ProgressSender};
pub use session::{SessionDir, SessionKind};
pub use store::{ContentStore, TempTag};
pub use ticket::{NodeAddr, Ticket, TicketType};
