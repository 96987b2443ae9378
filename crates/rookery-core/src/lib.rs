//! Rookery routing core: a presence-aware message router for a multi-user
//! chat service.
//!
//! The core maintains a registry of named destinations (users, groups and
//! offline mailboxes), resolves message targets uniformly regardless of
//! destination kind, and recovers from delivery failure by queuing messages
//! for later retrieval:
//! - [`AccountRegistry`] is the single source of truth mapping account
//!   names to destinations,
//! - [`Router`] resolves a target and performs delivery, demoting a failed
//!   live endpoint to a mailbox,
//! - [`PresenceManager`] handles login/logout transitions, flushing queued
//!   messages on reconnect.
//!
//! Transport is out of scope here: the server crate supplies the
//! [`Endpoint`] implementation that carries messages to connected clients.

pub mod destination;
pub mod error;
pub mod presence;
pub mod registry;
pub mod router;

pub use destination::{Destination, Endpoint, Group, Mailbox};
pub use error::ChatError;
pub use presence::PresenceManager;
pub use registry::{AccountRegistry, LoginTransition, RouteStep};
pub use router::Router;
