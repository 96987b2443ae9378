//! Delivery targets bound to account names.
//!
//! Every account name in the registry maps to exactly one [`Destination`]:
//! - [`Destination::Live`] wraps a connected client's delivery callback,
//! - [`Destination::Group`] owns a set of member account names and fans
//!   messages out to them,
//! - [`Destination::Mailbox`] queues messages for an offline account.
//!
//! Only live endpoints can fail delivery; groups and mailboxes always
//! accept a message.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChatError;

/// A remote client's message callback.
///
/// This is the push half of the RPC surface: the server invokes it to hand
/// a message to a connected client. An `Err` return is the trigger for
/// mailbox demotion. Implementations are expected to bound a stalled
/// round-trip with their own timeout and report it as a
/// [`ChatError::Communication`].
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Deliver one message to the remote client.
    async fn receive_message(&self, message: &str) -> Result<(), ChatError>;
}

/// Ordered queue of messages pending for an offline account.
///
/// Insertion order is preserved and growth is unbounded; the queue is
/// drained (or rolled back wholesale) by the login flush.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    messages: Vec<String>,
}

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for later delivery.
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Queued messages in original send order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the mailbox holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Named set of member account names.
///
/// Invariant (enforced by the registry at insertion time): every member
/// refers to an existing non-group destination. Groups never nest, which
/// bounds fan-out at one level and forecloses dispatch cycles.
#[derive(Debug, Clone, Default)]
pub struct Group {
    members: HashSet<String>,
}

impl Group {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `member` is currently in the group.
    pub fn contains(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    /// Snapshot of the current membership.
    pub fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    // Membership is mutated through the registry only, which validates the
    // no-nested-groups invariant against the other entries.
    pub(crate) fn insert(&mut self, member: &str) {
        self.members.insert(member.to_string());
    }

    pub(crate) fn remove(&mut self, member: &str) {
        self.members.remove(member);
    }
}

/// The current delivery target bound to an account name.
#[derive(Clone)]
pub enum Destination {
    /// A connected client, reachable through its callback.
    Live(Arc<dyn Endpoint>),
    /// A named set of member accounts.
    Group(Group),
    /// Queued messages for an offline account.
    Mailbox(Mailbox),
}

impl Destination {
    /// A fresh, empty mailbox destination.
    pub fn empty_mailbox() -> Self {
        Destination::Mailbox(Mailbox::new())
    }

    /// A fresh, empty group destination.
    pub fn empty_group() -> Self {
        Destination::Group(Group::new())
    }

    /// Whether this destination is a group.
    pub fn is_group(&self) -> bool {
        matches!(self, Destination::Group(_))
    }

    /// Whether this destination is a live endpoint.
    pub fn is_live(&self) -> bool {
        matches!(self, Destination::Live(_))
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Live(_) => f.write_str("Live"),
            Destination::Group(g) => f.debug_tuple("Group").field(g).finish(),
            Destination::Mailbox(m) => f.debug_tuple("Mailbox").field(m).finish(),
        }
    }
}
