//! Message routing with failure-triggered mailbox demotion.
//!
//! `send_message` resolves the target's destination through the registry
//! and performs the delivery:
//! - mailbox targets are enqueued under the entry lock,
//! - group targets fan out by re-entering the router for each member of a
//!   membership snapshot,
//! - live targets are delivered outside any lock; a failed delivery demotes
//!   the entry to an empty mailbox and retries once through the normal
//!   path, so the message lands in the fresh mailbox instead of being lost.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::registry::{AccountRegistry, RouteStep};

/// Resolves target names and performs delivery.
#[derive(Clone)]
pub struct Router {
    registry: Arc<AccountRegistry>,
}

impl Router {
    /// Create a router over the shared registry.
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        Self { registry }
    }

    /// Whether `name` can currently be addressed.
    ///
    /// Callers are expected to check before sending; `send_message` itself
    /// silently no-ops on an unknown target.
    pub fn check_for_account(&self, name: &str) -> bool {
        self.registry.exists(name)
    }

    /// Send `message` to the account or group named `target`.
    ///
    /// Never fails: delivery failure to a live endpoint is recovered by
    /// demotion, and an unknown target is dropped. The sender is not
    /// informed of either.
    pub async fn send_message(&self, target: &str, message: &str) {
        self.dispatch(target, message, true).await;
    }

    async fn dispatch(&self, target: &str, message: &str, allow_retry: bool) {
        match self.registry.route(target, message) {
            RouteStep::NoRecipient => {
                debug!(target, "no such recipient, message dropped");
            }
            RouteStep::Queued => {
                debug!(target, "message queued in mailbox");
            }
            RouteStep::FanOut(members) => {
                debug!(target, members = members.len(), "fanning out to group");
                // Per-member failures demote that member only; delivery to
                // the rest of the group proceeds. A member deleted since
                // the snapshot resolves to NoRecipient.
                for member in &members {
                    Box::pin(self.dispatch(member, message, true)).await;
                }
            }
            RouteStep::Deliver { endpoint, epoch } => {
                if endpoint.receive_message(message).await.is_ok() {
                    debug!(target, "message delivered");
                    return;
                }
                warn!(target, "unable to reach logged in client, demoting to mailbox");
                self.registry.demote_if_current(target, epoch);
                if allow_retry {
                    Box::pin(self.dispatch(target, message, false)).await;
                } else if !self.registry.enqueue_if_offline(target, message) {
                    // Only reachable when two logins raced the retry and
                    // both endpoints failed; demotion happens at most once
                    // per send.
                    warn!(target, "message dropped after repeated delivery failure");
                }
            }
        }
    }
}
