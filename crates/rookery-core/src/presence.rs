//! Login and logout transitions, including the mailbox flush on reconnect.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::destination::{Destination, Endpoint};
use crate::error::ChatError;
use crate::registry::AccountRegistry;

/// Handles online/offline transitions for accounts.
#[derive(Clone)]
pub struct PresenceManager {
    registry: Arc<AccountRegistry>,
}

impl PresenceManager {
    /// Create a presence manager over the shared registry.
    pub fn new(registry: Arc<AccountRegistry>) -> Self {
        Self { registry }
    }

    /// Bind `name` to a live endpoint, creating the account on first login.
    ///
    /// If the account was offline, every queued message is delivered to the
    /// new endpoint in original send order. If any delivery in the flush
    /// fails, the original mailbox is reinstalled (queued messages are
    /// preserved, the login is undone) and the failure is reported; the
    /// caller should treat the login as not having taken effect and retry.
    pub async fn login(&self, name: &str, endpoint: Arc<dyn Endpoint>) -> Result<(), ChatError> {
        let transition = self.registry.install_endpoint(name, Arc::clone(&endpoint));

        let Some(mailbox) = transition.flush else {
            debug!(account = name, "logged in");
            return Ok(());
        };

        debug!(
            account = name,
            pending = mailbox.len(),
            "logged in, flushing queued messages"
        );

        let pending = mailbox.messages().to_vec();
        for message in &pending {
            if let Err(error) = endpoint.receive_message(message).await {
                warn!(account = name, %error, "login flush failed, restoring mailbox");
                // Keep the queue intact at the cost of undoing the login.
                // The epoch check yields to a login/logout that raced us.
                if !self.registry.rollback_login(name, transition.epoch, mailbox) {
                    debug!(account = name, "entry replaced concurrently, rollback skipped");
                }
                return Err(ChatError::Communication(format!(
                    "failed to flush queued messages to {name}"
                )));
            }
        }

        debug!(account = name, flushed = pending.len(), "mailbox flushed");
        Ok(())
    }

    /// Mark `name` offline by binding it to a new, empty mailbox.
    ///
    /// Unconditional: whatever destination was installed is discarded,
    /// including a pre-existing mailbox and its queued messages if the
    /// account was already offline.
    pub fn logout(&self, name: &str) {
        self.registry.replace(name, Destination::empty_mailbox());
        debug!(account = name, "logged out");
    }
}
