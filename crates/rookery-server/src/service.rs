//! The RPC surface exposed to account holders, mapped onto the routing core.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use rookery_core::{AccountRegistry, ChatError, Destination, Endpoint, PresenceManager, Router};

/// Facade over the registry, router and presence manager.
///
/// One instance is shared by every connection; all state lives in the
/// registry.
pub struct ChatService {
    registry: Arc<AccountRegistry>,
    router: Router,
    presence: PresenceManager,
}

impl Default for ChatService {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatService {
    /// Create a service with an empty registry.
    pub fn new() -> Self {
        let registry = Arc::new(AccountRegistry::new());
        Self {
            router: Router::new(Arc::clone(&registry)),
            presence: PresenceManager::new(Arc::clone(&registry)),
            registry,
        }
    }

    /// Whether `name` exists on the server.
    pub fn check_for_account(&self, name: &str) -> bool {
        self.router.check_for_account(name)
    }

    /// Log `name` in on the given endpoint, creating the account on first
    /// login and flushing any queued messages.
    pub async fn login(&self, name: &str, endpoint: Arc<dyn Endpoint>) -> Result<(), ChatError> {
        self.presence.login(name, endpoint).await
    }

    /// Log `name` out; messages sent to it will queue until the next login.
    pub fn logout(&self, name: &str) {
        self.presence.logout(name);
    }

    /// Create a user account with an empty mailbox.
    pub fn add_account(&self, name: &str) -> Result<(), ChatError> {
        self.registry.add(name, Destination::empty_mailbox())?;
        debug!(account = name, "account added");
        Ok(())
    }

    /// Create an empty group.
    pub fn add_group(&self, name: &str) -> Result<(), ChatError> {
        self.registry.add(name, Destination::empty_group())?;
        debug!(group = name, "group added");
        Ok(())
    }

    /// Add an existing non-group account to a group.
    pub fn add_group_member(&self, group: &str, member: &str) -> Result<(), ChatError> {
        self.registry.add_member(group, member)
    }

    /// List user accounts whose name matches `pattern` (empty matches all).
    pub fn list_accounts(&self, pattern: &str) -> Result<Vec<String>, ChatError> {
        self.list(pattern, false)
    }

    /// List groups whose name matches `pattern` (empty matches all).
    pub fn list_groups(&self, pattern: &str) -> Result<Vec<String>, ChatError> {
        self.list(pattern, true)
    }

    fn list(&self, pattern: &str, want_groups: bool) -> Result<Vec<String>, ChatError> {
        if pattern.is_empty() {
            return Ok(self.registry.list(|_| true, want_groups));
        }
        // Whole-name matching: "al.*" matches "alice" but "al" alone
        // does not.
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| ChatError::InvalidOperation(format!("invalid pattern: {e}")))?;
        Ok(self
            .registry
            .list(|name| regex.is_match(name), want_groups))
    }

    /// Send `message` to the account or group named `target`.
    ///
    /// Silently no-ops if the target does not exist; callers are expected
    /// to `check_for_account` first.
    pub async fn send_message(&self, target: &str, message: &str) {
        self.router.send_message(target, message).await;
    }

    /// Delete an account or group.
    ///
    /// Returns 0 on success and -1 if `name` does not exist, for scripted
    /// use. Deletion scrubs the name from every group's membership.
    pub fn delete_account(&self, name: &str) -> i32 {
        match self.registry.remove(name) {
            Ok(()) => 0,
            Err(_) => -1,
        }
    }
}
