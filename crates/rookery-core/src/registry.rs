//! The account registry: the single source of truth mapping account names
//! to their current destination.
//!
//! The registry uses a `DashMap` for concurrent access, the same discipline
//! the rest of the workspace uses for shared connection maps. Every entry
//! carries an epoch that is bumped on each destination change; the epoch is
//! what lets delivery run outside the lock and still demote or roll back
//! atomically (compare-and-swap against the epoch observed at resolve
//! time). A slow endpoint round-trip therefore never blocks other accounts'
//! login, logout or send operations.
//!
//! Structural invariants enforced here:
//! - names are unique across users and groups,
//! - group members always refer to existing non-group entries,
//! - removing an account scrubs it from every group's membership set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::destination::{Destination, Endpoint, Mailbox};
use crate::error::ChatError;

/// One registry entry: the destination plus the epoch at which it was
/// installed.
#[derive(Debug)]
struct Slot {
    epoch: u64,
    dest: Destination,
}

/// Outcome of resolving a target name under the entry lock.
///
/// `Queued` means the message was already appended to a mailbox while the
/// lock was held; the caller has nothing left to do. `Deliver` and `FanOut`
/// hand back everything needed to proceed without the lock.
pub enum RouteStep {
    /// The target name is not in the registry.
    NoRecipient,
    /// The message was appended to the target's mailbox.
    Queued,
    /// The target is live; deliver to `endpoint` outside the lock.
    Deliver {
        /// The live endpoint observed at resolve time.
        endpoint: Arc<dyn Endpoint>,
        /// Epoch of the entry the endpoint was read from.
        epoch: u64,
    },
    /// The target is a group; re-route to each member.
    FanOut(Vec<String>),
}

impl std::fmt::Debug for RouteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteStep::NoRecipient => f.write_str("NoRecipient"),
            RouteStep::Queued => f.write_str("Queued"),
            RouteStep::Deliver { epoch, .. } => f
                .debug_struct("Deliver")
                .field("epoch", epoch)
                .finish_non_exhaustive(),
            RouteStep::FanOut(members) => f.debug_tuple("FanOut").field(members).finish(),
        }
    }
}

/// Result of atomically installing a live endpoint for a name.
#[derive(Debug)]
pub struct LoginTransition {
    /// Epoch of the freshly installed live entry.
    pub epoch: u64,
    /// The previous mailbox, taken out for flushing, if there was one.
    pub flush: Option<Mailbox>,
}

/// Mapping from account name to destination.
///
/// Absence of a key means the account does not exist, which is distinct
/// from "exists but offline" (a mailbox destination).
#[derive(Default)]
pub struct AccountRegistry {
    accounts: DashMap<String, Slot>,
    epochs: AtomicU64,
}

impl AccountRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_epoch(&self) -> u64 {
        self.epochs.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether `name` is registered (as a user or a group).
    pub fn exists(&self, name: &str) -> bool {
        self.accounts.contains_key(name)
    }

    /// Register `name` with an initial destination.
    ///
    /// Fails with [`ChatError::AlreadyExists`] if the name is taken.
    pub fn add(&self, name: &str, dest: Destination) -> Result<(), ChatError> {
        match self.accounts.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ChatError::AlreadyExists(name.to_string())),
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    epoch: self.next_epoch(),
                    dest,
                });
                Ok(())
            }
        }
    }

    /// Snapshot of the current destination for `name`.
    pub fn get(&self, name: &str) -> Result<Destination, ChatError> {
        self.accounts
            .get(name)
            .map(|slot| slot.dest.clone())
            .ok_or_else(|| ChatError::NotFound(name.to_string()))
    }

    /// Unconditionally bind `name` to `dest`, creating the entry if absent.
    ///
    /// No side effects on other entries. Used by logout and by tests; login
    /// and demotion go through the epoch-checked operations below.
    pub fn replace(&self, name: &str, dest: Destination) {
        let epoch = self.next_epoch();
        match self.accounts.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.dest = dest;
                slot.epoch = epoch;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { epoch, dest });
            }
        }
    }

    /// Remove `name` from the registry and from every group's membership.
    ///
    /// The scrub is what keeps deleted names from lingering in groups and
    /// re-entering a fan-out if the name is later recreated as a different
    /// kind of account.
    pub fn remove(&self, name: &str) -> Result<(), ChatError> {
        for mut entry in self.accounts.iter_mut() {
            if let Destination::Group(group) = &mut entry.value_mut().dest {
                group.remove(name);
            }
        }
        match self.accounts.remove(name) {
            Some(_) => {
                debug!(account = name, "account removed");
                Ok(())
            }
            None => Err(ChatError::NotFound(name.to_string())),
        }
    }

    /// List account names filtered by destination kind and a caller-supplied
    /// name predicate.
    ///
    /// The result is sorted so that repeated calls against the same registry
    /// state return the same sequence.
    pub fn list<F>(&self, predicate: F, want_groups: bool) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut names: Vec<String> = self
            .accounts
            .iter()
            .filter(|entry| entry.value().dest.is_group() == want_groups)
            .filter(|entry| predicate(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Resolve `name` for delivery, performing the mailbox append inline.
    ///
    /// Holds the entry lock only long enough to read or append; live
    /// delivery and group fan-out happen in the caller, lock-free.
    pub fn route(&self, name: &str, message: &str) -> RouteStep {
        match self.accounts.get_mut(name) {
            None => RouteStep::NoRecipient,
            Some(mut slot) => {
                let slot = slot.value_mut();
                match &mut slot.dest {
                    Destination::Mailbox(mailbox) => {
                        mailbox.push(message);
                        RouteStep::Queued
                    }
                    Destination::Group(group) => RouteStep::FanOut(group.members()),
                    Destination::Live(endpoint) => RouteStep::Deliver {
                        endpoint: Arc::clone(endpoint),
                        epoch: slot.epoch,
                    },
                }
            }
        }
    }

    /// Demote `name` to a fresh empty mailbox, but only if its entry still
    /// carries `epoch`.
    ///
    /// Returns false when a concurrent login/logout already replaced the
    /// destination; the caller must re-resolve in that case.
    pub fn demote_if_current(&self, name: &str, epoch: u64) -> bool {
        match self.accounts.get_mut(name) {
            Some(mut slot) if slot.epoch == epoch => {
                let slot = slot.value_mut();
                slot.dest = Destination::empty_mailbox();
                slot.epoch = self.next_epoch();
                true
            }
            _ => false,
        }
    }

    /// Append `message` to `name`'s mailbox if (and only if) the entry is
    /// currently a mailbox. Last-resort path for a delivery retry that lost
    /// a race with a concurrent login.
    pub fn enqueue_if_offline(&self, name: &str, message: &str) -> bool {
        match self.accounts.get_mut(name) {
            Some(mut slot) => match &mut slot.value_mut().dest {
                Destination::Mailbox(mailbox) => {
                    mailbox.push(message);
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    /// Atomically bind `name` to a live endpoint, creating the account on
    /// first login.
    ///
    /// If the previous destination was a mailbox it is taken out and
    /// returned for flushing. The whole read-modify-write runs under the
    /// entry lock so it cannot interleave with a concurrent login or logout
    /// on the same name.
    pub fn install_endpoint(&self, name: &str, endpoint: Arc<dyn Endpoint>) -> LoginTransition {
        let epoch = self.next_epoch();
        match self.accounts.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                let previous = std::mem::replace(&mut slot.dest, Destination::Live(endpoint));
                slot.epoch = epoch;
                let flush = match previous {
                    Destination::Mailbox(mailbox) if !mailbox.is_empty() => Some(mailbox),
                    _ => None,
                };
                LoginTransition { epoch, flush }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    epoch,
                    dest: Destination::Live(endpoint),
                });
                LoginTransition { epoch, flush: None }
            }
        }
    }

    /// Reinstall the original mailbox after a failed login flush, but only
    /// if the entry still carries the epoch of the login being rolled back.
    pub fn rollback_login(&self, name: &str, epoch: u64, mailbox: Mailbox) -> bool {
        match self.accounts.get_mut(name) {
            Some(mut slot) if slot.epoch == epoch => {
                let slot = slot.value_mut();
                slot.dest = Destination::Mailbox(mailbox);
                slot.epoch = self.next_epoch();
                true
            }
            _ => false,
        }
    }

    /// Add `member` to the group registered as `group`.
    ///
    /// The member must exist and must not itself be a group; nesting is the
    /// mechanism that would reintroduce dispatch cycles.
    pub fn add_member(&self, group: &str, member: &str) -> Result<(), ChatError> {
        // Validate the member first, without holding the group entry: two
        // entry locks held at once would risk shard deadlock between
        // concurrent add_member calls. A member deleted in the window
        // before the insert resolves to a no-op at fan-out time.
        match self.accounts.get(member) {
            None => return Err(ChatError::NotFound(member.to_string())),
            Some(slot) if slot.dest.is_group() => {
                return Err(ChatError::InvalidOperation(
                    "cannot add one group to another".to_string(),
                ));
            }
            Some(_) => {}
        }

        match self.accounts.get_mut(group) {
            Some(mut slot) => match &mut slot.value_mut().dest {
                Destination::Group(members) => {
                    members.insert(member);
                    debug!(group, member, "group member added");
                    Ok(())
                }
                _ => Err(ChatError::InvalidOperation(format!("not a group: {group}"))),
            },
            None => Err(ChatError::InvalidOperation(format!("not a group: {group}"))),
        }
    }

    /// Remove `member` from the group registered as `group`.
    ///
    /// Idempotent with respect to membership: removing a non-member is not
    /// an error.
    pub fn remove_if_member(&self, group: &str, member: &str) -> Result<(), ChatError> {
        match self.accounts.get_mut(group) {
            Some(mut slot) => match &mut slot.value_mut().dest {
                Destination::Group(members) => {
                    members.remove(member);
                    Ok(())
                }
                _ => Err(ChatError::InvalidOperation(format!("not a group: {group}"))),
            },
            None => Err(ChatError::InvalidOperation(format!("not a group: {group}"))),
        }
    }
}
