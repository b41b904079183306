// The message store: append, query, range and delete over a backend

use crate::relay::error::{StoreError, StoreResult};
use crate::relay::message::{timestamp, Message, Store};
use crate::relay::storage::{JsonFileBackend, StoreBackend};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const MISSING_FIELDS: &str = "Missing sender, recipient, or message";
pub const MISSING_IDS: &str = "No Message IDs Provided";

/// Message store over a pluggable backend.
///
/// Every operation loads the whole store from the backend, and every
/// mutation writes it back in full. Mutations are serialized through a
/// single lock held across load, mutate and save, so writers sharing one
/// `MessageStore` never lose each other's updates. Reads take no lock and
/// rely on the backend's saves being atomic.
///
/// Separate handles or processes pointed at the same file are not
/// coordinated: one may overwrite the other's update, though each save
/// still lands whole.
pub struct MessageStore {
    backend: Box<dyn StoreBackend>,
    write_lock: Mutex<()>,
}

impl MessageStore {
    /// Open a store backed by a JSON file at `path`
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self::with_backend(JsonFileBackend::new(path.as_ref()))
    }

    pub fn with_backend(backend: impl StoreBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            write_lock: Mutex::new(()),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a new message for `recipient` and return its ID
    pub fn append(&self, recipient: &str, sender: &str, body: &str) -> StoreResult<String> {
        if recipient.is_empty() || sender.is_empty() || body.is_empty() {
            return Err(StoreError::invalid(MISSING_FIELDS));
        }

        let _guard = self.lock_writes();
        let mut store = self.backend.load()?;

        let mut id = Message::generate_id();
        while store.contains_id(&id) {
            id = Message::generate_id();
        }

        let message = Message::new(id.clone(), sender.to_string(), body.to_string());
        store.mailbox_entry(recipient).push(message);
        self.backend.save(&store)?;

        tracing::info!("Stored message {} for {} from {}", id, recipient, sender);
        Ok(id)
    }

    /// Messages for `recipient` in insertion order, optionally only those
    /// created strictly after `since`.
    ///
    /// Fails with `NotFound` when the recipient has no messages at all.
    pub fn list_since(&self, recipient: &str, since: Option<&str>) -> StoreResult<Vec<Message>> {
        let store = self.backend.load()?;
        let mailbox = match store.mailbox(recipient) {
            Some(mailbox) if !mailbox.is_empty() => mailbox,
            _ => return Err(StoreError::NotFound(recipient.to_string())),
        };

        let since = since
            .map(|raw| {
                timestamp::parse(raw)
                    .ok_or_else(|| StoreError::invalid(format!("Invalid timestamp: {}", raw)))
            })
            .transpose()?;

        let messages = match since {
            Some(since) => mailbox.since(&since),
            None => mailbox.messages().to_vec(),
        };

        tracing::debug!(
            "Listing {} of {} messages for {}",
            messages.len(),
            mailbox.len(),
            recipient
        );
        Ok(messages)
    }

    /// The `[start, stop)` window of `recipient`'s messages sorted by time.
    ///
    /// An unknown recipient yields an empty list.
    pub fn list_range(&self, recipient: &str, start: usize, stop: usize) -> StoreResult<Vec<Message>> {
        let store = self.backend.load()?;
        let messages = store
            .mailbox(recipient)
            .map(|mailbox| mailbox.range(start, stop))
            .unwrap_or_default();

        tracing::debug!(
            "Range [{}, {}) for {} returned {} messages",
            start,
            stop,
            recipient,
            messages.len()
        );
        Ok(messages)
    }

    /// Remove the given message IDs from `recipient`'s mailbox and return
    /// how many were actually removed. Unknown IDs are ignored.
    pub fn delete(&self, recipient: &str, ids: Option<&HashSet<String>>) -> StoreResult<usize> {
        let ids = ids.ok_or_else(|| StoreError::invalid(MISSING_IDS))?;

        let _guard = self.lock_writes();
        let mut store = self.backend.load()?;

        let removed = match store.mailbox_mut(recipient) {
            Some(mailbox) => {
                let removed = mailbox.remove_ids(ids);
                if mailbox.is_empty() {
                    store.remove_mailbox(recipient);
                }
                removed
            }
            None => 0,
        };

        self.backend.save(&store)?;

        tracing::info!("Deleted {} messages for {}", removed, recipient);
        Ok(removed)
    }

    /// Whether `recipient` has at least one message
    pub fn contains(&self, recipient: &str) -> StoreResult<bool> {
        let store = self.backend.load()?;
        Ok(store
            .mailbox(recipient)
            .map_or(false, |mailbox| !mailbox.is_empty()))
    }

    /// Snapshot of the whole store as currently persisted
    pub fn load(&self) -> StoreResult<Store> {
        self.backend.load()
    }
}
