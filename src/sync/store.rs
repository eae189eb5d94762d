//! Cart snapshot store: an explicit cache table of cart states.
//!
//! Entries are keyed by `(entity, id, projection)` and only change through
//! [`CartStore::confirm`], [`CartStore::confirm_fetched`],
//! [`CartStore::install_overlay`], [`CartStore::restore`] and the staleness markers.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::{Cart, MutationId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Cart,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: EntityKind,
    pub id: String,
    pub projection: String,
}

impl CacheKey {
    pub fn cart(id: impl Into<String>, projection: impl Into<String>) -> Self {
        Self { entity: EntityKind::Cart, id: id.into(), projection: projection.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CartState {
    Confirmed(Cart),
    Optimistic { overlay: Cart, baseline: Cart, mutation: MutationId },
}

impl CartState {
    /// The cart a reader should be shown.
    pub fn visible(&self) -> &Cart {
        match self {
            Self::Confirmed(cart) => cart,
            Self::Optimistic { overlay, .. } => overlay,
        }
    }

    pub fn is_optimistic(&self) -> bool { matches!(self, Self::Optimistic { .. }) }

    pub fn pending_mutation(&self) -> Option<MutationId> {
        match self {
            Self::Optimistic { mutation, .. } => Some(*mutation),
            Self::Confirmed(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub version: u64,
    pub state: CartState,
    pub stale: bool,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<CacheKey, CacheEntry>,
    epochs: HashMap<String, u64>,
    last_version: u64,
}

impl Table {
    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }

    fn bump_epoch(&mut self, id: &str) {
        *self.epochs.entry(id.to_string()).or_default() += 1;
    }
}

/// Versions only grow; both counters are advanced under the table's write lock.
///
/// Each cart also carries an epoch that moves whenever its cached data is
/// overlaid, invalidated or evicted. A read started in an older epoch is never
/// installed.
#[derive(Debug, Default)]
pub struct CartStore {
    table: RwLock<Table>,
}

impl CartStore {
    pub fn new() -> Self { Self::default() }

    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> { self.table.read().entries.get(key).cloned() }

    pub fn visible(&self, key: &CacheKey) -> Option<Cart> {
        self.table.read().entries.get(key).map(|e| e.state.visible().clone())
    }

    /// Missing entries count as stale.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.table.read().entries.get(key).map_or(true, |e| e.stale)
    }

    pub fn epoch(&self, id: &str) -> u64 { self.table.read().epochs.get(id).copied().unwrap_or_default() }

    pub fn len(&self) -> usize { self.table.read().entries.len() }
    pub fn is_empty(&self) -> bool { self.table.read().entries.is_empty() }

    /// Stores authoritative data for `key`, replacing whatever was visible.
    pub fn confirm(&self, key: &CacheKey, cart: Cart) -> u64 {
        let mut table = self.table.write();
        let version = table.next_version();
        table.entries.insert(key.clone(), CacheEntry { version, state: CartState::Confirmed(cart), stale: false });
        version
    }

    /// Installs a cart read from the backend during `epoch`.
    ///
    /// Skipped when the cart's epoch has moved on since the read was issued, or
    /// when an overlay is pending; that mutation's own refetch will settle it.
    pub fn confirm_fetched(&self, key: &CacheKey, cart: Cart, epoch: u64) -> Option<u64> {
        let mut table = self.table.write();
        if table.epochs.get(&key.id).copied().unwrap_or_default() != epoch {
            return None;
        }
        if table.entries.get(key).is_some_and(|e| e.state.is_optimistic()) {
            return None;
        }
        let version = table.next_version();
        table.entries.insert(key.clone(), CacheEntry { version, state: CartState::Confirmed(cart), stale: false });
        Some(version)
    }

    /// Computes an overlay from the visible cart and installs it in one step.
    /// Returns the entry it replaced; nothing is installed when `key` has no entry.
    pub fn install_overlay(
        &self,
        key: &CacheKey,
        mutation: MutationId,
        compute: impl FnOnce(&Cart) -> Cart,
    ) -> Option<CacheEntry> {
        let mut table = self.table.write();
        let previous = table.entries.get(key)?.clone();
        let baseline = previous.state.visible().clone();
        let overlay = compute(&baseline);
        let version = table.next_version();
        table.bump_epoch(&key.id);
        table.entries.insert(
            key.clone(),
            CacheEntry { version, state: CartState::Optimistic { overlay, baseline, mutation }, stale: previous.stale },
        );
        Some(previous)
    }

    /// Turns the overlay of `mutation` into confirmed data. Used when the backend
    /// acknowledged the change without returning the cart.
    pub fn promote_overlay(&self, key: &CacheKey, mutation: MutationId) -> bool {
        let mut table = self.table.write();
        let pending = table.entries.get(key).and_then(|e| e.state.pending_mutation());
        if pending != Some(mutation) { return false; }
        let version = table.next_version();
        let Some(entry) = table.entries.get_mut(key) else { return false };
        let cart = entry.state.visible().clone();
        entry.state = CartState::Confirmed(cart);
        entry.version = version;
        true
    }

    /// Puts back exactly what [`Self::install_overlay`] or [`Self::entry`] returned.
    pub fn restore(&self, key: &CacheKey, snapshot: Option<CacheEntry>) {
        let mut table = self.table.write();
        match snapshot {
            Some(entry) => { table.entries.insert(key.clone(), entry); }
            None => { table.entries.remove(key); }
        }
    }

    /// Marks every projection of cart `id` stale and starts a new epoch for it.
    /// Returns how many entries were touched.
    pub fn invalidate(&self, id: &str) -> usize {
        let mut table = self.table.write();
        table.bump_epoch(id);
        let mut touched = 0;
        for (key, entry) in table.entries.iter_mut() {
            if key.entity == EntityKind::Cart && key.id == id {
                entry.stale = true;
                touched += 1;
            }
        }
        touched
    }

    /// Drops every projection of cart `id`.
    pub fn evict(&self, id: &str) -> usize {
        let mut table = self.table.write();
        table.bump_epoch(id);
        let before = table.entries.len();
        table.entries.retain(|key, _| !(key.entity == EntityKind::Cart && key.id == id));
        before - table.entries.len()
    }
}
