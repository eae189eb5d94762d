//! Per-mutation lifecycle.
//!
//! `Idle -> Optimistic -> Succeeded -> Reconciled` or
//! `Idle -> Optimistic -> Failed -> RolledBack`. Each step consumes the previous
//! one, so an illegal transition does not type-check. [`MutationState`] names
//! the step reached, for logs.

use crate::domain::{MutationId, MutationKind};
use crate::sync::store::{CacheEntry, CacheKey, CartStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Optimistic,
    Succeeded,
    Failed,
    Reconciled,
    RolledBack,
}

/// A dispatched mutation holding the entry it displaced.
#[derive(Debug)]
pub struct PendingMutation {
    id: MutationId,
    kind: MutationKind,
    key: CacheKey,
    snapshot: Option<CacheEntry>,
}

impl PendingMutation {
    pub fn begin(id: MutationId, kind: MutationKind, key: CacheKey, snapshot: Option<CacheEntry>) -> Self {
        Self { id, kind, key, snapshot }
    }

    pub fn succeed(self) -> SucceededMutation {
        SucceededMutation { id: self.id, kind: self.kind }
    }

    pub fn fail(self) -> FailedMutation {
        FailedMutation { id: self.id, kind: self.kind, key: self.key, snapshot: self.snapshot }
    }
}

#[derive(Debug)]
pub struct SucceededMutation {
    id: MutationId,
    kind: MutationKind,
}

impl SucceededMutation {
    pub fn id(&self) -> MutationId { self.id }
    pub fn kind(&self) -> MutationKind { self.kind }

    /// Called once the authoritative cart has replaced the overlay.
    pub fn reconciled(self) -> MutationState { MutationState::Reconciled }
}

#[derive(Debug)]
pub struct FailedMutation {
    id: MutationId,
    kind: MutationKind,
    key: CacheKey,
    snapshot: Option<CacheEntry>,
}

impl FailedMutation {
    pub fn id(&self) -> MutationId { self.id }
    pub fn kind(&self) -> MutationKind { self.kind }

    /// Reinstalls the pre-dispatch entry, overlay and all.
    pub fn roll_back(self, store: &CartStore) -> MutationState {
        store.restore(&self.key, self.snapshot);
        MutationState::RolledBack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cart;

    #[test]
    fn test_failed_mutation_restores_snapshot() {
        let store = CartStore::new();
        let key = CacheKey::cart("cart_1", "*items");
        store.confirm(&key, Cart::new("cart_1", "reg_us", "usd"));
        let before = store.entry(&key);

        let id = MutationId::new();
        let snapshot = store.install_overlay(&key, id, |c| {
            let mut next = c.clone();
            next.email = Some("shopper@example.com".into());
            next
        });
        let failed = PendingMutation::begin(id, MutationKind::UpdateCart, key.clone(), snapshot).fail();
        assert_eq!((failed.id(), failed.kind()), (id, MutationKind::UpdateCart));
        assert_eq!(failed.roll_back(&store), MutationState::RolledBack);
        assert_eq!(store.entry(&key), before);
    }

    #[test]
    fn test_rollback_without_prior_entry_clears_key() {
        let store = CartStore::new();
        let key = CacheKey::cart("cart_1", "*items");
        let pending = PendingMutation::begin(MutationId::new(), MutationKind::AddItem, key.clone(), None);
        store.confirm(&key, Cart::new("cart_1", "reg_us", "usd"));
        pending.fail().roll_back(&store);
        assert!(store.entry(&key).is_none());
    }

    #[test]
    fn test_success_ends_reconciled() {
        let id = MutationId::new();
        let succeeded = PendingMutation::begin(id, MutationKind::AddItem, CacheKey::cart("cart_1", "*items"), None).succeed();
        assert_eq!(succeeded.id(), id);
        assert_eq!(succeeded.kind(), MutationKind::AddItem);
        assert_eq!(succeeded.reconciled(), MutationState::Reconciled);
    }
}
