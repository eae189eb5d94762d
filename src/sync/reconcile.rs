//! Reconciliation: replacing local cart state with the backend's.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::backend::{BackendError, CartBackend};
use crate::domain::Cart;
use crate::sync::store::{CacheKey, CartStore};

type SharedFetch = Shared<BoxFuture<'static, Result<Cart, BackendError>>>;

struct InFlight {
    epoch: u64,
    fetch: SharedFetch,
}

/// A cart read from the backend, tagged with the store epoch it was issued in.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub cart: Cart,
    pub epoch: u64,
}

/// Refetches carts, collapsing concurrent reads of one key into a single request.
///
/// Reads only share a request issued in the same store epoch. Once the cart is
/// invalidated, the next read goes back to the backend.
#[derive(Default)]
pub struct Reconciler {
    inflight: Mutex<HashMap<CacheKey, InFlight>>,
}

/// Unregisters a request when its waiter finishes or is dropped.
struct Registration<'a> {
    inflight: &'a Mutex<HashMap<CacheKey, InFlight>>,
    key: &'a CacheKey,
    fetch: SharedFetch,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock();
        if inflight.get(self.key).is_some_and(|current| current.fetch.ptr_eq(&self.fetch)) {
            inflight.remove(self.key);
        }
    }
}

impl Reconciler {
    pub fn new() -> Self { Self::default() }

    pub fn in_flight(&self) -> usize { self.inflight.lock().len() }

    /// Reads `key` from the backend, joining a request already in flight for it
    /// in the current epoch.
    pub async fn fetch<B: CartBackend + 'static>(
        &self,
        backend: &Arc<B>,
        store: &CartStore,
        key: &CacheKey,
    ) -> Result<Fetched, BackendError> {
        let (epoch, fetch) = {
            let mut inflight = self.inflight.lock();
            let epoch = store.epoch(&key.id);
            match inflight.get(key) {
                Some(existing) if existing.epoch == epoch => (epoch, existing.fetch.clone()),
                _ => {
                    let backend = Arc::clone(backend);
                    let (id, fields) = (key.id.clone(), key.projection.clone());
                    let fetch = async move { backend.retrieve_cart(&id, &fields).await }.boxed().shared();
                    inflight.insert(key.clone(), InFlight { epoch, fetch: fetch.clone() });
                    (epoch, fetch)
                }
            }
        };

        let registration = Registration { inflight: &self.inflight, key, fetch };
        let cart = registration.fetch.clone().await?;
        Ok(Fetched { cart, epoch })
    }

    /// Marks every projection of the cart stale, then refetches `key` and stores
    /// the result. Returns the version of the stored entry, or `None` when a
    /// newer change to the cart superseded this read.
    ///
    /// On error the store keeps whatever was installed before, flagged stale.
    pub async fn reconcile<B: CartBackend + 'static>(
        &self,
        backend: &Arc<B>,
        store: &CartStore,
        key: &CacheKey,
    ) -> Result<Option<u64>, BackendError> {
        let touched = store.invalidate(&key.id);
        debug!(cart_id = %key.id, touched, "cart entries marked stale");
        let fetched = self.fetch(backend, store, key).await?;
        Ok(store.confirm_fetched(key, fetched.cart, fetched.epoch))
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").field("in_flight", &self.in_flight()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockCartBackend;

    #[tokio::test]
    async fn failed_refetch_leaves_stale_entry() {
        let mut backend = MockCartBackend::new();
        backend.expect_retrieve_cart().returning(|_, _| Err(BackendError::Network("offline".into())));
        let backend = Arc::new(backend);
        let store = CartStore::new();
        let key = CacheKey::cart("cart_1", "*items");
        store.confirm(&key, Cart::new("cart_1", "reg_us", "usd"));

        let err = Reconciler::new().reconcile(&backend, &store, &key).await.unwrap_err();
        assert_eq!(err, BackendError::Network("offline".into()));
        assert!(store.is_stale(&key));
        assert!(store.visible(&key).is_some());
    }

    #[tokio::test]
    async fn reconcile_confirms_fresh_state() {
        let mut backend = MockCartBackend::new();
        backend.expect_retrieve_cart().returning(|id, _| {
            let mut cart = Cart::new(id, "reg_us", "usd");
            cart.email = Some("shopper@example.com".into());
            Ok(cart)
        });
        let backend = Arc::new(backend);
        let store = CartStore::new();
        let key = CacheKey::cart("cart_1", "*items");
        store.confirm(&key, Cart::new("cart_1", "reg_us", "usd"));

        let version = Reconciler::new().reconcile(&backend, &store, &key).await.unwrap().unwrap();
        let entry = store.entry(&key).unwrap();
        assert_eq!(entry.version, version);
        assert!(!entry.stale);
        assert_eq!(entry.state.visible().email.as_deref(), Some("shopper@example.com"));
    }

    #[tokio::test]
    async fn invalidation_starts_a_new_request() {
        let mut backend = MockCartBackend::new();
        backend.expect_retrieve_cart().times(2).returning(|id, _| Ok(Cart::new(id, "reg_us", "usd")));
        let backend = Arc::new(backend);
        let store = CartStore::new();
        let key = CacheKey::cart("cart_1", "*items");
        let reconciler = Reconciler::new();

        let first = reconciler.fetch(&backend, &store, &key).await.unwrap();
        store.invalidate("cart_1");
        let second = reconciler.fetch(&backend, &store, &key).await.unwrap();
        assert!(second.epoch > first.epoch);
        assert_eq!(reconciler.in_flight(), 0);
    }
}
