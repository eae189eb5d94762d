//! Cart synchronization: optimistic mutation, rollback and reconciliation
//! against the store API.
//!
//! Every cart mutation follows the same cycle. The pre-mutation cache entry is
//! captured and, for line item changes, an overlay is installed before the
//! request is awaited. On success the backend's cart is seeded into the cache;
//! on failure the captured entry is put back. Either way the cart is then
//! marked stale and refetched with the read projection.

pub mod identity;
pub mod mutation;
pub mod overlay;
pub mod reconcile;
pub mod store;

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendError, CartBackend, CartUpdate};
use crate::config::StorefrontConfig;
use crate::domain::{
    Cart, CartEvent, CompletionResponse, CountryCode, MutationId, MutationKind, Order, PromoCode, Quantity,
    ShippingOption, VariantSummary,
};
use crate::session::{ClientSession, SessionContext, SessionStore};
use crate::{Result, StorefrontError};

use identity::{CartIdentity, RegionDirectory, ResolvedCart};
use mutation::{MutationState, PendingMutation};
use overlay::CartAction;
use reconcile::Reconciler;
use store::{CacheKey, CartStore};

pub struct CartSync<B> {
    backend: Arc<B>,
    session: SessionContext,
    store: CartStore,
    identity: CartIdentity,
    reconciler: Reconciler,
    projection: String,
    default_country: CountryCode,
    events: Mutex<Vec<CartEvent>>,
}

impl<B: CartBackend + 'static> CartSync<B> {
    /// # Errors
    ///
    /// Fails when the persisted session cannot be read.
    pub fn new(backend: B, sessions: impl SessionStore + 'static, config: &StorefrontConfig) -> Result<Self> {
        Self::with_backend(Arc::new(backend), sessions, config)
    }

    /// Like [`Self::new`] for a backend that is shared with the caller.
    pub fn with_backend(backend: Arc<B>, sessions: impl SessionStore + 'static, config: &StorefrontConfig) -> Result<Self> {
        Ok(Self {
            backend,
            session: SessionContext::load(sessions)?,
            store: CartStore::new(),
            identity: CartIdentity::new(RegionDirectory::new(config.region_cache_ttl())),
            reconciler: Reconciler::new(),
            projection: config.cart_fields.clone(),
            default_country: config.default_region.clone(),
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn session(&self) -> ClientSession { self.session.snapshot() }
    pub fn store(&self) -> &CartStore { &self.store }
    pub fn cache_key(&self, cart_id: &str) -> CacheKey { CacheKey::cart(cart_id, self.projection.as_str()) }

    /// The country used when the caller has not picked one.
    pub fn preferred_country(&self) -> CountryCode {
        self.session.country_code().unwrap_or_else(|| self.default_country.clone())
    }

    /// The cart as currently shown, overlay included. Never touches the network.
    pub fn current_cart(&self) -> Option<Cart> {
        let cart_id = self.session.cart_id()?;
        self.store.visible(&self.cache_key(&cart_id))
    }

    pub fn take_events(&self) -> Vec<CartEvent> { std::mem::take(&mut *self.events.lock()) }

    fn record(&self, event: CartEvent) { self.events.lock().push(event); }

    fn require_cart_id(&self) -> Result<String> { self.session.cart_id().ok_or(StorefrontError::NoCartFound) }

    /// Reads the shopper's cart, going to the backend only when the cached copy is
    /// missing or stale. `None` when no cart has been created yet.
    #[instrument(skip(self))]
    pub async fn retrieve(&self) -> Result<Option<Cart>> {
        let Some(cart_id) = self.session.cart_id() else { return Ok(None) };
        let key = self.cache_key(&cart_id);
        if !self.store.is_stale(&key) {
            return Ok(self.store.visible(&key));
        }
        let fetched = self.reconciler.fetch(&self.backend, &self.store, &key).await?;
        if self.store.confirm_fetched(&key, fetched.cart.clone(), fetched.epoch).is_none() {
            debug!(cart_id = %cart_id, "read superseded by a newer change");
        }
        Ok(self.store.visible(&key).or(Some(fetched.cart)))
    }

    async fn ensure_loaded(&self, key: &CacheKey) -> Result<()> {
        if self.store.entry(key).is_some() {
            return Ok(());
        }
        let fetched = self.reconciler.fetch(&self.backend, &self.store, key).await?;
        self.store.confirm_fetched(key, fetched.cart, fetched.epoch);
        Ok(())
    }

    /// Runs one mutation through overlay, settlement and reconciliation.
    ///
    /// `request` must not have been polled yet; it is awaited only after the
    /// overlay is visible.
    async fn mutate<F>(
        &self,
        cart_id: &str,
        kind: MutationKind,
        action: Option<&CartAction>,
        request: F,
        on_error: fn(BackendError) -> StorefrontError,
    ) -> Result<Cart>
    where
        F: Future<Output = std::result::Result<Option<Cart>, BackendError>>,
    {
        let key = self.cache_key(cart_id);
        self.ensure_loaded(&key).await?;

        let id = MutationId::new();
        let snapshot = match action {
            Some(action) => {
                let snapshot = self.store.install_overlay(&key, id, |cart| overlay::apply(cart, action));
                debug!(mutation = %id, ?kind, cart_id, "overlay installed");
                self.record(CartEvent::OverlayInstalled { mutation: id, kind, cart_id: cart_id.to_string() });
                snapshot
            }
            None => self.store.entry(&key),
        };
        let pending = PendingMutation::begin(id, kind, key.clone(), snapshot);

        match request.await {
            Ok(response) => {
                let succeeded = pending.succeed();
                match response {
                    Some(cart) => { self.store.confirm(&key, cart); }
                    None => { self.store.promote_overlay(&key, succeeded.id()); }
                }
                match self.reconciler.reconcile(&self.backend, &self.store, &key).await {
                    Ok(Some(version)) => {
                        let (mutation, kind) = (succeeded.id(), succeeded.kind());
                        let state = succeeded.reconciled();
                        debug!(%mutation, ?kind, version, ?state, "mutation reconciled");
                        self.record(CartEvent::Reconciled { mutation, cart_id: cart_id.to_string(), version });
                    }
                    Ok(None) => debug!(mutation = %succeeded.id(), "refetch superseded by a newer change"),
                    Err(err) => warn!(mutation = %succeeded.id(), error = %err, "refetch after mutation failed, keeping response"),
                }
                self.store.visible(&key).ok_or(StorefrontError::NoCartFound)
            }
            Err(err) => {
                let failed = pending.fail();
                let (mutation, kind) = (failed.id(), failed.kind());
                let state: MutationState = failed.roll_back(&self.store);
                warn!(%mutation, ?kind, error = %err, ?state, "mutation failed, rolled back");
                self.record(CartEvent::RolledBack { mutation, cart_id: cart_id.to_string(), reason: err.to_string() });
                if let Err(refetch) = self.reconciler.reconcile(&self.backend, &self.store, &key).await {
                    warn!(%mutation, error = %refetch, "refetch after rollback failed");
                }
                Err(on_error(err))
            }
        }
    }

    /// Adds `quantity` of `variant`, creating the cart in `country`'s region if needed.
    #[instrument(skip(self, variant), fields(variant_id = %variant.variant_id))]
    pub async fn add_item(&self, variant: VariantSummary, quantity: u32, country: &CountryCode) -> Result<Cart> {
        if quantity == 0 {
            return Err(StorefrontError::InvalidQuantity);
        }
        let resolved = self.identity.resolve(self.backend.as_ref(), &self.session, country).await?;
        if let ResolvedCart::Created(cart) = &resolved {
            self.store.confirm(&self.cache_key(&cart.id), cart.clone());
            self.record(CartEvent::CartCreated {
                cart_id: cart.id.clone(),
                region_id: cart.region_id.clone().unwrap_or_default(),
            });
        }
        let cart_id = resolved.id();
        let variant_id = variant.variant_id.clone();
        let action = CartAction::AddItem { variant, quantity: Quantity::new(quantity) };
        let request = async { self.backend.add_line_item(cart_id, &variant_id, quantity).await.map(Some) };
        self.mutate(cart_id, action.kind(), Some(&action), request, StorefrontError::Backend).await
    }

    /// Sets a line's quantity. Zero removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(&self, line_id: &str, quantity: u32) -> Result<Cart> {
        if quantity == 0 {
            return self.remove_item(line_id).await;
        }
        let cart_id = self.require_cart_id()?;
        let action = CartAction::UpdateQuantity { line_id: line_id.to_string(), quantity: Quantity::new(quantity) };
        let request = async { self.backend.update_line_item(&cart_id, line_id, quantity).await.map(Some) };
        self.mutate(&cart_id, action.kind(), Some(&action), request, StorefrontError::Backend).await
    }

    /// Removes a line. Unknown lines leave the overlay unchanged but the request is still sent.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, line_id: &str) -> Result<Cart> {
        let cart_id = self.require_cart_id()?;
        let action = CartAction::RemoveItem { line_id: line_id.to_string() };
        let request = async { self.backend.delete_line_item(&cart_id, line_id).await };
        self.mutate(&cart_id, action.kind(), Some(&action), request, StorefrontError::Backend).await
    }

    #[instrument(skip(self, codes))]
    pub async fn apply_promotions(&self, codes: &[PromoCode]) -> Result<Cart> {
        let cart_id = self.require_cart_id()?;
        let codes: Vec<String> = codes.iter().map(|c| c.as_str().to_string()).collect();
        let request = async { self.backend.apply_promotions(&cart_id, &codes).await.map(Some) };
        self.mutate(&cart_id, MutationKind::ApplyPromotions, None, request, StorefrontError::InvalidDiscountCode).await
    }

    #[instrument(skip(self))]
    pub async fn remove_promotion(&self, code: &PromoCode) -> Result<Cart> {
        let cart_id = self.require_cart_id()?;
        let codes = vec![code.as_str().to_string()];
        let request = async { self.backend.remove_promotions(&cart_id, &codes).await.map(Some) };
        self.mutate(&cart_id, MutationKind::RemovePromotions, None, request, StorefrontError::Backend).await
    }

    /// Switches the shopper to the region serving `country` and moves an existing
    /// cart there. Returns the updated cart, if there is one.
    #[instrument(skip(self))]
    pub async fn set_region(&self, country: &CountryCode) -> Result<Option<Cart>> {
        let region = self.identity.regions().region_for(self.backend.as_ref(), country).await?;

        let cart_id = self.session.cart_id();
        let cart = match &cart_id {
            Some(cart_id) => {
                let update = CartUpdate::region(region.id.as_str());
                let request = async { self.backend.update_cart(cart_id, &update).await.map(Some) };
                Some(self.mutate(cart_id, MutationKind::UpdateCart, None, request, StorefrontError::Backend).await?)
            }
            None => None,
        };
        // Only once the cart has moved, so a failed update keeps the old country.
        self.session.set_country_code(Some(country.clone()))?;
        info!(country = %country, region_id = %region.id, "region changed");
        self.record(CartEvent::RegionChanged { cart_id, country_code: country.to_string(), region_id: region.id });
        Ok(cart)
    }

    /// Sets email and addresses on the cart. An empty update sends nothing.
    #[instrument(skip(self, update))]
    pub async fn update_details(&self, update: CartUpdate) -> Result<Cart> {
        let cart_id = self.require_cart_id()?;
        if update.is_empty() {
            return self.retrieve().await?.ok_or(StorefrontError::NoCartFound);
        }
        let request = async { self.backend.update_cart(&cart_id, &update).await.map(Some) };
        self.mutate(&cart_id, MutationKind::UpdateCart, None, request, StorefrontError::Backend).await
    }

    pub async fn shipping_options(&self) -> Result<Vec<ShippingOption>> {
        let cart_id = self.require_cart_id()?;
        Ok(self.backend.list_shipping_options(&cart_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn set_shipping_method(&self, option_id: &str) -> Result<Cart> {
        let cart_id = self.require_cart_id()?;
        let request = async { self.backend.add_shipping_method(&cart_id, option_id).await.map(Some) };
        self.mutate(&cart_id, MutationKind::SetShippingMethod, None, request, StorefrontError::Backend).await
    }

    /// Places the order. On success the cart id is forgotten and its cache entries dropped.
    #[instrument(skip(self))]
    pub async fn complete(&self) -> Result<Order> {
        let cart_id = self.require_cart_id()?;
        match self.backend.complete_cart(&cart_id).await? {
            CompletionResponse::Order { order } => {
                self.session.set_cart_id(None)?;
                self.store.evict(&cart_id);
                info!(cart_id = %cart_id, order_id = %order.id, "cart completed");
                self.record(CartEvent::CartCompleted { cart_id, order_id: order.id.clone() });
                Ok(order)
            }
            CompletionResponse::Cart { cart, error } => {
                warn!(cart_id = %cart_id, error = %error.message, "cart completion refused");
                self.store.confirm(&self.cache_key(&cart_id), cart);
                Err(StorefrontError::CheckoutFailed(error.message))
            }
        }
    }
}

impl<B> std::fmt::Debug for CartSync<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSync")
            .field("session", &self.session)
            .field("projection", &self.projection)
            .field("cached_entries", &self.store.len())
            .finish_non_exhaustive()
    }
}
