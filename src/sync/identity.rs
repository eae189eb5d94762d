//! Cart identity resolution and region lookup.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::CartBackend;
use crate::domain::{Cart, CountryCode, Region};
use crate::session::SessionContext;
use crate::{Result, StorefrontError};

/// Regions indexed by the countries they serve, refreshed after `ttl`.
#[derive(Debug)]
pub struct RegionDirectory {
    ttl: Duration,
    cache: RwLock<Option<(Instant, HashMap<CountryCode, Region>)>>,
}

impl RegionDirectory {
    pub fn new(ttl: Duration) -> Self { Self { ttl, cache: RwLock::new(None) } }

    fn cached(&self, country: &CountryCode) -> Option<Option<Region>> {
        let cache = self.cache.read();
        let (loaded_at, regions) = cache.as_ref()?;
        if loaded_at.elapsed() >= self.ttl { return None; }
        Some(regions.get(country).cloned())
    }

    /// # Errors
    ///
    /// `RegionNotFound` when no region serves `country`; backend errors when listing fails.
    pub async fn region_for<B: CartBackend + ?Sized>(&self, backend: &B, country: &CountryCode) -> Result<Region> {
        let hit = match self.cached(country) {
            Some(hit) => hit,
            None => {
                let regions = backend.list_regions().await?;
                let mut index = HashMap::new();
                for region in regions {
                    for code in region.country_codes() {
                        index.insert(code, region.clone());
                    }
                }
                debug!(countries = index.len(), "region directory refreshed");
                let hit = index.get(country).cloned();
                *self.cache.write() = Some((Instant::now(), index));
                hit
            }
        };
        hit.ok_or_else(|| StorefrontError::RegionNotFound(country.to_string()))
    }
}

/// Outcome of resolving the shopper's cart.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedCart {
    /// The stored identifier, used as-is.
    Existing(String),
    /// A cart created just now; its id is already persisted.
    Created(Cart),
}

impl ResolvedCart {
    pub fn id(&self) -> &str {
        match self {
            Self::Existing(id) => id,
            Self::Created(cart) => &cart.id,
        }
    }
}

#[derive(Debug)]
pub struct CartIdentity {
    regions: RegionDirectory,
    creation: Mutex<()>,
}

impl CartIdentity {
    pub fn new(regions: RegionDirectory) -> Self { Self { regions, creation: Mutex::new(()) } }

    pub fn regions(&self) -> &RegionDirectory { &self.regions }

    /// Returns the stored cart id, or creates a cart in the region serving `country`.
    ///
    /// Creation is serialized per session so overlapping calls share one cart.
    pub async fn resolve<B: CartBackend + ?Sized>(
        &self,
        backend: &B,
        session: &SessionContext,
        country: &CountryCode,
    ) -> Result<ResolvedCart> {
        if let Some(id) = session.cart_id() {
            return Ok(ResolvedCart::Existing(id));
        }

        let _guard = self.creation.lock().await;
        if let Some(id) = session.cart_id() {
            return Ok(ResolvedCart::Existing(id));
        }

        let region = self.regions.region_for(backend, country).await?;
        let cart = backend.create_cart(&region.id).await?;
        session.set_cart_id(Some(cart.id.clone()))?;
        info!(cart_id = %cart.id, region_id = %region.id, "created cart");
        Ok(ResolvedCart::Created(cart))
    }
}
