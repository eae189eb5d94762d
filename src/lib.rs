//! OpenSASE Storefront
//!
//! Client-side cart synchronization against a headless commerce backend.
//!
//! ## Features
//! - Lazy cart creation scoped to the shopper's region
//! - Optimistic add / update / remove with exact rollback
//! - Cache reconciliation with de-duplicated refetches
//! - Promotions, region switching, shipping and checkout completion

pub mod backend;
pub mod client;
pub mod config;
pub mod domain;
pub mod session;
pub mod sync;

pub use backend::{BackendError, CartBackend, CartUpdate};
pub use client::StoreClient;
pub use config::StorefrontConfig;
pub use session::{ClientSession, FileSessionStore, MemorySessionStore, SessionStore};
pub use sync::CartSync;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorefrontError {
    #[error("No existing cart found, please create one before updating")]
    NoCartFound,

    #[error("Region not found for country code: {0}")]
    RegionNotFound(String),

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Invalid discount code")]
    InvalidDiscountCode(#[source] BackendError),

    #[error("Checkout failed: {0}")]
    CheckoutFailed(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Value(#[from] domain::ValueError),

    #[error("Session storage error: {0}")]
    Session(String),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
