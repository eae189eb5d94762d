//! The store API contract the cart layer depends on.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Address, Cart, CompletionResponse, Region, ShippingOption};

/// A failed call to the commerce backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("backend returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::server(status.as_u16(), err.to_string()),
            None => Self::Network(err.to_string()),
        }
    }
}

/// Fields of `POST /store/carts/{id}`. Unset fields are left untouched by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
}

impl CartUpdate {
    pub fn region(region_id: impl Into<String>) -> Self {
        Self { region_id: Some(region_id.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool { self == &Self::default() }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CartBackend: Send + Sync {
    /// `GET /store/regions`
    async fn list_regions(&self) -> Result<Vec<Region>, BackendError>;

    /// `POST /store/carts`
    async fn create_cart(&self, region_id: &str) -> Result<Cart, BackendError>;

    /// `GET /store/carts/{id}` with the given projection.
    async fn retrieve_cart(&self, cart_id: &str, fields: &str) -> Result<Cart, BackendError>;

    /// `POST /store/carts/{id}`
    async fn update_cart(&self, cart_id: &str, update: &CartUpdate) -> Result<Cart, BackendError>;

    /// `POST /store/carts/{id}/line-items`
    async fn add_line_item(&self, cart_id: &str, variant_id: &str, quantity: u32) -> Result<Cart, BackendError>;

    /// `POST /store/carts/{id}/line-items/{line_id}`
    async fn update_line_item(&self, cart_id: &str, line_id: &str, quantity: u32) -> Result<Cart, BackendError>;

    /// `DELETE /store/carts/{id}/line-items/{line_id}`. The parent cart is only
    /// returned when the backend chooses to include it.
    async fn delete_line_item(&self, cart_id: &str, line_id: &str) -> Result<Option<Cart>, BackendError>;

    /// `POST /store/carts/{id}/promotions`
    async fn apply_promotions(&self, cart_id: &str, codes: &[String]) -> Result<Cart, BackendError>;

    /// `DELETE /store/carts/{id}/promotions`
    async fn remove_promotions(&self, cart_id: &str, codes: &[String]) -> Result<Cart, BackendError>;

    /// `GET /store/shipping-options?cart_id={id}`
    async fn list_shipping_options(&self, cart_id: &str) -> Result<Vec<ShippingOption>, BackendError>;

    /// `POST /store/carts/{id}/shipping-methods`
    async fn add_shipping_method(&self, cart_id: &str, option_id: &str) -> Result<Cart, BackendError>;

    /// `POST /store/carts/{id}/complete`
    async fn complete_cart(&self, cart_id: &str) -> Result<CompletionResponse, BackendError>;
}
