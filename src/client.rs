//! HTTP implementation of [`CartBackend`] over the store REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::backend::{BackendError, CartBackend, CartUpdate};
use crate::config::StorefrontConfig;
use crate::domain::{Cart, CompletionResponse, Region, ShippingOption};

const PUBLISHABLE_KEY_HEADER: &str = "x-publishable-api-key";

#[derive(Debug, Clone)]
pub struct StoreClient {
    http: Client,
    base_url: String,
    publishable_key: Option<String>,
}

impl StoreClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &StorefrontConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            publishable_key: config.publishable_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/store{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.publishable_key {
            Some(key) => builder.header(PUBLISHABLE_KEY_HEADER, key),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::server(status.as_u16(), error_message(&text)));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn cart(&self, request: RequestBuilder) -> Result<Cart, BackendError> {
        let envelope: CartEnvelope = self.send(request).await?;
        Ok(envelope.cart)
    }
}

/// Pulls the human readable message out of a store API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| if body.is_empty() { "empty response".to_string() } else { body.to_string() })
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CartEnvelope {
    cart: Cart,
}

#[derive(Debug, Deserialize)]
struct RegionsEnvelope {
    regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
struct ShippingOptionsEnvelope {
    shipping_options: Vec<ShippingOption>,
}

#[derive(Debug, Deserialize)]
struct DeletedLineItem {
    #[serde(default)]
    parent: Option<Cart>,
}

#[async_trait]
impl CartBackend for StoreClient {
    async fn list_regions(&self) -> Result<Vec<Region>, BackendError> {
        let envelope: RegionsEnvelope = self.send(self.request(Method::GET, "/regions")).await?;
        Ok(envelope.regions)
    }

    async fn create_cart(&self, region_id: &str) -> Result<Cart, BackendError> {
        debug!(region_id, "creating cart");
        self.cart(self.request(Method::POST, "/carts").json(&json!({ "region_id": region_id }))).await
    }

    async fn retrieve_cart(&self, cart_id: &str, fields: &str) -> Result<Cart, BackendError> {
        let request = self.request(Method::GET, &format!("/carts/{cart_id}")).query(&[("fields", fields)]);
        self.cart(request).await
    }

    async fn update_cart(&self, cart_id: &str, update: &CartUpdate) -> Result<Cart, BackendError> {
        self.cart(self.request(Method::POST, &format!("/carts/{cart_id}")).json(update)).await
    }

    async fn add_line_item(&self, cart_id: &str, variant_id: &str, quantity: u32) -> Result<Cart, BackendError> {
        let body = json!({ "variant_id": variant_id, "quantity": quantity });
        self.cart(self.request(Method::POST, &format!("/carts/{cart_id}/line-items")).json(&body)).await
    }

    async fn update_line_item(&self, cart_id: &str, line_id: &str, quantity: u32) -> Result<Cart, BackendError> {
        let path = format!("/carts/{cart_id}/line-items/{line_id}");
        self.cart(self.request(Method::POST, &path).json(&json!({ "quantity": quantity }))).await
    }

    async fn delete_line_item(&self, cart_id: &str, line_id: &str) -> Result<Option<Cart>, BackendError> {
        let path = format!("/carts/{cart_id}/line-items/{line_id}");
        let deleted: DeletedLineItem = self.send(self.request(Method::DELETE, &path)).await?;
        Ok(deleted.parent)
    }

    async fn apply_promotions(&self, cart_id: &str, codes: &[String]) -> Result<Cart, BackendError> {
        let path = format!("/carts/{cart_id}/promotions");
        self.cart(self.request(Method::POST, &path).json(&json!({ "promo_codes": codes }))).await
    }

    async fn remove_promotions(&self, cart_id: &str, codes: &[String]) -> Result<Cart, BackendError> {
        let path = format!("/carts/{cart_id}/promotions");
        self.cart(self.request(Method::DELETE, &path).json(&json!({ "promo_codes": codes }))).await
    }

    async fn list_shipping_options(&self, cart_id: &str) -> Result<Vec<ShippingOption>, BackendError> {
        let request = self.request(Method::GET, "/shipping-options").query(&[("cart_id", cart_id)]);
        let envelope: ShippingOptionsEnvelope = self.send(request).await?;
        Ok(envelope.shipping_options)
    }

    async fn add_shipping_method(&self, cart_id: &str, option_id: &str) -> Result<Cart, BackendError> {
        let path = format!("/carts/{cart_id}/shipping-methods");
        self.cart(self.request(Method::POST, &path).json(&json!({ "option_id": option_id }))).await
    }

    async fn complete_cart(&self, cart_id: &str) -> Result<CompletionResponse, BackendError> {
        self.send(self.request(Method::POST, &format!("/carts/{cart_id}/complete"))).await
    }
}
