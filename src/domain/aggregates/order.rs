//! Order Aggregate
//!
//! The confirmation a cart turns into once checkout completes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::cart::{Address, Cart, LineItem};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub display_id: Option<u64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    pub currency_code: String,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub subtotal: Decimal,
    #[serde(default)]
    pub shipping_total: Decimal,
    #[serde(default)]
    pub discount_total: Decimal,
    #[serde(default)]
    pub tax_total: Decimal,
    #[serde(default)]
    pub total: Decimal,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Draft,
    Archived,
    Canceled,
    RequiresAction,
}

impl Order {
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }
}

/// Body of `POST /store/carts/{id}/complete`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionResponse {
    Order { order: Order },
    Cart { cart: Cart, error: CompletionError },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionError {
    pub message: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}
