//! Cart Aggregate
//!
//! Mirrors the store API's cart payload. The mutating methods here are what the
//! optimistic overlay runs locally; they only ever touch line items and the
//! totals derivable from them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Quantity;

/// Prefix of line item ids synthesized before the backend has assigned one.
pub const OPTIMISTIC_ID_PREFIX: &str = "optimistic_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    pub currency_code: String,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
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
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub promotions: Vec<Promotion>,
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub product_title: Option<String>,
    #[serde(default)]
    pub product_handle: Option<String>,
    #[serde(default)]
    pub variant_title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub total: Decimal,
}

impl LineItem {
    pub fn line_total(&self) -> Decimal { Quantity::new(self.quantity).times(self.unit_price) }
    pub fn is_optimistic(&self) -> bool { self.id.starts_with(OPTIMISTIC_ID_PREFIX) }

    /// Builds a not-yet-persisted line for `variant` with a placeholder id.
    pub fn provisional(variant: &VariantSummary, quantity: Quantity) -> Self {
        Self {
            id: format!("{OPTIMISTIC_ID_PREFIX}{}", Uuid::now_v7().simple()),
            variant_id: Some(variant.variant_id.clone()),
            product_id: variant.product_id.clone(),
            title: variant.product_title.clone(),
            product_title: Some(variant.product_title.clone()),
            product_handle: variant.product_handle.clone(),
            variant_title: variant.variant_title.clone(),
            thumbnail: variant.thumbnail.clone(),
            unit_price: variant.unit_price,
            quantity: quantity.value(),
            total: quantity.times(variant.unit_price),
        }
    }
}

/// Display data for a purchasable variant, as shown on the product page the
/// shopper added it from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_id: String,
    pub product_id: Option<String>,
    pub product_title: String,
    pub product_handle: Option<String>,
    pub variant_title: Option<String>,
    pub thumbnail: Option<String>,
    pub unit_price: Decimal,
}

impl VariantSummary {
    pub fn new(variant_id: impl Into<String>, product_title: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            variant_id: variant_id.into(), product_id: None, product_title: product_title.into(),
            product_handle: None, variant_title: None, thumbnail: None, unit_price,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address_1: Option<String>,
    #[serde(default)]
    pub address_2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    #[serde(default)]
    pub is_automatic: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: String,
    #[serde(default)]
    pub shipping_option_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: Decimal,
}

impl Cart {
    pub fn new(id: impl Into<String>, region_id: impl Into<String>, currency_code: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(), currency_code: currency_code.to_string(), region_id: Some(region_id.into()),
            email: None, items: vec![], subtotal: Decimal::ZERO, shipping_total: Decimal::ZERO,
            discount_total: Decimal::ZERO, tax_total: Decimal::ZERO, total: Decimal::ZERO,
            shipping_address: None, billing_address: None, promotions: vec![], shipping_methods: vec![],
            created_at: Some(now), updated_at: Some(now),
        }
    }

    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Units across all lines.
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity).sum() }

    pub fn line_item(&self, line_id: &str) -> Option<&LineItem> { self.items.iter().find(|i| i.id == line_id) }

    pub fn line_for_variant(&self, variant_id: &str) -> Option<&LineItem> {
        self.items.iter().find(|i| i.variant_id.as_deref() == Some(variant_id))
    }

    /// Adds `item`, folding it into an existing line for the same variant.
    pub fn add_item(&mut self, item: LineItem) {
        let existing = self.items.iter_mut().find(|i| i.variant_id.is_some() && i.variant_id == item.variant_id);
        if let Some(existing) = existing {
            existing.quantity = Quantity::new(existing.quantity).add(item.quantity).value();
        } else {
            self.items.push(item);
        }
        self.recalculate();
    }

    /// Sets the quantity of `line_id`; zero removes the line. Unknown lines are left alone.
    /// Returns whether the cart changed.
    pub fn set_quantity(&mut self, line_id: &str, quantity: Quantity) -> bool {
        if quantity.is_zero() { return self.remove_item(line_id); }
        let Some(item) = self.items.iter_mut().find(|i| i.id == line_id) else { return false };
        item.quantity = quantity.value();
        self.recalculate();
        true
    }

    pub fn remove_item(&mut self, line_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != line_id);
        let changed = self.items.len() != before;
        if changed { self.recalculate(); }
        changed
    }

    pub fn has_promotion(&self, code: &str) -> bool { self.promotions.iter().any(|p| p.code == code) }

    /// Recomputes line totals and the subtotal. Shipping, tax, discount and the
    /// grand total depend on backend rules and keep their last known values.
    pub fn recalculate(&mut self) {
        for item in &mut self.items {
            item.total = item.line_total();
        }
        self.subtotal = self.items.iter().fold(Decimal::ZERO, |acc, i| acc + i.total);
    }
}
