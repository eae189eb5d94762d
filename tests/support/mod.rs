//! In-memory store API used by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use opensase_storefront::domain::{
    Cart, CompletionError, CompletionResponse, LineItem, Order, OrderStatus, Promotion, Region, RegionCountry,
    ShippingMethod, ShippingOption,
};
use opensase_storefront::{BackendError, CartBackend, CartUpdate};
use parking_lot::Mutex;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListRegions,
    CreateCart { region_id: String },
    RetrieveCart { cart_id: String, fields: String },
    UpdateCart { cart_id: String, update: CartUpdate },
    AddLineItem { cart_id: String, variant_id: String, quantity: u32 },
    UpdateLineItem { cart_id: String, line_id: String, quantity: u32 },
    DeleteLineItem { cart_id: String, line_id: String },
    ApplyPromotions { cart_id: String, codes: Vec<String> },
    RemovePromotions { cart_id: String, codes: Vec<String> },
    ListShippingOptions { cart_id: String },
    AddShippingMethod { cart_id: String, option_id: String },
    CompleteCart { cart_id: String },
}

impl Call {
    pub fn route(&self) -> String {
        match self {
            Self::ListRegions => "GET /store/regions".into(),
            Self::CreateCart { .. } => "POST /store/carts".into(),
            Self::RetrieveCart { cart_id, .. } => format!("GET /store/carts/{cart_id}"),
            Self::UpdateCart { cart_id, .. } => format!("POST /store/carts/{cart_id}"),
            Self::AddLineItem { cart_id, .. } => format!("POST /store/carts/{cart_id}/line-items"),
            Self::UpdateLineItem { cart_id, line_id, .. } => format!("POST /store/carts/{cart_id}/line-items/{line_id}"),
            Self::DeleteLineItem { cart_id, line_id } => format!("DELETE /store/carts/{cart_id}/line-items/{line_id}"),
            Self::ApplyPromotions { cart_id, .. } => format!("POST /store/carts/{cart_id}/promotions"),
            Self::RemovePromotions { cart_id, .. } => format!("DELETE /store/carts/{cart_id}/promotions"),
            Self::ListShippingOptions { cart_id } => format!("GET /store/shipping-options?cart_id={cart_id}"),
            Self::AddShippingMethod { cart_id, .. } => format!("POST /store/carts/{cart_id}/shipping-methods"),
            Self::CompleteCart { cart_id } => format!("POST /store/carts/{cart_id}/complete"),
        }
    }
}

#[derive(Default)]
struct State {
    regions: Vec<Region>,
    carts: HashMap<String, Cart>,
    catalog: HashMap<String, (String, Decimal)>,
    promotions: HashMap<String, Decimal>,
    shipping_options: Vec<ShippingOption>,
    failures: HashMap<&'static str, BackendError>,
    delays: HashMap<&'static str, Duration>,
    refuse_completion: Option<String>,
    calls: Vec<Call>,
    next_id: u32,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    fn cart_mut(&mut self, cart_id: &str) -> Result<&mut Cart, BackendError> {
        self.carts.get_mut(cart_id).ok_or_else(|| BackendError::server(404, format!("Cart id {cart_id} not found")))
    }
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

pub fn region(id: &str, currency: &str, countries: &[&str]) -> Region {
    Region {
        id: id.into(),
        name: id.into(),
        currency_code: currency.into(),
        countries: countries.iter().map(|c| RegionCountry { iso_2: c.to_string(), display_name: None }).collect(),
        automatic_taxes: true,
    }
}

/// Server-side totals: the grand total includes shipping, tax and discounts.
fn settle_totals(cart: &mut Cart) {
    cart.recalculate();
    cart.shipping_total = cart.shipping_methods.iter().fold(Decimal::ZERO, |acc, m| acc + m.amount);
    cart.total = cart.subtotal + cart.shipping_total + cart.tax_total - cart.discount_total;
}

impl FakeBackend {
    pub fn new() -> Self { Self::default() }

    pub fn with_region(self, region: Region) -> Self {
        self.state.lock().regions.push(region);
        self
    }

    pub fn with_variant(self, variant_id: &str, title: &str, unit_price: Decimal) -> Self {
        self.state.lock().catalog.insert(variant_id.into(), (title.into(), unit_price));
        self
    }

    pub fn with_promotion(self, code: &str, discount: Decimal) -> Self {
        self.state.lock().promotions.insert(code.into(), discount);
        self
    }

    pub fn with_shipping_option(self, id: &str, name: &str, amount: Decimal) -> Self {
        self.state.lock().shipping_options.push(ShippingOption { id: id.into(), name: name.into(), amount });
        self
    }

    /// Seeds a cart holding one line: `line_id` for `variant_id`.
    pub fn with_cart(self, cart_id: &str, line_id: &str, variant_id: &str, quantity: u32, unit_price: Decimal) -> Self {
        {
            let mut state = self.state.lock();
            let region_id = state.regions.first().map(|r| r.id.clone()).unwrap_or_else(|| "reg_us".into());
            let currency = state.regions.first().map(|r| r.currency_code.clone()).unwrap_or_else(|| "usd".into());
            let mut cart = Cart::new(cart_id, region_id, &currency);
            cart.items.push(LineItem {
                id: line_id.into(),
                variant_id: Some(variant_id.into()),
                product_id: None,
                title: variant_id.into(),
                product_title: None,
                product_handle: None,
                variant_title: None,
                thumbnail: None,
                unit_price,
                quantity,
                total: Decimal::ZERO,
            });
            settle_totals(&mut cart);
            state.carts.insert(cart_id.into(), cart);
        }
        self
    }

    /// Answers `operation` only after `delay`. The answer reflects server state
    /// when the request arrived.
    pub fn delay(&self, operation: &'static str, delay: Duration) {
        self.state.lock().delays.insert(operation, delay);
    }

    pub fn fail_next(&self, operation: &'static str, error: BackendError) {
        self.state.lock().failures.insert(operation, error);
    }

    pub fn refuse_completion(&self, message: &str) {
        self.state.lock().refuse_completion = Some(message.into());
    }

    pub fn calls(&self) -> Vec<Call> { self.state.lock().calls.clone() }

    pub fn routes(&self) -> Vec<String> { self.calls().iter().map(Call::route).collect() }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize { self.calls().iter().filter(|c| matches(c)).count() }

    pub fn server_cart(&self, cart_id: &str) -> Option<Cart> { self.state.lock().carts.get(cart_id).cloned() }

    async fn respond<T, F>(&self, operation: &'static str, call: Call, compute: F) -> Result<T, BackendError>
    where
        T: Send,
        F: FnOnce(&mut State) -> Result<T, BackendError> + Send,
    {
        tokio::task::yield_now().await;
        let (result, delay) = {
            let mut state = self.state.lock();
            state.calls.push(call);
            let delay = state.delays.get(operation).copied();
            let result = match state.failures.remove(operation) {
                Some(err) => Err(err),
                None => compute(&mut *state),
            };
            (result, delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl CartBackend for FakeBackend {
    async fn list_regions(&self) -> Result<Vec<Region>, BackendError> {
        self.respond("list_regions", Call::ListRegions, |state| Ok(state.regions.clone())).await
    }

    async fn create_cart(&self, region_id: &str) -> Result<Cart, BackendError> {
        self.respond("create_cart", Call::CreateCart { region_id: region_id.into() }, |state| {
            let region = state.regions.iter().find(|r| r.id == region_id).cloned()
                .ok_or_else(|| BackendError::server(400, "unknown region"))?;
            let id = state.id("cart");
            let cart = Cart::new(id.clone(), region.id, &region.currency_code);
            state.carts.insert(id, cart.clone());
            Ok(cart)
        })
        .await
    }

    async fn retrieve_cart(&self, cart_id: &str, fields: &str) -> Result<Cart, BackendError> {
        let call = Call::RetrieveCart { cart_id: cart_id.into(), fields: fields.into() };
        self.respond("retrieve_cart", call, |state| Ok(state.cart_mut(cart_id)?.clone())).await
    }

    async fn update_cart(&self, cart_id: &str, update: &CartUpdate) -> Result<Cart, BackendError> {
        let call = Call::UpdateCart { cart_id: cart_id.into(), update: update.clone() };
        self.respond("update_cart", call, |state| {
            let region = match &update.region_id {
                Some(region_id) => Some(state.regions.iter().find(|r| &r.id == region_id).cloned()
                    .ok_or_else(|| BackendError::server(400, "unknown region"))?),
                None => None,
            };
            let cart = state.cart_mut(cart_id)?;
            if let Some(region) = region {
                cart.region_id = Some(region.id);
                cart.currency_code = region.currency_code;
            }
            if update.email.is_some() { cart.email = update.email.clone(); }
            if update.shipping_address.is_some() { cart.shipping_address = update.shipping_address.clone(); }
            if update.billing_address.is_some() { cart.billing_address = update.billing_address.clone(); }
            Ok(cart.clone())
        })
        .await
    }

    async fn add_line_item(&self, cart_id: &str, variant_id: &str, quantity: u32) -> Result<Cart, BackendError> {
        let call = Call::AddLineItem { cart_id: cart_id.into(), variant_id: variant_id.into(), quantity };
        self.respond("add_line_item", call, |state| {
            let (title, unit_price) = state.catalog.get(variant_id).cloned()
                .ok_or_else(|| BackendError::server(404, format!("Variant {variant_id} not found")))?;
            let line_id = state.id("li");
            let cart = state.cart_mut(cart_id)?;
            match cart.items.iter_mut().find(|i| i.variant_id.as_deref() == Some(variant_id)) {
                Some(existing) => existing.quantity += quantity,
                None => cart.items.push(LineItem {
                    id: line_id,
                    variant_id: Some(variant_id.into()),
                    product_id: None,
                    title: title.clone(),
                    product_title: Some(title),
                    product_handle: None,
                    variant_title: None,
                    thumbnail: None,
                    unit_price,
                    quantity,
                    total: Decimal::ZERO,
                }),
            }
            settle_totals(cart);
            Ok(cart.clone())
        })
        .await
    }

    async fn update_line_item(&self, cart_id: &str, line_id: &str, quantity: u32) -> Result<Cart, BackendError> {
        let call = Call::UpdateLineItem { cart_id: cart_id.into(), line_id: line_id.into(), quantity };
        self.respond("update_line_item", call, |state| {
            let cart = state.cart_mut(cart_id)?;
            let item = cart.items.iter_mut().find(|i| i.id == line_id)
                .ok_or_else(|| BackendError::server(404, format!("Line item {line_id} not found")))?;
            item.quantity = quantity;
            settle_totals(cart);
            Ok(cart.clone())
        })
        .await
    }

    async fn delete_line_item(&self, cart_id: &str, line_id: &str) -> Result<Option<Cart>, BackendError> {
        let call = Call::DeleteLineItem { cart_id: cart_id.into(), line_id: line_id.into() };
        self.respond("delete_line_item", call, |state| {
            let cart = state.cart_mut(cart_id)?;
            cart.items.retain(|i| i.id != line_id);
            settle_totals(cart);
            Ok(None)
        })
        .await
    }

    async fn apply_promotions(&self, cart_id: &str, codes: &[String]) -> Result<Cart, BackendError> {
        let call = Call::ApplyPromotions { cart_id: cart_id.into(), codes: codes.to_vec() };
        self.respond("apply_promotions", call, |state| {
            let mut discount = Decimal::ZERO;
            for code in codes {
                discount += *state.promotions.get(code)
                    .ok_or_else(|| BackendError::server(400, format!("The promotion code {code} is invalid")))?;
            }
            let cart = state.cart_mut(cart_id)?;
            for code in codes {
                cart.promotions.push(Promotion { id: None, code: code.clone(), is_automatic: false });
            }
            cart.discount_total += discount;
            settle_totals(cart);
            Ok(cart.clone())
        })
        .await
    }

    async fn remove_promotions(&self, cart_id: &str, codes: &[String]) -> Result<Cart, BackendError> {
        let call = Call::RemovePromotions { cart_id: cart_id.into(), codes: codes.to_vec() };
        self.respond("remove_promotions", call, |state| {
            let discount = codes.iter().fold(Decimal::ZERO, |acc, code| {
                acc + state.promotions.get(code).copied().unwrap_or_default()
            });
            let cart = state.cart_mut(cart_id)?;
            let before = cart.promotions.len();
            cart.promotions.retain(|p| !codes.contains(&p.code));
            if cart.promotions.len() != before { cart.discount_total -= discount; }
            settle_totals(cart);
            Ok(cart.clone())
        })
        .await
    }

    async fn list_shipping_options(&self, cart_id: &str) -> Result<Vec<ShippingOption>, BackendError> {
        let call = Call::ListShippingOptions { cart_id: cart_id.into() };
        self.respond("list_shipping_options", call, |state| Ok(state.shipping_options.clone())).await
    }

    async fn add_shipping_method(&self, cart_id: &str, option_id: &str) -> Result<Cart, BackendError> {
        let call = Call::AddShippingMethod { cart_id: cart_id.into(), option_id: option_id.into() };
        self.respond("add_shipping_method", call, |state| {
            let option = state.shipping_options.iter().find(|o| o.id == option_id).cloned()
                .ok_or_else(|| BackendError::server(400, "unknown shipping option"))?;
            let method_id = state.id("sm");
            let cart = state.cart_mut(cart_id)?;
            cart.shipping_methods = vec![ShippingMethod {
                id: method_id,
                shipping_option_id: Some(option.id),
                name: option.name,
                amount: option.amount,
            }];
            settle_totals(cart);
            Ok(cart.clone())
        })
        .await
    }

    async fn complete_cart(&self, cart_id: &str) -> Result<CompletionResponse, BackendError> {
        self.respond("complete_cart", Call::CompleteCart { cart_id: cart_id.into() }, |state| {
            if let Some(message) = state.refuse_completion.take() {
                let cart = state.cart_mut(cart_id)?.clone();
                return Ok(CompletionResponse::Cart {
                    cart,
                    error: CompletionError { message, name: None, kind: Some("payment_authorization_error".into()) },
                });
            }
            let order_id = state.id("order");
            let cart = state.carts.remove(cart_id)
                .ok_or_else(|| BackendError::server(404, format!("Cart id {cart_id} not found")))?;
            Ok(CompletionResponse::Order {
                order: Order {
                    id: order_id,
                    display_id: Some(1001),
                    email: cart.email,
                    status: OrderStatus::Pending,
                    currency_code: cart.currency_code,
                    items: cart.items,
                    subtotal: cart.subtotal,
                    shipping_total: cart.shipping_total,
                    discount_total: cart.discount_total,
                    tax_total: cart.tax_total,
                    total: cart.total,
                    shipping_address: cart.shipping_address,
                    created_at: None,
                },
            })
        })
        .await
    }
}
