//! Aggregates module
pub mod cart;
pub mod order;
pub mod region;

pub use cart::{Address, Cart, LineItem, Promotion, ShippingMethod, VariantSummary, OPTIMISTIC_ID_PREFIX};
pub use order::{CompletionError, CompletionResponse, Order, OrderStatus};
pub use region::{Region, RegionCountry, ShippingOption};
