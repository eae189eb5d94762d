//! Storefront domain: cart, region and order models plus their value objects.
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::*;
pub use events::{CartEvent, MutationId, MutationKind};
pub use value_objects::{CountryCode, PromoCode, Quantity, ValueError};
