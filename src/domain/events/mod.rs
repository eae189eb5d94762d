//! Cart lifecycle events
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self { Self(Uuid::now_v7()) }
}

impl Default for MutationId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    AddItem,
    UpdateItem,
    RemoveItem,
    ApplyPromotions,
    RemovePromotions,
    UpdateCart,
    SetShippingMethod,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CartEvent {
    CartCreated { cart_id: String, region_id: String },
    OverlayInstalled { mutation: MutationId, kind: MutationKind, cart_id: String },
    Reconciled { mutation: MutationId, cart_id: String, version: u64 },
    RolledBack { mutation: MutationId, cart_id: String, reason: String },
    RegionChanged { cart_id: Option<String>, country_code: String, region_id: String },
    CartCompleted { cart_id: String, order_id: String },
}

impl CartEvent {
    pub fn cart_id(&self) -> Option<&str> {
        match self {
            Self::CartCreated { cart_id, .. }
            | Self::OverlayInstalled { cart_id, .. }
            | Self::Reconciled { cart_id, .. }
            | Self::RolledBack { cart_id, .. }
            | Self::CartCompleted { cart_id, .. } => Some(cart_id),
            Self::RegionChanged { cart_id, .. } => cart_id.as_deref(),
        }
    }
}
