//! Optimistic mutator: the provisional cart shown while a change is in flight.

use crate::domain::{Cart, LineItem, MutationKind, Quantity, VariantSummary};

#[derive(Clone, Debug, PartialEq)]
pub enum CartAction {
    AddItem { variant: VariantSummary, quantity: Quantity },
    UpdateQuantity { line_id: String, quantity: Quantity },
    RemoveItem { line_id: String },
}

impl CartAction {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::AddItem { .. } => MutationKind::AddItem,
            Self::UpdateQuantity { quantity, .. } if quantity.is_zero() => MutationKind::RemoveItem,
            Self::UpdateQuantity { .. } => MutationKind::UpdateItem,
            Self::RemoveItem { .. } => MutationKind::RemoveItem,
        }
    }
}

/// Applies `action` to a copy of `base`.
///
/// Subtotal and line totals are recomputed; shipping, tax, discount and the
/// grand total are carried over untouched until the backend answers.
pub fn apply(base: &Cart, action: &CartAction) -> Cart {
    let mut next = base.clone();
    match action {
        CartAction::AddItem { variant, quantity } => next.add_item(LineItem::provisional(variant, *quantity)),
        CartAction::UpdateQuantity { line_id, quantity } => { next.set_quantity(line_id, *quantity); }
        CartAction::RemoveItem { line_id } => { next.remove_item(line_id); }
    }
    next
}
