//! Cart Aggregate

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::events::CartEvent;
use crate::domain::value_objects::{CouponCode, Money, Quantity, MAX_AMOUNT};

/// Display data for a product at the moment it is put in the cart.
#[derive(Clone, Debug, PartialEq)]
pub struct CartProduct {
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub max_quantity: Option<u32>,
    pub selected_options: Option<BTreeMap<String, String>>,
}

/// One row of the cart. Name and price are snapshots and are not re-synced
/// with the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineItem {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_options: Option<BTreeMap<String, String>>,
}

impl CartLineItem {
    pub fn line_total(&self) -> Decimal { self.unit_price.saturating_mul(Decimal::from(self.quantity.value())) }
    fn checked_line_total(&self, quantity: Quantity) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(quantity.value()))
    }
    pub fn exceeds_max_quantity(&self) -> bool {
        self.max_quantity.is_some_and(|max| self.quantity.value() > max)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub code: CouponCode,
    pub discount_amount: Decimal,
}

/// Persisted form of the cart.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CartSnapshot {
    pub items: Vec<CartLineItem>,
    pub applied_coupon: Option<AppliedCoupon>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart total cannot exceed {limit}")]
    AmountLimit { limit: Decimal },
}

/// Whether `max_quantity` caps line quantities or is only reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QuantityPolicy {
    #[default]
    Advisory,
    Enforced,
}

impl QuantityPolicy {
    fn apply(self, requested: Quantity, max: Option<u32>) -> Quantity {
        match (self, max) {
            (Self::Enforced, Some(max)) => requested.capped_at(max.max(1)),
            _ => requested,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Cart {
    items: Vec<CartLineItem>,
    applied_coupon: Option<AppliedCoupon>,
    currency: String,
    policy: QuantityPolicy,
    events: Vec<CartEvent>,
}

impl Cart {
    pub fn new(currency: &str, policy: QuantityPolicy) -> Self {
        Self { items: vec![], applied_coupon: None, currency: currency.to_string(), policy, events: vec![] }
    }

    /// Rebuilds a cart from a persisted snapshot. Zero-quantity rows are
    /// dropped, repeated products are merged into the first row and rows that
    /// would push the total past [`MAX_AMOUNT`] are discarded.
    pub fn from_snapshot(snapshot: CartSnapshot, currency: &str, policy: QuantityPolicy) -> Self {
        let mut merged: Vec<CartLineItem> = Vec::with_capacity(snapshot.items.len());
        for item in snapshot.items.into_iter().filter(|i| !i.quantity.is_zero()) {
            match merged.iter_mut().find(|i| i.product_id == item.product_id) {
                Some(existing) => existing.quantity = existing.quantity.add(item.quantity.value()),
                None => merged.push(item),
            }
        }
        let mut items = Vec::with_capacity(merged.len());
        let mut total = Decimal::ZERO;
        for item in merged {
            match item.checked_line_total(item.quantity).and_then(|t| total.checked_add(t)).filter(|t| within_limit(*t)) {
                Some(next) => {
                    total = next;
                    items.push(item);
                }
                None => tracing::warn!(product_id = %item.product_id, "discarding stored cart line above the amount limit"),
            }
        }
        Self { items, applied_coupon: snapshot.applied_coupon, currency: currency.to_string(), policy, events: vec![] }
    }

    pub fn items(&self) -> &[CartLineItem] { &self.items }
    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> { self.applied_coupon.as_ref() }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn item(&self, product_id: &str) -> Option<&CartLineItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Adds `quantity` of `product`, merging into an existing line. Refused,
    /// with the cart unchanged, when the total would pass [`MAX_AMOUNT`].
    pub fn add_item(&mut self, product: CartProduct, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            tracing::debug!(product_id = %product.product_id, "ignoring add with zero quantity");
            return Ok(());
        }
        let policy = self.policy;
        let event = match self.position(&product.product_id) {
            Some(pos) => {
                let next = policy.apply(self.items[pos].quantity.add(quantity), self.items[pos].max_quantity);
                self.ensure_within_limit(Some(pos), &self.items[pos], next)?;
                let line = &mut self.items[pos];
                line.quantity = next;
                warn_above_max(line);
                CartEvent::QuantityIncreased { product_id: line.product_id.clone(), name: line.name.clone(), quantity: line.quantity.value() }
            }
            None => {
                let line = CartLineItem {
                    id: Uuid::new_v4().to_string(),
                    quantity: policy.apply(Quantity::new(quantity), product.max_quantity),
                    product_id: product.product_id,
                    name: product.name,
                    unit_price: product.unit_price,
                    max_quantity: product.max_quantity,
                    selected_options: product.selected_options,
                };
                self.ensure_within_limit(None, &line, line.quantity)?;
                warn_above_max(&line);
                let event = CartEvent::ItemAdded { product_id: line.product_id.clone(), name: line.name.clone(), quantity: line.quantity.value() };
                self.items.push(line);
                event
            }
        };
        self.raise_event(event);
        Ok(())
    }

    /// Sets a line's quantity. Anything at or below zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove_item(product_id);
            return Ok(());
        }
        let Some(pos) = self.position(product_id) else {
            tracing::debug!(product_id, "quantity update for product not in cart");
            return Ok(());
        };
        let requested = Quantity::new(u32::try_from(quantity).unwrap_or(u32::MAX));
        let next = self.policy.apply(requested, self.items[pos].max_quantity);
        self.ensure_within_limit(Some(pos), &self.items[pos], next)?;
        let line = &mut self.items[pos];
        line.quantity = next;
        warn_above_max(line);
        Ok(())
    }

    /// Returns whether a line was removed.
    pub fn remove_item(&mut self, product_id: &str) -> bool {
        let Some(pos) = self.items.iter().position(|i| i.product_id == product_id) else {
            return false;
        };
        let line = self.items.remove(pos);
        self.raise_event(CartEvent::ItemRemoved { product_id: line.product_id, name: line.name });
        true
    }

    /// Empties the cart and drops the coupon in one step.
    pub fn clear(&mut self) {
        self.items.clear();
        self.applied_coupon = None;
        self.raise_event(CartEvent::Cleared);
    }

    pub fn total_items(&self) -> u64 { self.items.iter().map(|i| u64::from(i.quantity.value())).sum() }

    /// Sum of line totals before any coupon discount.
    pub fn total_price(&self) -> Money {
        let total = self.items.iter().fold(Decimal::ZERO, |acc, i| acc.saturating_add(i.line_total()));
        Money::new(total, &self.currency)
    }

    pub fn apply_coupon(&mut self, code: CouponCode, discount_amount: Decimal) {
        self.applied_coupon = Some(AppliedCoupon { code: code.clone(), discount_amount });
        self.raise_event(CartEvent::CouponApplied { code, discount_amount });
    }

    pub fn remove_coupon(&mut self) {
        if self.applied_coupon.take().is_some() {
            self.raise_event(CartEvent::CouponRemoved);
        }
    }

    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot { items: self.items.clone(), applied_coupon: self.applied_coupon.clone() }
    }

    pub fn take_events(&mut self) -> Vec<CartEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: CartEvent) { self.events.push(e); }

    fn position(&self, product_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.product_id == product_id)
    }

    /// Checks the cart total with `line` at `quantity`, replacing the row at
    /// `replacing` when the line is already in the cart.
    fn ensure_within_limit(&self, replacing: Option<usize>, line: &CartLineItem, quantity: Quantity) -> Result<(), CartError> {
        let others = self.items.iter().enumerate()
            .filter(|(pos, _)| Some(*pos) != replacing)
            .try_fold(Decimal::ZERO, |acc, (_, i)| acc.checked_add(i.line_total()));
        let total = others.zip(line.checked_line_total(quantity)).and_then(|(a, b)| a.checked_add(b));
        match total {
            Some(total) if within_limit(total) => Ok(()),
            _ => {
                tracing::warn!(product_id = %line.product_id, quantity = quantity.value(), "cart change refused, total above limit");
                Err(CartError::AmountLimit { limit: MAX_AMOUNT })
            }
        }
    }
}

fn within_limit(total: Decimal) -> bool { total <= MAX_AMOUNT }

fn warn_above_max(line: &CartLineItem) {
    if line.exceeds_max_quantity() {
        tracing::warn!(product_id = %line.product_id, quantity = line.quantity.value(), max = ?line.max_quantity, "cart line above advertised stock");
    }
}
