//! Cart snapshot encoding on top of a [`KeyValueStore`].

use std::sync::Arc;

use crate::domain::aggregates::{AppliedCoupon, CartLineItem, CartSnapshot};
use crate::storage::KeyValueStore;

pub const ITEMS_KEY: &str = "cart_items";
pub const COUPON_KEY: &str = "cart_coupon";

#[derive(Clone)]
pub struct CartPersistence {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for CartPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartPersistence").finish_non_exhaustive()
    }
}

impl CartPersistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self { Self { store } }

    /// Reads the stored cart. Items and coupon are decoded independently and
    /// anything unreadable is treated as absent.
    pub fn load(&self) -> CartSnapshot {
        let items = self.store.read(ITEMS_KEY).map(|raw| decode_items(&raw)).unwrap_or_default();
        let applied_coupon = self.store.read(COUPON_KEY).and_then(|raw| decode_coupon(&raw));
        CartSnapshot { items, applied_coupon }
    }

    pub fn save(&self, snapshot: &CartSnapshot) {
        match serde_json::to_string(&snapshot.items) {
            Ok(raw) => self.store.write(ITEMS_KEY, &raw),
            Err(e) => tracing::warn!(error = %e, "failed to encode cart items"),
        }
        match &snapshot.applied_coupon {
            Some(coupon) => match serde_json::to_string(coupon) {
                Ok(raw) => self.store.write(COUPON_KEY, &raw),
                Err(e) => tracing::warn!(error = %e, "failed to encode applied coupon"),
            },
            None => self.store.remove(COUPON_KEY),
        }
    }

    pub fn clear(&self) {
        self.store.remove(ITEMS_KEY);
        self.store.remove(COUPON_KEY);
    }
}

fn decode_items(raw: &str) -> Vec<CartLineItem> {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable cart payload");
            return vec![];
        }
    };
    if !value.is_array() {
        tracing::warn!("discarding cart payload that is not an array");
        return vec![];
    }
    serde_json::from_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "discarding malformed cart items");
        vec![]
    })
}

fn decode_coupon(raw: &str) -> Option<AppliedCoupon> {
    serde_json::from_str(raw)
        .map_err(|e| tracing::warn!(error = %e, "discarding unreadable coupon payload"))
        .ok()
}
