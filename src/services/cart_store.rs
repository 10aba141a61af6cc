//! Shared handle around one shopper's cart.
//!
//! Every mutation publishes the new cart to `watch` subscribers, forwards the
//! cart's notifications on a broadcast channel and schedules a debounced
//! write of the snapshot.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::domain::aggregates::{Cart, CartProduct, QuantityPolicy};
use crate::domain::events::CartEvent;
use crate::domain::value_objects::{CouponCode, Money};
use crate::services::catalog::Catalog;
use crate::services::checkout::{CheckoutDetails, CheckoutReceipt, CheckoutRequest, CheckoutService};
use crate::services::coupons::{ApplyCouponResponse, CouponService};
use crate::storage::{CartPersistence, DebouncedWriter};
use crate::{Result, StorefrontError};

const NOTIFICATION_CAPACITY: usize = 32;

#[derive(Clone, Debug)]
pub struct CartSettings {
    pub currency: String,
    pub policy: QuantityPolicy,
    pub persist_debounce: Duration,
}

impl Default for CartSettings {
    fn default() -> Self {
        Self { currency: "INR".to_string(), policy: QuantityPolicy::Advisory, persist_debounce: Duration::from_millis(300) }
    }
}

#[derive(Debug)]
pub struct CartStore {
    cart: Cart,
    writer: DebouncedWriter,
    state: watch::Sender<Cart>,
    notifications: broadcast::Sender<CartEvent>,
}

impl CartStore {
    /// Rehydrates the cart from storage. An unreadable snapshot yields an
    /// empty cart.
    pub fn load(persistence: CartPersistence, settings: &CartSettings) -> Self {
        let cart = Cart::from_snapshot(persistence.load(), &settings.currency, settings.policy);
        tracing::debug!(items = cart.items().len(), "cart rehydrated");
        Self::new(cart, DebouncedWriter::new(persistence, settings.persist_debounce))
    }

    pub fn new(cart: Cart, writer: DebouncedWriter) -> Self {
        let (state, _) = watch::channel(cart.clone());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { cart, writer, state, notifications }
    }

    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn subscribe(&self) -> watch::Receiver<Cart> { self.state.subscribe() }
    pub fn notifications(&self) -> broadcast::Receiver<CartEvent> { self.notifications.subscribe() }
    pub fn total_items(&self) -> u64 { self.cart.total_items() }
    pub fn total_price(&self) -> Money { self.cart.total_price() }

    pub fn add_item(&mut self, product: CartProduct, quantity: u32) -> Result<()> {
        self.cart.add_item(product, quantity)?;
        self.commit();
        Ok(())
    }

    /// Looks the product up in the catalog and adds it with the current
    /// display data.
    pub async fn add_product(&mut self, catalog: &dyn Catalog, product_id: &str, quantity: u32, selected_options: Option<BTreeMap<String, String>>) -> Result<()> {
        let product = catalog.product(product_id).await?.ok_or_else(|| StorefrontError::ProductNotFound(product_id.to_string()))?;
        self.add_item(product.into_cart_product(selected_options), quantity)
    }

    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> Result<()> {
        self.cart.update_quantity(product_id, quantity)?;
        self.commit();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) {
        self.cart.remove_item(product_id);
        self.commit();
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
        self.commit();
    }

    pub fn apply_coupon(&mut self, code: CouponCode, discount_amount: rust_decimal::Decimal) {
        self.cart.apply_coupon(code, discount_amount);
        self.commit();
    }

    pub fn remove_coupon(&mut self) {
        self.cart.remove_coupon();
        self.commit();
    }

    /// Evaluates `code` against the cart total and applies it on success.
    /// A rejection or backend failure leaves the cart unchanged.
    pub async fn redeem_coupon(&mut self, coupons: &CouponService, code: &str) -> ApplyCouponResponse {
        let response = coupons.apply_coupon(code, self.cart.total_price().amount()).await;
        if let (true, Some(amount)) = (response.success, response.discount_amount) {
            match CouponCode::new(code) {
                Ok(code) => self.apply_coupon(code, amount),
                Err(e) => tracing::warn!(error = %e, "accepted coupon has an unusable code"),
            }
        }
        response
    }

    /// Submits the cart for checkout. The cart is cleared only when the order
    /// was placed.
    pub async fn checkout(&mut self, service: &CheckoutService, details: CheckoutDetails) -> Result<CheckoutReceipt> {
        let request = CheckoutRequest {
            details,
            items: self.cart.items().to_vec(),
            coupon_code: self.cart.applied_coupon().map(|c| c.code.clone()),
        };
        let receipt = service.checkout(request).await?;
        self.cart.clear();
        self.publish();
        self.flush();
        Ok(receipt)
    }

    /// Writes the current cart immediately.
    pub fn flush(&mut self) {
        self.writer.flush(&self.cart.snapshot());
    }

    /// Settles storage before the store is dropped: an empty cart is removed
    /// from storage, a pending write is flushed.
    pub fn close(&mut self) {
        if self.cart.is_empty() && self.cart.applied_coupon().is_none() {
            self.writer.discard();
        } else if self.writer.is_pending() {
            self.flush();
        }
    }

    fn commit(&mut self) {
        self.publish();
        self.writer.schedule(self.cart.snapshot());
    }

    fn publish(&mut self) {
        for event in self.cart.take_events() {
            tracing::debug!(notification = %event.message(), "cart updated");
            // No subscribers is fine.
            let _ = self.notifications.send(event);
        }
        self.state.send_replace(self.cart.clone());
    }
}
