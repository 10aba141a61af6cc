//! Checkout: turns cart lines and an optional coupon into a confirmed order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use validator::Validate;

use crate::domain::aggregates::{Address, CartLineItem, LineItem, Order, OrderCoupon};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{validate_amount, CouponCode};
use crate::services::coupons::CouponService;
use crate::{Result, StorefrontError};

/// Order-creation collaborator.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn create_order(&self, order: Order) -> Result<String>;
    async fn get_order(&self, id: &str) -> Result<Option<Order>>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderBook {
    orders: RwLock<HashMap<String, Order>>,
}

impl InMemoryOrderBook {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl OrderGateway for InMemoryOrderBook {
    async fn create_order(&self, order: Order) -> Result<String> {
        let id = order.id().to_string();
        self.orders.write().await.insert(id.clone(), order);
        Ok(id)
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(id).cloned())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSelection {
    #[validate(custom = "validate_amount")]
    pub amount: Decimal,
    pub address: Option<Address>,
}

/// Buyer details supplied at checkout.
#[derive(Clone, Debug, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetails {
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    #[validate]
    pub shipping: Option<ShippingSelection>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckoutRequest {
    pub details: CheckoutDetails,
    pub items: Vec<CartLineItem>,
    pub coupon_code: Option<CouponCode>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order_id: String,
    pub order_number: String,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<CouponCode>,
}

impl CheckoutReceipt {
    fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            subtotal: order.subtotal().amount(),
            shipping: order.shipping().amount(),
            discount: order.discount().amount(),
            total: order.total().amount(),
            currency: order.total().currency().to_string(),
            coupon_code: order.coupon().map(|c| c.code.clone()),
        }
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderGateway>,
    coupons: CouponService,
    currency: String,
}

impl std::fmt::Debug for CheckoutService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutService").field("currency", &self.currency).finish_non_exhaustive()
    }
}

impl CheckoutService {
    pub fn new(orders: Arc<dyn OrderGateway>, coupons: CouponService, currency: &str) -> Self {
        Self { orders, coupons, currency: currency.to_string() }
    }

    pub fn currency(&self) -> &str { &self.currency }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        self.orders.get_order(id).await?.ok_or(StorefrontError::OrderNotFound)
    }

    /// Places the order. The coupon is evaluated again against the order
    /// subtotal, and its usage is committed only after the order exists.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        request.details.validate()?;

        let mut order = Order::create(request.details.email.as_str(), &self.currency);
        for line in request.items.iter().filter(|l| !l.quantity.is_zero()) {
            order.add_item(LineItem::from_cart_line(line, &self.currency));
        }
        if order.items().is_empty() {
            return Err(StorefrontError::EmptyCart);
        }
        if let Some(shipping) = request.details.shipping {
            order.set_shipping(shipping.amount, shipping.address);
        }

        let discount = match &request.coupon_code {
            Some(code) => Some(self.coupons.evaluate(code.as_str(), order.subtotal().amount()).await?),
            None => None,
        };
        if let Some(d) = &discount {
            order.apply_discount(OrderCoupon { coupon_id: d.coupon_id, code: d.code.clone() }, d.discount_amount);
        }

        order.confirm()?;
        for event in order.take_events() {
            if let OrderEvent::Confirmed { order_id, total } = event {
                tracing::info!(%order_id, %total, "order confirmed");
            }
        }
        let receipt = CheckoutReceipt::from_order(&order);
        self.orders.create_order(order).await?;

        if let Some(d) = discount {
            if let Err(e) = self.coupons.commit_usage(d.coupon_id).await {
                tracing::warn!(error = %e, code = %d.code, order_id = %receipt.order_id, "failed to commit coupon usage");
            }
        }
        Ok(receipt)
    }
}
