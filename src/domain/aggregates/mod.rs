//! Aggregates module
pub mod cart;
pub mod coupon;
pub mod order;

pub use cart::{AppliedCoupon, Cart, CartError, CartLineItem, CartProduct, CartSnapshot, QuantityPolicy};
pub use coupon::{Coupon, CouponRejection, DiscountKind, NewCoupon};
pub use order::{Address, LineItem, Order, OrderCoupon, OrderError, OrderStatus};
