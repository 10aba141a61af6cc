//! Storefront commerce core
//!
//! Cart, coupon and checkout logic for the storefront.
//!
//! ## Features
//! - Shopping cart with debounced, best-effort persistence
//! - Coupon evaluation with a separate usage commit step
//! - Shipping quotes with a static fallback rate table
//! - Checkout into confirmed orders

pub mod config;
pub mod domain;
pub mod http;
pub mod services;
pub mod storage;
pub mod telemetry;

use thiserror::Error;

use crate::domain::aggregates::{CartError, CouponRejection, OrderError};
use crate::domain::value_objects::CodeError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Coupon not found")]
    CouponNotFound,

    #[error("Coupon code already exists: {0}")]
    DuplicateCoupon(String),

    #[error("Order not found")]
    OrderNotFound,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid cart session: {0}")]
    InvalidSession(String),

    #[error("Invalid coupon code: {0}")]
    InvalidCode(#[from] CodeError),

    #[error("{0}")]
    CouponRejected(#[from] CouponRejection),

    #[error("{0}")]
    Cart(#[from] CartError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Integration error: {0}")]
    Integration(String),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
