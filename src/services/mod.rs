//! Application services
pub mod cart_store;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod sessions;
pub mod shipping;

pub use cart_store::{CartSettings, CartStore};
pub use catalog::{Catalog, HttpCatalog, InMemoryCatalog, ProductSummary};
pub use checkout::{CheckoutDetails, CheckoutReceipt, CheckoutService, InMemoryOrderBook, OrderGateway};
pub use coupons::{ApplyCouponResponse, CouponRepository, CouponService, InMemoryCouponRepository};
pub use sessions::CartSessions;
pub use shipping::{HttpRateProvider, ShippingQuoter, ShippingRateProvider};
