//! Domain events
use crate::domain::value_objects::CouponCode;
use rust_decimal::Decimal;

/// Cart changes worth telling the shopper about.
#[derive(Clone, Debug, PartialEq)]
pub enum CartEvent {
    ItemAdded { product_id: String, name: String, quantity: u32 },
    QuantityIncreased { product_id: String, name: String, quantity: u32 },
    ItemRemoved { product_id: String, name: String },
    Cleared,
    CouponApplied { code: CouponCode, discount_amount: Decimal },
    CouponRemoved,
}

impl CartEvent {
    /// Notification text shown to the shopper.
    pub fn message(&self) -> String {
        match self {
            Self::ItemAdded { name, .. } => format!("{name} added to cart"),
            Self::QuantityIncreased { name, quantity, .. } => format!("{name} quantity increased to {quantity}"),
            Self::ItemRemoved { name, .. } => format!("{name} removed from cart"),
            Self::Cleared => "Cart cleared".to_string(),
            Self::CouponApplied { code, .. } => format!("Coupon {code} applied"),
            Self::CouponRemoved => "Coupon removed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Created { order_id: String, email: String },
    Confirmed { order_id: String, total: Decimal },
}
