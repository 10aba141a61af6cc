//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use validator::ValidationError;

/// Longest coupon code the admin console accepts.
pub const MAX_CODE_LEN: usize = 32;

/// Largest amount (1,000,000,000,000) a cart total, order subtotal or
/// shipping charge may reach.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// `validator` rule for request amounts: between zero and [`MAX_AMOUNT`].
pub fn validate_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_amount"));
    }
    if *value > MAX_AMOUNT {
        return Err(ValidationError::new("amount_too_large"));
    }
    Ok(())
}

/// Coupon code value object. Codes are compared case-insensitively, so the
/// stored form is always trimmed and uppercased.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CodeError::Empty); }
        if value.chars().count() > MAX_CODE_LEN { return Err(CodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for CouponCode {
    type Error = CodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<CouponCode> for String {
    fn from(code: CouponCode) -> Self { code.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("Coupon code empty")]
    Empty,
    #[error("Coupon code too long")]
    TooLong,
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    #[cfg(test)]
    pub fn inr(amount: Decimal) -> Self { Self::new(amount, "INR") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        let amount = self.amount.checked_add(other.amount).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount, &self.currency))
    }
    /// Subtracts `other`, flooring the result at zero.
    pub fn saturating_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new((self.amount - other.amount).max(Decimal::ZERO), &self.currency))
    }
    /// Saturates at the largest representable amount.
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount.saturating_mul(Decimal::from(qty)), &self.currency) }
}

impl Default for Money { fn default() -> Self { Self::zero("INR") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.currency, self.amount) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("Currency mismatch")]
    CurrencyMismatch,
    #[error("Amount overflow")]
    Overflow,
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn capped_at(self, cap: u32) -> Self { Self(self.0.min(cap)) }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coupon_code_normalized() {
        let code = CouponCode::new("  save20 ").unwrap();
        assert_eq!(code.as_str(), "SAVE20");
        assert_eq!(code, CouponCode::new("SAVE20").unwrap());
    }

    #[test]
    fn test_coupon_code_rejects_bad_input() {
        assert_eq!(CouponCode::new("   "), Err(CodeError::Empty));
        assert_eq!(CouponCode::new("X".repeat(MAX_CODE_LEN + 1)), Err(CodeError::TooLong));
    }

    #[test]
    fn test_money_add() {
        let a = Money::inr(Decimal::new(100, 0));
        let b = Money::inr(Decimal::new(50, 0));
        assert_eq!(a.add(&b).unwrap().amount(), Decimal::new(150, 0));
        assert_eq!(a.add(&Money::zero("USD")), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn test_money_saturating_sub() {
        let a = Money::inr(Decimal::new(300, 0));
        let b = Money::inr(Decimal::new(500, 0));
        assert!(a.saturating_sub(&b).unwrap().is_zero());
    }

    #[test]
    fn test_money_add_overflow_is_an_error() {
        let max = Money::inr(Decimal::MAX);
        assert_eq!(max.add(&Money::inr(Decimal::ONE)), Err(MoneyError::Overflow));
        assert_eq!(max.multiply(3).amount(), Decimal::MAX);
    }

    #[test]
    fn test_amount_bounds() {
        assert_eq!(MAX_AMOUNT, Decimal::new(1_000_000_000_000, 0));
        assert!(validate_amount(&Decimal::ZERO).is_ok());
        assert!(validate_amount(&MAX_AMOUNT).is_ok());
        assert!(validate_amount(&Decimal::new(-1, 2)).is_err());
        assert!(validate_amount(&(MAX_AMOUNT + Decimal::ONE)).is_err());
        assert!(validate_amount(&Decimal::MAX).is_err());
    }

    #[test]
    fn test_quantity() {
        let q = Quantity::new(2).add(3);
        assert_eq!(q.value(), 5);
        assert_eq!(q.capped_at(4).value(), 4);
        assert_eq!(Quantity::new(u32::MAX).add(1).value(), u32::MAX);
        assert!(Quantity::default().is_zero());
    }
}
