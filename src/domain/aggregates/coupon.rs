//! Coupon entity and discount evaluation

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::value_objects::CouponCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountKind {
    Percentage,
    Fixed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_order_amount: Option<Decimal>,
    /// Only honoured for percentage coupons.
    pub max_discount_amount: Option<Decimal>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Why a coupon could not be used. The display text is shown to shoppers as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("Invalid or inactive coupon code.")]
    InvalidOrInactive,
    #[error("Coupon has expired.")]
    Expired,
    #[error("Coupon usage limit reached.")]
    UsageLimitReached,
    #[error("Minimum order amount of {minimum} is required for this coupon.")]
    BelowMinimum { minimum: Decimal },
}

impl Coupon {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.used_count >= limit)
    }

    /// Discount this coupon grants on `subtotal` at `now`.
    ///
    /// Checks run in a fixed order (active, expiry, usage, minimum order) and
    /// the first failing one is reported. The result never exceeds `subtotal`.
    pub fn evaluate_at(&self, subtotal: Decimal, now: DateTime<Utc>) -> Result<Decimal, CouponRejection> {
        if !self.is_active { return Err(CouponRejection::InvalidOrInactive); }
        if self.is_expired_at(now) { return Err(CouponRejection::Expired); }
        if self.is_exhausted() { return Err(CouponRejection::UsageLimitReached); }
        if let Some(minimum) = self.min_order_amount {
            if subtotal < minimum { return Err(CouponRejection::BelowMinimum { minimum }); }
        }

        let raw = match self.kind {
            DiscountKind::Percentage => {
                let pct = subtotal
                    .checked_mul(self.value)
                    .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                    .unwrap_or_else(|| (subtotal / Decimal::ONE_HUNDRED).saturating_mul(self.value));
                match self.max_discount_amount {
                    Some(cap) if pct > cap => cap,
                    _ => pct,
                }
            }
            DiscountKind::Fixed => self.value,
        };
        let discount = raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Ok(discount.min(subtotal).max(Decimal::ZERO))
    }
}

/// Admin payload for creating a coupon.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_new_coupon"))]
pub struct NewCoupon {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_order_amount: Option<Decimal>,
    pub max_discount_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<u32>,
    pub expiry_date: Option<DateTime<Utc>>,
}

fn validate_new_coupon(coupon: &NewCoupon) -> Result<(), ValidationError> {
    if coupon.value <= Decimal::ZERO {
        return Err(ValidationError::new("value_not_positive"));
    }
    if coupon.kind == DiscountKind::Percentage && coupon.value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percentage_above_100"));
    }
    let negative = |v: Option<Decimal>| v.is_some_and(|v| v < Decimal::ZERO);
    if negative(coupon.min_order_amount) || negative(coupon.max_discount_amount) {
        return Err(ValidationError::new("negative_amount"));
    }
    Ok(())
}

impl NewCoupon {
    /// Builds an active coupon with no recorded usage.
    pub fn into_coupon(self, code: CouponCode) -> Coupon {
        Coupon {
            id: Uuid::now_v7(),
            code,
            kind: self.kind,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount_amount: self.max_discount_amount,
            usage_limit: self.usage_limit,
            used_count: 0,
            expiry_date: self.expiry_date,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(kind: DiscountKind, value: i64) -> Coupon {
        NewCoupon {
            code: "SAVE".into(), kind, value: Decimal::new(value, 0),
            min_order_amount: None, max_discount_amount: None, usage_limit: None, expiry_date: None,
        }.into_coupon(CouponCode::new("SAVE").unwrap())
    }

    #[test]
    fn test_percentage_capped_by_max_discount() {
        let mut c = coupon(DiscountKind::Percentage, 20);
        c.max_discount_amount = Some(Decimal::new(1500, 0));
        assert_eq!(c.evaluate_at(Decimal::new(10_000, 0), Utc::now()), Ok(Decimal::new(1500, 0)));
    }

    #[test]
    fn test_percentage_below_cap() {
        let mut c = coupon(DiscountKind::Percentage, 10);
        c.max_discount_amount = Some(Decimal::new(1500, 0));
        assert_eq!(c.evaluate_at(Decimal::new(999, 0), Utc::now()), Ok(Decimal::new(9990, 2)));
    }

    #[test]
    fn test_fixed_never_exceeds_subtotal() {
        let c = coupon(DiscountKind::Fixed, 500);
        assert_eq!(c.evaluate_at(Decimal::new(300, 0), Utc::now()), Ok(Decimal::new(300, 0)));
    }

    #[test]
    fn test_percentage_of_huge_subtotal_does_not_overflow() {
        let c = coupon(DiscountKind::Percentage, 20);
        let discount = c.evaluate_at(Decimal::MAX, Utc::now()).unwrap();
        assert!(discount > Decimal::ZERO);
        assert!(discount <= Decimal::MAX);
    }

    #[test]
    fn test_cap_ignored_for_fixed() {
        let mut c = coupon(DiscountKind::Fixed, 500);
        c.max_discount_amount = Some(Decimal::new(100, 0));
        assert_eq!(c.evaluate_at(Decimal::new(1000, 0), Utc::now()), Ok(Decimal::new(500, 0)));
    }

    #[test]
    fn test_expired_wins_over_other_checks() {
        let mut c = coupon(DiscountKind::Fixed, 50);
        c.expiry_date = Some(Utc::now() - Duration::days(1));
        c.usage_limit = Some(1);
        c.used_count = 1;
        c.min_order_amount = Some(Decimal::new(10_000, 0));
        let err = c.evaluate_at(Decimal::new(100, 0), Utc::now()).unwrap_err();
        assert_eq!(err, CouponRejection::Expired);
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_inactive_rejected() {
        let mut c = coupon(DiscountKind::Fixed, 50);
        c.is_active = false;
        assert_eq!(c.evaluate_at(Decimal::new(100, 0), Utc::now()), Err(CouponRejection::InvalidOrInactive));
    }

    #[test]
    fn test_usage_limit_reached() {
        let mut c = coupon(DiscountKind::Fixed, 50);
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert_eq!(c.evaluate_at(Decimal::new(100, 0), Utc::now()), Err(CouponRejection::UsageLimitReached));
    }

    #[test]
    fn test_minimum_order_named_in_message() {
        let mut c = coupon(DiscountKind::Fixed, 50);
        c.min_order_amount = Some(Decimal::new(999, 0));
        let err = c.evaluate_at(Decimal::new(500, 0), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("999"));
    }

    #[test]
    fn test_new_coupon_validation() {
        let mut payload = NewCoupon {
            code: "BIG".into(), kind: DiscountKind::Percentage, value: Decimal::new(120, 0),
            min_order_amount: None, max_discount_amount: None, usage_limit: Some(0), expiry_date: None,
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("usage_limit"));
        payload.usage_limit = Some(5);
        assert!(payload.validate().is_err());
        payload.value = Decimal::new(15, 0);
        assert!(payload.validate().is_ok());
    }
}
