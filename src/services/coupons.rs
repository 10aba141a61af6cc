//! Coupon lookup, evaluation and usage commits.
//!
//! Evaluating a coupon never touches its usage count. Usage is committed with
//! [`CouponService::commit_usage`] once the order is confirmed, so coupons
//! applied to abandoned checkouts do not use up their limit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Coupon, CouponRejection, NewCoupon};
use crate::domain::value_objects::{validate_amount, CouponCode};
use crate::{Result, StorefrontError};

pub const APPLY_FAILED_MESSAGE: &str = "Failed to apply coupon. Please try again.";

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>>;
    async fn insert(&self, coupon: Coupon) -> Result<Coupon>;
    async fn list(&self) -> Result<Vec<Coupon>>;
    async fn increment_usage(&self, id: Uuid) -> Result<Coupon>;
    async fn deactivate(&self, id: Uuid) -> Result<Coupon>;
}

#[derive(Debug, Default)]
pub struct InMemoryCouponRepository {
    coupons: RwLock<HashMap<Uuid, Coupon>>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.coupons.read().await.values().find(|c| &c.code == code).cloned())
    }

    async fn insert(&self, coupon: Coupon) -> Result<Coupon> {
        let mut coupons = self.coupons.write().await;
        if coupons.values().any(|c| c.code == coupon.code) {
            return Err(StorefrontError::DuplicateCoupon(coupon.code.to_string()));
        }
        coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn list(&self) -> Result<Vec<Coupon>> {
        let mut coupons: Vec<Coupon> = self.coupons.read().await.values().cloned().collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(coupons)
    }

    async fn increment_usage(&self, id: Uuid) -> Result<Coupon> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons.get_mut(&id).ok_or(StorefrontError::CouponNotFound)?;
        coupon.used_count = coupon.used_count.saturating_add(1);
        Ok(coupon.clone())
    }

    async fn deactivate(&self, id: Uuid) -> Result<Coupon> {
        let mut coupons = self.coupons.write().await;
        let coupon = coupons.get_mut(&id).ok_or(StorefrontError::CouponNotFound)?;
        coupon.is_active = false;
        Ok(coupon.clone())
    }
}

/// A coupon that passed evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponDiscount {
    pub coupon_id: Uuid,
    pub code: CouponCode,
    pub discount_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: String,
    #[validate(custom = "validate_amount")]
    pub total_amount: Decimal,
}

/// Tagged result returned to the checkout UI. Rejections are reported here,
/// never as errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_id: Option<Uuid>,
}

impl ApplyCouponResponse {
    fn rejected(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), discount_amount: None, coupon_id: None }
    }
}

#[derive(Clone)]
pub struct CouponService {
    repo: Arc<dyn CouponRepository>,
}

impl std::fmt::Debug for CouponService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponService").finish_non_exhaustive()
    }
}

impl CouponService {
    pub fn new(repo: Arc<dyn CouponRepository>) -> Self { Self { repo } }

    pub async fn evaluate(&self, code: &str, subtotal: Decimal) -> Result<CouponDiscount> {
        self.evaluate_at(code, subtotal, Utc::now()).await
    }

    pub async fn evaluate_at(&self, code: &str, subtotal: Decimal, now: DateTime<Utc>) -> Result<CouponDiscount> {
        let code = CouponCode::new(code).map_err(|_| CouponRejection::InvalidOrInactive)?;
        let coupon = self.repo.find_by_code(&code).await?.ok_or(CouponRejection::InvalidOrInactive)?;
        let discount_amount = coupon.evaluate_at(subtotal, now)?;
        Ok(CouponDiscount { coupon_id: coupon.id, code: coupon.code, discount_amount })
    }

    /// Entry point for the checkout UI.
    pub async fn apply_coupon(&self, code: &str, total_amount: Decimal) -> ApplyCouponResponse {
        match self.evaluate(code, total_amount).await {
            Ok(discount) => {
                tracing::debug!(code = %discount.code, amount = %discount.discount_amount, "coupon evaluated");
                ApplyCouponResponse {
                    success: true,
                    message: format!("Coupon {} applied.", discount.code),
                    discount_amount: Some(discount.discount_amount),
                    coupon_id: Some(discount.coupon_id),
                }
            }
            Err(StorefrontError::CouponRejected(reason)) => ApplyCouponResponse::rejected(reason.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "coupon evaluation failed");
                ApplyCouponResponse::rejected(APPLY_FAILED_MESSAGE)
            }
        }
    }

    /// Records one use of the coupon. Call only after the order is confirmed.
    pub async fn commit_usage(&self, coupon_id: Uuid) -> Result<Coupon> {
        let coupon = self.repo.increment_usage(coupon_id).await?;
        tracing::info!(code = %coupon.code, used = coupon.used_count, "coupon usage committed");
        Ok(coupon)
    }

    pub async fn create_coupon(&self, payload: NewCoupon) -> Result<Coupon> {
        payload.validate()?;
        let code = CouponCode::new(payload.code.as_str())?;
        let coupon = self.repo.insert(payload.into_coupon(code)).await?;
        tracing::info!(code = %coupon.code, id = %coupon.id, "coupon created");
        Ok(coupon)
    }

    pub async fn list_coupons(&self) -> Result<Vec<Coupon>> { self.repo.list().await }

    pub async fn deactivate_coupon(&self, id: Uuid) -> Result<Coupon> { self.repo.deactivate(id).await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::DiscountKind;
    use chrono::Duration;

    fn new_coupon(code: &str, kind: DiscountKind, value: i64) -> NewCoupon {
        NewCoupon { code: code.into(), kind, value: Decimal::new(value, 0), min_order_amount: None, max_discount_amount: None, usage_limit: None, expiry_date: None }
    }

    fn service() -> CouponService { CouponService::new(Arc::new(InMemoryCouponRepository::new())) }

    struct BrokenRepository;

    #[async_trait]
    impl CouponRepository for BrokenRepository {
        async fn find_by_code(&self, _: &CouponCode) -> Result<Option<Coupon>> { Err(StorefrontError::StorageError("connection reset".into())) }
        async fn insert(&self, _: Coupon) -> Result<Coupon> { Err(StorefrontError::StorageError("down".into())) }
        async fn list(&self) -> Result<Vec<Coupon>> { Err(StorefrontError::StorageError("down".into())) }
        async fn increment_usage(&self, _: Uuid) -> Result<Coupon> { Err(StorefrontError::StorageError("down".into())) }
        async fn deactivate(&self, _: Uuid) -> Result<Coupon> { Err(StorefrontError::StorageError("down".into())) }
    }

    #[tokio::test]
    async fn test_apply_is_case_insensitive_and_does_not_count_usage() {
        let svc = service();
        let mut payload = new_coupon("Festive20", DiscountKind::Percentage, 20);
        payload.max_discount_amount = Some(Decimal::new(1500, 0));
        let created = svc.create_coupon(payload).await.unwrap();

        let res = svc.apply_coupon("festive20", Decimal::new(10_000, 0)).await;
        assert!(res.success);
        assert_eq!(res.discount_amount, Some(Decimal::new(1500, 0)));
        assert_eq!(res.coupon_id, Some(created.id));
        assert_eq!(svc.list_coupons().await.unwrap()[0].used_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_codes_rejected() {
        let svc = service();
        let created = svc.create_coupon(new_coupon("FLAT50", DiscountKind::Fixed, 50)).await.unwrap();
        let res = svc.apply_coupon("NOPE", Decimal::new(100, 0)).await;
        assert!(!res.success);
        assert_eq!(res.message, "Invalid or inactive coupon code.");

        svc.deactivate_coupon(created.id).await.unwrap();
        let res = svc.apply_coupon("FLAT50", Decimal::new(100, 0)).await;
        assert_eq!(res.message, "Invalid or inactive coupon code.");
        assert_eq!(svc.apply_coupon("   ", Decimal::new(100, 0)).await.message, "Invalid or inactive coupon code.");
    }

    #[tokio::test]
    async fn test_usage_limit_enforced_after_commits() {
        let svc = service();
        let mut payload = new_coupon("ONCE", DiscountKind::Fixed, 100);
        payload.usage_limit = Some(1);
        let created = svc.create_coupon(payload).await.unwrap();

        assert!(svc.apply_coupon("ONCE", Decimal::new(500, 0)).await.success);
        assert!(svc.apply_coupon("ONCE", Decimal::new(500, 0)).await.success);
        svc.commit_usage(created.id).await.unwrap();
        let res = svc.apply_coupon("ONCE", Decimal::new(500, 0)).await;
        assert!(!res.success);
        assert_eq!(res.message, "Coupon usage limit reached.");
    }

    #[tokio::test]
    async fn test_expired_coupon() {
        let svc = service();
        let mut payload = new_coupon("OLD", DiscountKind::Fixed, 100);
        payload.expiry_date = Some(Utc::now() - Duration::days(1));
        svc.create_coupon(payload).await.unwrap();
        let res = svc.apply_coupon("old", Decimal::new(500, 0)).await;
        assert!(!res.success);
        assert!(res.message.contains("expired"));
    }

    #[tokio::test]
    async fn test_duplicate_and_invalid_creates() {
        let svc = service();
        svc.create_coupon(new_coupon("DUP", DiscountKind::Fixed, 10)).await.unwrap();
        let err = svc.create_coupon(new_coupon("dup", DiscountKind::Fixed, 10)).await.unwrap_err();
        assert!(matches!(err, StorefrontError::DuplicateCoupon(_)));
        let err = svc.create_coupon(new_coupon("NEG", DiscountKind::Fixed, -5)).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Validation(_)));
    }

    #[tokio::test]
    async fn test_backend_failure_is_generic_message() {
        let svc = CouponService::new(Arc::new(BrokenRepository));
        let res = svc.apply_coupon("SAVE", Decimal::new(500, 0)).await;
        assert!(!res.success);
        assert_eq!(res.message, APPLY_FAILED_MESSAGE);
        assert!(svc.commit_usage(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_unknown_coupon() {
        let err = service().commit_usage(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StorefrontError::CouponNotFound));
    }

    #[tokio::test]
    async fn test_huge_order_total() {
        let svc = service();
        svc.create_coupon(new_coupon("HALF", DiscountKind::Percentage, 50)).await.unwrap();
        let res = svc.apply_coupon("HALF", Decimal::MAX).await;
        assert!(res.success);
        assert!(res.discount_amount.unwrap() > Decimal::ZERO);

        let request = ApplyCouponRequest { coupon_code: "HALF".into(), total_amount: Decimal::MAX };
        assert!(request.validate().is_err());
        let request = ApplyCouponRequest { coupon_code: "HALF".into(), total_amount: Decimal::new(999, 0) };
        assert!(request.validate().is_ok());
    }
}
