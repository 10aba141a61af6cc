//! HTTP surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::{Path, State}, http::StatusCode, routing::{delete, get, patch, post}, Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{AppliedCoupon, Cart, CartLineItem, Coupon, NewCoupon, Order};
use crate::domain::value_objects::Money;
use crate::services::catalog::Catalog;
use crate::services::checkout::{CheckoutDetails, CheckoutReceipt, CheckoutService};
use crate::services::coupons::{ApplyCouponRequest, ApplyCouponResponse, CouponService};
use crate::services::sessions::{CartSessions, SharedCart};
use crate::services::shipping::{RateRequest, ShippingOption, ShippingQuoter};
use crate::StorefrontError;

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<CartSessions>,
    pub catalog: Arc<dyn Catalog>,
    pub coupons: CouponService,
    pub shipping: ShippingQuoter,
    pub checkout: CheckoutService,
    pub shipping_origin: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }))
        .route("/api/v1/coupons", get(list_coupons).post(create_coupon))
        .route("/api/v1/coupons/apply", post(apply_coupon))
        .route("/api/v1/coupons/:id", delete(deactivate_coupon))
        .route("/api/v1/coupons/:id/use", post(commit_coupon_usage))
        .route("/api/v1/shipping/rates", post(shipping_rates))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/cart/:session", get(get_cart).delete(clear_cart))
        .route("/api/v1/cart/:session/items", post(add_to_cart))
        .route("/api/v1/cart/:session/items/:product_id", patch(update_cart_item).delete(remove_cart_item))
        .route("/api/v1/cart/:session/coupon", post(redeem_coupon).delete(remove_coupon))
        .route("/api/v1/cart/:session/checkout", post(checkout))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}

fn api_error(e: StorefrontError) -> ApiError {
    let status = match &e {
        StorefrontError::CouponNotFound | StorefrontError::OrderNotFound | StorefrontError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        StorefrontError::DuplicateCoupon(_) => StatusCode::CONFLICT,
        StorefrontError::EmptyCart | StorefrontError::InvalidSession(_) | StorefrontError::InvalidCode(_) | StorefrontError::Validation(_) => StatusCode::BAD_REQUEST,
        StorefrontError::CouponRejected(_) | StorefrontError::Order(_) | StorefrontError::Cart(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StorefrontError::Integration(_) => StatusCode::BAD_GATEWAY,
        StorefrontError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    }
    (status, e.to_string())
}

fn validated<T: Validate>(payload: T) -> Result<T, ApiError> {
    payload.validate().map_err(|e| api_error(e.into()))?;
    Ok(payload)
}

// =============================================================================
// Coupons
// =============================================================================

async fn list_coupons(State(s): State<AppState>) -> Result<Json<Vec<Coupon>>, ApiError> {
    Ok(Json(s.coupons.list_coupons().await.map_err(api_error)?))
}

async fn create_coupon(State(s): State<AppState>, Json(r): Json<NewCoupon>) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let coupon = s.coupons.create_coupon(r).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn deactivate_coupon(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Coupon>, ApiError> {
    Ok(Json(s.coupons.deactivate_coupon(id).await.map_err(api_error)?))
}

async fn apply_coupon(State(s): State<AppState>, Json(r): Json<ApplyCouponRequest>) -> Result<Json<ApplyCouponResponse>, ApiError> {
    let r = validated(r)?;
    Ok(Json(s.coupons.apply_coupon(&r.coupon_code, r.total_amount).await))
}

async fn commit_coupon_usage(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Coupon>, ApiError> {
    Ok(Json(s.coupons.commit_usage(id).await.map_err(api_error)?))
}

// =============================================================================
// Shipping and orders
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRatesRequest { pub origin: Option<String>, pub destination: String, pub weight_kg: f64 }

async fn shipping_rates(State(s): State<AppState>, Json(r): Json<ShippingRatesRequest>) -> Result<Json<Vec<ShippingOption>>, ApiError> {
    let origin = r.origin.or(s.shipping_origin).unwrap_or_default();
    let request = validated(RateRequest { origin, destination: r.destination, weight_kg: r.weight_kg })?;
    Ok(Json(s.shipping.quote(&request).await))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.checkout.get_order(&id).await.map_err(api_error)?))
}

// =============================================================================
// Session carts
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartLineItem>,
    pub applied_coupon: Option<AppliedCoupon>,
    pub total_items: u64,
    pub total_price: Money,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self { items: cart.items().to_vec(), applied_coupon: cart.applied_coupon().cloned(), total_items: cart.total_items(), total_price: cart.total_price() }
    }
}

fn default_quantity() -> u32 { 1 }

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    #[validate(length(min = 1, max = 64))]
    pub product_id: String,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 10000))]
    pub quantity: u32,
    pub selected_options: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(max = 10000))]
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemCouponRequest { pub code: String }

async fn open_cart(s: &AppState, session: &str) -> Result<SharedCart, ApiError> {
    s.sessions.open(session).await.map_err(api_error)
}

async fn get_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartView>, ApiError> {
    let cart = open_cart(&s, &session).await?;
    let store = cart.lock().await;
    Ok(Json(CartView::from(store.cart())))
}

async fn add_to_cart(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<AddItemRequest>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let r = validated(r)?;
    let cart = open_cart(&s, &session).await?;
    let mut store = cart.lock().await;
    store.add_product(s.catalog.as_ref(), &r.product_id, r.quantity, r.selected_options).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(CartView::from(store.cart()))))
}

async fn update_cart_item(State(s): State<AppState>, Path((session, product_id)): Path<(String, String)>, Json(r): Json<UpdateQuantityRequest>) -> Result<Json<CartView>, ApiError> {
    let r = validated(r)?;
    let cart = open_cart(&s, &session).await?;
    let mut store = cart.lock().await;
    store.update_quantity(&product_id, r.quantity).map_err(api_error)?;
    Ok(Json(CartView::from(store.cart())))
}

async fn remove_cart_item(State(s): State<AppState>, Path((session, product_id)): Path<(String, String)>) -> Result<Json<CartView>, ApiError> {
    let cart = open_cart(&s, &session).await?;
    let mut store = cart.lock().await;
    store.remove_item(&product_id);
    Ok(Json(CartView::from(store.cart())))
}

async fn clear_cart(State(s): State<AppState>, Path(session): Path<String>) -> Result<StatusCode, ApiError> {
    let cart = open_cart(&s, &session).await?;
    cart.lock().await.clear_cart();
    drop(cart);
    s.sessions.close(&session).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn redeem_coupon(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<RedeemCouponRequest>) -> Result<Json<ApplyCouponResponse>, ApiError> {
    let cart = open_cart(&s, &session).await?;
    let mut store = cart.lock().await;
    Ok(Json(store.redeem_coupon(&s.coupons, &r.code).await))
}

async fn remove_coupon(State(s): State<AppState>, Path(session): Path<String>) -> Result<Json<CartView>, ApiError> {
    let cart = open_cart(&s, &session).await?;
    let mut store = cart.lock().await;
    store.remove_coupon();
    Ok(Json(CartView::from(store.cart())))
}

async fn checkout(State(s): State<AppState>, Path(session): Path<String>, Json(r): Json<CheckoutDetails>) -> Result<(StatusCode, Json<CheckoutReceipt>), ApiError> {
    let cart = open_cart(&s, &session).await?;
    let receipt = cart.lock().await.checkout(&s.checkout, r).await.map_err(api_error)?;
    drop(cart);
    s.sessions.close(&session).await;
    Ok((StatusCode::CREATED, Json(receipt)))
}
