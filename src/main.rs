//! Storefront - cart, coupon and checkout service

use std::sync::Arc;

use anyhow::Result;
use storefront::config::AppConfig;
use storefront::http::{router, AppState};
use storefront::services::{CartSessions, Catalog, CheckoutService, CouponService, HttpCatalog, HttpRateProvider, InMemoryCatalog, InMemoryCouponRepository, InMemoryOrderBook, ShippingQuoter, ShippingRateProvider};

fn catalog(config: &AppConfig) -> Result<Arc<dyn Catalog>> {
    if let Some(url) = &config.catalog_api_url {
        tracing::info!(url = %url, "using product service catalog");
        return Ok(Arc::new(HttpCatalog::new(url.as_str())));
    }
    let catalog = match &config.catalog_file {
        Some(path) => InMemoryCatalog::from_file(path)?,
        None => InMemoryCatalog::default(),
    };
    if catalog.is_empty() {
        tracing::warn!("catalog is empty, set CATALOG_API_URL or STOREFRONT_CATALOG_FILE");
    } else {
        tracing::info!(products = catalog.len(), "using in-memory catalog");
    }
    Ok(Arc::new(catalog))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    storefront::telemetry::init_tracing();
    let config = AppConfig::from_env()?;

    let coupons = CouponService::new(Arc::new(InMemoryCouponRepository::new()));
    let provider = config.shipping_api_url.as_deref().map(|url| Arc::new(HttpRateProvider::new(url)) as Arc<dyn ShippingRateProvider>);
    if provider.is_none() {
        tracing::warn!("SHIPPING_API_URL not set, quoting from the fallback rate table");
    }
    let sessions = Arc::new(CartSessions::new(&config.data_dir, config.cart_settings()));
    let sweeper = sessions.clone().spawn_sweeper(config.session_idle);
    let state = AppState {
        sessions: sessions.clone(),
        catalog: catalog(&config)?,
        checkout: CheckoutService::new(Arc::new(InMemoryOrderBook::new()), coupons.clone(), &config.currency),
        coupons,
        shipping: ShippingQuoter::new(provider),
        shipping_origin: config.shipping_origin_pincode.clone(),
    };

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, currency = %config.currency, data_dir = %config.data_dir.display(), "storefront listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async { tokio::signal::ctrl_c().await.ok(); })
        .await?;

    sweeper.abort();
    sessions.flush_all().await;
    Ok(())
}
