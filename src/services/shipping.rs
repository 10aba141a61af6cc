//! Shipping rate quotes.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    #[validate(length(min = 1))]
    pub origin: String,
    #[validate(length(min = 1))]
    pub destination: String,
    #[validate(range(min = 0.0))]
    pub weight_kg: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOption {
    pub carrier: String,
    pub service: String,
    pub rate: Decimal,
    pub estimated_days: String,
    #[serde(default)]
    pub fallback: bool,
}

#[async_trait]
pub trait ShippingRateProvider: Send + Sync {
    async fn rates(&self, request: &RateRequest) -> Result<Vec<ShippingOption>>;
}

/// Client for the shipping aggregator's rate endpoint.
#[derive(Debug, Clone)]
pub struct HttpRateProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpRateProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }
}

#[async_trait]
impl ShippingRateProvider for HttpRateProvider {
    async fn rates(&self, request: &RateRequest) -> Result<Vec<ShippingOption>> {
        let response = self.client.post(&self.url).json(request).send().await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StorefrontError::Integration(e.to_string()))?;
        response.json().await.map_err(|e| StorefrontError::Integration(e.to_string()))
    }
}

struct FallbackRate {
    service: &'static str,
    base: i64,
    per_kg: i64,
    days: &'static str,
}

const FALLBACK_RATES: [FallbackRate; 2] = [
    FallbackRate { service: "Standard", base: 50, per_kg: 20, days: "5-7" },
    FallbackRate { service: "Express", base: 100, per_kg: 40, days: "2-3" },
];

/// Static rate table used when the aggregator is unreachable or has nothing
/// to offer. Weight is rounded up to whole kilograms, minimum one.
pub fn fallback_rates(weight_kg: f64) -> Vec<ShippingOption> {
    let kg = Decimal::try_from(weight_kg).unwrap_or(Decimal::ONE).ceil().max(Decimal::ONE);
    FALLBACK_RATES
        .iter()
        .map(|r| ShippingOption {
            carrier: "Storefront".to_string(),
            service: r.service.to_string(),
            rate: Decimal::from(r.base) + Decimal::from(r.per_kg) * kg,
            estimated_days: r.days.to_string(),
            fallback: true,
        })
        .collect()
}

#[derive(Clone, Default)]
pub struct ShippingQuoter {
    provider: Option<Arc<dyn ShippingRateProvider>>,
}

impl std::fmt::Debug for ShippingQuoter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingQuoter").field("provider", &self.provider.is_some()).finish()
    }
}

impl ShippingQuoter {
    pub fn new(provider: Option<Arc<dyn ShippingRateProvider>>) -> Self { Self { provider } }

    /// Options sorted cheapest first. Never fails: provider errors fall back
    /// to the static table.
    pub async fn quote(&self, request: &RateRequest) -> Vec<ShippingOption> {
        let mut options = match &self.provider {
            Some(provider) => match provider.rates(request).await {
                Ok(options) if !options.is_empty() => options,
                Ok(_) => {
                    tracing::info!(destination = %request.destination, "no carrier options, using fallback rates");
                    fallback_rates(request.weight_kg)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "shipping rate lookup failed, using fallback rates");
                    fallback_rates(request.weight_kg)
                }
            },
            None => fallback_rates(request.weight_kg),
        };
        options.sort_by(|a, b| a.rate.cmp(&b.rate));
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Result<Vec<ShippingOption>>);

    #[async_trait]
    impl ShippingRateProvider for FixedProvider {
        async fn rates(&self, _: &RateRequest) -> Result<Vec<ShippingOption>> {
            match &self.0 {
                Ok(options) => Ok(options.clone()),
                Err(e) => Err(StorefrontError::Integration(e.to_string())),
            }
        }
    }

    fn option(carrier: &str, rate: i64) -> ShippingOption {
        ShippingOption { carrier: carrier.into(), service: "Surface".into(), rate: Decimal::new(rate, 0), estimated_days: "4".into(), fallback: false }
    }

    fn request(weight_kg: f64) -> RateRequest {
        RateRequest { origin: "110001".into(), destination: "560001".into(), weight_kg }
    }

    #[test]
    fn test_fallback_table_rounds_weight_up() {
        let rates = fallback_rates(1.2);
        assert_eq!(rates[0].rate, Decimal::new(90, 0));
        assert_eq!(rates[1].rate, Decimal::new(180, 0));
        assert_eq!(fallback_rates(0.0)[0].rate, Decimal::new(70, 0));
        assert!(rates.iter().all(|r| r.fallback));
    }

    #[tokio::test]
    async fn test_provider_options_sorted() {
        let quoter = ShippingQuoter::new(Some(Arc::new(FixedProvider(Ok(vec![option("Delhivery", 120), option("BlueDart", 80)])))));
        let options = quoter.quote(&request(1.0)).await;
        assert_eq!(options[0].carrier, "BlueDart");
        assert_eq!(options[1].carrier, "Delhivery");
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let quoter = ShippingQuoter::new(Some(Arc::new(FixedProvider(Err(StorefrontError::Integration("timeout".into()))))));
        let options = quoter.quote(&request(2.0)).await;
        assert_eq!(options.len(), 2);
        assert!(options.iter().all(|o| o.fallback));
    }

    #[tokio::test]
    async fn test_empty_answer_falls_back() {
        let quoter = ShippingQuoter::new(Some(Arc::new(FixedProvider(Ok(vec![])))));
        assert!(quoter.quote(&request(2.0)).await[0].fallback);
    }

    #[test]
    fn test_rate_request_validation() {
        assert!(request(-1.0).validate().is_err());
        assert!(request(0.5).validate().is_ok());
    }
}
