//! Environment configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::aggregates::QuantityPolicy;
use crate::services::CartSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub currency: String,
    pub data_dir: PathBuf,
    pub persist_debounce: Duration,
    pub enforce_max_quantity: bool,
    pub shipping_api_url: Option<String>,
    pub shipping_origin_pincode: Option<String>,
    pub catalog_api_url: Option<String>,
    pub catalog_file: Option<PathBuf>,
    pub session_idle: Duration,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Ok(Self {
            port: parse(&var, "PORT", 8083)?,
            currency: var("STOREFRONT_CURRENCY").unwrap_or_else(|| "INR".to_string()).to_uppercase(),
            data_dir: var("STOREFRONT_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./data")),
            persist_debounce: Duration::from_millis(parse(&var, "CART_PERSIST_DEBOUNCE_MS", 300)?),
            enforce_max_quantity: parse(&var, "CART_ENFORCE_MAX_QUANTITY", false)?,
            shipping_api_url: var("SHIPPING_API_URL"),
            shipping_origin_pincode: var("SHIPPING_ORIGIN_PINCODE"),
            catalog_api_url: var("CATALOG_API_URL"),
            catalog_file: var("STOREFRONT_CATALOG_FILE").map(PathBuf::from),
            session_idle: Duration::from_secs(parse(&var, "CART_SESSION_IDLE_SECS", 1800)?),
        })
    }

    pub fn cart_settings(&self) -> CartSettings {
        CartSettings {
            currency: self.currency.clone(),
            policy: if self.enforce_max_quantity { QuantityPolicy::Enforced } else { QuantityPolicy::Advisory },
            persist_debounce: self.persist_debounce,
        }
    }
}

fn parse<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}
