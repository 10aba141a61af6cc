//! Catalog lookup used when putting products in the cart.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::CartProduct;
use crate::{Result, StorefrontError};

/// Display fields of a catalog product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default, alias = "inventory_quantity", alias = "inventoryQuantity")]
    pub stock: Option<u32>,
}

impl ProductSummary {
    pub fn into_cart_product(self, selected_options: Option<BTreeMap<String, String>>) -> CartProduct {
        CartProduct { product_id: self.id, name: self.name, unit_price: self.price, max_quantity: self.stock, selected_options }
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, product_id: &str) -> Result<Option<ProductSummary>>;
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: HashMap<String, ProductSummary>,
}

impl InMemoryCatalog {
    pub fn new(products: impl IntoIterator<Item = ProductSummary>) -> Self {
        Self { products: products.into_iter().map(|p| (p.id.clone(), p)).collect() }
    }

    /// Loads a JSON array of products.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StorefrontError::StorageError(format!("{}: {e}", path.display())))?;
        let products: Vec<ProductSummary> = serde_json::from_str(&raw)
            .map_err(|e| StorefrontError::StorageError(format!("{}: {e}", path.display())))?;
        tracing::info!(products = products.len(), path = %path.display(), "catalog loaded");
        Ok(Self::new(products))
    }

    pub fn len(&self) -> usize { self.products.len() }
    pub fn is_empty(&self) -> bool { self.products.is_empty() }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, product_id: &str) -> Result<Option<ProductSummary>> {
        Ok(self.products.get(product_id).cloned())
    }
}

/// Client for the product service's `GET /api/v1/products/:id`.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    fn product_url(&self, product_id: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| StorefrontError::Integration(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StorefrontError::Integration(format!("catalog url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "products", product_id]);
        Ok(url)
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn product(&self, product_id: &str) -> Result<Option<ProductSummary>> {
        let integration = |e: reqwest::Error| StorefrontError::Integration(e.to_string());
        let response = self.client.get(self.product_url(product_id)?).send().await.map_err(integration)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status().map_err(integration)?;
        response.json().await.map(Some).map_err(integration)
    }
}
