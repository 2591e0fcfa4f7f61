//! OpenFoodFacts API client
//!
//! Implements [`CatalogService`] with the product-by-code endpoint and the
//! legacy search endpoint. Requests are rate limited to stay inside the
//! public API quota.

use crate::types::{CatalogError, CatalogRecord, CatalogService};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use prodscan_common::config::CatalogConfig;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default)]
    status: i64,
    product: Option<OffProduct>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<OffProduct>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OffProduct {
    code: Option<String>,
    product_name: Option<String>,
    image_url: Option<String>,
    image_front_url: Option<String>,
    url: Option<String>,
}

/// OpenFoodFacts client
pub struct OpenFoodFactsClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    product_url: String,
    search_url: String,
}

impl OpenFoodFactsClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            product_url: config.product_url.trim_end_matches('/').to_string(),
            search_url: config.search_url.clone(),
        })
    }

    /// Map a catalog product to a record, treating blank strings as absent
    fn to_record(&self, product: OffProduct) -> CatalogRecord {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let link = present(product.url).or_else(|| {
            present(product.code).map(|code| format!("{}/{}", self.product_url, code))
        });

        CatalogRecord {
            title: present(product.product_name),
            image_url: present(product.image_url).or_else(|| present(product.image_front_url)),
            link,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, CatalogError> {
        self.rate_limiter.until_ready().await;

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| CatalogError::ParseError(e.to_string()))
    }
}

#[async_trait::async_trait]
impl CatalogService for OpenFoodFactsClient {
    async fn get_by_code(&self, code: &str) -> Result<Option<CatalogRecord>, CatalogError> {
        let url = format!("{}/{}.json", self.product_url, code);
        tracing::debug!(code = %code, "Looking up product by code");

        let response: Option<ProductResponse> = self.get_json(self.http_client.get(&url)).await?;

        Ok(response
            .filter(|r| r.status == 1)
            .and_then(|r| r.product)
            .map(|product| self.to_record(product)))
    }

    async fn search_by_term(&self, term: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
        tracing::debug!(term = %term, "Searching catalog");

        let request = self.http_client.get(&self.search_url).query(&[
            ("search_terms", term),
            ("search_simple", "1"),
            ("action", "process"),
            ("json", "1"),
        ]);

        let response: Option<SearchResponse> = self.get_json(request).await?;

        Ok(response
            .map(|r| r.products)
            .unwrap_or_default()
            .into_iter()
            .map(|product| self.to_record(product))
            .collect())
    }
}
