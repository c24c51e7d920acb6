// Tour backend API: the transport contract used by the search core and its reqwest binding

use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::ClientConfig,
    types::{
        CountryLite, ErrorBody, GeoEntity, Hotel, HotelsMap, Price, PricesMap, PricesResponse,
        SearchTicket,
    },
};

// Failures at the transport boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("{}", describe_rejection(.status, .message))]
    Rejected {
        status: u16,
        message: Option<String>,
    },

    #[error("malformed response: {0}")]
    Malformed(String),
}

fn describe_rejection(status: &u16, message: &Option<String>) -> String {
    match message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => format!("request failed with status {}", status),
    }
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Malformed(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Everything the search core needs from the tour backend.
#[async_trait]
pub trait TourApi: Send + Sync + 'static {
    // Kick off a server-side price search for a country
    async fn start_search(&self, country_id: &str) -> Result<SearchTicket, ApiError>;

    // Fetch results for a running search; fails while the job isn't ready
    async fn search_results(&self, token: &str) -> Result<PricesMap, ApiError>;

    // Best-effort cancellation of a running search
    async fn stop_search(&self, token: &str) -> Result<(), ApiError>;

    async fn countries(&self) -> Result<BTreeMap<String, CountryLite>, ApiError>;

    async fn search_geo(&self, query: &str) -> Result<BTreeMap<String, GeoEntity>, ApiError>;

    async fn hotels(&self, country_id: &str) -> Result<HotelsMap, ApiError>;

    async fn price(&self, price_id: &str) -> Result<Price, ApiError>;

    async fn hotel(&self, hotel_id: &str) -> Result<Hotel, ApiError>;
}

// reqwest-backed implementation talking JSON over HTTP
#[derive(Debug, Clone)]
pub struct HttpTourApi {
    client: Client,
    base_url: String,
}

impl HttpTourApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if config.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.timeout_ms));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "tour api response");

        if status.is_success() {
            return Ok(response);
        }

        // Error bodies are optional; anything unreadable just loses the message
        let body = response.json::<ErrorBody>().await.unwrap_or_default();
        Err(ApiError::Rejected {
            status: status.as_u16(),
            message: body.message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

fn validate_prices<'a>(prices: impl IntoIterator<Item = &'a Price>) -> Result<(), ApiError> {
    prices
        .into_iter()
        .try_for_each(|price| price.validate().map_err(ApiError::Malformed))
}

#[async_trait]
impl TourApi for HttpTourApi {
    async fn start_search(&self, country_id: &str) -> Result<SearchTicket, ApiError> {
        let request = self
            .client
            .post(self.url("/prices/search"))
            .query(&[("countryID", country_id)]);
        self.fetch(request).await
    }

    async fn search_results(&self, token: &str) -> Result<PricesMap, ApiError> {
        let request = self
            .client
            .get(self.url("/prices/search"))
            .query(&[("token", token)]);
        let body: PricesResponse = self.fetch(request).await?;
        validate_prices(body.prices.values())?;
        Ok(body.prices)
    }

    async fn stop_search(&self, token: &str) -> Result<(), ApiError> {
        let request = self
            .client
            .delete(self.url("/prices/search"))
            .query(&[("token", token)]);
        self.send(request).await.map(|_| ())
    }

    async fn countries(&self) -> Result<BTreeMap<String, CountryLite>, ApiError> {
        self.fetch(self.client.get(self.url("/countries"))).await
    }

    async fn search_geo(&self, query: &str) -> Result<BTreeMap<String, GeoEntity>, ApiError> {
        let request = self.client.get(self.url("/geo")).query(&[("query", query)]);
        self.fetch(request).await
    }

    async fn hotels(&self, country_id: &str) -> Result<HotelsMap, ApiError> {
        let request = self
            .client
            .get(self.url("/hotels"))
            .query(&[("countryID", country_id)]);
        self.fetch(request).await
    }

    async fn price(&self, price_id: &str) -> Result<Price, ApiError> {
        let price: Price = self
            .fetch(self.client.get(self.url(&format!("/prices/{}", price_id))))
            .await?;
        validate_prices([&price])?;
        Ok(price)
    }

    async fn hotel(&self, hotel_id: &str) -> Result<Hotel, ApiError> {
        self.fetch(self.client.get(self.url(&format!("/hotels/{}", hotel_id))))
            .await
    }
}
