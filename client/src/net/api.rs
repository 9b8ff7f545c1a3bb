//! HTTP client for the bootstrap endpoints.
//!
//! Items, identities and a server timestamp are fetched once at startup,
//! before or alongside the websocket. Parsing is split into pure functions so
//! the envelope rules are testable without a server.
//!
//! ERROR HANDLING
//! ==============
//! Every call returns `Result<_, ApiError>`. The caller decides what a
//! failure means; the sync controller logs it and continues with whatever
//! other calls succeeded.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use events::{AuctionItem, User};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Per-request timeout for bootstrap calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GET {path} returned {status}: {body}")]
    Status { path: String, status: u16, body: String },
    #[error("GET {path} returned an unexpected body: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

// =============================================================================
// CLIENT
// =============================================================================

/// Bootstrap API client. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Build a client rooted at `base_url` (e.g. `http://localhost:3001`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_owned(), http })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /api/items`. An absent or null `data` yields an empty list.
    ///
    /// # Errors
    ///
    /// Transport, status and body errors.
    pub async fn fetch_items(&self) -> Result<Vec<AuctionItem>, ApiError> {
        let body = self.get_text("/api/items").await?;
        parse_list("/api/items", &body)
    }

    /// `GET /api/items/{id}`. A 404 yields `None`.
    ///
    /// # Errors
    ///
    /// Transport, non-404 status and body errors.
    pub async fn fetch_item(&self, item_id: &str) -> Result<Option<AuctionItem>, ApiError> {
        let path = format!("/api/items/{item_id}");
        match self.get_text(&path).await {
            Ok(body) => parse_data(&path, &body),
            Err(ApiError::Status { status: 404, .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// `GET /api/users`. An absent or null `data` yields an empty list.
    ///
    /// # Errors
    ///
    /// Transport, status and body errors.
    pub async fn fetch_users(&self) -> Result<Vec<User>, ApiError> {
        let body = self.get_text("/api/users").await?;
        parse_list("/api/users", &body)
    }

    /// `GET /api/time`, returning the server's epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Transport, status and body errors.
    pub async fn fetch_server_time(&self) -> Result<i64, ApiError> {
        let body = self.get_text("/api/time").await?;
        parse_server_time("/api/time", &body)
    }

    async fn get_text(&self, path: &str) -> Result<String, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(%url, status, "bootstrap fetch");
        if !(200..300).contains(&status) {
            return Err(ApiError::Status { path: path.to_owned(), status, body });
        }
        Ok(body)
    }
}

// =============================================================================
// PARSING
// =============================================================================

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTimeBody {
    server_time: serde_json::Number,
}

fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode { path: path.to_owned(), source })
}

fn parse_data<T: DeserializeOwned>(path: &str, body: &str) -> Result<Option<T>, ApiError> {
    Ok(decode::<DataEnvelope<T>>(path, body)?.data)
}

fn parse_list<T: DeserializeOwned>(path: &str, body: &str) -> Result<Vec<T>, ApiError> {
    Ok(parse_data::<Vec<T>>(path, body)?.unwrap_or_default())
}

fn parse_server_time(path: &str, body: &str) -> Result<i64, ApiError> {
    let parsed: ServerTimeBody = decode(path, body)?;
    let number = parsed.server_time;
    #[allow(clippy::cast_possible_truncation)]
    let integral = number
        .as_i64()
        .or_else(|| number.as_f64().filter(|value| value.fract() == 0.0).map(|value| value as i64));
    integral.ok_or_else(|| ApiError::Decode {
        path: path.to_owned(),
        source: serde::de::Error::custom(format!("serverTime is not an integer: {number}")),
    })
}
