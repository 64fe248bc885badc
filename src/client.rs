//! Blocking HTTP clients for the ledger write API and the feed API.
//!
//! The pipeline is a single linear batch run, so both clients are
//! synchronous `reqwest::blocking` wrappers built through builders with
//! a base-url override for testing.

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::export::LedgerWriter;
use crate::models::{
    AccountCreateRequest, AccountKind, AccountPayload, FireflyId, TransactionRequest,
};

/// Default base URL for the Akahu API.
const AKAHU_BASE_URL: &str = "https://api.akahu.io";

/// Builder for constructing a [`FireflyClient`].
#[derive(Debug, Default)]
pub struct FireflyClientBuilder {
    /// Base path of the Firefly III instance.
    base_url: Option<String>,
    /// Personal access token.
    token: Option<String>,
}

impl FireflyClientBuilder {
    /// Sets the base path of the Firefly III instance.
    #[inline]
    #[must_use]
    pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the personal access token used as a bearer token.
    #[inline]
    #[must_use]
    pub fn token<T: Into<String>>(mut self, token: T) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when the base path or token is
    /// missing, and [`SyncError::Http`] when the HTTP client fails to
    /// build.
    pub fn build(self) -> Result<FireflyClient> {
        let base_url = self.base_url.ok_or(SyncError::Config {
            name: "FIREFLY_BASE_PATH",
        })?;
        let token = self.token.ok_or(SyncError::Config {
            name: "FIREFLY_API_KEY",
        })?;
        tracing::debug!(base_url = %base_url, "building firefly client");
        let http = Client::builder().build()?;
        Ok(FireflyClient {
            http,
            token,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

/// Client for the Firefly III write API.
///
/// Use [`FireflyClient::builder()`] to construct an instance.
#[derive(Debug)]
pub struct FireflyClient {
    /// Underlying HTTP client.
    http: Client,
    /// Bearer access token.
    token: String,
    /// API base URL, without a trailing slash.
    base_url: String,
}

impl FireflyClient {
    /// Creates a new builder for configuring the client.
    #[inline]
    #[must_use]
    pub fn builder() -> FireflyClientBuilder {
        FireflyClientBuilder::default()
    }

    /// Sends an authenticated JSON request, discarding the response
    /// body on success.
    #[tracing::instrument(skip_all, fields(path = %path))]
    fn send_json<Req: serde::Serialize>(
        &self,
        method: reqwest::Method,
        path: &str,
        request: &Req,
    ) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        tracing::trace!(url = %url, "sending request");
        let response = self
            .http
            .request(method, &url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(request)
            .send()?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");
        if status.is_success() {
            Ok(())
        } else {
            let message = response
                .text()
                .unwrap_or_else(|_| "unknown error".to_owned());
            Err(SyncError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

impl LedgerWriter for FireflyClient {
    fn create_account(&self, kind: AccountKind, payload: &AccountPayload) -> Result<()> {
        let request = AccountCreateRequest {
            payload,
            kind: kind.as_api_type(),
        };
        self.send_json(reqwest::Method::POST, "/api/v1/accounts", &request)
    }

    fn update_account(&self, external_id: FireflyId, payload: &AccountPayload) -> Result<()> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/api/v1/accounts/{external_id}"),
            payload,
        )
    }

    fn create_transaction(&self, request: &TransactionRequest) -> Result<()> {
        self.send_json(reqwest::Method::POST, "/api/v1/transactions", request)
    }

    fn update_transaction(
        &self,
        external_id: FireflyId,
        request: &TransactionRequest,
    ) -> Result<()> {
        self.send_json(
            reqwest::Method::PUT,
            &format!("/api/v1/transactions/{external_id}"),
            request,
        )
    }
}

/// Builder for constructing an [`AkahuClient`].
#[derive(Debug, Default)]
pub struct AkahuClientBuilder {
    /// Application token.
    app_token: Option<String>,
    /// User token.
    user_token: Option<String>,
    /// Base URL override (for testing).
    base_url: Option<String>,
}

impl AkahuClientBuilder {
    /// Sets the application token.
    #[inline]
    #[must_use]
    pub fn app_token<T: Into<String>>(mut self, token: T) -> Self {
        self.app_token = Some(token.into());
        self
    }

    /// Sets the user token.
    #[inline]
    #[must_use]
    pub fn user_token<T: Into<String>>(mut self, token: T) -> Self {
        self.user_token = Some(token.into());
        self
    }

    /// Overrides the base URL (useful for testing with a mock server).
    #[inline]
    #[must_use]
    pub fn base_url<T: Into<String>>(mut self, url: T) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when a token is missing, and
    /// [`SyncError::Http`] when the HTTP client fails to build.
    pub fn build(self) -> Result<AkahuClient> {
        let app_token = self.app_token.ok_or(SyncError::Config {
            name: "AKAHU_APP_TOKEN",
        })?;
        let user_token = self.user_token.ok_or(SyncError::Config {
            name: "AKAHU_USER_TOKEN",
        })?;
        let base_url = self.base_url.unwrap_or_else(|| AKAHU_BASE_URL.to_owned());
        let http = Client::builder().build()?;
        Ok(AkahuClient {
            http,
            app_token,
            user_token,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

/// One page of an Akahu list endpoint.
#[derive(Debug, Deserialize)]
struct Page {
    /// Raw items; kept opaque so the cache stores them verbatim.
    items: Vec<serde_json::Value>,
    /// Pagination cursor.
    #[serde(default)]
    cursor: Option<Cursor>,
}

/// Pagination cursor of an Akahu list endpoint.
#[derive(Debug, Deserialize)]
struct Cursor {
    /// Opaque token of the next page, absent on the last page.
    #[serde(default)]
    next: Option<String>,
}

/// Client for the Akahu feed API, used to refresh the local cache.
///
/// Use [`AkahuClient::builder()`] to construct an instance.
#[derive(Debug)]
pub struct AkahuClient {
    /// Underlying HTTP client.
    http: Client,
    /// Application token sent in the `X-Akahu-App-Token` header.
    app_token: String,
    /// User token sent as the bearer token.
    user_token: String,
    /// API base URL, without a trailing slash.
    base_url: String,
}

impl AkahuClient {
    /// Creates a new builder for configuring the client.
    #[inline]
    #[must_use]
    pub fn builder() -> AkahuClientBuilder {
        AkahuClientBuilder::default()
    }

    /// Fetches all accounts as raw JSON records.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails or the response cannot
    /// be decoded.
    #[tracing::instrument(skip_all)]
    pub fn accounts(&self) -> Result<Vec<serde_json::Value>> {
        Ok(self.fetch_page("/v1/accounts", None)?.items)
    }

    /// Fetches all transactions as raw JSON records, following the
    /// pagination cursor to the end.
    ///
    /// # Errors
    ///
    /// Returns an error when a request fails or a response cannot be
    /// decoded.
    #[tracing::instrument(skip_all)]
    pub fn transactions(&self) -> Result<Vec<serde_json::Value>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.fetch_page("/v1/transactions", cursor.as_deref())?;
            items.extend(page.items);
            cursor = page.cursor.and_then(|cursor| cursor.next);
            if cursor.is_none() {
                break;
            }
            tracing::debug!(fetched = items.len(), "following transaction cursor");
        }
        Ok(items)
    }

    /// Fetches one page of a list endpoint.
    fn fetch_page(&self, path: &str, cursor: Option<&str>) -> Result<Page> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.user_token))
            .header("X-Akahu-App-Token", &self.app_token);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "unknown error".to_owned());
            return Err(SyncError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.text()?;
        serde_json::from_str(&body).map_err(SyncError::from)
    }
}
