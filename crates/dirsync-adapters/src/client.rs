//! HTTP client shared by the directory adapters.
//!
//! [`ApiClient`] owns the request timeout and the client-side rate ceiling,
//! walks paginated list endpoints and classifies every response the same
//! way:
//!
//! | Response | Result |
//! |---|---|
//! | 2xx with a list body | `Ok(items)` |
//! | 2xx/3xx with any other body | [`ApiError::RetryLater`] |
//! | 4xx | [`ApiError::Client`] with the parsed or raw body |
//! | 5xx | [`ApiError::RetryLater`] |
//! | transport failure | [`ApiError::Transport`] |

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dirsync_core::SyncFailure;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::{HeaderMap, LINK};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

/// Settings for an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Overall timeout of a single request (default: 30 seconds).
    pub request_timeout: Duration,
    /// Minimum spacing between two requests of the same client
    /// (default: 1 second). Zero disables throttling.
    pub min_request_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            min_request_interval: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the minimum spacing between requests.
    #[must_use]
    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }
}

/// Errors returned by [`ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The remote side failed or answered with something we cannot use.
    #[error("Remote API unavailable, retry later: {reason}")]
    RetryLater { reason: String },

    /// The remote side rejected the request.
    #[error("Remote API rejected the request with {status}: {body}")]
    Client { status: StatusCode, body: ErrorBody },

    /// DNS, connect, TLS or timeout failure.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider's adapter settings are unusable.
    #[error("Invalid adapter configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    pub fn retry_later(reason: impl Into<String>) -> Self {
        Self::RetryLater {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Returns `true` if waiting for the next tick may fix the error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RetryLater { .. } | Self::Transport(_))
    }

    /// Returns `true` for errors that need a configuration or credential fix.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. } | Self::InvalidConfig(_))
    }
}

impl From<ApiError> for SyncFailure {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        match &err {
            ApiError::RetryLater { .. } => SyncFailure::transient("retry_later", message),
            ApiError::Transport(_) => SyncFailure::transient("transport", message),
            ApiError::Client { status, .. } => {
                let reason = match *status {
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "invalid_credentials",
                    StatusCode::NOT_FOUND => "not_found",
                    _ => "client_error",
                };
                SyncFailure::client(reason, message)
            }
            ApiError::InvalidConfig(_) => SyncFailure::client("invalid_config", message),
        }
    }
}

/// Body of a rejected request.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Json(Value),
    Text(String),
}

impl ErrorBody {
    /// Parses `raw` as JSON, keeping it verbatim otherwise.
    #[must_use]
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Request credentials.
#[derive(Clone)]
pub enum Auth {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// A static key in a custom header.
    ApiKey { header: &'static str, value: String },
}

impl Auth {
    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Bearer(token) => request.bearer_auth(token),
            Self::ApiKey { header, value } => request.header(*header, value),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(****)"),
            Self::ApiKey { header, .. } => write!(f, "ApiKey({header}: ****)"),
        }
    }
}

/// Where the items of a page live in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Items {
    /// The body itself is the array.
    Root,
    /// The array is under this field.
    Field(&'static str),
    /// The array is under this field, which is omitted when empty.
    OptionalField(&'static str),
}

/// How a list endpoint points at its next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Single page.
    None,
    /// `Link: <url>; rel="next"` response header.
    LinkHeader,
    /// A cursor in the body, sent back as a query parameter.
    BodyToken {
        field: &'static str,
        param: &'static str,
    },
    /// The absolute next URL in the body.
    BodyUrl { field: &'static str },
    /// Offset paging; a short page is the last one.
    Offset {
        skip_param: &'static str,
        limit_param: &'static str,
        page_size: usize,
    },
}

/// A paginated list endpoint.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub url: Url,
    pub items: Items,
    pub pagination: Pagination,
}

impl ListRequest {
    #[must_use]
    pub fn new(url: Url, items: Items, pagination: Pagination) -> Self {
        Self {
            url,
            items,
            pagination,
        }
    }

    fn first_page(&self) -> Url {
        match self.pagination {
            Pagination::Offset {
                skip_param,
                limit_param,
                page_size,
            } => with_offset(&self.url, skip_param, limit_param, 0, page_size),
            _ => self.url.clone(),
        }
    }
}

struct Page {
    headers: HeaderMap,
    body: Value,
}

/// Throttled, paginating HTTP client.
///
/// Clones share the same throttle.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    throttle: Option<Arc<DefaultDirectRateLimiter>>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("throttled", &self.throttle.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::invalid_config(format!("Failed to create HTTP client: {e}")))?;

        let throttle = Quota::with_period(config.min_request_interval)
            .map(|quota| Arc::new(RateLimiter::direct(quota)));

        Ok(Self { http, throttle })
    }

    /// Fetches every page of `request` and returns the items in page order.
    #[instrument(skip(self, auth, request), fields(url = %request.url))]
    pub async fn list<T: DeserializeOwned>(
        &self,
        auth: &Auth,
        request: &ListRequest,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut url = request.first_page();
        let mut visited = HashSet::new();

        loop {
            // A cursor that points back at a fetched page would never end
            if !visited.insert(url.clone()) {
                warn!(%url, pages = visited.len(), "Pagination cycle detected");
                return Err(ApiError::retry_later(format!(
                    "Pagination cycle: {url} was already fetched"
                )));
            }
            let page = self.get(auth, &url).await?;

            let next = next_page(request, &url, &page)?;
            let values = extract_items(page.body, request.items)?;
            let page_len = values.len();

            for value in values {
                let item = serde_json::from_value(value)
                    .map_err(|e| ApiError::retry_later(format!("Malformed list item: {e}")))?;
                items.push(item);
            }

            url = match (next, request.pagination) {
                (Some(_), Pagination::Offset { page_size, .. }) if page_len < page_size => break,
                (Some(next), _) => next,
                (None, _) => break,
            };
        }

        debug!(pages = visited.len(), items = items.len(), "Fetched list");
        Ok(items)
    }

    async fn get(&self, auth: &Auth, url: &Url) -> Result<Page, ApiError> {
        if let Some(throttle) = &self.throttle {
            throttle.until_ready().await;
        }

        let response = auth
            .apply(self.http.get(url.clone()))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        classify_response(response).await
    }
}

/// Maps a response onto the shared classification.
async fn classify_response(response: Response) -> Result<Page, ApiError> {
    let status = response.status();
    let headers = response.headers().clone();
    let raw = response.text().await?;

    if status.is_client_error() {
        return Err(ApiError::Client {
            status,
            body: ErrorBody::parse(raw),
        });
    }
    if status.is_server_error() {
        return Err(ApiError::retry_later(format!("Server responded with {status}")));
    }
    if !(status.is_success() || status.is_redirection()) {
        return Err(ApiError::retry_later(format!("Unexpected status {status}")));
    }

    let body = serde_json::from_str(&raw)
        .map_err(|e| ApiError::retry_later(format!("Malformed response body: {e}")))?;

    Ok(Page { headers, body })
}

fn extract_items(body: Value, items: Items) -> Result<Vec<Value>, ApiError> {
    let list = match (body, items) {
        (Value::Array(list), Items::Root) => list,
        (Value::Object(mut object), Items::Field(field) | Items::OptionalField(field)) => {
            match object.remove(field) {
                Some(Value::Array(list)) => list,
                None if matches!(items, Items::OptionalField(_)) => Vec::new(),
                _ => {
                    return Err(ApiError::retry_later(format!(
                        "Response has no list under `{field}`"
                    )));
                }
            }
        }
        _ => return Err(ApiError::retry_later("Response body is not a list")),
    };
    Ok(list)
}

fn next_page(request: &ListRequest, current: &Url, page: &Page) -> Result<Option<Url>, ApiError> {
    match request.pagination {
        Pagination::None => Ok(None),
        Pagination::LinkHeader => Ok(next_link(&page.headers)),
        Pagination::BodyToken { field, param } => {
            let Some(token) = page.body.get(field).and_then(Value::as_str) else {
                return Ok(None);
            };
            if token.is_empty() {
                return Ok(None);
            }
            let mut next = request.url.clone();
            next.query_pairs_mut().append_pair(param, token);
            Ok(Some(next))
        }
        Pagination::BodyUrl { field } => match page.body.get(field).and_then(Value::as_str) {
            Some(link) => Url::parse(link)
                .map(Some)
                .map_err(|e| ApiError::retry_later(format!("Malformed next link: {e}"))),
            None => Ok(None),
        },
        Pagination::Offset {
            skip_param,
            limit_param,
            page_size,
        } => {
            let skip = current
                .query_pairs()
                .find(|(key, _)| key == skip_param)
                .and_then(|(_, value)| value.parse::<usize>().ok())
                .unwrap_or(0);
            Ok(Some(with_offset(
                &request.url,
                skip_param,
                limit_param,
                skip + page_size,
                page_size,
            )))
        }
    }
}

fn with_offset(base: &Url, skip_param: &str, limit_param: &str, skip: usize, limit: usize) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair(limit_param, &limit.to_string())
        .append_pair(skip_param, &skip.to_string());
    url
}

/// Returns the `rel="next"` target of the `Link` headers, if any.
pub fn next_link(headers: &HeaderMap) -> Option<Url> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(link_entries)
        .find_map(|entry| {
            let mut parts = entry.split(';');
            let target = parts.next()?.trim();
            let is_next = parts.any(|param| {
                let param = param.trim().replace(' ', "");
                param == "rel=\"next\"" || param == "rel=next"
            });
            if !is_next {
                return None;
            }
            let target = target.strip_prefix('<')?.strip_suffix('>')?;
            Url::parse(target).ok()
        })
}

/// Splits a `Link` header value on the commas that separate entries.
///
/// Commas inside `<...>` belong to the target URL.
fn link_entries(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut in_target = false;
    for (i, c) in value.char_indices() {
        match c {
            '<' => in_target = true,
            '>' => in_target = false,
            ',' if !in_target => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);
    entries
}

/// Joins an API base URL and an absolute endpoint path.
///
/// # Errors
///
/// Returns [`ApiError::InvalidConfig`] if the result is not a valid URL.
pub fn endpoint(base: &str, path: &str) -> Result<Url, ApiError> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse(&raw).map_err(|e| ApiError::invalid_config(format!("Invalid API URL {raw}: {e}")))
}
