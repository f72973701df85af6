use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::{Member, Subscription, Transaction};
use crate::Result;

/// Responses are cached for five minutes, matching how often list data
/// realistically changes on a membership site.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API credentials are not configured")]
    Configuration,

    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Base URL and API key for a MemberPress site
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.base_url.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

/// Raw API response plus the pagination headers WordPress sends alongside
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub data: serde_json::Value,
    pub total_pages: u32,
    pub total_items: u64,
}

/// A typed page of list results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: u32,
    pub total_items: u64,
}

struct CacheEntry {
    response: ApiResponse,
    stored_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.stored_at) < ttl
    }
}

/// Client for the MemberPress REST API (`/wp-json/mp/v1`).
///
/// GET responses are cached in memory keyed by endpoint + query string;
/// stale entries are evicted lazily on the next lookup. Mutating calls
/// bypass the cache entirely.
pub struct MemberPressClient {
    http: reqwest::Client,
    credentials: Credentials,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
}

impl MemberPressClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            cache: Mutex::new(HashMap::new()),
            cache_ttl: CACHE_TTL,
        }
    }

    #[cfg(test)]
    fn with_cache_ttl(credentials: Credentials, ttl: Duration) -> Self {
        let mut client = Self::new(credentials);
        client.cache_ttl = ttl;
        client
    }

    /// Generic GET with optional caching.
    ///
    /// Fails with `ApiError::Configuration` before any network I/O when
    /// credentials are missing. Non-2xx responses carry the body text so
    /// the caller can surface whatever WordPress had to say.
    pub async fn request(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        use_cache: bool,
    ) -> Result<ApiResponse> {
        self.execute(Method::GET, endpoint, params, use_cache).await
    }

    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        use_cache: bool,
    ) -> Result<ApiResponse> {
        if !self.credentials.is_complete() {
            return Err(ApiError::Configuration);
        }

        let cache_key = format!("{endpoint}-{params:?}");
        if use_cache {
            if let Some(cached) = self.cache_lookup(&cache_key) {
                debug!("Cache hit for {}", endpoint);
                return Ok(cached);
            }
        }

        let url = build_url(&self.credentials.base_url, endpoint);
        debug!("{} {}", method, url);

        let response = self
            .http
            .request(method, &url)
            .header("MEMBERPRESS-API-KEY", &self.credentials.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Api { status, body });
        }

        let (total_pages, total_items) = parse_pagination(response.headers());
        let data: serde_json::Value = response.json().await?;

        let result = ApiResponse {
            data,
            total_pages,
            total_items,
        };

        if use_cache {
            let mut cache = self.lock_cache();
            cache.insert(
                cache_key,
                CacheEntry {
                    response: result.clone(),
                    stored_at: Instant::now(),
                },
            );
        }

        Ok(result)
    }

    fn cache_lookup(&self, key: &str) -> Option<ApiResponse> {
        let mut cache = self.lock_cache();
        let fresh = cache
            .get(key)
            .map(|entry| entry.is_fresh(Instant::now(), self.cache_ttl));
        match fresh {
            Some(true) => cache.get(key).map(|entry| entry.response.clone()),
            Some(false) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn request_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        use_cache: bool,
    ) -> Result<Page<T>> {
        let response = self.request(endpoint, params, use_cache).await?;
        let items: Vec<T> = serde_json::from_value(response.data)?;
        Ok(Page {
            items,
            total_pages: response.total_pages,
            total_items: response.total_items,
        })
    }

    async fn request_one<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let response = self.request(endpoint, &[], true).await?;
        Ok(serde_json::from_value(response.data)?)
    }

    /// List members with pagination and optional search
    pub async fn get_members(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<Page<Member>> {
        let params = list_params(page, per_page, search);
        self.request_list("members", &params, true).await
    }

    pub async fn get_member(&self, id: u64) -> Result<Member> {
        self.request_one(&format!("members/{id}")).await
    }

    /// List subscriptions with pagination and optional search
    pub async fn get_subscriptions(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> Result<Page<Subscription>> {
        let params = list_params(page, per_page, search);
        self.request_list("subscriptions", &params, true).await
    }

    pub async fn get_subscription(&self, id: u64) -> Result<Subscription> {
        self.request_one(&format!("subscriptions/{id}")).await
    }

    /// Cancel a subscription. Mutating call, so the cache is bypassed.
    pub async fn cancel_subscription(&self, id: u64) -> Result<Subscription> {
        let response = self
            .execute(
                Method::POST,
                &format!("subscriptions/{id}/cancel"),
                &[],
                false,
            )
            .await?;
        Ok(serde_json::from_value(response.data)?)
    }

    /// Members registered after the given instant, newest first.
    /// Used by the poller, so the cache is bypassed.
    pub async fn members_since(&self, after: DateTime<Utc>, per_page: u32) -> Result<Vec<Member>> {
        let params = [
            ("after", after.to_rfc3339()),
            ("per_page", per_page.to_string()),
            ("orderby", "registered_at".to_string()),
            ("order", "desc".to_string()),
        ];
        Ok(self.request_list("members", &params, false).await?.items)
    }

    /// Failed transactions created after the given instant
    pub async fn failed_transactions_since(&self, after: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let params = [
            ("status", "failed".to_string()),
            ("after", after.to_rfc3339()),
        ];
        Ok(self
            .request_list("transactions", &params, false)
            .await?
            .items)
    }

    /// Subscriptions cancelled after the given instant
    pub async fn canceled_subscriptions_since(
        &self,
        after: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let params = [
            ("status", "cancelled".to_string()),
            ("after", after.to_rfc3339()),
        ];
        Ok(self
            .request_list("subscriptions", &params, false)
            .await?
            .items)
    }

    /// Active transactions expiring before the given deadline
    pub async fn transactions_expiring_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let params = [
            ("status", "active".to_string()),
            ("expires_before", deadline.to_rfc3339()),
        ];
        Ok(self
            .request_list("transactions", &params, false)
            .await?
            .items)
    }

    /// Drop every cached response
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cache_size(&self) -> usize {
        self.lock_cache().len()
    }
}

fn list_params(page: u32, per_page: u32, search: Option<&str>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", page.to_string()),
        ("per_page", per_page.to_string()),
    ];
    if let Some(search) = search {
        if !search.is_empty() {
            params.push(("search", search.to_string()));
        }
    }
    params
}

fn build_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/wp-json/mp/v1/{}",
        base_url.trim_end_matches('/'),
        endpoint
    )
}

/// WordPress communicates pagination through response headers.
/// Missing or garbled headers fall back to 1 page / 0 items.
fn parse_pagination(headers: &reqwest::header::HeaderMap) -> (u32, u64) {
    let total_pages = headers
        .get("X-WP-TotalPages")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let total_items = headers
        .get("X-WP-Total")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    (total_pages, total_items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_build_url_strips_trailing_slash() {
        assert_eq!(
            build_url("https://example.com/", "members"),
            "https://example.com/wp-json/mp/v1/members"
        );
        assert_eq!(
            build_url("https://example.com", "members"),
            "https://example.com/wp-json/mp/v1/members"
        );
    }

    #[test]
    fn test_parse_pagination_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-WP-TotalPages", HeaderValue::from_static("7"));
        headers.insert("X-WP-Total", HeaderValue::from_static("65"));
        assert_eq!(parse_pagination(&headers), (7, 65));
    }

    #[test]
    fn test_parse_pagination_defaults() {
        assert_eq!(parse_pagination(&HeaderMap::new()), (1, 0));

        let mut headers = HeaderMap::new();
        headers.insert("X-WP-TotalPages", HeaderValue::from_static("many"));
        assert_eq!(parse_pagination(&headers), (1, 0));
    }

    #[test]
    fn test_cache_entry_ttl_boundary() {
        let stored_at = Instant::now();
        let entry = CacheEntry {
            response: ApiResponse {
                data: serde_json::Value::Null,
                total_pages: 1,
                total_items: 0,
            },
            stored_at,
        };

        let just_inside = stored_at + CACHE_TTL - Duration::from_millis(1);
        assert!(entry.is_fresh(just_inside, CACHE_TTL));

        let just_outside = stored_at + CACHE_TTL + Duration::from_millis(1);
        assert!(!entry.is_fresh(just_outside, CACHE_TTL));
    }

    #[test]
    fn test_stale_entry_evicted_on_lookup() {
        let client =
            MemberPressClient::with_cache_ttl(Credentials::new("http://x", "k"), Duration::ZERO);
        client.lock_cache().insert(
            "members-[]".to_string(),
            CacheEntry {
                response: ApiResponse {
                    data: serde_json::Value::Null,
                    total_pages: 1,
                    total_items: 0,
                },
                stored_at: Instant::now() - Duration::from_secs(1),
            },
        );

        assert!(client.cache_lookup("members-[]").is_none());
        assert_eq!(client.cache_size(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_network() {
        let client = MemberPressClient::new(Credentials::default());
        let result = client.request("members", &[], true).await;
        assert!(matches!(result, Err(ApiError::Configuration)));

        let client = MemberPressClient::new(Credentials::new("https://example.com", ""));
        let result = client.get_members(1, 10, None).await;
        assert!(matches!(result, Err(ApiError::Configuration)));
    }

    #[test]
    fn test_list_params_skip_empty_search() {
        let params = list_params(2, 25, Some(""));
        assert_eq!(
            params,
            vec![("page", "2".to_string()), ("per_page", "25".to_string())]
        );

        let params = list_params(1, 10, Some("jane"));
        assert!(params.contains(&("search", "jane".to_string())));
    }
}
