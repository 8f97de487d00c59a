use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::{DatasetId, DateWindow, Locale};
use crate::error::ExplorerError;

pub const DEFAULT_BASE_URL: &str = "https://data.fingrid.fi";
pub const PAGE_SIZE: u32 = 20_000;
const API_KEY_HEADER: &str = "x-api-key";

/// One page of the series endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub dataset_id: DatasetId,
    pub window: DateWindow,
    pub locale: Locale,
    pub page: Option<u32>,
}

impl PageRequest {
    pub fn first(dataset_id: DatasetId, window: DateWindow, locale: Locale) -> Self {
        Self {
            dataset_id,
            window,
            locale,
            page: None,
        }
    }

    pub fn page(&self, page: u32) -> Self {
        Self {
            page: Some(page),
            ..self.clone()
        }
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("startTime", self.window.start_param()),
            ("endTime", self.window.end_param()),
            ("format", "json".to_string()),
            ("oneRowPerTimePeriod", "true".to_string()),
            ("pageSize", PAGE_SIZE.to_string()),
        ];
        if let Some(page) = self.page {
            params.push(("page", page.to_string()));
        }
        params.push(("locale", self.locale.as_param().to_string()));
        params.push(("sortBy", "startTime".to_string()));
        params.push(("sortOrder", "asc".to_string()));
        params
    }
}

/// Raw JSON transport to the open data API. Shape checks happen in the callers.
pub trait FingridClient: Send + Sync {
    fn search_catalog(&self, query: &str, api_key: &str) -> Result<Value, ExplorerError>;
    fn fetch_page(&self, request: &PageRequest, api_key: &str) -> Result<Value, ExplorerError>;
}

impl<C: FingridClient + ?Sized> FingridClient for &C {
    fn search_catalog(&self, query: &str, api_key: &str) -> Result<Value, ExplorerError> {
        (**self).search_catalog(query, api_key)
    }

    fn fetch_page(&self, request: &PageRequest, api_key: &str) -> Result<Value, ExplorerError> {
        (**self).fetch_page(request, api_key)
    }
}

#[derive(Clone)]
pub struct FingridHttpClient {
    client: Client,
    base_url: String,
}

impl FingridHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExplorerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("fgx/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ExplorerError::Network(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ExplorerError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get_json(&self, url: Url, api_key: &str) -> Result<Value, ExplorerError> {
        tracing::debug!(%url, "fingrid.request");
        let start = std::time::Instant::now();
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .map_err(|err| ExplorerError::Network(err.to_string()))?;
        let status = response.status();
        tracing::debug!(
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "fingrid.response"
        );
        if status.is_server_error() || status.as_u16() == 429 {
            let message = response
                .text()
                .unwrap_or_else(|_| "Fingrid request failed".to_string());
            return Err(ExplorerError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let bytes = response
            .bytes()
            .map_err(|err| ExplorerError::Network(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| ExplorerError::Decode(err.to_string()))
    }
}

impl FingridClient for FingridHttpClient {
    fn search_catalog(&self, query: &str, api_key: &str) -> Result<Value, ExplorerError> {
        self.get_json(catalog_url(&self.base_url, query)?, api_key)
    }

    fn fetch_page(&self, request: &PageRequest, api_key: &str) -> Result<Value, ExplorerError> {
        self.get_json(series_url(&self.base_url, request)?, api_key)
    }
}

pub fn catalog_url(base_url: &str, query: &str) -> Result<Url, ExplorerError> {
    let endpoint = format!("{}/api/datasets", base_url.trim_end_matches('/'));
    Url::parse_with_params(&endpoint, [("search", query), ("orderBy", "id")])
        .map_err(|err| ExplorerError::Network(err.to_string()))
}

pub fn series_url(base_url: &str, request: &PageRequest) -> Result<Url, ExplorerError> {
    let endpoint = format!(
        "{}/api/datasets/{}/data",
        base_url.trim_end_matches('/'),
        request.dataset_id
    );
    Url::parse_with_params(&endpoint, request.query())
        .map_err(|err| ExplorerError::Network(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn request() -> PageRequest {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
        )
        .unwrap();
        PageRequest::first("245".parse().unwrap(), window, Locale::Fi)
    }

    #[test]
    fn series_url_carries_protocol_params() {
        let url = series_url(DEFAULT_BASE_URL, &request()).unwrap();
        assert_eq!(url.path(), "/api/datasets/245/data");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("startTime".to_string(), "2025-01-01T00:00:00Z".to_string())));
        assert!(pairs.contains(&("endTime".to_string(), "2025-01-07T23:59:00Z".to_string())));
        assert!(pairs.contains(&("pageSize".to_string(), "20000".to_string())));
        assert!(pairs.contains(&("oneRowPerTimePeriod".to_string(), "true".to_string())));
        assert!(pairs.contains(&("sortOrder".to_string(), "asc".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "page"));
    }

    #[test]
    fn later_pages_add_page_param() {
        let url = series_url("https://example.test/", &request().page(3)).unwrap();
        assert_eq!(url.host_str(), Some("example.test"));
        assert!(url.query_pairs().any(|(k, v)| k == "page" && v == "3"));
    }

    #[test]
    fn catalog_url_orders_by_id() {
        let url = catalog_url(DEFAULT_BASE_URL, "wind power").unwrap();
        assert_eq!(url.path(), "/api/datasets");
        assert!(url.query_pairs().any(|(k, v)| k == "search" && v == "wind power"));
        assert!(url.query_pairs().any(|(k, v)| k == "orderBy" && v == "id"));
    }
}
