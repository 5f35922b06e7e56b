//! Aggregation of DRF page-number pagination.
//!
//! # Design
//! Pages are fetched strictly one after another. The loop stops on the first
//! of:
//! - a page shorter than the page size (`ShortPage`),
//! - the per-resource item cap being reached (`CapReached`),
//! - a "page not found" error (`EndOfStream`), which counts as success,
//! - a success payload that is not a list (`NotAList`).
//!
//! The server's `next` link is not trusted; the next URL is the current one
//! with `page` incremented. Any other failure surfaces as a
//! [`PartialFailure`] that still carries the items collected so far.

use std::fmt;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::response::{ApiResponse, Payload};

/// Page size assumed when neither the policy nor the query names one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Stop thresholds for one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePolicy {
    pub page_size: usize,
    pub max_items: usize,
}

impl PagePolicy {
    pub const TAGS: PagePolicy = PagePolicy {
        page_size: DEFAULT_PAGE_SIZE,
        max_items: 500,
    };
    pub const GENRES: PagePolicy = PagePolicy {
        page_size: DEFAULT_PAGE_SIZE,
        max_items: 50,
    };

    pub const fn new(page_size: usize, max_items: usize) -> Self {
        Self {
            page_size,
            max_items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ShortPage,
    CapReached,
    EndOfStream,
    NotAList,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::ShortPage => "short-page",
            StopReason::CapReached => "cap-reached",
            StopReason::EndOfStream => "404-end-of-stream",
            StopReason::NotAList => "not-a-list",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub pages_fetched: usize,
    pub stop: StopReason,
}

impl<T> Collected<T> {
    pub fn into_response(self) -> ApiResponse<Vec<T>> {
        let message = match self.stop {
            StopReason::EndOfStream => format!(
                "Fetched {} items successfully (stopped at end of pagination)",
                self.items.len()
            ),
            _ => format!("Fetched {} items successfully", self.items.len()),
        };
        ApiResponse {
            data: self.items,
            status: 200,
            message: Some(message),
        }
    }
}

/// A failed aggregation that keeps the pages gathered before the failure.
#[derive(Debug)]
pub struct PartialFailure<T> {
    pub error: ApiError,
    pub items: Vec<T>,
    pub pages_fetched: usize,
}

impl<T> fmt::Display for PartialFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} items collected)", self.error, self.items.len())
    }
}

impl<T: fmt::Debug> std::error::Error for PartialFailure<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<PartialFailure<T>> for ApiError {
    fn from(failure: PartialFailure<T>) -> Self {
        failure.error
    }
}

/// Loop state for one aggregation call.
struct PageFetchState<T> {
    collected: Vec<T>,
    next_endpoint: String,
    page_index: usize,
}

impl<T> PageFetchState<T> {
    fn finish(self, stop: StopReason) -> Collected<T> {
        Collected {
            items: self.collected,
            pages_fetched: self.page_index,
            stop,
        }
    }

    fn fail(self, error: ApiError) -> PartialFailure<T> {
        PartialFailure {
            error,
            items: self.collected,
            pages_fetched: self.page_index,
        }
    }
}

/// Fetch every page starting at `endpoint` through `fetch`.
pub async fn aggregate<T, F, Fut>(
    endpoint: &str,
    policy: PagePolicy,
    mut fetch: F,
) -> Result<Collected<T>, PartialFailure<T>>
where
    T: DeserializeOwned,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<ApiResponse<Payload>, ApiError>>,
{
    let page_size = query_page_size(endpoint).unwrap_or(policy.page_size).max(1);
    let mut state = PageFetchState {
        collected: Vec::new(),
        next_endpoint: endpoint.to_string(),
        page_index: 0,
    };

    loop {
        let current = std::mem::take(&mut state.next_endpoint);
        let response = fetch(current.clone()).await;
        state.page_index += 1;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_page_not_found() => {
                tracing::debug!(endpoint = %current, collected = state.collected.len(), "pagination ended on not-found");
                return Ok(state.finish(StopReason::EndOfStream));
            }
            Err(e) => {
                tracing::warn!(endpoint = %current, err = %e, collected = state.collected.len(), "pagination failed");
                return Err(state.fail(e));
            }
        };

        let status = response.status;
        let Payload::Json(Value::Array(rows)) = response.data else {
            tracing::debug!(endpoint = %current, "page payload is not a list");
            return Ok(state.finish(StopReason::NotAList));
        };

        let fetched = rows.len();
        for row in rows {
            match serde_json::from_value(row) {
                Ok(item) => state.collected.push(item),
                Err(e) => return Err(state.fail(ApiError::decode(status, e))),
            }
        }
        tracing::debug!(
            endpoint = %current,
            page = state.page_index,
            fetched,
            collected = state.collected.len(),
            "fetched page"
        );

        if state.collected.len() >= policy.max_items {
            state.collected.truncate(policy.max_items);
            return Ok(state.finish(StopReason::CapReached));
        }
        if fetched < page_size {
            return Ok(state.finish(StopReason::ShortPage));
        }
        state.next_endpoint = next_page(&current);
    }
}

/// `endpoint` with its `page` query parameter incremented (absent means 1).
pub fn next_page(endpoint: &str) -> String {
    let (path, query) = endpoint.split_once('?').unwrap_or((endpoint, ""));

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let current = pairs
        .iter()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse::<u64>().ok())
        .unwrap_or(1);
    let next = current.saturating_add(1).to_string();

    match pairs.iter_mut().find(|(k, _)| k == "page") {
        Some(pair) => pair.1 = next,
        None => pairs.push(("page".to_string(), next)),
    }

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    format!("{path}?{query}")
}

fn query_page_size(endpoint: &str) -> Option<usize> {
    let (_, query) = endpoint.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "page_size")
        .and_then(|(_, v)| v.parse().ok())
}
