//! Test doubles shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Transport, TransportError};

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync;

/// Transport answering from a closure and recording every request it sees.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self, path_fragment: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(path_fragment))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        (self.handler)(&request)
    }
}

pub fn json(status: u16, body: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status,
        reason: None,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: body.to_string(),
    })
}

/// A DRF page envelope holding `len` items numbered from `start`.
pub fn page(start: usize, len: usize) -> Result<HttpResponse, TransportError> {
    let results: Vec<Value> = (start..start + len)
        .map(|id| serde_json::json!({"id": id, "name": format!("item-{id}")}))
        .collect();
    json(
        200,
        serde_json::json!({"count": null, "next": null, "previous": null, "results": results}),
    )
}

/// The `page` query parameter of a request, 1 when absent.
pub fn page_number(request: &HttpRequest) -> usize {
    request
        .url
        .split_once('?')
        .and_then(|(_, query)| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == "page")
                .and_then(|(_, v)| v.parse().ok())
        })
        .unwrap_or(1)
}
