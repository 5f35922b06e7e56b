//! Response normalization.
//!
//! # Design
//! `normalize` turns any `HttpResponse` into either an `ApiResponse<Payload>`
//! or an `ApiError`. A DRF page envelope (`{count, next, previous,
//! results: [...]}`) is unwrapped to its `results` array, so callers never
//! see pagination metadata. Typed access goes through `ApiResponse::decode`.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::HttpResponse;

/// Parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 204, or no body at all.
    Empty,
    Json(Value),
    Text(String),
}

impl Payload {
    /// JSON view of the payload: text becomes a JSON string, empty becomes null.
    pub fn into_value(self) -> Value {
        match self {
            Payload::Empty => Value::Null,
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
        }
    }

    fn string_field(&self, field: &str) -> Option<&str> {
        match self {
            Payload::Json(Value::Object(map)) => map.get(field).and_then(Value::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            data: f(self.data),
            status: self.status,
            message: self.message,
        }
    }
}

impl ApiResponse<Payload> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, ApiError> {
        let status = self.status;
        let data = serde_json::from_value(self.data.into_value())
            .map_err(|e| ApiError::decode(status, e))?;
        Ok(ApiResponse {
            data,
            status,
            message: self.message,
        })
    }
}

/// Parse the body according to its `Content-Type`.
///
/// Empty bodies are `Payload::Empty` whatever the header says. A JSON body
/// that fails to parse is a decode error on success responses; on error
/// responses it falls back to text so the status is not masked.
pub fn parse_body(response: &HttpResponse) -> Result<Payload, ApiError> {
    if response.status == 204 || response.body.is_empty() {
        return Ok(Payload::Empty);
    }
    if !response.content_type().contains("application/json") {
        return Ok(Payload::Text(response.body.clone()));
    }
    match serde_json::from_str(&response.body) {
        Ok(value) => Ok(Payload::Json(value)),
        Err(_) if !response.is_success() => Ok(Payload::Text(response.body.clone())),
        Err(e) => Err(ApiError::decode(response.status, e)),
    }
}

/// Replace a paginated envelope with its `results` array.
pub fn unwrap_envelope(payload: Payload) -> Payload {
    match payload {
        Payload::Json(Value::Object(mut map)) => {
            if map.get("results").is_some_and(Value::is_array) {
                match map.remove("results") {
                    Some(results) => Payload::Json(results),
                    None => Payload::Json(Value::Object(map)),
                }
            } else {
                Payload::Json(Value::Object(map))
            }
        }
        other => other,
    }
}

pub fn normalize(response: HttpResponse) -> Result<ApiResponse<Payload>, ApiError> {
    let payload = parse_body(&response)?;

    if !response.is_success() {
        return Err(error_from(&response, payload));
    }

    let message = payload.string_field("message").map(str::to_string);
    Ok(ApiResponse {
        data: unwrap_envelope(payload),
        status: response.status,
        message,
    })
}

/// Message precedence: `detail`, raw text, status text, generic fallback.
fn error_from(response: &HttpResponse, payload: Payload) -> ApiError {
    let message = payload
        .string_field("detail")
        .map(str::to_string)
        .or_else(|| match &payload {
            Payload::Text(text) if !text.is_empty() => Some(text.clone()),
            Payload::Json(Value::String(text)) if !text.is_empty() => Some(text.clone()),
            _ => None,
        })
        .or_else(|| response.reason.clone().filter(|r| !r.is_empty()))
        .unwrap_or_else(|| "Request failed".to_string());

    let details = match payload {
        Payload::Empty => None,
        other => Some(other.into_value()),
    };

    tracing::debug!(status = response.status, message = %message, "request failed");
    ApiError::from_response(response.status, message, details)
}
