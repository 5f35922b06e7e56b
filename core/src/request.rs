//! Request construction.
//!
//! `RequestOptions` is what resource methods fill in; `RequestDescriptor` is
//! the immutable, serialized form; `PreparedRequest` pairs a descriptor with
//! the first concrete `HttpRequest` and can rebuild it with another bearer
//! token for the auth retry.

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{set_header, Body, FormPart, HttpMethod, HttpRequest, MultipartForm};
use crate::transport::check_part_content_type;

/// Endpoints that must never trigger a refresh-and-replay on 401.
const NO_RETRY_ENDPOINTS: &[&str] = &[
    "/accounts/login/",
    "/accounts/token/refresh/",
    "/accounts/register/",
];

/// Caller-facing request body before serialization.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Text(String),
    Multipart(MultipartForm),
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    pub requires_auth: bool,
    pub retry_on_unauthorized: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            body: None,
            headers: Vec::new(),
            requires_auth: true,
            retry_on_unauthorized: true,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn method(method: HttpMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Serialize `body` to a JSON value for this request.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(ApiError::encode)?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = Some(RequestBody::Multipart(form));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name, value.into());
        self
    }

    /// No bearer token, and therefore no refresh on 401.
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self.retry_on_unauthorized = false;
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry_on_unauthorized = false;
        self
    }
}

/// Immutable description of one logical request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub endpoint: String,
    pub method: HttpMethod,
    pub body: Option<Body>,
    pub headers: Vec<(String, String)>,
    pub requires_auth: bool,
    pub retry_on_unauthorized: bool,
}

impl RequestDescriptor {
    pub fn new(endpoint: &str, options: RequestOptions) -> Result<Self, ApiError> {
        let RequestOptions {
            method,
            body,
            mut headers,
            requires_auth,
            retry_on_unauthorized,
        } = options;

        let body = match body {
            None => None,
            Some(RequestBody::Multipart(form)) => {
                for part in &form.parts {
                    if let FormPart::File {
                        content_type: Some(content_type),
                        ..
                    } = part
                    {
                        check_part_content_type(content_type).map_err(ApiError::encode)?;
                    }
                }
                Some(Body::Multipart(form))
            }
            Some(RequestBody::Json(value)) => {
                set_header(&mut headers, "Content-Type", "application/json".to_string());
                let text = serde_json::to_string(&value).map_err(ApiError::encode)?;
                Some(Body::Text(text))
            }
            Some(RequestBody::Text(text)) => {
                if !headers
                    .iter()
                    .any(|(key, _)| key.eq_ignore_ascii_case("content-type"))
                {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Some(Body::Text(text))
            }
        };

        let path = endpoint.split('?').next().unwrap_or(endpoint);
        let retry_on_unauthorized = retry_on_unauthorized && !NO_RETRY_ENDPOINTS.contains(&path);

        Ok(Self {
            endpoint: endpoint.to_string(),
            method,
            body,
            headers,
            requires_auth,
            retry_on_unauthorized,
        })
    }
}

/// A request ready to send, replayable with a fresh token.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub descriptor: RequestDescriptor,
    pub request: HttpRequest,
    base_url: String,
}

impl PreparedRequest {
    /// The same request carrying `access_token` instead of the original one.
    pub fn with_token(&self, access_token: &str) -> HttpRequest {
        to_http(&self.base_url, &self.descriptor, Some(access_token))
    }
}

/// Builds transport-ready requests against one base URL.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: String,
}

impl RequestBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the request. A missing token is not an error here; the server
    /// answers 401 and the coordinator takes over.
    pub fn prepare(
        &self,
        endpoint: &str,
        options: RequestOptions,
        access_token: Option<&str>,
    ) -> Result<PreparedRequest, ApiError> {
        let descriptor = RequestDescriptor::new(endpoint, options)?;
        let token = if descriptor.requires_auth {
            access_token
        } else {
            None
        };
        let request = to_http(&self.base_url, &descriptor, token);
        Ok(PreparedRequest {
            descriptor,
            request,
            base_url: self.base_url.clone(),
        })
    }
}

fn to_http(base_url: &str, descriptor: &RequestDescriptor, token: Option<&str>) -> HttpRequest {
    let mut headers = descriptor.headers.clone();
    if let Some(token) = token {
        set_header(&mut headers, "Authorization", format!("Bearer {token}"));
    }
    HttpRequest {
        method: descriptor.method,
        url: format!("{base_url}{}", descriptor.endpoint),
        headers,
        body: descriptor.body.clone(),
    }
}

/// Append a form-urlencoded query string, skipping absent values.
pub fn with_query(path: &str, params: &[(&str, Option<String>)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in params {
        if let Some(value) = value {
            serializer.append_pair(key, value);
            any = true;
        }
    }
    if !any {
        return path.to_string();
    }
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{}", serializer.finish())
}
