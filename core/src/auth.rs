//! Transparent access-token refresh.
//!
//! # Design
//! A request moves through `SENT -> (REFRESHING) -> DONE`. After the first
//! response, [`RetryDecision::after`] decides whether a refresh is warranted;
//! if so the coordinator refreshes once and replays once. The replay's
//! response is returned as-is, so there is no path back to the decision and
//! no way to loop.
//!
//! Refreshes are serialized behind one async mutex shared by every clone of
//! the coordinator. A caller that wins the gate after someone else already
//! rotated the access token reuses that token instead of refreshing again.
//! A failed refresh clears the token store and hands back the original 401.

use std::sync::Arc;
use std::time::SystemTime;

use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpResponse};
use crate::request::{PreparedRequest, RequestBuilder, RequestDescriptor, RequestOptions};
use crate::response::{normalize, Payload};
use crate::token::{TokenPair, TokenStore};
use crate::transport::Transport;

pub const REFRESH_ENDPOINT: &str = "/accounts/token/refresh/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Done,
    RefreshAndReplay,
}

impl RetryDecision {
    pub fn after(status: u16, descriptor: &RequestDescriptor) -> Self {
        if status == 401 && descriptor.requires_auth && descriptor.retry_on_unauthorized {
            RetryDecision::RefreshAndReplay
        } else {
            RetryDecision::Done
        }
    }
}

/// Tokens found in a login/refresh response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// Pull tokens out of `access|accessToken|token` and `refresh|refreshToken`.
pub fn extract_tokens(payload: &Payload) -> Option<IssuedTokens> {
    let Payload::Json(Value::Object(map)) = payload else {
        return None;
    };
    let first = |keys: &[&str]| {
        keys.iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|value| !value.is_empty())
            .map(str::to_string)
    };
    let access = first(&["access", "accessToken", "token"]);
    let refresh = first(&["refresh", "refreshToken"]);
    if access.is_none() && refresh.is_none() {
        return None;
    }
    Some(IssuedTokens { access, refresh })
}

#[derive(Clone)]
pub struct AuthRetryCoordinator {
    builder: RequestBuilder,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenStore>,
    refresh_gate: Arc<Mutex<()>>,
}

impl AuthRetryCoordinator {
    pub fn new(
        builder: RequestBuilder,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            builder,
            transport,
            tokens,
            refresh_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Send `prepared`, refreshing and replaying at most once on a 401.
    pub async fn send(&self, prepared: PreparedRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(
            method = prepared.request.method.as_str(),
            endpoint = %prepared.descriptor.endpoint,
            "sending request"
        );
        let first = self.transport.execute(prepared.request.clone()).await?;

        match RetryDecision::after(first.status, &prepared.descriptor) {
            RetryDecision::Done => Ok(first),
            RetryDecision::RefreshAndReplay => {
                let stale = prepared.request.bearer_token();
                match self.refresh_access(stale).await {
                    Some(access) => {
                        tracing::debug!(endpoint = %prepared.descriptor.endpoint, "replaying after refresh");
                        Ok(self.transport.execute(prepared.with_token(&access)).await?)
                    }
                    None => Ok(first),
                }
            }
        }
    }

    /// Obtain a usable access token after `stale` was rejected or found
    /// expired. Returns `None`, with the store cleared, when that fails.
    pub async fn refresh_access(&self, stale: Option<&str>) -> Option<String> {
        let _gate = self.refresh_gate.lock().await;

        let current = self.tokens.get();
        if let Some(pair) = &current {
            if Some(pair.access.as_str()) != stale && !pair.access_expired(SystemTime::now()) {
                return Some(pair.access.clone());
            }
        }

        let Some(refresh) = current.and_then(|pair| pair.refresh) else {
            tracing::warn!("no refresh token available; clearing session");
            self.tokens.clear();
            return None;
        };

        match self.exchange(&refresh).await {
            Ok(pair) => {
                let access = pair.access.clone();
                self.tokens.set(pair);
                tracing::info!("access token refreshed");
                Some(access)
            }
            Err(e) => {
                tracing::warn!(status = e.status, err = %e, "token refresh failed; clearing session");
                self.tokens.clear();
                None
            }
        }
    }

    /// Explicit refresh. Errors are returned and the store is left alone.
    pub async fn refresh_now(&self) -> Result<TokenPair, ApiError> {
        let _gate = self.refresh_gate.lock().await;
        let refresh = self
            .tokens
            .get()
            .and_then(|pair| pair.refresh)
            .ok_or_else(|| ApiError::invalid(400, "No refresh token available"))?;
        let pair = self.exchange(&refresh).await?;
        self.tokens.set(pair.clone());
        tracing::info!("access token refreshed");
        Ok(pair)
    }

    /// Trade a refresh token for a new pair. Goes straight to the transport,
    /// never through `send`, so a 401 here cannot recurse.
    async fn exchange(&self, refresh: &str) -> Result<TokenPair, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post)
            .json(&json!({ "refresh": refresh }))?
            .public();
        let prepared = self.builder.prepare(REFRESH_ENDPOINT, options, None)?;
        let response = normalize(self.transport.execute(prepared.request).await?)?;

        match extract_tokens(&response.data) {
            Some(IssuedTokens {
                access: Some(access),
                refresh: rotated,
            }) => Ok(TokenPair::new(access, rotated.or_else(|| Some(refresh.to_string())))),
            _ => Err(ApiError::decode(
                response.status,
                "refresh response carried no access token",
            )),
        }
    }
}
