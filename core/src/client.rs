//! The public request surface.
//!
//! # Design
//! `ApiService` composes the pieces: `RequestBuilder` makes the request,
//! `AuthRetryCoordinator` sends it (refreshing once on 401), `normalize`
//! turns the response into data or an `ApiError`. List endpoints add
//! `pagination::aggregate` on top. Every resource method in `resources` is a
//! thin wrapper over `request`, `request_as` or `collect`.
//!
//! The service is cheap to clone; clones share the transport, the token store
//! and the refresh gate.

use std::sync::Arc;
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::auth::{extract_tokens, AuthRetryCoordinator, IssuedTokens};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::HttpMethod;
use crate::pagination::{aggregate, Collected, PagePolicy, PartialFailure};
use crate::request::{RequestBuilder, RequestOptions};
use crate::response::{normalize, ApiResponse, Payload};
use crate::token::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{
    LoginCredentials, Registration, SocialLoginSession, SocialLoginStart, SocialProvider,
};

#[derive(Clone)]
pub struct ApiService {
    builder: RequestBuilder,
    tokens: Arc<dyn TokenStore>,
    auth: AuthRetryCoordinator,
}

impl ApiService {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>, tokens: Arc<dyn TokenStore>) -> Self {
        let builder = RequestBuilder::new(base_url);
        let auth = AuthRetryCoordinator::new(builder.clone(), transport, tokens.clone());
        Self {
            builder,
            tokens,
            auth,
        }
    }

    /// reqwest transport plus a file-backed token store when
    /// `config.token_file` is set, in-memory otherwise.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new(config)?);
        let tokens: Arc<dyn TokenStore> = match &config.token_file {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        Ok(Self::new(&config.base_url, transport, tokens))
    }

    pub fn base_url(&self) -> &str {
        self.builder.base_url()
    }

    /// Current token pair, read-only.
    pub fn session(&self) -> Option<TokenPair> {
        self.tokens.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens
            .get()
            .is_some_and(|pair| !pair.access_expired(SystemTime::now()))
    }

    /// Issue one request through the full stack.
    pub async fn request(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<Payload>, ApiError> {
        let token = if options.requires_auth {
            self.access_token().await
        } else {
            None
        };
        let prepared = self.builder.prepare(endpoint, options, token.as_deref())?;
        let response = self.auth.send(prepared).await?;
        normalize(response)
    }

    pub async fn request_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(endpoint, options).await?.decode()
    }

    /// Fetch every page of a collection endpoint.
    pub async fn collect<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        policy: PagePolicy,
    ) -> Result<Collected<T>, PartialFailure<T>> {
        let collected = aggregate(endpoint, policy, |page| async move {
            self.request(&page, RequestOptions::get()).await
        })
        .await?;
        tracing::debug!(
            endpoint,
            items = collected.items.len(),
            pages = collected.pages_fetched,
            stop = collected.stop.as_str(),
            "collection fetched"
        );
        Ok(collected)
    }

    /// Stored access token, refreshed first when it is a JWT known to have
    /// expired.
    async fn access_token(&self) -> Option<String> {
        let pair = self.tokens.get()?;
        if pair.access_expired(SystemTime::now()) {
            tracing::debug!("access token expired; refreshing before request");
            return self.auth.refresh_access(Some(&pair.access)).await;
        }
        Some(pair.access)
    }

    fn store_issued(&self, payload: &Payload) {
        match extract_tokens(payload) {
            Some(IssuedTokens {
                access: Some(access),
                refresh,
            }) => {
                self.tokens.set(TokenPair::new(access, refresh));
                tracing::info!("session tokens stored");
            }
            _ => tracing::warn!("auth response carried no access token"),
        }
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<ApiResponse<Value>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post)
            .json(credentials)?
            .public();
        let response = self.request("/accounts/login/", options).await?;
        self.store_issued(&response.data);
        Ok(response.map(Payload::into_value))
    }

    /// Tokens are cleared whatever the server says.
    pub async fn logout(&self) -> Result<ApiResponse<()>, ApiError> {
        let result = match RequestOptions::method(HttpMethod::Post).json(&json!({})) {
            Ok(options) => self.request("/accounts/logout/", options).await,
            Err(e) => Err(e),
        };
        self.tokens.clear();
        tracing::info!(server_ok = result.is_ok(), "logged out");
        result.map(|response| response.map(|_| ()))
    }

    pub async fn refresh_token(&self) -> Result<TokenPair, ApiError> {
        self.auth.refresh_now().await
    }

    pub async fn register(&self, registration: &Registration) -> Result<ApiResponse<Value>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post)
            .json(registration)?
            .public();
        Ok(self
            .request("/accounts/register/", options)
            .await?
            .map(Payload::into_value))
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<ApiResponse<Value>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post)
            .json(&json!({ "email": email }))?
            .public();
        Ok(self
            .request("/accounts/password-reset/", options)
            .await?
            .map(Payload::into_value))
    }

    pub async fn confirm_password_reset(&self, payload: &Value) -> Result<ApiResponse<Value>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(payload)?.public();
        Ok(self
            .request("/accounts/password-reset/confirm/", options)
            .await?
            .map(Payload::into_value))
    }

    pub async fn social_providers(&self) -> Result<ApiResponse<Vec<SocialProvider>>, ApiError> {
        self.request_as("/accounts/social/providers/", RequestOptions::get().public())
            .await
    }

    pub async fn start_social_login(
        &self,
        provider: &str,
        start: &SocialLoginStart,
    ) -> Result<ApiResponse<SocialLoginSession>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(start)?.public();
        self.request_as(&format!("/accounts/social/{provider}/login/"), options)
            .await
    }

    pub async fn complete_social_login(
        &self,
        provider: &str,
        payload: &Value,
    ) -> Result<ApiResponse<Value>, ApiError> {
        let options = RequestOptions::method(HttpMethod::Post).json(payload)?.public();
        let response = self
            .request(&format!("/accounts/social/{provider}/callback/"), options)
            .await?;
        self.store_issued(&response.data);
        Ok(response.map(Payload::into_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::REFRESH_ENDPOINT;
    use crate::error::ErrorKind;
    use crate::pagination::StopReason;
    use crate::testing::{json, page, page_number, ScriptedTransport};
    use crate::transport::TransportError;

    const BASE: &str = "http://api.test";

    fn service(transport: Arc<ScriptedTransport>, tokens: Arc<MemoryTokenStore>) -> ApiService {
        ApiService::new(BASE, transport, tokens)
    }

    #[tokio::test]
    async fn login_stores_tokens_without_bearer() {
        let transport = ScriptedTransport::new(|req| {
            assert!(req.bearer_token().is_none());
            json(200, serde_json::json!({"access": "a1", "refresh": "r1", "user": {"id": 1}}))
        });
        let tokens = Arc::new(MemoryTokenStore::new());
        let api = service(transport, tokens.clone());

        let response = api
            .login(&LoginCredentials {
                identifier: "ana".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(response.data["user"]["id"], 1);
        assert_eq!(tokens.get(), Some(TokenPair::new("a1", Some("r1".to_string()))));
    }

    #[tokio::test]
    async fn failed_login_never_refreshes() {
        let transport = ScriptedTransport::new(|_| {
            json(401, serde_json::json!({"detail": "No active account found"}))
        });
        let tokens = Arc::new(MemoryTokenStore::with_pair(TokenPair::new(
            "old",
            Some("r".to_string()),
        )));
        let api = service(transport.clone(), tokens);

        let err = api
            .login(&LoginCredentials {
                identifier: "ana".to_string(),
                password: "bad".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(transport.count(REFRESH_ENDPOINT), 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn logout_clears_even_when_server_fails() {
        let transport =
            ScriptedTransport::new(|_| Err(TransportError("network unreachable".to_string())));
        let tokens = Arc::new(MemoryTokenStore::with_pair(TokenPair::new("a", None)));
        let api = service(transport, tokens.clone());

        let err = api.logout().await.unwrap_err();
        assert_eq!(err.status, 0);
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn single_resource_data_is_verbatim_and_idempotent() {
        let body = serde_json::json!({"id": 3, "name": "Ana", "email": "a@x.test", "count": 4});
        let served = body.clone();
        let transport = ScriptedTransport::new(move |_| json(200, served.clone()));
        let api = service(transport, Arc::new(MemoryTokenStore::new()));

        let first = api.request("/accounts/profile/", RequestOptions::get()).await.unwrap();
        let second = api.request("/accounts/profile/", RequestOptions::get()).await.unwrap();
        assert_eq!(first.data, Payload::Json(body));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn expired_jwt_refreshes_before_sending() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let expired = format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode("{}"),
            URL_SAFE_NO_PAD.encode(r#"{"exp":1}"#)
        );

        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with(REFRESH_ENDPOINT) {
                json(200, serde_json::json!({"access": "fresh"}))
            } else if req.bearer_token() == Some("fresh") {
                json(200, serde_json::json!({"ok": true}))
            } else {
                json(401, serde_json::json!({"detail": "expired"}))
            }
        });
        let tokens = Arc::new(MemoryTokenStore::with_pair(TokenPair::new(
            expired,
            Some("r".to_string()),
        )));
        let api = service(transport.clone(), tokens.clone());
        assert!(!api.is_authenticated());

        api.request("/author/novels/", RequestOptions::get()).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].url.ends_with(REFRESH_ENDPOINT));
        assert_eq!(requests[1].bearer_token(), Some("fresh"));
        assert!(api.is_authenticated());
    }

    #[tokio::test]
    async fn failed_proactive_refresh_sends_without_bearer() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let expired = format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode("{}"),
            URL_SAFE_NO_PAD.encode(r#"{"exp":1}"#)
        );

        let transport = ScriptedTransport::new(|req| {
            if req.url.ends_with(REFRESH_ENDPOINT) {
                json(401, serde_json::json!({"detail": "Token is invalid or expired"}))
            } else {
                json(401, serde_json::json!({"detail": "Authentication credentials were not provided."}))
            }
        });
        let tokens = Arc::new(MemoryTokenStore::with_pair(TokenPair::new(
            expired,
            Some("r".to_string()),
        )));
        let api = service(transport.clone(), tokens.clone());

        let err = api
            .request("/author/novels/", RequestOptions::get())
            .await
            .unwrap_err();

        assert_eq!(err.status, 401);
        assert_eq!(err.kind, ErrorKind::Unauthorized);
        assert_eq!(
            err.details.unwrap()["detail"],
            "Authentication credentials were not provided."
        );
        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(transport.count(REFRESH_ENDPOINT), 1);
        assert!(requests[1].url.ends_with("/author/novels/"));
        assert!(requests[1].bearer_token().is_none());
        assert!(tokens.get().is_none());
    }

    #[tokio::test]
    async fn login_without_access_token_keeps_session() {
        let transport =
            ScriptedTransport::new(|_| json(200, serde_json::json!({"user": {"id": 1}})));
        let kept = TokenPair::new("keep", Some("r".to_string()));
        let tokens = Arc::new(MemoryTokenStore::with_pair(kept.clone()));
        let api = service(transport, tokens.clone());

        let response = api
            .login(&LoginCredentials {
                identifier: "ana".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(response.data["user"]["id"], 1);
        assert_eq!(tokens.get(), Some(kept));
    }

    #[tokio::test]
    async fn collect_goes_through_auth_stack() {
        let transport = ScriptedTransport::new(|req| {
            if req.bearer_token() != Some("a") {
                return json(401, serde_json::json!({"detail": "bad"}));
            }
            match page_number(req) {
                1 | 2 => page((page_number(req) - 1) * 10, 10),
                3 => page(20, 3),
                _ => json(404, serde_json::json!({"detail": "Invalid page."})),
            }
        });
        let api = service(
            transport.clone(),
            Arc::new(MemoryTokenStore::with_pair(TokenPair::new("a", None))),
        );

        let tags: Collected<crate::types::Tag> =
            api.collect("/tags/", PagePolicy::TAGS).await.unwrap();
        assert_eq!(tags.items.len(), 23);
        assert_eq!(tags.stop, StopReason::ShortPage);
        assert_eq!(transport.requests().len(), 3);
    }
}
