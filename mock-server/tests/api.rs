use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, MockState, Taxon, PASSWORD};
use serde_json::Value;
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<String> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(String::new()).unwrap()
}

async fn login(app: &Router) -> Value {
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/accounts/login/",
            &format!(r#"{{"identifier":"ana","password":"{PASSWORD}"}}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

// --- auth ---

#[tokio::test]
async fn login_issues_token_pair() {
    let tokens = login(&app()).await;
    assert!(tokens["access"].as_str().unwrap().starts_with("access-"));
    assert!(tokens["refresh"].as_str().unwrap().starts_with("refresh-"));
    assert_eq!(tokens["user"]["email"], "ana@example.com");
}

#[tokio::test]
async fn login_wrong_password_returns_401_detail() {
    let resp = app()
        .oneshot(json_request(
            "POST",
            "/api/accounts/login/",
            r#"{"identifier":"ana","password":"nope"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("No active account"));
}

#[tokio::test]
async fn profile_requires_credentials() {
    let resp = app().oneshot(get("/api/accounts/profile/", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_access_is_rejected_until_refreshed() {
    let state = MockState::default();
    let app = app_with_state(state.clone());
    let tokens = login(&app).await;
    let access = tokens["access"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(get("/api/accounts/profile/", Some(&access)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    state.expire_access_tokens();
    let resp = app
        .clone()
        .oneshot(get("/api/accounts/profile/", Some(&access)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/accounts/token/refresh/",
            &format!(r#"{{"refresh":"{}"}}"#, tokens["refresh"].as_str().unwrap()),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let refreshed: Value = body_json(resp).await;
    let fresh = refreshed["access"].as_str().unwrap();
    assert!(refreshed.get("refresh").is_none());
    assert_eq!(state.refresh_calls(), 1);

    let resp = app
        .oneshot(get("/api/accounts/profile/", Some(fresh)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_refresh_token_returns_401() {
    let state = MockState::default();
    let resp = app_with_state(state.clone())
        .oneshot(json_request(
            "POST",
            "/api/accounts/token/refresh/",
            r#"{"refresh":"forged"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(state.refresh_calls(), 1);
}

#[tokio::test]
async fn invalid_bearer_rejected_on_public_listing() {
    let resp = app().oneshot(get("/api/tags/", Some("stale"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = body_json(resp).await;
    assert_eq!(body["code"], "token_not_valid");
}

// --- pagination ---

#[tokio::test]
async fn tags_are_paged_in_drf_envelope() {
    let resp = app().oneshot(get("/api/tags/?page=3", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = body_json(resp).await;
    assert_eq!(body["count"], 23);
    assert!(body["next"].is_null());
    let results: Vec<Taxon> = serde_json::from_value(body["results"].clone()).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id, 21);
}

#[tokio::test]
async fn page_past_end_returns_invalid_page() {
    let resp = app().oneshot(get("/api/tags/?page=4", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = body_json(resp).await;
    assert_eq!(body["detail"], "Invalid page.");
}

#[tokio::test]
async fn page_size_and_search_are_honored() {
    let resp = app()
        .oneshot(get("/api/genres/?page_size=25&search=genre%201", None))
        .await
        .unwrap();
    let body: Value = body_json(resp).await;
    // "genre 1" and "genre 10".."genre 19"
    assert_eq!(body["count"], 11);
    assert_eq!(body["results"].as_array().unwrap().len(), 11);
}

// --- writes ---

#[tokio::test]
async fn create_tag_appends_to_listing() {
    let app = app_with_state(MockState::new(0, 0));
    let access = login(&app).await["access"].as_str().unwrap().to_string();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/tags/")
                .header(http::header::CONTENT_TYPE, "application/json")
                .header(http::header::AUTHORIZATION, format!("Bearer {access}"))
                .body(r#"{"name":"Slow Burn"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let tag: Taxon = body_json(resp).await;
    assert_eq!(tag.slug, "slow-burn");

    let resp = app.oneshot(get("/api/tags/", None)).await.unwrap();
    let body: Value = body_json(resp).await;
    assert_eq!(body["results"][0]["name"], "Slow Burn");
}

#[tokio::test]
async fn echo_returns_body_verbatim() {
    let resp = app()
        .oneshot(json_request("POST", "/api/echo/", r#"{"a":[1,2],"b":null}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert_eq!(&body[..], br#"{"a":[1,2],"b":null}"#);
}
