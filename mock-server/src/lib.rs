//! In-process double of the novel platform's DRF backend.
//!
//! Serves the handful of endpoints the client integration tests need under
//! `/api`: JWT-style login and refresh with opaque tokens, a profile, paged
//! tag and genre listings, author novels, a JSON echo and a multipart cover
//! upload. `MockState` is shared with tests so they can expire tokens and
//! count refresh calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

/// The only password `login` accepts.
pub const PASSWORD: &str = "secret";
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const SEEDED_TAGS: usize = 23;
pub const SEEDED_GENRES: usize = 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: u64,
    pub name: String,
    pub slug: String,
}

impl Taxon {
    fn seeded(kind: &str, id: u64) -> Self {
        Self {
            id,
            name: format!("{kind} {id}"),
            slug: format!("{kind}-{id}"),
        }
    }
}

#[derive(Deserialize)]
pub struct Login {
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct Refresh {
    pub refresh: String,
}

#[derive(Deserialize)]
pub struct NewTaxon {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

struct Inner {
    access: HashSet<String>,
    refresh: HashSet<String>,
    refresh_calls: usize,
    tags: Vec<Taxon>,
    genres: Vec<Taxon>,
    profile: Value,
}

/// Shared server state. Clones point at the same data.
#[derive(Clone)]
pub struct MockState {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new(SEEDED_TAGS, SEEDED_GENRES)
    }
}

impl MockState {
    pub fn new(tag_count: usize, genre_count: usize) -> Self {
        let inner = Inner {
            access: HashSet::new(),
            refresh: HashSet::new(),
            refresh_calls: 0,
            tags: (1..=tag_count as u64).map(|id| Taxon::seeded("tag", id)).collect(),
            genres: (1..=genre_count as u64)
                .map(|id| Taxon::seeded("genre", id))
                .collect(),
            profile: json!({
                "id": 1,
                "name": "Ana Author",
                "email": "ana@example.com",
                "role": "author",
                "bio": null,
            }),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Invalidate every access token issued so far. Refresh tokens stay valid.
    pub fn expire_access_tokens(&self) {
        self.inner.lock().access.clear();
    }

    pub fn refresh_calls(&self) -> usize {
        self.inner.lock().refresh_calls
    }

    fn issue_access(&self) -> String {
        let token = format!("access-{}", Uuid::new_v4());
        self.inner.lock().access.insert(token.clone());
        token
    }
}

pub fn app() -> Router {
    app_with_state(MockState::default())
}

pub fn app_with_state(state: MockState) -> Router {
    let api = Router::new()
        .route("/accounts/login/", post(login))
        .route("/accounts/token/refresh/", post(refresh))
        .route("/accounts/logout/", post(logout))
        .route("/accounts/profile/", get(profile).patch(update_profile))
        .route("/tags/", get(list_tags).post(create_tag))
        .route("/genres/", get(list_genres))
        .route("/author/novels/", get(author_novels))
        .route("/novel/novel-image-upload/", post(upload_cover))
        .route("/echo/", post(echo))
        .with_state(state);
    Router::new().nest("/api", api)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, MockState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

#[derive(Debug, PartialEq, Eq)]
enum Caller {
    Anonymous,
    Authenticated,
}

/// A bearer header that does not match a live token is rejected even on
/// public endpoints, as the real backend does.
fn caller(state: &MockState, headers: &HeaderMap) -> Result<Caller, Response> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Caller::Anonymous);
    };
    let token = value.to_str().ok().and_then(|v| v.strip_prefix("Bearer "));
    let valid = token.is_some_and(|t| state.inner.lock().access.contains(t));
    if valid {
        Ok(Caller::Authenticated)
    } else {
        tracing::debug!("rejected bearer token");
        Err(error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Given token not valid for any token type", "code": "token_not_valid"}),
        ))
    }
}

fn require_auth(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    match caller(state, headers)? {
        Caller::Authenticated => Ok(()),
        Caller::Anonymous => Err(error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Authentication credentials were not provided."}),
        )),
    }
}

fn number(value: Option<&String>, default: usize) -> usize {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// DRF page-number pagination over `items`.
fn paginate(items: Vec<Taxon>, params: &HashMap<String, String>) -> Response {
    let search = params.get("search").map(|s| s.to_lowercase());
    let items: Vec<Taxon> = items
        .into_iter()
        .filter(|t| {
            search
                .as_ref()
                .map_or(true, |s| t.name.to_lowercase().contains(s))
        })
        .collect();

    let page = number(params.get("page"), 1).max(1);
    let size = number(params.get("page_size"), DEFAULT_PAGE_SIZE).max(1);
    let start = (page - 1) * size;
    if page > 1 && start >= items.len() {
        return error(StatusCode::NOT_FOUND, json!({"detail": "Invalid page."}));
    }
    let end = (start + size).min(items.len());

    Json(json!({
        "count": items.len(),
        "next": (end < items.len()).then(|| format!("?page={}", page + 1)),
        "previous": (page > 1).then(|| format!("?page={}", page - 1)),
        "results": &items[start..end],
    }))
    .into_response()
}

async fn login(State(state): State<MockState>, Json(input): Json<Login>) -> Response {
    if input.password != PASSWORD {
        tracing::info!(identifier = %input.identifier, "login rejected");
        return error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "No active account found with the given credentials"}),
        );
    }
    let access = state.issue_access();
    let refresh = format!("refresh-{}", Uuid::new_v4());
    let user = {
        let mut inner = state.inner.lock();
        inner.refresh.insert(refresh.clone());
        inner.profile.clone()
    };
    tracing::info!(identifier = %input.identifier, "login accepted");
    Json(json!({"access": access, "refresh": refresh, "user": user})).into_response()
}

async fn refresh(State(state): State<MockState>, Json(input): Json<Refresh>) -> Response {
    let known = {
        let mut inner = state.inner.lock();
        inner.refresh_calls += 1;
        inner.refresh.contains(&input.refresh)
    };
    if !known {
        return error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        );
    }
    let access = state.issue_access();
    tracing::debug!("access token refreshed");
    Json(json!({"access": access})).into_response()
}

async fn logout(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_auth(&state, &headers) {
        return rejection;
    }
    Json(json!({"detail": "Successfully logged out."})).into_response()
}

async fn profile(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_auth(&state, &headers) {
        return rejection;
    }
    let profile = state.inner.lock().profile.clone();
    Json(profile).into_response()
}

async fn update_profile(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> Response {
    if let Err(rejection) = require_auth(&state, &headers) {
        return rejection;
    }
    let Value::Object(fields) = update else {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"non_field_errors": ["Invalid data. Expected a dictionary."]}),
        );
    };
    let mut inner = state.inner.lock();
    if let Value::Object(profile) = &mut inner.profile {
        for (key, value) in fields {
            if key != "id" && key != "email" {
                profile.insert(key, value);
            }
        }
    }
    Json(inner.profile.clone()).into_response()
}

async fn list_tags(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(rejection) = caller(&state, &headers) {
        return rejection;
    }
    let tags = state.inner.lock().tags.clone();
    paginate(tags, &params)
}

async fn list_genres(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(rejection) = caller(&state, &headers) {
        return rejection;
    }
    let genres = state.inner.lock().genres.clone();
    paginate(genres, &params)
}

async fn create_tag(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(input): Json<NewTaxon>,
) -> Response {
    if let Err(rejection) = require_auth(&state, &headers) {
        return rejection;
    }
    if input.name.trim().is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"name": ["This field may not be blank."]}),
        );
    }
    let mut inner = state.inner.lock();
    let id = inner.tags.len() as u64 + 1;
    let tag = Taxon {
        id,
        slug: input
            .slug
            .unwrap_or_else(|| input.name.to_lowercase().replace(' ', "-")),
        name: input.name,
    };
    inner.tags.push(tag.clone());
    (StatusCode::CREATED, Json(tag)).into_response()
}

async fn author_novels(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = require_auth(&state, &headers) {
        return rejection;
    }
    Json(json!({
        "count": 2,
        "next": null,
        "previous": null,
        "results": [
            {"id": 1, "slug": "salt-roads", "title": "Salt Roads", "synopsis": "Caravans.", "status": "ongoing", "views": 10},
            {"id": 2, "slug": "glass-harbor", "title": "Glass Harbor", "synopsis": null, "status": "draft"},
        ],
    }))
    .into_response()
}

async fn upload_cover(
    State(state): State<MockState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if let Err(rejection) = require_auth(&state, &headers) {
        return rejection;
    }
    let mut novel_id = None;
    let mut cover = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "novel_id" => novel_id = field.text().await.ok(),
            "cover_image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
                cover = Some((file_name, size));
            }
            _ => {}
        }
    }
    match (novel_id, cover) {
        (Some(novel_id), Some((file_name, size))) => {
            tracing::info!(%novel_id, %file_name, size, "cover uploaded");
            Json(json!({
                "novel_id": novel_id,
                "cover_image": format!("/media/covers/{file_name}"),
                "size": size,
            }))
            .into_response()
        }
        _ => error(
            StatusCode::BAD_REQUEST,
            json!({"detail": "novel_id and cover_image are required"}),
        ),
    }
}

async fn echo(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Err(rejection) = caller(&state, &headers) {
        return rejection;
    }
    Json(body).into_response()
}
