//! Authenticated request client for the novel platform API.
//!
//! # Overview
//! Every backend call goes through one pipeline: build the request, attach
//! the bearer token, execute through a `Transport`, refresh once on 401 and
//! replay, then normalize the DRF response into `ApiResponse` or `ApiError`.
//! Collection endpoints add page aggregation on top.
//!
//! # Design
//! - Request construction and response parsing work on plain
//!   `HttpRequest` / `HttpResponse` values; only `Transport` touches the
//!   network, so everything above it is testable with a scripted transport.
//! - Tokens live behind the `TokenStore` trait (in-memory or file-backed)
//!   and are injected into `ApiService`.
//! - Refreshes are serialized: concurrent 401s trigger one refresh call.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod pagination;
pub mod request;
pub mod resources;
pub mod response;
pub mod token;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use auth::AuthRetryCoordinator;
pub use client::ApiService;
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiError, ErrorKind};
pub use http::{Body, FormPart, HttpMethod, HttpRequest, HttpResponse, MultipartForm};
pub use pagination::{Collected, PagePolicy, PartialFailure, StopReason};
pub use request::{RequestBuilder, RequestOptions};
pub use response::{ApiResponse, Payload};
pub use token::{FileTokenStore, MemoryTokenStore, TokenPair, TokenStore};
pub use transport::{ReqwestTransport, Transport, TransportError};
