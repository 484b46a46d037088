//! REST API client module for the cloud-storage service.
//!
//! This module provides the `Gateway`, which attaches the bearer token to
//! every request and recovers from an expired access token by refreshing it
//! once, and the `ApiClient`, which exposes one typed method per endpoint.

pub mod client;
pub mod error;
pub mod gateway;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, Download, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
pub use error::{is_session_expired, ApiError, GatewayError, RefreshError, TransportError};
pub use gateway::{Gateway, RefreshPolicy};
pub use transport::{
    FilePart, OutboundRequest, ProgressFn, RawResponse, ReqwestTransport, RequestBody,
    RequestOptions, Response, ResponseKind, Transport,
};
