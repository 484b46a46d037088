//! The seam between the gateway and the network.
//!
//! The gateway builds an [`OutboundRequest`] with the bearer token already
//! decided and hands it to a [`Transport`]. [`ReqwestTransport`] is the
//! production implementation; tests substitute scripted fakes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::{self, HeaderMap};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use super::error::TransportError;

/// Chunk size for streamed upload bodies
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on the download buffer reserved from `Content-Length`
const MAX_PREALLOCATED_BODY: u64 = 8 * 1024 * 1024;

/// Progress callback: bytes transferred so far and the total when known.
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// How the response body is expected to be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    #[default]
    Json,
    Binary,
}

impl ResponseKind {
    fn accept(self) -> &'static str {
        match self {
            ResponseKind::Json => "application/json",
            ResponseKind::Binary => "application/octet-stream",
        }
    }
}

#[derive(Clone, Default)]
pub struct RequestOptions {
    pub response_kind: ResponseKind,
    pub query: Vec<(String, String)>,
    pub progress: Option<ProgressFn>,
    /// Send without a bearer token and skip the refresh protocol.
    pub anonymous: bool,
}

impl RequestOptions {
    pub fn binary() -> Self {
        Self {
            response_kind: ResponseKind::Binary,
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self {
            anonymous: true,
            ..Self::default()
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("response_kind", &self.response_kind)
            .field("query", &self.query)
            .field("progress", &self.progress.is_some())
            .field("anonymous", &self.anonymous)
            .finish()
    }
}

/// A file attached to a multipart upload. Kept as owned bytes so the
/// request can be re-sent after a token refresh.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart {
        file: FilePart,
        fields: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: RequestBody,
    pub options: RequestOptions,
}

/// Status, headers and fully read body of an HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// The response handed back to gateway callers.
#[derive(Debug, Clone)]
pub struct Response {
    raw: RawResponse,
    kind: ResponseKind,
}

impl Response {
    pub(crate) fn new(raw: RawResponse, kind: ResponseKind) -> Self {
        Self { raw, kind }
    }

    pub fn status(&self) -> StatusCode {
        self.raw.status
    }

    pub fn is_success(&self) -> bool {
        self.raw.status.is_success()
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.raw.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw.body).into_owned()
    }

    pub fn into_bytes(self) -> Bytes {
        self.raw.body
    }

    /// File name from `Content-Disposition: attachment; filename="..."`.
    pub fn attachment_filename(&self) -> Option<String> {
        let value = self.raw.headers.get(header::CONTENT_DISPOSITION)?.to_str().ok()?;
        value
            .split(';')
            .map(str::trim)
            .find_map(|part| part.strip_prefix("filename="))
            .map(|name| name.trim_matches('"').to_string())
            .filter(|name| !name.is_empty())
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, TransportError>;
}

/// Transport backed by a shared `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn build(&self, request: OutboundRequest) -> reqwest::RequestBuilder {
        let OutboundRequest {
            method,
            url,
            bearer,
            body,
            options,
        } = request;

        let mut builder = self
            .client
            .request(method, &url)
            .header(header::ACCEPT, options.response_kind.accept());
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart { file, fields } => {
                let length = file.bytes.len() as u64;
                let part = Part::stream_with_length(
                    progress_body(file.bytes, options.progress.clone()),
                    length,
                )
                .file_name(file.file_name);
                let form = fields
                    .into_iter()
                    .fold(Form::new(), |form, (key, value)| form.text(key, value))
                    .part(file.field, part);
                builder.multipart(form)
            }
        };
        builder
    }
}

/// Split an upload into chunks so the progress callback fires as the body
/// is streamed out.
fn progress_stream(
    bytes: Bytes,
    progress: Option<ProgressFn>,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let total = bytes.len() as u64;
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len())))
        .collect();

    let mut sent = 0u64;
    stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        if let Some(ref report) = progress {
            report(sent, Some(total));
        }
        Ok(chunk)
    })
}

fn progress_body(bytes: Bytes, progress: Option<ProgressFn>) -> reqwest::Body {
    reqwest::Body::wrap_stream(progress_stream(bytes, progress))
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, TransportError> {
        let progress = request.options.progress.clone();
        let download_progress = request.options.response_kind == ResponseKind::Binary;
        let response = self.build(request).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let total = response.content_length();

        let body = match progress.filter(|_| download_progress) {
            Some(report) => {
                let reserve = total.map_or(0, |t| t.min(MAX_PREALLOCATED_BODY) as usize);
                let mut buffer = Vec::with_capacity(reserve);
                let mut chunks = response.bytes_stream();
                while let Some(chunk) = chunks.next().await {
                    buffer.extend_from_slice(&chunk?);
                    report(buffer.len() as u64, total);
                }
                Bytes::from(buffer)
            }
            None => response.bytes().await?,
        };

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
