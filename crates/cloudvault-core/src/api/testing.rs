//! Scripted transport for exercising the gateway without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;

use super::error::TransportError;
use super::transport::{OutboundRequest, RawResponse, Transport};

type Handler = dyn Fn(&OutboundRequest) -> Result<RawResponse, TransportError> + Send + Sync;

pub(crate) struct FakeTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<OutboundRequest>>,
    yield_each: AtomicBool,
}

impl FakeTransport {
    pub(crate) fn new(
        handler: impl Fn(&OutboundRequest) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            yield_each: AtomicBool::new(false),
        }
    }

    /// Answer every request with an empty JSON body and `status`.
    pub(crate) fn always(status: StatusCode) -> Self {
        Self::new(move |_| Ok(status_response(status)))
    }

    /// Suspend once per request so concurrent callers interleave.
    pub(crate) fn yielding(self: Arc<Self>) -> Arc<Self> {
        self.yield_each.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count_to(&self, path_suffix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with(path_suffix))
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.yield_each.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        (self.handler)(&request)
    }
}

pub(crate) fn json_response(status: StatusCode, body: &str) -> RawResponse {
    let mut response = RawResponse::new(status, body.to_string());
    response.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

pub(crate) fn status_response(status: StatusCode) -> RawResponse {
    json_response(status, "{}")
}

pub(crate) fn binary_response(body: &'static [u8], filename: &str) -> RawResponse {
    let mut response = RawResponse::new(StatusCode::OK, body);
    response.headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)).unwrap(),
    );
    response
}
