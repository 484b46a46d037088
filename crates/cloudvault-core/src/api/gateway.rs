//! Authenticated gateway to the storage API.
//!
//! Every request gets the current access token as a bearer credential. When
//! the server answers 401 the gateway refreshes the access token once and
//! re-sends the request once; if the refresh fails both tokens are cleared
//! and the caller gets [`GatewayError::SessionExpired`].

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::{ApiError, GatewayError, RefreshError};
use super::transport::{OutboundRequest, RequestBody, RequestOptions, Response, Transport};
use crate::auth::{Session, TokenUpdate};

/// Endpoint that mints a new access token from a refresh token
const REFRESH_PATH: &str = "/auth/refresh/";

/// How concurrent 401s share token refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Every failed request runs its own refresh; the last one to finish wins.
    #[default]
    Independent,
    /// Refreshes are serialized, and a request whose token was already
    /// replaced while it waited reuses the new token.
    Coalesced,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// A request together with how many times it has been sent after a refresh.
#[derive(Debug, Clone)]
struct AttemptedRequest {
    method: Method,
    path: String,
    body: RequestBody,
    options: RequestOptions,
    attempt: u8,
}

impl AttemptedRequest {
    fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    fn retried(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

pub struct Gateway {
    base_url: String,
    transport: Arc<dyn Transport>,
    session: Session,
    policy: RefreshPolicy,
    refresh_lock: Mutex<()>,
}

impl Gateway {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>, session: Session) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
            session,
            policy: RefreshPolicy::default(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_refresh_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send `method path` with the stored access token attached, refreshing
    /// and retrying once on 401. Any HTTP status other than a first 401 comes
    /// back as `Ok`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<Response, GatewayError> {
        let request = AttemptedRequest {
            method,
            path: path.to_string(),
            body,
            options,
            attempt: 0,
        };

        let sent_token = self.bearer_for(&request);
        let response = self.dispatch(&request, sent_token.clone()).await?;
        if response.status() != StatusCode::UNAUTHORIZED
            || request.is_retry()
            || request.options.anonymous
        {
            return Ok(response);
        }

        debug!(method = %request.method, path = %request.path, "Access token rejected, refreshing");
        let retry = request.retried();
        let token = self.refresh_access_token(sent_token.as_deref()).await?;

        let response = self.dispatch(&retry, Some(token)).await?;
        debug!(
            method = %retry.method,
            path = %retry.path,
            status = %response.status(),
            attempt = retry.attempt,
            "Retried request after refresh"
        );
        Ok(response)
    }

    fn bearer_for(&self, request: &AttemptedRequest) -> Option<String> {
        if request.options.anonymous {
            return None;
        }
        self.session.access_token().filter(|t| !t.is_empty())
    }

    /// Send one attempt carrying `bearer`.
    async fn dispatch(
        &self,
        request: &AttemptedRequest,
        bearer: Option<String>,
    ) -> Result<Response, GatewayError> {
        let outbound = OutboundRequest {
            method: request.method.clone(),
            url: self.url(&request.path),
            bearer,
            body: request.body.clone(),
            options: request.options.clone(),
        };
        let kind = outbound.options.response_kind;

        let raw = self.transport.send(outbound).await.map_err(|e| {
            warn!(method = %request.method, path = %request.path, error = %e, "Request failed");
            GatewayError::Transport(e)
        })?;
        Ok(Response::new(raw, kind))
    }

    async fn refresh_access_token(&self, stale: Option<&str>) -> Result<String, GatewayError> {
        match self.policy {
            RefreshPolicy::Independent => self.refresh_once().await,
            RefreshPolicy::Coalesced => {
                let _guard = self.refresh_lock.lock().await;
                if let Some(current) = self.session.access_token() {
                    if Some(current.as_str()) != stale {
                        debug!("Access token already refreshed by a concurrent request");
                        return Ok(current);
                    }
                }
                self.refresh_once().await
            }
        }
    }

    async fn refresh_once(&self) -> Result<String, GatewayError> {
        let Some(refresh) = self.session.refresh_token() else {
            return Err(self.expire(RefreshError::MissingRefreshToken));
        };
        let tokens = match self.call_refresh(&refresh).await {
            Ok(tokens) => tokens,
            Err(e) => return Err(self.expire(e)),
        };

        match self
            .session
            .update_tokens(&refresh, tokens.access.clone(), tokens.refresh)
        {
            TokenUpdate::Stored => {
                debug!("Access token refreshed");
                Ok(tokens.access)
            }
            TokenUpdate::Superseded(current) => {
                debug!("Refresh token rotated by a concurrent refresh");
                Ok(current)
            }
            TokenUpdate::Cleared => {
                warn!("Session cleared during refresh, discarding new access token");
                Err(GatewayError::SessionExpired(RefreshError::SessionCleared))
            }
        }
    }

    /// Clear both tokens and report the refresh failure.
    fn expire(&self, error: RefreshError) -> GatewayError {
        warn!(error = %error, "Token refresh failed");
        self.session.force_logout();
        GatewayError::SessionExpired(error)
    }

    async fn call_refresh(&self, refresh: &str) -> Result<RefreshResponse, RefreshError> {
        let outbound = OutboundRequest {
            method: Method::POST,
            url: self.url(REFRESH_PATH),
            bearer: None,
            body: RequestBody::Json(serde_json::json!({ "refresh": refresh })),
            options: RequestOptions::anonymous(),
        };
        let raw = self
            .transport
            .send(outbound)
            .await
            .map_err(RefreshError::Transport)?;

        if !raw.status.is_success() {
            let body = String::from_utf8_lossy(&raw.body);
            return Err(RefreshError::Rejected {
                status: raw.status,
                body: ApiError::truncate_body(&body),
            });
        }

        let tokens: RefreshResponse = serde_json::from_slice(&raw.body)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        if tokens.access.is_empty() {
            return Err(RefreshError::InvalidResponse("empty access token".to_string()));
        }
        Ok(tokens)
    }
}
