//! API client for the cloud-storage REST API.
//!
//! This module provides the `ApiClient` struct with one method per endpoint:
//! authentication, file management, share links and user administration.
//! All calls go through the [`Gateway`], so an expired access token is
//! refreshed transparently.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use super::gateway::{Gateway, RefreshPolicy};
use super::transport::{
    FilePart, ProgressFn, ReqwestTransport, RequestBody, RequestOptions, Response, Transport,
};
use super::ApiError;
use crate::auth::Session;
use crate::models::{LoginRequest, RegisterRequest, ShareInfo, StoredFile, TokenPair, User};

/// Default base URL of the storage API
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A file fetched from the API.
#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// API client for the storage service.
/// Clone is cheap - the gateway and session are shared.
#[derive(Clone)]
pub struct ApiClient {
    gateway: Arc<Gateway>,
}

impl ApiClient {
    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>, session: Session) -> Self {
        Self::from_gateway(Gateway::new(base_url, transport, session))
    }

    pub fn from_gateway(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }

    /// Build a client with an explicit timeout and refresh policy
    pub fn configured(
        base_url: &str,
        session: Session,
        timeout: Duration,
        policy: RefreshPolicy,
    ) -> Result<Self> {
        let transport =
            ReqwestTransport::new(timeout).context("Failed to build HTTP client")?;
        let gateway = Gateway::new(base_url, Arc::new(transport), session).with_refresh_policy(policy);
        Ok(Self::from_gateway(gateway))
    }

    pub fn session(&self) -> &Session {
        self.gateway.session()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Check if response is successful, returning an error with body if not.
    fn check_response(response: Response) -> Result<Response> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status(), &response.text()).into())
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<Response> {
        let response = self
            .gateway
            .request(method.clone(), path, body, options)
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, path))?;
        Self::check_response(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<T> {
        let response = self.send(method, path, body, options).await?;
        response
            .json()
            .with_context(|| format!("Failed to parse JSON response from {}", path))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(Method::GET, path, RequestBody::Empty, RequestOptions::default())
            .await
    }

    async fn download(&self, path: &str, options: RequestOptions) -> Result<Download> {
        let response = self.send(Method::GET, path, RequestBody::Empty, options).await?;
        Ok(Download {
            file_name: response.attachment_filename(),
            bytes: response.into_bytes(),
        })
    }

    // ===== Authentication =====

    /// Log in and store the issued token pair in the session
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let body = serde_json::to_value(LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        let tokens: TokenPair = self
            .send_json(
                Method::POST,
                "/auth/login/",
                RequestBody::Json(body),
                RequestOptions::anonymous(),
            )
            .await
            .context("Login failed")?;

        self.session().establish(tokens)?;
        info!(username = username, "Logged in");
        self.current_user().await
    }

    /// Create an account, then log in with it
    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let body = serde_json::to_value(request)?;
        self.send(
            Method::POST,
            "/auth/register/",
            RequestBody::Json(body),
            RequestOptions::anonymous(),
        )
        .await
        .context("Registration failed")?;

        debug!(username = %request.username, "Registered, logging in");
        self.login(&request.username, &request.password).await
    }

    /// Invalidate the refresh token on the server. Local tokens are cleared
    /// whether or not the server call succeeds.
    pub async fn logout(&self) -> Result<()> {
        let refresh = self.session().refresh_token();
        let result = match refresh {
            Some(refresh) => self
                .send(
                    Method::POST,
                    "/auth/logout/",
                    RequestBody::Json(json!({ "refresh": refresh })),
                    RequestOptions::default(),
                )
                .await
                .map(|_| ()),
            None => Ok(()),
        };

        if let Err(ref e) = result {
            warn!(error = %e, "Logout request failed");
        }
        self.session().logout();
        result.context("Logout failed")
    }

    pub async fn current_user(&self) -> Result<User> {
        self.get("/auth/me/").await
    }

    // ===== Files =====

    /// List the caller's files, or another user's when an admin passes `user_id`
    pub async fn list_files(&self, user_id: Option<i64>) -> Result<Vec<StoredFile>> {
        let mut options = RequestOptions::default();
        if let Some(id) = user_id {
            options = options.with_query("user_id", id);
        }
        self.send_json(Method::GET, "/api/files/", RequestBody::Empty, options)
            .await
    }

    pub async fn get_file(&self, file_id: i64) -> Result<StoredFile> {
        self.get(&format!("/api/files/{}/", file_id)).await
    }

    /// Upload bytes as a new file. The server may rename it to avoid a clash.
    pub async fn upload_file(
        &self,
        file_name: &str,
        bytes: Bytes,
        comment: &str,
        progress: Option<ProgressFn>,
    ) -> Result<StoredFile> {
        let size = bytes.len();
        let body = RequestBody::Multipart {
            file: FilePart {
                field: "file".to_string(),
                file_name: file_name.to_string(),
                bytes,
            },
            fields: vec![("comment".to_string(), comment.to_string())],
        };
        let mut options = RequestOptions::default();
        if let Some(progress) = progress {
            options = options.with_progress(progress);
        }

        let file: StoredFile = self
            .send_json(Method::POST, "/api/files/", body, options)
            .await
            .with_context(|| format!("Failed to upload {}", file_name))?;
        info!(file_id = file.id, size = size, "Uploaded file");
        Ok(file)
    }

    /// Read a local file and upload it under its own name
    pub async fn upload_path(
        &self,
        path: &Path,
        comment: &str,
        progress: Option<ProgressFn>,
    ) -> Result<StoredFile> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.upload_file(&file_name, Bytes::from(bytes), comment, progress)
            .await
    }

    pub async fn update_comment(&self, file_id: i64, comment: &str) -> Result<StoredFile> {
        self.send_json(
            Method::PATCH,
            &format!("/api/files/{}/update_comment/", file_id),
            RequestBody::Json(json!({ "comment": comment })),
            RequestOptions::default(),
        )
        .await
    }

    pub async fn delete_file(&self, file_id: i64) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("/api/files/{}/", file_id),
            RequestBody::Empty,
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Delete any user's file (admin only)
    pub async fn admin_delete_file(&self, file_id: i64) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("/api/files/{}/admin_delete/", file_id),
            RequestBody::Empty,
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn download_file(&self, file_id: i64, progress: Option<ProgressFn>) -> Result<Download> {
        let mut options = RequestOptions::binary();
        if let Some(progress) = progress {
            options = options.with_progress(progress);
        }
        self.download(&format!("/api/files/{}/download/", file_id), options)
            .await
    }

    // ===== Share links =====

    /// The opaque share token for a file
    pub async fn share_link(&self, file_id: i64) -> Result<String> {
        Ok(self.get_file(file_id).await?.share_link)
    }

    /// Public metadata for a share link; no login needed
    pub async fn share_info(&self, share_link: &str) -> Result<ShareInfo> {
        self.send_json(
            Method::GET,
            &format!("/api/files/share/{}/info/", share_link),
            RequestBody::Empty,
            RequestOptions::anonymous(),
        )
        .await
    }

    /// Download through a share link; no login needed
    pub async fn download_shared(&self, share_link: &str) -> Result<Download> {
        let options = RequestOptions {
            anonymous: true,
            ..RequestOptions::binary()
        };
        self.download(&format!("/api/files/share/{}/", share_link), options)
            .await
    }

    // ===== Administration =====

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.get("/api/users/").await
    }

    pub async fn user_files(&self, user_id: i64) -> Result<Vec<StoredFile>> {
        self.get(&format!("/api/users/{}/files/", user_id)).await
    }

    pub async fn set_admin(&self, user_id: i64, is_admin: bool) -> Result<User> {
        self.send_json(
            Method::PATCH,
            &format!("/api/users/{}/set_admin/", user_id),
            RequestBody::Json(json!({ "is_staff": is_admin })),
            RequestOptions::default(),
        )
        .await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<()> {
        self.send(
            Method::DELETE,
            &format!("/api/users/{}/", user_id),
            RequestBody::Empty,
            RequestOptions::default(),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::is_session_expired;
    use crate::api::testing::{binary_response, json_response, status_response, FakeTransport};
    use crate::auth::{Credentials, MemoryTokenStorage};
    use reqwest::StatusCode;

    const USER_JSON: &str = r#"{"id": 3, "username": "alice", "email": "alice@example.com", "first_name": "Alice", "last_name": "", "is_admin": false, "is_staff": false, "total_file_size": 10, "files_count": 1, "date_joined": "2024-03-01T10:15:00Z"}"#;

    const FILE_JSON: &str = r#"{"id": 7, "owner": null, "original_name": "notes.txt", "storage_path": "user_3/abc.txt", "size": 10, "upload_date": "2024-05-12T08:30:00Z", "last_download": null, "comment": "", "share_link": "0b7c", "download_url": null, "share_url": null}"#;

    fn client(transport: &Arc<FakeTransport>, credentials: Credentials) -> ApiClient {
        let session =
            Session::load(Box::new(MemoryTokenStorage::with_credentials(credentials))).unwrap();
        ApiClient::with_transport("http://vault.test", transport.clone(), session)
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_fetches_profile() {
        let transport = Arc::new(FakeTransport::new(|req| {
            Ok(match req.url.as_str() {
                "http://vault.test/auth/login/" => {
                    json_response(StatusCode::OK, r#"{"access": "acc-1", "refresh": "ref-1"}"#)
                }
                "http://vault.test/auth/me/" => json_response(StatusCode::OK, USER_JSON),
                _ => status_response(StatusCode::NOT_FOUND),
            })
        }));
        let api = client(&transport, Credentials::default());

        let user = api.login("alice", "s3cret").await.unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(api.session().credentials(), Credentials::new("acc-1", "ref-1"));
        let sent = transport.requests();
        assert_eq!(sent[0].bearer, None);
        match &sent[0].body {
            RequestBody::Json(v) => {
                assert_eq!(v["username"], "alice");
                assert_eq!(v["password"], "s3cret");
            }
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(sent[1].bearer.as_deref(), Some("acc-1"));
    }

    #[tokio::test]
    async fn test_login_failure_leaves_session_untouched() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(
                StatusCode::UNAUTHORIZED,
                r#"{"detail": "No active account found with the given credentials"}"#,
            ))
        }));
        let api = client(&transport, Credentials::default());

        let err = api.login("alice", "wrong").await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::Unauthorized)
        ));
        assert!(api.session().credentials().is_empty());
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_register_then_logs_in() {
        let transport = Arc::new(FakeTransport::new(|req| {
            Ok(match req.url.as_str() {
                "http://vault.test/auth/register/" => json_response(
                    StatusCode::CREATED,
                    r#"{"username": "alice", "email": "alice@example.com"}"#,
                ),
                "http://vault.test/auth/login/" => {
                    json_response(StatusCode::OK, r#"{"access": "acc", "refresh": "ref"}"#)
                }
                _ => json_response(StatusCode::OK, USER_JSON),
            })
        }));
        let api = client(&transport, Credentials::default());

        let user = api
            .register(&RegisterRequest {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "Str0ngPass!".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(user.id, 3);
        assert!(api.session().is_authenticated());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_register_validation_error() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(
                StatusCode::BAD_REQUEST,
                r#"{"username": ["A user with that username already exists."]}"#,
            ))
        }));
        let api = client(&transport, Credentials::default());

        let err = api.register(&RegisterRequest::default()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::BadRequest(_))
        ));
        assert!(!api.session().is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_clears_tokens_even_when_server_fails() {
        let transport = Arc::new(FakeTransport::always(StatusCode::INTERNAL_SERVER_ERROR));
        let api = client(&transport, Credentials::new("acc", "ref"));

        assert!(api.logout().await.is_err());

        assert!(api.session().credentials().is_empty());
        match &transport.requests()[0].body {
            RequestBody::Json(v) => assert_eq!(v["refresh"], "ref"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_files_passes_user_filter() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(StatusCode::OK, &format!("[{}]", FILE_JSON)))
        }));
        let api = client(&transport, Credentials::new("acc", "ref"));

        let files = api.list_files(Some(12)).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].original_name, "notes.txt");

        let files = api.list_files(None).await.unwrap();
        assert_eq!(files.len(), 1);

        let sent = transport.requests();
        assert_eq!(sent[0].url, "http://vault.test/api/files/");
        assert_eq!(
            sent[0].options.query,
            vec![("user_id".to_string(), "12".to_string())]
        );
        assert!(sent[1].options.query.is_empty());
    }

    #[tokio::test]
    async fn test_upload_sends_multipart_and_survives_refresh() {
        let transport = Arc::new(FakeTransport::new(|req| {
            if req.url.ends_with("/auth/refresh/") {
                return Ok(json_response(StatusCode::OK, r#"{"access": "fresh"}"#));
            }
            Ok(match req.bearer.as_deref() {
                Some("fresh") => json_response(StatusCode::CREATED, FILE_JSON),
                _ => status_response(StatusCode::UNAUTHORIZED),
            })
        }));
        let api = client(&transport, Credentials::new("expired", "ref"));

        let file = api
            .upload_file("notes.txt", Bytes::from_static(b"0123456789"), "draft", None)
            .await
            .unwrap();
        assert_eq!(file.id, 7);

        let sent = transport.requests();
        assert_eq!(sent.len(), 3);
        // The retried upload carries the full body again
        match &sent[2].body {
            RequestBody::Multipart { file, fields } => {
                assert_eq!(file.field, "file");
                assert_eq!(file.file_name, "notes.txt");
                assert_eq!(file.bytes.as_ref(), b"0123456789");
                assert_eq!(fields, &vec![("comment".to_string(), "draft".to_string())]);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_comment() {
        let transport = Arc::new(FakeTransport::new(|_| Ok(json_response(StatusCode::OK, FILE_JSON))));
        let api = client(&transport, Credentials::new("acc", "ref"));

        api.update_comment(7, "final version").await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].method, Method::PATCH);
        assert_eq!(sent[0].url, "http://vault.test/api/files/7/update_comment/");
        match &sent[0].body {
            RequestBody::Json(v) => assert_eq!(v["comment"], "final version"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_endpoints() {
        let transport = Arc::new(FakeTransport::always(StatusCode::NO_CONTENT));
        let api = client(&transport, Credentials::new("acc", "ref"));

        api.delete_file(7).await.unwrap();
        api.admin_delete_file(8).await.unwrap();
        api.delete_user(3).await.unwrap();

        let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(
            urls,
            vec![
                "http://vault.test/api/files/7/",
                "http://vault.test/api/files/8/admin_delete/",
                "http://vault.test/api/users/3/",
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_forbidden_maps_to_access_denied() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(json_response(
                StatusCode::FORBIDDEN,
                r#"{"detail": "You do not have permission to perform this action."}"#,
            ))
        }));
        let api = client(&transport, Credentials::new("acc", "ref"));

        let err = api.admin_delete_file(8).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_download_returns_bytes_and_name() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(binary_response(b"\x00\x01binary", "report.pdf"))
        }));
        let api = client(&transport, Credentials::new("acc", "ref"));

        let download = api.download_file(7, None).await.unwrap();

        assert_eq!(download.file_name.as_deref(), Some("report.pdf"));
        assert_eq!(download.bytes.as_ref(), b"\x00\x01binary");
        let sent = transport.requests();
        assert_eq!(sent[0].options.response_kind, crate::api::ResponseKind::Binary);
        assert_eq!(sent[0].bearer.as_deref(), Some("acc"));
    }

    #[tokio::test]
    async fn test_share_endpoints_are_anonymous() {
        let transport = Arc::new(FakeTransport::new(|req| {
            Ok(if req.url.ends_with("/info/") {
                json_response(
                    StatusCode::OK,
                    r#"{"original_name": "notes.txt", "size": 10, "upload_date": "2024-05-12T08:30:00Z", "last_download": null, "comment": ""}"#,
                )
            } else {
                binary_response(b"hello", "notes.txt")
            })
        }));
        let api = client(&transport, Credentials::new("acc", "ref"));

        let info = api.share_info("0b7c").await.unwrap();
        assert_eq!(info.original_name, "notes.txt");
        let download = api.download_shared("0b7c").await.unwrap();
        assert_eq!(download.bytes.as_ref(), b"hello");

        let sent = transport.requests();
        assert_eq!(sent[0].url, "http://vault.test/api/files/share/0b7c/info/");
        assert_eq!(sent[1].url, "http://vault.test/api/files/share/0b7c/");
        assert!(sent.iter().all(|r| r.bearer.is_none()));
    }

    #[tokio::test]
    async fn test_share_link_from_file() {
        let transport = Arc::new(FakeTransport::new(|_| Ok(json_response(StatusCode::OK, FILE_JSON))));
        let api = client(&transport, Credentials::new("acc", "ref"));
        assert_eq!(api.share_link(7).await.unwrap(), "0b7c");
        assert_eq!(transport.requests()[0].url, "http://vault.test/api/files/7/");
    }

    #[tokio::test]
    async fn test_set_admin() {
        let transport = Arc::new(FakeTransport::new(|_| Ok(json_response(StatusCode::OK, USER_JSON))));
        let api = client(&transport, Credentials::new("acc", "ref"));

        api.set_admin(3, true).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].url, "http://vault.test/api/users/3/set_admin/");
        match &sent[0].body {
            RequestBody::Json(v) => assert_eq!(v["is_staff"], true),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_session_expiry_is_detectable() {
        let transport = Arc::new(FakeTransport::new(|req| {
            Ok(if req.url.ends_with("/auth/refresh/") {
                json_response(StatusCode::UNAUTHORIZED, r#"{"detail": "Token is blacklisted"}"#)
            } else {
                status_response(StatusCode::UNAUTHORIZED)
            })
        }));
        let api = client(&transport, Credentials::new("expired", "stale"));

        let err = api.list_users().await.unwrap_err();

        assert!(is_session_expired(&err));
        assert!(api.session().credentials().is_empty());
    }
}
