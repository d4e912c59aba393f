//! HTTP client for the auth endpoints.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::session::error::ApiError;
use crate::types::{Email, Role, SessionToken, UserId, UserProfile};

pub const LOGIN_PATH: &str = "api/auth/login";
pub const REGISTER_PATH: &str = "api/auth/register";
pub const CURRENT_USER_PATH: &str = "api/auth/user";

/// Boxed future returned by [`AuthApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// The three calls the session layer makes against the server.
pub trait AuthApi: Send + Sync {
    fn login<'a>(&'a self, email: &'a str, password: &'a str) -> ApiFuture<'a, AuthResponse>;

    fn register<'a>(
        &'a self,
        name: &'a str,
        email: &'a str,
        password: &'a str,
    ) -> ApiFuture<'a, AuthResponse>;

    /// `GET` the user the bearer token belongs to.
    fn current_user<'a>(&'a self, token: &'a SessionToken) -> ApiFuture<'a, UserPayload>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Body of a successful login or register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserPayload,
}

/// User document as the server sends it.
///
/// The identifier may arrive as `id` or `_id`; the role may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(default, rename = "_id", skip_serializing_if = "Option::is_none")]
    pub object_id: Option<UserId>,
    pub name: String,
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserPayload {
    /// The non-empty server role, if any.
    pub fn server_role(&self) -> Option<&str> {
        self.role.as_deref().filter(|r| !r.trim().is_empty())
    }

    /// Build a profile once the role has been decided.
    pub fn into_profile(self, role: Role) -> Result<UserProfile, ApiError> {
        let id = self
            .id
            .filter(|id| !id.as_str().is_empty())
            .or(self.object_id)
            .filter(|id| !id.as_str().is_empty())
            .ok_or_else(|| ApiError::Decode("user document has no id".to_string()))?;

        Ok(UserProfile {
            id,
            name: self.name,
            email: self.email,
            role,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error", alias = "msg")]
    message: Option<String>,
}

/// [`AuthApi`] over HTTP.
///
/// Every request is bounded by the configured timeout. Only the current
/// user lookup is retried; login and register are not idempotent.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    base_url: Url,
    client: reqwest::Client,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpAuthApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut base_url = Url::parse(&config.api_base_url)
            .map_err(|e| ApiError::Network(format!("Invalid base URL: {}", e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Network(format!("Invalid endpoint {}: {}", path, e)))
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<AuthResponse, ApiError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let auth: AuthResponse = read_json(response).await?;
        if auth.token.is_empty() {
            return Err(ApiError::Decode("response carries an empty token".to_string()));
        }
        Ok(auth)
    }

    async fn get_current_user_once(&self, token: &SessionToken) -> Result<UserPayload, ApiError> {
        let url = self.endpoint(CURRENT_USER_PATH)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(map_transport_error)?;

        read_json(response).await
    }

    async fn get_current_user(&self, token: &SessionToken) -> Result<UserPayload, ApiError> {
        let mut attempt = 0;
        loop {
            match self.get_current_user_once(token).await {
                Ok(user) => return Ok(user),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "Current user lookup failed ({}), retry {}/{} in {:?}",
                        e, attempt, self.max_retries, self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl AuthApi for HttpAuthApi {
    fn login<'a>(&'a self, email: &'a str, password: &'a str) -> ApiFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.post_json(LOGIN_PATH, &LoginRequest { email, password })
                .await
        })
    }

    fn register<'a>(
        &'a self,
        name: &'a str,
        email: &'a str,
        password: &'a str,
    ) -> ApiFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.post_json(
                REGISTER_PATH,
                &RegisterRequest {
                    name,
                    email,
                    password,
                },
            )
            .await
        })
    }

    fn current_user<'a>(&'a self, token: &'a SessionToken) -> ApiFuture<'a, UserPayload> {
        Box::pin(self.get_current_user(token))
    }
}

fn map_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(err.to_string())
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await.map_err(map_transport_error)?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status,
            message: error_message(&body, status),
        });
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn error_message(body: &str, status: http::StatusCode) -> String {
    if let Ok(ErrorBody {
        message: Some(message),
    }) = serde_json::from_str::<ErrorBody>(body)
    {
        return message;
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 200 && !trimmed.starts_with('<') {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
}
