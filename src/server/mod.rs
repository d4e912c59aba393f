//! Reference auth server.
//!
//! Serves the login/register/current-user endpoints the session layer talks
//! to, plus health routes and an admin-only user listing. Users live in
//! memory; tokens are HS256 JWTs carrying a `role` claim.

mod directory;
mod error;
mod tokens;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::{FromRequestParts, Json, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, request::Parts},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub use directory::{SeedOutcome, UserDirectory, UserRecord, UserSummary};
pub use error::ServerError;
pub use tokens::{SessionClaims, TokenIssuer};

use crate::session::{AuthResponse, UserPayload};
use crate::types::{Role, UserId};

pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Header accepted alongside `Authorization: Bearer`.
pub const TOKEN_HEADER: &str = "x-auth-token";

/// Account created (or promoted) when the server starts.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub admin: Option<AdminSeed>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            jwt_secret: String::new(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            admin: None,
        }
    }
}

/// Shared state behind every handler.
pub struct AuthServer {
    directory: UserDirectory,
    tokens: TokenIssuer,
    started_at: Instant,
}

pub type AppState = Arc<AuthServer>;

impl AuthServer {
    /// Build the server state and seed the admin account if one is configured.
    pub async fn start(config: &ServerConfig) -> anyhow::Result<AppState> {
        if config.jwt_secret.is_empty() {
            anyhow::bail!("JWT secret must not be empty");
        }
        if config.token_ttl_hours <= 0 {
            anyhow::bail!("token_ttl_hours must be positive");
        }

        let server = AuthServer {
            directory: UserDirectory::new(),
            tokens: TokenIssuer::new(config.jwt_secret.as_bytes(), config.token_ttl_hours),
            started_at: Instant::now(),
        };

        if let Some(seed) = &config.admin {
            let outcome = server
                .directory
                .seed_admin(&seed.name, &seed.email, &seed.password)
                .await;
            debug!("Admin seed: {:?}", outcome);
        }

        Ok(Arc::new(server))
    }

    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    fn auth_response(&self, record: &UserRecord) -> Result<AuthResponse, ServerError> {
        let token = self.tokens.issue(&record.id, record.role)?;
        Ok(AuthResponse {
            token: token.into_inner(),
            user: user_payload(record),
        })
    }
}

/// Bind `config.bind` and serve until the process stops.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = AuthServer::start(&config).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Auth server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/user", get(current_user))
        .route("/api/admin/users", get(list_users))
        .fallback(route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn user_payload(record: &UserRecord) -> UserPayload {
    UserPayload {
        id: Some(record.id.clone()),
        object_id: None,
        name: record.name.clone(),
        email: record.email.clone(),
        role: Some(record.role.as_str().to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    body.map(|Json(inner)| inner)
        .map_err(|e| ServerError::BadRequest(format!("Invalid request body: {}", e.body_text())))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

async fn root() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Finance Tracker API is running!",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Json<AuthResponse>, ServerError> {
    let body = json_body(body)?;
    let (Some(email), Some(password)) = (non_empty(body.email), non_empty(body.password)) else {
        return Err(ServerError::BadRequest(
            "Please provide email and password".to_string(),
        ));
    };

    let record = state.directory.authenticate(&email, &password).await.inspect_err(|_| {
        debug!("Rejected login attempt");
    })?;
    info!(user_id = %record.id, "User logged in");

    Ok(Json(state.auth_response(&record)?))
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    let body = json_body(body)?;
    let record = state
        .directory
        .register(
            body.name.as_deref().unwrap_or_default(),
            body.email.as_deref().unwrap_or_default(),
            body.password.as_deref().unwrap_or_default(),
        )
        .await?;
    info!(user_id = %record.id, "User registered");

    Ok((StatusCode::CREATED, Json(state.auth_response(&record)?)))
}

async fn current_user(caller: Caller) -> Json<UserPayload> {
    Json(user_payload(&caller.0))
}

async fn list_users(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<Value>, ServerError> {
    // The stored role decides, not the claim in a possibly older token.
    if caller.0.role != Role::Admin {
        warn!(user_id = %caller.0.id, "Non-admin requested the user list");
        return Err(ServerError::Forbidden("Admin access required".to_string()));
    }

    let users = state.directory.list().await;
    Ok(Json(serde_json::json!({
        "users": users,
        "count": users.len(),
    })))
}

async fn route_not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "message": "Route not found" })),
    )
}

/// The user behind a valid bearer token.
struct Caller(UserRecord);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ServerError::Unauthorized("No token, authorization denied".to_string()))?;
        let claims = state.tokens.verify(token)?;

        // Tokens for accounts that no longer exist are as good as invalid.
        state
            .directory
            .get(&UserId::new(claims.sub))
            .await
            .map(Caller)
            .ok_or_else(|| ServerError::Unauthorized("Token is not valid".to_string()))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION)
        && let Ok(value) = value.to_str()
        && let Some(token) = value.strip_prefix("Bearer ")
    {
        let token = token.trim();
        return (!token.is_empty()).then_some(token);
    }

    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
