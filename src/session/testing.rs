//! Test doubles shared by the session tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http::StatusCode;
use tokio::sync::Notify;

use crate::session::api::{ApiFuture, AuthApi, AuthResponse, UserPayload};
use crate::session::error::ApiError;
use crate::types::{Email, SessionToken, UserId};

/// Build a structurally valid JWT with a bogus signature.
pub(crate) fn unsigned_jwt(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

pub(crate) fn payload(id: &str, role: Option<&str>) -> UserPayload {
    UserPayload {
        id: Some(UserId::new(id)),
        object_id: None,
        name: "A".to_string(),
        email: Email::new("a@b.com"),
        role: role.map(str::to_string),
    }
}

pub(crate) fn auth_response(token: &str, user: UserPayload) -> AuthResponse {
    AuthResponse {
        token: token.to_string(),
        user,
    }
}

fn unauthorized(message: &str) -> ApiError {
    ApiError::Status {
        status: StatusCode::UNAUTHORIZED,
        message: message.to_string(),
    }
}

/// A gate that holds a call until the test releases it.
#[derive(Clone, Default)]
pub(crate) struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Wait until a call is parked on the gate.
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

/// Scripted [`AuthApi`].
pub(crate) struct FakeAuthApi {
    login: Mutex<Result<AuthResponse, ApiError>>,
    register: Mutex<Result<AuthResponse, ApiError>>,
    current_user: Mutex<Result<UserPayload, ApiError>>,
    login_gate: Mutex<Option<Gate>>,
    current_user_gate: Mutex<Option<Gate>>,
    login_calls: AtomicUsize,
    current_user_calls: AtomicUsize,
    last_bearer: Mutex<Option<String>>,
}

impl FakeAuthApi {
    pub(crate) fn new() -> Self {
        Self {
            login: Mutex::new(Err(unauthorized("Invalid credentials"))),
            register: Mutex::new(Err(ApiError::Status {
                status: StatusCode::BAD_REQUEST,
                message: "User already exists".to_string(),
            })),
            current_user: Mutex::new(Err(unauthorized("Token is not valid"))),
            login_gate: Mutex::new(None),
            current_user_gate: Mutex::new(None),
            login_calls: AtomicUsize::new(0),
            current_user_calls: AtomicUsize::new(0),
            last_bearer: Mutex::new(None),
        }
    }

    pub(crate) fn with_login(self, response: Result<AuthResponse, ApiError>) -> Self {
        *self.login.lock().unwrap() = response;
        self
    }

    pub(crate) fn with_register(self, response: Result<AuthResponse, ApiError>) -> Self {
        *self.register.lock().unwrap() = response;
        self
    }

    pub(crate) fn with_current_user(self, response: Result<UserPayload, ApiError>) -> Self {
        *self.current_user.lock().unwrap() = response;
        self
    }

    pub(crate) fn set_login(&self, response: Result<AuthResponse, ApiError>) {
        *self.login.lock().unwrap() = response;
    }

    /// Park the next current-user calls until the returned gate is released.
    pub(crate) fn gate_current_user(&self) -> Gate {
        let gate = Gate::default();
        *self.current_user_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn gate_login(&self) -> Gate {
        let gate = Gate::default();
        *self.login_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn current_user_calls(&self) -> usize {
        self.current_user_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_bearer(&self) -> Option<String> {
        self.last_bearer.lock().unwrap().clone()
    }
}

impl AuthApi for FakeAuthApi {
    fn login<'a>(&'a self, _email: &'a str, _password: &'a str) -> ApiFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.login_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.pass().await;
            }
            self.login.lock().unwrap().clone()
        })
    }

    fn register<'a>(
        &'a self,
        _name: &'a str,
        _email: &'a str,
        _password: &'a str,
    ) -> ApiFuture<'a, AuthResponse> {
        Box::pin(async move { self.register.lock().unwrap().clone() })
    }

    fn current_user<'a>(&'a self, token: &'a SessionToken) -> ApiFuture<'a, UserPayload> {
        Box::pin(async move {
            self.current_user_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_bearer.lock().unwrap() = Some(token.as_str().to_string());
            let gate = self.current_user_gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.pass().await;
            }
            self.current_user.lock().unwrap().clone()
        })
    }
}
