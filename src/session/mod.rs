//! Client-side session lifecycle.
//!
//! This module owns everything between "the user typed a password" and
//! "the UI knows who is logged in and with which role":
//!
//! - **store**: durable `token` / `user` entries
//! - **claims**: unverified decoding of the role claim inside a JWT
//! - **api**: the three auth endpoints (`login`, `register`, current user)
//! - **resolver**: turns a stored token into a confirmed profile
//! - **context**: the state machine consumers read and subscribe to
//!
//! ## Role model
//!
//! The token's role claim is only a fallback. When the server reports a
//! role, the server wins (unless [`RolePrecedence::ClaimPreferred`] is
//! configured). A claim that cannot be decoded counts as `user`.
//!
//! ## Failure model
//!
//! - Credential errors from `login`/`register` are returned to the caller.
//! - Failing to resolve the current user logs out silently.
//! - A corrupt cached profile reads as absent.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(FileTokenStore::new(&config.store_path));
//! let api = Arc::new(HttpAuthApi::new(&config)?);
//! let ctx = AuthContext::init(store, api, AuthOptions::from(&config));
//! ctx.bootstrap().await;
//!
//! if ctx.is_admin() {
//!     // show the admin panel
//! }
//! ```

pub mod api;
pub mod claims;
mod context;
mod error;
mod resolver;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{AuthApi, AuthResponse, HttpAuthApi, UserPayload};
pub use context::{AuthContext, AuthOptions, AuthPhase, AuthState};
pub use error::{ApiError, AuthError, ResolveError, StoreError};
pub use resolver::{RolePrecedence, SessionResolver, reconcile_role};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
