//! Turns a stored token into a confirmed user profile.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::api::{AuthApi, UserPayload};
use crate::session::claims;
use crate::session::error::{ApiError, ResolveError};
use crate::types::{Role, SessionToken, UserProfile};

/// Which source decides the role when the token claim and the server
/// disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolePrecedence {
    /// Server role if present, else the token claim, else `user`.
    #[default]
    ServerWins,
    /// Token claim if the token carries one, else the server role, else `user`.
    ClaimPreferred,
}

/// Decide the effective role.
pub fn reconcile_role(
    server_role: Option<&str>,
    claim_role: Option<Role>,
    precedence: RolePrecedence,
) -> Role {
    let server_role = server_role
        .filter(|r| !r.trim().is_empty())
        .map(Role::parse_lenient);

    let role = match precedence {
        RolePrecedence::ServerWins => server_role.or(claim_role),
        RolePrecedence::ClaimPreferred => claim_role.or(server_role),
    };
    role.unwrap_or_default()
}

/// Resolves tokens against the "current user" endpoint.
#[derive(Clone)]
pub struct SessionResolver {
    api: Arc<dyn AuthApi>,
    precedence: RolePrecedence,
}

impl SessionResolver {
    pub fn new(api: Arc<dyn AuthApi>, precedence: RolePrecedence) -> Self {
        Self { api, precedence }
    }

    /// Build a profile from a server document and the token that came with it.
    pub fn profile_from_payload(
        &self,
        payload: UserPayload,
        token: &SessionToken,
    ) -> Result<UserProfile, ApiError> {
        let claim_role = claims::role_claim(token.as_str());
        let role = reconcile_role(payload.server_role(), claim_role, self.precedence);
        payload.into_profile(role)
    }

    /// Confirm the identity behind `token`.
    ///
    /// Any failure is reported as-is; the caller decides to end the session.
    pub async fn resolve(&self, token: &SessionToken) -> Result<UserProfile, ResolveError> {
        if token.is_empty() {
            return Err(ResolveError::MissingToken);
        }

        let claim_role = claims::role_claim(token.as_str());
        debug!(claim_role = ?claim_role, "Resolving session");

        let payload = self.api.current_user(token).await?;
        let role = reconcile_role(payload.server_role(), claim_role, self.precedence);
        let profile = payload.into_profile(role)?;

        debug!(user_id = %profile.id, role = %profile.role, "Session resolved");
        Ok(profile)
    }
}
