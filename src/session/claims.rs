//! Local decoding of JWT claims.
//!
//! Nothing here verifies a signature. The result is a hint for rendering
//! before the server has answered, never a grant of privilege on its own.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::types::Role;

/// Claims the client cares about.
///
/// Tokens either carry `role` at the top level or nest it under `user`,
/// depending on how the server built the payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenClaims {
    pub sub: Option<String>,
    pub role: Option<String>,
    pub user: Option<NestedUserClaim>,
    pub exp: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NestedUserClaim {
    pub id: Option<String>,
    pub role: Option<String>,
}

impl TokenClaims {
    /// The role claim, if the token carries a non-empty one.
    pub fn role(&self) -> Option<Role> {
        self.role
            .as_deref()
            .or_else(|| self.user.as_ref().and_then(|u| u.role.as_deref()))
            .filter(|r| !r.trim().is_empty())
            .map(Role::parse_lenient)
    }

    pub fn subject(&self) -> Option<&str> {
        self.sub
            .as_deref()
            .or_else(|| self.user.as_ref().and_then(|u| u.id.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// Not three dot-separated segments.
    Malformed,
    Header(String),
    Payload(String),
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "Token is not a JWT"),
            Self::Header(msg) => write!(f, "Invalid JWT header: {}", msg),
            Self::Payload(msg) => write!(f, "Invalid JWT payload: {}", msg),
        }
    }
}

impl std::error::Error for ClaimsError {}

/// Decode the payload of a JWT without verifying it.
///
/// The header must still parse as a JOSE header with an `alg` that
/// `jsonwebtoken` knows. Tokens using anything else, `none` included, are
/// rejected here, so their role claim is treated as absent.
pub fn decode_claims(token: &str) -> Result<TokenClaims, ClaimsError> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ClaimsError::Malformed);
    };

    jsonwebtoken::decode_header(token).map_err(|e| ClaimsError::Header(e.to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClaimsError::Payload(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Payload(e.to_string()))
}

/// Role claim carried by the token, or `None` when absent or unreadable.
pub fn role_claim(token: &str) -> Option<Role> {
    decode_claims(token).ok().and_then(|claims| claims.role())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::unsigned_jwt;
    use serde_json::json;

    #[test]
    fn test_top_level_role_claim() {
        let token = unsigned_jwt(json!({"sub": "1", "role": "admin", "exp": 1_900_000_000u64}));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.role(), Some(Role::Admin));
        assert_eq!(claims.subject(), Some("1"));
        assert_eq!(claims.exp, Some(1_900_000_000));
    }

    #[test]
    fn test_nested_role_claim() {
        let token = unsigned_jwt(json!({"user": {"id": "42", "role": "admin"}}));
        assert_eq!(role_claim(&token), Some(Role::Admin));
        assert_eq!(decode_claims(&token).unwrap().subject(), Some("42"));
    }

    #[test]
    fn test_missing_role_claim() {
        let token = unsigned_jwt(json!({"sub": "1"}));
        assert_eq!(role_claim(&token), None);

        let token = unsigned_jwt(json!({"sub": "1", "role": ""}));
        assert_eq!(role_claim(&token), None);
    }

    #[test]
    fn test_garbage_tokens_default_to_user() {
        assert_eq!(decode_claims("T1").unwrap_err(), ClaimsError::Malformed);
        assert_eq!(decode_claims("a.b.c.d").unwrap_err(), ClaimsError::Malformed);
        assert!(matches!(
            decode_claims("not.a.jwt"),
            Err(ClaimsError::Header(_))
        ));
        assert_eq!(role_claim(""), None);
        assert_eq!(role_claim("x.y.z"), None);
    }

    #[test]
    fn test_payload_that_is_not_json() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(b"role=admin");
        let token = format!("{}.{}.sig", header, payload);
        assert!(matches!(decode_claims(&token), Err(ClaimsError::Payload(_))));
        assert_eq!(role_claim(&token), None);
    }

    #[test]
    fn test_unrecognized_alg_hides_claim() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"role":"admin"}"#);
        let token = format!("{}.{}.", header, payload);
        assert!(matches!(decode_claims(&token), Err(ClaimsError::Header(_))));
        assert_eq!(role_claim(&token), None);
    }

    #[test]
    fn test_unknown_role_value_is_user() {
        let token = unsigned_jwt(json!({"role": "root"}));
        assert_eq!(role_claim(&token), Some(Role::User));
    }
}
