//! NewType wrappers and shared identity types.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing an email where a user ID is expected).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

newtype_string!(
    /// Server-assigned user identifier.
    ///
    /// The server may send it as `id` or as a document-style `_id`; both
    /// land here unchanged.
    UserId
);

newtype_string!(
    /// Email address used as the login identifier.
    Email
);

/// Opaque bearer credential issued by the server.
///
/// `Debug` is redacted so that state snapshots can be logged safely.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Create a new token.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the raw token for use as a bearer credential.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume and return the inner String.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken(<{} bytes>)", self.0.len())
    }
}

/// Privilege level of a user.
///
/// Anything other than `admin` is treated as `user`, so an unexpected
/// value never grants elevated access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    /// Parse a role string, mapping unknown values to `Role::User`.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::User
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::parse_lenient(&s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated user as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    #[serde(default)]
    pub role: Role,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_creation() {
        let id = UserId::new("65f0c2a1");
        assert_eq!(id.as_str(), "65f0c2a1");
        assert_eq!(id.to_string(), "65f0c2a1");
    }

    #[test]
    fn test_user_id_from_string() {
        let id: UserId = "abc".into();
        assert_eq!(id.as_str(), "abc");

        let id: UserId = String::from("xyz").into();
        assert_eq!(id.into_inner(), "xyz");
    }

    #[test]
    fn test_email_serde_is_transparent() {
        let email = Email::new("a@b.com");
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"a@b.com\"");

        let parsed: Email = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, email);
    }

    #[test]
    fn test_session_token_debug_is_redacted() {
        let token = SessionToken::new("secret.jwt.value");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("16 bytes"));
    }

    #[test]
    fn test_role_parse_lenient() {
        assert_eq!(Role::parse_lenient("admin"), Role::Admin);
        assert_eq!(Role::parse_lenient(" Admin "), Role::Admin);
        assert_eq!(Role::parse_lenient("user"), Role::User);
        assert_eq!(Role::parse_lenient("superuser"), Role::User);
        assert_eq!(Role::parse_lenient(""), Role::User);
    }

    #[test]
    fn test_role_serde() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"root\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_profile_role_defaults_to_user() {
        let json = r#"{"id":"1","name":"A","email":"a@b.com"}"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.role, Role::User);
        assert!(!profile.is_admin());
    }
}
