//! In-memory user directory for the reference server.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::server::error::ServerError;
use crate::types::{Email, Role, UserId};

pub const MIN_PASSWORD_LEN: usize = 6;

/// A stored account. Passwords are kept as salted SHA-256 only.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    password_salt: String,
    password_hash: String,
}

impl UserRecord {
    fn password_matches(&self, password: &str) -> bool {
        hash_password(&self.password_salt, password) == self.password_hash
    }
}

/// Admin listing entry, without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// What seeding the admin account did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    Promoted,
    Unchanged,
}

#[derive(Default)]
struct Users {
    by_id: HashMap<UserId, UserRecord>,
    by_email: HashMap<String, UserId>,
}

#[derive(Default)]
pub struct UserDirectory {
    users: RwLock<Users>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with the `user` role.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, ServerError> {
        let name = name.trim();
        let email = normalize_email(email);

        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(ServerError::BadRequest(
                "Please provide name, email and password".to_string(),
            ));
        }
        if !looks_like_email(&email) {
            return Err(ServerError::BadRequest("Please provide a valid email".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ServerError::BadRequest(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let mut users = self.users.write().await;
        if users.by_email.contains_key(&email) {
            return Err(ServerError::BadRequest("User already exists".to_string()));
        }

        let record = new_record(name, &email, password, Role::User);
        users.by_email.insert(email, record.id.clone());
        users.by_id.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    /// Check credentials. Unknown email and wrong password look the same.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<UserRecord, ServerError> {
        let email = normalize_email(email);
        let users = self.users.read().await;

        users
            .by_email
            .get(&email)
            .and_then(|id| users.by_id.get(id))
            .filter(|record| record.password_matches(password))
            .cloned()
            .ok_or_else(|| ServerError::Unauthorized("Invalid credentials".to_string()))
    }

    pub async fn get(&self, id: &UserId) -> Option<UserRecord> {
        self.users.read().await.by_id.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<UserSummary> {
        let users = self.users.read().await;
        let mut list: Vec<UserSummary> = users
            .by_id
            .values()
            .map(|u| UserSummary {
                id: u.id.clone(),
                name: u.name.clone(),
                email: u.email.clone(),
                role: u.role,
                created_at: u.created_at,
            })
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.as_str().cmp(b.email.as_str())));
        list
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.by_id.len()
    }

    /// Make sure an admin account exists for `email`.
    ///
    /// An existing non-admin account with that email is promoted; its
    /// password is left as it was.
    pub async fn seed_admin(&self, name: &str, email: &str, password: &str) -> SeedOutcome {
        let email = normalize_email(email);
        let mut users = self.users.write().await;

        if let Some(id) = users.by_email.get(&email).cloned()
            && let Some(existing) = users.by_id.get_mut(&id)
        {
            if existing.role == Role::Admin {
                return SeedOutcome::Unchanged;
            }
            existing.role = Role::Admin;
            info!(user_id = %existing.id, "Existing user promoted to admin");
            return SeedOutcome::Promoted;
        }

        let record = new_record(name, &email, password, Role::Admin);
        info!(user_id = %record.id, "Admin user created");
        users.by_email.insert(email, record.id.clone());
        users.by_id.insert(record.id.clone(), record);
        SeedOutcome::Created
    }
}

fn new_record(name: &str, email: &str, password: &str, role: Role) -> UserRecord {
    let salt = Uuid::new_v4().simple().to_string();
    UserRecord {
        id: UserId::new(Uuid::new_v4().simple().to_string()),
        name: name.to_string(),
        email: Email::new(email),
        role,
        created_at: Utc::now(),
        password_hash: hash_password(&salt, password),
        password_salt: salt,
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let dir = UserDirectory::new();
        let created = dir.register("A", "A@B.com ", "secret1").await.unwrap();
        assert_eq!(created.email.as_str(), "a@b.com");
        assert_eq!(created.role, Role::User);

        let found = dir.authenticate("a@b.com", "secret1").await.unwrap();
        assert_eq!(found.id, created.id);

        let err = dir.authenticate("a@b.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ServerError::Unauthorized(_)));
        let err = dir.authenticate("nobody@b.com", "secret1").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let dir = UserDirectory::new();
        assert!(matches!(
            dir.register("", "a@b.com", "secret1").await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            dir.register("A", "not-an-email", "secret1").await,
            Err(ServerError::BadRequest(_))
        ));
        assert!(matches!(
            dir.register("A", "a@b.com", "123").await,
            Err(ServerError::BadRequest(_))
        ));

        dir.register("A", "a@b.com", "secret1").await.unwrap();
        let err = dir.register("B", "a@b.com", "secret2").await.unwrap_err();
        assert_eq!(err.to_string(), "User already exists");
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn test_seed_admin_creates_then_is_stable() {
        let dir = UserDirectory::new();
        assert_eq!(dir.seed_admin("Admin", "admin@example.com", "pw").await, SeedOutcome::Created);
        assert_eq!(dir.seed_admin("Admin", "admin@example.com", "pw").await, SeedOutcome::Unchanged);

        let admin = dir.authenticate("admin@example.com", "pw").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_seed_admin_promotes_existing_user() {
        let dir = UserDirectory::new();
        let user = dir.register("Boss", "boss@example.com", "secret1").await.unwrap();

        assert_eq!(dir.seed_admin("Admin", "boss@example.com", "other").await, SeedOutcome::Promoted);

        let promoted = dir.get(&user.id).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);
        // Original password still works.
        assert!(dir.authenticate("boss@example.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn test_salts_differ() {
        let dir = UserDirectory::new();
        let a = dir.register("A", "a@b.com", "secret1").await.unwrap();
        let b = dir.register("B", "b@b.com", "secret1").await.unwrap();
        assert_ne!(a.password_hash, b.password_hash);
    }
}
