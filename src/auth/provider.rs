//! User providers verifying first factor credentials
//!
//! The gate only depends on the `UserProvider` trait. `FileUserProvider`
//! is the bundled backend: a JSON users database with argon2 password hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::auth::user::UserDetails;
use crate::error::{GateError, Result};

/// Trait for first factor user backends
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Check a password; `Ok(false)` for wrong password or unknown user
    async fn check_user_password(&self, username: &str, password: &str) -> Result<bool>;

    /// Fetch the attributes stored for a user
    async fn get_details(&self, username: &str) -> Result<UserDetails>;
}

/// One entry of the users database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// argon2 PHC string
    pub password: String,
    #[serde(rename = "displayname", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl UserRecord {
    fn details(&self, username: &str) -> UserDetails {
        let mut emails = Vec::new();
        if let Some(ref email) = self.email {
            emails.push(email.clone());
        }
        emails.extend(self.emails.iter().filter(|e| Some(*e) != self.email.as_ref()).cloned());

        UserDetails {
            username: username.to_string(),
            display_name: self.display_name.clone().unwrap_or_else(|| username.to_string()),
            groups: self.groups.clone(),
            emails,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsersDatabase {
    users: HashMap<String, UserRecord>,
}

/// Hash a password into an argon2id PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GateError::UserProviderError(format!("Failed to hash password: {}", e)))
}

fn verify_password(hash: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| GateError::UserProviderError(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// JSON file backed user provider
pub struct FileUserProvider {
    users: HashMap<String, UserRecord>,
    /// Verified against for unknown users so a miss costs as much as a wrong password
    dummy_hash: String,
}

impl FileUserProvider {
    /// Build a provider from in-memory records
    pub fn new(users: HashMap<String, UserRecord>) -> Result<Self> {
        for (username, record) in &users {
            PasswordHash::new(&record.password).map_err(|e| {
                GateError::ConfigError(format!("Invalid password hash for user {}: {}", username, e))
            })?;
        }

        Ok(Self {
            users,
            dummy_hash: hash_password(&uuid::Uuid::new_v4().to_string())?,
        })
    }

    /// Load the users database from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GateError::ConfigError(format!("Failed to read users file '{}': {}", path.display(), e))
        })?;
        let database: UsersDatabase = serde_json::from_str(&content).map_err(|e| {
            GateError::ConfigError(format!("Failed to parse users file '{}': {}", path.display(), e))
        })?;

        Self::new(database.users)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl UserProvider for FileUserProvider {
    async fn check_user_password(&self, username: &str, password: &str) -> Result<bool> {
        let (hash, known) = match self.users.get(username) {
            Some(record) => (record.password.clone(), true),
            None => (self.dummy_hash.clone(), false),
        };
        let password = password.to_string();

        let valid = tokio::task::spawn_blocking(move || verify_password(&hash, &password))
            .await
            .map_err(|e| GateError::UserProviderError(format!("Password verification task failed: {}", e)))??;

        Ok(known && valid)
    }

    async fn get_details(&self, username: &str) -> Result<UserDetails> {
        self.users
            .get(username)
            .map(|record| record.details(username))
            .ok_or_else(|| GateError::UserNotFound(username.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> FileUserProvider {
        let mut users = HashMap::new();
        users.insert(
            "john".to_string(),
            UserRecord {
                password: hash_password("password").unwrap(),
                display_name: Some("John Doe".to_string()),
                email: Some("john.doe@example.com".to_string()),
                emails: vec!["jd@example.com".to_string()],
                groups: vec!["admins".to_string(), "dev".to_string()],
            },
        );
        FileUserProvider::new(users).unwrap()
    }

    #[tokio::test]
    async fn test_check_user_password() {
        let provider = provider();
        assert!(provider.check_user_password("john", "password").await.unwrap());
        assert!(!provider.check_user_password("john", "wrong").await.unwrap());
        assert!(!provider.check_user_password("nobody", "password").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_details() {
        let provider = provider();
        let details = provider.get_details("john").await.unwrap();
        assert_eq!(details.display_name, "John Doe");
        assert_eq!(details.groups, vec!["admins", "dev"]);
        assert_eq!(details.emails, vec!["john.doe@example.com", "jd@example.com"]);
        assert_eq!(details.email(), Some("john.doe@example.com"));

        assert!(matches!(
            provider.get_details("nobody").await,
            Err(GateError::UserNotFound(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let hash = hash_password("password").unwrap();
        let path = std::env::temp_dir().join(format!("auth-gate-users-{}.json", uuid::Uuid::new_v4()));
        let json = format!(
            r#"{{"users": {{"john": {{"password": "{0}"}}, "harry": {{"password": "{0}"}}}}}}"#,
            hash
        );
        std::fs::write(&path, json).unwrap();

        let provider = FileUserProvider::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(provider.unwrap().user_count(), 2);
    }

    #[test]
    fn test_invalid_hash_is_rejected() {
        let mut users = HashMap::new();
        users.insert(
            "john".to_string(),
            UserRecord {
                password: "plaintext".to_string(),
                display_name: None,
                email: None,
                emails: Vec::new(),
                groups: Vec::new(),
            },
        );
        assert!(matches!(FileUserProvider::new(users), Err(GateError::ConfigError(_))));
    }

    #[test]
    fn test_users_file_format() {
        let hash = hash_password("password").unwrap();
        let json = format!(
            r#"{{"users": {{"harry": {{"password": "{}", "groups": ["dev"]}}}}}}"#,
            hash
        );
        let database: UsersDatabase = serde_json::from_str(&json).unwrap();
        let details = database.users["harry"].details("harry");
        assert_eq!(details.display_name, "harry");
        assert!(details.emails.is_empty());
        assert_eq!(details.groups, vec!["dev"]);
    }
}
