//! Identity store
//!
//! User records keyed by user id. Username and chat-id lookups are linear
//! scans over all records, O(n) per check. Passwords are stored as Argon2id
//! PHC strings; the salt and parameters ride along in the hash.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{LiaisonError, Result};

/// Linked chat identity on a user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLink {
    /// Chat-platform user id (e.g. Slack "U..." id)
    pub chat_id: String,
    /// DM channel used to reach the user
    pub channel_id: String,
}

/// Stored user record: web credentials plus optional linked chat identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_link: Option<ChatLink>,
    pub created_at: DateTime<Utc>,
}

/// Identity store backed by a sled tree
#[derive(Clone)]
pub struct UserStore {
    tree: sled::Tree,
}

impl UserStore {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    /// Create a new user record
    ///
    /// Validates both fields non-empty, rejects duplicate usernames, hashes
    /// the password, assigns a fresh id, and persists the record.
    pub fn create(&self, username: &str, password: &str) -> Result<User> {
        if username.is_empty() {
            return Err(LiaisonError::MissingField("A username is required".into()));
        }
        if password.is_empty() {
            return Err(LiaisonError::MissingField("A password is required".into()));
        }

        match self.find_by_username(username) {
            Ok(_) => {
                return Err(LiaisonError::DuplicateUsername(
                    "The username is not available".into(),
                ))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password(password)?,
            chat_link: None,
            created_at: Utc::now(),
        };
        self.put(&user)?;
        Ok(user)
    }

    /// Look up a user by id
    pub fn find_by_id(&self, id: &str) -> Result<User> {
        match self.tree.get(id.as_bytes())? {
            Some(value) => decode_user(&value),
            None => Err(LiaisonError::NotFound("User not found".into())),
        }
    }

    /// Look up a user by username
    ///
    /// Linear scan; usernames are unique so the first match is the only one.
    pub fn find_by_username(&self, username: &str) -> Result<User> {
        self.scan(|user| user.username == username)
    }

    /// Look up a user by linked chat identity
    pub fn find_by_chat_id(&self, chat_id: &str) -> Result<User> {
        self.scan(|user| {
            user.chat_link
                .as_ref()
                .map(|link| link.chat_id == chat_id)
                .unwrap_or(false)
        })
    }

    /// Check a password against the stored hash (propagates lookup failure)
    pub fn verify_password(&self, id: &str, password: &str) -> Result<bool> {
        let user = self.find_by_id(id)?;
        check_password(password, &user.password_hash)
    }

    /// Attach a chat identity to a user record
    ///
    /// Read-modify-write; any previous link is overwritten (last link wins).
    pub fn attach_chat_link(&self, id: &str, chat_id: &str, channel_id: &str) -> Result<User> {
        let mut user = self.find_by_id(id)?;
        user.chat_link = Some(ChatLink {
            chat_id: chat_id.to_string(),
            channel_id: channel_id.to_string(),
        });
        self.put(&user)?;
        Ok(user)
    }

    fn put(&self, user: &User) -> Result<()> {
        let value = serde_json::to_vec(user)
            .map_err(|e| LiaisonError::Storage(format!("Serialization error: {}", e)))?;
        self.tree.insert(user.id.as_bytes(), value)?;
        Ok(())
    }

    fn scan<F>(&self, predicate: F) -> Result<User>
    where
        F: Fn(&User) -> bool,
    {
        for item in self.tree.iter() {
            let (_, value) = item?;
            let user = decode_user(&value)?;
            if predicate(&user) {
                return Ok(user);
            }
        }
        Err(LiaisonError::NotFound("User not found".into()))
    }
}

fn decode_user(value: &[u8]) -> Result<User> {
    serde_json::from_slice(value)
        .map_err(|e| LiaisonError::Storage(format!("Deserialization error: {}", e)))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LiaisonError::Auth(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored PHC hash string
pub fn check_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| LiaisonError::Auth(format!("Invalid password hash format: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
