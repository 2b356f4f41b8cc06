use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use tokio::sync::RwLock;

use super::Role;
use crate::{Error, Result};

/// Registered account. Only the password hash is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub hashed_password: String,
    pub role: Role,
}

impl User {
    /// Creates a user, hashing `password` with a fresh salt.
    pub fn new(username: impl Into<String>, password: &str, role: Role) -> Result<Self> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Internal(format!("cannot hash password: {e}")))?
            .to_string();

        Ok(Self {
            username: username.into(),
            hashed_password,
            role,
        })
    }

    /// Checks `password` against the stored hash.
    ///
    /// A malformed stored hash never matches.
    pub fn is_correct_password(&self, password: &str) -> bool {
        let Ok(hash) = PasswordHash::new(&self.hashed_password) else {
            return false;
        };

        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    }
}

/// In-memory user registry keyed by username.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user`. Fails with [`Error::AlreadyExists`] on a taken username.
    pub async fn save(&self, user: User) -> Result<()> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.username) {
            return Err(Error::AlreadyExists(format!("user {}", user.username)));
        }

        users.insert(user.username.clone(), user);
        Ok(())
    }

    /// Returns a copy of the user named `username`.
    pub async fn find(&self, username: &str) -> Option<User> {
        self.users.read().await.get(username).cloned()
    }
}
