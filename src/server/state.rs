use std::sync::Arc;

use tracing::info;

use super::config::{SeedUser, ServerConfig};
use crate::auth::{JwtManager, User, UserStore};
use crate::store::{ImageStore, LaptopStore, RatingStore};
use crate::Result;

/// Stores and token manager shared by every call.
///
/// Cloning is cheap; clones share the same stores.
#[derive(Clone)]
pub struct ServerState {
    pub laptops: Arc<LaptopStore>,
    pub images: Arc<ImageStore>,
    pub ratings: Arc<RatingStore>,
    pub users: Arc<UserStore>,
    pub jwt: Arc<JwtManager>,
}

impl ServerState {
    /// Creates empty stores around `jwt`, writing images to `images`.
    pub fn new(jwt: JwtManager, images: ImageStore) -> Self {
        Self {
            laptops: Arc::new(LaptopStore::new()),
            images: Arc::new(images),
            ratings: Arc::new(RatingStore::new()),
            users: Arc::new(UserStore::new()),
            jwt: Arc::new(jwt),
        }
    }

    /// Builds the state described by `config`, including its seed users.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        config.validate()?;

        let jwt = JwtManager::new(config.auth.secret_key.as_bytes(), config.auth.token_duration())?;
        let state = Self::new(jwt, ImageStore::new(&config.images.root));
        state.seed_users(&config.users).await?;

        Ok(state)
    }

    /// Registers `users`. Password hashing runs on the blocking pool.
    pub async fn seed_users(&self, users: &[SeedUser]) -> Result<()> {
        for seed in users {
            let SeedUser {
                username,
                password,
                role,
            } = seed.clone();

            let user = tokio::task::spawn_blocking(move || User::new(username, &password, role))
                .await
                .map_err(|e| {
                    crate::Error::Internal(format!("password hashing task failed: {e}"))
                })??;

            info!(username = %user.username, role = %user.role, "user registered");
            self.users.save(user).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[tokio::test]
    async fn from_config_seeds_users() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.images.root = dir.path().to_path_buf();

        let state = ServerState::from_config(&config).await.unwrap();

        let admin = state.users.find("admin1").await.unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(admin.is_correct_password("secret"));
        assert_eq!(state.users.find("user1").await.unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn duplicate_seed_user_fails() {
        let mut config = ServerConfig::default();
        let first = config.users[0].clone();
        config.users.push(first);

        assert!(ServerState::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = ServerConfig::default();
        config.auth.secret_key.clear();

        assert!(ServerState::from_config(&config).await.is_err());
    }
}
