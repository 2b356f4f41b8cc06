use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::{Error, Result};

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "PCBOOK_CONFIG_PATH";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening address.
    pub server: ServerSettings,
    /// Token signing.
    pub auth: AuthSettings,
    /// Image storage.
    pub images: ImageSettings,
    /// Accounts created at startup.
    pub users: Vec<SeedUser>,
}

/// Server listening settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Hostname or IP address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

/// Access token settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC signing secret.
    pub secret_key: String,
    /// Lifetime of issued tokens, in seconds.
    pub token_duration_secs: u64,
}

impl AuthSettings {
    pub fn token_duration(&self) -> Duration {
        Duration::from_secs(self.token_duration_secs)
    }
}

/// Image storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Directory uploaded images are written to.
    pub root: PathBuf,
}

/// An account registered when the server starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            auth: AuthSettings {
                secret_key: random_secret(),
                token_duration_secs: 15 * 60,
            },
            images: ImageSettings {
                root: PathBuf::from("img"),
            },
            users: vec![
                SeedUser {
                    username: "admin1".to_string(),
                    password: "secret".to_string(),
                    role: Role::Admin,
                },
                SeedUser {
                    username: "user1".to_string(),
                    password: "secret".to_string(),
                    role: Role::User,
                },
            ],
        }
    }
}

impl ServerConfig {
    /// Loads configuration from defaults, the TOML file and the environment.
    ///
    /// Priority: `PCBOOK_*` environment variables > TOML file > defaults.
    /// Nested keys use a double underscore, e.g. `PCBOOK_AUTH__SECRET_KEY`.
    #[allow(clippy::result_large_err)]
    pub fn load() -> figment::error::Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::figment(path).extract()
    }

    /// Provider chain read by [`ServerConfig::load`], rooted at `path`.
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PCBOOK_").ignore(&["config_path"]).split("__"))
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.secret_key.is_empty() {
            return Err(Error::InvalidArgument("auth.secret_key is empty".to_string()));
        }
        if self.auth.token_duration_secs == 0 {
            return Err(Error::InvalidArgument(
                "auth.token_duration_secs must be positive".to_string(),
            ));
        }
        if self.images.root.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("images.root is empty".to_string()));
        }
        self.addr()?;
        Ok(())
    }

    /// Socket address the server binds to.
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                Error::InvalidArgument(format!(
                    "invalid listen address {}:{}: {e}",
                    self.server.host, self.server.port
                ))
            })
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
