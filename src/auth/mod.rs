//! Authentication and authorization.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Server-side policy chain applied to every call.
pub mod interceptor;

/// Signed access tokens.
pub mod jwt;

/// User accounts.
pub mod user;

pub use interceptor::{AuthLayer, AuthMiddleware, CallPolicy, RolePolicy};
pub use jwt::{Claims, JwtManager};
pub use user::{User, UserStore};

/// Metadata key carrying the access token.
pub const AUTHORIZATION_METADATA_KEY: &str = "authorization";

/// Role granted to a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(Error::InvalidArgument(format!("unknown role {other:?}"))),
        }
    }
}
