//! Client side of the laptop service.
//!
//! [`TokenRefresher`] logs in through an [`AuthClient`] and keeps the token
//! fresh; [`AuthChannel`] attaches it to the calls that need one, and
//! [`LaptopClient`] wraps the typed calls on top.

/// Login through the auth service.
pub mod auth;

/// Token refresh and per-call token attachment.
pub mod interceptor;

/// Typed laptop calls.
pub mod laptop;

pub use auth::AuthClient;
pub use interceptor::{AuthChannel, Login, TokenRefresher};
pub use laptop::LaptopClient;
