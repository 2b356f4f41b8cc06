//! Laptop catalog gRPC service.
//!
//! The server keeps laptops, uploaded images and ratings in memory and
//! guards the mutating calls with short-lived signed tokens. The client side
//! keeps a token fresh in the background and attaches it to the calls that
//! need it.

/// Generated protobuf and gRPC types.
pub mod proto {
    tonic::include_proto!("pcbook");
}

/// Token issuing, user accounts and the server authorization layer.
pub mod auth;

/// Client-side helpers: login, token refresh and typed laptop calls.
pub mod client;

/// Per-call cancellation and deadline tracking.
pub mod context;

/// Error types.
pub mod error;

/// Fully-qualified gRPC method paths.
pub mod methods;

/// Random sample laptops and scores.
pub mod sample;

/// JSON encoding of catalog records.
pub mod serializer;

/// gRPC services, configuration and server state.
pub mod server;

/// In-memory laptop, image and rating stores.
pub mod store;

pub use context::CallContext;
pub use error::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
