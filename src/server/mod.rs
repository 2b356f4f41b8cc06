use std::sync::Arc;

use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic::Status;
use tower::layer::util::{Identity, Stack};

use crate::auth::{AuthLayer, CallPolicy, RolePolicy};
use crate::proto::auth_service_server::AuthServiceServer;
use crate::proto::laptop_service_server::LaptopServiceServer;
use crate::Error;

/// Server configuration.
pub mod config;

/// Bidirectional rating sessions.
pub mod rating;

/// gRPC service implementations.
pub mod service;

/// Server-side state shared by all calls.
pub mod state;

/// Chunked image uploads.
pub mod upload;

pub use config::ServerConfig;
pub use service::{AuthServiceImpl, LaptopServiceImpl};
pub use state::ServerState;

/// Router with both services behind the role-based authorization layer.
///
/// Extra services, such as health checks, can still be added by the caller.
pub fn router(state: &ServerState) -> Router<Stack<AuthLayer, Identity>> {
    let roles: Arc<dyn CallPolicy> =
        Arc::new(RolePolicy::with_default_roles(Arc::clone(&state.jwt)));

    Server::builder()
        .layer(AuthLayer::new([roles]))
        .add_service(AuthServiceServer::new(AuthServiceImpl::new(state.clone())))
        .add_service(LaptopServiceServer::new(LaptopServiceImpl::new(state.clone())))
}

/// Maps a failed receive on an inbound stream.
pub(crate) fn recv_error(status: Status) -> Error {
    match status.code() {
        tonic::Code::Cancelled => Error::Canceled,
        tonic::Code::DeadlineExceeded => Error::DeadlineExceeded,
        _ => Error::Internal(format!("cannot receive stream message: {}", status.message())),
    }
}
