use std::time::Duration;

use tonic::transport::Channel;
use tonic::Request;
use tracing::debug;

use super::interceptor::Login;
use crate::proto::auth_service_client::AuthServiceClient;
use crate::proto::LoginRequest;
use crate::Result;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Logs a fixed user in through the `AuthService`.
#[derive(Clone)]
pub struct AuthClient {
    service: AuthServiceClient<Channel>,
    username: String,
    password: String,
}

impl AuthClient {
    pub fn new(channel: Channel, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            service: AuthServiceClient::new(channel),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[tonic::async_trait]
impl Login for AuthClient {
    async fn login(&self) -> Result<String> {
        let mut request = Request::new(LoginRequest {
            username: self.username.clone(),
            password: self.password.clone(),
        });
        request.set_timeout(LOGIN_TIMEOUT);

        let response = self.service.clone().login(request).await?;
        debug!(username = %self.username, "login succeeded");

        Ok(response.into_inner().access_token)
    }
}
