use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::rating::{rate_laptops, RatingStream};
use super::state::ServerState;
use super::upload::receive_image;
use crate::proto::auth_service_server::AuthService;
use crate::proto::laptop_service_server::LaptopService;
use crate::proto::{
    CreateLaptopRequest, CreateLaptopResponse, LoginRequest, LoginResponse, RateLaptopRequest,
    SearchLaptopRequest, SearchLaptopResponse, UploadImageRequest, UploadImageResponse,
};
use crate::{CallContext, Error};

/// Laptops buffered ahead of a slow search caller.
const SEARCH_BUFFER: usize = 16;

/// gRPC login service issuing access tokens.
pub struct AuthServiceImpl {
    state: ServerState,
}

impl AuthServiceImpl {
    pub fn new(state: ServerState) -> Self {
        Self { state }
    }
}

fn incorrect_credentials() -> Status {
    Status::not_found("incorrect username/password")
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let LoginRequest { username, password } = request.into_inner();

        let Some(user) = self.state.users.find(&username).await else {
            warn!(username = %username, "login for unknown user");
            return Err(incorrect_credentials());
        };

        let (user, correct) = tokio::task::spawn_blocking(move || {
            let correct = user.is_correct_password(&password);
            (user, correct)
        })
        .await
        .map_err(|e| Status::internal(format!("password check failed: {e}")))?;

        if !correct {
            warn!(username = %username, "login with wrong password");
            return Err(incorrect_credentials());
        }

        let access_token = self.state.jwt.issue(&user.username, user.role)?;
        info!(username = %user.username, role = %user.role, "user logged in");

        Ok(Response::new(LoginResponse { access_token }))
    }
}

/// gRPC laptop catalog service.
pub struct LaptopServiceImpl {
    state: ServerState,
}

impl LaptopServiceImpl {
    pub fn new(state: ServerState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl LaptopService for LaptopServiceImpl {
    async fn create_laptop(
        &self,
        request: Request<CreateLaptopRequest>,
    ) -> Result<Response<CreateLaptopResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let mut laptop = request
            .into_inner()
            .laptop
            .ok_or_else(|| Status::invalid_argument("laptop is missing"))?;

        info!(laptop_id = %laptop.id, "receive a create-laptop request");

        if laptop.id.is_empty() {
            laptop.id = Uuid::new_v4().to_string();
        } else {
            Uuid::parse_str(&laptop.id).map_err(|e| {
                Status::invalid_argument(format!("laptop ID is not a valid UUID: {e}"))
            })?;
        }

        if let Err(err) = ctx.check() {
            warn!(laptop_id = %laptop.id, error = %err, "create-laptop abandoned");
            return Err(err.into());
        }

        self.state.laptops.save(&laptop).await?;
        info!(laptop_id = %laptop.id, "saved laptop");

        Ok(Response::new(CreateLaptopResponse { id: laptop.id }))
    }

    type SearchLaptopStream = ReceiverStream<Result<SearchLaptopResponse, Status>>;

    async fn search_laptop(
        &self,
        request: Request<SearchLaptopRequest>,
    ) -> Result<Response<Self::SearchLaptopStream>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let filter = request.into_inner().filter.unwrap_or_default();
        info!(?filter, "receive a search-laptop request");

        let (tx, rx) = mpsc::channel(SEARCH_BUFFER);
        let laptops = Arc::clone(&self.state.laptops);

        tokio::spawn(async move {
            let result = laptops
                .search(&ctx, &filter, |laptop| {
                    let tx = tx.clone();
                    let ctx = ctx.clone();
                    async move {
                        let laptop_id = laptop.id.clone();
                        let response = SearchLaptopResponse {
                            laptop: Some(laptop),
                        };
                        tokio::select! {
                            biased;
                            err = ctx.done() => return Err(err),
                            sent = tx.send(Ok(response)) => sent.map_err(|_| Error::Canceled)?,
                        }

                        debug!(laptop_id = %laptop_id, "sent laptop");
                        Ok(())
                    }
                })
                .await;

            if let Err(err) = result {
                warn!(error = %err, "search stopped early");
                let _ = tx.try_send(Err(err.into()));
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn upload_image(
        &self,
        request: Request<Streaming<UploadImageRequest>>,
    ) -> Result<Response<UploadImageResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());

        let response = receive_image(
            &self.state.laptops,
            &self.state.images,
            &ctx,
            request.into_inner(),
        )
        .await
        .map_err(|err| {
            warn!(error = %err, "upload failed");
            Status::from(err)
        })?;

        info!(image_id = %response.id, size = response.size, "image uploaded");
        Ok(Response::new(response))
    }

    type RateLaptopStream = RatingStream;

    async fn rate_laptop(
        &self,
        request: Request<Streaming<RateLaptopRequest>>,
    ) -> Result<Response<Self::RateLaptopStream>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        info!("receive a rate-laptop stream");

        Ok(Response::new(rate_laptops(
            Arc::clone(&self.state.laptops),
            Arc::clone(&self.state.ratings),
            ctx,
            request.into_inner(),
        )))
    }
}
