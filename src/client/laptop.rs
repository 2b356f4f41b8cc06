use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Code, Request};
use tracing::{debug, info};

use super::interceptor::AuthChannel;
use crate::methods;
use crate::proto::laptop_service_client::LaptopServiceClient;
use crate::proto::upload_image_request::Data;
use crate::proto::{
    CreateLaptopRequest, Filter, ImageInfo, Laptop, RateLaptopRequest, RateLaptopResponse,
    SearchLaptopRequest, UploadImageRequest, UploadImageResponse,
};
use crate::{Error, Result};

/// Deadline applied to every call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of one upload chunk.
pub const CHUNK_SIZE: usize = 1024;

const STREAM_BUFFER: usize = 16;

/// Typed client for the laptop service.
///
/// Calls that need a token get it from the watch channel the client was
/// built with, normally fed by a [`TokenRefresher`](super::TokenRefresher).
#[derive(Clone)]
pub struct LaptopClient {
    service: LaptopServiceClient<AuthChannel<Channel>>,
}

impl LaptopClient {
    pub fn new(channel: Channel, token: watch::Receiver<String>) -> Self {
        let channel = AuthChannel::new(channel, token, methods::AUTHENTICATED);
        Self {
            service: LaptopServiceClient::new(channel),
        }
    }

    /// Creates `laptop` and returns its ID.
    ///
    /// A laptop that already exists is not an error; its ID is returned.
    pub async fn create_laptop(&mut self, laptop: Laptop) -> Result<String> {
        let existing_id = laptop.id.clone();
        let mut request = Request::new(CreateLaptopRequest {
            laptop: Some(laptop),
        });
        request.set_timeout(CALL_TIMEOUT);

        match self.service.create_laptop(request).await {
            Ok(response) => {
                let id = response.into_inner().id;
                info!(laptop_id = %id, "created laptop");
                Ok(id)
            }
            Err(status) if status.code() == Code::AlreadyExists => {
                info!(laptop_id = %existing_id, "laptop already exists");
                Ok(existing_id)
            }
            Err(status) => Err(status.into()),
        }
    }

    /// Returns every laptop matching `filter`.
    pub async fn search_laptop(&mut self, filter: Filter) -> Result<Vec<Laptop>> {
        info!(?filter, "search laptops");

        let mut request = Request::new(SearchLaptopRequest {
            filter: Some(filter),
        });
        request.set_timeout(CALL_TIMEOUT);

        let mut stream = self.service.search_laptop(request).await?.into_inner();
        let mut found = Vec::new();

        while let Some(response) = stream.message().await? {
            let Some(laptop) = response.laptop else {
                continue;
            };

            info!(
                laptop_id = %laptop.id,
                brand = %laptop.brand,
                cores = laptop.cpu.as_ref().map(|cpu| cpu.number_cores).unwrap_or_default(),
                price_usd = laptop.price_usd,
                "found laptop"
            );
            found.push(laptop);
        }

        Ok(found)
    }

    /// Uploads the image at `path` for `laptop_id` in [`CHUNK_SIZE`] chunks.
    ///
    /// The image type is taken from the file extension.
    pub async fn upload_image(
        &mut self,
        laptop_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<UploadImageResponse> {
        let path = path.as_ref();
        let image_type = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let file = tokio::fs::File::open(path).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let info = UploadImageRequest {
            data: Some(Data::Info(ImageInfo {
                laptop_id: laptop_id.to_string(),
                image_type,
            })),
        };
        tx.send(info)
            .await
            .map_err(|_| Error::Internal("upload stream closed".to_string()))?;

        let reader = tokio::spawn(send_chunks(file, tx));

        let mut request = Request::new(ReceiverStream::new(rx));
        request.set_timeout(CALL_TIMEOUT);
        let result = self.service.upload_image(request).await;

        reader
            .await
            .map_err(|e| Error::Internal(format!("image reader failed: {e}")))??;

        let response = result?.into_inner();
        info!(image_id = %response.id, size = response.size, "image uploaded");
        Ok(response)
    }

    /// Sends one score per laptop and collects the running averages.
    ///
    /// Scores are sent from a separate task while responses are read here,
    /// so neither side waits for the other to finish.
    pub async fn rate_laptop(
        &mut self,
        scores: Vec<(String, f64)>,
    ) -> Result<Vec<RateLaptopResponse>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        let sender = tokio::spawn(async move {
            for (laptop_id, score) in scores {
                debug!(laptop_id = %laptop_id, score, "send rating");
                if tx.send(RateLaptopRequest { laptop_id, score }).await.is_err() {
                    break;
                }
            }
        });

        let mut request = Request::new(ReceiverStream::new(rx));
        request.set_timeout(CALL_TIMEOUT);

        let result = self.collect_ratings(request).await;

        sender.abort();
        let _ = sender.await;
        result
    }

    async fn collect_ratings(
        &mut self,
        request: Request<ReceiverStream<RateLaptopRequest>>,
    ) -> Result<Vec<RateLaptopResponse>> {
        let mut stream = self.service.rate_laptop(request).await?.into_inner();
        let mut responses = Vec::new();

        while let Some(response) = stream.message().await? {
            info!(
                laptop_id = %response.laptop_id,
                rated_count = response.rated_count,
                average_score = response.average_score,
                "received rating"
            );
            responses.push(response);
        }

        Ok(responses)
    }
}

async fn send_chunks(
    mut file: tokio::fs::File,
    tx: mpsc::Sender<UploadImageRequest>,
) -> Result<()> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        let chunk = UploadImageRequest {
            data: Some(Data::ChunkData(buffer[..n].to_vec())),
        };
        if tx.send(chunk).await.is_err() {
            // The call ended early; its status says why.
            return Ok(());
        }
    }
}
