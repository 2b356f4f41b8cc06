use futures::{Stream, StreamExt};
use tonic::Status;
use tracing::{debug, info, warn};

use super::recv_error;
use crate::proto::upload_image_request::Data;
use crate::proto::{ImageInfo, UploadImageRequest, UploadImageResponse};
use crate::store::image::validate_image_type;
use crate::store::{ImageStore, LaptopStore};
use crate::{CallContext, Error, Result};

/// Largest image accepted by `UploadImage`, in bytes.
pub const MAX_IMAGE_SIZE: usize = 1 << 20;

/// Drains an upload stream and commits the image.
///
/// The first message must carry the image info; every later one carries a
/// chunk. Chunks are buffered in memory and only written once the stream
/// ends cleanly, so a failed or abandoned upload leaves nothing behind.
pub async fn receive_image<S>(
    laptops: &LaptopStore,
    images: &ImageStore,
    ctx: &CallContext,
    mut stream: S,
) -> Result<UploadImageResponse>
where
    S: Stream<Item = std::result::Result<UploadImageRequest, Status>> + Unpin,
{
    let ImageInfo {
        laptop_id,
        image_type,
    } = match next_message(ctx, &mut stream).await? {
        Some(UploadImageRequest {
            data: Some(Data::Info(info)),
        }) => info,
        Some(_) => {
            return Err(Error::InvalidArgument(
                "first message must carry the image info".to_string(),
            ))
        }
        None => return Err(Error::InvalidArgument("image info is missing".to_string())),
    };

    info!(laptop_id = %laptop_id, image_type = %image_type, "receive an upload-image request");

    validate_image_type(&image_type)?;

    if !laptops.contains(&laptop_id).await {
        return Err(Error::InvalidArgument(format!(
            "laptop {laptop_id} does not exist"
        )));
    }

    let mut data = Vec::new();
    loop {
        ctx.check()?;

        let Some(message) = next_message(ctx, &mut stream).await? else {
            debug!("no more data");
            break;
        };

        let chunk = match message.data {
            Some(Data::ChunkData(chunk)) => chunk,
            _ => {
                return Err(Error::InvalidArgument(
                    "expected a chunk of image data".to_string(),
                ))
            }
        };

        let size = data.len() + chunk.len();
        if size > MAX_IMAGE_SIZE {
            warn!(laptop_id = %laptop_id, size, "image is too large");
            return Err(Error::InvalidArgument(format!(
                "image is too large: {size} > {MAX_IMAGE_SIZE}"
            )));
        }

        data.extend_from_slice(&chunk);
        debug!(chunk = chunk.len(), total = size, "received a chunk");
    }

    let id = images.save(&laptop_id, &image_type, &data).await?;

    Ok(UploadImageResponse {
        id,
        size: data.len() as u32,
    })
}

async fn next_message<S>(ctx: &CallContext, stream: &mut S) -> Result<Option<UploadImageRequest>>
where
    S: Stream<Item = std::result::Result<UploadImageRequest, Status>> + Unpin,
{
    tokio::select! {
        biased;
        err = ctx.done() => Err(err),
        message = stream.next() => message.transpose().map_err(recv_error),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;
    use crate::sample;

    type Message = std::result::Result<UploadImageRequest, Status>;

    fn info(laptop_id: &str, image_type: &str) -> Message {
        Ok(UploadImageRequest {
            data: Some(Data::Info(ImageInfo {
                laptop_id: laptop_id.to_string(),
                image_type: image_type.to_string(),
            })),
        })
    }

    fn chunk(bytes: Vec<u8>) -> Message {
        Ok(UploadImageRequest {
            data: Some(Data::ChunkData(bytes)),
        })
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        laptops: LaptopStore,
        images: ImageStore,
        laptop_id: String,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let laptops = LaptopStore::new();
        let laptop = sample::new_laptop();
        laptops.save(&laptop).await.unwrap();

        Fixture {
            images: ImageStore::new(dir.path()),
            _dir: dir,
            laptops,
            laptop_id: laptop.id,
        }
    }

    async fn file_count(images: &ImageStore) -> usize {
        let mut count = 0;
        let Ok(mut entries) = tokio::fs::read_dir(images.root()).await else {
            return 0;
        };
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn commits_image_with_exact_size() {
        let f = fixture().await;
        let messages = vec![
            info(&f.laptop_id, ".jpg"),
            chunk(vec![1; 1024]),
            chunk(vec![2; 1024]),
            chunk(vec![3; 100]),
        ];

        let res = receive_image(&f.laptops, &f.images, &CallContext::new(), stream::iter(messages))
            .await
            .unwrap();

        assert_eq!(res.size, 2148);
        let saved = f.images.find(&res.id).await.unwrap();
        assert_eq!(saved.laptop_id, f.laptop_id);
        assert_eq!(tokio::fs::read(&saved.path).await.unwrap().len(), 2148);
    }

    #[tokio::test]
    async fn bad_image_type_is_rejected_before_any_chunk() {
        let f = fixture().await;
        // Chunks never arrive, so only the info message can fail the upload.
        let messages = stream::iter(vec![info(&f.laptop_id, "/../x")]).chain(stream::pending());

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            receive_image(&f.laptops, &f.images, &CallContext::new(), messages),
        )
        .await
        .expect("bad type must be rejected without waiting for data")
        .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
        assert_eq!(file_count(&f.images).await, 0);
    }

    #[tokio::test]
    async fn accepts_exactly_the_limit() {
        let f = fixture().await;
        let messages = vec![
            info(&f.laptop_id, ".png"),
            chunk(vec![0; MAX_IMAGE_SIZE / 2]),
            chunk(vec![0; MAX_IMAGE_SIZE / 2]),
        ];

        let res = receive_image(&f.laptops, &f.images, &CallContext::new(), stream::iter(messages))
            .await
            .unwrap();
        assert_eq!(res.size as usize, MAX_IMAGE_SIZE);
    }

    #[tokio::test]
    async fn oversized_image_leaves_no_file() {
        let f = fixture().await;
        let messages = vec![
            info(&f.laptop_id, ".png"),
            chunk(vec![0; MAX_IMAGE_SIZE]),
            chunk(vec![0; 1]),
        ];

        let err = receive_image(&f.laptops, &f.images, &CallContext::new(), stream::iter(messages))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(f.images.count().await, 0);
        assert_eq!(file_count(&f.images).await, 0);
    }

    #[tokio::test]
    async fn unknown_laptop_is_rejected() {
        let f = fixture().await;
        let messages = vec![info("missing", ".jpg"), chunk(vec![1; 10])];

        let err = receive_image(&f.laptops, &f.images, &CallContext::new(), stream::iter(messages))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn first_message_must_be_info() {
        let f = fixture().await;

        let err = receive_image(
            &f.laptops,
            &f.images,
            &CallContext::new(),
            stream::iter(vec![chunk(vec![1; 10])]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = receive_image(
            &f.laptops,
            &f.images,
            &CallContext::new(),
            stream::iter(Vec::<Message>::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn cancelled_call_discards_data() {
        let f = fixture().await;
        let ctx = CallContext::new();
        ctx.cancel();

        let messages = vec![info(&f.laptop_id, ".jpg"), chunk(vec![1; 10])];
        let err = receive_image(&f.laptops, &f.images, &ctx, stream::iter(messages))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Canceled));
        assert_eq!(file_count(&f.images).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upload_hits_deadline() {
        let f = fixture().await;
        let ctx = CallContext::with_timeout(Duration::from_secs(5));

        let messages = stream::iter(vec![info(&f.laptop_id, ".jpg"), chunk(vec![1; 10])])
            .chain(stream::pending());

        let err = receive_image(&f.laptops, &f.images, &ctx, messages)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DeadlineExceeded));
        assert_eq!(f.images.count().await, 0);
    }

    #[tokio::test]
    async fn transport_errors_are_mapped() {
        let f = fixture().await;
        let messages = vec![info(&f.laptop_id, ".jpg"), Err(Status::cancelled("gone"))];

        let err = receive_image(&f.laptops, &f.images, &CallContext::new(), stream::iter(messages))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Canceled));
    }
}
