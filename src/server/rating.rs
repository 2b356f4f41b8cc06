use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tracing::{debug, info, warn};

use super::recv_error;
use crate::proto::{RateLaptopRequest, RateLaptopResponse};
use crate::store::{LaptopStore, RatingStore};
use crate::{CallContext, Error, Result};

/// Responses buffered ahead of the caller.
const RESPONSE_BUFFER: usize = 16;

/// Stream of rating updates returned to the caller.
pub type RatingStream = ReceiverStream<std::result::Result<RateLaptopResponse, Status>>;

/// Starts a rating session over `requests`.
///
/// A spawned task drains the requests and pushes one update per score into
/// a bounded queue that backs the returned stream. The session shares
/// `ctx` with the task: a failure on either side cancels it, and dropping
/// the returned stream stops the task at its next step.
pub fn rate_laptops<S>(
    laptops: Arc<LaptopStore>,
    ratings: Arc<RatingStore>,
    ctx: CallContext,
    requests: S,
) -> RatingStream
where
    S: Stream<Item = std::result::Result<RateLaptopRequest, Status>> + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

    tokio::spawn(async move {
        match receive_ratings(&laptops, &ratings, &ctx, requests, &tx).await {
            Ok(()) => debug!("rating session finished"),
            Err(err) => {
                warn!(error = %err, "rating session failed");
                ctx.cancel();
                // Nobody waits on a call that is already over.
                if matches!(err, Error::Canceled | Error::DeadlineExceeded) {
                    let _ = tx.try_send(Err(err.into()));
                } else {
                    let _ = tx.send(Err(err.into())).await;
                }
            }
        }
    });

    ReceiverStream::new(rx)
}

async fn receive_ratings<S>(
    laptops: &LaptopStore,
    ratings: &RatingStore,
    ctx: &CallContext,
    mut requests: S,
    tx: &mpsc::Sender<std::result::Result<RateLaptopResponse, Status>>,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<RateLaptopRequest, Status>> + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            _ = tx.closed() => {
                debug!("response stream dropped");
                ctx.cancel();
                return Ok(());
            }
            message = requests.next() => message,
        };

        let Some(message) = message else {
            debug!("no more ratings");
            return Ok(());
        };
        let RateLaptopRequest { laptop_id, score } = message.map_err(recv_error)?;

        if !score.is_finite() {
            return Err(Error::InvalidArgument(format!("score {score} is not a number")));
        }

        if !laptops.contains(&laptop_id).await {
            return Err(Error::NotFound(format!("laptop {laptop_id}")));
        }

        let rating = ratings.add(&laptop_id, score).await;
        info!(
            laptop_id = %laptop_id,
            score,
            count = rating.count,
            average = rating.average,
            "laptop rated"
        );

        let response = RateLaptopResponse {
            laptop_id,
            rated_count: rating.count,
            average_score: rating.average,
        };

        let sent = tokio::select! {
            biased;
            err = ctx.done() => return Err(err),
            sent = tx.send(Ok(response)) => sent,
        };
        if sent.is_err() {
            debug!("response stream dropped");
            ctx.cancel();
            return Ok(());
        }
    }
}
