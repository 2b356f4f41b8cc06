use std::collections::HashSet;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use http::header::HeaderValue;
use http::Request;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{debug, info, warn};

use crate::auth::AUTHORIZATION_METADATA_KEY;
use crate::{Error, Result};

/// Something that can obtain a fresh access token.
#[tonic::async_trait]
pub trait Login: Send + Sync + 'static {
    async fn login(&self) -> Result<String>;
}

/// Keeps an access token fresh in the background.
///
/// The first login happens in [`TokenRefresher::start`]; after that a task
/// logs in again on every interval tick and publishes the new token. A
/// failed refresh keeps the previous token in place and is retried on the
/// next tick.
pub struct TokenRefresher {
    token: watch::Receiver<String>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TokenRefresher {
    /// Logs in once and starts refreshing every `refresh_interval`.
    ///
    /// The interval should be shorter than the token lifetime, otherwise
    /// calls may carry an expired token between refreshes.
    pub async fn start<L: Login>(login: L, refresh_interval: Duration) -> Result<Self> {
        if refresh_interval.is_zero() {
            return Err(Error::InvalidArgument("refresh interval is zero".to_string()));
        }

        let token = login.login().await?;
        info!(interval = ?refresh_interval, "logged in, token refresh scheduled");

        let (tx, rx) = watch::channel(token);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(refresh_loop(login, refresh_interval, tx, cancel.clone()));

        Ok(Self {
            token: rx,
            cancel,
            task: Some(task),
        })
    }

    /// Current token.
    pub fn token(&self) -> String {
        self.token.borrow().clone()
    }

    /// Receiver observing every published token.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.token.clone()
    }

    /// Wraps `inner` so calls to `auth_methods` carry the current token.
    pub fn channel<S, I, M>(&self, inner: S, auth_methods: I) -> AuthChannel<S>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        AuthChannel::new(inner, self.subscribe(), auth_methods)
    }

    /// Stops the refresh task and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!("token refresher shut down");
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn refresh_loop<L: Login>(
    login: L,
    refresh_interval: Duration,
    tx: watch::Sender<String>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + refresh_interval, refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = login.login() => result,
        };

        match result {
            Ok(token) => {
                tx.send_replace(token);
                info!("token refreshed");
            }
            Err(err) => warn!(error = %err, "token refresh failed, keeping the current token"),
        }
    }
}

/// Transport wrapper attaching the current token to selected methods.
///
/// Works for unary and streaming calls alike since it only touches request
/// headers. Reading the token never waits on the refresher.
#[derive(Clone)]
pub struct AuthChannel<S> {
    inner: S,
    token: watch::Receiver<String>,
    auth_methods: Arc<HashSet<String>>,
}

impl<S> AuthChannel<S> {
    pub fn new<I, M>(inner: S, token: watch::Receiver<String>, auth_methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Self {
            inner,
            token,
            auth_methods: Arc::new(auth_methods.into_iter().map(Into::into).collect()),
        }
    }
}

impl<S, B> Service<Request<B>> for AuthChannel<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if self.auth_methods.contains(req.uri().path()) {
            let token = self.token.borrow().clone();
            match HeaderValue::from_str(&token) {
                Ok(value) => {
                    req.headers_mut().insert(AUTHORIZATION_METADATA_KEY, value);
                }
                Err(_) => warn!("access token is not a valid header value"),
            }
        }

        self.inner.call(req)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tower::ServiceExt;

    use super::*;
    use crate::methods;

    /// Hands out `token-1`, `token-2`, ... and fails on the listed attempts.
    #[derive(Clone, Default)]
    struct FakeLogin {
        calls: Arc<AtomicUsize>,
        failing: Arc<HashSet<usize>>,
    }

    impl FakeLogin {
        fn failing_on(attempts: &[usize]) -> Self {
            Self {
                calls: Arc::default(),
                failing: Arc::new(attempts.iter().copied().collect()),
            }
        }
    }

    #[tonic::async_trait]
    impl Login for FakeLogin {
        async fn login(&self) -> Result<String> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing.contains(&attempt) {
                return Err(Error::Unauthenticated("login refused".to_string()));
            }
            Ok(format!("token-{attempt}"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_on_each_tick() {
        let login = FakeLogin::default();
        let refresher = TokenRefresher::start(login.clone(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(refresher.token(), "token-1");

        let mut rx = refresher.subscribe();
        tokio::time::sleep(Duration::from_secs(10)).await;
        rx.changed().await.unwrap();
        assert_eq!(refresher.token(), "token-2");

        rx.changed().await.unwrap();
        assert_eq!(refresher.token(), "token-3");
        refresher.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_previous_token() {
        let login = FakeLogin::failing_on(&[2]);
        let refresher = TokenRefresher::start(login.clone(), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(login.calls.load(Ordering::SeqCst), 2);
        assert_eq!(refresher.token(), "token-1");

        let mut rx = refresher.subscribe();
        rx.changed().await.unwrap();
        assert_eq!(refresher.token(), "token-3");
        refresher.shutdown().await;
    }

    #[tokio::test]
    async fn failed_first_login_fails_start() {
        let login = FakeLogin::failing_on(&[1]);
        let err = TokenRefresher::start(login, Duration::from_secs(10))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Unauthenticated(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_refreshing() {
        let login = FakeLogin::default();
        let refresher = TokenRefresher::start(login.clone(), Duration::from_secs(10))
            .await
            .unwrap();

        refresher.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejects_zero_interval() {
        let result = TokenRefresher::start(FakeLogin::default(), Duration::ZERO).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    async fn sent_token<S>(channel: AuthChannel<S>, path: &str) -> Option<String>
    where
        S: Service<Request<()>, Response = Option<String>, Error = Infallible>,
    {
        let req = Request::builder()
            .uri(format!("http://localhost{path}"))
            .body(())
            .unwrap();
        channel.oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn attaches_token_only_to_listed_methods() {
        let echo = tower::service_fn(|req: Request<()>| async move {
            let token = req
                .headers()
                .get(AUTHORIZATION_METADATA_KEY)
                .map(|v| v.to_str().unwrap().to_string());
            Ok::<_, Infallible>(token)
        });

        let (tx, rx) = watch::channel("first".to_string());
        let channel = AuthChannel::new(echo, rx, methods::AUTHENTICATED);

        assert_eq!(
            sent_token(channel.clone(), methods::CREATE_LAPTOP).await.as_deref(),
            Some("first")
        );
        assert_eq!(sent_token(channel.clone(), methods::SEARCH_LAPTOP).await, None);
        assert_eq!(sent_token(channel.clone(), methods::LOGIN).await, None);

        tx.send_replace("second".to_string());
        assert_eq!(
            sent_token(channel, methods::RATE_LAPTOP).await.as_deref(),
            Some("second")
        );
    }
}
