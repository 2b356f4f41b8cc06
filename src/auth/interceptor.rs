use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{ready, Either, Ready};
use http::{Request, Response};
use tonic::body::BoxBody;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::{JwtManager, Role, AUTHORIZATION_METADATA_KEY};
use crate::methods;

const BEARER_PREFIX: &str = "Bearer ";

/// A check run before a call reaches its handler.
///
/// `method` is the full gRPC path, e.g. `/pcbook.LaptopService/CreateLaptop`.
/// Returning an error rejects the call with that status.
pub trait CallPolicy: Send + Sync + 'static {
    fn check(&self, method: &str, metadata: &MetadataMap) -> Result<(), Status>;
}

/// Role-based access control over access tokens.
///
/// Methods missing from the table are public. Listed methods need a valid
/// token whose role is one of the allowed roles.
pub struct RolePolicy {
    jwt: Arc<JwtManager>,
    accessible_roles: HashMap<String, Vec<Role>>,
}

impl RolePolicy {
    pub fn new<I, M>(jwt: Arc<JwtManager>, accessible_roles: I) -> Self
    where
        I: IntoIterator<Item = (M, Vec<Role>)>,
        M: Into<String>,
    {
        Self {
            jwt,
            accessible_roles: accessible_roles
                .into_iter()
                .map(|(method, roles)| (method.into(), roles))
                .collect(),
        }
    }

    /// Policy with the laptop service's role table.
    pub fn with_default_roles(jwt: Arc<JwtManager>) -> Self {
        Self::new(jwt, default_roles())
    }
}

/// Admins manage the catalog; anyone logged in may rate. Search and login
/// are public.
pub fn default_roles() -> Vec<(&'static str, Vec<Role>)> {
    vec![
        (methods::CREATE_LAPTOP, vec![Role::Admin]),
        (methods::UPLOAD_IMAGE, vec![Role::Admin]),
        (methods::RATE_LAPTOP, vec![Role::Admin, Role::User]),
    ]
}

impl CallPolicy for RolePolicy {
    fn check(&self, method: &str, metadata: &MetadataMap) -> Result<(), Status> {
        let Some(allowed) = self.accessible_roles.get(method) else {
            return Ok(());
        };

        let token = metadata
            .get(AUTHORIZATION_METADATA_KEY)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.strip_prefix(BEARER_PREFIX).unwrap_or(value))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                warn!(method, "missing access token");
                Status::unauthenticated("access token is not provided")
            })?;

        let claims = self.jwt.verify(token).map_err(|e| {
            warn!(method, error = %e, "access token rejected");
            Status::from(e)
        })?;

        if !allowed.contains(&claims.role) {
            warn!(method, user = %claims.sub, role = %claims.role, "role not allowed");
            return Err(Status::permission_denied("no permission to access this RPC"));
        }

        debug!(method, user = %claims.sub, "call authorized");
        Ok(())
    }
}

impl fmt::Debug for RolePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RolePolicy")
            .field("accessible_roles", &self.accessible_roles)
            .finish_non_exhaustive()
    }
}

/// Tower layer running a chain of [`CallPolicy`] checks on every inbound
/// call. The first failing policy short-circuits the call.
#[derive(Clone)]
pub struct AuthLayer {
    policies: Arc<[Arc<dyn CallPolicy>]>,
}

impl AuthLayer {
    pub fn new(policies: impl IntoIterator<Item = Arc<dyn CallPolicy>>) -> Self {
        Self {
            policies: policies.into_iter().collect(),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            policies: Arc::clone(&self.policies),
        }
    }
}

/// Service produced by [`AuthLayer`].
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    policies: Arc<[Arc<dyn CallPolicy>]>,
}

impl<S, B> Service<Request<B>> for AuthMiddleware<S>
where
    S: Service<Request<B>, Response = Response<BoxBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Either<Ready<Result<Self::Response, Self::Error>>, S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let method = req.uri().path();
        debug!(method, "inbound call");

        let metadata = MetadataMap::from_headers(req.headers().clone());
        for policy in self.policies.iter() {
            if let Err(status) = policy.check(method, &metadata) {
                return Either::Left(ready(Ok(status.to_http())));
            }
        }

        Either::Right(self.inner.call(req))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::time::Duration;

    use tonic::Code;
    use tower::ServiceExt;

    use super::*;

    fn jwt() -> Arc<JwtManager> {
        Arc::new(JwtManager::new(b"test-secret", Duration::from_secs(60)).unwrap())
    }

    fn metadata_with(token: &str) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        metadata.insert(AUTHORIZATION_METADATA_KEY, token.parse().unwrap());
        metadata
    }

    fn code(result: Result<(), Status>) -> Option<Code> {
        result.err().map(|status| status.code())
    }

    #[test]
    fn unlisted_methods_are_public() {
        let policy = RolePolicy::with_default_roles(jwt());
        let empty = MetadataMap::new();

        assert!(policy.check(methods::SEARCH_LAPTOP, &empty).is_ok());
        assert!(policy.check(methods::LOGIN, &empty).is_ok());
    }

    #[test]
    fn missing_token_is_unauthenticated() {
        let policy = RolePolicy::with_default_roles(jwt());

        for method in methods::AUTHENTICATED {
            let result = policy.check(method, &MetadataMap::new());
            assert_eq!(code(result), Some(Code::Unauthenticated), "{method}");
        }
    }

    #[test]
    fn bad_token_is_unauthenticated() {
        let policy = RolePolicy::with_default_roles(jwt());
        let result = policy.check(methods::RATE_LAPTOP, &metadata_with("garbage"));
        assert_eq!(code(result), Some(Code::Unauthenticated));
    }

    #[test]
    fn roles_gate_methods() {
        let jwt = jwt();
        let policy = RolePolicy::with_default_roles(Arc::clone(&jwt));

        let admin = metadata_with(&jwt.issue("admin1", Role::Admin).unwrap());
        let user = metadata_with(&jwt.issue("user1", Role::User).unwrap());

        for method in methods::AUTHENTICATED {
            assert!(policy.check(method, &admin).is_ok(), "{method}");
        }

        assert_eq!(
            code(policy.check(methods::CREATE_LAPTOP, &user)),
            Some(Code::PermissionDenied)
        );
        assert_eq!(
            code(policy.check(methods::UPLOAD_IMAGE, &user)),
            Some(Code::PermissionDenied)
        );
        assert!(policy.check(methods::RATE_LAPTOP, &user).is_ok());
    }

    #[test]
    fn accepts_bearer_scheme() {
        let jwt = jwt();
        let policy = RolePolicy::with_default_roles(Arc::clone(&jwt));
        let token = jwt.issue("admin1", Role::Admin).unwrap();

        let metadata = metadata_with(&format!("Bearer {token}"));
        assert!(policy.check(methods::CREATE_LAPTOP, &metadata).is_ok());
    }

    struct DenyAll;

    impl CallPolicy for DenyAll {
        fn check(&self, _method: &str, _metadata: &MetadataMap) -> Result<(), Status> {
            Err(Status::resource_exhausted("closed"))
        }
    }

    async fn call_through(layer: &AuthLayer, path: &str, token: Option<&str>) -> Option<Status> {
        let inner = tower::service_fn(|_req: Request<BoxBody>| async {
            Ok::<_, Infallible>(Response::new(tonic::body::empty_body()))
        });

        let mut builder = Request::builder().uri(format!("http://localhost{path}"));
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION_METADATA_KEY, token);
        }
        let req = builder.body(tonic::body::empty_body()).unwrap();

        let resp = layer.layer(inner).oneshot(req).await.unwrap();
        Status::from_header_map(resp.headers())
    }

    #[tokio::test]
    async fn middleware_rejects_before_inner_service() {
        let jwt = jwt();
        let policy: Arc<dyn CallPolicy> =
            Arc::new(RolePolicy::with_default_roles(Arc::clone(&jwt)));
        let layer = AuthLayer::new([policy]);

        let status = call_through(&layer, methods::CREATE_LAPTOP, None).await.unwrap();
        assert_eq!(status.code(), Code::Unauthenticated);

        let token = jwt.issue("admin1", Role::Admin).unwrap();
        assert!(call_through(&layer, methods::CREATE_LAPTOP, Some(&token)).await.is_none());
        assert!(call_through(&layer, methods::SEARCH_LAPTOP, None).await.is_none());
    }

    #[tokio::test]
    async fn first_failing_policy_wins() {
        let roles: Arc<dyn CallPolicy> = Arc::new(RolePolicy::with_default_roles(jwt()));
        let deny: Arc<dyn CallPolicy> = Arc::new(DenyAll);

        let layer = AuthLayer::new([Arc::clone(&roles), Arc::clone(&deny)]);
        let status = call_through(&layer, methods::CREATE_LAPTOP, None).await.unwrap();
        assert_eq!(status.code(), Code::Unauthenticated);

        let status = call_through(&layer, methods::SEARCH_LAPTOP, None).await.unwrap();
        assert_eq!(status.code(), Code::ResourceExhausted);
    }
}
