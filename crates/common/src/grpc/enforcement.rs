use crate::auth::{
    AuthorizationProvider, AuthorizedOperation, EffectivePermissionSet, PermissionRequirement,
    Principal, RequestContext,
};
use crate::domain::{DomainError, DomainResult, FORBIDDEN_MESSAGE, UNAUTHENTICATED_MESSAGE};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::Code;
use tower::{Layer, Service};
use tracing::{debug, info};

/// Metadata key carrying the campus of header-scoped operations
pub const CAMPUS_HEADER: &str = "x-campus-id";

const CAMPUS_REQUIRED_MESSAGE: &str = "Campus id is required";
const AUTHORIZATION_UNAVAILABLE_MESSAGE: &str = "Authorization unavailable";

/// Where a campus-scoped operation finds its campus id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampusSource {
    /// The requirement is evaluated without a campus
    None,
    /// Campus id carried in a request metadata entry
    Header(String),
    /// Campus id inside the decoded message
    ///
    /// The layer only authenticates; the service checks the permission once
    /// the payload is decoded.
    Payload,
}

/// Declared authorization of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPolicy {
    /// No principal needed
    Public,
    /// Any authenticated principal
    Authenticated,
    /// Principal must meet the requirement
    Require {
        requirement: PermissionRequirement,
        campus: CampusSource,
    },
}

/// Operation path to policy table
///
/// Paths missing from the table are denied unless they match a public prefix.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, OperationPolicy>,
    public_prefixes: Vec<String>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with reflection and health checks public
    pub fn with_defaults() -> Self {
        Self::new()
            .public_prefix("/grpc.reflection.")
            .public_prefix("/grpc.health.")
    }

    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefixes.push(prefix.into());
        self
    }

    pub fn register(mut self, path: impl Into<String>, policy: OperationPolicy) -> Self {
        self.operations.insert(path.into(), policy);
        self
    }

    pub fn policy_for(&self, path: &str) -> Option<OperationPolicy> {
        if let Some(policy) = self.operations.get(path) {
            return Some(policy.clone());
        }
        self.public_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
            .then_some(OperationPolicy::Public)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Tower layer that enforces the operation registry at the transport boundary
#[derive(Clone)]
pub struct EnforcementLayer {
    provider: Arc<dyn AuthorizationProvider>,
    registry: Arc<OperationRegistry>,
}

impl EnforcementLayer {
    pub fn new(provider: Arc<dyn AuthorizationProvider>, registry: OperationRegistry) -> Self {
        Self {
            provider,
            registry: Arc::new(registry),
        }
    }
}

impl<S> Layer<S> for EnforcementLayer {
    type Service = EnforcementService<S>;

    fn layer(&self, service: S) -> Self::Service {
        EnforcementService {
            inner: service,
            provider: self.provider.clone(),
            registry: self.registry.clone(),
        }
    }
}

/// Service that authorizes each request before passing it on
#[derive(Clone)]
pub struct EnforcementService<S> {
    inner: S,
    provider: Arc<dyn AuthorizationProvider>,
    registry: Arc<OperationRegistry>,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for EnforcementService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: http::Request<ReqBody>) -> Self::Future {
        // The ready service goes with this request; a fresh clone takes its place
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let provider = self.provider.clone();

        let path = request.uri().path().to_string();
        let policy = self.registry.policy_for(&path);
        let ctx = RequestContext::new(request.extensions().get::<Principal>().cloned());
        let header_campus = match &policy {
            Some(OperationPolicy::Require {
                campus: CampusSource::Header(name),
                ..
            }) => request
                .headers()
                .get(name.as_str())
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            _ => None,
        };

        Box::pin(async move {
            match authorize(provider.as_ref(), &ctx, policy.as_ref(), header_campus).await {
                Ok(permissions) => {
                    debug!(path = %path, "operation authorized");
                    if let Some(permissions) = permissions {
                        request
                            .extensions_mut()
                            .insert(AuthorizedOperation { permissions });
                    }
                    request.extensions_mut().insert(ctx);
                    inner.call(request).await
                }
                Err(error) => {
                    info!(path = %path, error = %error, "operation denied");
                    Ok(status_response(&error))
                }
            }
        })
    }
}

async fn authorize(
    provider: &dyn AuthorizationProvider,
    ctx: &RequestContext,
    policy: Option<&OperationPolicy>,
    header_campus: Option<String>,
) -> DomainResult<Option<Arc<EffectivePermissionSet>>> {
    let authenticated = ctx.principal().is_some();

    match policy {
        None if authenticated => Err(DomainError::Forbidden),
        None => Err(DomainError::Unauthenticated),
        Some(OperationPolicy::Public) => Ok(None),
        Some(OperationPolicy::Authenticated)
        | Some(OperationPolicy::Require {
            campus: CampusSource::Payload,
            ..
        }) => {
            if authenticated {
                Ok(None)
            } else {
                Err(DomainError::Unauthenticated)
            }
        }
        Some(OperationPolicy::Require {
            requirement,
            campus: CampusSource::None,
        }) => provider
            .require_permission(ctx, *requirement, None)
            .await
            .map(Some),
        Some(OperationPolicy::Require {
            requirement,
            campus: CampusSource::Header(_),
        }) => provider
            .require_permission(ctx, *requirement, header_campus)
            .await
            .map(Some),
    }
}

/// Render a refusal as a trailers-only gRPC response
fn status_response<B: Default>(error: &DomainError) -> http::Response<B> {
    let (code, message) = match error {
        DomainError::Unauthenticated => (Code::Unauthenticated, UNAUTHENTICATED_MESSAGE),
        DomainError::Forbidden => (Code::PermissionDenied, FORBIDDEN_MESSAGE),
        DomainError::ValidationError(_) => (Code::InvalidArgument, CAMPUS_REQUIRED_MESSAGE),
        _ => (Code::Internal, AUTHORIZATION_UNAVAILABLE_MESSAGE),
    };

    let mut response = http::Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    headers.insert(
        HeaderName::from_static("grpc-status"),
        HeaderValue::from(code as i32),
    );
    headers.insert(
        HeaderName::from_static("grpc-message"),
        HeaderValue::from_static(message),
    );
    response
}
