use tonic::Request;

use super::{EffectivePermissionSet, RequestPermissionCache};
use std::sync::Arc;

/// Authenticated caller
///
/// The dispatch framework's authentication layer places it in the request
/// extensions after verifying credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

/// Authorization state of one inbound request
///
/// Created once per request and dropped with it, so the permission cache is
/// never shared between requests.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    principal: Option<Principal>,
    permission_cache: RequestPermissionCache,
}

impl RequestContext {
    pub fn new(principal: Option<Principal>) -> Self {
        Self {
            principal,
            permission_cache: RequestPermissionCache::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self::new(Some(Principal {
            user_id: user_id.into(),
        }))
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.user_id.as_str())
    }

    pub fn permission_cache(&self) -> &RequestPermissionCache {
        &self.permission_cache
    }
}

/// Permissions resolved by the enforcement layer for the current operation
#[derive(Debug, Clone)]
pub struct AuthorizedOperation {
    pub permissions: Arc<EffectivePermissionSet>,
}

/// Get the request context attached by the enforcement layer
///
/// Falls back to a fresh context built from the principal extension when the
/// request did not pass through the layer.
pub fn request_context<T>(request: &Request<T>) -> RequestContext {
    if let Some(ctx) = request.extensions().get::<RequestContext>() {
        return ctx.clone();
    }
    RequestContext::new(request.extensions().get::<Principal>().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_context_from_layer_extension() {
        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(RequestContext::authenticated("user-1"));

        let ctx = request_context(&request);
        assert_eq!(ctx.user_id(), Some("user-1"));
    }

    #[test]
    fn test_request_context_from_principal() {
        let mut request = Request::new(());
        request.extensions_mut().insert(Principal {
            user_id: "user-2".to_string(),
        });

        let ctx = request_context(&request);
        assert_eq!(ctx.user_id(), Some("user-2"));
    }

    #[test]
    fn test_request_context_without_principal_is_anonymous() {
        let request = Request::new(());
        let ctx = request_context(&request);
        assert!(ctx.principal().is_none());
    }

    #[tokio::test]
    async fn test_cloned_context_shares_cache() {
        let ctx = RequestContext::authenticated("user-1");
        let clone = ctx.clone();
        clone
            .permission_cache()
            .get_or_resolve("user-1", None, || async {
                Ok(EffectivePermissionSet::empty())
            })
            .await
            .unwrap();
        assert_eq!(ctx.permission_cache().len().await, 1);
    }
}
