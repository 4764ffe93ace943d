use crate::auth::EffectivePermissionSet;
use crate::domain::DomainResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type CacheKey = (String, Option<String>);

/// Effective permission sets resolved during one request
///
/// Created with the request and dropped with it. Concurrent lookups of the
/// same `(user, campus?)` pair share a single resolution.
#[derive(Debug, Clone, Default)]
pub struct RequestPermissionCache {
    entries: Arc<Mutex<HashMap<CacheKey, Arc<OnceCell<Arc<EffectivePermissionSet>>>>>>,
}

impl RequestPermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached set for the pair, resolving it on first use
    ///
    /// A failed resolution is not cached.
    pub async fn get_or_resolve<F, Fut>(
        &self,
        user_id: &str,
        campus_id: Option<&str>,
        resolve: F,
    ) -> DomainResult<Arc<EffectivePermissionSet>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DomainResult<EffectivePermissionSet>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries
                .entry((user_id.to_string(), campus_id.map(str::to_string)))
                .or_default()
                .clone()
        };

        cell.get_or_try_init(move || async move { resolve().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Number of resolved pairs
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|cell| cell.initialized()).count()
    }
}
