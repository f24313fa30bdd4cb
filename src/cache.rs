//! Two-tier read-through artifact cache
//!
//! Tier one is a process-local map, unbounded, cleared only on restart.
//! Tier two is an optional remote key-value store with TTL (redis), shared
//! across server processes and background workers. Remote payloads are JSON
//! strings of the typed artifact.
//!
//! Read path: local -> remote (backfilling local) -> loader (storing local
//! unconditionally, remote best-effort with TTL). Any remote failure
//! degrades silently to local-only behavior; it is never surfaced to a
//! request.
//!
//! Concurrent first access on the same key may run the loader more than
//! once; loaders must be idempotent and side-effect-free beyond producing
//! the artifact. There is no per-key lock and no explicit invalidation —
//! staleness is bounded by TTL on the remote tier only.

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default TTL for remote-tier entries (6 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(21_600);

/// Artifact kind component of a cache key
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Per-building feature map, parameterized by selected file path
    Features,
    /// Flattened building -> candidate pairs view (global)
    PredictionsFlat,
    /// Nested by-file prediction view (global)
    PredictionsByFile,
}

impl ArtifactKind {
    fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Features => "features",
            ArtifactKind::PredictionsFlat => "predictions:flat",
            ArtifactKind::PredictionsByFile => "predictions:by_file",
        }
    }
}

/// Cache key: artifact kind plus its identifying parameter.
///
/// Rendered as `"features:<path>"` for parameterized kinds and the bare
/// kind string for global ones; the rendered form is the remote-tier key.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CacheKey {
    kind: ArtifactKind,
    param: Option<String>,
}

impl CacheKey {
    /// Key for the feature map built for a selected file
    pub fn features(param: impl Into<String>) -> Self {
        Self {
            kind: ArtifactKind::Features,
            param: Some(param.into()),
        }
    }

    /// Key for the flattened prediction view
    pub fn predictions_flat() -> Self {
        Self {
            kind: ArtifactKind::PredictionsFlat,
            param: None,
        }
    }

    /// Key for the by-file prediction view
    pub fn predictions_by_file() -> Self {
        Self {
            kind: ArtifactKind::PredictionsByFile,
            param: None,
        }
    }

    /// Render to the string form used for the remote tier
    pub fn render(&self) -> String {
        match &self.param {
            Some(param) => format!("{}:{}", self.kind.as_str(), param),
            None => self.kind.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Remote key-value tier: string keys, JSON-string values, per-key TTL.
///
/// Implementations map transport failures to `SourceUnavailable`; the cache
/// manager treats those as a degrade signal, never an error.
#[async_trait]
pub trait RemoteTier: Send + Sync {
    /// Fetch a value; `Ok(None)` on miss
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value with a TTL
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

/// Redis-backed remote tier
pub struct RedisTier {
    client: redis::Client,
}

impl RedisTier {
    /// Create a tier from a redis URL. Does not connect yet; connections are
    /// established per operation so a down store at startup is not fatal.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| ServerError::unavailable(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteTier for RedisTier {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ServerError::unavailable(e.to_string()))?;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| ServerError::unavailable(e.to_string()))?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ServerError::unavailable(e.to_string()))?;
        let _: () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .map_err(|e| ServerError::unavailable(e.to_string()))?;
        Ok(())
    }
}

/// Two-tier read-through cache manager
pub struct CacheManager {
    local: RwLock<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>,
    remote: Option<Arc<dyn RemoteTier>>,
    ttl: Duration,
}

impl CacheManager {
    /// Create a manager with an optional remote tier and remote-entry TTL
    pub fn new(remote: Option<Arc<dyn RemoteTier>>, ttl: Duration) -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
            remote,
            ttl,
        }
    }

    /// Whether a remote tier is configured (callers use this to decide
    /// between background-job dispatch and synchronous computation)
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Number of entries in the local tier (for stats)
    pub fn local_len(&self) -> usize {
        self.local.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Look up a key through both tiers, invoking `loader` on a full miss.
    ///
    /// The loaded artifact is stored in the local tier unconditionally and
    /// in the remote tier best-effort with the configured TTL.
    pub async fn get_or_load<T, F>(&self, key: &CacheKey, loader: F) -> Result<Arc<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Result<T>,
    {
        // Local tier
        if let Some(cached) = self.local_get::<T>(key) {
            tracing::debug!(key = %key, "local cache hit");
            return Ok(cached);
        }

        // Remote tier; failures degrade to a miss
        if let Some(remote) = &self.remote {
            match remote.get(&key.render()).await {
                Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => {
                        tracing::debug!(key = %key, "remote cache hit");
                        let value = Arc::new(value);
                        self.local_insert(key, value.clone());
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "remote cache entry undecodable, reloading");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(key = %key, error = %e, "remote cache unreachable, local-only");
                }
            }
        }

        // Full miss: run the loader
        let value = Arc::new(loader()?);
        self.local_insert(key, value.clone());

        if let Some(remote) = &self.remote {
            match serde_json::to_string(value.as_ref()) {
                Ok(raw) => {
                    if let Err(e) = remote.set_with_ttl(&key.render(), &raw, self.ttl).await {
                        tracing::debug!(key = %key, error = %e, "remote cache store failed");
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "artifact not serializable for remote tier");
                }
            }
        }

        Ok(value)
    }

    fn local_get<T: Send + Sync + 'static>(&self, key: &CacheKey) -> Option<Arc<T>> {
        let guard = self.local.read().ok()?;
        let any = guard.get(key)?.clone();
        any.downcast::<T>().ok()
    }

    fn local_insert<T: Send + Sync + 'static>(&self, key: &CacheKey, value: Arc<T>) {
        if let Ok(mut guard) = self.local.write() {
            guard.insert(key.clone(), value);
        }
    }
}
