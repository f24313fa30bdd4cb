//! Application state management
//!
//! One `AppState` is constructed at process start and shared across request
//! handlers as `Arc<AppState>` via axum's State extractor. It owns the
//! two-tier cache manager and the job dispatcher; artifact maps live inside
//! the cache once loaded — no handler keeps a private long-lived copy.

use crate::cache::{CacheKey, CacheManager, RedisTier, RemoteTier};
use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::features::{self, FeatureMap};
use crate::jobs::JobDispatcher;
use crate::predictions::{self, BuildingEntry, MatchCandidate};
use crate::telemetry::TelemetryConfig;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Flattened prediction view type stored in the cache
pub type PredictionFlat = HashMap<String, Vec<MatchCandidate>>;

/// By-file prediction view type stored in the cache
pub type PredictionByFile = BTreeMap<String, BTreeMap<String, BuildingEntry>>;

/// Feature cache parameter used when no file was ever selected
pub const DEFAULT_FEATURES_PARAM: &str = "default";

/// Application state shared across all request handlers
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Telemetry configuration
    pub telemetry_config: TelemetryConfig,

    /// Two-tier artifact cache
    pub cache: CacheManager,

    /// Background job dispatcher
    pub jobs: JobDispatcher,

    /// Server start time for uptime tracking
    pub start_time: Instant,

    /// Most recently computed feature cache parameter, so per-building
    /// lookups without an explicit file reuse the last selection
    last_features_param: RwLock<Option<String>>,
}

impl AppState {
    /// Create new application state from config.
    ///
    /// Wires the remote cache tier when a redis URL is configured; without
    /// one the server runs local-only and computes artifacts synchronously.
    pub fn new(config: ServerConfig, telemetry_config: TelemetryConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ServerError::internal(format!("invalid configuration: {e}")))?;

        let remote: Option<Arc<dyn RemoteTier>> = match &config.redis_url {
            Some(url) => {
                tracing::info!(url, "distributed cache tier configured");
                Some(Arc::new(RedisTier::new(url)?))
            }
            None => None,
        };

        let cache = CacheManager::new(remote, Duration::from_secs(config.cache_ttl_seconds));

        Ok(Self {
            config,
            telemetry_config,
            cache,
            jobs: JobDispatcher::new(),
            start_time: Instant::now(),
            last_features_param: RwLock::new(None),
        })
    }

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Resolve the feature cache parameter for a request: explicit file if
    /// given, else the most recently used one, else the default
    pub fn features_param(&self, requested: Option<&str>) -> String {
        if let Some(param) = requested {
            return param.to_string();
        }
        self.last_features_param
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(|| DEFAULT_FEATURES_PARAM.to_string())
    }

    /// Record the feature cache parameter used by the latest computation
    pub fn remember_features_param(&self, param: &str) {
        if let Ok(mut guard) = self.last_features_param.write() {
            *guard = Some(param.to_string());
        }
    }

    /// Load (or fetch from cache) the feature map for a cache parameter
    pub async fn feature_map(&self, param: &str) -> Result<Arc<FeatureMap>> {
        let key = CacheKey::features(param);
        let parquet = self.config.features_parquet_path();
        let legacy = self.config.features_legacy_path();

        let map = self
            .cache
            .get_or_load(&key, move || {
                let source = features::detect_source(&parquet, &legacy).ok_or_else(|| {
                    ServerError::not_found("no feature source available under the data directory")
                })?;
                features::load_features(&source)
            })
            .await?;

        self.remember_features_param(param);
        Ok(map)
    }

    /// Load (or fetch from cache) the flattened prediction view
    pub async fn prediction_flat(&self) -> Result<Arc<PredictionFlat>> {
        let path = self.config.predictions_path();
        self.cache
            .get_or_load(&CacheKey::predictions_flat(), move || {
                predictions::load_predictions(&path).map(|artifact| artifact.flat)
            })
            .await
    }

    /// Load (or fetch from cache) the by-file prediction view
    pub async fn prediction_by_file(&self) -> Result<Arc<PredictionByFile>> {
        let path = self.config.predictions_path();
        self.cache
            .get_or_load(&CacheKey::predictions_by_file(), move || {
                predictions::load_predictions(&path).map(|artifact| artifact.by_file)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_construction_without_redis() {
        let state = AppState::new(ServerConfig::default(), TelemetryConfig::default()).unwrap();
        assert!(!state.cache.has_remote());
        assert_eq!(state.config.cache_mode_str(), "local-only");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ServerConfig {
            cache_ttl_seconds: 0,
            ..Default::default()
        };
        assert!(AppState::new(config, TelemetryConfig::default()).is_err());
    }

    #[test]
    fn features_param_fallback_chain() {
        let state = AppState::new(ServerConfig::default(), TelemetryConfig::default()).unwrap();

        assert_eq!(state.features_param(None), DEFAULT_FEATURES_PARAM);
        assert_eq!(state.features_param(Some("tile1.json")), "tile1.json");

        state.remember_features_param("tile1.json");
        assert_eq!(state.features_param(None), "tile1.json");
    }
}
