//! Cache provider with enum dispatch
//!
//! Consumers hold a `CacheProvider` and never see the concrete backend. Startup never
//! fails because of the cache: an unreachable or unavailable backend degrades to NoOp.

use std::time::Duration;

use tracing::{info, warn};

use super::errors::CacheResult;
use super::providers::{MokaCacheService, NoOpCacheService};
use super::traits::CacheService;
use crate::config::{CacheBackend as BackendKind, CacheConfig};

#[cfg(feature = "cache-redis")]
use super::providers::RedisCacheService;

#[derive(Debug, Clone)]
enum Backend {
    #[cfg(feature = "cache-redis")]
    Redis(Box<RedisCacheService>),

    Moka(Box<MokaCacheService>),

    /// Always miss, always succeed
    NoOp(NoOpCacheService),
}

#[derive(Debug, Clone)]
pub struct CacheProvider {
    backend: Backend,
}

impl CacheProvider {
    /// Build the configured backend, falling back to NoOp when it cannot be created
    pub async fn from_config_graceful(config: &CacheConfig) -> Self {
        if !config.enabled {
            info!("Query cache disabled by configuration");
            return Self::noop();
        }

        match config.backend {
            BackendKind::Moka => {
                info!(max_capacity = config.max_capacity, "Using moka query cache");
                Self::moka(config.max_capacity)
            }
            BackendKind::Redis => Self::create_redis(config).await,
            BackendKind::None => Self::noop(),
        }
    }

    #[cfg(feature = "cache-redis")]
    async fn create_redis(config: &CacheConfig) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            warn!("Redis cache selected but no redis_url configured, falling back to NoOp");
            return Self::noop();
        };
        match RedisCacheService::connect(url).await {
            Ok(service) => {
                info!("Using redis query cache");
                Self {
                    backend: Backend::Redis(Box::new(service)),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to Redis, falling back to NoOp cache");
                Self::noop()
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn create_redis(_config: &CacheConfig) -> Self {
        warn!("Redis cache selected but the cache-redis feature is not enabled, falling back to NoOp");
        Self::noop()
    }

    pub fn moka(max_capacity: u64) -> Self {
        Self {
            backend: Backend::Moka(Box::new(MokaCacheService::new(max_capacity))),
        }
    }

    pub fn noop() -> Self {
        Self {
            backend: Backend::NoOp(NoOpCacheService::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, Backend::NoOp(_))
    }
}

impl CacheService for CacheProvider {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.get(key).await,
            Backend::Moka(s) => s.get(key).await,
            Backend::NoOp(s) => s.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.set(key, value, ttl).await,
            Backend::Moka(s) => s.set(key, value, ttl).await,
            Backend::NoOp(s) => s.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.delete(key).await,
            Backend::Moka(s) => s.delete(key).await,
            Backend::NoOp(s) => s.delete(key).await,
        }
    }

    async fn health_check(&self) -> CacheResult<bool> {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.health_check().await,
            Backend::Moka(s) => s.health_check().await,
            Backend::NoOp(s) => s.health_check().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match &self.backend {
            #[cfg(feature = "cache-redis")]
            Backend::Redis(s) => s.provider_name(),
            Backend::Moka(s) => s.provider_name(),
            Backend::NoOp(s) => s.provider_name(),
        }
    }
}
