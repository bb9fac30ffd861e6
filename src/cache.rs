//! Result cache in front of [`RiskEngine`] VaR calculations.
//!
//! Entries are keyed by a fingerprint of the position set, the price
//! snapshot version, the methodology, confidence, seed and valuation date.
//! The store is an external collaborator that may be unavailable; the
//! façade then fails open and computes the result directly.

use crate::core::error::Result;
use crate::core::position::Position;
use crate::engine::{RiskEngine, VarRequest};
use crate::var::{Methodology, VarResult};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Namespace for cache fingerprints.
const FINGERPRINT_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b9e_43a7_4d0e_9c55_1a0e_7d3b_52f4);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cannot fingerprint request: {0}")]
    Fingerprint(String),
}

/// Stable identifier of one VaR request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(Uuid);

impl CacheKey {
    /// Fingerprint a request. Position order does not matter, and requests
    /// on the same valuation date share a key whatever their time of day.
    pub fn fingerprint(
        positions: &[Position],
        snapshot_version: &str,
        request: &VarRequest,
    ) -> std::result::Result<Self, CacheError> {
        #[derive(Serialize)]
        struct Canonical<'a> {
            positions: Vec<&'a Position>,
            snapshot_version: &'a str,
            methodology: Methodology,
            confidence: f64,
            seed: Option<u64>,
            valuation_date: NaiveDate,
        }

        let mut sorted: Vec<&Position> = positions.iter().collect();
        sorted.sort_by_key(|p| p.id());
        let canonical = Canonical {
            positions: sorted,
            snapshot_version,
            methodology: request.methodology,
            confidence: request.confidence,
            seed: match request.methodology {
                Methodology::MonteCarlo => request.seed,
                _ => None,
            },
            valuation_date: request.as_of.date_naive(),
        };
        let bytes =
            serde_json::to_vec(&canonical).map_err(|e| CacheError::Fingerprint(e.to_string()))?;
        Ok(Self(Uuid::new_v5(&FINGERPRINT_NAMESPACE, &bytes)))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External key/value store for VaR results. Writes are idempotent.
pub trait CacheStore: Send + Sync {
    fn try_get(&self, key: &CacheKey) -> std::result::Result<Option<VarResult>, CacheError>;

    fn set(&self, key: &CacheKey, value: &VarResult, ttl: Duration) -> std::result::Result<(), CacheError>;
}

/// Process-local store with per-entry expiry. Expired entries are purged
/// on every write.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<CacheKey, (VarResult, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|e| e.values().filter(|(_, expires)| *expires > Instant::now()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for InMemoryCache {
    fn try_get(&self, key: &CacheKey) -> std::result::Result<Option<VarResult>, CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &CacheKey, value: &VarResult, ttl: Duration) -> std::result::Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        if entries.len() < before {
            debug!("purged {} expired cache entries", before - entries.len());
        }
        entries.insert(*key, (value.clone(), now + ttl));
        Ok(())
    }
}

/// Caching façade over [`RiskEngine::calculate_portfolio_var`].
///
/// Cache failures are logged and never reach the caller. Failed
/// calculations are not cached.
#[derive(Clone)]
pub struct CachedRiskEngine {
    engine: RiskEngine,
    store: Arc<dyn CacheStore>,
    snapshot_version: String,
}

impl CachedRiskEngine {
    pub fn new(engine: RiskEngine, store: Arc<dyn CacheStore>, snapshot_version: impl Into<String>) -> Self {
        Self {
            engine,
            store,
            snapshot_version: snapshot_version.into(),
        }
    }

    pub fn engine(&self) -> &RiskEngine {
        &self.engine
    }

    pub fn snapshot_version(&self) -> &str {
        &self.snapshot_version
    }

    /// Point the façade at a new price snapshot; older entries stop matching.
    pub fn with_snapshot_version(mut self, version: impl Into<String>) -> Self {
        self.snapshot_version = version.into();
        self
    }

    pub fn calculate_portfolio_var(
        &self,
        positions: &[Position],
        request: &VarRequest,
    ) -> Result<VarResult> {
        let key = match CacheKey::fingerprint(positions, &self.snapshot_version, request) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("{}; computing without cache", e);
                None
            }
        };

        if let Some(key) = &key {
            match self.store.try_get(key) {
                Ok(Some(hit)) => {
                    debug!("cache hit {}", key);
                    return Ok(hit);
                }
                Ok(None) => debug!("cache miss {}", key),
                Err(e) => warn!("{}; computing without cache", e),
            }
        }

        let result = self.engine.calculate_portfolio_var(positions, request)?;

        if let Some(key) = &key {
            if let Err(e) = self.store.set(key, &result, self.engine.config().cache_ttl()) {
                warn!("failed to cache result {}: {}", key, e);
            }
        }
        Ok(result)
    }
}
