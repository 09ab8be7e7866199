use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::AvailabilityDecision;

/// Cached decisions expire after 15 minutes.
pub const AVAILABILITY_TTL_SECONDS: usize = 900;
/// Per-therapist key tracking lists expire after one hour.
pub const KEY_TRACKING_TTL_SECONDS: usize = 3600;

/// Full identity of one evaluation result. Any component changing makes a
/// distinct cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityCacheKey {
    pub therapist_id: Uuid,
    pub candidate_time: DateTime<Utc>,
    pub all_of_day: bool,
    pub exclude_appointment_id: Option<Uuid>,
}

impl AvailabilityCacheKey {
    pub fn redis_key(&self) -> String {
        let exclude = self
            .exclude_appointment_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "availability:{}:{}:{}:{}",
            self.therapist_id,
            self.candidate_time.timestamp(),
            self.all_of_day,
            exclude
        )
    }

    /// List of every cached key written for one therapist, so a booking-write
    /// can invalidate them in one call.
    pub fn tracking_key(therapist_id: Uuid) -> String {
        format!("availability:keys:{}", therapist_id)
    }
}

/// TTL-scoped memoization of evaluator results in Redis. Purely an
/// optimization: every store failure degrades to a miss or a no-op so callers
/// always fall back to recomputation.
pub struct AvailabilityCache {
    pool: Pool,
}

impl AvailabilityCache {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| anyhow!("Failed to create Redis pool: {}", e))?;

        // Probe the connection so misconfiguration surfaces at startup.
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Availability cache initialized");

        Ok(Self { pool })
    }

    pub async fn cache_availability(
        &self,
        key: &AvailabilityCacheKey,
        decision: &AvailabilityDecision,
    ) {
        if let Err(e) = self.try_store(key, decision).await {
            warn!("Availability cache write failed, continuing uncached: {}", e);
        }
    }

    pub async fn get_cached_availability(
        &self,
        key: &AvailabilityCacheKey,
    ) -> Option<AvailabilityDecision> {
        match self.try_load(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Availability cache read failed, recomputing: {}", e);
                None
            }
        }
    }

    /// Drop every tracked decision for one therapist plus the tracking list
    /// itself. The booking-write path calls this whenever the therapist's
    /// schedule or appointments change; otherwise staleness is bounded by the
    /// entry TTL.
    pub async fn invalidate_therapist(&self, therapist_id: Uuid) {
        if let Err(e) = self.try_invalidate(therapist_id).await {
            warn!(
                "Availability cache invalidation failed for therapist {}: {}",
                therapist_id, e
            );
        }
    }

    async fn connection(&self) -> Result<Connection> {
        Ok(self.pool.get().await?)
    }

    async fn try_store(
        &self,
        key: &AvailabilityCacheKey,
        decision: &AvailabilityDecision,
    ) -> Result<()> {
        let mut conn = self.connection().await?;

        let payload = serde_json::to_string(decision)?;
        let redis_key = key.redis_key();
        let _: () = conn
            .set_ex(&redis_key, payload, AVAILABILITY_TTL_SECONDS as u64)
            .await?;

        let tracking = AvailabilityCacheKey::tracking_key(key.therapist_id);
        let _: () = conn.rpush(&tracking, &redis_key).await?;
        let _: () = conn.expire(&tracking, KEY_TRACKING_TTL_SECONDS as i64).await?;

        debug!("Cached availability under {}", redis_key);
        Ok(())
    }

    async fn try_load(&self, key: &AvailabilityCacheKey) -> Result<Option<AvailabilityDecision>> {
        let mut conn = self.connection().await?;

        let raw: Option<String> = conn.get(key.redis_key()).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn try_invalidate(&self, therapist_id: Uuid) -> Result<()> {
        let mut conn = self.connection().await?;

        let tracking = AvailabilityCacheKey::tracking_key(therapist_id);
        let tracked: Vec<String> = conn.lrange(&tracking, 0, -1).await?;
        if !tracked.is_empty() {
            let _: () = conn.del(&tracked).await?;
        }
        let _: () = conn.del(&tracking).await?;

        debug!(
            "Invalidated {} cached decisions for therapist {}",
            tracked.len(),
            therapist_id
        );
        Ok(())
    }
}
