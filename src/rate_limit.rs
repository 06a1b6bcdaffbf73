/// Rate Limiting System
///
/// Two layers: a governor-backed per-address limiter applied to every route,
/// and fixed-window buckets (`consultation`, `tool`) checked by the handlers
/// before any credit or persistence work.
use crate::{
    api::middleware::client_ip,
    config::{BucketQuota, RateLimitConfig},
    error::{ApiError, ApiResult},
    metrics,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter as GovernorLimiter};
use std::{
    collections::HashMap,
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

/// Named category of operation with its own quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Consultation,
    Tool,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Consultation => "consultation",
            Bucket::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    index: u64,
    count: u32,
}

/// Fixed-window counters scoped per bucket and per network address
pub struct BucketLimiter {
    enabled: bool,
    consultation: BucketQuota,
    tool: BucketQuota,
    windows: Mutex<HashMap<(Bucket, String), Window>>,
}

impl BucketLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            consultation: config.consultation,
            tool: config.tool,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn quota(&self, bucket: Bucket) -> BucketQuota {
        match bucket {
            Bucket::Consultation => self.consultation,
            Bucket::Tool => self.tool,
        }
    }

    /// Count one request; refuse once the window's quota is exceeded
    pub fn check(&self, bucket: Bucket, address: &str) -> ApiResult<()> {
        self.check_at(bucket, address, Self::now())
    }

    fn check_at(&self, bucket: Bucket, address: &str, now: u64) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }

        let quota = self.quota(bucket);
        let index = now / quota.window_secs;

        let count = {
            let mut windows = self
                .windows
                .lock()
                .map_err(|_| ApiError::Internal("Rate limiter state poisoned".to_string()))?;
            let window = windows
                .entry((bucket, address.to_string()))
                .or_insert(Window { index, count: 0 });
            if window.index != index {
                *window = Window { index, count: 0 };
            }
            window.count += 1;
            window.count
        };

        debug!(bucket = bucket.as_str(), ip = %address, count, max = quota.max_requests, "Rate limit check");

        if count > quota.max_requests {
            let window_end = (index + 1) * quota.window_secs;
            warn!(bucket = bucket.as_str(), ip = %address, count, "Rate limit exceeded");
            metrics::record_rate_limited(bucket.as_str());
            return Err(ApiError::RateLimitExceeded {
                bucket: bucket.as_str(),
                retry_after: Duration::from_secs(window_end.saturating_sub(now)),
            });
        }

        Ok(())
    }

    /// Requests left in the current window
    pub fn remaining(&self, bucket: Bucket, address: &str) -> u32 {
        let quota = self.quota(bucket);
        let index = Self::now() / quota.window_secs;
        let used = self
            .windows
            .lock()
            .ok()
            .and_then(|windows| windows.get(&(bucket, address.to_string())).copied())
            .filter(|window| window.index == index)
            .map(|window| window.count)
            .unwrap_or(0);
        quota.max_requests.saturating_sub(used)
    }

    /// Drop counters whose window has ended; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Self::now())
    }

    fn purge_expired_at(&self, now: u64) -> usize {
        let Ok(mut windows) = self.windows.lock() else {
            return 0;
        };
        let before = windows.len();
        let (consultation, tool) = (self.consultation, self.tool);
        windows.retain(|(bucket, _), window| {
            let quota = match bucket {
                Bucket::Consultation => consultation,
                Bucket::Tool => tool,
            };
            window.index == now / quota.window_secs
        });
        before - windows.len()
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

type KeyedLimiter = GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    global: Arc<KeyedLimiter>,
    buckets: Arc<BucketLimiter>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_second = NonZeroU32::new(config.global_requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.global_burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            enabled: config.enabled,
            global: Arc::new(GovernorLimiter::keyed(quota)),
            buckets: Arc::new(BucketLimiter::new(config)),
        }
    }

    pub fn buckets(&self) -> &BucketLimiter {
        &self.buckets
    }

    /// Check a bucket for one address
    pub fn check_bucket(&self, bucket: Bucket, address: &str) -> ApiResult<()> {
        self.buckets.check(bucket, address)
    }

    /// Check the global per-address limit
    pub fn check_global(&self, address: &str) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.global
            .check_key(&address.to_string())
            .map_err(|_| ApiError::RateLimitExceeded {
                bucket: "global",
                retry_after: Duration::from_secs(1),
            })
    }

    /// Housekeeping for the background scheduler
    pub fn purge_expired(&self) -> usize {
        self.global.retain_recent();
        self.global.shrink_to_fit();
        self.buckets.purge_expired()
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<crate::context::AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let address = client_ip(request.headers(), peer);

    if let Err(err) = ctx.rate_limiter.check_global(&address) {
        metrics::record_rate_limited("global");
        return err.into_response();
    }

    next.run(request).await
}
