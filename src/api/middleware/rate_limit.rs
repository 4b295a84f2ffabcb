use crate::AppState;
use crate::config::ProcessingConfig;
use axum::Router;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

/// Token bucket shape for `points` requests per `duration_secs`: one token
/// comes back every `interval_ms`, at most `burst` are banked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub interval_ms: u64,
    pub burst: u32,
}

impl Quota {
    /// `None` when limiting is switched off (`RATE_LIMIT_POINTS=0`)
    pub fn from_config(config: &ProcessingConfig) -> Option<Self> {
        let points = config.rate_limit_points;
        if points == 0 {
            return None;
        }

        let window_ms = config.rate_limit_duration_secs.saturating_mul(1000);
        Some(Self {
            interval_ms: (window_ms / u64::from(points)).max(1),
            burst: points,
        })
    }
}

/// Wraps `router` in a per-client governor.
///
/// Clients are keyed on the peer address. Forwarding headers are only honored
/// when `trust_proxy_headers` is set, since any client can forge them.
pub fn with_rate_limit(router: Router<AppState>, config: &ProcessingConfig) -> Router<AppState> {
    let Some(quota) = Quota::from_config(config) else {
        tracing::info!("Rate limiting disabled");
        return router;
    };

    if config.trust_proxy_headers {
        let governor = GovernorConfigBuilder::default()
            .per_millisecond(quota.interval_ms)
            .burst_size(quota.burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish();
        match governor {
            Some(governor) => router.layer(GovernorLayer {
                config: Arc::new(governor),
            }),
            None => {
                tracing::warn!(?quota, "Invalid rate limit quota, limiting disabled");
                router
            }
        }
    } else {
        let governor = GovernorConfigBuilder::default()
            .per_millisecond(quota.interval_ms)
            .burst_size(quota.burst)
            .finish();
        match governor {
            Some(governor) => router.layer(GovernorLayer {
                config: Arc::new(governor),
            }),
            None => {
                tracing::warn!(?quota, "Invalid rate limit quota, limiting disabled");
                router
            }
        }
    }
}
