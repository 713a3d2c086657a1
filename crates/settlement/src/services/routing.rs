//! Route resolution with a straight-line fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{GeoPoint, RouteLeg};

use crate::error::{ErrorKind, SettlementError};

/// Default time allowed for a routing lookup.
pub const DEFAULT_ROUTING_TIMEOUT: Duration = Duration::from_secs(2);

/// Default assumed speed for straight-line estimates.
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 25.0;

/// Trait for resolving the travelled distance and time between two points.
#[async_trait]
pub trait RouteResolver: Send + Sync {
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, SettlementError>;
}

/// Haversine distance at a constant average speed.
#[derive(Debug, Clone, Copy)]
pub struct StraightLineRouter {
    average_speed_kmh: f64,
}

impl StraightLineRouter {
    pub fn new(average_speed_kmh: f64) -> Self {
        let average_speed_kmh = if average_speed_kmh.is_finite() && average_speed_kmh > 0.0 {
            average_speed_kmh
        } else {
            DEFAULT_AVERAGE_SPEED_KMH
        };
        Self { average_speed_kmh }
    }

    pub fn estimate(&self, from: GeoPoint, to: GeoPoint, degraded: bool) -> RouteLeg {
        let km = from.distance_km(&to);
        let seconds = (km / self.average_speed_kmh * 3600.0).round() as i64;
        RouteLeg::new(km, seconds, degraded)
    }
}

impl Default for StraightLineRouter {
    fn default() -> Self {
        Self::new(DEFAULT_AVERAGE_SPEED_KMH)
    }
}

#[async_trait]
impl RouteResolver for StraightLineRouter {
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteLeg, SettlementError> {
        Ok(self.estimate(from, to, false))
    }
}

/// Wraps a resolver with a timeout. Slow or failing lookups fall back to a
/// straight-line estimate flagged as degraded, so routing never fails a
/// transition.
#[derive(Clone)]
pub struct ResilientRouter {
    inner: Arc<dyn RouteResolver>,
    timeout: Duration,
    fallback: StraightLineRouter,
}

impl ResilientRouter {
    pub fn new(inner: Arc<dyn RouteResolver>, timeout: Duration, average_speed_kmh: f64) -> Self {
        Self {
            inner,
            timeout,
            fallback: StraightLineRouter::new(average_speed_kmh),
        }
    }

    /// Straight-line routing only; nothing to time out.
    pub fn straight_line(average_speed_kmh: f64) -> Self {
        let router = StraightLineRouter::new(average_speed_kmh);
        Self::new(Arc::new(router), DEFAULT_ROUTING_TIMEOUT, average_speed_kmh)
    }

    pub async fn resolve(&self, from: GeoPoint, to: GeoPoint) -> RouteLeg {
        let reason = match tokio::time::timeout(self.timeout, self.inner.route(from, to)).await {
            Ok(Ok(leg)) => return leg,
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        metrics::counter!("routing_fallbacks_total").increment(1);
        tracing::warn!(
            kind = %ErrorKind::ExternalServiceDegraded,
            %reason,
            "routing unavailable, using straight-line estimate"
        );
        self.fallback.estimate(from, to, true)
    }
}

impl Default for ResilientRouter {
    fn default() -> Self {
        Self::straight_line(DEFAULT_AVERAGE_SPEED_KMH)
    }
}

impl std::fmt::Debug for ResilientRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientRouter")
            .field("timeout", &self.timeout)
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}
