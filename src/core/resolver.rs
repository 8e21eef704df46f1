use crate::config::toml_config::RoutingConfig;
use crate::domain::model::{AmenityCandidate, OriginEntity, ProximityResult, RouteMetrics, TravelMode};
use crate::domain::ports::{ProximityResolver, RouteProvider};
use crate::utils::error::{ProximityError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Fans out one route request per candidate and keeps the shortest.
///
/// Every `resolve` call gets its own limiter of `concurrency_limit`
/// permits, so origins resolved side by side each get their own budget.
/// `global_limiter`, when set, additionally bounds requests across calls.
pub struct RouteDistanceResolver<P: RouteProvider> {
    provider: P,
    concurrency_limit: usize,
    request_timeout: Duration,
    global_limiter: Option<Arc<Semaphore>>,
}

impl<P: RouteProvider> RouteDistanceResolver<P> {
    pub fn new(provider: P, config: &RoutingConfig) -> Self {
        Self {
            provider,
            concurrency_limit: config.concurrency_limit.max(1),
            request_timeout: config.request_timeout(),
            global_limiter: config
                .global_concurrency_limit
                .map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
        }
    }

    async fn route_one(
        &self,
        limiter: &Semaphore,
        origin: (f64, f64),
        candidate: &AmenityCandidate,
        mode: TravelMode,
    ) -> Result<RouteMetrics> {
        let _permit = limiter.acquire().await.map_err(|_| ProximityError::ProviderError {
            message: "route limiter closed".to_string(),
        })?;
        let _global_permit = match &self.global_limiter {
            Some(global) => Some(global.acquire().await.map_err(|_| ProximityError::ProviderError {
                message: "global route limiter closed".to_string(),
            })?),
            None => None,
        };

        match tokio::time::timeout(self.request_timeout, self.provider.route(origin, candidate, mode)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProximityError::ProviderError {
                message: format!(
                    "route to {} timed out after {:?}",
                    candidate.id, self.request_timeout
                ),
            }),
        }
    }
}

/// Index of the first entry with the smallest distance.
pub fn select_nearest(distances_km: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, &distance) in distances_km.iter().enumerate() {
        match best {
            Some(current) if distance >= distances_km[current] => {}
            _ => best = Some(index),
        }
    }
    best
}

#[async_trait]
impl<P: RouteProvider> ProximityResolver for RouteDistanceResolver<P> {
    async fn resolve(
        &self,
        origin: &OriginEntity,
        candidates: &[AmenityCandidate],
        mode: TravelMode,
    ) -> Result<Option<ProximityResult>> {
        let origin_location = origin
            .checked_location()
            .map_err(|reason| ProximityError::InvalidOrigin {
                origin_id: origin.id.clone(),
                reason,
            })?;

        let valid: Vec<&AmenityCandidate> = candidates.iter().filter(|c| c.has_valid_location()).collect();
        if valid.len() < candidates.len() {
            tracing::debug!(
                "Skipping {} candidates with invalid coordinates for {}",
                candidates.len() - valid.len(),
                origin.id
            );
        }
        if valid.is_empty() {
            return Ok(None);
        }

        let limiter = Semaphore::new(self.concurrency_limit);
        let outcomes = join_all(
            valid
                .iter()
                .map(|candidate| self.route_one(&limiter, origin_location, candidate, mode)),
        )
        .await;

        let mut reachable: Vec<(&AmenityCandidate, RouteMetrics)> = Vec::with_capacity(outcomes.len());
        for (candidate, outcome) in valid.iter().copied().zip(outcomes) {
            match outcome {
                Ok(metrics) => reachable.push((candidate, metrics)),
                Err(e) if e.is_systemic() => {
                    tracing::error!("❌ Routing for {} failed systemically: {}", origin.id, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Route from {} to {} failed: {}", origin.id, candidate.id, e);
                }
            }
        }

        let distances: Vec<f64> = reachable.iter().map(|(_, metrics)| metrics.distance_km).collect();
        let Some(best) = select_nearest(&distances) else {
            tracing::debug!("No reachable candidate for {}", origin.id);
            return Ok(None);
        };

        let (candidate, metrics) = reachable.swap_remove(best);
        tracing::debug!(
            "Nearest to {} is {} at {:.2} km ({} of {} reachable)",
            origin.id,
            candidate.name,
            metrics.distance_km,
            best + 1,
            distances.len()
        );

        Ok(Some(ProximityResult {
            origin_id: origin.id.clone(),
            origin_name: origin.display_name.clone(),
            candidate_id: candidate.id.clone(),
            candidate_name: candidate.name.clone(),
            distance_km: metrics.distance_km,
            duration_sec: metrics.duration_sec,
            travel_mode: mode,
            path_encoding: metrics.path_encoding,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a fixed table of distances; ids listed in `failing` error out.
    struct TableProvider {
        distances: HashMap<String, f64>,
        failing: Vec<String>,
        hanging: Vec<String>,
        systemic: bool,
        delay: Duration,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl TableProvider {
        fn new(distances: &[(&str, f64)]) -> Self {
            Self {
                distances: distances.iter().map(|(id, d)| (id.to_string(), *d)).collect(),
                failing: Vec::new(),
                hanging: Vec::new(),
                systemic: false,
                delay: Duration::from_millis(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing(mut self, id: &str) -> Self {
            self.failing.push(id.to_string());
            self
        }

        fn hanging(mut self, id: &str) -> Self {
            self.hanging.push(id.to_string());
            self
        }

        fn systemic(mut self) -> Self {
            self.systemic = true;
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl RouteProvider for TableProvider {
        async fn route(
            &self,
            _origin: (f64, f64),
            destination: &AmenityCandidate,
            _mode: TravelMode,
        ) -> Result<RouteMetrics> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if self.hanging.contains(&destination.id) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&destination.id) {
                return Err(if self.systemic {
                    ProximityError::AuthRejected { status: 403 }
                } else {
                    ProximityError::ProviderError {
                        message: "upstream timeout".to_string(),
                    }
                });
            }
            let distance_km = self.distances[&destination.id];
            Ok(RouteMetrics {
                candidate_id: destination.id.clone(),
                distance_km,
                duration_sec: distance_km * 120.0,
                path_encoding: Some(format!("path-{}", destination.id)),
                steps: Vec::new(),
            })
        }
    }

    fn candidate(id: &str) -> AmenityCandidate {
        AmenityCandidate {
            id: id.to_string(),
            name: format!("Clinic {}", id),
            location: (0.31, 32.58),
            category: "clinic".to_string(),
        }
    }

    fn origin() -> OriginEntity {
        OriginEntity::new("school-1", "Hillside Primary", Some((32.58, 0.31)))
    }

    fn resolver(provider: TableProvider) -> RouteDistanceResolver<TableProvider> {
        RouteDistanceResolver::new(provider, &RoutingConfig::default())
    }

    #[test]
    fn test_select_nearest_keeps_first_minimum() {
        assert_eq!(select_nearest(&[5.2, 3.1, 3.1, 8.0]), Some(1));
        assert_eq!(select_nearest(&[2.0]), Some(0));
        assert_eq!(select_nearest(&[]), None);
    }

    #[tokio::test]
    async fn test_resolve_picks_first_of_tied_minimum() {
        let provider = TableProvider::new(&[("a", 5.2), ("b", 3.1), ("c", 3.1), ("d", 8.0)]);
        let candidates = vec![candidate("a"), candidate("b"), candidate("c"), candidate("d")];

        let result = resolver(provider)
            .resolve(&origin(), &candidates, TravelMode::Driving)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.candidate_id, "b");
        assert_eq!(result.candidate_name, "Clinic b");
        assert_eq!(result.distance_km, 3.1);
        assert_eq!(result.origin_name, "Hillside Primary");
        assert_eq!(result.path_encoding.as_deref(), Some("path-b"));
    }

    #[tokio::test]
    async fn test_single_failure_does_not_abort_fan_out() {
        let provider = TableProvider::new(&[("a", 5.2), ("b", 1.0), ("c", 3.1), ("d", 8.0)]).failing("b");
        let candidates = vec![candidate("a"), candidate("b"), candidate("c"), candidate("d")];

        let result = resolver(provider)
            .resolve(&origin(), &candidates, TravelMode::Driving)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.candidate_id, "c");
        assert_eq!(result.distance_km, 3.1);
    }

    #[tokio::test]
    async fn test_all_failures_yield_no_result() {
        let provider = TableProvider::new(&[("a", 1.0)]).failing("a");
        let result = resolver(provider)
            .resolve(&origin(), &[candidate("a")], TravelMode::Walking)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_invalid_candidates_are_filtered() {
        let provider = TableProvider::new(&[("a", 1.0)]);
        let mut broken = candidate("a");
        broken.location = (f64::NAN, 32.0);

        let result = resolver(provider)
            .resolve(&origin(), &[broken], TravelMode::Driving)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_auth_rejection_surfaces_as_error() {
        let provider = TableProvider::new(&[("a", 1.0), ("b", 2.0)]).failing("b").systemic();
        let err = resolver(provider)
            .resolve(&origin(), &[candidate("a"), candidate("b")], TravelMode::Driving)
            .await
            .unwrap_err();
        assert!(matches!(err, ProximityError::AuthRejected { status: 403 }));
    }

    #[tokio::test]
    async fn test_fan_out_respects_concurrency_limit() {
        let ids: Vec<String> = (0..8).map(|i| format!("c{}", i)).collect();
        let table: Vec<(&str, f64)> = ids.iter().map(|id| (id.as_str(), 1.0)).collect();
        let provider = TableProvider::new(&table).with_delay(Duration::from_millis(20));
        let candidates: Vec<AmenityCandidate> = ids.iter().map(|id| candidate(id)).collect();

        let resolver = resolver(provider);
        let result = resolver
            .resolve(&origin(), &candidates, TravelMode::Driving)
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(resolver.provider.peak_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_origin_without_location_is_rejected() {
        let provider = TableProvider::new(&[("a", 1.0)]);
        let origin = OriginEntity::new("s2", "No Coordinates", None);
        let err = resolver(provider)
            .resolve(&origin, &[candidate("a")], TravelMode::Driving)
            .await
            .unwrap_err();
        assert!(matches!(err, ProximityError::InvalidOrigin { .. }));
    }

    #[tokio::test]
    async fn test_hanging_route_times_out_without_blocking_the_rest() {
        let provider = TableProvider::new(&[("a", 0.5), ("b", 2.0), ("c", 4.0)]).hanging("a");
        let config = RoutingConfig {
            request_timeout_seconds: 1,
            ..RoutingConfig::default()
        };
        let resolver = RouteDistanceResolver::new(provider, &config);

        let started = std::time::Instant::now();
        let result = resolver
            .resolve(&origin(), &[candidate("a"), candidate("b"), candidate("c")], TravelMode::Driving)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.candidate_id, "b");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_global_limit_caps_concurrent_resolves() {
        let ids: Vec<String> = (0..3).map(|i| format!("c{}", i)).collect();
        let table: Vec<(&str, f64)> = ids.iter().map(|id| (id.as_str(), 1.0)).collect();
        let provider = TableProvider::new(&table).with_delay(Duration::from_millis(30));
        let config = RoutingConfig {
            global_concurrency_limit: Some(2),
            ..RoutingConfig::default()
        };
        let resolver = RouteDistanceResolver::new(provider, &config);
        let candidates: Vec<AmenityCandidate> = ids.iter().map(|id| candidate(id)).collect();
        let first_origin = origin();
        let second_origin = OriginEntity::new("school-2", "Riverside Primary", Some((32.59, 0.32)));

        let (first, second) = tokio::join!(
            resolver.resolve(&first_origin, &candidates, TravelMode::Driving),
            resolver.resolve(&second_origin, &candidates, TravelMode::Driving),
        );

        assert!(first.unwrap().is_some());
        assert!(second.unwrap().is_some());
        assert_eq!(resolver.provider.peak_in_flight.load(Ordering::SeqCst), 2);
    }
}
