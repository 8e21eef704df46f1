use crate::domain::model::{
    AmenityCandidate, LatLng, LonLat, OriginEntity, Progress, ProximityDocument, ProximityResult,
    RouteMetrics, TravelMode,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Finds candidate amenities around a point. Total failure is an empty list, never an error.
#[async_trait]
pub trait AmenityDiscovery: Send + Sync {
    async fn discover(&self, location: LatLng, category: &str, radius_m: u32) -> Vec<AmenityCandidate>;
}

/// Travel metrics between one origin and one destination.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn route(
        &self,
        origin: LonLat,
        destination: &AmenityCandidate,
        mode: TravelMode,
    ) -> Result<RouteMetrics>;
}

/// Picks the nearest reachable candidate for an origin.
///
/// `Ok(None)` means nothing was reachable. `Err` is reserved for failures
/// that should stop the whole run.
#[async_trait]
pub trait ProximityResolver: Send + Sync {
    async fn resolve(
        &self,
        origin: &OriginEntity,
        candidates: &[AmenityCandidate],
        mode: TravelMode,
    ) -> Result<Option<ProximityResult>>;
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: Progress);
}

impl<F> ProgressObserver for F
where
    F: Fn(Progress) + Send + Sync,
{
    fn on_progress(&self, progress: Progress) {
        self(progress)
    }
}

pub trait ResultSink: Send + Sync {
    fn save_chunk(
        &self,
        chunk_index: usize,
        documents: &[ProximityDocument],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
