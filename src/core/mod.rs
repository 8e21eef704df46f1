pub mod cache;
pub mod discovery;
pub mod orchestrator;
pub mod persistence;
pub mod resolver;

pub use crate::domain::model::{AmenityCandidate, OriginEntity, ProximityResult, TravelMode};
pub use crate::domain::ports::{AmenityDiscovery, ProgressObserver, ProximityResolver, ResultSink, RouteProvider};
pub use crate::utils::error::Result;
