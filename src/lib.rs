pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::AppConfig;

pub use adapters::{LocalJsonSink, OsrmRouteProvider};
pub use core::{
    cache::GeoCache,
    discovery::AmenityDiscoveryService,
    orchestrator::{BatchOrchestrator, CancellationFlag, RunReport, RunState},
    persistence::{persist_report, persist_results},
    resolver::RouteDistanceResolver,
};
pub use utils::error::{ProximityError, Result};
