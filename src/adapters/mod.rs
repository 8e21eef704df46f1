// Adapters layer: concrete implementations for external systems.

pub mod osrm;
pub mod storage;

pub use osrm::OsrmRouteProvider;
pub use storage::LocalJsonSink;
