use crate::config::toml_config::DiscoveryConfig;
use crate::core::cache::GeoCache;
use crate::domain::model::{AmenityCandidate, CategoryDefinition, LatLng};
use crate::domain::ports::AmenityDiscovery;
use crate::utils::error::{ProximityError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

/// Amenity lookups against a pool of Overpass-compatible instances.
///
/// Each call starts on the next instance of the pool and moves one instance
/// further on every failed attempt, for at most `1 + max_retries` attempts.
pub struct AmenityDiscoveryService {
    client: Client,
    config: DiscoveryConfig,
    categories: HashMap<String, CategoryDefinition>,
    cache: Arc<GeoCache>,
    next_instance: AtomicUsize,
}

impl AmenityDiscoveryService {
    pub fn new(config: DiscoveryConfig, categories: Vec<CategoryDefinition>, cache: Arc<GeoCache>) -> Self {
        Self::with_client(Client::new(), config, categories, cache)
    }

    pub fn with_client(
        client: Client,
        config: DiscoveryConfig,
        categories: Vec<CategoryDefinition>,
        cache: Arc<GeoCache>,
    ) -> Self {
        Self {
            client,
            config,
            categories: categories
                .into_iter()
                .map(|category| (category.key.clone(), category))
                .collect(),
            cache,
            next_instance: AtomicUsize::new(0),
        }
    }

    /// Overpass QL for every node, way and relation carrying the category tag.
    pub fn build_query(&self, category: &CategoryDefinition, location: LatLng, radius_m: u32) -> Option<String> {
        let tag = category.tag.as_ref()?;
        let (lat, lng) = location;
        let filter = format!(
            "[\"{}\"=\"{}\"](around:{},{},{})",
            tag.key, tag.value, radius_m, lat, lng
        );
        Some(format!(
            "[out:json][timeout:{}];(node{f};way{f};relation{f};);out center;",
            self.config.server_timeout_seconds,
            f = filter
        ))
    }

    async fn fetch(&self, instance: &str, query: &str, category: &CategoryDefinition) -> Result<Vec<AmenityCandidate>> {
        let response = self
            .client
            .post(instance)
            .timeout(self.config.request_timeout())
            .form(&[("data", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProximityError::ProviderError {
                message: format!("{} answered HTTP {}", instance, status),
            });
        }

        let body: OverpassResponse = response.json().await?;
        Ok(normalize_elements(body.elements, category))
    }
}

fn normalize_elements(elements: Vec<OverpassElement>, category: &CategoryDefinition) -> Vec<AmenityCandidate> {
    elements
        .into_iter()
        .filter_map(|element| {
            let location = match (element.lat, element.lon, &element.center) {
                (Some(lat), Some(lon), _) => (lat, lon),
                (_, _, Some(center)) => (center.lat, center.lon),
                _ => return None,
            };
            let name = element
                .tags
                .get("name")
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unnamed {}", category.label));
            Some(AmenityCandidate {
                id: format!("{}/{}", element.kind, element.id),
                name,
                location,
                category: category.key.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl AmenityDiscovery for AmenityDiscoveryService {
    async fn discover(&self, location: LatLng, category: &str, radius_m: u32) -> Vec<AmenityCandidate> {
        self.cache.evict_expired();
        let key = GeoCache::key(location.0, location.1, radius_m, category);
        if let Some(candidates) = self.cache.get(&key) {
            tracing::debug!("🗺️ Cache hit for {}", key);
            return candidates;
        }

        let Some(definition) = self.categories.get(category) else {
            tracing::warn!("Unknown category '{}', nothing to discover", category);
            return Vec::new();
        };
        let Some(query) = self.build_query(definition, location, radius_m) else {
            tracing::debug!("Category '{}' has no backend tag, skipping lookup", category);
            return Vec::new();
        };

        let pool = &self.config.instances;
        if pool.is_empty() {
            tracing::warn!("No amenity backend instances configured");
            return Vec::new();
        }

        let start = self.next_instance.fetch_add(1, Ordering::Relaxed);
        let max_attempts = self.config.max_retries as usize + 1;

        for attempt in 0..max_attempts {
            let instance = &pool[(start + attempt) % pool.len()];
            tracing::debug!(
                "📡 Discovering '{}' within {}m of {:?} via {} (attempt {}/{})",
                category,
                radius_m,
                location,
                instance,
                attempt + 1,
                max_attempts
            );

            match self.fetch(instance, &query, definition).await {
                Ok(candidates) => {
                    if !candidates.is_empty() {
                        self.cache.put(key, candidates.clone());
                    }
                    tracing::debug!("Found {} '{}' candidates", candidates.len(), category);
                    return candidates;
                }
                Err(e) => {
                    tracing::warn!("Amenity lookup via {} failed: {}", instance, e);
                }
            }
        }

        tracing::warn!(
            "All {} attempts to discover '{}' near {:?} failed, treating as no candidates",
            max_attempts,
            category,
            location
        );
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn service(instances: Vec<String>, cache: Arc<GeoCache>) -> AmenityDiscoveryService {
        let config = DiscoveryConfig {
            instances,
            request_timeout_seconds: 5,
            ..DiscoveryConfig::default()
        };
        AmenityDiscoveryService::new(config, CategoryDefinition::builtin(), cache)
    }

    fn overpass_body() -> serde_json::Value {
        serde_json::json!({
            "elements": [
                {"type": "node", "id": 101, "lat": 0.3151, "lon": 32.5802, "tags": {"amenity": "marketplace", "name": "Nakasero Market"}},
                {"type": "way", "id": 202, "center": {"lat": 0.3120, "lon": 32.5790}, "tags": {"amenity": "marketplace"}},
                {"type": "relation", "id": 303, "tags": {"amenity": "marketplace", "name": "No Geometry"}}
            ]
        })
    }

    #[tokio::test]
    async fn test_discover_normalizes_elements() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/interpreter")
                .body_contains("marketplace");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(overpass_body());
        });

        let discovery = service(vec![server.url("/api/interpreter")], Arc::new(GeoCache::new()));
        let candidates = discovery.discover((0.3136, 32.5811), "market", 2000).await;

        api_mock.assert();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "node/101");
        assert_eq!(candidates[0].name, "Nakasero Market");
        assert_eq!(candidates[0].location, (0.3151, 32.5802));
        assert_eq!(candidates[1].id, "way/202");
        assert_eq!(candidates[1].name, "Unnamed Market");
        assert_eq!(candidates[1].location, (0.3120, 32.5790));
        assert_eq!(candidates[1].category, "market");
    }

    #[tokio::test]
    async fn test_second_call_within_ttl_uses_cache() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(200).json_body(overpass_body());
        });

        let discovery = service(vec![server.url("/api/interpreter")], Arc::new(GeoCache::new()));
        let first = discovery.discover((0.3136, 32.5811), "market", 2000).await;
        let second = discovery.discover((0.3136, 32.5811), "market", 2000).await;

        api_mock.assert_hits(1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_expired_entry_triggers_fresh_lookup() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(200).json_body(overpass_body());
        });

        let cache = Arc::new(GeoCache::with_ttl(Duration::from_millis(50)));
        let discovery = service(vec![server.url("/api/interpreter")], cache.clone());
        discovery.discover((0.3136, 32.5811), "market", 2000).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        discovery.discover((0.3136, 32.5811), "market", 2000).await;

        api_mock.assert_hits(2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failover_is_bounded_to_four_attempts() {
        let primary = MockServer::start();
        let secondary = MockServer::start();
        let primary_mock = primary.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(503);
        });
        let secondary_mock = secondary.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(500);
        });

        let discovery = service(
            vec![primary.url("/api/interpreter"), secondary.url("/api/interpreter")],
            Arc::new(GeoCache::new()),
        );
        let candidates = discovery.discover((0.3136, 32.5811), "market", 2000).await;

        assert!(candidates.is_empty());
        assert_eq!(primary_mock.hits() + secondary_mock.hits(), 4);
        assert_eq!(primary_mock.hits(), 2);
        assert_eq!(secondary_mock.hits(), 2);
    }

    #[tokio::test]
    async fn test_failover_rotates_to_healthy_instance() {
        let broken = MockServer::start();
        let healthy = MockServer::start();
        let broken_mock = broken.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(504);
        });
        let healthy_mock = healthy.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(200).json_body(overpass_body());
        });

        let discovery = service(
            vec![broken.url("/api/interpreter"), healthy.url("/api/interpreter")],
            Arc::new(GeoCache::new()),
        );
        let candidates = discovery.discover((0.3136, 32.5811), "market", 2000).await;

        broken_mock.assert_hits(1);
        healthy_mock.assert_hits(1);
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_response_is_not_cached() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(200).json_body(serde_json::json!({"elements": []}));
        });

        let cache = Arc::new(GeoCache::new());
        let discovery = service(vec![server.url("/api/interpreter")], cache.clone());
        assert!(discovery.discover((0.3136, 32.5811), "market", 2000).await.is_empty());
        assert!(discovery.discover((0.3136, 32.5811), "market", 2000).await.is_empty());

        api_mock.assert_hits(2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_untagged_category_skips_network() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/api/interpreter");
            then.status(200).json_body(overpass_body());
        });

        let mut categories = CategoryDefinition::builtin();
        categories.push(CategoryDefinition::new("bus_stop", "Bus stop", None));
        let config = DiscoveryConfig {
            instances: vec![server.url("/api/interpreter")],
            ..DiscoveryConfig::default()
        };
        let discovery = AmenityDiscoveryService::new(config, categories, Arc::new(GeoCache::new()));

        assert!(discovery.discover((0.3136, 32.5811), "bus_stop", 2000).await.is_empty());
        assert!(discovery.discover((0.3136, 32.5811), "bakery", 2000).await.is_empty());
        api_mock.assert_hits(0);
    }

    #[test]
    fn test_build_query() {
        let discovery = service(vec!["http://localhost/api/interpreter".to_string()], Arc::new(GeoCache::new()));
        let category = CategoryDefinition::new("clinic", "Clinic", Some(("amenity", "clinic")));
        let query = discovery.build_query(&category, (0.5, 32.25), 5000).unwrap();
        assert_eq!(
            query,
            "[out:json][timeout:30];(node[\"amenity\"=\"clinic\"](around:5000,0.5,32.25);\
             way[\"amenity\"=\"clinic\"](around:5000,0.5,32.25);\
             relation[\"amenity\"=\"clinic\"](around:5000,0.5,32.25););out center;"
        );
    }
}
