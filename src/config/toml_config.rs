use crate::domain::model::CategoryDefinition;
use crate::utils::error::{ProximityError, Result};
use crate::utils::validation::{
    validate_increasing, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, validate_unique_keys, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoveryConfig,
    pub categories: Vec<CategoryDefinition>,
    pub search: SearchConfig,
    pub routing: RoutingConfig,
    pub batch: BatchConfig,
    pub cache: CacheConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Interchangeable amenity backend endpoints, tried round-robin.
    pub instances: Vec<String>,
    pub request_timeout_seconds: u64,
    /// Timeout the backend is asked to enforce on its side.
    pub server_timeout_seconds: u64,
    pub max_retries: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            instances: vec![
                "https://overpass-api.de/api/interpreter".to_string(),
                "https://overpass.kumi.systems/api/interpreter".to_string(),
                "https://overpass.private.coffee/api/interpreter".to_string(),
            ],
            request_timeout_seconds: 15,
            server_timeout_seconds: 30,
            max_retries: 3,
        }
    }
}

impl DiscoveryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Metres; each tier is only tried when the previous one found nothing.
    pub radius_tiers: Vec<u32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_tiers: vec![2000, 5000, 10000],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub concurrency_limit: usize,
    pub request_timeout_seconds: u64,
    /// Caps routing requests across all origins of a batch when set.
    pub global_concurrency_limit: Option<usize>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.project-osrm.org".to_string(),
            api_key: None,
            concurrency_limit: 3,
            request_timeout_seconds: 20,
            global_concurrency_limit: None,
        }
    }
}

impl RoutingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub initial_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub inter_batch_delay_ms: u64,
    /// Batches faster than this grow by one.
    pub fast_batch_ms: u64,
    /// Batches slower than this shrink by one.
    pub slow_batch_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            initial_size: 5,
            min_size: 2,
            max_size: 10,
            inter_batch_delay_ms: 1000,
            fast_batch_ms: 1000,
            slow_batch_ms: 3000,
        }
    }
}

impl BatchConfig {
    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn fast_threshold(&self) -> Duration {
        Duration::from_millis(self.fast_batch_ms)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_batch_ms)
    }

    /// `(min, max)` batch size, ordered and never below one.
    pub fn size_bounds(&self) -> (usize, usize) {
        let lower = self.min_size.min(self.max_size).max(1);
        let upper = self.min_size.max(self.max_size).max(lower);
        (lower, upper)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_ms: 3_600_000 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub chunk_size: usize,
    pub output_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            chunk_size: 25,
            output_path: "./output".to_string(),
        }
    }
}

impl AppConfig {
    /// Loads and parses a TOML file, substituting `${VAR}` references first.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProximityError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ProximityError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ProximityError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Configured categories, falling back to the built-in set.
    pub fn category_definitions(&self) -> Vec<CategoryDefinition> {
        if self.categories.is_empty() {
            CategoryDefinition::builtin()
        } else {
            self.categories.clone()
        }
    }

    pub fn category(&self, key: &str) -> Option<CategoryDefinition> {
        self.category_definitions()
            .into_iter()
            .find(|category| category.key == key)
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        if self.discovery.instances.is_empty() {
            return Err(ProximityError::MissingConfigError {
                field: "discovery.instances".to_string(),
            });
        }
        for instance in &self.discovery.instances {
            validate_url("discovery.instances", instance)?;
        }
        validate_positive_number(
            "discovery.request_timeout_seconds",
            self.discovery.request_timeout_seconds as usize,
            1,
        )?;

        let categories = self.category_definitions();
        validate_unique_keys("categories", categories.iter().map(|c| c.key.as_str()))?;
        for category in &categories {
            validate_non_empty_string("categories.key", &category.key)?;
            validate_non_empty_string("categories.label", &category.label)?;
        }

        validate_increasing("search.radius_tiers", &self.search.radius_tiers)?;

        validate_url("routing.base_url", &self.routing.base_url)?;
        validate_positive_number("routing.concurrency_limit", self.routing.concurrency_limit, 1)?;
        validate_positive_number(
            "routing.request_timeout_seconds",
            self.routing.request_timeout_seconds as usize,
            1,
        )?;
        if let Some(global) = self.routing.global_concurrency_limit {
            validate_positive_number("routing.global_concurrency_limit", global, 1)?;
        }

        validate_positive_number("batch.min_size", self.batch.min_size, 1)?;
        if self.batch.max_size < self.batch.min_size {
            return Err(ProximityError::InvalidConfigValueError {
                field: "batch.max_size".to_string(),
                value: self.batch.max_size.to_string(),
                reason: format!("must not be below batch.min_size ({})", self.batch.min_size),
            });
        }
        validate_range(
            "batch.initial_size",
            self.batch.initial_size,
            self.batch.min_size,
            self.batch.max_size,
        )?;
        if self.batch.slow_batch_ms < self.batch.fast_batch_ms {
            return Err(ProximityError::InvalidConfigValueError {
                field: "batch.slow_batch_ms".to_string(),
                value: self.batch.slow_batch_ms.to_string(),
                reason: "must not be below batch.fast_batch_ms".to_string(),
            });
        }

        validate_positive_number("cache.ttl_ms", self.cache.ttl_ms as usize, 1)?;

        validate_range("persistence.chunk_size", self.persistence.chunk_size, 20, 50)?;
        validate_path("persistence.output_path", &self.persistence.output_path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery.max_retries, 3);
        assert_eq!(config.discovery.request_timeout(), Duration::from_secs(15));
        assert_eq!(config.routing.concurrency_limit, 3);
        assert_eq!(config.routing.request_timeout(), Duration::from_secs(20));
        assert_eq!(config.batch.initial_size, 5);
        assert_eq!(config.batch.inter_batch_delay(), Duration::from_millis(1000));
        assert_eq!(config.cache.ttl(), Duration::from_millis(3_600_000));
        assert_eq!(config.search.radius_tiers, vec![2000, 5000, 10000]);
        assert!(config.category("hospital").is_some());
    }

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[discovery]
instances = ["https://overpass.example.org/api/interpreter"]
request_timeout_seconds = 10
max_retries = 2

[[categories]]
key = "market"
label = "Market"
tag = { key = "amenity", value = "marketplace" }

[[categories]]
key = "bus_stop"
label = "Bus stop"

[search]
radius_tiers = [1000, 3000]

[routing]
base_url = "https://osrm.example.org"
concurrency_limit = 2
global_concurrency_limit = 8

[batch]
initial_size = 4
inter_batch_delay_ms = 250

[persistence]
chunk_size = 40
output_path = "./results"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.discovery.instances.len(), 1);
        assert_eq!(config.discovery.server_timeout_seconds, 30);
        assert_eq!(config.search.radius_tiers, vec![1000, 3000]);
        assert_eq!(config.routing.global_concurrency_limit, Some(8));
        assert_eq!(config.batch.max_size, 10);
        assert_eq!(config.category_definitions().len(), 2);
        assert!(config.category("bus_stop").unwrap().tag.is_none());
        assert!(config.category("hospital").is_none());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TEST_ROUTING_KEY", "secret-key");

        let toml_content = r#"
[routing]
api_key = "${TEST_ROUTING_KEY}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.routing.api_key.as_deref(), Some("secret-key"));

        std::env::remove_var("TEST_ROUTING_KEY");
    }

    #[test]
    fn test_config_validation() {
        let invalid = [
            "[routing]\nbase_url = \"invalid-url\"",
            "[discovery]\ninstances = []",
            "[batch]\ninitial_size = 12",
            "[search]\nradius_tiers = [5000, 2000]",
            "[persistence]\nchunk_size = 5",
        ];
        for content in invalid {
            let config = AppConfig::from_toml_str(content).unwrap();
            assert!(config.validate().is_err(), "expected invalid: {}", content);
        }
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[cache]\nttl_ms = 60000\n")
            .unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
    }
}
