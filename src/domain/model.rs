use serde::{Deserialize, Serialize};
use std::fmt;

/// `(lon, lat)`, the order used by the directory service and the routing backend.
pub type LonLat = (f64, f64);

/// `(lat, lng)`, the order used by the amenity backend.
pub type LatLng = (f64, f64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginEntity {
    pub id: String,
    #[serde(alias = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub location: Option<LonLat>,
}

impl OriginEntity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, location: Option<LonLat>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            location,
        }
    }

    /// Returns the usable `(lon, lat)` or the reason the origin must be skipped.
    pub fn checked_location(&self) -> Result<LonLat, String> {
        let (lon, lat) = self
            .location
            .ok_or_else(|| "missing location".to_string())?;
        if !lon.is_finite() || !lat.is_finite() {
            return Err(format!("non-finite coordinates ({}, {})", lon, lat));
        }
        if !(-180.0..=180.0).contains(&lon) {
            return Err(format!("longitude {} out of range", lon));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(format!("latitude {} out of range", lat));
        }
        Ok((lon, lat))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmenityCandidate {
    pub id: String,
    pub name: String,
    pub location: LatLng,
    pub category: String,
}

impl AmenityCandidate {
    pub fn has_valid_location(&self) -> bool {
        let (lat, lng) = self.location;
        lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Cycling,
}

impl TravelMode {
    /// Profile segment of the routing URL.
    pub fn profile(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "foot",
            TravelMode::Cycling => "bike",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Cycling => "cycling",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driving" | "car" | "drive" => Ok(TravelMode::Driving),
            "walking" | "foot" | "walk" => Ok(TravelMode::Walking),
            "cycling" | "bike" | "bicycle" => Ok(TravelMode::Cycling),
            other => Err(format!("unknown travel mode: {}", other)),
        }
    }
}

/// A category the amenity backend is queried for. `tag` is `None` for
/// categories the backend has no tag for; those never hit the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub tag: Option<CategoryTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTag {
    pub key: String,
    pub value: String,
}

impl CategoryDefinition {
    pub fn new(key: &str, label: &str, tag: Option<(&str, &str)>) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            tag: tag.map(|(k, v)| CategoryTag {
                key: k.to_string(),
                value: v.to_string(),
            }),
        }
    }

    pub fn builtin() -> Vec<CategoryDefinition> {
        vec![
            CategoryDefinition::new("market", "Market", Some(("amenity", "marketplace"))),
            CategoryDefinition::new("clinic", "Clinic", Some(("amenity", "clinic"))),
            CategoryDefinition::new("hospital", "Hospital", Some(("amenity", "hospital"))),
            CategoryDefinition::new("pharmacy", "Pharmacy", Some(("amenity", "pharmacy"))),
            CategoryDefinition::new("school", "School", Some(("amenity", "school"))),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnStep {
    pub instruction: String,
    pub road: String,
    pub distance_m: f64,
    pub duration_sec: f64,
}

/// Travel metrics from one origin to one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetrics {
    pub candidate_id: String,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub path_encoding: Option<String>,
    pub steps: Vec<TurnStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityResult {
    pub origin_id: String,
    pub origin_name: String,
    pub candidate_id: String,
    pub candidate_name: String,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub travel_mode: TravelMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_encoding: Option<String>,
}

impl ProximityResult {
    pub fn duration_text(&self) -> String {
        format_duration(self.duration_sec)
    }
}

/// `H h M m` above an hour, `M mins` otherwise.
pub fn format_duration(duration_sec: f64) -> String {
    let minutes = (duration_sec.max(0.0) / 60.0).round() as u64;
    if minutes > 60 {
        format!("{} h {} m", minutes / 60, minutes % 60)
    } else {
        format!("{} mins", minutes)
    }
}

/// Outcome of running the pipeline for one origin.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginOutcome {
    Resolved(ProximityResult),
    NoCandidates,
    Unreachable,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidOrigin {
    pub origin_id: String,
    pub reason: String,
}

/// Progress snapshot sent to observers after every origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Normalised shape handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityDocument {
    pub origin_id: String,
    pub origin_name: String,
    pub category: String,
    pub amenity_id: String,
    pub amenity_name: String,
    pub distance_km: f64,
    pub duration_sec: f64,
    pub duration_text: String,
    pub travel_mode: TravelMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_encoding: Option<String>,
    pub resolved_at: chrono::DateTime<chrono::Utc>,
}

impl ProximityDocument {
    pub fn from_result(result: &ProximityResult, category: &str, resolved_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            origin_id: result.origin_id.clone(),
            origin_name: result.origin_name.clone(),
            category: category.to_string(),
            amenity_id: result.candidate_id.clone(),
            amenity_name: result.candidate_name.clone(),
            distance_km: (result.distance_km * 100.0).round() / 100.0,
            duration_sec: result.duration_sec.round(),
            duration_text: result.duration_text(),
            travel_mode: result.travel_mode,
            path_encoding: result.path_encoding.clone(),
            resolved_at,
        }
    }
}
