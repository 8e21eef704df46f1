use crate::config::toml_config::RoutingConfig;
use crate::domain::model::{AmenityCandidate, LonLat, RouteMetrics, TravelMode, TurnStep};
use crate::domain::ports::RouteProvider;
use crate::utils::error::{ProximityError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    distance: f64,
    duration: f64,
    #[serde(default)]
    geometry: Option<String>,
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    distance: f64,
    duration: f64,
    #[serde(default)]
    name: String,
    maneuver: Maneuver,
}

#[derive(Debug, Deserialize)]
struct Maneuver {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

// Error body returned with non-2xx statuses
#[derive(Debug, Deserialize)]
struct RouteErrorPayload {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

/// Routing over an OSRM-compatible HTTP API.
pub struct OsrmRouteProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OsrmRouteProvider {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &RoutingConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn route_url(&self, origin: LonLat, destination: &AmenityCandidate, mode: TravelMode) -> String {
        let (lat, lng) = destination.location;
        format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.base_url,
            mode.profile(),
            origin.0,
            origin.1,
            lng,
            lat
        )
    }
}

fn describe_step(step: &Step) -> String {
    let mut instruction = match &step.maneuver.modifier {
        Some(modifier) => format!("{} {}", step.maneuver.kind, modifier),
        None => step.maneuver.kind.clone(),
    };
    if !step.name.is_empty() {
        instruction.push_str(" onto ");
        instruction.push_str(&step.name);
    }
    instruction
}

#[async_trait]
impl RouteProvider for OsrmRouteProvider {
    async fn route(
        &self,
        origin: LonLat,
        destination: &AmenityCandidate,
        mode: TravelMode,
    ) -> Result<RouteMetrics> {
        let url = self.route_url(origin, destination, mode);
        tracing::debug!("🛣️ Requesting route {}", url);

        let mut request = self.client.get(&url).query(&[
            ("overview", "full"),
            ("geometries", "polyline"),
            ("steps", "true"),
        ]);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProximityError::AuthRejected {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        if !status.is_success() {
            let message = match serde_json::from_str::<RouteErrorPayload>(&text) {
                Ok(payload) => format!(
                    "HTTP {} {}: {}",
                    status,
                    payload.code,
                    payload.message.unwrap_or_default()
                ),
                Err(_) => format!("HTTP {}: {}", status, text),
            };
            return Err(ProximityError::ProviderError { message });
        }

        let body: RouteResponse = serde_json::from_str(&text)?;
        if body.code != "Ok" {
            return Err(ProximityError::ProviderError {
                message: format!(
                    "routing answered {}: {}",
                    body.code,
                    body.message.unwrap_or_default()
                ),
            });
        }

        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| ProximityError::ProviderError {
                message: format!("no route to {}", destination.id),
            })?;
        if route.legs.is_empty() {
            return Err(ProximityError::ProviderError {
                message: format!("route to {} has no legs", destination.id),
            });
        }

        let steps = route
            .legs
            .iter()
            .flat_map(|leg| leg.steps.iter())
            .map(|step| TurnStep {
                instruction: describe_step(step),
                road: step.name.clone(),
                distance_m: step.distance,
                duration_sec: step.duration,
            })
            .collect();

        Ok(RouteMetrics {
            candidate_id: destination.id.clone(),
            distance_km: route.distance / 1000.0,
            duration_sec: route.duration,
            path_encoding: route.geometry,
            steps,
        })
    }
}
