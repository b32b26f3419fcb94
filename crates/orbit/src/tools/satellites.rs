use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::registry::ToolHandler;
use super::{execution_error, required_f64, required_u64};
use crate::errors::AgentResult;
use crate::models::tool::Tool;

pub const CELESTRAK_HOST: &str = "https://celestrak.com";
pub const N2YO_HOST: &str = "https://api.n2yo.com";

fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// Latest two-line element set for a satellite, from CelesTrak
pub struct TleLookup {
    tool: Tool,
    client: Client,
    host: String,
}

impl TleLookup {
    pub fn new() -> Self {
        Self {
            tool: Tool::new(
                "get_tle",
                "Fetch the latest TLE data for a given satellite by its NORAD ID.",
                json!({
                    "type": "object",
                    "required": ["norad_id"],
                    "properties": {
                        "norad_id": {"type": "integer", "description": "NORAD catalog number."}
                    }
                }),
            ),
            client: http_client(),
            host: CELESTRAK_HOST.to_string(),
        }
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }
}

impl Default for TleLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for TleLookup {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let norad_id = required_u64(&arguments, "norad_id")?;
        let response = self
            .client
            .get(format!("{}/NORAD/elements/gp.php", self.host.trim_end_matches('/')))
            .query(&[("CATNR", norad_id.to_string()), ("FORMAT", "tle".to_string())])
            .send()
            .await
            .map_err(execution_error)?;

        if !response.status().is_success() {
            return Err(execution_error(format!(
                "Error fetching TLE data: {}",
                response.status()
            )));
        }

        let tle = response.text().await.map_err(execution_error)?;
        Ok(Value::String(tle.trim().to_string()))
    }
}

/// Current position of a satellite seen from an observer, from N2YO
pub struct SatellitePosition {
    tool: Tool,
    client: Client,
    host: String,
    api_key: String,
}

impl SatellitePosition {
    pub fn new(api_key: String) -> Self {
        Self {
            tool: Tool::new(
                "get_satellite_position",
                "Fetch the current position of a satellite given its NORAD ID and the observer's location.",
                json!({
                    "type": "object",
                    "required": ["norad_id", "observer_lat", "observer_lon", "observer_alt"],
                    "properties": {
                        "norad_id": {"type": "integer"},
                        "observer_lat": {"type": "number", "description": "Observer latitude in degrees."},
                        "observer_lon": {"type": "number", "description": "Observer longitude in degrees."},
                        "observer_alt": {"type": "number", "description": "Observer altitude in meters."}
                    }
                }),
            ),
            client: http_client(),
            host: N2YO_HOST.to_string(),
            api_key,
        }
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl ToolHandler for SatellitePosition {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let norad_id = required_u64(&arguments, "norad_id")?;
        let lat = required_f64(&arguments, "observer_lat")?;
        let lon = required_f64(&arguments, "observer_lon")?;
        let alt = required_f64(&arguments, "observer_alt")?;

        let url = format!(
            "{}/rest/v1/satellite/positions/{}/{}/{}/{}/2/",
            self.host.trim_end_matches('/'),
            norad_id,
            lat,
            lon,
            alt
        );
        let response = self
            .client
            .get(url)
            .query(&[("apiKey", &self.api_key)])
            .send()
            .await
            .map_err(execution_error)?;

        if !response.status().is_success() {
            return Err(execution_error(format!(
                "Error fetching satellite position: {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(execution_error)?;
        let position = body["positions"]
            .get(0)
            .ok_or_else(|| execution_error("No position data available."))?;

        Ok(json!({
            "latitude": position["satlatitude"],
            "longitude": position["satlongitude"],
            "altitude_km": position["sataltitude"],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AgentError;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_tle_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/NORAD/elements/gp.php"))
            .and(query_param("CATNR", "25544"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ISS (ZARYA)\n1 25544U\n2 25544\n\n"))
            .mount(&server)
            .await;

        let tool = TleLookup::new().with_host(server.uri());
        let output = tool.call(json!({"norad_id": 25544})).await.unwrap();
        assert_eq!(output, json!("ISS (ZARYA)\n1 25544U\n2 25544"));
    }

    #[tokio::test]
    async fn test_position_without_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/satellite/positions/25544/48.8/2.3/35/2/"))
            .and(query_param("apiKey", "n2yo-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"positions": []})))
            .mount(&server)
            .await;

        let tool = SatellitePosition::new("n2yo-key".to_string()).with_host(server.uri());
        let err = tool
            .call(json!({
                "norad_id": 25544,
                "observer_lat": 48.8,
                "observer_lon": 2.3,
                "observer_alt": 35
            }))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AgentError::ExecutionError("No position data available.".to_string())
        );
    }
}
