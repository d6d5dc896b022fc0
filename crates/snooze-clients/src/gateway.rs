//! Gateway admin API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use snooze_core::Route;
use snooze_core::config::GatewayConfig;

use crate::error::{ClientError, ClientResult};

/// Events fetched per traffic query when nothing is excluded: one hit is
/// enough to know the route is in use.
const UNFILTERED_PAGE_SIZE: u32 = 1;

/// Events fetched per traffic query when an exclusion signature applies.
const FILTERED_PAGE_SIZE: u32 = 100;

/// Pages read before a window full of excluded events is treated as in use.
const MAX_FILTERED_PAGES: u32 = 50;

/// Operations the orchestrator needs from the gateway.
#[async_trait]
pub trait GatewayApi: Send + Sync {
    async fn list_routes(&self) -> ClientResult<Vec<Route>>;

    async fn get_route(&self, route_id: &str) -> ClientResult<Route>;

    /// Replace a route with `route`, returning the gateway's copy.
    async fn update_route(&self, route: &Route) -> ClientResult<Route>;

    /// One page of raw traffic events for a route in
    /// `[from_millis, to_millis]`. Pages are numbered from 1.
    async fn traffic_events(
        &self,
        route_id: &str,
        from_millis: i64,
        to_millis: i64,
        page: u32,
        page_size: u32,
    ) -> ClientResult<Vec<Value>>;

    /// The route's maintenance page template.
    async fn waiting_template(&self, route_id: &str) -> ClientResult<String>;

    /// Count traffic events in the window, ignoring events matching
    /// `excluded_signature`.
    ///
    /// Only zero versus non-zero is meaningful: without an exclusion a
    /// single event is fetched, and with one, pages are read until a
    /// qualifying event shows up or a short page ends the window.
    async fn count_traffic(
        &self,
        route_id: &str,
        from_millis: i64,
        to_millis: i64,
        excluded_signature: Option<&str>,
    ) -> ClientResult<usize> {
        let signature = match excluded_signature {
            Some(signature) if !signature.is_empty() => signature,
            _ => {
                let events = self
                    .traffic_events(route_id, from_millis, to_millis, 1, UNFILTERED_PAGE_SIZE)
                    .await?;
                return Ok(count_qualifying_events(&events, None));
            }
        };

        for page in 1..=MAX_FILTERED_PAGES {
            let events = self
                .traffic_events(route_id, from_millis, to_millis, page, FILTERED_PAGE_SIZE)
                .await?;
            let qualifying = count_qualifying_events(&events, Some(signature));
            if qualifying > 0 {
                return Ok(qualifying);
            }
            if events.len() < FILTERED_PAGE_SIZE as usize {
                return Ok(0);
            }
        }

        warn!(
            %route_id,
            pages = MAX_FILTERED_PAGES,
            "window still full of excluded events, treating route as in use"
        );
        Ok(1)
    }
}

/// Count events that are JSON objects and do not contain the excluded
/// signature anywhere in their serialized form.
pub fn count_qualifying_events(events: &[Value], excluded_signature: Option<&str>) -> usize {
    events
        .iter()
        .filter(|event| event.is_object())
        .filter(|event| match excluded_signature {
            Some(signature) if !signature.is_empty() => !event.to_string().contains(signature),
            _ => true,
        })
        .count()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTemplate {
    template_maintenance: Option<String>,
}

/// REST client for the Otoroshi admin API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    host: String,
    client_id: String,
    client_secret: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_owned(),
            host: config.host.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(reqwest::header::HOST, &self.host)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn expect_ok(op: &'static str, response: Response) -> ClientResult<Response> {
    match response.status() {
        StatusCode::OK => Ok(response),
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(op.to_string())),
        status => Err(ClientError::Status {
            op,
            status: status.as_u16(),
        }),
    }
}

#[async_trait]
impl GatewayApi for HttpGateway {
    async fn list_routes(&self) -> ClientResult<Vec<Route>> {
        let response = self
            .authorized(self.client.get(self.url("/api/services")))
            .send()
            .await?;
        let routes: Vec<Route> = expect_ok("list routes", response)?
            .json()
            .await
            .map_err(|e| ClientError::decode("route list", e))?;
        debug!(count = routes.len(), "routes listed");
        Ok(routes)
    }

    async fn get_route(&self, route_id: &str) -> ClientResult<Route> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/api/services/{route_id}"))))
            .send()
            .await?;
        expect_ok("get route", response)?
            .json()
            .await
            .map_err(|e| ClientError::decode("route", e))
    }

    async fn update_route(&self, route: &Route) -> ClientResult<Route> {
        let response = self
            .authorized(self.client.put(self.url(&format!("/api/services/{}", route.id))))
            .json(route)
            .send()
            .await?;
        let updated = expect_ok("update route", response)?
            .json()
            .await
            .map_err(|e| ClientError::decode("route", e))?;
        debug!(route_id = %route.id, "route updated");
        Ok(updated)
    }

    async fn traffic_events(
        &self,
        route_id: &str,
        from_millis: i64,
        to_millis: i64,
        page: u32,
        page_size: u32,
    ) -> ClientResult<Vec<Value>> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/api/services/{route_id}/events"))))
            .query(&[
                ("from", from_millis.to_string()),
                ("to", to_millis.to_string()),
                ("page", page.to_string()),
                ("pageSize", page_size.to_string()),
            ])
            .send()
            .await?;
        let body: Value = expect_ok("traffic events", response)?
            .json()
            .await
            .map_err(|e| ClientError::decode("traffic events", e))?;
        match body {
            Value::Array(events) => Ok(events),
            other => Err(ClientError::decode(
                "traffic events",
                format!("expected an array, got {}", type_name(&other)),
            )),
        }
    }

    async fn waiting_template(&self, route_id: &str) -> ClientResult<String> {
        let response = self
            .authorized(self.client.get(self.url(&format!("/api/services/{route_id}/template"))))
            .send()
            .await?;
        let raw: RawTemplate = expect_ok("waiting template", response)?
            .json()
            .await
            .map_err(|e| ClientError::decode("template", e))?;
        raw.template_maintenance
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ClientError::decode("template", "missing templateMaintenance"))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::memory::InMemoryGateway;

    #[test]
    fn counts_every_object_without_exclusion() {
        let events = vec![json!({"@id": 1}), json!({"@id": 2})];
        assert_eq!(count_qualifying_events(&events, None), 2);
        assert_eq!(count_qualifying_events(&events, Some("")), 2);
    }

    #[test]
    fn skips_malformed_events() {
        let events = vec![json!({"@id": 1}), json!("garbage"), json!(null), json!(42)];
        assert_eq!(count_qualifying_events(&events, None), 1);
    }

    #[test]
    fn excludes_signature_matches() {
        let events = vec![
            json!({"headers": [{"key": "User-Agent", "value": "UptimeRobot/2.0"}]}),
            json!({"headers": [{"key": "User-Agent", "value": "curl/8.0"}]}),
        ];
        assert_eq!(count_qualifying_events(&events, Some("UptimeRobot")), 1);
        assert_eq!(count_qualifying_events(&events[..1], Some("UptimeRobot")), 0);
    }

    fn monitor_hits(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"@id": i, "headers": [{"key": "User-Agent", "value": "UptimeRobot/2.0"}]}))
            .collect()
    }

    #[tokio::test]
    async fn count_traffic_reads_past_a_full_page_of_excluded_events() {
        let gateway = InMemoryGateway::new();
        let mut events = monitor_hits(250);
        events.push(json!({"@id": "real", "headers": [{"key": "User-Agent", "value": "curl/8.0"}]}));
        gateway.set_events("svc-1", events);

        let count = gateway
            .count_traffic("svc-1", 0, 1, Some("UptimeRobot"))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn count_traffic_stops_on_short_page() {
        let gateway = InMemoryGateway::new();
        gateway.set_events("svc-1", monitor_hits(130));

        let count = gateway
            .count_traffic("svc-1", 0, 1, Some("UptimeRobot"))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn count_traffic_treats_endless_excluded_pages_as_busy() {
        let gateway = InMemoryGateway::new();
        gateway.set_events(
            "svc-1",
            monitor_hits((MAX_FILTERED_PAGES * FILTERED_PAGE_SIZE) as usize),
        );

        let count = gateway
            .count_traffic("svc-1", 0, 1, Some("UptimeRobot"))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn new_trims_trailing_slash() {
        let gateway = HttpGateway::new(&GatewayConfig {
            url: "https://otoroshi-api.example.com/".into(),
            host: "otoroshi-api.example.com".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
        })
        .unwrap();
        assert_eq!(gateway.url("/api/services"), "https://otoroshi-api.example.com/api/services");
    }
}
