//! PaaS API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tracing::{debug, info};

use snooze_core::App;
use snooze_core::config::PaasConfig;

use crate::error::{ClientError, ClientResult};

/// Operations the orchestrator needs from the PaaS.
#[async_trait]
pub trait PaasApi: Send + Sync {
    /// Current status and sizing of an app.
    async fn get_app(&self, app_id: &str) -> ClientResult<App>;

    /// Start an app, optionally at a specific commit.
    async fn start_app(&self, app_id: &str, commit: Option<&str>) -> ClientResult<()>;

    async fn stop_app(&self, app_id: &str) -> ClientResult<()>;
}

/// REST client for the Clever Cloud v2 API, scoped to one organisation.
#[derive(Debug, Clone)]
pub struct HttpPaas {
    client: Client,
    base_url: String,
    organization: String,
    consumer_key: String,
    consumer_secret: String,
    token: String,
    token_secret: String,
}

impl HttpPaas {
    pub fn new(config: &PaasConfig) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            organization: config.organization.clone(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            token: config.token.clone(),
            token_secret: config.secret.clone(),
        })
    }

    fn app_url(&self, app_id: &str) -> String {
        format!(
            "{}/organisations/{}/applications/{}",
            self.base_url, self.organization, app_id
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let timestamp = chrono::Utc::now().timestamp();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        self.client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, self.authorization(timestamp, &nonce))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// OAuth 1.0 `PLAINTEXT` authorization header.
    fn authorization(&self, timestamp: i64, nonce: &str) -> String {
        let signature = format!(
            "{}&{}",
            percent_encode(&self.consumer_secret),
            percent_encode(&self.token_secret)
        );
        format!(
            "OAuth oauth_consumer_key=\"{}\", oauth_token=\"{}\", \
             oauth_signature_method=\"PLAINTEXT\", oauth_signature=\"{}\", \
             oauth_timestamp=\"{}\", oauth_nonce=\"{}\", oauth_version=\"1.0\"",
            percent_encode(&self.consumer_key),
            percent_encode(&self.token),
            percent_encode(&signature),
            timestamp,
            nonce,
        )
    }
}

/// RFC 3986 percent-encoding as OAuth 1.0 requires it.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn expect_success(op: &'static str, status: StatusCode) -> ClientResult<()> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(op.to_string())),
        s => Err(ClientError::Status {
            op,
            status: s.as_u16(),
        }),
    }
}

#[async_trait]
impl PaasApi for HttpPaas {
    async fn get_app(&self, app_id: &str) -> ClientResult<App> {
        let response = self.request(Method::GET, &self.app_url(app_id)).send().await?;
        expect_success("get app", response.status())?;
        let app: App = response
            .json()
            .await
            .map_err(|e| ClientError::decode("app", e))?;
        debug!(%app_id, state = %app.state, "app fetched");
        Ok(app)
    }

    async fn start_app(&self, app_id: &str, commit: Option<&str>) -> ClientResult<()> {
        let url = format!("{}/instances", self.app_url(app_id));
        let mut request = self.request(Method::POST, &url);
        if let Some(commit) = commit {
            request = request.query(&[("commit", commit)]);
        }
        let response = request.send().await?;
        expect_success("start app", response.status())?;
        info!(%app_id, ?commit, "app start requested");
        Ok(())
    }

    async fn stop_app(&self, app_id: &str) -> ClientResult<()> {
        let url = format!("{}/instances", self.app_url(app_id));
        let response = self.request(Method::DELETE, &url).send().await?;
        expect_success("stop app", response.status())?;
        info!(%app_id, "app stop requested");
        Ok(())
    }
}
