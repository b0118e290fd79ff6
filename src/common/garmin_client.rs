use crate::common::activity::ActivitySummary;
use crate::common::metrics;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde_json::Value;
use tracing::warn;

const ACTIVITY_SEARCH_PATH: &str = "/activitylist-service/activities/search/activities";
const DOWNLOAD_SERVICE_PATH: &str = "/download-service/files";
const USER_AGENT: &str = "GCM-iOS-5.7.2.1";

#[derive(Debug)]
pub enum SourceError {
    Http(StatusCode),
    Network(reqwest_middleware::Error),
    Decode(String),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Http(status) => write!(f, "HTTP {status}"),
            SourceError::Network(e) => write!(f, "Network error: {e}"),
            SourceError::Decode(msg) => write!(f, "Unexpected response: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<SourceError> for crate::common::types::PipelineError {
    fn from(err: SourceError) -> Self {
        crate::common::types::PipelineError::Source(err.to_string())
    }
}

/// The fitness-tracking service as the fetcher needs it.
#[async_trait]
pub trait SourceApi: Send + Sync {
    async fn search_activities(
        &self,
        start: u32,
        limit: u32,
    ) -> Result<Vec<ActivitySummary>, SourceError>;

    /// Download a binary resource given its path below the API root.
    async fn fetch_binary(&self, path: &str) -> Result<Vec<u8>, SourceError>;
}

/// Path of the original-file archive (a zip holding the FIT file) for an activity.
pub fn original_archive_path(activity_id: u64) -> String {
    format!("{DOWNLOAD_SERVICE_PATH}/activity/{activity_id}")
}

pub struct GarminClient {
    client: ClientWithMiddleware,
    endpoint: String,
    auth_header: Option<String>,
}

impl GarminClient {
    pub fn new(domain: &str) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            endpoint: format!("https://connectapi.{domain}"),
            auth_header: None,
        }
    }

    pub fn set_access_token(&mut self, access_token: &str) {
        self.auth_header = Some(format!("Bearer {access_token}"));
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, SourceError> {
        let auth_header = self.auth_header.as_ref().ok_or_else(|| {
            SourceError::Network(reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                "No access token set"
            )))
        })?;

        let response = self
            .client
            .get(format!("{}{path}", self.endpoint))
            .query(query)
            .header("Authorization", auth_header)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                metrics::increment_garmin_api_failure();
                SourceError::Network(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            metrics::increment_garmin_api_failure();
            return Err(SourceError::Http(status));
        }

        Ok(response)
    }
}

#[async_trait]
impl SourceApi for GarminClient {
    async fn search_activities(
        &self,
        start: u32,
        limit: u32,
    ) -> Result<Vec<ActivitySummary>, SourceError> {
        let response = self
            .get(
                ACTIVITY_SEARCH_PATH,
                &[("start", start.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        let body = response.text().await.map_err(|e| {
            metrics::increment_garmin_api_failure();
            SourceError::Network(reqwest_middleware::Error::Reqwest(e))
        })?;

        let entries = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                metrics::increment_garmin_api_failure();
                return Err(SourceError::Decode("activity search did not return a list".into()));
            }
            Err(e) => {
                metrics::increment_garmin_api_failure();
                return Err(SourceError::Decode(e.to_string()));
            }
        };

        metrics::increment_garmin_api_success();
        Ok(parse_summaries(entries))
    }

    async fn fetch_binary(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.get(path, &[]).await?;

        let body = response.bytes().await.map_err(|e| {
            metrics::increment_garmin_api_failure();
            SourceError::Network(reqwest_middleware::Error::Reqwest(e))
        })?;

        metrics::increment_garmin_api_success();
        Ok(body.to_vec())
    }
}

fn parse_summaries(entries: Vec<Value>) -> Vec<ActivitySummary> {
    entries
        .into_iter()
        .filter_map(|entry| {
            ActivitySummary::try_from(entry)
                .inspect_err(|e| warn!("Ignoring activity search entry: {}", e))
                .ok()
        })
        .collect()
}
