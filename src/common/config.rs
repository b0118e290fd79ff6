//! Per-invocation configuration read from the Lambda environment.

use crate::common::types::{PipelineError, PipelineResult};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_GARMIN_SECRET_NAME: &str = "garmin/connect_login";
const DEFAULT_GARMIN_DOMAIN: &str = "garmin.com";
const DEFAULT_ACTIVITY_COUNT: u32 = 90;
const DEFAULT_STORE_DELAY_MS: u64 = 1000;
const DEFAULT_DB_SECRET_NAME: &str = "mysql_secret";
const DEFAULT_TABLE_NAME: &str = "activities";

#[derive(Debug, Clone)]
pub struct PullConfig {
    pub s3_bucket: String,
    pub garmin_secret_name: String,
    pub garmin_domain: String,
    pub activity_count: u32,
    pub overwrite: bool,
    pub download_originals: bool,
    /// Pause after every freshly stored summary.
    pub store_delay: Duration,
}

impl PullConfig {
    pub fn from_env() -> PipelineResult<Self> {
        Ok(Self {
            s3_bucket: required("S3_BUCKET")?,
            garmin_secret_name: optional("GARMIN_SECRET_NAME")
                .unwrap_or_else(|| DEFAULT_GARMIN_SECRET_NAME.to_string()),
            garmin_domain: optional("GARMIN_DOMAIN")
                .unwrap_or_else(|| DEFAULT_GARMIN_DOMAIN.to_string()),
            activity_count: parsed("ACTIVITY_COUNT")?.unwrap_or(DEFAULT_ACTIVITY_COUNT),
            overwrite: flag("OVERWRITE")?.unwrap_or(false),
            download_originals: flag("DOWNLOAD_ORIGINALS")?.unwrap_or(true),
            store_delay: Duration::from_millis(
                parsed("STORE_DELAY_MS")?.unwrap_or(DEFAULT_STORE_DELAY_MS),
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub s3_bucket: String,
    /// Only object keys starting with this prefix are ingested.
    pub activities_prefix: String,
    pub db_secret_name: String,
    pub table_name: String,
}

impl PushConfig {
    pub fn from_env() -> PipelineResult<Self> {
        Ok(Self {
            s3_bucket: required("S3_BUCKET")?,
            activities_prefix: optional("ACTIVITIES_PREFIX").unwrap_or_else(|| {
                format!("{}/", crate::common::activity::ACTIVITIES_PREFIX)
            }),
            db_secret_name: optional("DB_SECRET_NAME")
                .unwrap_or_else(|| DEFAULT_DB_SECRET_NAME.to_string()),
            table_name: optional("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
        })
    }
}

fn required(name: &str) -> PipelineResult<String> {
    optional(name)
        .ok_or_else(|| PipelineError::Configuration(format!("{name} environment variable not set")))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &str) -> PipelineResult<Option<T>> {
    optional(name)
        .map(|v| {
            v.parse().map_err(|_| {
                PipelineError::Configuration(format!("{name} has an invalid value: {v}"))
            })
        })
        .transpose()
}

fn flag(name: &str) -> PipelineResult<Option<bool>> {
    optional(name).map(|v| parse_flag(name, &v)).transpose()
}

fn parse_flag(name: &str, value: &str) -> PipelineResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::Configuration(format!(
            "{name} must be a boolean, got {value}"
        ))),
    }
}
