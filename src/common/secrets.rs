use crate::common::types::{PipelineError, PipelineResult};
use async_trait::async_trait;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Fetch a JSON secret by name. Failure here aborts the invocation.
    async fn get_secret(&self, name: &str) -> PipelineResult<Map<String, Value>>;
}

pub struct SecretsManagerProvider {
    client: SecretsManagerClient,
}

impl SecretsManagerProvider {
    pub fn new(client: SecretsManagerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretProvider for SecretsManagerProvider {
    async fn get_secret(&self, name: &str) -> PipelineResult<Map<String, Value>> {
        let secret_value = self
            .client
            .get_secret_value()
            .secret_id(name)
            .send()
            .await
            .map_err(|e| PipelineError::Secret(format!("Failed to retrieve secret {name}: {e}")))?;

        let secret_string = secret_value
            .secret_string()
            .ok_or_else(|| PipelineError::Secret(format!("Secret string not found for {name}")))?;

        parse_secret(name, secret_string)
    }
}

fn parse_secret(name: &str, secret_string: &str) -> PipelineResult<Map<String, Value>> {
    match serde_json::from_str(secret_string) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(PipelineError::Secret(format!(
            "Secret {name} is not a JSON object"
        ))),
        Err(e) => Err(PipelineError::Secret(format!(
            "Secret {name} is not valid JSON: {e}"
        ))),
    }
}

/// Garmin Connect session material. Obtaining and refreshing the token is
/// handled outside this crate; the secret only has to carry it.
#[derive(Debug, Clone, Deserialize)]
pub struct GarminCredentials {
    pub access_token: String,
}

/// MySQL connection parameters in the RDS secret layout.
#[derive(Debug, Clone, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
    pub dbname: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
}

impl GarminCredentials {
    pub fn from_secret(name: &str, secret: Map<String, Value>) -> PipelineResult<Self> {
        serde_json::from_value(Value::Object(secret))
            .map_err(|e| PipelineError::Secret(format!("Secret {name} is missing fields: {e}")))
    }
}

impl DbCredentials {
    pub fn from_secret(name: &str, secret: Map<String, Value>) -> PipelineResult<Self> {
        serde_json::from_value(Value::Object(secret))
            .map_err(|e| PipelineError::Secret(format!("Secret {name} is missing fields: {e}")))
    }
}

// RDS-managed secrets store the port as a number, hand-written ones often as a string
fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| de::Error::custom(format!("invalid port {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid port {s}"))),
        other => Err(de::Error::custom(format!("invalid port {other}"))),
    }
}
