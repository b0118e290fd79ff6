use lambda_runtime::{Error, LambdaEvent};
use metrics_cloudwatch_embedded::lambda::handler::run;
use serde_json::Value;
use tracing::info_span;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use function_timer::time;
use tempdir::TempDir;

use garmin_drivetrain::common::{
    blob_store::S3BlobStore,
    config::PullConfig,
    garmin_client::GarminClient,
    metrics,
    secrets::{GarminCredentials, SecretProvider, SecretsManagerProvider},
};

mod activity_sync;

use crate::activity_sync::{ActivitySync, SyncReport};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .with_target(false)
        .with_current_span(false)
        .without_time()
        .init();

    let metrics = metrics_cloudwatch_embedded::Builder::new()
        .cloudwatch_namespace(metrics::METRICS_NAMESPACE)
        .lambda_cold_start_span(info_span!("cold start"))
        .lambda_cold_start_metric("ColdStart")
        .with_lambda_request_id("RequestId")
        .init()?;

    run(metrics, function_handler).await
}

/// Scheduled pull. The event body carries nothing we use; count, overwrite
/// and destination all come from the environment.
#[time("lambda_handler_duration")]
pub(crate) async fn function_handler(event: LambdaEvent<Value>) -> Result<SyncReport, Error> {
    let (_payload, context) = event.into_parts();
    tracing::info!("Pull started, request {}", context.request_id);

    let config = PullConfig::from_env().inspect_err(|_| metrics::increment_lambda_failure())?;

    // Initialize AWS SDK
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = S3Client::new(&aws_config);
    let secrets = SecretsManagerProvider::new(SecretsManagerClient::new(&aws_config));

    // Without Garmin credentials the invocation stops here
    let credentials = secrets
        .get_secret(&config.garmin_secret_name)
        .await
        .and_then(|secret| GarminCredentials::from_secret(&config.garmin_secret_name, secret))
        .inspect_err(|_| metrics::increment_lambda_failure())?;

    let mut garmin_client = GarminClient::new(&config.garmin_domain);
    garmin_client.set_access_token(&credentials.access_token);

    let store = S3BlobStore::new(s3_client, &config.s3_bucket);

    let work_dir = TempDir::new("garmin_pull")
        .map_err(|e| Error::from(format!("Failed to create work directory: {e}")))?;

    let report = ActivitySync::new(&garmin_client, &store, work_dir.path())
        .with_store_delay(config.store_delay)
        .with_original_downloads(config.download_originals)
        .fetch_and_sync(config.activity_count, config.overwrite)
        .await;

    metrics::increment_lambda_success();
    Ok(report)
}
