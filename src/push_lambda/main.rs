use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{Error, LambdaEvent};
use metrics_cloudwatch_embedded::lambda::handler::run;
use tracing::info_span;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use function_timer::time;

use garmin_drivetrain::common::{
    blob_store::S3BlobStore,
    config::PushConfig,
    metrics,
    secrets::{DbCredentials, SecretProvider, SecretsManagerProvider},
    sink::MySqlSink,
};

mod ingest;

use crate::ingest::{IngestResponse, ObjectIngest, object_key};

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

#[time("lambda_handler_duration")]
pub(crate) async fn function_handler(event: LambdaEvent<S3Event>) -> Result<IngestResponse, Error> {
    let (payload, _context) = event.into_parts();

    let config = PushConfig::from_env().inspect_err(|_| metrics::increment_lambda_failure())?;

    // Initialize AWS SDK
    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = S3Client::new(&aws_config);
    let secrets = SecretsManagerProvider::new(SecretsManagerClient::new(&aws_config));

    // Database credentials are fetched before any work; failing here fails the invocation
    let credentials = secrets
        .get_secret(&config.db_secret_name)
        .await
        .and_then(|secret| DbCredentials::from_secret(&config.db_secret_name, secret))
        .inspect_err(|_| metrics::increment_lambda_failure())?;

    let Some(key) = object_key(&payload) else {
        tracing::warn!("S3 event without an object key: {:?}", payload);
        metrics::increment_lambda_failure();
        return Ok(IngestResponse::bad_request(
            "Event does not reference an object".to_string(),
        ));
    };

    let store = S3BlobStore::new(s3_client, &config.s3_bucket);
    let sink = MySqlSink::new(&credentials);

    let response = ObjectIngest::new(&store, &sink, &config.activities_prefix, &config.table_name)
        .handle(&key)
        .await;

    if response.is_success() {
        metrics::increment_lambda_success();
    } else {
        metrics::increment_lambda_failure();
    }

    Ok(response)
}
