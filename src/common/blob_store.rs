use crate::common::metrics;
use crate::common::types::{PipelineError, PipelineResult};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, error};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// Object storage as seen by both jobs. Existence of a key doubles as the
/// idempotency marker for activity summaries.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> PipelineResult<bool>;

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> PipelineResult<()>;

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>>;
}

pub struct S3BlobStore {
    s3_client: S3Client,
    s3_bucket: String,
}

impl S3BlobStore {
    pub fn new(s3_client: S3Client, s3_bucket: &str) -> Self {
        Self {
            s3_client,
            s3_bucket: s3_bucket.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn exists(&self, key: &str) -> PipelineResult<bool> {
        match self
            .s3_client
            .head_object()
            .bucket(&self.s3_bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(PipelineError::Store(format!(
                        "Failed to check {key}: {service_error}"
                    )))
                }
            }
        }
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> PipelineResult<()> {
        match self
            .s3_client
            .put_object()
            .bucket(&self.s3_bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
        {
            Ok(_) => {
                metrics::increment_s3_upload_success();
                debug!("Uploaded to S3: {}", key);
                Ok(())
            }
            Err(e) => {
                metrics::increment_s3_upload_failure();
                error!("Failed to upload {} to S3: {}", key, e);
                Err(PipelineError::Store(format!("Failed to upload {key}: {e}")))
            }
        }
    }

    async fn get(&self, key: &str) -> PipelineResult<Vec<u8>> {
        let response = self
            .s3_client
            .get_object()
            .bucket(&self.s3_bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| PipelineError::Store(format!("Failed to fetch {key}: {e}")))?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::Store(format!("Failed to read {key}: {e}")))?;

        Ok(body.to_vec())
    }
}
