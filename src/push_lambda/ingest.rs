use aws_lambda_events::event::s3::S3Event;
use function_timer::time;
use garmin_drivetrain::common::blob_store::BlobStore;
use garmin_drivetrain::common::metrics;
use garmin_drivetrain::common::record::normalize_json;
use garmin_drivetrain::common::sink::RowSink;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

/// Lambda response in the API Gateway-compatible shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub status_code: u16,
    pub body: String,
}

impl IngestResponse {
    fn ok(body: String) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }

    pub fn bad_request(body: String) -> Self {
        Self {
            status_code: 400,
            body,
        }
    }

    fn server_error(body: String) -> Self {
        Self {
            status_code: 500,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Key of the first object in the event, URL-decoded. Further records are
/// ignored; S3 delivers one record per notification.
pub fn object_key(event: &S3Event) -> Option<String> {
    if event.records.len() > 1 {
        warn!(
            "Event carries {} records, only the first is processed",
            event.records.len()
        );
    }

    let raw_key = event.records.first()?.s3.object.key.as_deref()?;
    Some(decode_key(raw_key))
}

// S3 event keys are form-encoded: spaces arrive as '+'
fn decode_key(raw_key: &str) -> String {
    let plus_decoded = raw_key.replace('+', " ");
    match urlencoding::decode(&plus_decoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            warn!("Object key {} is not valid UTF-8 once decoded: {}", raw_key, e);
            raw_key.to_string()
        }
    }
}

pub struct ObjectIngest<'a> {
    store: &'a dyn BlobStore,
    sink: &'a dyn RowSink,
    prefix: String,
    table_name: String,
}

impl<'a> ObjectIngest<'a> {
    pub fn new(
        store: &'a dyn BlobStore,
        sink: &'a dyn RowSink,
        prefix: &str,
        table_name: &str,
    ) -> Self {
        Self {
            store,
            sink,
            prefix: prefix.to_string(),
            table_name: table_name.to_string(),
        }
    }

    /// Load one uploaded JSON record, flatten it and append it to the table.
    /// Every outcome, including failures, is reported as a response.
    #[time("ingest_object_duration")]
    pub async fn handle(&self, object_key: &str) -> IngestResponse {
        info!("Processing file: {}", object_key);

        if !object_key.starts_with(&self.prefix) {
            warn!("File is not in the correct folder: {}", self.prefix);
            metrics::increment_ingest_rejected();
            return IngestResponse::bad_request(format!(
                "File is not in the correct folder: {}",
                self.prefix
            ));
        }

        let data = match self.store.get(object_key).await {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to fetch {} from S3: {}", object_key, e);
                return IngestResponse::server_error("Error reading JSON object".to_string());
            }
        };

        let value: Value = match serde_json::from_slice(&data) {
            Ok(value) => value,
            Err(e) => {
                error!("Error parsing JSON data from {}: {}", object_key, e);
                return IngestResponse::server_error("Error parsing JSON data".to_string());
            }
        };

        let row = match normalize_json(value) {
            Ok(row) => row,
            Err(e) => {
                error!("Error converting JSON data to table row: {}", e);
                return IngestResponse::server_error(
                    "Error converting JSON data to table row".to_string(),
                );
            }
        };

        if !row.dropped().is_empty() {
            info!("Dropped columns with dicts or lists: {:?}", row.dropped());
            metrics::increment_columns_dropped(row.dropped().len() as u64);
        }

        match self.sink.append_row(&row, &self.table_name).await {
            Ok(()) => IngestResponse::ok(format!("Row appended to table '{}'", self.table_name)),
            Err(e) => {
                error!("Failed to write {} to '{}': {}", object_key, self.table_name, e);
                IngestResponse::server_error(format!(
                    "Error writing row to table '{}'",
                    self.table_name
                ))
            }
        }
    }
}
