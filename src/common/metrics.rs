use metrics::counter;

pub const METRICS_NAMESPACE: &str = "GarminDrivetrain";

/// Error/Reliability Metrics - Success/Failure pairs
pub fn increment_garmin_api_success() {
    counter!("garmin_api_total", "result" => "success").increment(1);
}

pub fn increment_garmin_api_failure() {
    counter!("garmin_api_total", "result" => "failure").increment(1);
}

pub fn increment_s3_upload_success() {
    counter!("s3_upload_total", "result" => "success").increment(1);
}

pub fn increment_s3_upload_failure() {
    counter!("s3_upload_total", "result" => "failure").increment(1);
}

pub fn increment_db_insert_success() {
    counter!("db_insert_total", "result" => "success").increment(1);
}

pub fn increment_db_insert_failure() {
    counter!("db_insert_total", "result" => "failure").increment(1);
}

pub fn increment_lambda_success() {
    counter!("lambda_total", "result" => "success").increment(1);
}

pub fn increment_lambda_failure() {
    counter!("lambda_total", "result" => "failure").increment(1);
}

/// Business Logic Metrics
pub fn increment_activities_stored(count: u64) {
    counter!("activities_stored").increment(count);
}

pub fn increment_activities_skipped_existing(count: u64) {
    counter!("activities_skipped_existing").increment(count);
}

pub fn increment_originals_downloaded(count: u64) {
    counter!("originals_downloaded").increment(count);
}

pub fn increment_archive_entries_uploaded(count: u64) {
    counter!("archive_entries_total", "result" => "success").increment(count);
}

pub fn increment_archive_entries_failed(count: u64) {
    counter!("archive_entries_total", "result" => "failure").increment(count);
}

pub fn increment_columns_dropped(count: u64) {
    counter!("normalized_columns_dropped").increment(count);
}

pub fn increment_ingest_rejected() {
    counter!("ingest_rejected_total").increment(1);
}
