pub mod activity;
pub mod blob_store;
pub mod config;
pub mod garmin_client;
pub mod metrics;
pub mod record;
pub mod secrets;
pub mod sink;
pub mod types;
