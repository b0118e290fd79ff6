use super::ActivitySync;
use anyhow::Result;
use function_timer::time;
use garmin_drivetrain::common::activity::{ACTIVITIES_PREFIX, ActivitySummary, printable};
use garmin_drivetrain::common::blob_store::CONTENT_TYPE_JSON;
use garmin_drivetrain::common::garmin_client::original_archive_path;
use garmin_drivetrain::common::metrics;
use serde::Serialize;
use tracing::{error, info, warn};

/// What a single pull run did, unit by unit.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub summaries_seen: usize,
    pub stored: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub originals_downloaded: usize,
    pub originals_failed: usize,
    pub archive_entries_uploaded: usize,
    pub archive_entries_failed: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum SummaryOutcome {
    Stored,
    SkippedExisting,
    Failed,
}

impl ActivitySync<'_> {
    /// Store up to `count` of the most recent activity summaries that are not
    /// yet in the bucket (all of them when `overwrite` is set), then republish
    /// the contents of any archives sitting in the work directory.
    ///
    /// Never fails: every error is logged and counted in the report.
    #[time("fetch_and_sync_duration")]
    pub async fn fetch_and_sync(&self, count: u32, overwrite: bool) -> SyncReport {
        info!(
            "Getting activities: count {}, work dir {}",
            count,
            self.work_dir.display()
        );

        let activities = self.fetch_summaries(count).await;
        let mut report = SyncReport {
            summaries_seen: activities.len(),
            ..SyncReport::default()
        };

        for activity in &activities {
            match self.sync_summary(activity, overwrite).await {
                SummaryOutcome::Stored => {
                    report.stored += 1;

                    if self.download_originals {
                        match self.download_original(activity).await {
                            Ok(()) => report.originals_downloaded += 1,
                            Err(e) => {
                                error!(
                                    "Failed to download original for activity {}: {}",
                                    activity.id(),
                                    e
                                );
                                report.originals_failed += 1;
                            }
                        }
                    }

                    // Pause between page accesses, only after fresh stores
                    tokio::time::sleep(self.store_delay).await;
                }
                SummaryOutcome::SkippedExisting => report.skipped_existing += 1,
                SummaryOutcome::Failed => report.failed += 1,
            }
        }

        metrics::increment_activities_stored(report.stored as u64);
        metrics::increment_activities_skipped_existing(report.skipped_existing as u64);
        metrics::increment_originals_downloaded(report.originals_downloaded as u64);

        let (uploaded, failed) = self.unpack_archives(ACTIVITIES_PREFIX).await;
        report.archive_entries_uploaded = uploaded;
        report.archive_entries_failed = failed;

        info!(
            "Sync finished: {} seen, {} stored, {} skipped, {} failed, {} archive entries uploaded ({} failed)",
            report.summaries_seen,
            report.stored,
            report.skipped_existing,
            report.failed,
            report.archive_entries_uploaded,
            report.archive_entries_failed,
        );

        report
    }

    async fn fetch_summaries(&self, count: u32) -> Vec<ActivitySummary> {
        match self.source.search_activities(0, count).await {
            Ok(activities) => {
                info!("Found {} activities", activities.len());
                activities
            }
            Err(e) => {
                error!("Exception getting activity summary: {}", e);
                Vec::new()
            }
        }
    }

    async fn sync_summary(&self, activity: &ActivitySummary, overwrite: bool) -> SummaryOutcome {
        let json_key = activity.marker_key();
        info!(
            "Processing: {} ({})",
            printable(activity.name()),
            activity.id()
        );

        if !overwrite {
            match self.store.exists(&json_key).await {
                Ok(true) => {
                    info!(
                        "Skipping upload of {}, already present in S3",
                        activity.id()
                    );
                    return SummaryOutcome::SkippedExisting;
                }
                Ok(false) => {}
                Err(e) => warn!("Could not check {}, uploading anyway: {}", json_key, e),
            }
        }

        let body = match activity.to_json() {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to serialize activity {}: {}", activity.id(), e);
                return SummaryOutcome::Failed;
            }
        };

        info!("Uploading activity JSON to S3: {}", json_key);
        match self.store.put(&json_key, body, CONTENT_TYPE_JSON).await {
            Ok(()) => SummaryOutcome::Stored,
            Err(e) => {
                error!("Failed to upload JSON to S3: {}", e);
                SummaryOutcome::Failed
            }
        }
    }

    async fn download_original(&self, activity: &ActivitySummary) -> Result<()> {
        let data = self
            .source
            .fetch_binary(&original_archive_path(activity.id()))
            .await?;

        let archive_path = self.work_dir.join(format!("{}.zip", activity.id()));
        tokio::fs::write(&archive_path, data).await?;
        info!("Saved original archive to: {}", archive_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fakes::{FakeSource, MemoryStore, summary, zip_bytes};
    use super::*;
    use std::time::Duration;
    use tempdir::TempDir;

    fn sync<'a>(source: &'a FakeSource, store: &'a MemoryStore, dir: &TempDir) -> ActivitySync<'a> {
        ActivitySync::new(source, store, dir.path()).with_store_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_second_run_stores_nothing_new() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![summary(1, "Ride"), summary(2, "Run")]);
        let store = MemoryStore::default();
        let job = sync(&source, &store, &dir);

        let first = job.fetch_and_sync(90, false).await;
        assert_eq!(first.stored, 2);
        assert_eq!(first.skipped_existing, 0);

        let second = job.fetch_and_sync(90, false).await;
        assert_eq!(second.stored, 0);
        assert_eq!(second.skipped_existing, 2);

        assert_eq!(
            store.keys(),
            vec![
                "activities/activity_1.json".to_string(),
                "activities/activity_2.json".to_string()
            ]
        );
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_overwrite_restores_existing_summary() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![summary(7, "Swim")]);
        let store = MemoryStore::default();
        store.insert("activities/activity_7.json", b"{}".to_vec());
        let job = sync(&source, &store, &dir);

        let report = job.fetch_and_sync(10, true).await;

        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped_existing, 0);
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.exists_count(), 0);

        let stored: serde_json::Value =
            serde_json::from_slice(&store.object("activities/activity_7.json").unwrap()).unwrap();
        assert_eq!(stored["activityName"], "Swim");
        assert_eq!(
            store.content_type("activities/activity_7.json").as_deref(),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_source_failure_degrades_to_empty_run() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::failing();
        let store = MemoryStore::default();

        let report = sync(&source, &store, &dir).fetch_and_sync(90, false).await;

        assert_eq!(report, SyncReport::default());
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_requested_count_is_passed_to_source() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![summary(1, "a"), summary(2, "b"), summary(3, "c")]);
        let store = MemoryStore::default();

        let report = sync(&source, &store, &dir).fetch_and_sync(2, false).await;

        assert_eq!(source.searches(), vec![(0, 2)]);
        assert_eq!(report.summaries_seen, 2);
    }

    #[tokio::test]
    async fn test_marker_check_failure_stores_summary() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![summary(3, "Hike")]);
        let store = MemoryStore::default();
        store.fail_exists();

        let report = sync(&source, &store, &dir).fetch_and_sync(90, false).await;

        assert_eq!(report.stored, 1);
        assert!(store.object("activities/activity_3.json").is_some());
    }

    #[tokio::test]
    async fn test_failed_store_is_counted_and_processing_continues() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![summary(1, "a"), summary(2, "b")]);
        source.add_binary(1, zip_bytes(&[("1_ACTIVITY.fit", "fit-1")]));
        source.add_binary(2, zip_bytes(&[("2_ACTIVITY.fit", "fit-2")]));
        let store = MemoryStore::default();
        store.fail_put("activities/activity_1.json");

        let report = sync(&source, &store, &dir)
            .with_original_downloads(true)
            .fetch_and_sync(90, false)
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.stored, 1);
        // No original download for the summary that failed to store
        assert_eq!(source.binary_fetches(), vec!["/download-service/files/activity/2".to_string()]);
        assert_eq!(report.originals_downloaded, 1);
        assert!(store.object("activities/activity_2.json").is_some());
    }

    #[tokio::test]
    async fn test_original_archives_are_unpacked_after_summaries() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![summary(5, "Ride"), summary(6, "Run")]);
        source.add_binary(5, zip_bytes(&[("5_ACTIVITY.fit", "fit-5")]));
        let store = MemoryStore::default();

        let report = sync(&source, &store, &dir)
            .with_original_downloads(true)
            .fetch_and_sync(90, false)
            .await;

        assert_eq!(report.stored, 2);
        assert_eq!(report.originals_downloaded, 1);
        assert_eq!(report.originals_failed, 1);
        assert_eq!(report.archive_entries_uploaded, 1);
        assert_eq!(
            store.object("activities/5_ACTIVITY.fit").as_deref(),
            Some(&b"fit-5"[..])
        );
        assert_eq!(
            store.content_type("activities/5_ACTIVITY.fit").as_deref(),
            Some("application/octet-stream")
        );
    }

    #[tokio::test]
    async fn test_skipped_summaries_do_not_download_originals() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![summary(8, "Row")]);
        source.add_binary(8, zip_bytes(&[("8_ACTIVITY.fit", "fit-8")]));
        let store = MemoryStore::default();
        store.insert("activities/activity_8.json", b"{}".to_vec());

        let report = sync(&source, &store, &dir)
            .with_original_downloads(true)
            .fetch_and_sync(90, false)
            .await;

        assert_eq!(report.skipped_existing, 1);
        assert!(source.binary_fetches().is_empty());
        assert_eq!(report.archive_entries_uploaded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_follows_only_successful_stores() {
        let dir = TempDir::new("pull_test").unwrap();
        let source = FakeSource::with_summaries(vec![
            summary(1, "New"),
            summary(2, "Existing"),
            summary(3, "Rejected"),
        ]);
        let store = MemoryStore::default();
        store.insert("activities/activity_2.json", b"{}".to_vec());
        store.fail_put("activities/activity_3.json");
        let delay = Duration::from_secs(10);

        let started = tokio::time::Instant::now();
        let report = ActivitySync::new(&source, &store, dir.path())
            .with_store_delay(delay)
            .fetch_and_sync(90, false)
            .await;

        assert_eq!(started.elapsed(), delay);
        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(report.failed, 1);
    }
}
