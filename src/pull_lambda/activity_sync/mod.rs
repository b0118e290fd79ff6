use garmin_drivetrain::common::blob_store::BlobStore;
use garmin_drivetrain::common::garmin_client::SourceApi;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod archive;
#[cfg(test)]
mod fakes;
mod sync;

pub use sync::SyncReport;

pub struct ActivitySync<'a> {
    source: &'a dyn SourceApi,
    store: &'a dyn BlobStore,
    work_dir: PathBuf,
    store_delay: Duration,
    download_originals: bool,
}

impl<'a> ActivitySync<'a> {
    pub fn new(source: &'a dyn SourceApi, store: &'a dyn BlobStore, work_dir: &Path) -> Self {
        Self {
            source,
            store,
            work_dir: work_dir.to_path_buf(),
            store_delay: Duration::from_secs(1),
            download_originals: false,
        }
    }

    /// Courtesy pause toward the source after every freshly stored summary.
    pub fn with_store_delay(mut self, store_delay: Duration) -> Self {
        self.store_delay = store_delay;
        self
    }

    /// Also fetch each newly stored activity's original-file archive into the
    /// work directory, where the archive pass picks it up.
    pub fn with_original_downloads(mut self, enabled: bool) -> Self {
        self.download_originals = enabled;
        self
    }
}
