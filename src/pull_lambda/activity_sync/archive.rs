use super::ActivitySync;
use anyhow::Result;
use function_timer::time;
use garmin_drivetrain::common::blob_store::CONTENT_TYPE_BINARY;
use garmin_drivetrain::common::metrics;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use zip::ZipArchive;

// Upper bound on the buffer reserved up front for one entry
const ENTRY_CAPACITY_LIMIT: u64 = 8 * 1024 * 1024;

impl ActivitySync<'_> {
    /// Republish every entry of every `.zip` in the work directory under
    /// `{prefix}/{entry path}`. Returns `(uploaded, failed)` entry counts.
    #[time("unpack_archives_duration")]
    pub(super) async fn unpack_archives(&self, prefix: &str) -> (usize, usize) {
        info!(
            "Unzipping files from {} and uploading to S3 with prefix {}",
            self.work_dir.display(),
            prefix
        );

        let archives = match list_archives(&self.work_dir) {
            Ok(archives) => archives,
            Err(e) => {
                error!(
                    "Failed to list archives in {}: {}",
                    self.work_dir.display(),
                    e
                );
                return (0, 0);
            }
        };

        let mut uploaded = 0;
        let mut failed = 0;

        for archive_path in archives {
            let mut archive = match open_archive(&archive_path) {
                Ok(archive) => archive,
                Err(e) => {
                    error!("Failed to open archive {}: {}", archive_path.display(), e);
                    continue;
                }
            };

            for index in 0..archive.len() {
                let (name, data) = match read_entry(&mut archive, index) {
                    Ok(Some(entry)) => entry,
                    Ok(None) => continue,
                    Err(e) => {
                        error!(
                            "Failed to read entry {} of {}: {}",
                            index,
                            archive_path.display(),
                            e
                        );
                        failed += 1;
                        continue;
                    }
                };

                let s3_key = format!("{prefix}/{name}");
                match self.store.put(&s3_key, data, CONTENT_TYPE_BINARY).await {
                    Ok(()) => {
                        debug!("Uploaded {} to S3: {}", name, s3_key);
                        uploaded += 1;
                    }
                    Err(e) => {
                        error!("Failed to upload {} to S3: {}", name, e);
                        failed += 1;
                    }
                }
            }
        }

        metrics::increment_archive_entries_uploaded(uploaded as u64);
        metrics::increment_archive_entries_failed(failed as u64);

        (uploaded, failed)
    }
}

fn list_archives(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut archives: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        })
        .collect();
    archives.sort();
    Ok(archives)
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    Ok(ZipArchive::new(File::open(path)?)?)
}

/// Read one entry fully; directories yield `None`.
fn read_entry(archive: &mut ZipArchive<File>, index: usize) -> Result<Option<(String, Vec<u8>)>> {
    let mut file = archive.by_index(index)?;
    if file.is_dir() {
        return Ok(None);
    }

    let name = file.name().to_string();
    let mut data = Vec::with_capacity(capacity_hint(file.size()));
    file.read_to_end(&mut data)?;
    Ok(Some((name, data)))
}

// The declared size comes from the archive header and may be garbage
fn capacity_hint(declared_size: u64) -> usize {
    declared_size.min(ENTRY_CAPACITY_LIMIT) as usize
}
