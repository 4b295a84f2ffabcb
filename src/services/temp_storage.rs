use crate::models::{TempFile, TempJob};
use crate::utils::job_locks::JobLocks;
use crate::utils::validation::{file_extension, sanitize_filename};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every job directory below the storage root
pub const JOB_PREFIX: &str = "job_";

const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("File {file_id} not found in job {job_id}")]
    FileNotFound { job_id: String, file_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive error: {0}")]
    Archive(String),
}

impl From<zip::result::ZipError> for StorageError {
    fn from(e: zip::result::ZipError) -> Self {
        StorageError::Archive(e.to_string())
    }
}

/// Job-scoped temporary storage: one directory per job plus an in-memory
/// registry of the files it holds.
///
/// The registry lives for the lifetime of the process. Mutations of a single
/// job (saves, archive registration, cleanup) are serialized through a per-job
/// lock; different jobs never contend.
pub struct TempStorage {
    base_dir: PathBuf,
    jobs: DashMap<String, TempJob>,
    job_locks: JobLocks,
}

impl TempStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            jobs: DashMap::new(),
            job_locks: JobLocks::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Creates the storage root and removes job directories left behind by a
    /// previous process. Returns the number of directories purged.
    pub async fn init(&self) -> Result<usize, StorageError> {
        fs::create_dir_all(&self.base_dir).await?;

        let mut purged = 0;
        let mut entries = fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(JOB_PREFIX) || self.jobs.contains_key(&name) {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => purged += 1,
                Err(e) => warn!("Failed to purge stale job directory {}: {}", name, e),
            }
        }

        if purged > 0 {
            info!("🧹 Purged {} stale job directories", purged);
        }
        Ok(purged)
    }

    pub async fn create_job(&self) -> Result<String, StorageError> {
        fs::create_dir_all(&self.base_dir).await?;

        let job_id = format!("{}{}", JOB_PREFIX, Uuid::new_v4().simple());
        let directory = self.base_dir.join(&job_id);

        // create_dir (not _all) so an id collision surfaces as an error
        fs::create_dir(&directory).await?;

        self.jobs.insert(
            job_id.clone(),
            TempJob {
                id: job_id.clone(),
                directory,
                files: Vec::new(),
                created_at: Utc::now(),
            },
        );

        info!(job_id = %job_id, "Created job");
        Ok(job_id)
    }

    pub fn get_job(&self, job_id: &str) -> Option<TempJob> {
        self.jobs.get(job_id).map(|job| job.clone())
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Writes `buffer` into the job directory and registers it.
    ///
    /// The bytes are flushed under a staging name and renamed into place before
    /// the record is appended, so a registered file is always complete on disk.
    pub async fn save_file(
        &self,
        job_id: &str,
        buffer: &[u8],
        original_name: &str,
        mime_type: &str,
    ) -> Result<TempFile, StorageError> {
        let mut saved = self
            .save_files(job_id, &[(buffer, original_name, mime_type)])
            .await?;
        saved
            .pop()
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))
    }

    /// Writes a batch of `(bytes, name, mime type)` files and registers them
    /// together under one hold of the job lock.
    ///
    /// All or nothing: when any write fails the files already placed are
    /// deleted again and the job's file list is never touched.
    pub async fn save_files(
        &self,
        job_id: &str,
        files: &[(&[u8], &str, &str)],
    ) -> Result<Vec<TempFile>, StorageError> {
        let _guard = self.job_locks.lock(job_id).await;
        let directory = self.job_directory(job_id)?;

        let mut records = Vec::with_capacity(files.len());
        for &(buffer, original_name, mime_type) in files {
            let record = new_record(&directory, buffer, original_name, mime_type);
            if let Err(e) = write_staged(&record.path, buffer).await {
                warn!(job_id = %job_id, "Failed to save '{}': {}", original_name, e);
                discard(&records).await;
                return Err(e);
            }
            records.push(record);
        }

        let registered = match self.jobs.get_mut(job_id) {
            Some(mut job) => {
                job.files.extend(records.iter().cloned());
                true
            }
            None => false,
        };
        if !registered {
            discard(&records).await;
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }

        for record in &records {
            debug!(
                job_id = %job_id,
                file_id = %record.id,
                size = record.size,
                "Saved file '{}'",
                record.original_name
            );
        }
        Ok(records)
    }

    pub fn get_file(&self, job_id: &str, file_id: &str) -> Option<TempFile> {
        self.jobs
            .get(job_id)
            .and_then(|job| job.file(file_id).cloned())
    }

    /// Resolves file ids of one job, preserving the requested order
    pub fn resolve_files(
        &self,
        job_id: &str,
        file_ids: &[String],
    ) -> Result<Vec<TempFile>, StorageError> {
        let job = self
            .jobs
            .get(job_id)
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))?;

        file_ids
            .iter()
            .map(|file_id| {
                job.file(file_id)
                    .cloned()
                    .ok_or_else(|| StorageError::FileNotFound {
                        job_id: job_id.to_string(),
                        file_id: file_id.clone(),
                    })
            })
            .collect()
    }

    pub async fn read_file(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        Ok(fs::read(path).await?)
    }

    pub async fn write_file(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        Ok(fs::write(path, data).await?)
    }

    /// Streams `files` into a maximally compressed zip at `output_path`.
    ///
    /// The archive is built under a `.partial` name and only renamed into place
    /// after the writer has finished and the file is synced, so a failed run
    /// never leaves a complete-looking archive behind. Returns the archive size.
    pub async fn create_zip(
        &self,
        files: &[TempFile],
        output_path: &Path,
    ) -> Result<u64, StorageError> {
        let entries = archive_entries(files);
        let staging = partial_path(output_path);

        let result = tokio::task::spawn_blocking({
            let staging = staging.clone();
            move || write_zip(&entries, &staging)
        })
        .await
        .map_err(|e| StorageError::Archive(format!("Archive task failed: {}", e)));

        match result.and_then(|r| r) {
            Ok(()) => {
                fs::rename(&staging, output_path).await?;
                let size = fs::metadata(output_path).await?.len();
                info!(
                    "📦 Created archive {} ({} entries, {} bytes)",
                    output_path.display(),
                    files.len(),
                    size
                );
                Ok(size)
            }
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                tracing::error!("Failed to create archive {}: {}", output_path.display(), e);
                Err(e)
            }
        }
    }

    /// Zips files of a job into the job directory and registers the archive
    pub async fn create_job_archive(
        &self,
        job_id: &str,
        files: &[TempFile],
        archive_name: &str,
    ) -> Result<TempFile, StorageError> {
        let _guard = self.job_locks.lock(job_id).await;
        let directory = self.job_directory(job_id)?;

        if let Some(foreign) = files.iter().find(|f| !f.path.starts_with(&directory)) {
            return Err(StorageError::FileNotFound {
                job_id: job_id.to_string(),
                file_id: foreign.id.clone(),
            });
        }

        let file_id = Uuid::new_v4().simple().to_string();
        let path = directory.join(format!("{}.zip", file_id));
        let size = self.create_zip(files, &path).await?;

        let mut name = sanitize_filename(archive_name);
        if name.is_empty() {
            name = "files".to_string();
        }
        if file_extension(&name).as_deref() != Some("zip") {
            name.push_str(".zip");
        }

        let record = TempFile {
            id: file_id,
            original_name: name,
            path,
            size,
            mime_type: "application/zip".to_string(),
            created_at: Utc::now(),
        };
        self.register(job_id, record.clone()).await?;
        Ok(record)
    }

    /// Deletes the job directory and its registry entry.
    ///
    /// Idempotent: an unknown job or an already missing directory is success.
    /// Failures are logged, never returned.
    pub async fn cleanup_job(&self, job_id: &str) {
        let _guard = self.job_locks.lock(job_id).await;

        let Some((_, job)) = self.jobs.remove(job_id) else {
            debug!(job_id = %job_id, "Job already cleaned up");
            return;
        };

        match fs::remove_dir_all(&job.directory).await {
            Ok(()) => info!(job_id = %job_id, files = job.files.len(), "Cleaned up job"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(job_id = %job_id, "Job directory already removed")
            }
            Err(e) => warn!("Failed to remove directory for job {}: {}", job_id, e),
        }
    }

    /// Removes every job created more than `max_age_hours` ago
    pub async fn cleanup_old_jobs(&self, max_age_hours: u64) -> usize {
        let max_age = i64::try_from(max_age_hours).unwrap_or(i64::MAX / 3600);
        self.cleanup_jobs_older_than(Utc::now() - Duration::hours(max_age))
            .await
    }

    /// Removes every registered job. Used on shutdown.
    pub async fn cleanup_all_jobs(&self) -> usize {
        self.cleanup_jobs_older_than(DateTime::<Utc>::MAX_UTC).await
    }

    pub async fn cleanup_jobs_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        // Collect first: no map guard may be held across an await
        let expired: Vec<String> = self
            .jobs
            .iter()
            .filter(|job| job.created_at < cutoff)
            .map(|job| job.key().clone())
            .collect();

        for job_id in &expired {
            self.cleanup_job(job_id).await;
        }
        let pruned = self.job_locks.prune();
        debug!(pruned, remaining = self.job_locks.len(), "Pruned idle job locks");

        if !expired.is_empty() {
            info!("🧹 Swept {} expired jobs", expired.len());
        }
        expired.len()
    }

    fn job_directory(&self, job_id: &str) -> Result<PathBuf, StorageError> {
        self.jobs
            .get(job_id)
            .map(|job| job.directory.clone())
            .ok_or_else(|| StorageError::JobNotFound(job_id.to_string()))
    }

    /// Appends a record; callers hold the job lock
    async fn register(&self, job_id: &str, record: TempFile) -> Result<(), StorageError> {
        let orphan = match self.jobs.get_mut(job_id) {
            Some(mut job) => {
                job.files.push(record);
                None
            }
            None => Some(record),
        };

        // Shard guard is released before touching the filesystem
        if let Some(record) = orphan {
            let _ = fs::remove_file(&record.path).await;
            return Err(StorageError::JobNotFound(job_id.to_string()));
        }
        Ok(())
    }
}

/// Record for a new file of a job; the stored name is `{id}.{ext}`
fn new_record(directory: &Path, buffer: &[u8], original_name: &str, mime_type: &str) -> TempFile {
    let file_id = Uuid::new_v4().simple().to_string();
    let file_name = match file_extension(original_name)
        .map(|ext| sanitize_filename(&ext))
        .filter(|ext| !ext.is_empty())
    {
        Some(ext) => format!("{}.{}", file_id, ext),
        None => file_id.clone(),
    };

    let display_name = match sanitize_filename(original_name) {
        name if name.is_empty() => file_name.clone(),
        name => name,
    };

    TempFile {
        id: file_id,
        original_name: display_name,
        path: directory.join(file_name),
        size: buffer.len() as u64,
        mime_type: mime_type.to_string(),
        created_at: Utc::now(),
    }
}

async fn discard(records: &[TempFile]) {
    for record in records {
        if let Err(e) = fs::remove_file(&record.path).await {
            warn!("Failed to discard {}: {}", record.path.display(), e);
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

async fn write_staged(path: &Path, buffer: &[u8]) -> Result<(), StorageError> {
    let staging = partial_path(path);

    let written = async {
        let mut file = fs::File::create(&staging).await?;
        file.write_all(buffer).await?;
        file.sync_all().await?;
        fs::rename(&staging, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}

/// Entry names for an archive, disambiguating duplicates as `name (2).ext`
fn archive_entries(files: &[TempFile]) -> Vec<(String, PathBuf)> {
    let mut used = HashSet::new();

    files
        .iter()
        .map(|file| {
            let original = if file.original_name.is_empty() {
                file.id.clone()
            } else {
                file.original_name.clone()
            };

            let mut candidate = original.clone();
            let mut counter = 2;
            while !used.insert(candidate.clone()) {
                let path = Path::new(&original);
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                candidate = match path.extension() {
                    Some(ext) => format!("{} ({}).{}", stem, counter, ext.to_string_lossy()),
                    None => format!("{} ({})", stem, counter),
                };
                counter += 1;
            }

            (candidate, file.path.clone())
        })
        .collect()
}

fn write_zip(entries: &[(String, PathBuf)], staging: &Path) -> Result<(), StorageError> {
    let file = std::fs::File::create(staging)?;
    let mut zip = zip::ZipWriter::new(std::io::BufWriter::new(file));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(9));

    for (name, path) in entries {
        let mut source = std::fs::File::open(path)
            .map_err(|e| StorageError::Archive(format!("Failed to open '{}': {}", name, e)))?;
        zip.start_file(name.as_str(), options)?;
        io::copy(&mut source, &mut zip)
            .map_err(|e| StorageError::Archive(format!("Failed to write '{}': {}", name, e)))?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| StorageError::Archive(format!("Failed to flush archive: {}", e)))?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> TempFile {
        TempFile {
            id: Uuid::new_v4().simple().to_string(),
            original_name: name.to_string(),
            path: PathBuf::from(format!("/tmp/{}", name)),
            size: 0,
            mime_type: "application/pdf".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_archive_entries_disambiguates_duplicates() {
        let files = [record("a.pdf"), record("a.pdf"), record("b"), record("a.pdf"), record("b")];
        let names: Vec<String> = archive_entries(&files).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.pdf", "a (2).pdf", "b", "a (3).pdf", "b (2)"]);
    }

    #[tokio::test]
    async fn test_sweep_prunes_job_locks() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = TempStorage::new(dir.path());
        let job_id = storage.create_job().await.unwrap();
        storage.save_file(&job_id, b"x", "x.pdf", "application/pdf").await.unwrap();
        assert_eq!(storage.job_locks.len(), 1);

        storage.cleanup_all_jobs().await;
        assert!(storage.job_locks.is_empty());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/data/job_1/out.zip")),
            PathBuf::from("/data/job_1/out.zip.partial")
        );
    }
}
