use crate::{
    error::{
        JobError,
        StorageError,
    },
    model::{
        event::{
            Event,
            EventSink,
        },
        job::{
            is_valid_id,
            timestamp_id,
            DeviceStatus,
            JobSummary,
            PrintJob,
            JOB_EXTENSION,
        },
    },
};
use chrono::Utc;
use log::{
    debug,
    info,
};
use std::{
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
};
use tokio::{
    fs::{
        self,
        File,
        OpenOptions,
    },
    io::AsyncWriteExt,
    sync::Mutex,
};

struct ActiveJob {
    job: PrintJob,
    file: File,
}

struct Inner {
    active: ActiveJob,
    /// Connections that have delivered data and are still open.
    printing: usize,
}

/// Owns the job logs on disk and the printer state shared by both listeners.
///
/// Everything mutable sits behind one mutex, and an append holds it until
/// the bytes are flushed, so each connection's chunks land in receive order.
pub struct JobStore {
    dir: PathBuf,
    events: EventSink,
    inner: Mutex<Inner>,
}

impl JobStore {
    /// Creates `dir` if needed and starts the first job.
    pub async fn open(dir: impl AsRef<Path>, events: EventSink) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::new("create jobs directory", &dir, e))?;

        let active = create_job(&dir).await?;
        let id = active.job.id.clone();
        info!("Job store ready in {} [job={}]", dir.display(), id);

        let store = Self {
            dir,
            events,
            inner: Mutex::new(Inner {
                active,
                printing: 0,
            }),
        };
        store.events.notify(Event::NewJob { id });
        Ok(store)
    }

    /// Freezes the active job and starts an empty one. On error the
    /// previous job stays active.
    pub async fn new_job(&self) -> Result<PrintJob, StorageError> {
        let job = {
            let mut inner = self.inner.lock().await;
            let previous = &mut inner.active;
            previous
                .file
                .flush()
                .await
                .map_err(|e| StorageError::new("flush", &previous.job.path, e))?;

            let next = create_job(&self.dir).await?;
            let previous = std::mem::replace(&mut inner.active, next);
            info!("Archived job {}, now writing {}", previous.job.id, inner.active.job.id);
            inner.active.job.clone()
        };

        self.events.notify(Event::NewJob { id: job.id.clone() });
        Ok(job)
    }

    pub async fn current_job(&self) -> PrintJob {
        self.inner.lock().await.active.job.clone()
    }

    pub async fn append(&self, data: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        let active = &mut inner.active;
        let file = &mut active.file;
        let written = async {
            file.write_all(data).await?;
            file.flush().await
        };
        written
            .await
            .map_err(|e| StorageError::new("append to", &active.job.path, e))?;
        debug!("Appended {} bytes to job {}", data.len(), active.job.id);
        Ok(())
    }

    pub async fn printing_started(&self) {
        let mut inner = self.inner.lock().await;
        inner.printing += 1;
    }

    pub async fn printing_finished(&self) {
        let mut inner = self.inner.lock().await;
        inner.printing = inner.printing.saturating_sub(1);
    }

    pub async fn status(&self) -> DeviceStatus {
        if self.inner.lock().await.printing > 0 {
            DeviceStatus::Printing
        } else {
            DeviceStatus::Idle
        }
    }

    /// Every job log except the active one, newest first.
    pub async fn list_archived(&self) -> Result<Vec<JobSummary>, StorageError> {
        let active = self.current_job().await.id;
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StorageError::new("list", &self.dir, e))?;

        let mut jobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::new("list", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(JOB_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if id == active {
                continue;
            }
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StorageError::new("stat", &path, e))?;
            if !meta.is_file() {
                continue;
            }
            jobs.push(JobSummary {
                id: id.to_string(),
                size: meta.len(),
                path,
            });
        }

        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(jobs)
    }

    /// Contents of any job, active or archived.
    pub async fn read_job(&self, id: &str) -> Result<Vec<u8>, JobError> {
        if !is_valid_id(id) {
            return Err(JobError::NotFound(id.to_string()));
        }
        let path = job_path(&self.dir, id);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(JobError::NotFound(id.to_string())),
            Err(e) => Err(StorageError::new("read", path, e).into()),
        }
    }

    pub async fn close(&self) -> Result<(), StorageError> {
        let inner = self.inner.lock().await;
        let active = &inner.active;
        active
            .file
            .sync_all()
            .await
            .map_err(|e| StorageError::new("sync", &active.job.path, e))
    }
}

#[cfg(test)]
impl JobStore {
    /// Swaps the handle appends go to, leaving the job record alone.
    pub(crate) async fn replace_active_file(&self, file: File) {
        self.inner.lock().await.active.file = file;
    }
}

fn job_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.{}", id, JOB_EXTENSION))
}

/// Never reuses an existing log: a second job in the same second gets a
/// numeric suffix instead of truncating its predecessor.
async fn create_job(dir: &Path) -> Result<ActiveJob, StorageError> {
    let created = Utc::now();
    let base = timestamp_id(created);

    let mut attempt = 0u32;
    loop {
        let id = if attempt == 0 {
            base.clone()
        } else {
            format!("{}-{:03}", base, attempt)
        };
        let path = job_path(dir, &id);

        match OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                return Ok(ActiveJob {
                    job: PrintJob { id, path, created },
                    file,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(StorageError::new("create", path, e)),
        }
    }
}
