//! Ingestion orchestrator — synchronous directory runs and the upload job queue.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::types::{now_millis, IngestionJob, JobState};
use govrag_core::{Error, LoaderError, Result};
use govrag_ingest::{DocumentFormat, IngestFailure, IngestSummary, Ingester};

/// Terminal jobs kept for status queries.
pub const JOB_HISTORY_LIMIT: usize = 100;

/// Work handed to the background worker.
enum JobRequest {
    Upload {
        job_id: String,
        path: PathBuf,
        document_id: String,
        filename: String,
    },
    Directory {
        job_id: String,
        dir: PathBuf,
        clear_existing: bool,
    },
}

impl JobRequest {
    fn job_id(&self) -> &str {
        match self {
            Self::Upload { job_id, .. } | Self::Directory { job_id, .. } => job_id,
        }
    }
}

/// Job records in submission order, with a bounded history of finished ones.
#[derive(Default)]
struct JobTable {
    jobs: HashMap<String, IngestionJob>,
    order: VecDeque<String>,
    finished: VecDeque<String>,
}

impl JobTable {
    fn insert(&mut self, job: IngestionJob) {
        self.order.push_back(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
    }

    fn start(&mut self, id: &str) {
        if let Some(job) = self.jobs.get_mut(id) {
            if job.state == JobState::Accepted {
                job.state = JobState::Running;
                job.started_at = Some(now_millis());
            }
        }
    }

    /// Move a job to its terminal state. Finished jobs never change again.
    fn finish(&mut self, id: &str, state: JobState, outcomes: Option<IngestSummary>, error: Option<String>) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        if job.state.is_terminal() {
            return;
        }
        job.state = state;
        job.outcomes = outcomes;
        job.error = error;
        job.completed_at = Some(now_millis());

        self.finished.push_back(id.to_string());
        while self.finished.len() > JOB_HISTORY_LIMIT {
            if let Some(evicted) = self.finished.pop_front() {
                self.jobs.remove(&evicted);
                self.order.retain(|j| j != &evicted);
            }
        }
    }

    fn list(&self) -> Vec<IngestionJob> {
        self.order
            .iter()
            .filter_map(|id| self.jobs.get(id).cloned())
            .collect()
    }
}

/// Owns the ingestion pipeline and the queue of background jobs.
pub struct IngestionOrchestrator {
    ingester: Arc<Ingester>,
    uploads_dir: PathBuf,
    jobs: RwLock<JobTable>,
    /// Held for a whole ingestion run, so runs never interleave.
    run_lock: Mutex<()>,
    tx: mpsc::UnboundedSender<JobRequest>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<JobRequest>>>,
}

impl IngestionOrchestrator {
    pub fn new(ingester: Arc<Ingester>, uploads_dir: impl Into<PathBuf>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ingester,
            uploads_dir: uploads_dir.into(),
            jobs: RwLock::new(JobTable::default()),
            run_lock: Mutex::new(()),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    pub fn ingester(&self) -> &Arc<Ingester> {
        &self.ingester
    }

    /// Ingest a directory on the calling thread (blocking).
    ///
    /// Waits for any run already in progress, including a background job.
    pub fn ingest(&self, dir: &Path, clear_existing: bool) -> Result<IngestSummary> {
        let _run = self.run_lock.lock();
        self.ingester.ingest_directory(dir, clear_existing)
    }

    /// Stage an uploaded file and queue it for ingestion.
    ///
    /// The extension is checked first: an unsupported file creates no job and
    /// writes nothing. Returns the job in its `accepted` state.
    pub fn submit_upload(&self, filename: &str, bytes: &[u8]) -> Result<IngestionJob> {
        let filename = sanitize_filename(filename);
        let path_for_format = Path::new(&filename);
        DocumentFormat::from_path(path_for_format)?;
        if !self.ingester.registry().supports(path_for_format) {
            return Err(LoaderError::UnsupportedFormat(filename).into());
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let job_dir = self.uploads_dir.join(&job_id);
        std::fs::create_dir_all(&job_dir)?;
        let path = job_dir.join(&filename);
        if let Err(e) = std::fs::write(&path, bytes) {
            self.remove_staged(&path);
            return Err(e.into());
        }

        let document_id = format!("upload:{}/{}", job_id, filename);
        let job = IngestionJob::accepted(job_id.clone(), filename.clone(), Some(document_id.clone()));
        self.jobs.write().insert(job.clone());
        info!("Accepted upload {} as job {} ({} bytes)", filename, job_id, bytes.len());

        let staged = path.clone();
        if let Err(e) = self.enqueue(JobRequest::Upload {
            job_id,
            path,
            document_id,
            filename,
        }) {
            self.remove_staged(&staged);
            return Err(e);
        }
        Ok(job)
    }

    /// Queue a directory ingestion. A missing directory is rejected up front.
    pub fn submit_directory(&self, dir: &Path, clear_existing: bool) -> Result<IngestionJob> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!(
                "Data directory not found: {}",
                dir.display()
            )));
        }
        let job_id = uuid::Uuid::new_v4().to_string();
        let job = IngestionJob::accepted(job_id.clone(), dir.display().to_string(), None);
        self.jobs.write().insert(job.clone());
        info!("Accepted directory {} as job {}", dir.display(), job_id);

        self.enqueue(JobRequest::Directory {
            job_id,
            dir: dir.to_path_buf(),
            clear_existing,
        })?;
        Ok(job)
    }

    pub fn job(&self, id: &str) -> Option<IngestionJob> {
        self.jobs.read().jobs.get(id).cloned()
    }

    /// All known jobs in submission order.
    pub fn jobs(&self) -> Vec<IngestionJob> {
        self.jobs.read().list()
    }

    /// Start the background worker. Only the first call starts one.
    pub fn start_worker(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let Some(mut rx) = self.rx.lock().take() else {
            error!("Ingestion worker already started");
            return None;
        };
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            info!("Background ingestion worker started");
            while let Some(request) = rx.recv().await {
                let job_id = request.job_id().to_string();
                let worker = Arc::clone(&this);
                if let Err(e) = tokio::task::spawn_blocking(move || worker.run_job(request)).await {
                    error!("Ingestion job {} aborted: {}", job_id, e);
                    this.jobs
                        .write()
                        .finish(&job_id, JobState::Failed, None, Some(format!("job aborted: {}", e)));
                }
            }
        }))
    }

    fn enqueue(&self, request: JobRequest) -> Result<()> {
        let job_id = request.job_id().to_string();
        self.tx.send(request).map_err(|_| {
            let message = "ingestion worker is not running".to_string();
            self.jobs
                .write()
                .finish(&job_id, JobState::Failed, None, Some(message.clone()));
            Error::Internal(message)
        })
    }

    fn run_job(&self, request: JobRequest) {
        let job_id = request.job_id().to_string();
        let _run = self.run_lock.lock();
        self.jobs.write().start(&job_id);

        match request {
            JobRequest::Upload {
                path,
                document_id,
                filename,
                ..
            } => {
                info!("Processing job {}: {}", job_id, filename);
                let summary = match self.ingester.ingest_file(&path, &document_id, &filename) {
                    Ok(chunks) => IngestSummary {
                        documents_processed: 1,
                        chunks_indexed: chunks,
                        failures: Vec::new(),
                    },
                    Err(e) => {
                        warn!("Job {} failed: {}", job_id, e);
                        IngestSummary {
                            documents_processed: 0,
                            chunks_indexed: 0,
                            failures: vec![IngestFailure {
                                document: filename.clone(),
                                error: e.to_string(),
                            }],
                        }
                    }
                };
                let error = summary.failures.first().map(|f| f.error.clone());
                self.jobs
                    .write()
                    .finish(&job_id, JobState::from_summary(&summary), Some(summary), error);
                self.remove_staged(&path);
            }
            JobRequest::Directory {
                dir, clear_existing, ..
            } => {
                info!("Processing job {}: directory {}", job_id, dir.display());
                match self.ingester.ingest_directory(&dir, clear_existing) {
                    Ok(summary) => {
                        let state = JobState::from_summary(&summary);
                        self.jobs.write().finish(&job_id, state, Some(summary), None);
                    }
                    Err(e) => {
                        warn!("Job {} failed: {}", job_id, e);
                        self.jobs
                            .write()
                            .finish(&job_id, JobState::Failed, None, Some(e.to_string()));
                    }
                }
            }
        }
    }

    /// Remove an upload's staging directory once the job is done.
    fn remove_staged(&self, path: &Path) {
        let Some(job_dir) = path.parent() else {
            return;
        };
        if job_dir.starts_with(&self.uploads_dir) && job_dir != self.uploads_dir {
            if let Err(e) = std::fs::remove_dir_all(job_dir) {
                warn!("Failed to remove staged upload {}: {}", job_dir.display(), e);
            }
        }
    }
}

/// Keep only the final path component of a client-supplied name.
fn sanitize_filename(filename: &str) -> String {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match last {
        "" | "." | ".." => String::new(),
        name => name.to_string(),
    }
}
