//! Job dispatcher: the boundary between callers and the isolated worker.
//!
//! [`Dispatcher::submit_job`]:
//!
//! 1. Take a job slot, or fail with [`JobError::TooManyJobs`]. Nothing is
//!    spawned when saturated.
//! 2. Validate structure, buffer and dimensions. Nothing is spawned on
//!    failure.
//! 3. Hand the job to the [`WorkerLauncher`], which resolves and starts the
//!    isolation unit and enforces the timeout.
//! 4. Turn the single reply into the archive or a typed error.
//!
//! The slot is a guard released exactly once on every path. It is handed to
//! the launcher with the job, so a thread that outlives its timeout keeps
//! counting against the cap until it actually finishes.

use crate::launcher::WorkerLauncher;
use crate::security::{JobSlot, JobSlots, Limits, SecurityError};
use crate::types::{
    DownloadState, FailureKind, ImageDimension, ImageDimensionsResizeJob, ImageFormat, JobFailure,
};
use crate::worker;
use futures::channel::oneshot;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A valid 1×1 PNG used by the self-test job.
pub const PROBE_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00, 0x00, 0xB5, 0x1C, 0x0C,
    0x02, 0x00, 0x00, 0x00, 0x0B, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x60, 0x60, 0x00, 0x00,
    0x00, 0x03, 0x00, 0x01, 0xB8, 0xAD, 0x3A, 0x63, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44,
    0xAE, 0x42, 0x60, 0x82,
];

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Too many concurrent operations: maximum {max} jobs allowed")]
    TooManyJobs { max: usize },
    #[error("Invalid job structure: {0}")]
    InvalidJobStructure(String),
    #[error("{0}")]
    InvalidImageBuffer(String),
    #[error("{0}")]
    InvalidDimensions(String),
    #[error("Failed to start worker {unit}: {source}")]
    WorkerSpawn {
        unit: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Worker error: {0}")]
    WorkerCrash(String),
    #[error("{0}")]
    Transform(String),
    #[error("Worker timed out after {0:?}")]
    Timeout(Duration),
}

impl JobError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        self.kind_of().code()
    }

    fn kind_of(&self) -> FailureKind {
        match self {
            Self::TooManyJobs { .. } => FailureKind::TooManyJobs,
            Self::InvalidJobStructure(_) => FailureKind::InvalidJobStructure,
            Self::InvalidImageBuffer(_) => FailureKind::InvalidImageBuffer,
            Self::InvalidDimensions(_) => FailureKind::InvalidDimensions,
            Self::WorkerSpawn { .. } => FailureKind::WorkerSpawnFailure,
            Self::WorkerCrash(_) => FailureKind::WorkerCrash,
            Self::Transform(_) => FailureKind::TransformFailure,
            Self::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Whether the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TooManyJobs { .. })
    }
}

impl From<SecurityError> for JobError {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::TooManyJobs { max } => Self::TooManyJobs { max },
            SecurityError::InvalidDimensions(_) => Self::InvalidDimensions(e.to_string()),
            SecurityError::InvalidImageBuffer(_)
            | SecurityError::InvalidFile(_)
            | SecurityError::PathTraversal(_) => Self::InvalidImageBuffer(e.to_string()),
        }
    }
}

impl From<JobFailure> for JobError {
    fn from(failure: JobFailure) -> Self {
        let JobFailure { kind, message } = failure;
        match kind {
            FailureKind::InvalidJobStructure => Self::InvalidJobStructure(message),
            FailureKind::InvalidImageBuffer => Self::InvalidImageBuffer(message),
            FailureKind::InvalidDimensions => Self::InvalidDimensions(message),
            FailureKind::TransformFailure => Self::Transform(message),
            // A worker never reports these itself.
            FailureKind::TooManyJobs
            | FailureKind::WorkerSpawnFailure
            | FailureKind::WorkerCrash
            | FailureKind::Timeout => Self::WorkerCrash(message),
        }
    }
}

impl From<&JobError> for JobFailure {
    fn from(e: &JobError) -> Self {
        JobFailure::new(e.kind_of(), e.to_string())
    }
}

impl From<Result<Vec<u8>, JobError>> for DownloadState {
    fn from(result: Result<Vec<u8>, JobError>) -> Self {
        match result {
            Ok(zip_buffer) => DownloadState::Success { zip_buffer },
            Err(e) => DownloadState::Failure(JobFailure::from(&e)),
        }
    }
}

/// The 1×1 PNG job: origin `test` at 1×1 plus `test_resized` at 2×2.
pub fn self_test_job() -> ImageDimensionsResizeJob {
    ImageDimensionsResizeJob::new(
        PROBE_PNG.to_vec(),
        ImageDimension::new("test", 1, 1, ImageFormat::Png),
        vec![ImageDimension::new("test_resized", 2, 2, ImageFormat::Png)],
    )
}

/// Admits, validates and forwards jobs to one [`WorkerLauncher`].
pub struct Dispatcher {
    slots: Arc<JobSlots>,
    launcher: Box<dyn WorkerLauncher>,
    limits: Limits,
    timeout: Duration,
}

impl Dispatcher {
    /// Dispatcher with its own slot pool of `limits.max_concurrent_jobs`.
    pub fn new(launcher: Box<dyn WorkerLauncher>, limits: Limits, timeout: Duration) -> Self {
        Self {
            slots: JobSlots::new(limits.max_concurrent_jobs),
            launcher,
            limits,
            timeout,
        }
    }

    /// Share an existing slot pool instead.
    pub fn with_slots(mut self, slots: Arc<JobSlots>) -> Self {
        self.slots = slots;
        self
    }

    pub fn slots(&self) -> &Arc<JobSlots> {
        &self.slots
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Run one job to completion and return the ZIP archive.
    pub fn submit_job(&self, job: ImageDimensionsResizeJob) -> Result<Vec<u8>, JobError> {
        let slot = self.slots.acquire()?;
        debug!(
            in_flight = self.slots.current(),
            max = self.slots.max(),
            "job admitted"
        );

        worker::validate_job(&job, &self.limits)?;

        match self.launcher.run(job, self.timeout, slot)? {
            DownloadState::Success { zip_buffer } => Ok(zip_buffer),
            DownloadState::Failure(failure) => Err(failure.into()),
        }
    }

    /// [`submit_job`](Self::submit_job) folded into a [`DownloadState`].
    pub fn submit(&self, job: ImageDimensionsResizeJob) -> DownloadState {
        self.submit_job(job).into()
    }

    /// Run [`submit_job`](Self::submit_job) on a background thread and
    /// resolve when it finishes, for callers driving an event loop.
    pub fn spawn_job(
        self: &Arc<Self>,
        job: ImageDimensionsResizeJob,
    ) -> impl Future<Output = Result<Vec<u8>, JobError>> + Send + use<> {
        let (tx, rx) = oneshot::channel();
        let dispatcher = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("grumpy-dispatch".into())
            .spawn(move || {
                let _ = tx.send(dispatcher.submit_job(job));
            });

        async move {
            spawned.map_err(|source| JobError::WorkerSpawn {
                unit: "dispatch thread".into(),
                source,
            })?;
            rx.await.map_err(|_| {
                JobError::WorkerCrash("dispatch thread ended without a result".into())
            })?
        }
    }
}
