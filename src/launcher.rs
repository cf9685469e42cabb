//! Isolation units that run a job away from the caller.
//!
//! - [`ThreadLauncher`]: a dedicated, named OS thread in this process. A
//!   panic surfaces as a disconnected reply channel ([`JobError::WorkerCrash`]).
//!   On timeout the thread is detached and its late reply discarded; the
//!   job slot travels with the thread and is only released when it exits.
//! - [`ProcessLauncher`]: a child `grumpy-image worker` process talking the
//!   [`protocol`](crate::protocol) frames over stdin/stdout. Killed on timeout
//!   and always reaped after its reply.
//!
//! Both send exactly one job and accept exactly one reply, and both hold the
//! caller's [`JobSlot`] until the unit has really stopped.

use crate::dispatcher::JobError;
use crate::imaging::ImageBackend;
use crate::protocol::{self, ProtocolError};
use crate::security::{JobSlot, Limits};
use crate::types::{DownloadState, ImageDimensionsResizeJob};
use crate::worker;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Binary name of the worker executable.
pub const WORKER_BINARY: &str = "grumpy-image";

/// Runs one job in an isolation unit and returns its single reply.
///
/// `slot` must stay alive for as long as the unit can still consume CPU,
/// which may be longer than this call.
pub trait WorkerLauncher: Send + Sync {
    fn run(
        &self,
        job: ImageDimensionsResizeJob,
        timeout: Duration,
        slot: JobSlot,
    ) -> Result<DownloadState, JobError>;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string())
}

// =========================================================================
// Thread isolation
// =========================================================================

/// Runs the worker on a fresh OS thread per job.
pub struct ThreadLauncher<B> {
    backend: Arc<B>,
    limits: Limits,
}

impl<B: ImageBackend + 'static> ThreadLauncher<B> {
    pub fn new(backend: B, limits: Limits) -> Self {
        Self {
            backend: Arc::new(backend),
            limits,
        }
    }
}

impl<B: ImageBackend + 'static> WorkerLauncher for ThreadLauncher<B> {
    fn run(
        &self,
        job: ImageDimensionsResizeJob,
        timeout: Duration,
        slot: JobSlot,
    ) -> Result<DownloadState, JobError> {
        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let limits = self.limits;

        let handle = thread::Builder::new()
            .name("grumpy-worker".into())
            .spawn(move || {
                let _slot = slot;
                let state = worker::handle_job(backend.as_ref(), &job, &limits);
                // The receiver is gone after a timeout.
                let _ = tx.send(state);
            })
            .map_err(|source| JobError::WorkerSpawn {
                unit: "worker thread".into(),
                source,
            })?;

        match rx.recv_timeout(timeout) {
            Ok(state) => {
                let _ = handle.join();
                Ok(state)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let reason = match handle.join() {
                    Err(payload) => panic_message(payload.as_ref()),
                    Ok(()) => "worker exited without a reply".to_string(),
                };
                Err(JobError::WorkerCrash(reason))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "worker thread timed out, detaching; its slot stays held");
                Err(JobError::Timeout(timeout))
            }
        }
    }
}

// =========================================================================
// Process isolation
// =========================================================================

/// Ordered worker locations: explicit configuration first, then the current
/// executable when it is itself `grumpy-image`, then the installed layouts
/// next to it.
pub fn default_candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    match std::env::current_exe() {
        Ok(exe) => candidates_for(configured, &exe),
        Err(_) => configured.map(Path::to_path_buf).into_iter().collect(),
    }
}

/// [`default_candidates`] for a given running executable. A host program
/// embedding the library is never a worker candidate itself.
pub fn candidates_for(configured: Option<&Path>, exe: &Path) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = configured.map(Path::to_path_buf).into_iter().collect();
    if exe.file_stem().is_some_and(|stem| stem == WORKER_BINARY) {
        candidates.push(exe.to_path_buf());
    }
    if let Some(dir) = exe.parent() {
        let binary = format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX);
        candidates.push(dir.join(&binary));
        candidates.push(dir.join("..").join("libexec").join(&binary));
    }
    candidates.dedup();
    candidates
}

/// Pick the first existing candidate, else the first one with a warning so
/// the spawn error names a concrete path.
pub fn resolve_worker_executable(candidates: &[PathBuf]) -> PathBuf {
    if let Some(found) = candidates.iter().find(|c| c.is_file()) {
        debug!(path = %found.display(), "worker executable resolved");
        return found.clone();
    }
    let fallback = candidates
        .first()
        .cloned()
        .unwrap_or_else(|| PathBuf::from(WORKER_BINARY));
    warn!(
        path = %fallback.display(),
        tried = candidates.len(),
        "no worker executable candidate exists, using the first"
    );
    fallback
}

/// Runs the worker as a child process per job.
pub struct ProcessLauncher {
    candidates: Vec<PathBuf>,
    args: Vec<String>,
}

impl ProcessLauncher {
    /// `args` are passed to the resolved executable verbatim, e.g.
    /// `["--config", "grumpy-image.toml", "worker"]`.
    pub fn new(candidates: Vec<PathBuf>, args: Vec<String>) -> Self {
        Self { candidates, args }
    }

    fn spawn(&self, path: &Path) -> Result<Child, JobError> {
        Command::new(path)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| JobError::WorkerSpawn {
                unit: path.display().to_string(),
                source,
            })
    }
}

/// Send the job, close stdin, read the one reply.
fn exchange(
    mut stdin: ChildStdin,
    mut stdout: ChildStdout,
    job: &ImageDimensionsResizeJob,
) -> Result<DownloadState, ProtocolError> {
    protocol::write_job(&mut stdin, job)?;
    drop(stdin);
    protocol::read_reply(&mut stdout)
}

fn terminate(child: &mut Child) {
    // Either call fails only when the child is already gone.
    let _ = child.kill();
    let _ = child.wait();
}

impl WorkerLauncher for ProcessLauncher {
    fn run(
        &self,
        job: ImageDimensionsResizeJob,
        timeout: Duration,
        _slot: JobSlot,
    ) -> Result<DownloadState, JobError> {
        let path = resolve_worker_executable(&self.candidates);
        let mut child = self.spawn(&path)?;
        debug!(pid = child.id(), path = %path.display(), "worker process spawned");

        let pipes = child.stdin.take().zip(child.stdout.take());
        let Some((stdin, stdout)) = pipes else {
            terminate(&mut child);
            return Err(JobError::WorkerCrash("worker pipes unavailable".into()));
        };

        let (tx, rx) = mpsc::channel();
        let io = thread::Builder::new()
            .name("grumpy-worker-io".into())
            .spawn(move || {
                let _ = tx.send(exchange(stdin, stdout, &job));
            });
        if let Err(source) = io {
            terminate(&mut child);
            return Err(JobError::WorkerSpawn {
                unit: "worker io thread".into(),
                source,
            });
        }

        let reply = rx.recv_timeout(timeout);
        terminate(&mut child);
        match reply {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(e)) => Err(JobError::WorkerCrash(format!(
                "no valid reply from {}: {e}",
                path.display()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(JobError::WorkerCrash("worker io thread panicked".into()))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, path = %path.display(), "worker process timed out, killed");
                Err(JobError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{BackendError, Dimensions, ResizeParams};
    use crate::security::JobSlots;
    use crate::test_helpers::{sample_job, tiny_png, zip_entry_names};
    use crate::types::FailureKind;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn slot() -> JobSlot {
        JobSlots::new(1).acquire().unwrap()
    }

    struct PanickingBackend;

    impl ImageBackend for PanickingBackend {
        fn identify(&self, _: &[u8]) -> Result<Dimensions, BackendError> {
            panic!("decoder exploded")
        }

        fn resize(&self, _: &[u8], _: &ResizeParams) -> Result<Vec<u8>, BackendError> {
            panic!("decoder exploded")
        }
    }

    struct SlowBackend(Duration);

    impl ImageBackend for SlowBackend {
        fn identify(&self, _: &[u8]) -> Result<Dimensions, BackendError> {
            Ok(Dimensions {
                width: 1,
                height: 1,
            })
        }

        fn resize(&self, _: &[u8], _: &ResizeParams) -> Result<Vec<u8>, BackendError> {
            thread::sleep(self.0);
            Ok(Vec::new())
        }
    }

    #[test]
    fn thread_launcher_returns_archive() {
        let launcher = ThreadLauncher::new(MockBackend::new(), Limits::default());
        let state = launcher
            .run(sample_job(tiny_png(), &[("a", 2, 2)]), TIMEOUT, slot())
            .unwrap();
        assert_eq!(zip_entry_names(state.zip_buffer().unwrap()), ["test.png", "a.png"]);
    }

    #[test]
    fn thread_launcher_passes_failures_through() {
        let launcher = ThreadLauncher::new(MockBackend::failing_on(&[(2, 2)]), Limits::default());
        let state = launcher
            .run(sample_job(tiny_png(), &[("a", 2, 2)]), TIMEOUT, slot())
            .unwrap();
        assert_eq!(state.error().unwrap().kind, FailureKind::TransformFailure);
    }

    #[test]
    fn thread_panic_is_worker_crash() {
        let launcher = ThreadLauncher::new(PanickingBackend, Limits::default());
        let err = launcher
            .run(sample_job(tiny_png(), &[("a", 2, 2)]), TIMEOUT, slot())
            .unwrap_err();
        match err {
            JobError::WorkerCrash(reason) => assert!(reason.contains("decoder exploded")),
            other => panic!("expected crash, got {other:?}"),
        }
    }

    #[test]
    fn thread_timeout_detaches() {
        let launcher = ThreadLauncher::new(SlowBackend(Duration::from_millis(500)), Limits::default());
        let err = launcher
            .run(sample_job(tiny_png(), &[("a", 2, 2)]), Duration::from_millis(20), slot())
            .unwrap_err();
        assert!(matches!(err, JobError::Timeout(_)));
    }

    #[test]
    fn timed_out_thread_keeps_its_slot_until_it_exits() {
        let slots = JobSlots::new(1);
        let launcher = ThreadLauncher::new(SlowBackend(Duration::from_millis(300)), Limits::default());
        let err = launcher
            .run(
                sample_job(tiny_png(), &[("a", 2, 2)]),
                Duration::from_millis(20),
                slots.acquire().unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, JobError::Timeout(_)));
        assert_eq!(slots.current(), 1);
        assert!(slots.acquire().is_err());

        let deadline = std::time::Instant::now() + TIMEOUT;
        while slots.current() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(slots.current(), 0);
    }

    #[test]
    fn process_launcher_releases_slot_after_reaping() {
        let slots = JobSlots::new(1);
        let tmp = tempfile::TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(vec![tmp.path().join("no-such-worker")], vec![]);
        let _ = launcher.run(
            sample_job(tiny_png(), &[("a", 2, 2)]),
            TIMEOUT,
            slots.acquire().unwrap(),
        );
        assert_eq!(slots.current(), 0);
    }

    #[test]
    fn first_existing_candidate_wins() {
        let tmp = tempfile::TempDir::new().unwrap();
        let missing = tmp.path().join("missing");
        let present = tmp.path().join("present");
        std::fs::write(&present, b"").unwrap();

        let chosen = resolve_worker_executable(&[missing.clone(), present.clone()]);
        assert_eq!(chosen, present);
    }

    #[test]
    fn falls_back_to_first_candidate() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        assert_eq!(resolve_worker_executable(&[a.clone(), b]), a);
        assert_eq!(resolve_worker_executable(&[]), PathBuf::from(WORKER_BINARY));
    }

    #[test]
    fn configured_candidate_comes_first() {
        let candidates = default_candidates(Some(Path::new("/opt/grumpy/worker")));
        assert_eq!(candidates[0], PathBuf::from("/opt/grumpy/worker"));
        assert!(candidates.len() >= 2);
    }

    #[test]
    fn host_executable_is_not_a_worker_candidate() {
        let host = Path::new("/srv/app/bin/photo-service");
        let candidates = candidates_for(None, host);
        assert!(!candidates.iter().any(|c| c == host));

        let binary = format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX);
        assert_eq!(
            candidates,
            [
                Path::new("/srv/app/bin").join(&binary),
                Path::new("/srv/app/bin/../libexec").join(&binary),
            ]
        );
    }

    #[test]
    fn worker_binary_uses_itself_first() {
        let binary = format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX);
        let exe = Path::new("/usr/local/bin").join(&binary);
        let candidates = candidates_for(None, &exe);
        assert_eq!(candidates[0], exe);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_harness_never_resolves_to_itself() {
        let exe = std::env::current_exe().unwrap();
        assert!(!default_candidates(None).contains(&exe));
    }

    #[test]
    fn missing_executable_is_spawn_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(vec![tmp.path().join("no-such-worker")], vec![]);
        let err = launcher
            .run(sample_job(tiny_png(), &[("a", 2, 2)]), TIMEOUT, slot())
            .unwrap_err();
        match err {
            JobError::WorkerSpawn { unit, .. } => assert!(unit.contains("no-such-worker")),
            other => panic!("expected spawn failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn silent_exit_is_worker_crash() {
        let launcher = ProcessLauncher::new(
            vec![PathBuf::from("/bin/sh")],
            vec!["-c".into(), "cat > /dev/null; exit 3".into()],
        );
        let err = launcher
            .run(sample_job(tiny_png(), &[("a", 2, 2)]), TIMEOUT, slot())
            .unwrap_err();
        assert!(matches!(err, JobError::WorkerCrash(_)));
    }

    #[cfg(unix)]
    #[test]
    fn hung_process_is_killed_on_timeout() {
        let launcher = ProcessLauncher::new(
            vec![PathBuf::from("/bin/sh")],
            vec!["-c".into(), "sleep 30".into()],
        );
        let started = std::time::Instant::now();
        let err = launcher
            .run(sample_job(tiny_png(), &[("a", 2, 2)]), Duration::from_millis(200), slot())
            .unwrap_err();
        assert!(matches!(err, JobError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
