//! # Grumpy Image
//!
//! Turns one source image into a set of resized variants and returns them as
//! a single ZIP archive. A UI collaborator describes the outputs it wants
//! (an origin plus an ordered list of target dimensions), the core validates
//! the request, runs the transcoding in an isolated worker and hands back
//! exactly one result.
//!
//! # Job Flow
//!
//! ```text
//! DimensionStore ──► ImageDimensionsResizeJob ──► Dispatcher
//!                                                   │  acquire slot
//!                                                   │  validate job
//!                                                   ▼
//!                                   WorkerLauncher (thread | process)
//!                                                   │  decode, resize, encode
//!                                                   │  [origin, ...dimensions]
//!                                                   ▼
//!                                   DownloadState::Success { zip_buffer }
//!                                 | DownloadState::Failure(JobFailure)
//! ```
//!
//! Admission is a bounded counter, not a queue: the job past
//! `max_concurrent_jobs` is rejected immediately. Any transform error aborts
//! the whole job; no partial archive is returned.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`security`] | Input validation: buffers, dimensions, filenames, file paths, magic bytes, job slots |
//! | [`imaging`] | Backend trait and pure-Rust implementation: identify, resize, encode |
//! | [`worker`] | Runs one job: validate, render every target, assemble the archive |
//! | [`protocol`] | Binary job and reply frames for the process boundary |
//! | [`launcher`] | Isolation units (thread or child process) and worker executable lookup |
//! | [`dispatcher`] | Admission control, pre-spawn validation, timeouts, error folding |
//! | [`store`] | Dimension store with origin broadcast and observer channels |
//! | [`types`] | Shared types crossing the isolation boundary |
//! | [`naming`] | Size-suffix and filename helpers |
//! | [`config`] | Environment + TOML configuration |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Limits Are Values, Not Globals
//!
//! Every validator takes a [`security::Limits`] by reference and every
//! dispatcher owns its own [`security::JobSlots`]. Tests build independent
//! instances with tiny limits instead of mutating process-wide state.
//!
//! ## Raw Bytes Across the Boundary
//!
//! The source image crosses into the worker as raw bytes behind a small JSON
//! header (see [`protocol`]), never re-encoded. The reply is a tagged
//! [`types::DownloadState`], so "archive or error, never both" is a type.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling and encoding use the `image` crate only; no system
//! libraries are needed to run a worker.

pub mod config;
pub mod dispatcher;
pub mod imaging;
pub mod launcher;
pub mod naming;
pub mod output;
pub mod protocol;
pub mod security;
pub mod store;
pub mod types;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;
