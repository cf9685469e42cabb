//! End-to-end jobs through the dispatcher with both isolation units.
//!
//! The process cases spawn the real `grumpy-image worker` binary built for
//! this test run.

use grumpy_image::dispatcher::{Dispatcher, JobError, self_test_job};
use grumpy_image::imaging::RustBackend;
use grumpy_image::launcher::{ProcessLauncher, ThreadLauncher, WorkerLauncher};
use grumpy_image::security::Limits;
use grumpy_image::types::{DownloadState, ImageDimension, ImageDimensionsResizeJob, ImageFormat};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(15);

fn worker_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_grumpy-image"))
}

fn process_launcher() -> Box<dyn WorkerLauncher> {
    Box::new(ProcessLauncher::new(
        vec![worker_binary()],
        vec!["worker".to_string()],
    ))
}

fn thread_launcher() -> Box<dyn WorkerLauncher> {
    Box::new(ThreadLauncher::new(RustBackend::new(), Limits::default()))
}

fn dispatcher(launcher: Box<dyn WorkerLauncher>) -> Dispatcher {
    Dispatcher::new(launcher, Limits::default(), TIMEOUT)
}

fn entry_names(zip: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn entry_size(zip: &[u8], name: &str) -> (u32, u32) {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip)).unwrap();
    let mut bytes = Vec::new();
    archive.by_name(name).unwrap().read_to_end(&mut bytes).unwrap();
    let img = image::load_from_memory(&bytes).unwrap();
    (img.width(), img.height())
}

fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128])
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn png_dim(name: &str, width: u32, height: u32) -> ImageDimension {
    ImageDimension::new(name, width, height, ImageFormat::Png)
}

// =========================================================================
// 1x1 PNG scenario
// =========================================================================

fn assert_self_test_archive(state: DownloadState) {
    let zip = state.zip_buffer().expect("job should succeed").to_vec();
    assert!(!zip.is_empty());
    assert_eq!(entry_names(&zip), ["test.png", "test_resized.png"]);
    assert_eq!(entry_size(&zip, "test.png"), (1, 1));
    assert_eq!(entry_size(&zip, "test_resized.png"), (2, 2));
}

#[test]
fn self_test_job_through_thread_launcher() {
    assert_self_test_archive(dispatcher(thread_launcher()).submit(self_test_job()));
}

#[test]
fn self_test_job_through_worker_process() {
    assert_self_test_archive(dispatcher(process_launcher()).submit(self_test_job()));
}

// =========================================================================
// Larger jobs
// =========================================================================

#[test]
fn archive_preserves_requested_order_across_process_boundary() {
    let job = ImageDimensionsResizeJob::new(
        gradient_png(64, 48),
        png_dim("photo", 64, 48),
        vec![
            png_dim("photo-32x24", 32, 24),
            ImageDimension::new("photo-16x12", 16, 12, ImageFormat::Jpeg),
            png_dim("photo-8x6", 8, 6),
        ],
    );
    let zip = dispatcher(process_launcher()).submit_job(job).unwrap();
    assert_eq!(
        entry_names(&zip),
        ["photo.png", "photo-32x24.png", "photo-16x12.jpeg", "photo-8x6.png"]
    );
    assert_eq!(entry_size(&zip, "photo-16x12.jpeg"), (16, 12));
}

#[test]
fn transform_failure_discards_earlier_outputs() {
    for launcher in [thread_launcher(), process_launcher()] {
        let job = ImageDimensionsResizeJob::new(
            gradient_png(8, 8),
            png_dim("origin", 8, 8),
            vec![
                png_dim("first", 4, 4),
                ImageDimension::new("broken", 4, 4, ImageFormat::parse("heic")),
                png_dim("last", 2, 2),
            ],
        );
        let state = dispatcher(launcher).submit(job);
        assert!(state.zip_buffer().is_none());
        let failure = state.error().unwrap();
        assert_eq!(failure.kind.code(), "transform_failure");
        assert!(failure.message.contains("broken"), "{}", failure.message);
    }
}

// =========================================================================
// Failures before and around the worker
// =========================================================================

#[test]
fn invalid_dimensions_rejected_without_spawning() {
    let missing = Box::new(ProcessLauncher::new(
        vec![PathBuf::from("/nonexistent/grumpy-image")],
        vec!["worker".to_string()],
    ));
    let too_many: Vec<ImageDimension> = (0..21).map(|i| png_dim(&format!("d{i}"), 2, 2)).collect();
    let job = ImageDimensionsResizeJob::new(gradient_png(4, 4), png_dim("o", 4, 4), too_many);

    let err = dispatcher(missing).submit_job(job).unwrap_err();
    assert!(matches!(err, JobError::InvalidDimensions(_)), "{err}");
}

#[test]
fn missing_worker_binary_reports_spawn_failure() {
    let missing = Box::new(ProcessLauncher::new(
        vec![PathBuf::from("/nonexistent/grumpy-image")],
        vec!["worker".to_string()],
    ));
    let dispatcher = dispatcher(missing);
    let err = dispatcher.submit_job(self_test_job()).unwrap_err();
    assert_eq!(err.code(), "worker_spawn_failure");
    assert_eq!(dispatcher.slots().current(), 0);
}

#[test]
fn corrupt_image_is_a_transform_failure_not_a_crash() {
    let mut bytes = gradient_png(4, 4);
    bytes.truncate(30);
    let job = ImageDimensionsResizeJob::new(bytes, png_dim("o", 4, 4), vec![png_dim("s", 2, 2)]);
    let err = dispatcher(process_launcher()).submit_job(job).unwrap_err();
    assert!(matches!(err, JobError::Transform(_)), "{err}");
}
