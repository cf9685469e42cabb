use clap::{Parser, Subcommand};
use grumpy_image::config::{self, AppConfig, Isolation};
use grumpy_image::dispatcher::{Dispatcher, self_test_job};
use grumpy_image::imaging::{self, EncodeFormat, RustBackend};
use grumpy_image::launcher::{ProcessLauncher, ThreadLauncher, WorkerLauncher, default_candidates};
use grumpy_image::types::{DownloadState, ImageDimension, ImageDimensionsResizeJob, ImageFormat};
use grumpy_image::{naming, output, security, worker};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "grumpy-image")]
#[command(about = "Resize one image into many sizes and pack them into a ZIP")]
#[command(long_about = "\
Resize one image into many sizes and pack them into a ZIP

Every job is validated up front (file path, size, magic bytes, target
dimensions) and then transcoded in an isolated worker, by default a child
process, so a crashing decoder cannot take the caller down. At most
`limits.max_concurrent_jobs` jobs run at once; extra submissions are
rejected rather than queued.

  grumpy-image resize photo.jpg --size 1280x720 --size 640x360
  grumpy-image resize photo.jpg --fit --size 300x300 --format webp

The archive holds the source at its own size first, then each target in
the order given, named <stem>-<W>x<H>.<ext>.

Logging is controlled by GRUMPY_LOG (default: info) and goes to stderr.
Run 'grumpy-image gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file; a missing file is ignored
    #[arg(long, default_value = "grumpy-image.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ResizeArgs {
    /// Source image
    input: PathBuf,

    /// Target size as WxH; repeat for several outputs
    #[arg(long = "size", short = 's', required = true, value_parser = parse_size_arg)]
    sizes: Vec<(u32, u32)>,

    /// Treat each size as a bounding box and keep the source aspect ratio
    #[arg(long)]
    fit: bool,

    /// Output format (avif, gif, jpeg, png, tiff, webp); defaults to the source format
    #[arg(long)]
    format: Option<String>,

    /// Encoder quality, 1-100
    #[arg(long, default_value_t = 80)]
    quality: u8,

    /// Archive path [default: <stem>_resized_images.zip next to the input]
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Resize an image to one or more sizes and write a ZIP archive
    Resize(ResizeArgs),
    /// Run a 1x1 PNG through the configured worker and report the result
    SelfTest,
    /// Serve a single job over stdin/stdout (spawned by the dispatcher)
    #[command(hide = true)]
    Worker,
    /// Print a config file with all options documented
    GenConfig,
}

fn parse_size_arg(value: &str) -> Result<(u32, u32), String> {
    naming::parse_size(value).ok_or_else(|| format!("expected WxH, got '{value}'"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GRUMPY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_launcher(config: &AppConfig, config_path: &Path) -> Box<dyn WorkerLauncher> {
    match config.worker.isolation {
        Isolation::Thread => Box::new(ThreadLauncher::new(RustBackend::new(), config.limits())),
        Isolation::Process => {
            let args = vec![
                "--config".to_string(),
                config_path.to_string_lossy().into_owned(),
                "worker".to_string(),
            ];
            Box::new(ProcessLauncher::new(
                default_candidates(config.worker.executable.as_deref()),
                args,
            ))
        }
    }
}

fn build_job(args: &ResizeArgs, config: &AppConfig) -> Result<ImageDimensionsResizeJob, Box<dyn std::error::Error>> {
    let limits = config.limits();
    let detected = security::validate_file(&args.input, &limits)?;
    let bytes = std::fs::read(&args.input)?;

    let backend = RustBackend::new();
    let (width, height) = imaging::get_image_dimensions(&backend, &bytes)?;
    let sizes = if args.fit {
        imaging::get_resize_image_dimensions(&backend, &bytes, &args.sizes)?
    } else {
        args.sizes.clone()
    };

    let format = match &args.format {
        Some(name) => ImageFormat::parse(name),
        None => ImageFormat::parse(detected.extension()),
    };
    if EncodeFormat::from_image_format(&format).is_none() {
        return Err(format!("cannot encode to '{format}'").into());
    }

    let stem = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let base_name = format!("{stem}.{format}");

    let origin = ImageDimension::new(base_name.clone(), width, height, format.clone()).with_quality(args.quality);
    let dimensions = sizes
        .iter()
        .map(|&size| {
            ImageDimension::new(naming::add_size_suffix(&base_name, size), size.0, size.1, format.clone())
                .with_quality(args.quality)
        })
        .collect();

    Ok(ImageDimensionsResizeJob::new(bytes, origin, dimensions))
}

fn default_archive_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}_resized_images.zip"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Worker => {
            let config = AppConfig::load(&cli.config)?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            worker::serve(
                &mut stdin.lock(),
                &mut stdout.lock(),
                &RustBackend::new(),
                &config.limits(),
            )?;
        }
        Command::SelfTest => {
            let config = AppConfig::load(&cli.config)?;
            let dispatcher = Dispatcher::new(
                build_launcher(&config, &cli.config),
                config.limits(),
                config.timeout(),
            );
            info!(isolation = ?config.worker.isolation, "running self-test");
            let started = Instant::now();
            let state = dispatcher.submit(self_test_job());
            output::print_self_test(&state, started.elapsed());
            if !state.is_success() {
                std::process::exit(1);
            }
        }
        Command::Resize(args) => {
            let config = AppConfig::load(&cli.config)?;
            let job = build_job(&args, &config)?;
            let source_name = args
                .input
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            output::print_job_request(&source_name, &job);

            let dispatcher = Dispatcher::new(
                build_launcher(&config, &cli.config),
                config.limits(),
                config.timeout(),
            );
            match dispatcher.submit(job) {
                DownloadState::Success { zip_buffer } => {
                    let archive_path = args
                        .output
                        .clone()
                        .unwrap_or_else(|| default_archive_path(&args.input));
                    std::fs::write(&archive_path, &zip_buffer)?;
                    println!();
                    output::print_archive(&archive_path.display().to_string(), &zip_buffer);
                }
                DownloadState::Failure(failure) => {
                    for line in output::format_failure(&failure) {
                        eprintln!("{}", line);
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
