use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

use sandtrace::error::SandtraceError;
use sandtrace::pipeline::{self, ExportOpts, ExportOutcome};
use sandtrace::{CaptureConfig, chrome, encode};

#[derive(Parser, Debug)]
#[command(
    name = "sandtrace",
    version,
    about = "Convert .thr trajectory files into animated HTML, looping GIFs, and PNG previews"
)]
struct Cli {
    /// Input .thr files, or folders containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output HTML path (only honored for a single input).
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Output GIF path (only honored for a single input).
    #[arg(short = 'g', long = "gif")]
    gif: Option<PathBuf>,

    /// Animation duration in seconds.
    #[arg(short = 'd', long, default_value_t = 10.0)]
    duration: f64,

    /// Stage size in pixels (the drawing is size x size).
    #[arg(long, default_value_t = 1000)]
    size: u32,

    /// Capture and playback frame rate.
    #[arg(long, default_value_t = 15)]
    fps: u32,

    /// Write only the HTML animation page, skip GIF and PNG export.
    #[arg(long)]
    no_gif: bool,

    /// Re-export files whose outputs already exist.
    #[arg(long)]
    force: bool,

    /// Chromium binary to launch instead of probing PATH.
    #[arg(long)]
    chrome_binary: Option<PathBuf>,

    /// Delay after each seek before the screenshot, in milliseconds.
    #[arg(long, default_value_t = 30)]
    settle_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = setup_logging();

    let inputs = expand_inputs(&cli.inputs);
    if inputs.is_empty() {
        anyhow::bail!("no .thr files found in the given inputs");
    }

    if !cli.no_gif {
        if !encode::is_ffmpeg_on_path() {
            anyhow::bail!("ffmpeg not found on PATH; install it or pass --no-gif");
        }
        if cli.chrome_binary.is_none() && chrome::find_chromium().is_none() {
            anyhow::bail!(
                "no Chromium binary found on PATH; install one or pass --chrome-binary"
            );
        }
    }

    let single = inputs.len() == 1;
    if !single && (cli.output.is_some() || cli.gif.is_some()) {
        warn!("-o/-g apply only when a single input resolves; ignoring overrides");
    }

    let opts = ExportOpts {
        capture: CaptureConfig {
            fps: cli.fps,
            duration_secs: cli.duration,
            settle: Duration::from_millis(cli.settle_ms),
            ..CaptureConfig::default()
        },
        size: cli.size,
        gif: !cli.no_gif,
        force: cli.force,
        chrome_binary: cli.chrome_binary.clone(),
        html_out: cli.output.filter(|_| single),
        gif_out: cli.gif.filter(|_| single),
    };

    let total = inputs.len();
    let mut processed = 0u32;
    let mut skipped = 0u32;
    let mut failed = 0u32;

    for (i, thr_path) in inputs.iter().enumerate() {
        info!(
            input = %thr_path.display(),
            progress = %format!("{}/{}", i + 1, total),
            "processing"
        );
        match pipeline::export_file(thr_path, &opts) {
            Ok(ExportOutcome::Exported | ExportOutcome::HtmlOnly) => processed += 1,
            Ok(ExportOutcome::Skipped) => skipped += 1,
            // Encoder failures are fatal to the whole run.
            Err(e @ SandtraceError::Encode(_)) => return Err(e.into()),
            Err(e) => {
                error!(input = %thr_path.display(), %e, "export failed");
                failed += 1;
            }
        }
    }

    info!(processed, skipped, failed, "batch finished");
    if processed == 0 && skipped == 0 {
        anyhow::bail!("all {failed} input(s) failed");
    }
    Ok(())
}

/// Expand folder arguments into the `.thr` files directly inside them.
fn expand_inputs(args: &[PathBuf]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    for arg in args {
        if arg.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(arg)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| p.is_file() && has_thr_extension(p))
                        .collect()
                })
                .unwrap_or_default();
            found.sort();
            if found.is_empty() {
                warn!(path = %arg.display(), "no .thr files in folder");
            }
            inputs.extend(found);
        } else if arg.is_file() && has_thr_extension(arg) {
            inputs.push(arg.clone());
        } else {
            warn!(path = %arg.display(), "skipping unrecognized input");
        }
    }
    inputs
}

fn has_thr_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("thr"))
}

/// Install the tracing subscriber: stderr layer plus a best-effort daily
/// rolling file layer under `logs/`. Falls back to stderr-only when the log
/// directory is unwritable.
fn setup_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = || {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(true)
    };

    let appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("sandtrace")
        .filename_suffix("log")
        .build("logs");

    match appender {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer())
                .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false))
                .try_init();
            Some(guard)
        }
        Err(e) => {
            let _ = tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer())
                .try_init();
            warn!("file logging unavailable ({e}), logging to stderr only");
            None
        }
    }
}
