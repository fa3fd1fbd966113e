use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::capture::{self, CaptureConfig};
use crate::chrome::{ChromeConfig, ChromeSession};
use crate::encode::{self, GifEncodeConfig};
use crate::error::{SandtraceError, SandtraceResult};
use crate::gaps::{self, BlankFrame};
use crate::page::{self, AnimationPage};
use crate::thr::TrackPath;

/// Extra window height reserved for the player controls under the stage.
const CONTROLS_MARGIN: u32 = 140;

/// How long to wait for the animated path element after navigation.
const PAGE_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything one export run needs to know.
#[derive(Clone, Debug)]
pub struct ExportOpts {
    pub capture: CaptureConfig,
    /// Stage size in pixels (the SVG is `size`×`size`).
    pub size: u32,
    /// Assemble the GIF and PNG preview; `false` stops after the HTML page.
    pub gif: bool,
    /// Re-export even when all outputs already exist.
    pub force: bool,
    /// Explicit browser binary override.
    pub chrome_binary: Option<PathBuf>,
    /// Override for the HTML output path.
    pub html_out: Option<PathBuf>,
    /// Override for the GIF output path (the PNG preview follows it).
    pub gif_out: Option<PathBuf>,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            size: 1000,
            gif: true,
            force: false,
            chrome_binary: None,
            html_out: None,
            gif_out: None,
        }
    }
}

impl ExportOpts {
    pub fn validate(&self) -> SandtraceResult<()> {
        if self.size == 0 {
            return Err(SandtraceError::validation("stage size must be non-zero"));
        }
        self.capture.validate()
    }
}

/// Output artifact locations for one `.thr` input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportPaths {
    pub html: PathBuf,
    pub gif: PathBuf,
    pub png: PathBuf,
}

impl ExportPaths {
    /// Default layout: `<parent>/<stem>/<stem>.{html,gif,png}`, with the
    /// HTML and GIF locations individually overridable. The PNG preview
    /// sits next to the GIF.
    pub fn resolve(thr_path: &Path, opts: &ExportOpts) -> SandtraceResult<Self> {
        let stem = thr_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                SandtraceError::validation(format!(
                    "cannot derive an output name from '{}'",
                    thr_path.display()
                ))
            })?;
        let out_dir = thr_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(stem);

        let html = opts
            .html_out
            .clone()
            .unwrap_or_else(|| out_dir.join(format!("{stem}.html")));
        let gif = opts
            .gif_out
            .clone()
            .unwrap_or_else(|| out_dir.join(format!("{stem}.gif")));
        let png = gif.with_extension("png");

        Ok(Self { html, gif, png })
    }

    fn all_exist(&self) -> bool {
        self.html.exists() && self.gif.exists() && self.png.exists()
    }
}

/// What an export run did for one input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// All requested artifacts were produced.
    Exported,
    /// GIF export disabled; only the HTML page was written.
    HtmlOnly,
    /// All outputs already existed and `force` was off.
    Skipped,
}

/// Run the full export pipeline for one `.thr` file.
#[tracing::instrument(skip_all, fields(input = %thr_path.display()))]
pub fn export_file(thr_path: &Path, opts: &ExportOpts) -> SandtraceResult<ExportOutcome> {
    opts.validate()?;
    let paths = ExportPaths::resolve(thr_path, opts)?;

    if opts.gif && !opts.force && paths.all_exist() {
        info!(gif = %paths.gif.display(), "outputs exist, skipping");
        return Ok(ExportOutcome::Skipped);
    }

    let track = TrackPath::from_path(thr_path)?;
    let page = AnimationPage::build(&track, opts.size, opts.capture.duration_secs)?;
    page.write(&paths.html)?;
    info!(html = %paths.html.display(), points = track.len(), "animation page written");

    if !opts.gif {
        return Ok(ExportOutcome::HtmlOnly);
    }

    render_outputs(&paths, opts)?;
    info!(gif = %paths.gif.display(), png = %paths.png.display(), "export complete");
    Ok(ExportOutcome::Exported)
}

/// Drive the browser over the written HTML page and assemble GIF + preview.
fn render_outputs(paths: &ExportPaths, opts: &ExportOpts) -> SandtraceResult<()> {
    use anyhow::Context as _;

    let chrome_cfg = ChromeConfig {
        binary: opts.chrome_binary.clone(),
        window_width: opts.size,
        window_height: opts.size + CONTROLS_MARGIN,
        ..ChromeConfig::default()
    };

    let html_abs = paths
        .html
        .canonicalize()
        .with_context(|| format!("resolve animation page '{}'", paths.html.display()))?;
    let url = format!("file://{}", html_abs.display());

    let mut session = ChromeSession::launch(&chrome_cfg, &url)?;
    session.wait_for_element(page::ANIMATED_PATH_ID, PAGE_READY_TIMEOUT)?;

    let clip = session.element_clip(
        page::STAGE_ID,
        Instant::now() + opts.capture.attempt_timeout,
    )?;
    debug!(?clip, "stage clip resolved");

    let out_dir = paths.html.parent().unwrap_or_else(|| Path::new("."));
    // Frame files and the palette artifact live here; the directory is
    // removed on every exit path, success or failure.
    let frames_dir = tempfile::Builder::new()
        .prefix("frames-")
        .tempdir_in(out_dir)
        .context("create frame directory")?;

    let stats = capture::capture_sequence(&mut session, &opts.capture, &clip, frames_dir.path())?;

    let (clip_w, clip_h) = clip.pixel_size();
    gaps::fill_frame_gaps(
        frames_dir.path(),
        opts.capture.total_frames(),
        BlankFrame::black(clip_w, clip_h),
    )?;

    capture::capture_still(
        &mut session,
        &opts.capture,
        &clip,
        opts.capture.duration_secs,
        &paths.png,
    )?;
    debug!(captured = stats.captured, png = %paths.png.display(), "preview captured");

    encode::encode_gif(
        frames_dir.path(),
        &GifEncodeConfig {
            out_path: paths.gif.clone(),
            fps: opts.capture.fps,
            width: opts.size,
            overwrite: true,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_nests_outputs_under_stem() {
        let opts = ExportOpts::default();
        let paths = ExportPaths::resolve(Path::new("designs/spiral.thr"), &opts).unwrap();
        assert_eq!(paths.html, PathBuf::from("designs/spiral/spiral.html"));
        assert_eq!(paths.gif, PathBuf::from("designs/spiral/spiral.gif"));
        assert_eq!(paths.png, PathBuf::from("designs/spiral/spiral.png"));
    }

    #[test]
    fn overrides_replace_defaults_and_png_follows_gif() {
        let opts = ExportOpts {
            html_out: Some(PathBuf::from("custom/page.html")),
            gif_out: Some(PathBuf::from("custom/anim.gif")),
            ..ExportOpts::default()
        };
        let paths = ExportPaths::resolve(Path::new("spiral.thr"), &opts).unwrap();
        assert_eq!(paths.html, PathBuf::from("custom/page.html"));
        assert_eq!(paths.gif, PathBuf::from("custom/anim.gif"));
        assert_eq!(paths.png, PathBuf::from("custom/anim.png"));
    }

    #[test]
    fn bare_stem_input_resolves_relative_to_cwd() {
        let opts = ExportOpts::default();
        let paths = ExportPaths::resolve(Path::new("spiral.thr"), &opts).unwrap();
        assert_eq!(paths.html, PathBuf::from("spiral/spiral.html"));
    }

    #[test]
    fn opts_validation_rejects_zero_size() {
        let opts = ExportOpts {
            size: 0,
            ..ExportOpts::default()
        };
        assert!(opts.validate().is_err());
    }
}
