use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{SandtraceError, SandtraceResult};
use crate::gaps::FRAME_PATTERN;

/// Options for GIF assembly from a numbered frame sequence.
#[derive(Clone, Debug)]
pub struct GifEncodeConfig {
    /// Output GIF path.
    pub out_path: PathBuf,
    /// Playback frame rate.
    pub fps: u32,
    /// Output width in pixels; height follows the frame aspect ratio.
    pub width: u32,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
}

impl GifEncodeConfig {
    pub fn validate(&self) -> SandtraceResult<()> {
        if self.fps == 0 {
            return Err(SandtraceError::validation("gif fps must be non-zero"));
        }
        if self.width == 0 {
            return Err(SandtraceError::validation("gif width must be non-zero"));
        }
        Ok(())
    }
}

/// Encode the frames in `frames_dir` into a looping, palette-optimized GIF.
///
/// Two passes over the same frame stream: `palettegen` derives one shared
/// palette, `paletteuse` applies it during assembly. Both passes scale with
/// Lanczos so the palette is computed over the pixels actually emitted. The
/// transient palette PNG lives in `frames_dir` and is removed with it.
///
/// Encoder failures are fatal to the export: a non-zero ffmpeg exit becomes
/// an error carrying the captured stderr.
pub fn encode_gif(frames_dir: &Path, cfg: &GifEncodeConfig) -> SandtraceResult<()> {
    cfg.validate()?;
    ensure_parent_dir(&cfg.out_path)?;

    if !cfg.overwrite && cfg.out_path.exists() {
        return Err(SandtraceError::validation(format!(
            "output file '{}' already exists",
            cfg.out_path.display()
        )));
    }

    if !is_ffmpeg_on_path() {
        return Err(SandtraceError::encode(
            "ffmpeg is required for GIF encoding, but was not found on PATH",
        ));
    }

    let palette_path = frames_dir.join("palette.png");

    run_ffmpeg(&palette_args(frames_dir, cfg, &palette_path))?;
    debug!(palette = %palette_path.display(), "palette pass complete");

    run_ffmpeg(&assemble_args(frames_dir, cfg, &palette_path))?;
    info!(gif = %cfg.out_path.display(), "gif assembled");
    Ok(())
}

fn palette_args(frames_dir: &Path, cfg: &GifEncodeConfig, palette_path: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-framerate".into(),
        cfg.fps.to_string(),
        "-start_number".into(),
        "0".into(),
        "-i".into(),
        frames_dir.join(FRAME_PATTERN).display().to_string(),
        "-vf".into(),
        format!(
            "scale={}:-1:flags=lanczos,palettegen=stats_mode=diff",
            cfg.width
        ),
        palette_path.display().to_string(),
    ]
}

fn assemble_args(frames_dir: &Path, cfg: &GifEncodeConfig, palette_path: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-framerate".into(),
        cfg.fps.to_string(),
        "-start_number".into(),
        "0".into(),
        "-i".into(),
        frames_dir.join(FRAME_PATTERN).display().to_string(),
        "-i".into(),
        palette_path.display().to_string(),
        "-lavfi".into(),
        format!(
            "scale={}:-1:flags=lanczos[s];[s][1:v]paletteuse=dither=bayer:bayer_scale=5:diff_mode=rectangle",
            cfg.width
        ),
        "-loop".into(),
        "0".into(),
        cfg.out_path.display().to_string(),
    ]
}

fn run_ffmpeg(args: &[String]) -> SandtraceResult<()> {
    let output = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            SandtraceError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SandtraceError::encode(format!(
            "ffmpeg exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SandtraceResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> GifEncodeConfig {
        GifEncodeConfig {
            out_path: PathBuf::from("out/anim.gif"),
            fps: 15,
            width: 1000,
            overwrite: true,
        }
    }

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(test_cfg().validate().is_ok());
        assert!(
            GifEncodeConfig {
                fps: 0,
                ..test_cfg()
            }
            .validate()
            .is_err()
        );
        assert!(
            GifEncodeConfig {
                width: 0,
                ..test_cfg()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn palette_pass_generates_into_frames_dir() {
        let dir = PathBuf::from("/tmp/frames");
        let args = palette_args(&dir, &test_cfg(), &dir.join("palette.png"));
        let joined = args.join(" ");
        assert!(joined.contains("palettegen"));
        assert!(joined.contains("frame_%04d.png"));
        assert!(joined.ends_with("palette.png"));
    }

    #[test]
    fn assembly_pass_applies_palette_and_loops() {
        let dir = PathBuf::from("/tmp/frames");
        let cfg = test_cfg();
        let args = assemble_args(&dir, &cfg, &dir.join("palette.png"));
        let joined = args.join(" ");
        assert!(joined.contains("paletteuse"));
        assert!(joined.contains("-loop 0"));
        assert!(joined.contains("scale=1000:-1"));
        assert!(joined.ends_with("anim.gif"));
    }
}
