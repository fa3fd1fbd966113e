use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::chrome::{ChromeSession, ClipRect};
use crate::error::{SandtraceError, SandtraceResult};
use crate::gaps;

/// Timing and retry policy for the frame capture loop.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Output frames per second.
    pub fps: u32,
    /// Animation duration in seconds.
    pub duration_secs: f64,
    /// Delay after a seek before the screenshot, letting the page repaint.
    pub settle: Duration,
    /// Hard bound on one capture attempt (seek + settle + screenshot).
    pub attempt_timeout: Duration,
    /// Attempts per frame before the frame is abandoned as a gap.
    pub max_attempts: u32,
    /// Base delay for linear retry backoff (`attempt * retry_delay`).
    pub retry_delay: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 15,
            duration_secs: 10.0,
            settle: Duration::from_millis(30),
            attempt_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> SandtraceResult<()> {
        if self.fps == 0 {
            return Err(SandtraceError::validation("capture fps must be non-zero"));
        }
        if !(self.duration_secs > 0.0) || !self.duration_secs.is_finite() {
            return Err(SandtraceError::validation(
                "capture duration must be a positive number of seconds",
            ));
        }
        if self.max_attempts == 0 {
            return Err(SandtraceError::validation(
                "capture max_attempts must be at least 1",
            ));
        }
        Ok(())
    }

    /// Number of frames in the capture plan, at least 1.
    pub fn total_frames(&self) -> u32 {
        (self.duration_secs * f64::from(self.fps)).round().max(1.0) as u32
    }

    /// Animation time sampled by frame `idx`.
    pub fn frame_time(&self, idx: u32) -> f64 {
        f64::from(idx) / f64::from(self.fps)
    }
}

/// Outcome of a capture run. `missing` holds indices whose retries were
/// exhausted; the gap filler repairs them afterwards.
#[derive(Clone, Debug, Default)]
pub struct CaptureStats {
    pub captured: u32,
    pub missing: Vec<u32>,
}

/// Capture the whole frame sequence into `frames_dir`.
///
/// Frames are captured sequentially against a single page. A frame whose
/// attempts are all exhausted is logged and left as a gap; only session-level
/// validation errors abort the run.
#[tracing::instrument(skip(session, cfg, clip), fields(total = cfg.total_frames()))]
pub fn capture_sequence(
    session: &mut ChromeSession,
    cfg: &CaptureConfig,
    clip: &ClipRect,
    frames_dir: &Path,
) -> SandtraceResult<CaptureStats> {
    cfg.validate()?;

    let total = cfg.total_frames();
    let mut stats = CaptureStats::default();

    for idx in 0..total {
        let t = cfg.frame_time(idx);
        let path = gaps::frame_path(frames_dir, idx);

        let mut succeeded = false;
        for attempt in 1..=cfg.max_attempts {
            match capture_one(session, cfg, clip, t, &path) {
                Ok(()) => {
                    succeeded = true;
                    break;
                }
                Err(e) => {
                    warn!(frame = idx, attempt, %e, "frame capture attempt failed");
                    if attempt < cfg.max_attempts {
                        std::thread::sleep(backoff_delay(attempt, cfg.retry_delay));
                    }
                }
            }
        }

        if succeeded {
            stats.captured += 1;
        } else {
            error!(
                frame = idx,
                attempts = cfg.max_attempts,
                "frame abandoned after exhausting retries"
            );
            stats.missing.push(idx);
        }
    }

    info!(
        captured = stats.captured,
        missing = stats.missing.len(),
        "capture loop finished"
    );
    Ok(stats)
}

/// Capture a single still at time `t` directly to `out_path`. Used for the
/// static PNG preview of the fully drawn trajectory.
pub fn capture_still(
    session: &mut ChromeSession,
    cfg: &CaptureConfig,
    clip: &ClipRect,
    t: f64,
    out_path: &Path,
) -> SandtraceResult<()> {
    capture_one(session, cfg, clip, t, out_path)
}

fn capture_one(
    session: &mut ChromeSession,
    cfg: &CaptureConfig,
    clip: &ClipRect,
    t: f64,
    out_path: &Path,
) -> SandtraceResult<()> {
    let deadline = Instant::now() + cfg.attempt_timeout;

    session.evaluate(&format!("seekTo({t:.4})"), deadline)?;
    std::thread::sleep(cfg.settle);

    let png = session.capture_screenshot(clip, deadline)?;
    // A truncated screenshot must fail the attempt, not become a frame file.
    image::load_from_memory(&png)
        .map_err(|e| SandtraceError::capture(format!("screenshot at t={t:.3}s not a valid image: {e}")))?;

    std::fs::write(out_path, &png).map_err(|e| {
        SandtraceError::capture(format!("write frame '{}': {e}", out_path.display()))
    })?;
    debug!(t, path = %out_path.display(), "frame written");
    Ok(())
}

/// Linear backoff: `attempt * base`.
fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    base * attempt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_frames_rounds_duration_times_fps() {
        let cfg = CaptureConfig {
            fps: 15,
            duration_secs: 10.0,
            ..CaptureConfig::default()
        };
        assert_eq!(cfg.total_frames(), 150);

        let cfg = CaptureConfig {
            fps: 30,
            duration_secs: 0.9833,
            ..CaptureConfig::default()
        };
        assert_eq!(cfg.total_frames(), 29);
    }

    #[test]
    fn total_frames_never_zero() {
        let cfg = CaptureConfig {
            fps: 1,
            duration_secs: 0.01,
            ..CaptureConfig::default()
        };
        assert_eq!(cfg.total_frames(), 1);
    }

    #[test]
    fn frame_time_is_index_over_fps() {
        let cfg = CaptureConfig {
            fps: 20,
            ..CaptureConfig::default()
        };
        assert!((cfg.frame_time(0) - 0.0).abs() < 1e-12);
        assert!((cfg.frame_time(10) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn backoff_grows_linearly() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff_delay(1, base), Duration::from_millis(250));
        assert_eq!(backoff_delay(3, base), Duration::from_millis(750));
    }

    #[test]
    fn validate_rejects_bad_configs() {
        let mut cfg = CaptureConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.fps = 0;
        assert!(cfg.validate().is_err());

        cfg = CaptureConfig {
            duration_secs: f64::NAN,
            ..CaptureConfig::default()
        };
        assert!(cfg.validate().is_err());

        cfg = CaptureConfig {
            max_attempts: 0,
            ..CaptureConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
