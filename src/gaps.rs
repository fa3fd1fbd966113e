use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{SandtraceError, SandtraceResult};

/// Blank frame synthesized when a gap has no captured neighbor at all.
#[derive(Clone, Copy, Debug)]
pub struct BlankFrame {
    pub width: u32,
    pub height: u32,
    /// Fill color, normally the page background.
    pub rgba: [u8; 4],
}

impl BlankFrame {
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: [0, 0, 0, 255],
        }
    }
}

/// What the filler did to the sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GapFillReport {
    pub copied: u32,
    pub synthesized: u32,
}

impl GapFillReport {
    pub fn repaired(&self) -> u32 {
        self.copied + self.synthesized
    }
}

/// File name for frame `idx`: `frame_0000.png`, `frame_0001.png`, ...
pub fn frame_file_name(idx: u32) -> String {
    format!("frame_{idx:04}.png")
}

/// ffmpeg-style input pattern matching [`frame_file_name`].
pub const FRAME_PATTERN: &str = "frame_%04d.png";

pub fn frame_path(dir: &Path, idx: u32) -> PathBuf {
    dir.join(frame_file_name(idx))
}

/// Repair missing frame files so every index in `[0, total)` has one.
///
/// A missing index copies the nearest earlier originally captured frame,
/// falling back to the nearest later one, and synthesizes a blank frame when
/// the directory holds no captures at all. Copy sources are the frames that
/// existed on entry, so the result does not depend on scan order.
pub fn fill_frame_gaps(
    dir: &Path,
    total: u32,
    blank: BlankFrame,
) -> SandtraceResult<GapFillReport> {
    let present: Vec<bool> = (0..total).map(|i| frame_path(dir, i).exists()).collect();
    let mut report = GapFillReport::default();

    for idx in 0..total {
        if present[idx as usize] {
            continue;
        }

        let source = nearest_present(&present, idx);
        let dst = frame_path(dir, idx);
        match source {
            Some(src_idx) => {
                let src = frame_path(dir, src_idx);
                std::fs::copy(&src, &dst).map_err(|e| {
                    SandtraceError::capture(format!(
                        "patch frame {idx} from frame {src_idx}: {e}"
                    ))
                })?;
                warn!(frame = idx, source = src_idx, "patched gap by duplication");
                report.copied += 1;
            }
            None => {
                write_blank_frame(&dst, blank)?;
                warn!(frame = idx, "patched gap with blank frame");
                report.synthesized += 1;
            }
        }
    }

    if report.repaired() > 0 {
        info!(
            copied = report.copied,
            synthesized = report.synthesized,
            total,
            "frame sequence repaired"
        );
    }
    Ok(report)
}

/// Nearest originally present index: earlier wins, later is the fallback.
fn nearest_present(present: &[bool], idx: u32) -> Option<u32> {
    let idx = idx as usize;
    present[..idx]
        .iter()
        .rposition(|&p| p)
        .or_else(|| {
            present[idx + 1..]
                .iter()
                .position(|&p| p)
                .map(|offset| idx + 1 + offset)
        })
        .map(|i| i as u32)
}

fn write_blank_frame(path: &Path, blank: BlankFrame) -> SandtraceResult<()> {
    let img = image::RgbaImage::from_pixel(blank.width, blank.height, image::Rgba(blank.rgba));
    img.save(path).map_err(|e| {
        SandtraceError::capture(format!("write blank frame '{}': {e}", path.display()))
    })?;
    Ok(())
}
