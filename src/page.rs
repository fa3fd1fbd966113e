use std::fmt::Write as _;
use std::path::Path;

use kurbo::Point;

use crate::error::{SandtraceError, SandtraceResult};
use crate::thr::TrackPath;

/// DOM id of the `<svg>` element; the capturer clips screenshots to its
/// bounding box.
pub const STAGE_ID: &str = "stage";

/// DOM id of the animated overlay path; the capturer waits for it before the
/// first seek.
pub const ANIMATED_PATH_ID: &str = "animatedPath";

/// A generated, self-contained animation page.
///
/// The page draws the full trajectory as a faint underlay and animates a
/// white overlay on top of it via `stroke-dasharray`/`stroke-dashoffset`.
/// It exposes a global `seekTo(t)` function (seconds, clamped to
/// `[0, duration]`) which is the seek hook used during capture, and doubles
/// as an interactive player when opened in a normal browser.
#[derive(Clone, Debug)]
pub struct AnimationPage {
    pub html: String,
    pub path_length: f64,
    pub duration_secs: f64,
    pub size: u32,
}

impl AnimationPage {
    pub fn build(track: &TrackPath, size: u32, duration_secs: f64) -> SandtraceResult<Self> {
        track.validate()?;
        if size == 0 {
            return Err(SandtraceError::validation("page size must be non-zero"));
        }
        if !(duration_secs > 0.0) || !duration_secs.is_finite() {
            return Err(SandtraceError::validation(
                "animation duration must be a positive number of seconds",
            ));
        }

        let points = project_points(track, size);
        let path_data = svg_path_data(&points);
        let path_length = polyline_length(&points);

        let html = PAGE_TEMPLATE
            .replace("__SIZE__", &size.to_string())
            .replace("__PATH_DATA__", &path_data)
            .replace("__PATH_LENGTH__", &format!("{path_length:.2}"))
            .replace("__DURATION__", &format!("{duration_secs}"));

        Ok(Self {
            html,
            path_length,
            duration_secs,
            size,
        })
    }

    pub fn write(&self, path: &Path) -> SandtraceResult<()> {
        use anyhow::Context as _;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output directory '{}'", parent.display()))?;
        }
        std::fs::write(path, &self.html)
            .with_context(|| format!("write animation page '{}'", path.display()))?;
        Ok(())
    }
}

/// Map unit-space track points into SVG viewport pixels.
///
/// `px = c + x·c`, `py = c − y·c` with `c = size/2`, so the table center
/// lands mid-viewport and y points up.
fn project_points(track: &TrackPath, size: u32) -> Vec<Point> {
    let c = f64::from(size) / 2.0;
    track
        .points
        .iter()
        .map(|p| Point::new(c + p.x * c, c - p.y * c))
        .collect()
}

fn svg_path_data(points: &[Point]) -> String {
    let mut d = String::with_capacity(points.len() * 16);
    for (i, p) in points.iter().enumerate() {
        let cmd = if i == 0 { "M" } else { " L" };
        let _ = write!(d, "{cmd} {:.2},{:.2}", p.x, p.y);
    }
    d
}

fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

const PAGE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Sand Table Animation</title>
  <style>
    body {
      margin: 0;
      background-color: black;
      color: white;
      font-family: sans-serif;
      display: flex;
      flex-direction: column;
      align-items: center;
    }
    svg {
      display: block;
    }
    .controls {
      margin-top: 1em;
      display: flex;
      gap: 1em;
      align-items: center;
    }
    button, input[type="range"] {
      background-color: #222;
      color: white;
      border: 1px solid #555;
      padding: 0.4em 0.8em;
      font-size: 1em;
      cursor: pointer;
    }
    input[type="range"] {
      width: 300px;
    }
  </style>
</head>
<body>
  <svg id="stage" width="__SIZE__" height="__SIZE__" viewBox="0 0 __SIZE__ __SIZE__" xmlns="http://www.w3.org/2000/svg">
    <rect width="__SIZE__" height="__SIZE__" fill="black" />
    <path d="__PATH_DATA__" fill="none" stroke="#444" stroke-width="1" />
    <path id="animatedPath" d="__PATH_DATA__" fill="none" stroke="white" stroke-width="1"
          stroke-dasharray="__PATH_LENGTH__" stroke-dashoffset="__PATH_LENGTH__" />
  </svg>
  <div class="controls">
    <button id="playPauseBtn">Play</button>
    <button id="restartBtn">Restart</button>
    <input id="scrubber" type="range" min="0" max="__DURATION__" step="0.01" value="0">
  </div>
  <script>
    const path = document.getElementById("animatedPath");
    const scrubber = document.getElementById("scrubber");
    const playPauseBtn = document.getElementById("playPauseBtn");
    const restartBtn = document.getElementById("restartBtn");

    const duration = __DURATION__;
    const pathLength = parseFloat(path.getAttribute("stroke-dasharray"));
    let playing = false;
    let startTime = null;
    let pausedAt = 0;
    let rafId = null;

    function seekTo(t) {
      t = Math.min(Math.max(t, 0), duration);
      path.setAttribute("stroke-dashoffset", (pathLength * (1 - t / duration)).toFixed(2));
      scrubber.value = t.toFixed(2);
      return t;
    }
    window.seekTo = seekTo;

    function animate(timestamp) {
      if (startTime === null) startTime = timestamp;
      const t = Math.min(pausedAt + (timestamp - startTime) / 1000, duration);
      seekTo(t);
      if (t < duration) {
        rafId = requestAnimationFrame(animate);
      } else {
        playing = false;
        pausedAt = 0;
        playPauseBtn.textContent = "Play";
      }
    }

    function play() {
      if (playing) return;
      playing = true;
      playPauseBtn.textContent = "Pause";
      startTime = null;
      rafId = requestAnimationFrame(animate);
    }

    function pause() {
      if (!playing) return;
      cancelAnimationFrame(rafId);
      pausedAt = parseFloat(scrubber.value);
      playing = false;
      playPauseBtn.textContent = "Play";
    }

    playPauseBtn.addEventListener("click", () => (playing ? pause() : play()));
    restartBtn.addEventListener("click", () => {
      cancelAnimationFrame(rafId);
      playing = false;
      pausedAt = 0;
      seekTo(0);
      play();
    });
    scrubber.addEventListener("input", () => {
      pause();
      pausedAt = seekTo(parseFloat(scrubber.value));
    });

    seekTo(0);
  </script>
</body>
</html>
"##;
