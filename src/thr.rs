use std::path::Path;

use kurbo::Point;
use tracing::warn;

use crate::error::{SandtraceError, SandtraceResult};

/// A plotted trajectory in unit space: `x` and `y` in `[-1, 1]`, origin at
/// the table center.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackPath {
    pub points: Vec<Point>,
}

impl TrackPath {
    /// Parse a `.thr` file from disk.
    pub fn from_path(path: &Path) -> SandtraceResult<Self> {
        use anyhow::Context as _;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read thr file '{}'", path.display()))?;
        Ok(Self::from_str_lossy(&text))
    }

    /// Parse `.thr` text.
    ///
    /// Each data line is a `theta r` pair (theta in radians, r in table
    /// radii). Blank lines and `#` comments are skipped. Malformed lines are
    /// skipped with a warning rather than failing the parse; a file full of
    /// garbage simply yields an empty track, which the pipeline rejects.
    pub fn from_str_lossy(text: &str) -> Self {
        let mut points = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let parsed = match (fields.next(), fields.next(), fields.next()) {
                (Some(theta), Some(r), None) => theta
                    .parse::<f64>()
                    .ok()
                    .zip(r.parse::<f64>().ok())
                    .map(|(theta, r)| polar_to_cartesian(r, theta)),
                _ => None,
            };

            match parsed {
                Some(p) => points.push(p),
                None => warn!(line = lineno + 1, content = line, "skipping malformed thr line"),
            }
        }
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Reject tracks the page generator cannot animate.
    pub fn validate(&self) -> SandtraceResult<()> {
        if self.points.len() < 2 {
            return Err(SandtraceError::validation(
                "thr track needs at least two points to animate",
            ));
        }
        Ok(())
    }
}

/// Convert a `(r, theta)` polar sample to cartesian table coordinates.
pub fn polar_to_cartesian(r: f64, theta: f64) -> Point {
    Point::new(r * theta.cos(), r * theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_theta_r_pairs() {
        let track = TrackPath::from_str_lossy("0.0 1.0\n3.14159265358979 1.0\n");
        assert_eq!(track.len(), 2);
        assert!((track.points[0].x - 1.0).abs() < 1e-9);
        assert!(track.points[0].y.abs() < 1e-9);
        assert!((track.points[1].x + 1.0).abs() < 1e-9);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let track = TrackPath::from_str_lossy("# header\n\n  \n0.0 0.5\n");
        assert_eq!(track.len(), 1);
    }

    #[test]
    fn skips_malformed_lines() {
        let track = TrackPath::from_str_lossy("0.0 1.0\nnot numbers\n1.0\n0.1 0.2 0.3\n0.5 0.5\n");
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn empty_track_fails_validation() {
        assert!(TrackPath::default().validate().is_err());
        assert!(
            TrackPath::from_str_lossy("0.0 1.0\n0.1 1.0\n")
                .validate()
                .is_ok()
        );
    }
}
