use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::{SandtraceError, SandtraceResult};

/// How to launch the headless browser.
#[derive(Clone, Debug)]
pub struct ChromeConfig {
    /// Explicit browser binary. When `None`, well-known Chromium binary
    /// names are probed on PATH.
    pub binary: Option<PathBuf>,
    /// Browser window width in pixels.
    pub window_width: u32,
    /// Browser window height in pixels.
    pub window_height: u32,
    /// How long to wait for the DevTools endpoint after spawning.
    pub startup_timeout: Duration,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            binary: None,
            window_width: 1000,
            window_height: 1140,
            startup_timeout: Duration::from_secs(20),
        }
    }
}

impl ChromeConfig {
    pub fn validate(&self) -> SandtraceResult<()> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(SandtraceError::validation(
                "browser window width/height must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Screenshot clip rectangle in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ClipRect {
    /// Clip dimensions rounded to whole pixels, as produced by the
    /// screenshot encoder.
    pub fn pixel_size(&self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

#[derive(Debug, Serialize)]
struct CdpRequest {
    id: u64,
    method: String,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CdpResponse {
    // Events carry no id; responses echo the request id.
    id: Option<u64>,
    result: Option<Value>,
    error: Option<CdpErrorBody>,
}

#[derive(Debug, Deserialize)]
struct CdpErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct TargetInfo {
    #[serde(rename = "type")]
    target_type: String,
    url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    websocket_url: Option<String>,
}

/// One headless Chromium child plus a DevTools WebSocket attached to its
/// single page target.
///
/// Every protocol roundtrip takes an absolute deadline; socket read timeouts
/// keep an unresponsive browser from hanging the pipeline. Dropping the
/// session kills and reaps the child, so no orphan browsers survive any exit
/// path.
pub struct ChromeSession {
    child: Child,
    ws: WebSocket<MaybeTlsStream<std::net::TcpStream>>,
    next_id: u64,
    // Held for its Drop: the private profile directory.
    _profile_dir: tempfile::TempDir,
}

impl ChromeSession {
    /// Spawn the browser, navigate it to `url`, and attach to its page
    /// target.
    pub fn launch(cfg: &ChromeConfig, url: &str) -> SandtraceResult<Self> {
        use anyhow::Context as _;

        cfg.validate()?;
        let binary = cfg
            .binary
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                SandtraceError::browser(format!(
                    "no Chromium binary found on PATH (tried {})",
                    CHROMIUM_CANDIDATES.join(", ")
                ))
            })?;

        let port = pick_free_port()?;
        let profile_dir = tempfile::Builder::new()
            .prefix("sandtrace-profile-")
            .tempdir()
            .context("create browser profile directory")?;

        let mut child = Command::new(&binary)
            .args([
                "--headless=new",
                "--disable-gpu",
                "--no-sandbox",
                "--no-first-run",
                "--no-default-browser-check",
                "--hide-scrollbars",
                "--force-device-scale-factor=1",
            ])
            .arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg(format!("--window-size={},{}", cfg.window_width, cfg.window_height))
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                SandtraceError::browser(format!(
                    "failed to spawn '{}': {e}",
                    binary.display()
                ))
            })?;

        let deadline = Instant::now() + cfg.startup_timeout;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .context("build devtools http client")?;

        if let Err(e) = wait_devtools_ready(&http, port, deadline, &mut child) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        let ws_url = match page_websocket_url(&http, port, deadline) {
            Ok(u) => u,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        debug!(%ws_url, "attaching to page target");
        let (ws, _response) = match tungstenite::connect(ws_url.as_str()) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SandtraceError::browser(format!(
                    "devtools websocket connect failed: {e}"
                )));
            }
        };

        info!(binary = %binary.display(), port, "browser session ready");
        Ok(Self {
            child,
            ws,
            next_id: 0,
            _profile_dir: profile_dir,
        })
    }

    /// Evaluate a JavaScript expression in the page, returning its value.
    ///
    /// Exceptions thrown by the page surface as browser errors.
    pub fn evaluate(&mut self, expression: &str, deadline: Instant) -> SandtraceResult<Value> {
        let result = self.call(
            "Runtime.evaluate",
            json!({ "expression": expression, "returnByValue": true }),
            deadline,
        )?;

        if let Some(exc) = result.get("exceptionDetails") {
            let text = exc
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| exc.get("text").and_then(Value::as_str))
                .unwrap_or("unknown exception");
            return Err(SandtraceError::browser(format!(
                "page script threw: {text}"
            )));
        }

        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Poll until an element with `dom_id` exists.
    pub fn wait_for_element(&mut self, dom_id: &str, timeout: Duration) -> SandtraceResult<()> {
        let deadline = Instant::now() + timeout;
        let expr = format!("!!document.getElementById('{dom_id}')");
        loop {
            if self.evaluate(&expr, deadline)? == Value::Bool(true) {
                return Ok(());
            }
            if Instant::now() + ELEMENT_POLL_INTERVAL >= deadline {
                return Err(SandtraceError::browser(format!(
                    "element #{dom_id} did not appear within {timeout:?}"
                )));
            }
            std::thread::sleep(ELEMENT_POLL_INTERVAL);
        }
    }

    /// Viewport bounding box of an element, for screenshot clipping.
    pub fn element_clip(&mut self, dom_id: &str, deadline: Instant) -> SandtraceResult<ClipRect> {
        let expr = format!(
            "(() => {{ const el = document.getElementById('{dom_id}'); if (!el) return null; \
             const r = el.getBoundingClientRect(); \
             return {{ x: r.x, y: r.y, width: r.width, height: r.height }}; }})()"
        );
        let value = self.evaluate(&expr, deadline)?;
        if value.is_null() {
            return Err(SandtraceError::browser(format!(
                "element #{dom_id} not found for clipping"
            )));
        }
        let clip: ClipRect = serde_json::from_value(value)
            .map_err(|e| SandtraceError::browser(format!("bad bounding box payload: {e}")))?;
        if clip.width < 1.0 || clip.height < 1.0 {
            return Err(SandtraceError::browser(format!(
                "element #{dom_id} has an empty bounding box"
            )));
        }
        Ok(clip)
    }

    /// Take a PNG screenshot clipped to `clip`, returning the decoded bytes.
    pub fn capture_screenshot(
        &mut self,
        clip: &ClipRect,
        deadline: Instant,
    ) -> SandtraceResult<Vec<u8>> {
        let result = self.call(
            "Page.captureScreenshot",
            json!({
                "format": "png",
                "clip": {
                    "x": clip.x,
                    "y": clip.y,
                    "width": clip.width,
                    "height": clip.height,
                    "scale": 1,
                },
            }),
            deadline,
        )?;

        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| SandtraceError::browser("screenshot response carried no data"))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| SandtraceError::browser(format!("screenshot payload not base64: {e}")))
    }

    /// One DevTools request/response roundtrip, skipping interleaved events.
    fn call(&mut self, method: &str, params: Value, deadline: Instant) -> SandtraceResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let payload = serde_json::to_string(&CdpRequest {
            id,
            method: method.to_string(),
            params,
        })
        .map_err(|e| SandtraceError::browser(format!("encode devtools request: {e}")))?;

        self.arm_read_timeout(deadline)?;
        self.ws
            .send(Message::Text(payload))
            .map_err(|e| SandtraceError::browser(format!("devtools send failed: {e}")))?;

        loop {
            self.arm_read_timeout(deadline)?;
            let msg = self.ws.read().map_err(|e| match e {
                tungstenite::Error::Io(ref io)
                    if matches!(
                        io.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    SandtraceError::browser(format!("devtools response to {method} timed out"))
                }
                other => SandtraceError::browser(format!("devtools read failed: {other}")),
            })?;

            let Message::Text(text) = msg else {
                continue;
            };
            let resp: CdpResponse = serde_json::from_str(&text)
                .map_err(|e| SandtraceError::browser(format!("bad devtools message: {e}")))?;
            if resp.id != Some(id) {
                continue; // protocol event or stale response
            }
            if let Some(err) = resp.error {
                return Err(SandtraceError::browser(format!(
                    "{method} failed: {}",
                    err.message
                )));
            }
            return Ok(resp.result.unwrap_or(Value::Null));
        }
    }

    /// Bound the next socket read by what is left of `deadline`.
    fn arm_read_timeout(&mut self, deadline: Instant) -> SandtraceResult<()> {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .ok_or_else(|| SandtraceError::browser("devtools deadline exceeded"))?
            .max(Duration::from_millis(1));
        if let MaybeTlsStream::Plain(stream) = self.ws.get_ref() {
            stream
                .set_read_timeout(Some(remaining))
                .map_err(|e| SandtraceError::browser(format!("set socket timeout: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let _ = self.ws.close(None);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const CHROMIUM_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Locate a runnable Chromium binary on PATH.
pub fn find_chromium() -> Option<PathBuf> {
    for candidate in CHROMIUM_CANDIDATES {
        let runnable = Command::new(candidate)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if runnable {
            return Some(PathBuf::from(candidate));
        }
    }
    None
}

fn pick_free_port() -> SandtraceResult<u16> {
    use anyhow::Context as _;
    let listener =
        std::net::TcpListener::bind(("127.0.0.1", 0)).context("reserve devtools port")?;
    let port = listener
        .local_addr()
        .context("read reserved devtools port")?
        .port();
    Ok(port)
}

fn wait_devtools_ready(
    http: &reqwest::blocking::Client,
    port: u16,
    deadline: Instant,
    child: &mut Child,
) -> SandtraceResult<()> {
    let version_url = format!("http://127.0.0.1:{port}/json/version");
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| SandtraceError::browser(format!("poll browser child: {e}")))?
        {
            return Err(SandtraceError::browser(format!(
                "browser exited during startup with {status}"
            )));
        }

        match http.get(&version_url).send() {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(_) | Err(_) => {}
        }

        if Instant::now() + STARTUP_POLL_INTERVAL >= deadline {
            return Err(SandtraceError::browser(format!(
                "devtools endpoint on port {port} did not come up in time"
            )));
        }
        std::thread::sleep(STARTUP_POLL_INTERVAL);
    }
}

const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn page_websocket_url(
    http: &reqwest::blocking::Client,
    port: u16,
    deadline: Instant,
) -> SandtraceResult<String> {
    let list_url = format!("http://127.0.0.1:{port}/json");
    loop {
        let targets: Vec<TargetInfo> = http
            .get(&list_url)
            .send()
            .and_then(|r| r.json())
            .map_err(|e| SandtraceError::browser(format!("list devtools targets: {e}")))?;

        if let Some(url) = pick_page_target(&targets) {
            return Ok(url);
        }

        if Instant::now() + STARTUP_POLL_INTERVAL >= deadline {
            return Err(SandtraceError::browser(
                "no debuggable page target appeared in time",
            ));
        }
        std::thread::sleep(STARTUP_POLL_INTERVAL);
    }
}

fn pick_page_target(targets: &[TargetInfo]) -> Option<String> {
    targets.iter().find_map(|t| {
        if t.target_type != "page" {
            return None;
        }
        debug!(url = %t.url, "found page target");
        t.websocket_url.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_list_deserializes_devtools_shape() {
        let json = r#"[
            {"type": "background_page", "url": "chrome://x", "id": "1"},
            {"type": "page", "url": "file:///tmp/anim.html", "id": "2",
             "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/2"}
        ]"#;
        let targets: Vec<TargetInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(
            pick_page_target(&targets).as_deref(),
            Some("ws://127.0.0.1:9222/devtools/page/2")
        );
    }

    #[test]
    fn page_target_without_debugger_url_is_skipped() {
        let json = r#"[{"type": "page", "url": "file:///a.html"}]"#;
        let targets: Vec<TargetInfo> = serde_json::from_str(json).unwrap();
        assert_eq!(pick_page_target(&targets), None);
    }

    #[test]
    fn clip_rounds_to_whole_pixels() {
        let clip = ClipRect {
            x: 10.0,
            y: 20.0,
            width: 899.6,
            height: 900.4,
        };
        assert_eq!(clip.pixel_size(), (900, 900));
    }

    #[test]
    fn config_rejects_zero_window() {
        let cfg = ChromeConfig {
            window_width: 0,
            ..ChromeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
