use std::path::PathBuf;

use tempfile::TempDir;

#[test]
fn cli_no_gif_writes_html_page() {
    let dir = TempDir::new().unwrap();
    let thr_path = dir.path().join("spiral.thr");
    std::fs::write(&thr_path, "# spiral\n0.0 0.0\n3.14 0.5\n6.28 1.0\n").unwrap();

    let exe = std::env::var_os("CARGO_BIN_EXE_sandtrace")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "sandtrace.exe"
            } else {
                "sandtrace"
            });
            p
        });

    let status = std::process::Command::new(exe)
        .arg(&thr_path)
        .arg("--no-gif")
        .current_dir(dir.path())
        .status()
        .unwrap();

    assert!(status.success());

    let html_path = dir.path().join("spiral").join("spiral.html");
    assert!(html_path.exists());
    let html = std::fs::read_to_string(html_path).unwrap();
    assert!(html.contains(r#"id="animatedPath""#));
}
