//! Capture session state machine tests
//!
//! The browser is replaced by a recording driver so every transition can be
//! checked without Chromium.

use capture_template::browser::{CaptureFormat, CaptureResult};
use capture_template::error::{ConfigError, Error, Result};
use capture_template::logger::default_logger;
use capture_template::orchestrator::{CaptureDriver, CaptureSession, SessionState};
use capture_template::template::TemplateConfig;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio_test::{assert_err, assert_ok};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Start,
    End,
    Image(String, PathBuf, TemplateConfig),
    Pdf(String, PathBuf, TemplateConfig),
}

#[derive(Default)]
struct RecordingDriver {
    calls: Vec<Call>,
}

impl RecordingDriver {
    fn renders(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Image(..) | Call::Pdf(..)))
            .count()
    }
}

fn summary(output: &Path, format: CaptureFormat) -> CaptureResult {
    CaptureResult {
        path: output.to_path_buf(),
        format,
        width: None,
        height: None,
        size: 0,
    }
}

impl CaptureDriver for RecordingDriver {
    async fn start(&mut self) -> Result<()> {
        self.calls.push(Call::Start);
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        self.calls.push(Call::End);
        Ok(())
    }

    async fn render_image(
        &mut self,
        url: &Url,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult> {
        self.calls.push(Call::Image(
            url.to_string(),
            output.to_path_buf(),
            config.clone(),
        ));
        Ok(summary(output, CaptureFormat::image_from_path(output)))
    }

    async fn render_pdf(
        &mut self,
        url: &Url,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult> {
        self.calls
            .push(Call::Pdf(url.to_string(), output.to_path_buf(), config.clone()));
        Ok(summary(output, CaptureFormat::Pdf))
    }
}

fn session() -> CaptureSession<RecordingDriver> {
    CaptureSession::with_driver(RecordingDriver::default(), default_logger())
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/hello")
}

fn template(config: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<div id=\"chart\">{{ msg }}</div>").unwrap();
    std::fs::write(dir.path().join("template.json"), config).unwrap();
    dir
}

#[tokio::test]
async fn test_new_session_is_idle() {
    let session = session();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.config().is_none());
    assert!(matches!(session.get_url(), Err(Error::Usage(_))));
}

#[tokio::test]
async fn test_start_twice_is_usage_error() {
    let mut session = session();
    assert_ok!(session.start().await);
    let err = assert_err!(session.start().await);
    assert!(matches!(err, Error::Usage(_)));
    assert_eq!(session.driver().calls, vec![Call::Start]);
}

#[tokio::test]
async fn test_load_before_start_is_usage_error() {
    let mut session = session();
    let err = assert_err!(session.load_template(fixture(), json!({}), 0).await.map(|_| ()));
    assert!(matches!(err, Error::Usage(_)));
}

#[tokio::test]
async fn test_render_before_load_does_not_touch_driver() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session();

    let err = assert_err!(session.render_image(dir.path().join("a.png")).await);
    assert!(matches!(err, Error::Usage(_)));

    session.start().await.unwrap();
    let err = assert_err!(session.render_pdf(dir.path().join("a.pdf")).await);
    assert!(matches!(err, Error::Usage(_)));

    assert_eq!(session.driver().renders(), 0);
    assert!(!dir.path().join("a.png").exists());
}

#[tokio::test]
async fn test_get_url_after_auto_port() {
    let mut session = session();
    session.start().await.unwrap();

    let url = session
        .load_template(fixture(), json!({"msg": "hi"}), 0)
        .await
        .unwrap()
        .clone();

    assert_eq!(session.state(), SessionState::TemplateLoaded);
    assert_eq!(url.host_str(), Some("127.0.0.1"));
    assert_ne!(url.port(), Some(0));
    assert_eq!(session.get_url().unwrap(), &url);
    assert_eq!(session.config(), Some(&TemplateConfig::new("#chart")));

    let index = reqwest::get(url.as_str()).await.unwrap().text().await.unwrap();
    assert!(index.contains("<h1>hi</h1>"));

    session.end().await.unwrap();
}

#[tokio::test]
async fn test_missing_wait_selector_leaves_no_server() {
    let dir = template(r##"{"captureSelector": "#chart"}"##);
    let mut session = session();
    session.start().await.unwrap();

    let err = assert_err!(session.load_template(dir.path(), json!({}), 0).await.map(|_| ()));
    assert!(matches!(err, Error::Config(ConfigError::Invalid(_))));
    assert_eq!(session.state(), SessionState::Started);
    assert!(session.get_url().is_err());
}

#[tokio::test]
async fn test_missing_config_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session();
    session.start().await.unwrap();

    let err = assert_err!(session.load_template(dir.path(), json!({}), 0).await.map(|_| ()));
    assert!(matches!(err, Error::Config(ConfigError::NotFound { .. })));
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_template() {
    let bad = template("{}");
    let mut session = session();
    session.start().await.unwrap();
    let url = session
        .load_template(fixture(), json!({}), 0)
        .await
        .unwrap()
        .clone();

    assert_err!(session.load_template(bad.path(), json!({}), 0).await.map(|_| ()));

    assert_eq!(session.state(), SessionState::TemplateLoaded);
    assert_eq!(session.get_url().unwrap(), &url);
    session.end().await.unwrap();
}

#[tokio::test]
async fn test_reload_replaces_server() {
    let mut session = session();
    session.start().await.unwrap();

    let first = session
        .load_template(fixture(), json!({"msg": "one"}), 0)
        .await
        .unwrap()
        .clone();
    let second = session
        .load_template(fixture(), json!({"msg": "two"}), 0)
        .await
        .unwrap()
        .clone();

    let first_addr = format!("127.0.0.1:{}", first.port().unwrap());
    if first.port() != second.port() {
        assert!(tokio::net::TcpStream::connect(&first_addr).await.is_err());
    }
    let index = reqwest::get(second.as_str()).await.unwrap().text().await.unwrap();
    assert!(index.contains("<h1>two</h1>"));

    session.end().await.unwrap();
}

#[tokio::test]
async fn test_render_passes_url_config_and_creates_parent_dirs() {
    let out = tempfile::tempdir().unwrap();
    let image = out.path().join("nested/deeper/chart.png");
    let pdf = out.path().join("pdf/report.pdf");

    let mut session = session();
    session.start().await.unwrap();
    let url = session
        .load_template(fixture(), json!({}), 0)
        .await
        .unwrap()
        .to_string();

    let result = session.render_image(&image).await.unwrap();
    assert_eq!(result.format, CaptureFormat::Png);
    session.render_pdf(&pdf).await.unwrap();

    assert!(image.parent().unwrap().is_dir());
    assert!(pdf.parent().unwrap().is_dir());
    assert_eq!(session.state(), SessionState::TemplateLoaded);

    let config = TemplateConfig::new("#chart");
    assert_eq!(
        session.driver().calls[1..],
        [
            Call::Image(url.clone(), image.clone(), config.clone()),
            Call::Pdf(url, pdf.clone(), config),
        ]
    );

    session.end().await.unwrap();
}

#[tokio::test]
async fn test_output_without_file_name_is_usage_error() {
    let mut session = session();
    session.start().await.unwrap();
    session.load_template(fixture(), json!({}), 0).await.unwrap();

    let err = assert_err!(session.render_image("/").await);
    assert!(matches!(err, Error::Usage(_)));
    assert_eq!(session.driver().renders(), 0);

    session.end().await.unwrap();
}

#[tokio::test]
async fn test_unload_is_idempotent() {
    let mut session = session();
    session.start().await.unwrap();
    let port = session
        .load_template(fixture(), json!({}), 0)
        .await
        .unwrap()
        .port()
        .unwrap();

    assert_ok!(session.unload_template().await);
    assert_ok!(session.unload_template().await);

    assert_eq!(session.state(), SessionState::Started);
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
    assert!(matches!(session.get_url(), Err(Error::Usage(_))));
    let dir = tempfile::tempdir().unwrap();
    assert_err!(session.render_image(dir.path().join("a.png")).await);
}

#[tokio::test]
async fn test_end_unloads_and_is_idempotent() {
    let mut session = session();
    session.start().await.unwrap();
    let port = session
        .load_template(fixture(), json!({}), 0)
        .await
        .unwrap()
        .port()
        .unwrap();

    assert_ok!(session.end().await);
    assert_ok!(session.end().await);

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.driver().calls, vec![Call::Start, Call::End]);
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn test_session_restarts_after_end() {
    let mut session = session();
    session.start().await.unwrap();
    session.end().await.unwrap();
    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Started);
    assert_eq!(
        session.driver().calls,
        vec![Call::Start, Call::End, Call::Start]
    );
}
