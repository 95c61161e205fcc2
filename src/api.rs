//! One-shot capture operations
//!
//! Each call owns a whole session: launch the browser, serve the template,
//! render once and tear everything down again. Use
//! [`CaptureSession`](crate::orchestrator::CaptureSession) directly to reuse
//! one browser for many renders.

use crate::browser::{CaptureResult, DriverOptions};
use crate::error::Result;
use crate::logger::{default_logger, LoggerDebug, SharedLogger};
use crate::orchestrator::{CaptureDriver, CaptureSession};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Options for [`capture_image`] and [`capture_pdf`]
#[derive(Clone)]
pub struct CaptureOptions {
    /// Browser options (timeouts, visibility, executable, environment)
    pub driver: DriverOptions,
    /// Asset server port (0 = any free port)
    pub port: u16,
    /// Receiver of page console output, script errors and load failures
    pub logger: SharedLogger,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            driver: DriverOptions::default(),
            port: 0,
            logger: default_logger(),
        }
    }
}

impl fmt::Debug for CaptureOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureOptions")
            .field("driver", &self.driver)
            .field("port", &self.port)
            .field("logger", &LoggerDebug)
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Output {
    Image,
    Pdf,
}

/// Render `template_dir` with `data` to an image at `output`
///
/// The image format follows the extension of `output` (PNG by default).
pub async fn capture_image<T: Serialize + ?Sized>(
    template_dir: impl AsRef<Path>,
    data: &T,
    output: impl AsRef<Path>,
    options: &CaptureOptions,
) -> Result<CaptureResult> {
    let session = CaptureSession::with_logger(options.driver.clone(), options.logger.clone());
    run(session, template_dir.as_ref(), data, output.as_ref(), options.port, Output::Image).await
}

/// Render `template_dir` with `data` to a landscape PDF at `output`
pub async fn capture_pdf<T: Serialize + ?Sized>(
    template_dir: impl AsRef<Path>,
    data: &T,
    output: impl AsRef<Path>,
    options: &CaptureOptions,
) -> Result<CaptureResult> {
    let session = CaptureSession::with_logger(options.driver.clone(), options.logger.clone());
    run(session, template_dir.as_ref(), data, output.as_ref(), options.port, Output::Pdf).await
}

async fn run<D: CaptureDriver, T: Serialize + ?Sized>(
    mut session: CaptureSession<D>,
    template_dir: &Path,
    data: &T,
    output: &Path,
    port: u16,
    kind: Output,
) -> Result<CaptureResult> {
    let data = serde_json::to_value(data)?;

    session.start().await?;
    let rendered = render(&mut session, template_dir, data, output, port, kind).await;
    let ended = session.end().await;

    match (rendered, ended) {
        (Ok(result), Ok(())) => Ok(result),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), ended) => {
            if let Err(end_err) = ended {
                warn!("Session teardown after failed render also failed: {}", end_err);
            }
            Err(e)
        }
    }
}

async fn render<D: CaptureDriver>(
    session: &mut CaptureSession<D>,
    template_dir: &Path,
    data: serde_json::Value,
    output: &Path,
    port: u16,
    kind: Output,
) -> Result<CaptureResult> {
    session.load_template(template_dir, data, port).await?;
    match kind {
        Output::Image => session.render_image(output).await,
        Output::Pdf => session.render_pdf(output).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::CaptureFormat;
    use crate::error::{ConfigError, Error};
    use crate::template::TemplateConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use url::Url;

    #[derive(Default)]
    struct Calls {
        started: AtomicUsize,
        ended: AtomicUsize,
        rendered: AtomicUsize,
    }

    struct FakeDriver {
        calls: Arc<Calls>,
    }

    impl CaptureDriver for FakeDriver {
        async fn start(&mut self) -> Result<()> {
            self.calls.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn end(&mut self) -> Result<()> {
            self.calls.ended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn render_image(
            &mut self,
            _url: &Url,
            output: &Path,
            _config: &TemplateConfig,
        ) -> Result<CaptureResult> {
            self.calls.rendered.fetch_add(1, Ordering::SeqCst);
            Ok(CaptureResult {
                path: output.to_path_buf(),
                format: CaptureFormat::Png,
                width: Some(10),
                height: Some(20),
                size: 0,
            })
        }

        async fn render_pdf(
            &mut self,
            _url: &Url,
            _output: &Path,
            _config: &TemplateConfig,
        ) -> Result<CaptureResult> {
            Err(Error::cdp("printing disabled"))
        }
    }

    fn session(calls: &Arc<Calls>) -> CaptureSession<FakeDriver> {
        CaptureSession::with_driver(
            FakeDriver {
                calls: calls.clone(),
            },
            default_logger(),
        )
    }

    fn template_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<div id=\"chart\">{{ msg }}</div>").unwrap();
        std::fs::write(dir.path().join("template.json"), r##"{"waitSelector":"#chart"}"##).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_run_image_ends_session() {
        let calls = Arc::new(Calls::default());
        let dir = template_dir();
        let output = dir.path().join("out").join("chart.png");

        let result = run(
            session(&calls),
            dir.path(),
            &serde_json::json!({"msg": "hi"}),
            &output,
            0,
            Output::Image,
        )
        .await
        .unwrap();

        assert_eq!(result.path, output);
        assert!(output.parent().unwrap().is_dir());
        assert_eq!(calls.started.load(Ordering::SeqCst), 1);
        assert_eq!(calls.rendered.load(Ordering::SeqCst), 1);
        assert_eq!(calls.ended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_render_error_wins_and_session_still_ends() {
        let calls = Arc::new(Calls::default());
        let dir = template_dir();

        let err = run(
            session(&calls),
            dir.path(),
            &serde_json::json!({}),
            &dir.path().join("out.pdf"),
            0,
            Output::Pdf,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cdp(_)));
        assert_eq!(calls.ended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_config_fails_before_render() {
        let calls = Arc::new(Calls::default());
        let dir = tempfile::tempdir().unwrap();

        let err = run(
            session(&calls),
            dir.path(),
            &serde_json::json!({}),
            &dir.path().join("out.png"),
            0,
            Output::Image,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::NotFound { .. })));
        assert_eq!(calls.rendered.load(Ordering::SeqCst), 0);
        assert_eq!(calls.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_options_default() {
        let options = CaptureOptions::default();
        assert_eq!(options.port, 0);
        assert_eq!(options.driver, DriverOptions::default());
        assert!(format!("{:?}", options).contains("port: 0"));
    }
}
