//! Capture session state machine
//!
//! ```text
//! Idle ──start()──> Started ──load_template()──> TemplateLoaded ─┐
//!  ▲                  │  ▲                          │   ▲         │ render_image()
//!  └──────end()───────┘  └────unload_template()─────┘   └─────────┘ render_pdf()
//! ```
//!
//! `end()` unloads any loaded template first. Loading while a template is
//! loaded replaces it. Render preconditions are checked before anything
//! touches the browser.

use crate::browser::{BrowserDriver, CaptureResult, DriverOptions};
use crate::error::{Error, Result};
use crate::logger::{default_logger, LoggerDebug, SharedLogger};
use crate::server::AssetServer;
use crate::template::{DirectoryTemplate, TemplateConfig, TemplateSource};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

/// Lifecycle state of a [`CaptureSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No browser
    Idle,
    /// Browser running, no template
    Started,
    /// Browser running and a template being served
    TemplateLoaded,
}

/// What the session needs from a browser driver
///
/// [`BrowserDriver`] is the real implementation; the seam exists so the
/// state machine can run without Chromium.
#[allow(async_fn_in_trait)]
pub trait CaptureDriver {
    /// Launch the browser
    async fn start(&mut self) -> Result<()>;

    /// Terminate the browser
    async fn end(&mut self) -> Result<()>;

    /// Capture the configured region of `url` to an image at `output`
    async fn render_image(
        &mut self,
        url: &Url,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult>;

    /// Print the whole document at `url` to a PDF at `output`
    async fn render_pdf(
        &mut self,
        url: &Url,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult>;
}

impl CaptureDriver for BrowserDriver {
    async fn start(&mut self) -> Result<()> {
        BrowserDriver::start(self).await
    }

    async fn end(&mut self) -> Result<()> {
        BrowserDriver::end(self).await
    }

    async fn render_image(
        &mut self,
        url: &Url,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult> {
        BrowserDriver::render_image(self, url.as_str(), output, config).await
    }

    async fn render_pdf(
        &mut self,
        url: &Url,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult> {
        BrowserDriver::render_pdf(self, url.as_str(), output, config).await
    }
}

struct LoadedTemplate {
    server: AssetServer,
    config: TemplateConfig,
}

/// One capture session: a browser driver plus at most one loaded template
pub struct CaptureSession<D: CaptureDriver = BrowserDriver> {
    driver: D,
    state: SessionState,
    loaded: Option<LoadedTemplate>,
    logger: SharedLogger,
}

impl<D: CaptureDriver> fmt::Debug for CaptureSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state)
            .field("url", &self.loaded.as_ref().map(|l| l.server.url().as_str()))
            .field("logger", &LoggerDebug)
            .finish()
    }
}

impl CaptureSession<BrowserDriver> {
    /// Session backed by headless Chromium
    pub fn new(options: DriverOptions) -> Self {
        Self::with_logger(options, default_logger())
    }

    /// Session backed by headless Chromium, logging page messages to `logger`
    pub fn with_logger(options: DriverOptions, logger: SharedLogger) -> Self {
        let driver = BrowserDriver::with_logger(options, logger.clone());
        Self::with_driver(driver, logger)
    }
}

impl<D: CaptureDriver> CaptureSession<D> {
    /// Session around an arbitrary driver
    pub fn with_driver(driver: D, logger: SharedLogger) -> Self {
        Self {
            driver,
            state: SessionState::Idle,
            loaded: None,
            logger,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Configuration of the loaded template
    pub fn config(&self) -> Option<&TemplateConfig> {
        self.loaded.as_ref().map(|l| &l.config)
    }

    /// Launch the browser
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::usage("session is already started"));
        }

        self.driver.start().await?;
        self.state = SessionState::Started;
        info!("Capture session started");
        Ok(())
    }

    /// Load a template directory and serve it with `data` on `port` (0 = any)
    #[instrument(skip(self, template_dir, data), fields(template = %template_dir.as_ref().display()))]
    pub async fn load_template(
        &mut self,
        template_dir: impl AsRef<Path>,
        data: Value,
        port: u16,
    ) -> Result<&Url> {
        self.ensure_started()?;

        let template_dir = template_dir.as_ref();
        let config = TemplateConfig::load(template_dir).await?;
        let source = DirectoryTemplate::load(template_dir, data.clone()).await?;
        self.load_source(config, Arc::new(source), data, port).await
    }

    /// Serve an already-built template tree
    pub async fn load_source(
        &mut self,
        config: TemplateConfig,
        source: Arc<dyn TemplateSource>,
        data: Value,
        port: u16,
    ) -> Result<&Url> {
        self.ensure_started()?;

        if self.loaded.is_some() {
            debug!("Replacing loaded template");
            self.unload_template().await?;
        }

        let server = AssetServer::start(data, source, port, self.logger.clone()).await?;
        self.state = SessionState::TemplateLoaded;
        let loaded = self.loaded.insert(LoadedTemplate { server, config });
        Ok(loaded.server.url())
    }

    /// Base URL of the loaded template
    pub fn get_url(&self) -> Result<&Url> {
        self.loaded
            .as_ref()
            .map(|l| l.server.url())
            .ok_or_else(|| Error::usage("no template is loaded"))
    }

    /// Capture the loaded template to an image
    pub async fn render_image(&mut self, output: impl AsRef<Path>) -> Result<CaptureResult> {
        let output = output.as_ref();
        let (url, config) = self.render_target(output)?;
        ensure_parent_dir(output).await?;
        self.driver.render_image(&url, output, &config).await
    }

    /// Capture the loaded template to a PDF
    pub async fn render_pdf(&mut self, output: impl AsRef<Path>) -> Result<CaptureResult> {
        let output = output.as_ref();
        let (url, config) = self.render_target(output)?;
        ensure_parent_dir(output).await?;
        self.driver.render_pdf(&url, output, &config).await
    }

    /// Stop serving the loaded template, if any
    #[instrument(skip(self))]
    pub async fn unload_template(&mut self) -> Result<()> {
        let Some(loaded) = self.loaded.take() else {
            return Ok(());
        };

        if self.state == SessionState::TemplateLoaded {
            self.state = SessionState::Started;
        }
        loaded.server.stop().await
    }

    /// Unload any template and terminate the browser
    #[instrument(skip(self))]
    pub async fn end(&mut self) -> Result<()> {
        if self.state == SessionState::Idle {
            return Ok(());
        }

        let unloaded = self.unload_template().await;
        let ended = self.driver.end().await;
        self.state = SessionState::Idle;
        info!("Capture session ended");
        unloaded.and(ended)
    }

    fn ensure_started(&self) -> Result<()> {
        match self.state {
            SessionState::Idle => Err(Error::usage("session is not started")),
            _ => Ok(()),
        }
    }

    fn render_target(&self, output: &Path) -> Result<(Url, TemplateConfig)> {
        if self.state == SessionState::Idle {
            return Err(Error::usage("session is not started"));
        }
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| Error::usage("no template is loaded"))?;
        if output.file_name().is_none() {
            return Err(Error::usage(format!(
                "output path {} has no file name",
                output.display()
            )));
        }
        Ok((loaded.server.url().clone(), loaded.config.clone()))
    }
}

async fn ensure_parent_dir(output: &Path) -> Result<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            tokio::fs::create_dir_all(parent).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}
