//! Browser lifecycle management
//!
//! One [`BrowserDriver`] owns one Chromium process and one page. The process
//! is expensive to launch, so the driver is meant to be started once and
//! reused for many renders. A crash invalidates it: every later render fails
//! until `end()` and `start()` are called again.

use super::capture::{write_output, CaptureFormat, CaptureResult, PageCapture};
use super::events::{self, signal_crash, CrashSignal};
use super::navigation::PageNavigator;
use crate::error::{BrowserError, Error, Result};
use crate::logger::{default_logger, LoggerDebug, SharedLogger};
use crate::template::TemplateConfig;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures::StreamExt;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Configuration for the browser driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Show the browser window (default: false)
    pub visible: bool,
    /// Open devtools for the capture page (default: false)
    pub devtools: bool,
    /// Enable sandbox (default: true)
    pub sandbox: bool,
    /// Initial viewport width (default: 1280)
    pub width: u32,
    /// Initial viewport height (default: 800)
    pub height: u32,
    /// Navigation timeout in milliseconds (default: 30000)
    pub navigation_timeout_ms: u64,
    /// Wait-selector timeout in milliseconds (default: 30000)
    pub wait_timeout_ms: u64,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub executable_path: Option<PathBuf>,
    /// Extra environment variables for the browser process
    pub env: Vec<(String, String)>,
    /// Additional Chrome arguments
    pub extra_args: Vec<String>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            visible: false,
            devtools: false,
            sandbox: true,
            width: 1280,
            height: 800,
            navigation_timeout_ms: 30000,
            wait_timeout_ms: 30000,
            executable_path: None,
            env: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

impl DriverOptions {
    /// Create a new options builder
    pub fn builder() -> DriverOptionsBuilder {
        DriverOptionsBuilder::default()
    }

    /// Translate into a chromiumoxide launch config
    pub fn to_cdp_config(&self) -> Result<CdpBrowserConfig> {
        let mut builder = CdpBrowserConfig::builder()
            .window_size(self.width, self.height)
            .viewport(Viewport {
                width: self.width,
                height: self.height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: false,
                has_touch: false,
            })
            .request_timeout(Duration::from_millis(self.navigation_timeout_ms))
            .arg("--hide-scrollbars")
            .arg("--disable-extensions");

        if self.visible {
            builder = builder.with_head();
        }

        if self.devtools {
            builder = builder.arg("--auto-open-devtools-for-tabs");
        }

        if !self.sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(ref path) = self.executable_path {
            builder = builder.chrome_executable(path);
        }

        for (key, value) in &self.env {
            builder = builder.env(key.clone(), value.clone());
        }

        for arg in &self.extra_args {
            builder = builder.arg(arg);
        }

        builder
            .build()
            .map_err(|e| BrowserError::ConfigError(e).into())
    }
}

/// Builder for DriverOptions
#[derive(Default)]
pub struct DriverOptionsBuilder {
    options: DriverOptions,
}

impl DriverOptionsBuilder {
    /// Show or hide the browser window
    pub fn visible(mut self, visible: bool) -> Self {
        self.options.visible = visible;
        self
    }

    /// Open devtools
    pub fn devtools(mut self, devtools: bool) -> Self {
        self.options.devtools = devtools;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.options.sandbox = sandbox;
        self
    }

    /// Set initial viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.options.width = width;
        self.options.height = height;
        self
    }

    /// Set navigation timeout
    pub fn navigation_timeout_ms(mut self, ms: u64) -> Self {
        self.options.navigation_timeout_ms = ms;
        self
    }

    /// Set wait-selector timeout
    pub fn wait_timeout_ms(mut self, ms: u64) -> Self {
        self.options.wait_timeout_ms = ms;
        self
    }

    /// Set Chrome path
    pub fn executable_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.executable_path = Some(path.into());
        self
    }

    /// Add an environment variable for the browser process
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.env.push((key.into(), value.into()));
        self
    }

    /// Add extra Chrome argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.options.extra_args.push(arg.into());
        self
    }

    /// Build the options
    pub fn build(self) -> DriverOptions {
        self.options
    }
}

struct RunningBrowser {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    observer: JoinHandle<()>,
    // keeps the crash channel open for the lifetime of the process
    _crash: CrashSignal,
    crashed: watch::Receiver<Option<String>>,
}

/// Headless browser driver
pub struct BrowserDriver {
    options: DriverOptions,
    logger: SharedLogger,
    running: Option<RunningBrowser>,
}

impl fmt::Debug for BrowserDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserDriver")
            .field("options", &self.options)
            .field("logger", &LoggerDebug)
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl BrowserDriver {
    /// Create a driver; nothing is launched until [`start`](Self::start)
    pub fn new(options: DriverOptions) -> Self {
        Self::with_logger(options, default_logger())
    }

    /// Create a driver routing page messages to `logger`
    pub fn with_logger(options: DriverOptions, logger: SharedLogger) -> Self {
        Self {
            options,
            logger,
            running: None,
        }
    }

    /// Get the driver options
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Whether a browser process is attached
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Crash reason, if the browser went away
    pub fn crash_reason(&self) -> Option<String> {
        self.running
            .as_ref()
            .and_then(|r| r.crashed.borrow().clone())
    }

    /// Launch the browser and open the capture page
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::usage("browser driver is already started"));
        }

        info!(
            "Launching browser: visible={}, devtools={}",
            self.options.visible, self.options.devtools
        );

        let config = self.options.to_cdp_config()?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let (crash_tx, crashed) = watch::channel(None);
        let crash: CrashSignal = Arc::new(crash_tx);

        let handler_crash = crash.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
            signal_crash(&handler_crash, "browser connection closed");
            debug!("Browser handler finished");
        });

        let (page, observer) = match Self::open_page(&browser, self.logger.clone(), crash.clone()).await {
            Ok(opened) => opened,
            Err(e) => {
                if browser.close().await.is_err() {
                    let _ = browser.kill().await;
                }
                handler.abort();
                return Err(e);
            }
        };

        self.running = Some(RunningBrowser {
            browser,
            page,
            handler,
            observer,
            _crash: crash,
            crashed,
        });

        info!("Browser launched successfully");
        Ok(())
    }

    async fn open_page(
        browser: &Browser,
        logger: SharedLogger,
        crash: CrashSignal,
    ) -> Result<(Page, JoinHandle<()>)> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;
        let observer = events::observe(&page, logger, crash).await?;
        Ok((page, observer))
    }

    /// Terminate the browser process
    #[instrument(skip(self))]
    pub async fn end(&mut self) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            return Err(Error::usage("browser driver is not started"));
        };

        info!("Closing browser");
        running.observer.abort();

        if let Err(e) = running.browser.close().await {
            warn!("Browser did not close cleanly ({}); killing it", e);
            let _ = running.browser.kill().await;
        }
        let _ = running.browser.wait().await;

        let _ = tokio::time::timeout(Duration::from_secs(5), running.handler).await;

        info!("Browser closed");
        Ok(())
    }

    fn running(&self, config: &TemplateConfig) -> Result<&RunningBrowser> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| Error::usage("browser driver is not started"))?;
        if config.wait_selector.trim().is_empty() {
            return Err(Error::usage("waitSelector must be set before rendering"));
        }
        Ok(running)
    }

    /// Navigate to `url` and capture the capture-selector region to `output`
    #[instrument(skip(self, config), fields(url = %url))]
    pub async fn render_image(
        &mut self,
        url: &str,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult> {
        let running = self.running(config)?;
        let page = &running.page;
        let options = &self.options;
        let format = CaptureFormat::image_from_path(output);

        let (size, clip) = capture_to_file(running.crashed.clone(), output, async {
            Self::load(page, url, config, options).await?;

            let size = PageCapture::document_size(page).await?;
            PageCapture::resize_viewport(page, size).await?;
            let clip = PageCapture::element_rect(page, config.effective_capture_selector()).await?;

            let data = PageCapture::screenshot(page, format, clip).await?;
            Ok::<_, Error>((data, clip))
        })
        .await?;

        Ok(CaptureResult {
            path: output.to_path_buf(),
            format,
            width: Some(clip.width),
            height: Some(clip.height),
            size,
        })
    }

    /// Navigate to `url` and print the whole document to `output`
    #[instrument(skip(self, config), fields(url = %url))]
    pub async fn render_pdf(
        &mut self,
        url: &str,
        output: &Path,
        config: &TemplateConfig,
    ) -> Result<CaptureResult> {
        let running = self.running(config)?;
        let page = &running.page;
        let options = &self.options;

        let (size, ()) = capture_to_file(running.crashed.clone(), output, async {
            Self::load(page, url, config, options).await?;

            let size = PageCapture::document_size(page).await?;
            PageCapture::resize_viewport(page, size).await?;

            let data = PageCapture::pdf(page).await?;
            Ok::<_, Error>((data, ()))
        })
        .await?;

        Ok(CaptureResult {
            path: output.to_path_buf(),
            format: CaptureFormat::Pdf,
            width: None,
            height: None,
            size,
        })
    }

    /// Reset the viewport, navigate and wait for the wait selector
    async fn load(
        page: &Page,
        url: &str,
        config: &TemplateConfig,
        options: &DriverOptions,
    ) -> Result<()> {
        PageCapture::reset_viewport(page).await?;
        PageNavigator::goto(page, url, options.navigation_timeout_ms).await?;
        PageNavigator::wait_for_selector(page, &config.wait_selector, options.wait_timeout_ms)
            .await
    }
}

/// Run `capture` under the crash guard, then write its bytes to `output`
///
/// The write happens after the guard so a crash can't interrupt it halfway.
async fn capture_to_file<T>(
    crashed: watch::Receiver<Option<String>>,
    output: &Path,
    capture: impl Future<Output = Result<(Vec<u8>, T)>>,
) -> Result<(usize, T)> {
    let (data, extra) = guarded(crashed, capture).await?;
    write_output(output, &data).await?;
    Ok((data.len(), extra))
}

/// Run `work` unless the browser crashes first
async fn guarded<T>(
    mut crashed: watch::Receiver<Option<String>>,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    if let Some(reason) = crashed.borrow().clone() {
        return Err(BrowserError::Crashed(reason).into());
    }

    tokio::select! {
        result = work => result,
        reason = crashed.wait_for(Option::is_some) => {
            let reason = match reason {
                Ok(value) => value.clone().unwrap_or_default(),
                Err(_) => "browser event channel closed".to_string(),
            };
            Err(BrowserError::Crashed(reason).into())
        }
    }
}
