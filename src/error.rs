//! Error types for capture-template
//!
//! Every fatal failure of the capture pipeline surfaces as an [`Error`]. The
//! non-fatal categories (missing assets, in-page load failures and script
//! errors) are only ever logged and never appear here.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for capture operations
#[derive(Error, Debug)]
pub enum Error {
    /// Template configuration errors
    #[error("Template config error: {0}")]
    Config(#[from] ConfigError),

    /// Template expansion errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Operation called out of order (not started, nothing loaded, ...)
    #[error("Usage error: {0}")]
    Usage(String),

    /// Asset server errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Browser lifecycle errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Capture errors (screenshot, PDF)
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),
}

/// Template configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file is missing or cannot be read
    #[error("Config not found at {}: {reason}", path.display())]
    NotFound {
        /// Location that was checked
        path: PathBuf,
        /// Why it could not be read
        reason: String,
    },

    /// The configuration is malformed or fails validation
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Template expansion errors
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template root does not exist or is not a directory
    #[error("Template directory not found: {}", .0.display())]
    NotADirectory(PathBuf),

    /// A template file could not be read
    #[error("Failed to read {}: {source}", path.display())]
    Unreadable {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Logical path has no file in the tree
    #[error("No such template file: {0}")]
    NotFound(String),
}

/// Asset server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Could not bind the listening socket
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The server did not close cleanly
    #[error("Server shutdown failed: {0}")]
    Shutdown(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create the capture page
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// The browser process went away; the driver must be restarted
    #[error("Browser crashed: {0}")]
    Crashed(String),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),

    /// The wait selector never appeared
    #[error("Timed out after {timeout_ms}ms waiting for selector {selector:?}")]
    WaitTimeout {
        /// Selector that was awaited
        selector: String,
        /// Configured wait timeout
        timeout_ms: u64,
    },
}

/// Capture errors (screenshots, PDFs)
#[derive(Error, Debug)]
pub enum CaptureError {
    /// In-page measurement failed
    #[error("Measurement failed: {0}")]
    Measure(String),

    /// The capture selector matched nothing
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Screenshot failed
    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),

    /// PDF generation failed
    #[error("PDF generation failed: {0}")]
    PdfFailed(String),

    /// Writing the output file failed
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        /// Output path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a usage error from a string
    pub fn usage<S: Into<String>>(msg: S) -> Self {
        Error::Usage(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Whether this error invalidated the browser driver
    pub fn is_crash(&self) -> bool {
        matches!(self, Error::Browser(BrowserError::Crashed(_)))
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}
