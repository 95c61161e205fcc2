//! Capture Template - Render Data-Driven Web Templates to Images and PDFs
//!
//! This crate expands a directory of web assets with caller data, serves the
//! result from a short-lived local HTTP server and captures it with headless
//! Chromium.
//!
//! # Features
//!
//! - **Template Expansion**: `{{ path }}` placeholders filled from JSON data
//! - **Ephemeral Asset Server**: per-template HTTP server on `127.0.0.1`
//! - **Browser Capture**: cropped screenshots and landscape PDFs via ChromiumOxide (CDP)
//! - **Session Reuse**: one browser process for many templates and renders
//!
//! # Architecture
//!
//! ```text
//! Caller ──▶ CaptureSession ──▶ BrowserDriver (CDP) ──▶ Chromium
//!                 │                                        │
//!                 ▼                                        │ GET /, /__data
//!           ┌─────────────┐     ┌──────────────────┐       │
//!           │ AssetServer │◀────│ TemplateSource   │◀──────┘
//!           └─────────────┘     │ (DirectoryTemplate)
//!                               └──────────────────┘
//!                 │
//!                 ▼
//!        PNG / JPEG / WebP crop, A4 landscape PDF
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use capture_template::{capture_image, CaptureOptions};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let data = json!({ "msg": "Hello computer", "color": "blue" });
//!     let result = capture_image("templates/chart", &data, "out/chart.png", &CaptureOptions::default()).await?;
//!
//!     println!("Captured {}x{}", result.width.unwrap_or(0), result.height.unwrap_or(0));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod browser;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod server;
pub mod template;

// Re-exports for convenience
pub use api::{capture_image, capture_pdf, CaptureOptions};
pub use browser::{BrowserDriver, CaptureFormat, CaptureResult, DriverOptions};
pub use error::{Error, Result};
pub use logger::{CaptureLogger, SharedLogger, TracingLogger};
pub use orchestrator::{CaptureDriver, CaptureSession, SessionState};
pub use server::AssetServer;
pub use template::{DirectoryTemplate, TemplateConfig, TemplateFile, TemplateSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
