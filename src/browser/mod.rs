//! Browser capture driver
//!
//! This module drives headless Chromium through ChromiumOxide: lifecycle and
//! observation channels, navigation with bounded waits, and the two capture
//! algorithms.

pub mod capture;
pub mod controller;
pub mod events;
pub mod navigation;

pub use capture::{
    pdf_params, CaptureFormat, CaptureResult, ClipRect, PageCapture, PageSize,
    PDF_PAGE_HEIGHT_MICRONS, PDF_PAGE_WIDTH_MICRONS,
};
pub use controller::{BrowserDriver, DriverOptions, DriverOptionsBuilder};
pub use events::{ConsoleLevel, LoadFailure};
pub use navigation::{PageNavigator, UrlValidator};
