//! Page capture functionality
//!
//! Measurement scripts, viewport sizing, cropped screenshots and the fixed
//! geometry PDF export. Output files are written through a `.partial`
//! sibling and renamed into place, so a failed capture never leaves a
//! truncated file at the requested path.

use crate::error::{CaptureError, Error, Result};
use chromiumoxide::cdp::browser_protocol::emulation::{
    ClearDeviceMetricsOverrideParams, SetDeviceMetricsOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, PrintToPdfParams, Viewport as ClipViewport,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// PDF page width in micrometers (A4 landscape)
pub const PDF_PAGE_WIDTH_MICRONS: u32 = 297_000;

/// PDF page height in micrometers (A4 landscape)
pub const PDF_PAGE_HEIGHT_MICRONS: u32 = 210_000;

const MICRONS_PER_INCH: f64 = 25_400.0;

/// Reads the full scroll size of the document body
const DOCUMENT_SIZE_SCRIPT: &str = r#"
    (() => {
        const body = document.body;
        if (!body) {
            return { found: false };
        }
        return {
            found: true,
            value: { width: body.scrollWidth, height: body.scrollHeight }
        };
    })()
"#;

/// Format for captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    /// PNG screenshot
    #[default]
    Png,
    /// JPEG screenshot
    Jpeg,
    /// WebP screenshot
    Webp,
    /// PDF document
    Pdf,
}

impl CaptureFormat {
    /// Raster format implied by an output file extension (PNG when unknown)
    pub fn image_from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => CaptureFormat::Jpeg,
            Some("webp") => CaptureFormat::Webp,
            _ => CaptureFormat::Png,
        }
    }

    fn screenshot_format(self) -> CaptureScreenshotFormat {
        match self {
            CaptureFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
            CaptureFormat::Webp => CaptureScreenshotFormat::Webp,
            _ => CaptureScreenshotFormat::Png,
        }
    }
}

/// Scroll size of the document body, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSize {
    /// Scroll width
    pub width: u32,
    /// Scroll height
    pub height: u32,
}

/// Crop rectangle, each edge rounded up to a whole pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipRect {
    /// Left edge
    pub left: i64,
    /// Top edge
    pub top: i64,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl ClipRect {
    fn to_viewport(self) -> ClipViewport {
        ClipViewport {
            x: self.left as f64,
            y: self.top as f64,
            width: self.width as f64,
            height: self.height as f64,
            scale: 1.0,
        }
    }
}

/// Measurement returned by an in-page script
#[derive(Debug, Deserialize)]
struct Measured<T> {
    found: bool,
    value: Option<T>,
}

impl<T> Measured<T> {
    fn into_option(self) -> Option<T> {
        if self.found {
            self.value
        } else {
            None
        }
    }
}

/// Result of a capture operation
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Where the capture was written
    pub path: PathBuf,
    /// The format of the capture
    pub format: CaptureFormat,
    /// Width of the capture (for images)
    pub width: Option<u32>,
    /// Height of the capture (for images)
    pub height: Option<u32>,
    /// Size in bytes
    pub size: usize,
}

impl CaptureResult {
    /// Get appropriate MIME type
    pub fn mime_type(&self) -> &'static str {
        match self.format {
            CaptureFormat::Png => "image/png",
            CaptureFormat::Jpeg => "image/jpeg",
            CaptureFormat::Webp => "image/webp",
            CaptureFormat::Pdf => "application/pdf",
        }
    }

    /// Get file extension
    pub fn extension(&self) -> &'static str {
        match self.format {
            CaptureFormat::Png => "png",
            CaptureFormat::Jpeg => "jpg",
            CaptureFormat::Webp => "webp",
            CaptureFormat::Pdf => "pdf",
        }
    }
}

/// Print parameters for PDF output
///
/// Landscape, 297 × 210 mm, no margins. Margins belong in the page's own
/// stylesheet.
pub fn pdf_params() -> PrintToPdfParams {
    PrintToPdfParams::builder()
        .landscape(true)
        .print_background(true)
        .paper_width(PDF_PAGE_WIDTH_MICRONS as f64 / MICRONS_PER_INCH)
        .paper_height(PDF_PAGE_HEIGHT_MICRONS as f64 / MICRONS_PER_INCH)
        .margin_top(0.0)
        .margin_bottom(0.0)
        .margin_left(0.0)
        .margin_right(0.0)
        .build()
}

/// Script measuring the element matched by `selector`
pub fn element_rect_script(selector: &str) -> String {
    // serde_json quoting keeps arbitrary selectors inert inside the script
    let selector = serde_json::Value::from(selector).to_string();
    format!(
        r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) {{
                    return {{ found: false }};
                }}
                const r = el.getBoundingClientRect();
                return {{
                    found: true,
                    value: {{
                        left: Math.ceil(r.left),
                        top: Math.ceil(r.top),
                        width: Math.ceil(r.width),
                        height: Math.ceil(r.height)
                    }}
                }};
            }})()
        "#
    )
}

/// Page capture functionality
pub struct PageCapture;

impl PageCapture {
    /// Drop any viewport override left by a previous capture
    pub async fn reset_viewport(page: &Page) -> Result<()> {
        page.execute(ClearDeviceMetricsOverrideParams::default())
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;
        Ok(())
    }

    /// Full scroll size of the document body
    pub async fn document_size(page: &Page) -> Result<PageSize> {
        let measured: Measured<PageSize> = page
            .evaluate(DOCUMENT_SIZE_SCRIPT)
            .await
            .map_err(|e| CaptureError::Measure(e.to_string()))?
            .into_value()
            .map_err(|e| CaptureError::Measure(e.to_string()))?;

        let size = measured
            .into_option()
            .ok_or_else(|| CaptureError::Measure("document has no body".to_string()))?;
        debug!("Document size: {}x{}", size.width, size.height);
        Ok(size)
    }

    /// Resize the viewport so the whole document is laid out without clipping
    pub async fn resize_viewport(page: &Page, size: PageSize) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(size.width.max(1)),
            i64::from(size.height.max(1)),
            1.0,
            false,
        );
        page.execute(params)
            .await
            .map_err(|e| CaptureError::Measure(format!("viewport resize failed: {}", e)))?;
        Ok(())
    }

    /// Bounding rectangle of the element matched by `selector`
    pub async fn element_rect(page: &Page, selector: &str) -> Result<ClipRect> {
        let measured: Measured<ClipRect> = page
            .evaluate(element_rect_script(selector).as_str())
            .await
            .map_err(|e| CaptureError::Measure(e.to_string()))?
            .into_value()
            .map_err(|e| CaptureError::Measure(e.to_string()))?;

        let rect = measured
            .into_option()
            .ok_or_else(|| CaptureError::ElementNotFound(selector.to_string()))?;
        if rect.width == 0 || rect.height == 0 {
            return Err(CaptureError::Measure(format!(
                "{} has an empty bounding box ({}x{})",
                selector, rect.width, rect.height
            ))
            .into());
        }
        debug!(?rect, "Measured {}", selector);
        Ok(rect)
    }

    /// Screenshot cropped to `clip`
    #[instrument(skip(page))]
    pub async fn screenshot(page: &Page, format: CaptureFormat, clip: ClipRect) -> Result<Vec<u8>> {
        info!("Capturing screenshot");

        let params = ScreenshotParams::builder()
            .format(format.screenshot_format())
            .clip(clip.to_viewport())
            .from_surface(true)
            .capture_beyond_viewport(true)
            .build();

        let data = page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::ScreenshotFailed(e.to_string()))?;

        debug!("Screenshot captured: {} bytes", data.len());
        Ok(data)
    }

    /// Print the whole document to PDF
    #[instrument(skip(page))]
    pub async fn pdf(page: &Page) -> Result<Vec<u8>> {
        info!("Generating PDF");

        let data = page
            .pdf(pdf_params())
            .await
            .map_err(|e| CaptureError::PdfFailed(e.to_string()))?;

        debug!("PDF generated: {} bytes", data.len());
        Ok(data)
    }
}

/// Sibling path used while an output file is being written
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `data` to `path` via a `.partial` sibling
pub async fn write_output(path: &Path, data: &[u8]) -> std::result::Result<(), CaptureError> {
    let partial = partial_path(path);
    let written = match tokio::fs::write(&partial, data).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(e) => Err(e),
    };

    written.map_err(|source| {
        let _ = std::fs::remove_file(&partial);
        CaptureError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}
