//! Capture Template CLI
//!
//! Renders one template directory to an image or a PDF.

use anyhow::{bail, Context};
use capture_template::browser::CaptureResult;
use capture_template::{capture_image, capture_pdf, CaptureOptions, DriverOptions};
use clap::{Parser, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Output kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    /// Cropped screenshot; format follows the output extension
    Image,
    /// Landscape PDF of the whole page
    Pdf,
}

/// Capture Template
#[derive(Parser, Debug)]
#[command(name = "capture-template")]
#[command(version)]
#[command(about = "Render a data-driven web template to an image or PDF")]
struct Args {
    /// What to produce
    #[arg(value_enum)]
    kind: Kind,

    /// Template directory (must contain template.json)
    template_dir: PathBuf,

    /// Output file
    output: PathBuf,

    /// JSON file with the template data
    #[arg(short, long, conflicts_with = "data_json")]
    data: Option<PathBuf>,

    /// Inline JSON template data
    #[arg(long)]
    data_json: Option<String>,

    /// Asset server port (0 = any free port)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Show the browser window
    #[arg(long)]
    show: bool,

    /// Open devtools for the capture page
    #[arg(long)]
    devtools: bool,

    /// Navigation timeout in milliseconds
    #[arg(long, default_value = "30000")]
    navigation_timeout: u64,

    /// Wait-selector timeout in milliseconds
    #[arg(long, default_value = "30000")]
    wait_timeout: u64,

    /// Path to Chrome/Chromium executable
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Extra browser environment variable (KEY=VALUE, repeatable)
    #[arg(long = "env", value_parser = parse_env)]
    env: Vec<(String, String)>,

    /// Disable the Chromium sandbox
    #[arg(long)]
    no_sandbox: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}

fn load_data(args: &Args) -> anyhow::Result<Value> {
    if let Some(path) = &args.data {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading data file {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("parsing data file {}", path.display()));
    }
    if let Some(raw) = &args.data_json {
        return serde_json::from_str(raw).context("parsing --data-json");
    }
    Ok(Value::Object(Default::default()))
}

fn driver_options(args: &Args) -> DriverOptions {
    let mut builder = DriverOptions::builder()
        .visible(args.show)
        .devtools(args.devtools)
        .sandbox(!args.no_sandbox)
        .navigation_timeout_ms(args.navigation_timeout)
        .wait_timeout_ms(args.wait_timeout);

    if let Some(path) = &args.chrome_path {
        builder = builder.executable_path(path);
    }
    for (key, value) in &args.env {
        builder = builder.env(key, value);
    }
    builder.build()
}

/// Warning text when the output name doesn't say what was written
fn extension_mismatch(result: &CaptureResult) -> Option<String> {
    let actual = result
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let expected = result.extension();
    match actual.as_deref() {
        Some(ext) if ext == expected => None,
        Some("jpeg") if expected == "jpg" => None,
        Some(ext) => Some(format!(
            "{} holds {} data but is named .{}",
            result.path.display(),
            result.mime_type(),
            ext
        )),
        None => Some(format!(
            "{} has no extension; it holds {} data (.{})",
            result.path.display(),
            result.mime_type(),
            expected
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    if !args.template_dir.is_dir() {
        bail!("template directory {} does not exist", args.template_dir.display());
    }

    let data = load_data(&args)?;
    let options = CaptureOptions {
        driver: driver_options(&args),
        port: args.port,
        ..CaptureOptions::default()
    };

    let result = match args.kind {
        Kind::Image => capture_image(&args.template_dir, &data, &args.output, &options).await,
        Kind::Pdf => capture_pdf(&args.template_dir, &data, &args.output, &options).await,
    }
    .with_context(|| format!("capturing {}", args.template_dir.display()))?;

    if let Some(warning) = extension_mismatch(&result) {
        tracing::warn!("{}", warning);
    }
    match (result.width, result.height) {
        (Some(width), Some(height)) => tracing::info!(
            "Wrote {} ({}, {}x{}, {} bytes)",
            result.path.display(),
            result.mime_type(),
            width,
            height,
            result.size
        ),
        _ => tracing::info!(
            "Wrote {} ({}, {} bytes)",
            result.path.display(),
            result.mime_type(),
            result.size
        ),
    }

    Ok(())
}
