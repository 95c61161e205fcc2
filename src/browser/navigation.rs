//! Page navigation functionality
//!
//! Navigation and the readiness wait are both bounded. Neither retries: a
//! timeout aborts the current render.

use crate::error::{Error, NavigationError, Result};
use chromiumoxide::Page;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Extra time granted to the CDP round trip on top of the in-page deadline
const WAIT_SLACK_MS: u64 = 1000;

/// Polling interval of the in-page selector check
const WAIT_POLL_MS: u64 = 50;

/// URL validation utilities
pub struct UrlValidator;

impl UrlValidator {
    /// Validate a URL for navigation
    pub fn validate(url: &str) -> std::result::Result<(), String> {
        if url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }

        if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
        {
            return Err(format!(
                "URL must start with http://, https://, or file://: {}",
                url
            ));
        }

        Ok(())
    }
}

/// Script resolving `true` once `selector` matches, `false` at the deadline
pub fn wait_for_selector_script(selector: &str, timeout_ms: u64) -> String {
    let selector = serde_json::Value::from(selector).to_string();
    format!(
        r#"
            new Promise((resolve, reject) => {{
                const selector = {selector};
                const deadline = Date.now() + {timeout_ms};

                function check() {{
                    try {{
                        if (document.querySelector(selector)) {{
                            resolve(true);
                        }} else if (Date.now() > deadline) {{
                            resolve(false);
                        }} else {{
                            setTimeout(check, {WAIT_POLL_MS});
                        }}
                    }} catch (e) {{
                        reject(e);
                    }}
                }}
                check();
            }})
        "#
    )
}

/// Page navigator
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate to a URL and wait for the load to finish
    #[instrument(skip(page))]
    pub async fn goto(page: &Page, url: &str, timeout_ms: u64) -> Result<()> {
        UrlValidator::validate(url).map_err(NavigationError::InvalidUrl)?;

        info!("Navigating to: {}", url);

        let timeout = Duration::from_millis(timeout_ms);
        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(timeout_ms))?
            .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;

        debug!("Navigation complete: {}", url);
        Ok(())
    }

    /// Wait for a specific element to appear
    #[instrument(skip(page))]
    pub async fn wait_for_selector(page: &Page, selector: &str, timeout_ms: u64) -> Result<()> {
        let script = wait_for_selector_script(selector, timeout_ms);
        let timed_out = || NavigationError::WaitTimeout {
            selector: selector.to_string(),
            timeout_ms,
        };

        let timeout = Duration::from_millis(timeout_ms + WAIT_SLACK_MS);
        let found: bool = tokio::time::timeout(timeout, page.evaluate(script.as_str()))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| Error::cdp(e.to_string()))?
            .into_value()
            .map_err(|e| Error::cdp(e.to_string()))?;

        if !found {
            return Err(timed_out().into());
        }

        debug!("Selector present: {}", selector);
        Ok(())
    }
}
