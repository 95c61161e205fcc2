//! Template configuration loading
//!
//! Each template directory carries a `template.json` describing when the page
//! is ready and what to crop:
//!
//! ```json
//! { "waitSelector": "#chart", "captureSelector": "#chart .plot" }
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// File name of the configuration inside a template directory
pub const CONFIG_FILE_NAME: &str = "template.json";

/// Validated template configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    /// Selector that must exist before any capture step runs
    pub wait_selector: String,
    /// Selector whose bounding box is the image crop region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_selector: Option<String>,
}

impl TemplateConfig {
    /// Create a config that waits for and crops to `wait_selector`
    pub fn new<S: Into<String>>(wait_selector: S) -> Self {
        Self {
            wait_selector: wait_selector.into(),
            capture_selector: None,
        }
    }

    /// Set the capture selector
    pub fn with_capture_selector<S: Into<String>>(mut self, selector: S) -> Self {
        self.capture_selector = Some(selector.into());
        self
    }

    /// Selector used for the image crop region
    pub fn effective_capture_selector(&self) -> &str {
        self.capture_selector
            .as_deref()
            .unwrap_or(&self.wait_selector)
    }

    /// Load and validate `template.json` from a template directory
    pub async fn load(template_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = template_dir.as_ref().join(CONFIG_FILE_NAME);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::NotFound {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let config = Self::from_json(&raw)?;
        debug!(path = %path.display(), wait_selector = %config.wait_selector, "Loaded template config");
        Ok(config)
    }

    /// Parse and validate a configuration document
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ConfigError::Invalid(format!("malformed JSON: {}", e)))?;
        Self::from_value(&value)
    }

    /// Validate an already-parsed configuration object
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::Invalid("expected a JSON object".to_string()))?;

        let wait_selector = match object.get("waitSelector") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) => {
                return Err(ConfigError::Invalid(
                    "waitSelector must not be empty".to_string(),
                ))
            }
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "waitSelector must be a string, got {}",
                    json_type(other)
                )))
            }
            None => return Err(ConfigError::Invalid("waitSelector is required".to_string())),
        };

        let capture_selector = match object.get("captureSelector") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::String(_)) => {
                return Err(ConfigError::Invalid(
                    "captureSelector must not be empty".to_string(),
                ))
            }
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "captureSelector must be a string, got {}",
                    json_type(other)
                )))
            }
        };

        Ok(Self {
            wait_selector,
            capture_selector,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
