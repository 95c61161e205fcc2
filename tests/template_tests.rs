//! Template loading tests
//!
//! Exercise `DirectoryTemplate` and `TemplateConfig` against real directories.

use capture_template::error::{ConfigError, TemplateError};
use capture_template::template::{DirectoryTemplate, TemplateConfig, TemplateFile, TemplateSource};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/hello")
}

fn expand_text(template: &DirectoryTemplate, path: &str) -> String {
    let file = template.find(path).unwrap();
    String::from_utf8(template.expand(&file).unwrap()).unwrap()
}

#[tokio::test]
async fn test_fixture_tree_excludes_config() {
    let template = DirectoryTemplate::load(fixture(), json!({})).await.unwrap();

    let paths: Vec<&str> = template.paths().collect();
    assert_eq!(paths, vec!["index.html", "js/chart.js", "style.css"]);
    assert!(template.find("template.json").is_none());
    assert_eq!(template.root(), fixture().as_path());
}

#[tokio::test]
async fn test_fixture_expansion() {
    let data = json!({"msg": "Hello computer", "color": "blue"});
    let template = DirectoryTemplate::load(fixture(), data.clone()).await.unwrap();

    let index = expand_text(&template, "index.html");
    assert!(index.contains("<title>Hello computer</title>"));
    assert!(index.contains(&format!("window.TEMPLATE_DATA = {};", data)));

    let css = expand_text(&template, "style.css");
    assert!(css.contains("background: blue;"));

    // no placeholders: passes through unchanged
    let js = expand_text(&template, "js/chart.js");
    assert!(js.starts_with("fetch(\"/__data\")"));
}

#[tokio::test]
async fn test_fixture_config() {
    let config = TemplateConfig::load(fixture()).await.unwrap();
    assert_eq!(config, TemplateConfig::new("#chart"));
    assert_eq!(config.effective_capture_selector(), "#chart");
}

#[tokio::test]
async fn test_binary_files_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let png = [0x89, b'P', b'N', b'G', b'{', b'{', b' ', b'x', b' ', b'}', b'}'];
    std::fs::create_dir(dir.path().join("img")).unwrap();
    std::fs::write(dir.path().join("img/logo.png"), png).unwrap();

    let template = DirectoryTemplate::load(dir.path(), json!({"x": "nope"}))
        .await
        .unwrap();
    let file = template.find("img/logo.png").unwrap();
    assert_eq!(template.expand(&file).unwrap(), png.to_vec());
}

#[tokio::test]
async fn test_load_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");

    let err = DirectoryTemplate::load(&missing, json!({})).await.unwrap_err();
    assert!(matches!(err, TemplateError::NotADirectory(path) if path == missing));
}

#[tokio::test]
async fn test_expand_unknown_file() {
    let template = DirectoryTemplate::load(fixture(), json!({})).await.unwrap();
    let err = template
        .expand(&TemplateFile::new("missing.html"))
        .unwrap_err();
    assert!(matches!(err, TemplateError::NotFound(path) if path == "missing.html"));
}

#[tokio::test]
async fn test_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        TemplateConfig::load(dir.path()).await,
        Err(ConfigError::NotFound { .. })
    ));

    std::fs::write(dir.path().join("template.json"), "{ not json").unwrap();
    assert!(matches!(
        TemplateConfig::load(dir.path()).await,
        Err(ConfigError::Invalid(_))
    ));

    std::fs::write(dir.path().join("template.json"), r#"{"waitSelector": 3}"#).unwrap();
    let err = TemplateConfig::load(dir.path()).await.unwrap_err();
    assert!(err.to_string().contains("got number"));
}
