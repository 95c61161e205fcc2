//! Property tests for request path normalization

use capture_template::server::{normalize_path, INDEX_FILE};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just(".".to_string()),
        Just("..".to_string()),
        "[a-zA-Z0-9_.-]{1,12}",
    ]
}

fn raw_path() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(segment(), 0..8),
        prop::collection::vec(prop_oneof![Just('/'), Just('\\')], 0..8),
    )
        .prop_map(|(segments, separators)| {
            let mut raw = String::from("/");
            for (i, segment) in segments.iter().enumerate() {
                raw.push_str(segment);
                raw.push(*separators.get(i).unwrap_or(&'/'));
            }
            raw
        })
}

proptest! {
    #[test]
    fn normalized_paths_never_escape(raw in raw_path()) {
        if let Some(path) = normalize_path(&raw) {
            prop_assert!(!path.split('/').any(|s| s == ".."));
            prop_assert!(!path.contains('\\'));
            prop_assert!(!path.starts_with('/'));
            prop_assert!(!path.contains("//"));
            prop_assert!(!path.is_empty());
        }
    }

    #[test]
    fn parent_segment_always_rejected(prefix in raw_path(), suffix in "[a-z]{0,8}") {
        let raw = format!("{}../{}", prefix, suffix);
        prop_assert_eq!(normalize_path(&raw), None);
    }

    #[test]
    fn normalization_is_idempotent(raw in raw_path()) {
        if let Some(path) = normalize_path(&raw) {
            prop_assert_eq!(normalize_path(&path), Some(path.clone()));
        }
    }

    #[test]
    fn separator_only_paths_are_index(separators in "[/\\\\]{1,10}") {
        prop_assert_eq!(normalize_path(&separators), Some(INDEX_FILE.to_string()));
    }
}
