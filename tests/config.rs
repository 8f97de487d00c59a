use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use fingrid_explorer::config::ConfigLoader;
use fingrid_explorer::domain::Locale;
use fingrid_explorer::error::ExplorerError;
use fingrid_explorer::labels::FallbackPolicy;

#[test]
fn explicit_config_file_is_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("fgx.json");
    fs::write(
        &path,
        r#"{
            "api_key": "my-key",
            "locale": "en",
            "retry_delay_ms": 10,
            "throttle_ms": 0,
            "cache_entries": 5,
            "labels": {"AV02": "Wind", "XX01": "Custom"},
            "label_policy": "strict"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.api_key.as_deref(), Some("my-key"));
    assert_eq!(resolved.locale, Locale::En);
    assert_eq!(resolved.retry_delay, Duration::from_millis(10));
    assert_eq!(resolved.throttle_interval, Duration::ZERO);
    assert_eq!(resolved.cache_entries, 5);
    assert_eq!(resolved.label_policy, FallbackPolicy::Strict);

    let labeler = resolved.labeler();
    assert_eq!(labeler.label("AV02").unwrap(), "Wind");
    assert_eq!(labeler.label("XX01").unwrap(), "Custom");
    assert_eq!(labeler.label("AV06").unwrap(), "Solar power");
    assert_matches!(labeler.label("ZZ99"), Err(ExplorerError::MappingGap(_)));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(ExplorerError::ConfigRead(_))
    );
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("fgx.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(ExplorerError::ConfigParse(_))
    );
}
