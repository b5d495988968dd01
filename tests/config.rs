mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use ir_datasets::config::{ConfigLoader, DownloadsLocation};
use ir_datasets::error::IrdsError;

use common::utf8_tempdir;

#[test]
fn config_file_overrides_defaults() {
    let (_temp, root) = utf8_tempdir();
    let path = root.join("irds.json");
    let cache_root = root.join("cache");
    std::fs::write(
        path.as_std_path(),
        format!(
            r#"{{
                "schema_version": 1,
                "cache_root": "{cache_root}",
                "downloads": "https://example.org/downloads.json",
                "fetch": {{"max_attempts": 5, "base_delay_ms": 10}},
                "cache": {{"lock_timeout_secs": 60, "max_failures": 0, "wait_timeout_secs": 5}}
            }}"#
        ),
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.as_str())).unwrap();
    assert_eq!(resolved.cache_root, cache_root);
    assert_eq!(
        resolved.downloads,
        DownloadsLocation::Url("https://example.org/downloads.json".to_string())
    );
    assert_eq!(resolved.fetch.max_attempts, 5);
    assert_eq!(resolved.fetch.base_delay, Duration::from_millis(10));
    assert_eq!(resolved.fetch.timeout, Duration::from_secs(600));
    assert_eq!(resolved.cache.lock_timeout, Duration::from_secs(60));
    assert_eq!(resolved.cache.poll_interval, Duration::from_millis(250));
    assert_eq!(resolved.cache.wait_timeout, Some(Duration::from_secs(5)));
    // At least one attempt is always allowed before escalating.
    assert_eq!(resolved.cache.max_failures, 1);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let (_temp, root) = utf8_tempdir();
    let err = ConfigLoader::resolve(Some(root.join("absent.json").as_str())).unwrap_err();
    assert_matches!(err, IrdsError::ConfigRead(_));
}

#[test]
fn invalid_config_is_a_parse_error() {
    let (_temp, root) = utf8_tempdir();
    let path = root.join("irds.json");
    std::fs::write(path.as_std_path(), "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(Some(path.as_str())),
        Err(IrdsError::ConfigParse(_))
    );
}

#[test]
fn downloads_location_distinguishes_urls_from_paths() {
    assert_eq!(
        DownloadsLocation::parse(" http://mirror/downloads.json "),
        DownloadsLocation::Url("http://mirror/downloads.json".to_string())
    );
    assert_matches!(
        DownloadsLocation::parse("/etc/irds/downloads.json"),
        DownloadsLocation::File(path) if path.as_str() == "/etc/irds/downloads.json"
    );
}
