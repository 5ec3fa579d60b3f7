use super::{apply_env, apply_file, load_settings, Settings};

use std::{
    collections::HashMap,
    env, fs,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        "fetch_timeout_ms = 250\nmax_items = 12\nlog_filter = \"debug\"\n",
    )
    .expect("apply");

    assert_eq!(settings.fetch_timeout_ms, 250);
    assert_eq!(settings.max_items, Some(12));
    assert_eq!(settings.log_filter, "debug");
    assert_eq!(
        settings.controller_settings().fetch_timeout,
        Duration::from_millis(250)
    );
}

#[test]
fn rejects_wrongly_typed_values() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "max_items = \"many\"").is_err());
    assert!(apply_file(&mut settings, "fetch_timeout_ms = -5").is_err());
}

#[test]
fn env_overrides_file_and_app_prefix_wins() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("FORM_TOOLS_FETCH_TIMEOUT_MS", "100"),
        ("APP__FETCH_TIMEOUT_MS", "200"),
        ("FORM_TOOLS_MAX_ITEMS", "not-a-number"),
        ("APP__LOG_FILTER", "form_core=trace"),
    ]);
    let mut settings = Settings::default();
    apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.fetch_timeout_ms, 200);
    assert_eq!(settings.max_items, None);
    assert_eq!(settings.log_filter, "form_core=trace");
}

#[test]
fn missing_explicit_config_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("form_tools_missing_{suffix}.toml"));

    assert!(load_settings(Some(&path)).is_err());
}

#[test]
fn explicit_config_file_is_loaded() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("form_tools_config_{suffix}.toml"));
    fs::write(&path, "max_items = 3\n").expect("write config");

    let settings = load_settings(Some(&path)).expect("load");
    assert!(settings.max_items.is_some());

    fs::remove_file(path).expect("cleanup");
}
