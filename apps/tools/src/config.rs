use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use form_core::ControllerSettings;

pub const DEFAULT_CONFIG_FILE: &str = "form_tools.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub fetch_timeout_ms: u64,
    pub max_items: Option<usize>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            max_items: None,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            max_items: self.max_items,
        }
    }
}

/// Defaults, then the config file, then environment variables.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config '{}'", path.display()))?;
            apply_file(&mut settings, &raw)
                .with_context(|| format!("invalid config '{}'", path.display()))?;
        }
        None => {
            if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
                apply_file(&mut settings, &raw)
                    .with_context(|| format!("invalid config '{DEFAULT_CONFIG_FILE}'"))?;
            }
        }
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let table: toml::Table = toml::from_str(raw)?;

    if let Some(v) = table.get("fetch_timeout_ms") {
        let v = v
            .as_integer()
            .context("fetch_timeout_ms must be an integer")?;
        settings.fetch_timeout_ms =
            u64::try_from(v).context("fetch_timeout_ms must not be negative")?;
    }
    if let Some(v) = table.get("max_items") {
        let v = v.as_integer().context("max_items must be an integer")?;
        settings.max_items = Some(usize::try_from(v).context("max_items must not be negative")?);
    }
    if let Some(v) = table.get("log_filter") {
        settings.log_filter = v
            .as_str()
            .context("log_filter must be a string")?
            .to_string();
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    for key in ["FORM_TOOLS_FETCH_TIMEOUT_MS", "APP__FETCH_TIMEOUT_MS"] {
        if let Some(parsed) = lookup(key).and_then(|v| v.parse::<u64>().ok()) {
            settings.fetch_timeout_ms = parsed;
        }
    }

    for key in ["FORM_TOOLS_MAX_ITEMS", "APP__MAX_ITEMS"] {
        if let Some(parsed) = lookup(key).and_then(|v| v.parse::<usize>().ok()) {
            settings.max_items = Some(parsed);
        }
    }

    if let Some(v) = lookup("RUST_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
