use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info";
const DEFAULT_LOG_FILE: &str = "bizpulse.logs.jsonl";

/// Where logs go and what passes the filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// `EnvFilter` directive, already validated.
    pub filter: String,
    /// JSON-lines file; `None` means compact console output on stderr.
    pub json_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_FILTER.to_string(),
            json_path: None,
        }
    }
}

impl LogSettings {
    /// Reads the environment:
    /// - `BIZPULSE_OBSERVABILITY_ENABLED` / `BIZPULSE_OBSERVABILITY`: on/off switch (default on).
    /// - `BIZPULSE_LOG_LEVEL`, then `RUST_LOG`: filter directive.
    /// - `BIZPULSE_JSON_LOG_PATH`: write JSON lines to this file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ["BIZPULSE_OBSERVABILITY_ENABLED", "BIZPULSE_OBSERVABILITY"]
            .into_iter()
            .find_map(|key| lookup(key))
            .map(|value| parse_bool_env(&value).unwrap_or(true))
            .unwrap_or(true);
        let filter = [lookup("BIZPULSE_LOG_LEVEL"), lookup("RUST_LOG")]
            .into_iter()
            .flatten()
            .find(|directive| is_valid_filter(directive))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let json_path = lookup("BIZPULSE_JSON_LOG_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self {
            enabled,
            filter,
            json_path,
        }
    }

    /// Overrides the filter with a command-line level. Invalid directives
    /// are ignored with the environment value kept.
    pub fn level(mut self, level: Option<&str>) -> Self {
        if let Some(level) = level.map(str::trim).filter(|l| is_valid_filter(l)) {
            self.filter = level.to_string();
        }
        self
    }

    pub fn json_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.json_path = path;
        }
        self
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn is_valid_filter(directive: &str) -> bool {
    !directive.trim().is_empty() && EnvFilter::try_new(directive).is_ok()
}

/// Installs the global subscriber from the environment, once per process.
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

/// Installs the global subscriber once per process. Later calls are no-ops.
pub fn init_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }

        let env_filter = EnvFilter::new(&settings.filter);
        match &settings.json_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                // stdout belongs to the CLI's own output.
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn bool_flags() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn defaults_to_enabled_console_info() {
        assert_eq!(LogSettings::from_lookup(|_| None), LogSettings::default());
        let off = LogSettings::from_lookup(lookup(&[("BIZPULSE_OBSERVABILITY", "0")]));
        assert!(!off.enabled);
        let garbage =
            LogSettings::from_lookup(lookup(&[("BIZPULSE_OBSERVABILITY_ENABLED", "garbage")]));
        assert!(garbage.enabled);
    }

    #[test]
    fn filter_precedence_skips_invalid_directives() {
        let settings = LogSettings::from_lookup(lookup(&[
            ("BIZPULSE_LOG_LEVEL", "bizpulse_realtime=debug"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(settings.filter, "bizpulse_realtime=debug");

        let settings = LogSettings::from_lookup(lookup(&[
            ("BIZPULSE_LOG_LEVEL", "app=loud"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(settings.filter, "warn");

        assert_eq!(settings.clone().level(Some("trace")).filter, "trace");
        assert_eq!(settings.level(Some("app=loud")).filter, "warn");
    }

    #[test]
    fn json_path_from_env_or_flag() {
        let settings =
            LogSettings::from_lookup(lookup(&[("BIZPULSE_JSON_LOG_PATH", "logs/b.jsonl")]));
        assert_eq!(settings.json_path, Some(PathBuf::from("logs/b.jsonl")));
        let settings = settings.json_path(Some(PathBuf::from("other.jsonl")));
        assert_eq!(settings.json_path, Some(PathBuf::from("other.jsonl")));
        assert_eq!(
            LogSettings::default().json_path(None).json_path,
            None
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_with(LogSettings {
            enabled: false,
            ..LogSettings::default()
        });
        init_observability();
    }
}
