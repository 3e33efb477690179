//! Viewer configuration loading.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use smol_str::SmolStr;

use crate::error::DisplayError;
use crate::source::SourceDriverRegistry;

/// Environment variable extending the display search path.
pub const DISPLAY_PATH_ENV: &str = "SIGHTLINE_DISPLAY_PATH";

pub const DEFAULT_CAPACITY: usize = 4096;
pub const DEFAULT_TEARDOWN_DRAIN_MS: u64 = 200;
pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub registry: RegistryConfig,
    pub display: DisplayConfig,
    pub source: SourceConfig,
    pub log_level: SmolStr,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Maximum number of live slots.
    pub capacity: usize,
    /// Delay between requesting teardown and freeing slot state.
    pub teardown_drain: Duration,
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub search_path: Vec<PathBuf>,
    /// Maximum include nesting.
    pub max_depth: usize,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub driver: SmolStr,
    pub params: toml::Value,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            display: DisplayConfig::default(),
            source: SourceConfig::default(),
            log_level: SmolStr::new("info"),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            teardown_drain: Duration::from_millis(DEFAULT_TEARDOWN_DRAIN_MS),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            search_path: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            driver: SmolStr::new("loopback"),
            params: toml::Value::Table(toml::map::Map::new()),
        }
    }
}

impl ViewerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DisplayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            DisplayError::InvalidConfig(format!("{}: {err}", path.display()).into())
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, DisplayError> {
        let raw: ViewerToml = toml::from_str(text)
            .map_err(|err| DisplayError::InvalidConfig(format!("viewer.toml: {err}").into()))?;
        raw.into_config()
    }

    /// Appends the directories named by [`DISPLAY_PATH_ENV`] to the search path.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(DISPLAY_PATH_ENV) {
            self.display.search_path.extend(split_search_path(&value));
        }
    }
}

pub(crate) fn split_search_path(value: &str) -> impl Iterator<Item = PathBuf> + '_ {
    value
        .split([':', ';'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Default, Deserialize)]
struct ViewerToml {
    registry: Option<RegistrySection>,
    display: Option<DisplaySection>,
    source: Option<SourceSection>,
    log: Option<LogSection>,
}

#[derive(Debug, Deserialize)]
struct RegistrySection {
    capacity: Option<usize>,
    teardown_drain_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DisplaySection {
    search_path: Option<Vec<String>>,
    max_depth: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SourceSection {
    driver: Option<String>,
    params: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct LogSection {
    level: Option<String>,
}

impl ViewerToml {
    fn into_config(self) -> Result<ViewerConfig, DisplayError> {
        let mut config = ViewerConfig::default();
        if let Some(registry) = self.registry {
            if let Some(capacity) = registry.capacity {
                if capacity == 0 {
                    return Err(DisplayError::InvalidConfig(
                        "registry.capacity must be greater than zero".into(),
                    ));
                }
                config.registry.capacity = capacity;
            }
            if let Some(drain) = registry.teardown_drain_ms {
                config.registry.teardown_drain = Duration::from_millis(drain);
            }
        }
        if let Some(display) = self.display {
            if let Some(paths) = display.search_path {
                config.display.search_path = paths.into_iter().map(PathBuf::from).collect();
            }
            if let Some(depth) = display.max_depth {
                if depth == 0 {
                    return Err(DisplayError::InvalidConfig(
                        "display.max_depth must be greater than zero".into(),
                    ));
                }
                config.display.max_depth = depth;
            }
        }
        if let Some(source) = self.source {
            if let Some(driver) = source.driver {
                if driver.trim().is_empty() {
                    return Err(DisplayError::InvalidConfig(
                        "source.driver must not be empty".into(),
                    ));
                }
                config.source.driver = SmolStr::new(driver.trim());
            }
            if let Some(params) = source.params {
                if !params.is_table() {
                    return Err(DisplayError::InvalidConfig(
                        "source.params must be a table".into(),
                    ));
                }
                config.source.params = params;
            }
        }
        SourceDriverRegistry::default_registry()
            .validate(&config.source.driver, &config.source.params)?;
        if let Some(level) = self.log.and_then(|log| log.level) {
            config.log_level = parse_log_level(&level)?;
        }
        Ok(config)
    }
}

fn parse_log_level(text: &str) -> Result<SmolStr, DisplayError> {
    let level = text.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(SmolStr::new(level)),
        _ => Err(DisplayError::InvalidConfig(
            format!("invalid log.level '{text}'").into(),
        )),
    }
}
