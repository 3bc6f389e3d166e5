//! Layered configuration for Synapsed components.
//!
//! Sources are loaded in the order they were added and deep-merged into a
//! single JSON tree; later sources override earlier ones key by key. Typed
//! sections are pulled out of the merged tree with serde.

use crate::{SynapsedError, SynapsedResult, traits::Validatable};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Trait for configuration sources
pub trait ConfigSource: Send + Sync {
    /// Load configuration from this source as a JSON object tree
    fn load(&self) -> SynapsedResult<Value>;

    /// Get the source name
    fn source_name(&self) -> &str;
}

/// Supported configuration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    fn parse(self, content: &str) -> SynapsedResult<Value> {
        match self {
            ConfigFormat::Toml => toml::from_str::<Value>(content)
                .map_err(|e| SynapsedError::config(format!("Failed to parse TOML: {e}"))),
            ConfigFormat::Json => serde_json::from_str::<Value>(content)
                .map_err(|e| SynapsedError::config(format!("Failed to parse JSON: {e}"))),
        }
    }
}

/// File-based configuration source
pub struct FileConfigSource {
    path: PathBuf,
    name: String,
    format: ConfigFormat,
    required: bool,
}

impl FileConfigSource {
    /// Create a new file config source
    pub fn new<P: AsRef<Path>>(path: P, format: ConfigFormat) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self { path, name, format, required: true }
    }

    /// Auto-detect format from file extension
    pub fn auto_detect<P: AsRef<Path>>(path: P) -> SynapsedResult<Self> {
        let path = path.as_ref();
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => return Err(SynapsedError::config("Cannot detect config format from file extension")),
        };

        Ok(Self::new(path, format))
    }

    /// Treat a missing file as an empty source instead of an error
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> SynapsedResult<Value> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !self.required => {
                return Ok(Value::Object(Map::new()));
            }
            Err(e) => return Err(SynapsedError::config(format!("Failed to read config file: {e}"))),
        };

        self.format.parse(&content)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// In-memory configuration text, mostly used for embedded defaults
pub struct StaticConfigSource {
    content: String,
    format: ConfigFormat,
}

impl StaticConfigSource {
    /// Create a source from TOML text
    pub fn toml<S: Into<String>>(content: S) -> Self {
        Self { content: content.into(), format: ConfigFormat::Toml }
    }

    /// Create a source from JSON text
    pub fn json<S: Into<String>>(content: S) -> Self {
        Self { content: content.into(), format: ConfigFormat::Json }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> SynapsedResult<Value> {
        self.format.parse(&self.content)
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

/// Environment variable configuration source.
///
/// `GUARD_ORCHESTRATOR__DEADLINE_MS=250` with prefix `GUARD` becomes
/// `orchestrator.deadline_ms = 250`. Scalars are typed when they parse as a
/// boolean or a number and kept as strings otherwise.
pub struct EnvConfigSource {
    prefix: String,
    separator: String,
}

impl EnvConfigSource {
    /// Create a new environment config source with prefix
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            separator: "__".to_string(),
        }
    }

    /// Override the nesting separator (default `__`)
    #[must_use]
    pub fn with_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.separator = separator.into();
        self
    }
}

impl ConfigSource for EnvConfigSource {
    fn load(&self) -> SynapsedResult<Value> {
        let mut root = Map::new();

        let prefix = format!("{}_", self.prefix);
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }

            let path: Vec<String> = rest
                .split(self.separator.as_str())
                .map(str::to_lowercase)
                .collect();
            insert_path(&mut root, &path, parse_scalar(&value));
        }

        Ok(Value::Object(root))
    }

    fn source_name(&self) -> &str {
        "environment"
    }
}

/// Configuration manager that combines multiple sources
pub struct ConfigManager {
    sources: Vec<Box<dyn ConfigSource>>,
    cache: Option<Value>,
}

impl ConfigManager {
    /// Create a new config manager
    #[must_use] pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cache: None,
        }
    }

    /// Add a configuration source
    #[must_use]
    pub fn add_source<S: ConfigSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Load configuration from all sources
    pub fn load(&mut self) -> SynapsedResult<&Value> {
        let mut merged = Value::Object(Map::new());

        for source in &self.sources {
            let config = source.load()
                .map_err(|e| SynapsedError::config(format!("Failed to load from {}: {}", source.source_name(), e)))?;
            tracing::debug!(source = source.source_name(), "configuration source loaded");

            merge_values(&mut merged, config);
        }

        Ok(self.cache.insert(merged))
    }

    /// Get a configuration value by path (e.g., "orchestrator.deadline_ms")
    pub fn get(&self, path: &str) -> SynapsedResult<&Value> {
        let config = self.loaded()?;
        value_by_path(config, path)
            .ok_or_else(|| SynapsedError::config(format!("Path '{path}' not found")))
    }

    /// Deserialize the whole merged tree
    pub fn extract<T: DeserializeOwned>(&self) -> SynapsedResult<T> {
        let config = self.loaded()?;
        serde_json::from_value(config.clone())
            .map_err(|e| SynapsedError::config(format!("Invalid configuration: {e}")))
    }

    /// Deserialize one section; a missing section deserializes from an empty table
    pub fn extract_section<T: DeserializeOwned>(&self, path: &str) -> SynapsedResult<T> {
        let config = self.loaded()?;
        let section = value_by_path(config, path)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(section)
            .map_err(|e| SynapsedError::config(format!("Invalid configuration section '{path}': {e}")))
    }

    /// Check if configuration is loaded
    #[must_use] pub fn is_loaded(&self) -> bool {
        self.cache.is_some()
    }

    fn loaded(&self) -> SynapsedResult<&Value> {
        self.cache.as_ref()
            .ok_or_else(|| SynapsedError::config("Configuration not loaded"))
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Validatable for ConfigManager {
    fn validate(&self) -> SynapsedResult<()> {
        self.loaded().map(|_| ())
    }
}

fn parse_scalar(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn insert_path(root: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for part in parents {
        let entry = current
            .entry(part.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn value_by_path<'a>(config: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(config, |current, part| current.get(part))
}
