//! Engine configuration.
//!
//! [`EngineConfig`] can be built in code or loaded from YAML:
//!
//! ```yaml
//! namespace: tpl
//! template_dir: ./views
//! cache:
//!   strategy: registry
//!   dir: /var/cache/stencil
//! getter_prefixes: [get, is, has]
//! max_include_depth: 8
//! ```
//!
//! Every field is optional; missing fields take the [`Default`] values.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// How compiled programs are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// One artifact per template, mirroring the template tree.
    #[default]
    Directory,
    /// Generated artifact names tracked in a JSON registry.
    Registry,
}

impl std::str::FromStr for CacheKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "directory" => Ok(CacheKind::Directory),
            "registry" => Ok(CacheKind::Registry),
            other => Err(Error::Config(format!(
                "unknown cache strategy `{}` (expected `directory` or `registry`)",
                other
            ))),
        }
    }
}

/// Cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub strategy: CacheKind,
    /// Root directory for cache artifacts.
    pub dir: PathBuf,
    /// Extension given to artifacts by the directory strategy.
    pub extension: String,
    /// Registry file name (inside `dir`) for the registry strategy.
    pub registry_file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheKind::Directory,
            dir: PathBuf::from(".stencil-cache"),
            extension: ".tpl.json".to_string(),
            registry_file: "registry.json".to_string(),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tag namespace prefix (`tpl` in `<tpl:if>`).
    pub namespace: String,
    /// Base directory for relative template paths and cache keys.
    pub template_dir: PathBuf,
    pub cache: CacheConfig,
    /// Method-name prefixes tried, in order, when a selector segment is not a
    /// field of an object.
    pub getter_prefixes: Vec<String>,
    pub max_include_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "tpl".to_string(),
            template_dir: PathBuf::from("."),
            cache: CacheConfig::default(),
            getter_prefixes: vec!["get".into(), "is".into(), "has".into()],
            max_include_depth: 16,
        }
    }
}

impl EngineConfig {
    /// Parses a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML configuration file. Relative directories in the file are
    /// resolved against the file's own directory.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&text)?;
        if let Some(base) = path.parent() {
            if config.template_dir.is_relative() {
                config.template_dir = base.join(&config.template_dir);
            }
            if config.cache.dir.is_relative() {
                config.cache.dir = base.join(&config.cache.dir);
            }
        }
        Ok(config)
    }

    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.template_dir = dir.into();
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache.dir = dir.into();
        self
    }

    pub fn with_strategy(mut self, strategy: CacheKind) -> Self {
        self.cache.strategy = strategy;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Checks values serde cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".into()));
        }
        if !self.cache.extension.starts_with('.') {
            return Err(Error::Config(format!(
                "cache extension `{}` must start with a dot",
                self.cache.extension
            )));
        }
        if self.cache.registry_file.is_empty() {
            return Err(Error::Config("cache registry_file must not be empty".into()));
        }
        if self.max_include_depth == 0 {
            return Err(Error::Config("max_include_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.namespace, "tpl");
        assert_eq!(config.cache.strategy, CacheKind::Directory);
        assert_eq!(config.getter_prefixes, vec!["get", "is", "has"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml(
            "namespace: x\ncache:\n  strategy: registry\n",
        )
        .unwrap();
        assert_eq!(config.namespace, "x");
        assert_eq!(config.cache.strategy, CacheKind::Registry);
        assert_eq!(config.cache.extension, ".tpl.json");
        assert_eq!(config.max_include_depth, 16);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = EngineConfig::from_yaml("cache:\n  strategy: memcached\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_bad_extension_rejected() {
        let err = EngineConfig::from_yaml("cache:\n  extension: json\n").unwrap_err();
        assert!(err.to_string().contains("dot"));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("registry".parse::<CacheKind>().unwrap(), CacheKind::Registry);
        assert!("nope".parse::<CacheKind>().is_err());
    }

    #[test]
    fn test_yaml_file_resolves_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stencil.yaml");
        fs::write(&path, "template_dir: views\ncache:\n  dir: cache\n").unwrap();

        let config = EngineConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.template_dir, dir.path().join("views"));
        assert_eq!(config.cache.dir, dir.path().join("cache"));
    }
}
