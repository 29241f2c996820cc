use crate::core::allocator::{self, TableAllocator};
use crate::core::cacher::Cacher;
use crate::core::storage::Registry;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable \"{key}\"\n\tMessage: {message}")]
    Missing { key: String, message: String },
    #[error("Could not parse environment variable: {key}\n\tGot: {value}\n\tMessage: {message}")]
    Invalid {
        key: String,
        value: String,
        message: String,
    },
}

pub trait Var {
    const NAME: &'static str;
    type Type;

    fn from_env() -> Result<Self::Type, ConfigError>;
}

pub struct CacheRoot;
pub struct CacheAutosave;

impl Var for CacheRoot {
    const NAME: &'static str = "FX_CACHE_ROOT";
    type Type = PathBuf;

    fn from_env() -> Result<PathBuf, ConfigError> {
        let root = std::env::var(Self::NAME).map_err(|err| ConfigError::Missing {
            key: Self::NAME.to_string(),
            message: err.to_string(),
        })?;

        if root.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: Self::NAME.to_string(),
                value: root,
                message: "cache root must not be empty".to_string(),
            });
        }

        Ok(PathBuf::from(root))
    }
}

impl CacheAutosave {
    pub const DEFAULT: bool = true;

    pub fn parse(value: &str) -> Result<bool, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key: Self::NAME.to_string(),
                value: value.to_string(),
                message: "expected one of true/false, yes/no, on/off, 1/0".to_string(),
            }),
        }
    }
}

impl Var for CacheAutosave {
    const NAME: &'static str = "FX_CACHE_AUTOSAVE";
    type Type = bool;

    /// Defaults to `true` when unset
    fn from_env() -> Result<bool, ConfigError> {
        match std::env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(std::env::VarError::NotPresent) => Ok(Self::DEFAULT),
            Err(err) => Err(ConfigError::Invalid {
                key: Self::NAME.to_string(),
                value: String::new(),
                message: err.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub autosave: bool,
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            autosave: CacheAutosave::DEFAULT,
        }
    }

    /// Builder method to toggle persisting freshly created artifacts
    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let root = CacheRoot::from_env()?;
        let autosave = CacheAutosave::from_env()?;

        tracing::info!(
            message = "Configuration loaded",
            root = %root.display(),
            autosave = autosave
        );

        Ok(CacheConfig { root, autosave })
    }

    pub fn allocator(&self) -> Result<TableAllocator, allocator::Error> {
        TableAllocator::open(&self.root)
    }

    /// A cacher over this root, persisting through `registry`
    pub fn cacher<R: 'static>(&self, registry: Arc<Registry>) -> Result<Cacher<R>, allocator::Error> {
        let allocator = Arc::new(self.allocator()?);
        Ok(Cacher::new(allocator, registry).with_autosave(self.autosave))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocator::Allocator;
    use crate::core::cacher::BoxError;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn autosave_accepts_common_spellings() {
        for value in ["1", "true", "TRUE", " yes ", "on"] {
            assert!(CacheAutosave::parse(value).unwrap(), "{}", value);
        }
        for value in ["0", "false", "No", "off"] {
            assert!(!CacheAutosave::parse(value).unwrap(), "{}", value);
        }
    }

    #[test]
    fn autosave_rejects_garbage() {
        let err = CacheAutosave::parse("maybe").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { ref key, ref value, .. } if key == "FX_CACHE_AUTOSAVE" && value == "maybe"
        ));
    }

    #[test]
    fn config_builds_working_cacher() {
        let dir = TempDir::new().unwrap();
        let config = CacheConfig::new(dir.path()).with_autosave(false);

        let cacher = config
            .cacher::<serde_json::Value>(Arc::new(Registry::with_defaults()))
            .unwrap();
        let f = cacher.decorate(|(x,): (u8,)| Ok::<_, BoxError>(json!(x)));

        assert_eq!(f.call((7,)).unwrap(), json!(7));
        // autosave is off, so nothing was written at the allocated path
        assert!(!f.allocate(&(7,)).unwrap().exists());
        assert!(config.allocator().unwrap().allocate(&json!({})).is_ok());
    }
}
