use serde::Deserialize;
use std::collections::HashSet;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("port cannot be 0")]
    InvalidPort,
    #[error("empty environment name")]
    EmptyEnvironment,
    #[error("duplicate environment: {0}")]
    DuplicateEnvironment(String),
    #[error("store filename cannot be empty")]
    EmptyFilename,
    #[error("directory ttl must be at least one second")]
    InvalidDirectoryTtl,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Zstd1,
    Zstd3,
}

impl Compression {
    pub(crate) fn zstd_level(self) -> Option<i32> {
        match self {
            Compression::None => None,
            Compression::Zstd1 => Some(1),
            Compression::Zstd3 => Some(3),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreConfig {
    #[default]
    Memory,
    Filesystem {
        base_dir: String,
        filename: String,
        #[serde(default)]
        compression: Compression,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 3001,
    }
}

fn default_environments() -> Vec<String> {
    vec!["staging".into(), "prod".into()]
}

fn default_directory_ttl_secs() -> u64 {
    300
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    #[serde(default)]
    pub store: StoreConfig,
    /// Environments a request may name. Each maps to its own namespace.
    #[serde(default = "default_environments")]
    pub environments: Vec<String>,
    /// How long a computed directory is served before it is rebuilt.
    #[serde(default = "default_directory_ttl_secs")]
    pub directory_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: default_admin_listener(),
            store: StoreConfig::default(),
            environments: default_environments(),
            directory_ttl_secs: default_directory_ttl_secs(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        let mut seen = HashSet::new();
        for env in &self.environments {
            if env.is_empty() {
                return Err(ConfigError::EmptyEnvironment);
            }
            if !seen.insert(env) {
                return Err(ConfigError::DuplicateEnvironment(env.clone()));
            }
        }

        if let StoreConfig::Filesystem { filename, .. } = &self.store
            && filename.is_empty()
        {
            return Err(ConfigError::EmptyFilename);
        }

        if self.directory_ttl_secs == 0 {
            return Err(ConfigError::InvalidDirectoryTtl);
        }

        Ok(())
    }
}
