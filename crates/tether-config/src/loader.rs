//! Configuration Loader
//!
//! Handles loading configuration from tether.toml and applying environment overrides.

use crate::bridge::{BridgeConfig, NameStyle};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// File name searched for by [`ConfigLoader::load_from_directory`]
pub const CONFIG_FILE_NAME: &str = "tether.toml";

/// Configuration loader
///
/// Loads configuration with the following precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Bridge config (./tether.toml) - overrides defaults
/// 3. Environment variables (TETHER_*) - overrides bridge config
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip TETHER_* overrides (used by callers that want the file verbatim)
    ignore_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Bridge configuration
    pub bridge: BridgeConfig,

    /// Directory where tether.toml was found
    pub root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Create a loader that does not consult TETHER_* variables
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find tether.toml, then applies
    /// environment overrides.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let (root, bridge) = self.find_bridge_config(start_dir)?;
        let bridge = self.apply_env_overrides(bridge)?;

        Ok(Config { bridge, root })
    }

    /// Load configuration from a specific config file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let bridge = BridgeConfig::load_from_file(config_path)?;
        let bridge = self.apply_env_overrides(bridge)?;

        let root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config { bridge, root })
    }

    /// Find bridge configuration by walking up directory tree
    fn find_bridge_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, BridgeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let config = BridgeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, BridgeConfig::default())),
            }
        }
    }

    /// Apply environment variable overrides to the bridge config
    ///
    /// Recognized variables:
    /// - TETHER_NAME_STYLE=segments|first-letter
    /// - TETHER_WARN_UNHANDLED=true|false
    /// - TETHER_TRACE_INVOCATIONS=true|false
    /// - TETHER_STRICT_MARSHAL=true|false
    fn apply_env_overrides(&self, mut config: BridgeConfig) -> ConfigResult<BridgeConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(style) = env::var("TETHER_NAME_STYLE") {
            config.dispatch_mut().name_style = Some(style.parse::<NameStyle>()?);
        }

        if let Ok(warn) = env::var("TETHER_WARN_UNHANDLED") {
            config.dispatch_mut().warn_unhandled = Some(parse_bool("TETHER_WARN_UNHANDLED", &warn)?);
        }

        if let Ok(trace) = env::var("TETHER_TRACE_INVOCATIONS") {
            config.dispatch_mut().trace_invocations =
                Some(parse_bool("TETHER_TRACE_INVOCATIONS", &trace)?);
        }

        if let Ok(strict) = env::var("TETHER_STRICT_MARSHAL") {
            config.marshal_mut().strict = Some(parse_bool("TETHER_STRICT_MARSHAL", &strict)?);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Get the directory that holds tether.toml
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Check if a tether.toml was found
    pub fn has_file(&self) -> bool {
        self.root.is_some()
    }
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}
