//! Bridge Configuration (tether.toml)
//!
//! Controls how signal handler names are resolved and how strictly boxed
//! native values are decoded.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Bridge configuration from tether.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Signal dispatch settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchConfig>,

    /// Value marshaling settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marshal: Option<MarshalConfig>,
}

/// Signal dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// How handler names are turned into callback method names
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_style: Option<NameStyle>,

    /// Log a warning when no callback object exposes the handler (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warn_unhandled: Option<bool>,

    /// Log every callback invocation at debug level (default: false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_invocations: Option<bool>,
}

/// Value marshaling settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct MarshalConfig {
    /// Pre-register marshalers for the fundamental native types (default: true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_defaults: Option<bool>,

    /// Only decode values whose exact type tag is registered (default: true)
    ///
    /// When disabled, a derived tag with no marshaler of its own falls back
    /// to the marshaler of its fundamental type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Handler name normalization style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameStyle {
    /// Capitalize every `_`, `-` or `:` separated segment and join them
    /// (`on_button_clicked` becomes `OnButtonClicked`)
    ///
    /// Lossy: handler names differing only in their separators
    /// (`on_click`, `on-click`, `on:click`) reach the same method. Use
    /// `FirstLetter` when a UI definition relies on telling them apart.
    #[default]
    Segments,
    /// Uppercase the first character only (`on_button_clicked` becomes `On_button_clicked`)
    FirstLetter,
}

impl NameStyle {
    /// The spelling used in tether.toml and TETHER_NAME_STYLE
    pub fn as_str(&self) -> &'static str {
        match self {
            NameStyle::Segments => "segments",
            NameStyle::FirstLetter => "first-letter",
        }
    }
}

impl fmt::Display for NameStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NameStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segments" => Ok(NameStyle::Segments),
            "first-letter" | "first_letter" => Ok(NameStyle::FirstLetter),
            other => Err(ConfigError::InvalidValue {
                field: "dispatch.name_style".to_string(),
                reason: format!("must be 'segments' or 'first-letter', got '{}'", other),
            }),
        }
    }
}

impl BridgeConfig {
    /// Load bridge configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the bridge configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.strict_marshaling() && !self.register_defaults() {
            return Err(ConfigError::ValidationError(
                "marshal.strict = false falls back to fundamental marshalers, \
                 which requires marshal.register_defaults = true"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Effective handler name style
    pub fn name_style(&self) -> NameStyle {
        self.dispatch
            .as_ref()
            .and_then(|d| d.name_style)
            .unwrap_or_default()
    }

    /// Whether unhandled signals are reported
    pub fn warn_unhandled(&self) -> bool {
        self.dispatch
            .as_ref()
            .and_then(|d| d.warn_unhandled)
            .unwrap_or(true)
    }

    /// Whether each callback invocation is logged
    pub fn trace_invocations(&self) -> bool {
        self.dispatch
            .as_ref()
            .and_then(|d| d.trace_invocations)
            .unwrap_or(false)
    }

    /// Whether fundamental marshalers are registered up front
    pub fn register_defaults(&self) -> bool {
        self.marshal
            .as_ref()
            .and_then(|m| m.register_defaults)
            .unwrap_or(true)
    }

    /// Whether decoding requires an exact tag match
    pub fn strict_marshaling(&self) -> bool {
        self.marshal
            .as_ref()
            .and_then(|m| m.strict)
            .unwrap_or(true)
    }

    /// Mutable access to the dispatch section, creating it if absent
    pub fn dispatch_mut(&mut self) -> &mut DispatchConfig {
        self.dispatch.get_or_insert_with(DispatchConfig::default)
    }

    /// Mutable access to the marshal section, creating it if absent
    pub fn marshal_mut(&mut self) -> &mut MarshalConfig {
        self.marshal.get_or_insert_with(MarshalConfig::default)
    }

    /// Merge another bridge config into this one
    /// Other config takes precedence for non-None values
    pub fn merge(&mut self, other: &BridgeConfig) {
        if let Some(dispatch) = &other.dispatch {
            let target = self.dispatch_mut();
            if dispatch.name_style.is_some() {
                target.name_style = dispatch.name_style;
            }
            if dispatch.warn_unhandled.is_some() {
                target.warn_unhandled = dispatch.warn_unhandled;
            }
            if dispatch.trace_invocations.is_some() {
                target.trace_invocations = dispatch.trace_invocations;
            }
        }
        if let Some(marshal) = &other.marshal {
            let target = self.marshal_mut();
            if marshal.register_defaults.is_some() {
                target.register_defaults = marshal.register_defaults;
            }
            if marshal.strict.is_some() {
                target.strict = marshal.strict;
            }
        }
    }
}
