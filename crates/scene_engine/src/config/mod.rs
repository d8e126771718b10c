//! Configuration system
//!
//! The [`Config`] trait gives any serde-enabled configuration struct file
//! loading and saving in TOML or RON, picked by file extension.
//! [`EngineConfig`] is the configuration of the execution core itself.

pub use serde::{Serialize, Deserialize};

use crate::render::ClearMode;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            Self::from_toml_str(&contents)
        } else if path.ends_with(".ron") {
            Self::from_ron_str(&contents)
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Parse configuration from a TOML document
    fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse configuration from a RON document
    fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Semantically invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which buffers are cleared at each frame boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClearConfig {
    /// Clear the color buffer
    pub color: bool,
    /// Clear the depth buffer
    pub depth: bool,
    /// Clear the stencil buffer
    pub stencil: bool,
}

impl Default for ClearConfig {
    fn default() -> Self {
        Self { color: true, depth: false, stencil: false }
    }
}

impl ClearConfig {
    /// Convert the flags into the render-state clear mask
    pub fn to_clear_mode(self) -> ClearMode {
        let mut mode = ClearMode::empty();
        mode.set(ClearMode::COLOR, self.color);
        mode.set(ClearMode::DEPTH, self.depth);
        mode.set(ClearMode::STENCIL, self.stencil);
        mode
    }
}

/// # Engine Configuration
///
/// Core behavior of the execution core: logging, update tick rate and the
/// render-state defaults applied at each frame boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Fixed update rate of the update thread
    pub update_rate_hz: u32,
    /// Buffers cleared at each frame boundary
    pub clear: ClearConfig,
    /// Clear color (RGBA)
    pub clear_color: [f32; 4],
    /// Optional cap on texture units, below the platform limit
    pub max_texture_units: Option<u32>,
    /// Scene loaded at startup
    pub initial_scene: Option<String>,
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            update_rate_hz: 60,
            clear: ClearConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_texture_units: None,
            initial_scene: None,
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the update tick rate
    pub fn with_update_rate(mut self, rate_hz: u32) -> Self {
        self.update_rate_hz = rate_hz;
        self
    }

    /// Set which buffers are cleared every frame
    pub fn with_clear(mut self, clear: ClearConfig) -> Self {
        self.clear = clear;
        self
    }

    /// Set the clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Cap the number of texture units used
    pub fn with_max_texture_units(mut self, units: u32) -> Self {
        self.max_texture_units = Some(units);
        self
    }

    /// Set the scene loaded at startup
    pub fn with_initial_scene(mut self, name: impl Into<String>) -> Self {
        self.initial_scene = Some(name.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_rate_hz == 0 {
            return Err(ConfigError::Invalid("update_rate_hz must be at least 1".to_string()));
        }

        if self.update_rate_hz > 1000 {
            return Err(ConfigError::Invalid("update_rate_hz should not exceed 1000".to_string()));
        }

        if self.max_texture_units == Some(0) {
            return Err(ConfigError::Invalid("max_texture_units cannot be zero".to_string()));
        }

        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::Invalid("clear_color must be finite".to_string()));
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            log_level = "debug"
            update_rate_hz = 30
            initial_scene = "menu"

            [clear]
            color = true
            depth = true
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.update_rate_hz, 30);
        assert_eq!(config.initial_scene.as_deref(), Some("menu"));
        assert_eq!(config.clear.to_clear_mode(), ClearMode::COLOR | ClearMode::DEPTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_from_ron_uses_defaults() {
        let config = EngineConfig::from_ron_str("(update_rate_hz: 120)").unwrap();

        assert_eq!(config.update_rate_hz, 120);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.clear, ClearConfig::default());
    }

    #[test]
    fn test_engine_config_validation() {
        assert!(EngineConfig::new().with_update_rate(0).validate().is_err());
        assert!(EngineConfig::new().with_max_texture_units(0).validate().is_err());
        assert!(EngineConfig::new().with_max_texture_units(4).validate().is_ok());
    }

    #[test]
    fn test_unsupported_extension() {
        let result = EngineConfig::load_from_file("engine.ini");
        assert!(matches!(result, Err(ConfigError::Io(_)) | Err(ConfigError::UnsupportedFormat(_))));
    }
}
