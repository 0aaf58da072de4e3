//! Configuration loading with multi-layer merge

use super::{
    BuildConfig, BuildLayer, ContextConfig, ContextLayer, ResponseConfig, ResponseLayer,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const USER_CONFIG: &str = "llm-roundtrip/config.toml";
const PROJECT_CONFIG: &str = ".roundtrip/config.toml";

/// Top-level roundtrip configuration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundtripConfig {
    pub context: ContextConfig,
    pub response: ResponseConfig,
    pub build: BuildConfig,
}

/// One config file as written: only the keys it sets are `Some`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub context: ContextLayer,
    pub response: ResponseLayer,
    pub build: BuildLayer,
}

impl ConfigLayer {
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let layer: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(layer)
    }
}

impl RoundtripConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/llm-roundtrip/config.toml
    /// 3. .roundtrip/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_layer = ConfigLayer::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_layer);
            }
        }

        let project_config_path = Self::project_config_path(project_dir);
        if project_config_path.exists() {
            let project_layer = ConfigLayer::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_layer);
        }

        Ok(config)
    }

    /// Defaults overlaid with a single config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge(ConfigLayer::load_file(path)?);
        Ok(config)
    }

    /// Get the user config path (~/.config/llm-roundtrip/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(USER_CONFIG))
    }

    pub fn project_config_path(project_dir: Option<&Path>) -> PathBuf {
        project_dir
            .map(|p| p.join(PROJECT_CONFIG))
            .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG))
    }

    /// Apply a layer on top of this config; every key the layer sets wins
    pub fn merge(&mut self, layer: ConfigLayer) {
        self.context.merge(layer.context);
        self.response.merge(layer.response);
        self.build.merge(layer.build);
    }
}
