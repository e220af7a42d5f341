use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Tag passed to the platform logger.
pub const LOG_TAG: &str = "AaptToolchain";

pub const DEFAULT_RUNTIME_TAG: &str = "revanced";

pub const DEFAULT_FRAMEWORK_DIR: &str = "framework";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct ToolchainConfig {
    /// Every group carries `#[serde(default)]`: a missing or broken `[selector]`
    /// must not throw away a perfectly valid `[toolchain]` group.
    #[serde(default)]
    pub toolchain: ToolchainPaths,

    #[serde(default)]
    pub selector: SelectorConfig,

    #[serde(default)]
    pub framework: FrameworkConfig,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct ToolchainPaths {
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct SelectorConfig {
    #[serde(default)]
    pub prefer_primary: bool,
    /// When set, archives declaring at least this target SDK go to the fallback toolchain.
    #[serde(default)]
    pub modern_target_sdk: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FrameworkConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default = "default_runtime_tag")]
    pub runtime_tag: String,
}

fn default_base_dir() -> String {
    DEFAULT_FRAMEWORK_DIR.to_string()
}

fn default_runtime_tag() -> String {
    DEFAULT_RUNTIME_TAG.to_string()
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            runtime_tag: default_runtime_tag(),
        }
    }
}

/// Reads the TOML config at `path`.
///
/// A missing file is not an error. A malformed one is logged and replaced by the
/// defaults so the user can fix it and run again.
pub fn parse_config(path: &Path) -> ToolchainConfig {
    let Ok(content) = fs::read_to_string(path) else {
        return ToolchainConfig::default();
    };
    match toml::from_str::<ToolchainConfig>(&content) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring malformed config {}: {}", path.display(), e);
            ToolchainConfig::default()
        }
    }
}
