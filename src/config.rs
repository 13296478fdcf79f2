use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

// ============================================================================
// Settings
// ============================================================================

/// User settings from `config.toml`; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Default stack file
    #[serde(default)]
    pub stack: Option<String>,

    /// Snapshot path
    #[serde(default)]
    pub state: Option<String>,

    /// Parallel provider calls during apply
    #[serde(default)]
    pub jobs: Option<usize>,

    #[serde(default)]
    pub provider: ProviderSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    #[serde(default)]
    pub kind: ProviderKind,

    /// Directory the local provider keeps its resources in
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Local,
}

const DEFAULT_STACK: &str = "stack.yaml";

impl Settings {
    /// Load settings from the config dir, or defaults if there is no file
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;

        settings.validate()?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == Some(0) {
            anyhow::bail!("jobs must be at least 1");
        }
        Ok(())
    }

    /// Stack file to load, flag first
    pub fn stack_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf).unwrap_or_else(|| {
            paths::expand(self.stack.as_deref().unwrap_or(DEFAULT_STACK))
        })
    }

    /// Snapshot file, flag first
    pub fn state_path(&self, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = flag {
            return Ok(path.to_path_buf());
        }
        match &self.state {
            Some(state) => Ok(paths::expand(state)),
            None => paths::default_state_file(),
        }
    }

    /// Parallelism, flag first
    pub fn jobs(&self, flag: Option<usize>) -> usize {
        flag.or(self.jobs).unwrap_or(1).max(1)
    }

    /// Local provider root
    pub fn provider_root(&self) -> Result<PathBuf> {
        match &self.provider.root {
            Some(root) => Ok(paths::expand(root)),
            None => paths::default_resources_dir(),
        }
    }
}
