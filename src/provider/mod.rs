//! Provisioning backends
//!
//! The engine talks to backends through [`stackgraph::Provisioner`]. Only
//! the local, file-backed provider ships with the CLI.

pub mod local;

use anyhow::Result;
use stackgraph::Provisioner;

use crate::config::{ProviderKind, Settings};

pub use local::LocalProvider;

/// Build the provider named in settings
pub fn from_settings(settings: &Settings) -> Result<Box<dyn Provisioner>> {
    match settings.provider.kind {
        ProviderKind::Local => {
            let root = settings.provider_root()?;
            log::debug!("Using local provider at {}", root.display());
            Ok(Box::new(LocalProvider::new(root)))
        }
    }
}
