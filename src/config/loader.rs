//! Configuration loader: layers every source and deserializes a [`RunConfig`].

use crate::config::merge::merge_policy;
use crate::config::sources::{env_vars, global_file, workspace_file};
use crate::config::RunConfig;
use config::{ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Highest-precedence values, normally taken from CLI flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    entries: Vec<(String, String)>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.entries.push((key.to_string(), value.to_string()));
        self
    }

    /// Set `key` only when a value is present.
    pub fn set_opt<T: ToString>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.set(key, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Loads [`RunConfig`] from defaults, files, environment and overrides
pub struct ConfigLoader;

impl ConfigLoader {
    /// Path of the global config file, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    /// Load configuration for `workspace_root` without CLI overrides.
    pub fn load(workspace_root: &Path) -> Result<RunConfig, ConfigError> {
        Self::load_with(workspace_root, &ConfigOverrides::default())
    }

    /// Load configuration: defaults -> global file -> workspace file ->
    /// environment -> `overrides`.
    pub fn load_with(
        workspace_root: &Path,
        overrides: &ConfigOverrides,
    ) -> Result<RunConfig, ConfigError> {
        let mut builder = merge_policy::builder_with_defaults()?;
        builder = global_file::add_to_builder(builder)?;
        builder = workspace_file::add_to_builder(builder, workspace_root)?;
        builder = env_vars::add_to_builder(builder);
        for (key, value) in &overrides.entries {
            builder = builder.set_override(key.as_str(), value.as_str())?;
        }

        let config: RunConfig = builder.build()?.try_deserialize()?;
        debug!(mode = %config.mode, work_dir = %config.work_dir.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load a single file on top of the defaults (no environment, no global file).
    pub fn load_from_file(path: &Path) -> Result<RunConfig, ConfigError> {
        Self::load_from_file_with(path, &ConfigOverrides::default())
    }

    /// Load a single file on top of the defaults, then apply `overrides`.
    pub fn load_from_file_with(
        path: &Path,
        overrides: &ConfigOverrides,
    ) -> Result<RunConfig, ConfigError> {
        let mut builder =
            merge_policy::builder_with_defaults()?.add_source(File::from(path).required(true));
        for (key, value) in &overrides.entries {
            builder = builder.set_override(key.as_str(), value.as_str())?;
        }
        builder.build()?.try_deserialize()
    }
}
