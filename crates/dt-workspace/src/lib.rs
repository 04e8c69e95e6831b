//! # dt-tools workspace
//!
//! Finds and merges the configuration of a directory of Devicetree sources.

use std::path::PathBuf;

#[cfg(feature = "cli")]
use config::cli_config::CliConfig;
use config::{
    CombinedConfig,
    env_config::EnvConfig,
    toml_config::{ConfigError, TomlConfig},
};
use dt_typecheck::Settings;
use thiserror::Error;

pub mod config;
mod search;

#[derive(Debug)]
pub struct Workspace {
    pub path: PathBuf,

    /// The `.dt-tools.toml` file the configuration was read from, if any
    pub config_file: Option<PathBuf>,

    pub config: CombinedConfig,
}

impl Workspace {
    /// Loads the configuration of the workspace at `path` from environment variables and the
    /// closest `.dt-tools.toml`.
    pub fn try_new(path: PathBuf) -> Result<Self, WorkspaceError> {
        Self::load(
            path,
            #[cfg(feature = "cli")]
            None,
        )
    }

    /// Loads the configuration like [`Workspace::try_new`], with the command-line overriding
    /// everything else.
    pub fn load(
        path: PathBuf,
        #[cfg(feature = "cli")] cli: Option<CliConfig>,
    ) -> Result<Self, WorkspaceError> {
        let config_file = TomlConfig::find(&path);
        let toml = match &config_file {
            Some(file) => {
                tracing::debug!("Loading config from {}", file.display());
                Some(TomlConfig::load(file)?)
            }
            None => {
                tracing::debug!("No config file found for {}", path.display());
                None
            }
        };
        let env = EnvConfig::from_env()?;
        let config = CombinedConfig::merge(
            #[cfg(feature = "cli")]
            cli,
            Some(env),
            toml,
        );
        Ok(Self {
            path,
            config_file,
            config,
        })
    }

    pub fn settings(&self) -> Settings {
        self.config.settings()
    }
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to load config")]
    Config(#[from] ConfigError),

    #[error("Invalid environment variable")]
    Env(#[from] envy::Error),
}
