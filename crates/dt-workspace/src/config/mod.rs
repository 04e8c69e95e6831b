use std::path::PathBuf;

use dt_typecheck::{BindingType, Settings};

#[cfg(feature = "cli")]
use cli_config::CliConfig;
use env_config::EnvConfig;
use toml_config::TomlConfig;

#[cfg(feature = "cli")]
pub mod cli_config;
pub mod env_config;
pub mod toml_config;

/// Helper macro for getting a field from structs.
///
/// First argument must be `cli,` or `@without_cli`. The former automatically removes itself when the `cli` feature is not enabled.
macro_rules! config_field {
  ($cli:ident, $($rest:ident),+; $field:ident) => {
    {
        #[cfg(feature = "cli")]
        { config_field!(@without_cli $cli, $($rest),+; $field) }
        #[cfg(not(feature = "cli"))]
        { config_field!(@without_cli $($rest),+; $field) }
    }
  };
  (@without_cli $start:ident$(, $fallback:ident)*; $field:ident) => {
      $start.as_ref().and_then(|value| value.$field.clone())
        $(
        .or_else(|| $fallback.as_ref().and_then(|value| value.$field.clone()))
        )*
  };
}

/// A composite configuration from multiple sources with following ordering:
///
/// - [`CliConfig`] (if `cli` feature is enabled)
/// - [`EnvConfig`]
/// - [`TomlConfig`]
#[derive(Debug, PartialEq)]
pub struct CombinedConfig {
    pub include_paths: Vec<PathBuf>,
    pub binding_type: BindingType,
    pub report_disabled_nodes: bool,
}

impl Default for CombinedConfig {
    fn default() -> Self {
        Self::merge(
            #[cfg(feature = "cli")]
            None,
            None,
            None,
        )
    }
}

impl CombinedConfig {
    /// Merges [`CliConfig`] (if `cli` feature is enabled), [`EnvConfig`] and [`TomlConfig`]
    #[must_use]
    pub fn merge(
        #[cfg(feature = "cli")] cli: Option<CliConfig>,
        env: Option<EnvConfig>,
        toml: Option<TomlConfig>,
    ) -> Self {
        let defaults = Settings::default();
        Self {
            include_paths: config_field!(cli, env, toml; include_paths).unwrap_or_default(),
            binding_type: config_field!(cli, env, toml; binding_type)
                .unwrap_or(defaults.binding_type),
            report_disabled_nodes: config_field!(cli, env, toml; report_disabled_nodes)
                .unwrap_or(defaults.report_disabled_nodes),
        }
    }

    /// The validation settings this configuration selects
    pub fn settings(&self) -> Settings {
        Settings {
            binding_type: self.binding_type,
            report_disabled_nodes: self.report_disabled_nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge() {
        #[cfg(feature = "cli")]
        let cli = CliConfig {
            include_paths: Some(vec!["cli".into()]),
            binding_type: None,
            report_disabled_nodes: None,
        };
        let env = EnvConfig {
            include_paths: Some(vec!["env".into()]),
            binding_type: None,
            report_disabled_nodes: Some(true),
        };
        let toml = TomlConfig {
            include_paths: Some(vec!["toml".into()]),
            binding_type: Some(BindingType::Zephyr),
            report_disabled_nodes: Some(false),
        };

        assert_eq!(
            CombinedConfig {
                include_paths: vec![if cfg!(feature = "cli") { "cli" } else { "env" }.into()],
                binding_type: BindingType::Zephyr,
                report_disabled_nodes: true,
            },
            CombinedConfig::merge(
                #[cfg(feature = "cli")]
                Some(cli),
                Some(env),
                Some(toml),
            )
        );
    }

    #[test]
    fn defaults() {
        let config = CombinedConfig::default();
        assert!(config.include_paths.is_empty());
        assert_eq!(config.settings(), Settings::default());
    }
}
