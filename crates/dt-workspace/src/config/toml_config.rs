use dt_typecheck::BindingType;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::search::search;

/// The TOML configuration filename
pub const CONFIG_FILENAME: &str = ".dt-tools.toml";

/// Workspace configuration in TOML format
///
/// **Note**: It's up to the caller to perform validation after deserialization.
#[derive(Debug, PartialEq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TomlConfig {
    pub include_paths: Option<Vec<PathBuf>>,
    pub binding_type: Option<BindingType>,
    pub report_disabled_nodes: Option<bool>,
}

impl TomlConfig {
    /// Looks for [`CONFIG_FILENAME`] in `start` and its ancestors
    pub fn find(start: &Path) -> Option<PathBuf> {
        search(start, CONFIG_FILENAME, |path| path.is_file()).map(|(_, path)| path)
    }

    /// Loads the config file from the file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(&fs_err::read_to_string(path)?)?;

        // Make paths relative
        if let Some(include_paths) = config.include_paths {
            let config_parent = path.parent().ok_or(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "parent not found",
            )))?;
            config.include_paths = Some(
                include_paths
                    .into_iter()
                    .map(|include_path| config_parent.join(include_path))
                    .collect(),
            );
        }

        Ok(config)
    }
}

/// Configuration errors encountered when loading the TOML config
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config")]
    Io(#[from] std::io::Error),

    #[error("Failed to deserialize config")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load() {
        // load using filename
        let config = TomlConfig::load(Path::new(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.include_paths, Some(vec![PathBuf::from("test_data")]));
        assert_eq!(config.binding_type, None);

        let config = TomlConfig::load(&Path::new("test_data").join(CONFIG_FILENAME)).unwrap();
        assert_eq!(
            config,
            TomlConfig {
                include_paths: Some(vec![Path::new("test_data").join("include")]),
                binding_type: Some(BindingType::Zephyr),
                report_disabled_nodes: Some(false),
            }
        );

        // unknown binding type
        assert!(matches!(
            TomlConfig::load(&Path::new("test_data").join("invalid").join(CONFIG_FILENAME)),
            Err(ConfigError::Toml(_))
        ));

        // try load directory as file
        assert!(TomlConfig::load(Path::new("test_data")).is_err());
    }

    #[test]
    fn find_ancestor() {
        // `board` doesn't exist, ancestors are searched lexically
        assert_eq!(
            TomlConfig::find(&Path::new("test_data").join("board")),
            Some(Path::new("test_data").join(CONFIG_FILENAME))
        );
        assert_eq!(
            TomlConfig::find(Path::new("test_data/invalid")),
            Some(Path::new("test_data/invalid").join(CONFIG_FILENAME))
        );
    }

    #[test]
    fn load_not_exists() {
        // common mistake: the user forgot `.` prefix
        let Err(ConfigError::Io(err)) = TomlConfig::load(Path::new("dt-tools.toml")) else {
            panic!("expected an I/O error");
        };
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
