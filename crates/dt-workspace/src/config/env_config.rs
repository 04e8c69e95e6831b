use std::path::PathBuf;

use dt_typecheck::BindingType;
use serde::Deserialize;

/// Workspace configuration using environment variables
#[derive(Debug, Default, PartialEq, Deserialize)]
pub struct EnvConfig {
    pub include_paths: Option<Vec<PathBuf>>,
    pub binding_type: Option<BindingType>,
    pub report_disabled_nodes: Option<bool>,
}

impl EnvConfig {
    /// Retrieves configuration from environment variables prefixed with `DT_TOOLS_`
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("DT_TOOLS_").from_env()
    }
}
