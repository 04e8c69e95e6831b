use std::{fmt, str::FromStr};

/// The binding convention the checked tree follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingType {
    /// devicetree.org JSON-schema bindings
    #[default]
    DevicetreeOrg,
    /// Zephyr YAML bindings
    Zephyr,
}

impl BindingType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DevicetreeOrg => "devicetree-org",
            Self::Zephyr => "zephyr",
        }
    }
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown binding type `{0}`, expected `devicetree-org` or `zephyr`")]
pub struct UnknownBindingType(pub String);

impl FromStr for BindingType {
    type Err = UnknownBindingType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devicetree-org" => Ok(Self::DevicetreeOrg),
            "zephyr" => Ok(Self::Zephyr),
            other => Err(UnknownBindingType(other.to_owned())),
        }
    }
}

/// Validation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub binding_type: BindingType,
    /// Whether disabled nodes get a hint. They are never type checked.
    pub report_disabled_nodes: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            binding_type: BindingType::default(),
            report_disabled_nodes: true,
        }
    }
}
