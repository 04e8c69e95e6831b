use std::path::PathBuf;

use clap::Parser;
use dt_typecheck::BindingType;

/// Command-line interface (CLI) workspace configuration
#[derive(Debug, PartialEq, Parser)]
pub struct CliConfig {
    /// List of comma-separated paths to search for C macros
    #[arg(short = 'I', long, value_delimiter = ',')]
    pub include_paths: Option<Vec<PathBuf>>,

    /// Binding convention: `devicetree-org` or `zephyr`
    #[arg(long)]
    pub binding_type: Option<BindingType>,

    /// Whether to report disabled nodes with a hint
    #[arg(long)]
    pub report_disabled_nodes: Option<bool>,
}
