//! # Devicetree type checker
//!
//! Validates the nodes of a [`dt_tree::Tree`] against bindings: which properties a node may
//! have, what their values look like, and whether the cells of `reg`, `ranges`, interrupt
//! trees and `<specifier>-map` nexus tables add up.
//!
//! A [`Catalog`] provides the [`NodeType`] of each node: the standard types of the
//! [Devicetree specification][1], and bindings registered per `compatible` string.
//!
//! ```
//! use dt_tree::{builder::{cells, string, TreeBuilder}, MacroTable};
//! use dt_typecheck::{validate_tree, Catalog, Settings};
//!
//! let (tree, _src) = TreeBuilder::new()
//!     .root(|root| {
//!         root.prop("#address-cells", [cells("1")]);
//!         root.prop("#size-cells", [cells("1")]);
//!         root.prop("model", [string("Board")]);
//!         root.prop("compatible", [string("vendor,board")]);
//!         root.node("memory@80000000", |memory| {
//!             memory.prop("device_type", [string("memory")]);
//!             memory.prop("reg", [cells("0x80000000 0x10000000")]);
//!         });
//!     })
//!     .finish();
//! let settings = Settings::default();
//! let (diagnostics, _) = validate_tree(
//!     &tree,
//!     &MacroTable::default(),
//!     &settings,
//!     &Catalog::standard(&settings),
//! );
//! assert!(diagnostics.is_empty());
//! ```
//!
//! [1]: https://www.devicetree.org/specifications/

pub mod cells;
mod context;
pub mod nexus;
mod node_type;
mod property_type;
pub mod reg;
pub mod resolve;
mod settings;
pub mod standard;
mod validator;

#[cfg(test)]
mod tests;

pub use context::Context;
pub use node_type::{ChildNodeTypeFn, MismatchPolicy, NodeCheck, NodeReport, NodeType};
pub use property_type::{
    PropertyCheck, PropertyName, PropertyNodeType, PropertyReport, PropertyType, Requirement,
    RequirementFn, ValuesFn,
};
pub use settings::{BindingType, Settings, UnknownBindingType};
pub use standard::Catalog;
pub use validator::{validate, validate_tree, BindingLookup, ValidationResult};
