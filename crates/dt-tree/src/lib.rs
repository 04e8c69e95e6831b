//! # Devicetree model
//!
//! A merged Devicetree: every fragment (`/ { ... };`, `&label { ... };`) folded into one tree of
//! nodes and properties, with the source ranges of every definition kept around for diagnostics.
//!
//! Cell values may still contain preprocessor expressions, which are evaluated lazily against a
//! [`MacroTable`].
//!
//! # Example
//!
//! ```
//! use dt_tree::builder::{cells, TreeBuilder};
//! use dt_tree::{MacroTable, PhandleIndex};
//!
//! let (tree, _src) = TreeBuilder::new()
//!     .root(|root| {
//!         root.node("intc: interrupt-controller", |intc| {
//!             intc.prop("phandle", [cells("1")]);
//!         });
//!     })
//!     .extend("intc", |intc| {
//!         intc.prop("#interrupt-cells", [cells("2")]);
//!     })
//!     .finish();
//!
//! let intc = tree.node_by_path("/interrupt-controller").unwrap();
//! assert_eq!(tree.label("intc"), Some(intc));
//! assert_eq!(tree[intc].definitions.len(), 2);
//! assert!(tree.property(intc, "#interrupt-cells").is_some());
//!
//! let phandles = PhandleIndex::build(&tree, &MacroTable::default());
//! assert_eq!(phandles.get(1), Some(intc));
//! ```

pub use dt_diagnostic::text_range::TextRange;
pub use expr::{BinaryOp, EvalError, Expression, MacroDefinition, MacroTable, UnaryOp};
pub use phandle::{PhandleIndex, PHANDLE_PROPERTIES};
pub use string::{unescape, StringParseError};
pub use tree::{Node, NodeDefinition, NodeId, Property, PropertyId, Tree};
pub use value::{
    parse_number, Cell, CellArray, ParseNumberError, PhandleTarget, PropValue, Spanned,
};

pub mod builder;
mod expr;
mod phandle;
mod string;
mod tree;
mod value;
