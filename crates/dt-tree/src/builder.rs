//! Programmatic tree construction that renders matching DTS text
//!
//! Every range stored in the built [`Tree`] points into the rendered text, so diagnostics can be
//! checked against what a user would see.
//!
//! # Example
//!
//! ```
//! use dt_tree::builder::{cells, string, TreeBuilder};
//!
//! let (tree, src) = TreeBuilder::new()
//!     .root(|root| {
//!         root.prop("#address-cells", [cells("1")]);
//!         root.node("uart0: serial@4600", |uart| {
//!             uart.prop("reg", [cells("0x4600 0x100")]);
//!             uart.prop("status", [string("okay")]);
//!         });
//!     })
//!     .finish();
//!
//! let uart = tree.label("uart0").unwrap();
//! let reg = tree.property(uart, "reg").unwrap();
//! assert_eq!(reg.range.text(&src), Some("reg = <0x4600 0x100>;"));
//! ```

use dt_diagnostic::text_range::TextRange;

use crate::{
    expr::Expression,
    string::unescape,
    tree::{NodeDefinition, NodeId, PropertyId, Tree},
    value::{parse_number, Cell, CellArray, PhandleTarget, PropValue, Spanned},
};

/// A property value to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSpec {
    /// Cells and the text each one is written as
    Cells(Vec<(Cell, String)>),
    /// String contents as written between the quotes
    String(String),
    /// Hex digits as written between the square brackets
    Bytes(String),
    Reference(PhandleTarget),
    Expression(Expression),
}

/// Parses whitespace-separated cell tokens.
///
/// Numbers become [`Cell::U32`], `&label` and `&{/path}` become [`Cell::Phandle`] and anything
/// else is kept as a macro usage.
pub fn cells(text: &str) -> ValueSpec {
    ValueSpec::Cells(
        text.split_whitespace()
            .map(|token| (parse_cell_token(token), token.to_owned()))
            .collect(),
    )
}

/// Cells given directly, rendered with their [`Display`](std::fmt::Display) implementation.
pub fn cell_list(cells: impl IntoIterator<Item = Cell>) -> ValueSpec {
    ValueSpec::Cells(
        cells
            .into_iter()
            .map(|cell| {
                let text = match &cell {
                    Cell::Expression(expr @ Expression::Binary(..)) => expr.to_string(),
                    Cell::Expression(expr) => format!("({expr})"),
                    other => other.to_string(),
                };
                (cell, text)
            })
            .collect(),
    )
}

pub fn string(contents: &str) -> ValueSpec {
    ValueSpec::String(contents.to_owned())
}

pub fn bytes(hex: &str) -> ValueSpec {
    ValueSpec::Bytes(hex.to_owned())
}

/// `&label` outside of a cell array
pub fn reference(label: &str) -> ValueSpec {
    ValueSpec::Reference(PhandleTarget::Label(label.to_owned()))
}

/// `&{/path}` outside of a cell array
pub fn path_reference(path: &str) -> ValueSpec {
    ValueSpec::Reference(PhandleTarget::Path(path.to_owned()))
}

pub fn expression(expr: Expression) -> ValueSpec {
    ValueSpec::Expression(expr)
}

fn parse_cell_token(token: &str) -> Cell {
    if let Some(path) = token
        .strip_prefix("&{")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        return Cell::Phandle(PhandleTarget::Path(path.to_owned()));
    }
    if let Some(label) = token.strip_prefix('&') {
        return Cell::Phandle(PhandleTarget::Label(label.to_owned()));
    }
    match parse_number(token) {
        Ok(value) => {
            u32::try_from(value).map_or(Cell::Expression(Expression::Number(value)), Cell::U32)
        }
        Err(_) => Cell::Expression(Expression::macro_ref(token)),
    }
}

fn parse_bytes(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .chars()
        .filter_map(|c| c.to_digit(16))
        .filter_map(|d| u8::try_from(d).ok())
        .collect();
    digits
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}

/// Builds a [`Tree`] and its DTS text one fragment at a time.
#[derive(Debug)]
pub struct TreeBuilder {
    tree: Tree,
    src: String,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            tree: Tree::new(),
            src: String::from("/dts-v1/;\n\n"),
        }
    }

    /// Renders a `/ { ... };` fragment.
    #[must_use]
    pub fn root(mut self, f: impl FnOnce(&mut NodeBuilder<'_>)) -> Self {
        let root = self.tree.root();
        self.fragment("/", root, false, f);
        self
    }

    /// Renders a `&label { ... };` fragment extending a labeled node.
    ///
    /// Unknown labels render an empty fragment that isn't merged into the tree.
    #[must_use]
    pub fn extend(mut self, label: &str, f: impl FnOnce(&mut NodeBuilder<'_>)) -> Self {
        let name = format!("&{label}");
        match self.tree.label(label) {
            Some(node) => self.fragment(&name, node, true, f),
            None => {
                tracing::warn!("Couldn't find label {label} for extension");
                self.src.push_str(&name);
                self.src.push_str(" {\n};\n");
            }
        }
        self
    }

    fn fragment(
        &mut self,
        name: &str,
        node: NodeId,
        is_reference: bool,
        f: impl FnOnce(&mut NodeBuilder<'_>),
    ) {
        let name_start = self.src.len();
        self.src.push_str(name);
        let name_range = TextRange::new(name_start, self.src.len());
        self.src.push(' ');
        let body_start = self.src.len();
        self.src.push_str("{\n");
        f(&mut NodeBuilder {
            tree: &mut self.tree,
            src: &mut self.src,
            node,
            depth: 1,
        });
        let body_end = self.src.len() + 1;
        self.src.push_str("};\n");
        self.tree.add_definition(
            node,
            NodeDefinition {
                name_range,
                body_range: TextRange::new(body_start, body_end),
                is_reference,
            },
        );
    }

    pub fn finish(self) -> (Tree, String) {
        (self.tree, self.src)
    }
}

/// Renders the contents of one node fragment.
#[derive(Debug)]
pub struct NodeBuilder<'b> {
    tree: &'b mut Tree,
    src: &'b mut String,
    node: NodeId,
    depth: usize,
}

impl NodeBuilder<'_> {
    pub fn id(&self) -> NodeId {
        self.node
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.src.push('\t');
        }
    }

    /// Renders a child node. `header` is the node name, optionally preceded by labels, e.g.
    /// `"uart0: serial@4600"`.
    pub fn node(&mut self, header: &str, f: impl FnOnce(&mut NodeBuilder<'_>)) -> NodeId {
        let mut parts: Vec<&str> = header.split(':').map(str::trim).collect();
        let name = parts.pop().unwrap_or_default();

        self.indent();
        for label in &parts {
            self.src.push_str(label);
            self.src.push_str(": ");
        }
        let name_start = self.src.len();
        self.src.push_str(name);
        let name_range = TextRange::new(name_start, self.src.len());
        self.src.push(' ');
        let body_start = self.src.len();
        self.src.push_str("{\n");

        let id = self.tree.add_child(self.node, name, None);
        for label in parts {
            self.tree.add_label(id, label);
        }
        f(&mut NodeBuilder {
            tree: &mut *self.tree,
            src: &mut *self.src,
            node: id,
            depth: self.depth + 1,
        });

        self.indent();
        let body_end = self.src.len() + 1;
        self.src.push_str("};\n");
        self.tree.add_definition(
            id,
            NodeDefinition {
                name_range,
                body_range: TextRange::new(body_start, body_end),
                is_reference: false,
            },
        );
        id
    }

    /// Renders a property. No values renders an empty property like `dma-coherent;`.
    pub fn prop(&mut self, name: &str, values: impl IntoIterator<Item = ValueSpec>) -> PropertyId {
        self.indent();
        let start = self.src.len();
        self.src.push_str(name);
        let name_range = TextRange::new(start, self.src.len());

        let mut rendered = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            self.src.push_str(if i == 0 { " = " } else { ", " });
            rendered.push(self.render_value(value));
        }
        self.src.push(';');
        let range = TextRange::new(start, self.src.len());
        self.src.push('\n');

        self.tree
            .set_property(self.node, name, name_range, range, rendered)
    }

    /// Shorthand for an empty property
    pub fn flag(&mut self, name: &str) -> PropertyId {
        self.prop(name, [])
    }

    fn render_value(&mut self, value: ValueSpec) -> PropValue {
        let start = self.src.len();
        match value {
            ValueSpec::Cells(cells) => {
                self.src.push('<');
                let mut spanned = Vec::with_capacity(cells.len());
                for (i, (cell, text)) in cells.into_iter().enumerate() {
                    if i != 0 {
                        self.src.push(' ');
                    }
                    let cell_start = self.src.len();
                    self.src.push_str(&text);
                    spanned.push(Spanned::new(cell, TextRange::new(cell_start, self.src.len())));
                }
                self.src.push('>');
                PropValue::Cells(CellArray {
                    cells: spanned,
                    range: TextRange::new(start, self.src.len()),
                })
            }
            ValueSpec::String(contents) => {
                self.src.push('"');
                self.src.push_str(&contents);
                self.src.push('"');
                let value = unescape(&contents).map_or(contents.clone(), |s| s.into_owned());
                PropValue::String(Spanned::new(value, TextRange::new(start, self.src.len())))
            }
            ValueSpec::Bytes(hex) => {
                self.src.push('[');
                self.src.push_str(&hex);
                self.src.push(']');
                PropValue::Bytestring(Spanned::new(
                    parse_bytes(&hex),
                    TextRange::new(start, self.src.len()),
                ))
            }
            ValueSpec::Reference(target) => {
                self.src.push_str(&target.to_string());
                PropValue::Phandle(Spanned::new(target, TextRange::new(start, self.src.len())))
            }
            ValueSpec::Expression(expr) => {
                self.src.push_str(&expr.to_string());
                PropValue::Expression(Spanned::new(expr, TextRange::new(start, self.src.len())))
            }
        }
    }
}
