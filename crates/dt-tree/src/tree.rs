use std::{borrow::Cow, ops::Index};

use dt_diagnostic::text_range::TextRange;
use rustc_hash::FxHashMap;

use crate::value::PropValue;

/// Index of a [`Node`] in its [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

/// Index of a [`Property`] in its [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(usize);

/// One place a node is written
///
/// A node can be defined in multiple fragments, e.g. `/ { uart0: serial@4600 {}; };` and
/// `&uart0 { status = "okay"; };`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeDefinition {
    /// Range of the name, e.g. `serial@4600`, or `&uart0` for extensions
    pub name_range: TextRange,
    /// Range from the opening curly brace to the closing one, inclusive
    pub body_range: TextRange,
    /// Whether this fragment is a `&label { ... }` extension
    pub is_reference: bool,
}

#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Name without the unit address
    pub name: String,
    /// Text after `@`, if any
    pub unit_address: Option<String>,
    pub labels: Vec<String>,
    #[debug(skip)]
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub properties: Vec<PropertyId>,
    /// Definitions in source order
    pub definitions: Vec<NodeDefinition>,
}

impl Node {
    fn new(full_name: &str, parent: Option<NodeId>) -> Self {
        let (name, unit_address) = match full_name.split_once('@') {
            Some((name, address)) => (name.to_owned(), Some(address.to_owned())),
            None => (full_name.to_owned(), None),
        };
        Self {
            name,
            unit_address,
            labels: Vec::new(),
            parent,
            children: Vec::new(),
            properties: Vec::new(),
            definitions: Vec::new(),
        }
    }

    /// Returns `name@unit-address`, or just the name when there is no unit address.
    pub fn full_name(&self) -> Cow<'_, str> {
        match &self.unit_address {
            Some(address) => Cow::Owned(format!("{}@{address}", self.name)),
            None => Cow::Borrowed(&self.name),
        }
    }

    /// Parses the unit address as comma-separated hexadecimal components.
    ///
    /// Returns `None` when there's no unit address or a component isn't hexadecimal.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_tree::Tree;
    ///
    /// let mut tree = Tree::new();
    /// let node = tree.add_child(tree.root(), "pci@1,0", None);
    /// assert_eq!(tree[node].address(), Some(vec![1, 0]));
    /// ```
    pub fn address(&self) -> Option<Vec<u64>> {
        self.unit_address
            .as_deref()?
            .split(',')
            .map(|component| u64::from_str_radix(component, 16).ok())
            .collect()
    }
}

#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    #[debug(skip)]
    pub node: NodeId,
    pub name_range: TextRange,
    /// Range of the whole property, including the semicolon
    pub range: TextRange,
    pub values: Vec<PropValue>,
}

impl Property {
    /// Returns the range covering all values, or the name's range for empty properties.
    pub fn value_range(&self) -> TextRange {
        TextRange::cover(self.values.iter().map(PropValue::text_range)).unwrap_or(self.name_range)
    }
}

/// A merged Devicetree
///
/// Nodes and properties live in arenas and are referenced by [`NodeId`] and [`PropertyId`].
/// Ids are only meaningful for the tree that created them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Node>,
    properties: Vec<Property>,
    labels: FxHashMap<String, NodeId>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, index: NodeId) -> &Self::Output {
        &self.nodes[index.0]
    }
}

impl Index<PropertyId> for Tree {
    type Output = Property;

    fn index(&self, index: PropertyId) -> &Self::Output {
        &self.properties[index.0]
    }
}

impl Tree {
    /// Creates a tree with only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("/", None)],
            properties: Vec::new(),
            labels: FxHashMap::default(),
        }
    }

    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Adds a child node, merging it into an existing child with the same full name.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        full_name: &str,
        definition: Option<NodeDefinition>,
    ) -> NodeId {
        let existing = self[parent]
            .children
            .iter()
            .copied()
            .find(|&child| self[child].full_name() == full_name);
        let id = existing.unwrap_or_else(|| {
            let id = NodeId(self.nodes.len());
            self.nodes.push(Node::new(full_name, Some(parent)));
            self.nodes[parent.0].children.push(id);
            id
        });
        if let Some(definition) = definition {
            self.add_definition(id, definition);
        }
        id
    }

    pub fn add_definition(&mut self, node: NodeId, definition: NodeDefinition) {
        self.nodes[node.0].definitions.push(definition);
    }

    /// Sets a property, replacing an earlier definition with the same name.
    pub fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        name_range: TextRange,
        range: TextRange,
        values: Vec<PropValue>,
    ) -> PropertyId {
        let property = Property {
            name: name.to_owned(),
            node,
            name_range,
            range,
            values,
        };
        if let Some(id) = self.find_property(node, name) {
            self.properties[id.0] = property;
            return id;
        }
        let id = PropertyId(self.properties.len());
        self.properties.push(property);
        self.nodes[node.0].properties.push(id);
        id
    }

    /// Links a label to a node.
    ///
    /// Returns the previously linked node if the label was already defined.
    pub fn add_label(&mut self, node: NodeId, label: &str) -> Option<NodeId> {
        self.nodes[node.0].labels.push(label.to_owned());
        self.labels.insert(label.to_owned(), node)
    }

    pub fn label(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self[node].parent
    }

    /// Iterates over the ancestors of `node`, nearest first, not including `node` itself.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), |&node| self.parent(node))
    }

    pub fn find_property(&self, node: NodeId, name: &str) -> Option<PropertyId> {
        self[node]
            .properties
            .iter()
            .copied()
            .find(|&prop| self[prop].name == name)
    }

    pub fn property(&self, node: NodeId, name: &str) -> Option<&Property> {
        self.find_property(node, name).map(|id| &self[id])
    }

    /// Finds a child by full name, or by name alone if that is unambiguous.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let children = &self[parent].children;
        if let Some(&exact) = children.iter().find(|&&c| self[c].full_name() == name) {
            return Some(exact);
        }
        let mut by_name = children.iter().copied().filter(|&c| self[c].name == name);
        match (by_name.next(), by_name.next()) {
            (Some(only), None) => Some(only),
            _ => None,
        }
    }

    /// Looks up a node by path.
    ///
    /// Absolute paths start at the root, otherwise the first component is a label.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_tree::Tree;
    ///
    /// let mut tree = Tree::new();
    /// let soc = tree.add_child(tree.root(), "soc", None);
    /// let uart = tree.add_child(soc, "serial@4600", None);
    /// tree.add_label(soc, "bus");
    ///
    /// assert_eq!(tree.node_by_path("/soc/serial@4600"), Some(uart));
    /// assert_eq!(tree.node_by_path("/soc/serial"), Some(uart));
    /// assert_eq!(tree.node_by_path("bus/serial"), Some(uart));
    /// assert_eq!(tree.node_by_path("/"), Some(tree.root()));
    /// assert_eq!(tree.node_by_path("/nope"), None);
    /// ```
    pub fn node_by_path(&self, path: &str) -> Option<NodeId> {
        let (start, rest) = match path.strip_prefix('/') {
            Some(rest) => (self.root(), rest),
            None => {
                let (label, rest) = path.split_once('/').unwrap_or((path, ""));
                (self.label(label)?, rest)
            }
        };
        rest.split('/')
            .filter(|component| !component.is_empty())
            .try_fold(start, |node, component| self.child(node, component))
    }

    /// Returns the absolute path of a node.
    pub fn path(&self, node: NodeId) -> String {
        if node == self.root() {
            return "/".to_owned();
        }
        let mut components: Vec<_> = std::iter::once(node)
            .chain(self.ancestors(node))
            .filter(|&n| n != self.root())
            .map(|n| self[n].full_name())
            .collect();
        components.reverse();
        components.into_iter().fold(String::new(), |mut path, component| {
            path.push('/');
            path.push_str(&component);
            path
        })
    }

    /// Iterates over all nodes depth-first in document order, starting at the root.
    pub fn dfs(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![self.root()];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(self[node].children.iter().rev().copied());
            Some(node)
        })
    }

    /// Iterates over the properties of a node.
    pub fn properties(&self, node: NodeId) -> impl Iterator<Item = (PropertyId, &Property)> + '_ {
        self[node].properties.iter().map(|&id| (id, &self[id]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_fragments() {
        let mut tree = Tree::new();
        let def = |start| NodeDefinition {
            name_range: TextRange::new(start, start + 1),
            body_range: TextRange::new(start + 2, start + 4),
            is_reference: false,
        };
        let a = tree.add_child(tree.root(), "a", Some(def(0)));
        let again = tree.add_child(tree.root(), "a", Some(def(10)));
        assert_eq!(a, again);
        assert_eq!(tree[a].definitions.len(), 2);
        assert_eq!(tree[tree.root()].children, vec![a]);
    }

    #[test]
    fn later_property_wins() {
        let mut tree = Tree::new();
        let root = tree.root();
        let first = tree.set_property(
            root,
            "model",
            TextRange::new(0, 5),
            TextRange::new(0, 9),
            vec![],
        );
        let second = tree.set_property(
            root,
            "model",
            TextRange::new(20, 25),
            TextRange::new(20, 29),
            vec![],
        );
        assert_eq!(first, second);
        assert_eq!(tree[first].name_range, TextRange::new(20, 25));
        assert_eq!(tree.properties(root).count(), 1);
    }

    #[test]
    fn ambiguous_bare_name() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.add_child(root, "memory@0", None);
        tree.add_child(root, "memory@80000000", None);
        assert_eq!(tree.child(root, "memory"), None);
        assert!(tree.child(root, "memory@0").is_some());
    }

    #[test]
    fn paths_and_dfs() {
        let mut tree = Tree::new();
        let root = tree.root();
        let soc = tree.add_child(root, "soc", None);
        let uart = tree.add_child(soc, "serial@4600", None);
        let cpus = tree.add_child(root, "cpus", None);
        assert_eq!(tree.path(uart), "/soc/serial@4600");
        assert_eq!(tree.path(root), "/");
        assert_eq!(tree.dfs().collect::<Vec<_>>(), vec![root, soc, uart, cpus]);
        assert_eq!(tree.ancestors(uart).collect::<Vec<_>>(), vec![soc, root]);
    }

    #[test]
    fn unit_addresses() {
        let mut tree = Tree::new();
        let a = tree.add_child(tree.root(), "a@zz", None);
        let b = tree.add_child(tree.root(), "b", None);
        assert_eq!(tree[a].address(), None);
        assert_eq!(tree[b].address(), None);
        assert_eq!(tree[a].full_name(), "a@zz");
    }
}
