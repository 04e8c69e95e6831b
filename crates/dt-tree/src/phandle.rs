use rustc_hash::FxHashMap;

use crate::{
    expr::MacroTable,
    tree::{NodeId, PropertyId, Tree},
    value::{Cell, PropValue},
};

/// Properties that explicitly assign a phandle
pub const PHANDLE_PROPERTIES: [&str; 2] = ["phandle", "linux,phandle"];

/// Lookup of explicitly assigned phandle values
///
/// Built once per validation pass, since evaluating a `phandle` value may need macros.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhandleIndex {
    by_value: FxHashMap<u32, Vec<(NodeId, PropertyId)>>,
}

impl PhandleIndex {
    /// Indexes every node with a single-cell `phandle` or `linux,phandle` property.
    ///
    /// Claimants are kept in depth-first document order. A node claiming the same value through
    /// both properties is only listed once.
    pub fn build(tree: &Tree, macros: &MacroTable) -> Self {
        let mut by_value: FxHashMap<u32, Vec<(NodeId, PropertyId)>> = FxHashMap::default();
        for node in tree.dfs() {
            for name in PHANDLE_PROPERTIES {
                let Some(prop) = tree.find_property(node, name) else {
                    continue;
                };
                let Some(value) = single_cell_value(&tree[prop].values, macros) else {
                    continue;
                };
                let claimants = by_value.entry(value).or_default();
                if !claimants.iter().any(|&(claimant, _)| claimant == node) {
                    claimants.push((node, prop));
                }
            }
        }
        Self { by_value }
    }

    /// Returns the first node claiming `phandle`.
    pub fn get(&self, phandle: u32) -> Option<NodeId> {
        self.by_value.get(&phandle)?.first().map(|&(node, _)| node)
    }

    /// Returns every node claiming `phandle`, with the property that claims it.
    pub fn get_all(&self, phandle: u32) -> &[(NodeId, PropertyId)] {
        self.by_value.get(&phandle).map_or(&[], Vec::as_slice)
    }
}

fn single_cell_value(values: &[PropValue], macros: &MacroTable) -> Option<u32> {
    let [PropValue::Cells(cells)] = values else {
        return None;
    };
    let [cell] = cells.cells.as_slice() else {
        return None;
    };
    match &cell.value {
        Cell::U32(value) => Some(*value),
        Cell::Expression(expr) => expr.evaluate_cell(macros).ok(),
        Cell::Phandle(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{cells, TreeBuilder};

    #[test]
    fn claimants_in_document_order() {
        let (tree, _) = TreeBuilder::new()
            .root(|root| {
                root.node("a", |a| {
                    a.prop("phandle", [cells("5")]);
                });
                root.node("b", |b| {
                    b.prop("phandle", [cells("5")]);
                    b.prop("linux,phandle", [cells("5")]);
                });
                root.node("c", |c| {
                    c.prop("phandle", [cells("6 7")]);
                });
            })
            .finish();
        let index = PhandleIndex::build(&tree, &MacroTable::default());
        let a = tree.node_by_path("/a").unwrap();
        let b = tree.node_by_path("/b").unwrap();
        assert_eq!(index.get(5), Some(a));
        assert_eq!(
            index
                .get_all(5)
                .iter()
                .map(|&(node, _)| node)
                .collect::<Vec<_>>(),
            vec![a, b]
        );
        assert_eq!(index.get(6), None);
        assert!(index.get_all(7).is_empty());
    }
}
