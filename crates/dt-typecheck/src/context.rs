use dt_tree::{Cell, MacroTable, NodeId, PhandleIndex, PropValue, PropertyId, Tree};

use crate::{
    cells::{self, CellsError, DEFAULT_ADDRESS_CELLS, DEFAULT_SIZE_CELLS},
    resolve,
    settings::Settings,
};

/// Everything a validator may read during one validation pass
///
/// The tree, macros and settings are frozen for the duration of the pass.
#[derive(Debug, Clone)]
pub struct Context<'t> {
    pub tree: &'t Tree,
    pub macros: &'t MacroTable,
    pub settings: &'t Settings,
    phandles: PhandleIndex,
}

impl<'t> Context<'t> {
    pub fn new(tree: &'t Tree, macros: &'t MacroTable, settings: &'t Settings) -> Self {
        Self {
            tree,
            macros,
            settings,
            phandles: PhandleIndex::build(tree, macros),
        }
    }

    pub fn phandles(&self) -> &PhandleIndex {
        &self.phandles
    }

    /// Evaluates a cell. References evaluate to the explicit phandle of their target.
    pub fn evaluate(&self, cell: &Cell) -> Option<u32> {
        match cell {
            Cell::U32(value) => Some(*value),
            Cell::Expression(expr) => expr.evaluate_cell(self.macros).ok(),
            Cell::Phandle(target) => {
                let node = resolve::resolve_target(self, target)?;
                self.phandle_of(node)
            }
        }
    }

    /// Evaluates every cell, or returns `None` if any of them can't be evaluated.
    pub fn evaluate_all<'c>(
        &self,
        cells: impl IntoIterator<Item = &'c Cell>,
    ) -> Option<smallvec::SmallVec<[u32; 4]>> {
        cells.into_iter().map(|cell| self.evaluate(cell)).collect()
    }

    /// Returns the phandle a node claims explicitly.
    pub fn phandle_of(&self, node: NodeId) -> Option<u32> {
        dt_tree::PHANDLE_PROPERTIES.iter().find_map(|name| {
            let prop = self.tree.property(node, name)?;
            let [PropValue::Cells(array)] = prop.values.as_slice() else {
                return None;
            };
            let [cell] = array.cells.as_slice() else {
                return None;
            };
            match &cell.value {
                Cell::U32(value) => Some(*value),
                Cell::Expression(expr) => expr.evaluate_cell(self.macros).ok(),
                Cell::Phandle(_) => None,
            }
        })
    }

    /// See [`cells::cells_of`].
    pub fn cells_of(&self, node: NodeId, name: &str) -> Result<usize, CellsError> {
        cells::cells_of(self.tree, self.macros, node, name)
    }

    pub fn address_cells(&self, node: NodeId) -> Result<usize, CellsError> {
        self.cells_of(node, cells::ADDRESS_CELLS)
    }

    pub fn size_cells(&self, node: NodeId) -> Result<usize, CellsError> {
        self.cells_of(node, cells::SIZE_CELLS)
    }

    /// `#address-cells` of the parent, which is what `reg` of `node` is encoded with.
    pub fn parent_address_cells(&self, node: NodeId) -> Result<usize, CellsError> {
        self.tree
            .parent(node)
            .map_or(Ok(DEFAULT_ADDRESS_CELLS), |parent| self.address_cells(parent))
    }

    pub fn parent_size_cells(&self, node: NodeId) -> Result<usize, CellsError> {
        self.tree
            .parent(node)
            .map_or(Ok(DEFAULT_SIZE_CELLS), |parent| self.size_cells(parent))
    }

    /// Returns the `status` property of `node` if it disables the node.
    ///
    /// `okay` and `ok` enable a node, any other string disables it.
    pub fn disabling_status(&self, node: NodeId) -> Option<PropertyId> {
        let prop = self.tree.find_property(node, "status")?;
        let [PropValue::String(status)] = self.tree[prop].values.as_slice() else {
            return None;
        };
        (!matches!(status.value.as_str(), "okay" | "ok")).then_some(prop)
    }

    /// Returns whether `node` or any of its ancestors is disabled.
    pub fn is_disabled(&self, node: NodeId) -> bool {
        std::iter::once(node)
            .chain(self.tree.ancestors(node))
            .any(|node| self.disabling_status(node).is_some())
    }
}
