//! Cell flattening and `#<x>-cells` counts

use dt_tree::{Cell, EvalError, MacroTable, NodeId, PropValue, Spanned, Tree};
use itertools::Itertools as _;

pub const ADDRESS_CELLS: &str = "#address-cells";
pub const SIZE_CELLS: &str = "#size-cells";

/// `#address-cells` when a node doesn't have one
pub const DEFAULT_ADDRESS_CELLS: usize = 2;
/// `#size-cells` when a node doesn't have one
pub const DEFAULT_SIZE_CELLS: usize = 1;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CellsError {
    #[error("property `{0}` is missing")]
    Missing(String),
    #[error("property `{0}` should be a single cell")]
    NotSingleCell(String),
    #[error("property `{name}` couldn't be evaluated: {source}")]
    Unevaluable {
        name: String,
        #[source]
        source: EvalError,
    },
}

/// Flattens the cell arrays of a property into one sequence.
///
/// Returns `None` if any value isn't a cell array, e.g. `reg = <1 2>, "foo";`.
///
/// # Example
///
/// ```
/// use dt_tree::builder::{cells, TreeBuilder};
/// use dt_typecheck::cells::flatten;
///
/// let (tree, src) = TreeBuilder::new()
///     .root(|root| {
///         root.prop("reg", [cells("1 2"), cells("3")]);
///     })
///     .finish();
/// let reg = tree.property(tree.root(), "reg").unwrap();
/// let flat = flatten(&reg.values).unwrap();
/// let texts: Vec<_> = flat.iter().map(|cell| cell.range.text(&src).unwrap()).collect();
/// assert_eq!(texts, ["1", "2", "3"]);
/// ```
pub fn flatten(values: &[PropValue]) -> Option<Vec<&Spanned<Cell>>> {
    values
        .iter()
        .map(|value| value.as_cells().map(|array| array.cells.iter()))
        .collect::<Option<Vec<_>>>()
        .map(|arrays| arrays.into_iter().flatten().collect())
}

/// Reads a `#<x>-cells` property of `node`.
///
/// Missing `#address-cells` and `#size-cells` fall back to [`DEFAULT_ADDRESS_CELLS`] and
/// [`DEFAULT_SIZE_CELLS`]. Any other missing property is an error.
pub fn cells_of(
    tree: &Tree,
    macros: &MacroTable,
    node: NodeId,
    name: &str,
) -> Result<usize, CellsError> {
    let Some(prop) = tree.property(node, name) else {
        return match name {
            ADDRESS_CELLS => Ok(DEFAULT_ADDRESS_CELLS),
            SIZE_CELLS => Ok(DEFAULT_SIZE_CELLS),
            _ => Err(CellsError::Missing(name.to_owned())),
        };
    };
    let cell = flatten(&prop.values)
        .and_then(|cells| cells.into_iter().exactly_one().ok())
        .ok_or_else(|| CellsError::NotSingleCell(name.to_owned()))?;
    let value = match &cell.value {
        Cell::U32(value) => *value,
        Cell::Expression(expr) => {
            expr.evaluate_cell(macros)
                .map_err(|source| CellsError::Unevaluable {
                    name: name.to_owned(),
                    source,
                })?
        }
        Cell::Phandle(_) => return Err(CellsError::NotSingleCell(name.to_owned())),
    };
    tracing::trace!("{name} = {value}");
    Ok(value as usize)
}

/// Renders the expected layout of one record, e.g. `<address address size>`.
pub fn field_pattern(fields: &[(&str, usize)]) -> String {
    let names = fields
        .iter()
        .flat_map(|&(name, count)| std::iter::repeat(name).take(count))
        .join(" ");
    format!("<{names}>")
}

/// Renders evaluated cells, e.g. `<0x1 0x2>`.
pub fn format_cells(cells: &[u32]) -> String {
    format!(
        "<{}>",
        cells.iter().map(|cell| format!("{cell:#x}")).join(" ")
    )
}
