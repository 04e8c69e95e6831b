//! `reg`, `ranges` and `dma-ranges`

use dt_diagnostic::{text_range::TextRange, Diagnostic, StandardTypeIssue, TextEdit};
use dt_tree::{Cell, NodeId, PropertyId, Spanned};

use crate::{
    cells::{field_pattern, flatten, CellsError},
    context::Context,
    property_type::PropertyReport,
};

/// Composes cells big-endian, e.g. `<0x1 0x80000000>` to `0x1_8000_0000`.
pub fn compose(cells: &[u32]) -> u128 {
    cells
        .iter()
        .fold(0, |acc, &cell| (acc << 32) | u128::from(cell))
}

fn cell_counts(counts: &[Result<usize, CellsError>]) -> Option<Vec<usize>> {
    counts
        .iter()
        .map(|count| match count {
            Ok(count) => Some(*count),
            Err(err) => {
                tracing::debug!("Skipping cell count checks: {err}");
                None
            }
        })
        .collect()
}

/// Reports a trailing partial record, anchored at its first cell.
fn trailing_record(
    name: &str,
    cells: &[&Spanned<Cell>],
    fields: &[(&str, usize)],
) -> Option<Diagnostic> {
    let width: usize = fields.iter().map(|&(_, count)| count).sum();
    if width == 0 {
        return None;
    }
    let trailing = cells.len() % width;
    (trailing != 0).then(|| {
        Diagnostic::issue(
            StandardTypeIssue::CellMissMatch,
            cells[cells.len() - trailing].range,
            [name.to_owned(), width.to_string(), field_pattern(fields)],
        )
    })
}

/// Returns edits renaming every definition of `node` to have the unit address `address`.
pub fn unit_address_edits(ctx: &Context<'_>, node: NodeId, address: &str) -> Vec<TextEdit> {
    let name = &ctx.tree[node].name;
    ctx.tree[node]
        .definitions
        .iter()
        .filter(|def| !def.is_reference)
        .map(|def| TextEdit::replace(def.name_range, format!("{name}@{address}")))
        .collect()
}

/// Computes the unit address `reg` implies, e.g. `4600` for `reg = <0x4600 0x100>;`.
pub fn reg_unit_address(ctx: &Context<'_>, node: NodeId) -> Option<String> {
    let reg = ctx.tree.property(node, "reg")?;
    let cells = flatten(&reg.values)?;
    let address_cells = ctx.parent_address_cells(node).ok()?;
    if address_cells == 0 {
        return None;
    }
    let address = ctx.evaluate_all(cells.get(..address_cells)?.iter().map(|cell| &cell.value))?;
    Some(format!("{:x}", compose(&address)))
}

/// Whether the first address of `reg` matches the unit address
///
/// A single unit address component is compared with the composed address, otherwise each
/// component with its cell. Other shapes can't be compared and match.
fn address_matches(reg: &[u32], unit: &[u64]) -> bool {
    match unit {
        [single] => compose(reg) == u128::from(*single),
        _ if unit.len() == reg.len() => reg.iter().zip(unit).all(|(&r, &u)| u64::from(r) == u),
        _ => true,
    }
}

/// Checks `reg` against the parent's `#address-cells` and `#size-cells` and the unit address.
pub fn check_reg(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let property = &ctx.tree[prop];
    let node = property.node;
    let mut report = PropertyReport::default();
    let Some(cells) = flatten(&property.values) else {
        return report;
    };
    let Some(counts) = cell_counts(&[ctx.parent_address_cells(node), ctx.parent_size_cells(node)])
    else {
        return report;
    };
    let [address_cells, size_cells] = counts[..] else {
        return report;
    };
    report.diagnostics.extend(trailing_record(
        &property.name,
        &cells,
        &[("address", address_cells), ("size", size_cells)],
    ));

    let Some(unit) = ctx.tree[node].address() else {
        return report;
    };
    let Some(address_cells) = cells.get(..address_cells).filter(|cells| !cells.is_empty()) else {
        return report;
    };
    let Some(address) = ctx.evaluate_all(address_cells.iter().map(|cell| &cell.value)) else {
        return report;
    };
    if !address_matches(&address, &unit) {
        let range =
            TextRange::cover(address_cells.iter().map(|cell| cell.range)).unwrap_or_default();
        let computed = format!("{:x}", compose(&address));
        let unit_address = ctx.tree[node].unit_address.clone().unwrap_or_default();
        report.push(
            Diagnostic::issue(
                StandardTypeIssue::MismatchNodeAddressRefAddressValue,
                range,
                [format!("{:#x}", compose(&address)), unit_address],
            )
            .with_suggestion(
                format!("Rename the node to `{}@{computed}`", ctx.tree[node].name),
                unit_address_edits(ctx, node, &computed),
            ),
        );
    }
    report
}

/// Checks that `ranges` or `dma-ranges` is a whole number of
/// `<child-address parent-address size>` records.
pub fn check_ranges(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let property = &ctx.tree[prop];
    let node = property.node;
    let Some(cells) = flatten(&property.values) else {
        return PropertyReport::default();
    };
    let Some(counts) = cell_counts(&[
        ctx.address_cells(node),
        ctx.parent_address_cells(node),
        ctx.size_cells(node),
    ]) else {
        return PropertyReport::default();
    };
    let [child_address, parent_address, size] = counts[..] else {
        return PropertyReport::default();
    };
    trailing_record(
        &property.name,
        &cells,
        &[
            ("child-address", child_address),
            ("parent-address", parent_address),
            ("size", size),
        ],
    )
    .into_iter()
    .collect::<Vec<_>>()
    .into()
}
