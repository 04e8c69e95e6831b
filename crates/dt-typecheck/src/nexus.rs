//! Nexus decoding
//!
//! Interrupt trees, `<specifier>-map` tables and phandle-array consumers (`interrupts-extended`,
//! `gpios`, ...) all encode variable-width records whose field widths come from `#<x>-cells` of
//! nodes referenced in the records themselves. [`decode_map`] walks such a table once, and the
//! consumer checks look decoded specifiers up in it.

use std::ops::Range;

use dt_diagnostic::{text_range::TextRange, Diagnostic, StandardTypeIssue};
use dt_tree::{Cell, NodeId, Property, PropertyId, Spanned, Tree};
use itertools::Itertools as _;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::{
    cells::{field_pattern, flatten, format_cells, CellsError, ADDRESS_CELLS},
    context::Context,
    property_type::PropertyReport,
    resolve::resolve_cell,
};

/// Evaluated specifier cells
pub type Specifier = SmallVec<[u32; 4]>;

const INTERRUPT: &str = "interrupt";

/// How the entries of a map property are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapLayout<'a> {
    /// e.g. `interrupt` for `interrupt-map` and `#interrupt-cells`
    pub specifier: &'a str,
    /// Width of the child unit address in front of the child specifier
    pub child_address_cells: usize,
    /// Whether entries have a parent unit address sized by the parent's `#address-cells`
    pub parent_address: bool,
}

impl<'a> MapLayout<'a> {
    /// Layout of a generic `<specifier>-map`
    pub const fn specifier_map(specifier: &'a str) -> Self {
        Self {
            specifier,
            child_address_cells: 0,
            parent_address: false,
        }
    }

    /// Layout of `interrupt-map` on `nexus`
    pub fn interrupt_map(ctx: &Context<'_>, nexus: NodeId) -> Result<Self, CellsError> {
        Ok(Self {
            specifier: INTERRUPT,
            child_address_cells: ctx.address_cells(nexus)?,
            parent_address: true,
        })
    }

    /// Layout of the map a `specifier` consumer is looked up in
    pub fn for_specifier(
        ctx: &Context<'_>,
        nexus: NodeId,
        specifier: &'a str,
    ) -> Result<Self, CellsError> {
        if specifier == INTERRUPT {
            MapLayout::interrupt_map(ctx, nexus)
        } else {
            Ok(Self::specifier_map(specifier))
        }
    }

    pub fn cells_property(&self) -> String {
        format!("#{}-cells", self.specifier)
    }

    pub fn map_property(&self) -> String {
        format!("{}-map", self.specifier)
    }
}

/// One decoded map entry. Fields are index ranges into [`DecodedMap::cells`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub child_address: Range<usize>,
    pub child_specifier: Range<usize>,
    /// Index of the specifier parent's phandle
    pub phandle: usize,
    pub parent: NodeId,
    pub parent_address: Range<usize>,
    pub parent_specifier: Range<usize>,
}

impl MapEntry {
    /// All cells of the entry
    pub fn cells(&self) -> Range<usize> {
        self.child_address.start..self.parent_specifier.end
    }

    /// The child unit address and specifier the entry is matched by
    pub fn key(&self) -> Range<usize> {
        self.child_address.start..self.child_specifier.end
    }
}

/// A decoded map property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMap<'t> {
    pub prop: PropertyId,
    pub cells: Vec<&'t Spanned<Cell>>,
    /// Complete entries in source order
    pub entries: Vec<MapEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DecodedMap<'_> {
    /// Returns the range covering `cells`.
    pub fn range(&self, cells: Range<usize>) -> TextRange {
        TextRange::cover(self.cells[cells].iter().map(|cell| cell.range)).unwrap_or_default()
    }

    fn evaluate(&self, ctx: &Context<'_>, cells: Range<usize>) -> Option<Specifier> {
        ctx.evaluate_all(self.cells[cells].iter().map(|cell| &cell.value))
    }

    /// Finds the first entry whose key matches `key` after masking both with `mask`.
    ///
    /// Missing mask cells match exactly.
    pub fn lookup(
        &self,
        ctx: &Context<'_>,
        key: &[u32],
        mask: &[u32],
    ) -> Option<(usize, &MapEntry)> {
        self.entries.iter().enumerate().find(|(_, entry)| {
            let Some(entry_key) = self.evaluate(ctx, entry.key()) else {
                return false;
            };
            entry_key.len() == key.len()
                && entry_key
                    .iter()
                    .zip(key)
                    .enumerate()
                    .all(|(i, (a, b))| {
                        let mask = mask.get(i).copied().unwrap_or(u32::MAX);
                        a & mask == b & mask
                    })
        })
    }
}

/// Decodes the entries of a map property.
///
/// Decoding stops at the first entry that can't be decoded: a dangling phandle, a missing
/// `#<x>-cells` or a cut-off entry. Widths that can't be evaluated abort silently.
pub fn decode_map<'t>(
    ctx: &Context<'t>,
    prop: PropertyId,
    layout: MapLayout<'_>,
) -> DecodedMap<'t> {
    let tree: &'t Tree = ctx.tree;
    let property = &tree[prop];
    let node = property.node;
    let mut decoded = DecodedMap {
        prop,
        cells: flatten(&property.values).unwrap_or_default(),
        entries: Vec::new(),
        diagnostics: Vec::new(),
    };
    let cells_property = layout.cells_property();
    let child_specifier_cells = match ctx.cells_of(node, &cells_property) {
        Ok(width) => width,
        Err(err) => {
            decoded
                .diagnostics
                .extend(missing_cells(ctx, property, node, &err, property.name_range));
            return decoded;
        }
    };

    let len = decoded.cells.len();
    let mut start = 0;
    while start < len {
        let phandle = start + layout.child_address_cells + child_specifier_cells;
        let mut fields = [
            ("child unit address", Some(layout.child_address_cells)),
            ("child specifier", Some(child_specifier_cells)),
            ("parent phandle", Some(1)),
            (
                "parent unit address",
                if layout.parent_address { None } else { Some(0) },
            ),
            ("parent specifier", None),
        ];
        if phandle >= len {
            decoded
                .diagnostics
                .push(incomplete(&decoded, property, start, &fields));
            break;
        }

        let phandle_cell = decoded.cells[phandle];
        let Some(parent) = resolve_cell(ctx, &phandle_cell.value) else {
            decoded.diagnostics.push(Diagnostic::issue(
                StandardTypeIssue::InterruptsParentNodeNotFound,
                phandle_cell.range,
                [phandle_cell.value.to_string()],
            ));
            break;
        };
        let parent_address_cells = if layout.parent_address {
            // Linux treats a missing `#address-cells` on the parent as 0 here
            match tree
                .find_property(parent, ADDRESS_CELLS)
                .map_or(Ok(0), |_| ctx.address_cells(parent))
            {
                Ok(width) => width,
                Err(err) => {
                    tracing::debug!("Aborting decode of `{}`: {err}", property.name);
                    break;
                }
            }
        } else {
            0
        };
        let parent_specifier_cells = match ctx.cells_of(parent, &cells_property) {
            Ok(width) => width,
            Err(err) => {
                decoded
                    .diagnostics
                    .extend(missing_cells(ctx, property, parent, &err, phandle_cell.range));
                break;
            }
        };

        let parent_address = phandle + 1..phandle + 1 + parent_address_cells;
        let parent_specifier = parent_address.end..parent_address.end + parent_specifier_cells;
        if parent_specifier.end > len {
            fields[3].1 = Some(parent_address_cells);
            fields[4].1 = Some(parent_specifier_cells);
            decoded
                .diagnostics
                .push(incomplete(&decoded, property, start, &fields));
            break;
        }
        let entry = MapEntry {
            child_address: start..start + layout.child_address_cells,
            child_specifier: start + layout.child_address_cells..phandle,
            phandle,
            parent,
            parent_address,
            parent_specifier,
        };
        tracing::trace!(
            "{} entry {} -> {}",
            property.name,
            decoded.entries.len(),
            tree.path(parent)
        );
        start = entry.parent_specifier.end;
        decoded.entries.push(entry);
    }

    let duplicates = duplicate_entries(ctx, &decoded, property);
    decoded.diagnostics.extend(duplicates);
    decoded
}

fn incomplete(
    decoded: &DecodedMap<'_>,
    property: &Property,
    start: usize,
    fields: &[(&'static str, Option<usize>)],
) -> Diagnostic {
    let available = decoded.cells.len() - start;
    let mut consumed = 0;
    let missing = fields
        .iter()
        .filter_map(|&(name, width)| {
            // Unknown widths come after the cut-off, so they count as at least one cell
            let width = width.unwrap_or(1);
            if width == 0 {
                return None;
            }
            consumed += width;
            (consumed > available).then_some(name)
        })
        .join(", ");
    Diagnostic::issue(
        StandardTypeIssue::MapEntryIncomplete,
        decoded.range(start..decoded.cells.len()),
        [property.name.clone(), missing],
    )
}

/// Reports entries with the same unmasked key on the last occurrence, linked to the earlier
/// ones.
fn duplicate_entries(
    ctx: &Context<'_>,
    decoded: &DecodedMap<'_>,
    property: &Property,
) -> Vec<Diagnostic> {
    let mut groups: Vec<(Specifier, Vec<usize>)> = Vec::new();
    let mut by_key: FxHashMap<Specifier, usize> = FxHashMap::default();
    for (i, entry) in decoded.entries.iter().enumerate() {
        let Some(key) = decoded.evaluate(ctx, entry.key()) else {
            continue;
        };
        match by_key.get(&key) {
            Some(&group) => groups[group].1.push(i),
            None => {
                by_key.insert(key.clone(), groups.len());
                groups.push((key, vec![i]));
            }
        }
    }

    groups
        .into_iter()
        .filter_map(|(key, occurrences)| {
            let (&last, earlier) = occurrences.split_last()?;
            if earlier.is_empty() {
                return None;
            }
            let diag = Diagnostic::issue(
                StandardTypeIssue::DuplicateMapEntry,
                decoded.range(decoded.entries[last].cells()),
                [property.name.clone(), format_cells(&key)],
            );
            Some(earlier.iter().fold(diag, |diag, &i| {
                diag.with_label(
                    decoded.range(decoded.entries[i].cells()),
                    "previous entry here",
                )
            }))
        })
        .collect()
}

/// Turns a missing `#<x>-cells` on `holder` into a diagnostic. Other errors are logged since
/// the `#<x>-cells` property reports them itself.
pub(crate) fn missing_cells(
    ctx: &Context<'_>,
    property: &Property,
    holder: NodeId,
    err: &CellsError,
    range: TextRange,
) -> Option<Diagnostic> {
    let CellsError::Missing(missing) = err else {
        tracing::debug!("Skipping checks of `{}`: {err}", property.name);
        return None;
    };
    let diag = Diagnostic::issue(
        StandardTypeIssue::PropertyRequiresOtherPropertyInNode,
        range,
        [property.name.clone(), missing.clone(), ctx.tree.path(holder)],
    );
    Some(
        match ctx.tree[holder].definitions.first() {
            Some(def) if holder != property.node => diag.with_label(def.name_range, "defined here"),
            _ => diag,
        },
    )
}

/// A consumer specifier and what it resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NexusMapping {
    /// Range of the specifier cells, including the phandle for phandle arrays
    pub range: TextRange,
    /// The controller or nexus interpreting the specifier
    pub target: NodeId,
    /// `None` if a cell couldn't be evaluated
    pub specifier: Option<Specifier>,
    /// The map entry the specifier was translated through, if the target is a nexus
    pub resolved: Option<MapResolution>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapResolution {
    pub map: PropertyId,
    /// Index of the entry in [`DecodedMap::entries`]
    pub entry: usize,
    pub parent: NodeId,
    /// Parent specifier with `<x>-map-pass-thru` applied, `None` if a cell couldn't be evaluated
    pub parent_specifier: Option<Specifier>,
}

/// Reads an optional cell property like `interrupt-map-mask`.
fn read_cells(ctx: &Context<'_>, node: NodeId, name: &str) -> Option<Specifier> {
    let prop = ctx.tree.property(node, name)?;
    ctx.evaluate_all(flatten(&prop.values)?.into_iter().map(|cell| &cell.value))
}

/// The first `width` cells of `reg`, which `interrupt-map` matches the child unit address with
fn unit_address_cells(ctx: &Context<'_>, node: NodeId, width: usize) -> Option<Specifier> {
    if width == 0 {
        return Some(Specifier::new());
    }
    let reg = ctx.tree.property(node, "reg")?;
    let cells = flatten(&reg.values)?;
    ctx.evaluate_all(cells.get(..width)?.iter().map(|cell| &cell.value))
}

/// Builds the mapping of one consumer group and looks it up if `target` is a nexus.
fn map_group(
    ctx: &Context<'_>,
    consumer: NodeId,
    target: NodeId,
    specifier_name: &str,
    group: &[&Spanned<Cell>],
    range: TextRange,
    diagnostics: &mut Vec<Diagnostic>,
) -> NexusMapping {
    let specifier = ctx.evaluate_all(group.iter().map(|cell| &cell.value));
    let mut mapping = NexusMapping {
        range,
        target,
        specifier: specifier.clone(),
        resolved: None,
    };
    let Some(specifier) = specifier else {
        return mapping;
    };
    let layout = match MapLayout::for_specifier(ctx, target, specifier_name) {
        Ok(layout) => layout,
        Err(err) => {
            tracing::debug!("Not looking up {}: {err}", format_cells(&specifier));
            return mapping;
        }
    };
    let map_name = layout.map_property();
    let Some(map) = ctx.tree.find_property(target, &map_name) else {
        return mapping;
    };
    let Some(mut key) = unit_address_cells(ctx, consumer, layout.child_address_cells) else {
        tracing::debug!("No unit address of {} to look up", ctx.tree.path(consumer));
        return mapping;
    };
    key.extend_from_slice(&specifier);

    let decoded = decode_map(ctx, map, layout);
    let mask = read_cells(ctx, target, &format!("{map_name}-mask")).unwrap_or_default();
    match decoded.lookup(ctx, &key, &mask) {
        Some((entry_index, entry)) => {
            let pass_thru =
                read_cells(ctx, target, &format!("{map_name}-pass-thru")).unwrap_or_default();
            let parent_specifier = decoded
                .evaluate(ctx, entry.parent_specifier.clone())
                .map(|parent| {
                    parent
                        .iter()
                        .enumerate()
                        .map(|(i, &cell)| {
                            let pass = pass_thru.get(i).copied().unwrap_or(0);
                            let child = specifier.get(i).copied().unwrap_or(0);
                            (cell & !pass) | (child & pass)
                        })
                        .collect()
                });
            mapping.resolved = Some(MapResolution {
                map,
                entry: entry_index,
                parent: entry.parent,
                parent_specifier,
            });
        }
        None => diagnostics.push(
            Diagnostic::issue(
                StandardTypeIssue::NoNexusMapMatch,
                range,
                [map_name, ctx.tree.path(target), format_cells(&key)],
            )
            .with_label(ctx.tree[map].name_range, "map defined here"),
        ),
    }
    mapping
}

/// Checks a phandle array like `interrupts-extended = <&intc 5 1>, <&gpio 3>;`, where each
/// entry's width is `#<specifier>-cells` of the referenced node.
///
/// A phandle of 0 is an empty entry.
pub fn check_phandle_array(ctx: &Context<'_>, prop: PropertyId, specifier: &str) -> PropertyReport {
    let property = &ctx.tree[prop];
    let mut report = PropertyReport::default();
    let Some(cells) = flatten(&property.values) else {
        return report;
    };
    let cells_property = format!("#{specifier}-cells");
    let mut i = 0;
    while i < cells.len() {
        let phandle = cells[i];
        if ctx.evaluate(&phandle.value) == Some(0) {
            i += 1;
            continue;
        }
        let Some(target) = resolve_cell(ctx, &phandle.value) else {
            report.push(Diagnostic::issue(
                StandardTypeIssue::InterruptsParentNodeNotFound,
                phandle.range,
                [phandle.value.to_string()],
            ));
            break;
        };
        let width = match ctx.cells_of(target, &cells_property) {
            Ok(width) => width,
            Err(err) => {
                report
                    .diagnostics
                    .extend(missing_cells(ctx, property, target, &err, phandle.range));
                break;
            }
        };
        let end = i + 1 + width;
        let range = TextRange::cover(cells[i..end.min(cells.len())].iter().map(|cell| cell.range))
            .unwrap_or(phandle.range);
        if end > cells.len() {
            report.push(Diagnostic::issue(
                StandardTypeIssue::MapEntryIncomplete,
                range,
                [property.name.clone(), format!("{specifier} specifier")],
            ));
            break;
        }
        let mapping = map_group(
            ctx,
            property.node,
            target,
            specifier,
            &cells[i + 1..end],
            range,
            &mut report.diagnostics,
        );
        report.mappings.push(mapping);
        i = end;
    }
    report
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptParentError {
    /// `interrupt-parent` of the node doesn't resolve. It reports that itself.
    #[error("`interrupt-parent` doesn't resolve")]
    Unresolved(NodeId),
    #[error("no interrupt controller found")]
    NotFound,
}

/// Finds the interrupt parent of `node` like Linux does: follow `interrupt-parent`, or the tree
/// parent when it's absent, until a node with `#interrupt-cells` is found.
pub fn interrupt_parent(ctx: &Context<'_>, node: NodeId) -> Result<NodeId, InterruptParentError> {
    let mut visited = FxHashSet::default();
    let mut current = node;
    loop {
        let next = match ctx.tree.property(current, "interrupt-parent") {
            Some(prop) => {
                let cell = flatten(&prop.values)
                    .and_then(|cells| cells.into_iter().exactly_one().ok())
                    .ok_or(InterruptParentError::Unresolved(current))?;
                resolve_cell(ctx, &cell.value).ok_or(InterruptParentError::Unresolved(current))?
            }
            None => ctx
                .tree
                .parent(current)
                .ok_or(InterruptParentError::NotFound)?,
        };
        if !visited.insert(next) {
            return Err(InterruptParentError::NotFound);
        }
        if ctx.tree.find_property(next, "#interrupt-cells").is_some() {
            return Ok(next);
        }
        current = next;
    }
}

/// Checks `interrupts` against the interrupt parent's `#interrupt-cells` and looks each
/// specifier up if the parent is an interrupt nexus.
pub fn check_interrupts(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let property = &ctx.tree[prop];
    let node = property.node;
    let mut report = PropertyReport::default();
    if ctx
        .tree
        .find_property(node, "interrupts-extended")
        .is_some()
    {
        report.push(Diagnostic::issue(
            StandardTypeIssue::IgnoredProperty,
            property.name_range,
            [property.name.as_str(), "interrupts-extended"],
        ));
        return report;
    }
    let Some(cells) = flatten(&property.values) else {
        return report;
    };
    let parent = match interrupt_parent(ctx, node) {
        Ok(parent) => parent,
        Err(InterruptParentError::Unresolved(holder)) => {
            tracing::debug!(
                "Interrupt parent of {} doesn't resolve",
                ctx.tree.path(holder)
            );
            return report;
        }
        Err(InterruptParentError::NotFound) => {
            report.push(Diagnostic::issue(
                StandardTypeIssue::PropertyRequiresOtherPropertyInNode,
                property.name_range,
                [
                    property.name.clone(),
                    "interrupt-parent".to_owned(),
                    ctx.tree.path(node),
                ],
            ));
            return report;
        }
    };
    let width = match ctx.cells_of(parent, "#interrupt-cells") {
        Ok(width) => width,
        Err(err) => {
            report
                .diagnostics
                .extend(missing_cells(ctx, property, parent, &err, property.name_range));
            return report;
        }
    };
    if width == 0 {
        return report;
    }

    let trailing = cells.len() % width;
    if trailing != 0 {
        report.push(Diagnostic::issue(
            StandardTypeIssue::CellMissMatch,
            cells[cells.len() - trailing].range,
            [
                property.name.clone(),
                width.to_string(),
                field_pattern(&[("interrupt", width)]),
            ],
        ));
    }
    for group in cells.chunks_exact(width) {
        let range = TextRange::cover(group.iter().map(|cell| cell.range)).unwrap_or_default();
        let mapping = map_group(
            ctx,
            node,
            parent,
            INTERRUPT,
            group,
            range,
            &mut report.diagnostics,
        );
        report.mappings.push(mapping);
    }
    report
}

/// Checks that `interrupt-parent` resolves.
pub fn check_interrupt_parent(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let property = &ctx.tree[prop];
    let Some(cells) = flatten(&property.values) else {
        return PropertyReport::default();
    };
    cells
        .into_iter()
        .filter(|cell| resolve_cell(ctx, &cell.value).is_none())
        .map(|cell| {
            Diagnostic::issue(
                StandardTypeIssue::InterruptsParentNodeNotFound,
                cell.range,
                [cell.value.to_string()],
            )
        })
        .collect::<Vec<_>>()
        .into()
}

/// Checks `interrupt-map` by decoding it.
pub fn check_interrupt_map(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    match MapLayout::interrupt_map(ctx, ctx.tree[prop].node) {
        Ok(layout) => decode_map(ctx, prop, layout).diagnostics.into(),
        Err(err) => {
            tracing::debug!("Not decoding interrupt-map: {err}");
            PropertyReport::default()
        }
    }
}

/// Checks a `<specifier>-map` by decoding it.
pub fn check_specifier_map(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let name = &ctx.tree[prop].name;
    let Some(specifier) = name.strip_suffix("-map") else {
        return PropertyReport::default();
    };
    decode_map(ctx, prop, MapLayout::specifier_map(specifier))
        .diagnostics
        .into()
}

/// Checks a `<map>-mask` or `<map>-pass-thru` property: its map must be present and its length
/// must be the width of a map key.
pub fn check_map_modifier(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let property = &ctx.tree[prop];
    let node = property.node;
    let (map_name, is_mask) = match property.name.strip_suffix("-mask") {
        Some(map) => (map, true),
        None => match property.name.strip_suffix("-pass-thru") {
            Some(map) => (map, false),
            None => return PropertyReport::default(),
        },
    };
    let Some(specifier) = map_name.strip_suffix("-map") else {
        return PropertyReport::default();
    };
    let mut report = PropertyReport::default();
    if ctx.tree.find_property(node, map_name).is_none() {
        report.push(Diagnostic::issue(
            StandardTypeIssue::PropertyRequiresOtherPropertyInNode,
            property.name_range,
            [property.name.clone(), map_name.to_owned(), ctx.tree.path(node)],
        ));
    }

    let address_cells = if is_mask && specifier == INTERRUPT {
        match ctx.address_cells(node) {
            Ok(width) => width,
            Err(err) => {
                tracing::debug!("Not checking `{}`: {err}", property.name);
                return report;
            }
        }
    } else {
        0
    };
    let specifier_cells = match ctx.cells_of(node, &format!("#{specifier}-cells")) {
        Ok(width) => width,
        Err(err) => {
            report
                .diagnostics
                .extend(missing_cells(ctx, property, node, &err, property.name_range));
            return report;
        }
    };
    let Some(cells) = flatten(&property.values) else {
        return report;
    };
    let expected = address_cells + specifier_cells;
    if cells.len() != expected {
        report.push(Diagnostic::issue(
            StandardTypeIssue::ExpectedCompositeLength,
            property.value_range(),
            [
                property.name.clone(),
                expected.to_string(),
                cells.len().to_string(),
            ],
        ));
    }
    report
}
