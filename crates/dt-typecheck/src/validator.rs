//! The validation pass over a whole tree

use std::{cell::RefCell, collections::BTreeMap, sync::Arc};

use dt_diagnostic::{Diagnostic, DiagnosticCollector};
use dt_tree::{MacroTable, NodeId, PropertyId, Tree};
use rustc_hash::FxHashMap;

use crate::{context::Context, nexus::NexusMapping, node_type::NodeType, settings::Settings};

/// Finds the type a node is validated with
pub trait BindingLookup {
    /// `parent` is the type the parent of `node` was validated with, `None` for the root node.
    fn node_type(
        &self,
        ctx: &Context<'_>,
        node: NodeId,
        parent: Option<&NodeType>,
    ) -> Arc<NodeType>;
}

/// What a validation pass found besides diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    mappings: BTreeMap<PropertyId, Vec<NexusMapping>>,
}

impl ValidationResult {
    /// The specifiers of a consumer property like `interrupts`, and where they map to.
    pub fn mappings(&self, prop: PropertyId) -> &[NexusMapping] {
        self.mappings.get(&prop).map_or(&[], Vec::as_slice)
    }

    /// Every specifier interpreted by `node`, directly or as the parent of a map entry.
    pub fn mappings_targeting(
        &self,
        node: NodeId,
    ) -> impl Iterator<Item = (PropertyId, &NexusMapping)> + '_ {
        self.mappings.iter().flat_map(move |(&prop, mappings)| {
            mappings
                .iter()
                .filter(move |mapping| {
                    mapping.target == node
                        || mapping
                            .resolved
                            .as_ref()
                            .is_some_and(|resolved| resolved.parent == node)
                })
                .map(move |mapping| (prop, mapping))
        })
    }
}

/// Validates every node of the tree in depth-first order, emitting diagnostics to `diag`.
pub fn validate(
    ctx: &Context<'_>,
    bindings: &impl BindingLookup,
    diag: &impl DiagnosticCollector,
) -> ValidationResult {
    let tree = ctx.tree;
    let mut types: FxHashMap<NodeId, Arc<NodeType>> = FxHashMap::default();
    let mut result = ValidationResult::default();
    for node in tree.dfs() {
        let _span = tracing::debug_span!("validate", path = %tree.path(node)).entered();
        let parent = tree.parent(node).and_then(|parent| types.get(&parent));
        let node_type = bindings.node_type(ctx, node, parent.map(Arc::as_ref));
        tracing::trace!(node_type = %node_type.name, "Validating");

        let report = node_type.get_issue(ctx, node);
        tracing::trace!(diagnostics = report.diagnostics.len(), "Validated");
        for diagnostic in report.diagnostics {
            diag.emit(diagnostic);
        }
        result.mappings.extend(report.mappings);
        types.insert(node, node_type);
    }
    result
}

/// Validates `tree`, collecting the diagnostics.
///
/// # Example
///
/// ```
/// use dt_diagnostic::StandardTypeIssue;
/// use dt_tree::{builder::{cells, TreeBuilder}, MacroTable};
/// use dt_typecheck::{validate_tree, Catalog, Settings};
///
/// let (tree, _src) = TreeBuilder::new()
///     .root(|root| {
///         root.node("serial@4600", |serial| {
///             serial.prop("reg", [cells("0x0 0x4600 0x100")]);
///         });
///     })
///     .finish();
/// let settings = Settings::default();
/// let catalog = Catalog::standard(&settings);
/// let (diagnostics, _) = validate_tree(&tree, &MacroTable::default(), &settings, &catalog);
/// // The root node lacks `#address-cells`, `#size-cells`, `model` and `compatible`
/// assert!(diagnostics
///     .iter()
///     .all(|diag| diag.issue == Some(StandardTypeIssue::Required)));
/// ```
pub fn validate_tree(
    tree: &Tree,
    macros: &MacroTable,
    settings: &Settings,
    bindings: &impl BindingLookup,
) -> (Vec<Diagnostic>, ValidationResult) {
    let ctx = Context::new(tree, macros, settings);
    let diagnostics = RefCell::new(Vec::new());
    let result = validate(&ctx, bindings, &diagnostics);
    (diagnostics.into_inner(), result)
}
