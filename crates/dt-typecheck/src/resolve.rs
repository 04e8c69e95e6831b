//! Resolving references to nodes

use dt_tree::{Cell, NodeId, PhandleTarget, PropValue};

use crate::context::Context;

/// Resolves a `&label` or `&{/path}` reference.
pub fn resolve_target(ctx: &Context<'_>, target: &PhandleTarget) -> Option<NodeId> {
    match target {
        PhandleTarget::Label(label) => ctx.tree.label(label),
        PhandleTarget::Path(path) => ctx.tree.node_by_path(path),
    }
}

/// Resolves a cell used as a phandle.
///
/// Numbers and expressions are looked up among the explicitly assigned phandles.
pub fn resolve_cell(ctx: &Context<'_>, cell: &Cell) -> Option<NodeId> {
    match cell {
        Cell::U32(phandle) => ctx.phandles().get(*phandle),
        Cell::Expression(expr) => ctx
            .phandles()
            .get(expr.evaluate_cell(ctx.macros).ok()?),
        Cell::Phandle(target) => resolve_target(ctx, target),
    }
}

/// Resolves a path string: an absolute path, an alias name optionally followed by a relative
/// path, or a label optionally followed by a relative path.
pub fn resolve_path(ctx: &Context<'_>, path: &str) -> Option<NodeId> {
    if path.starts_with('/') {
        return ctx.tree.node_by_path(path);
    }
    let (first, rest) = path.split_once('/').unwrap_or((path, ""));
    let start = resolve_alias(ctx, first).or_else(|| ctx.tree.label(first))?;
    rest.split('/')
        .filter(|component| !component.is_empty())
        .try_fold(start, |node, component| ctx.tree.child(node, component))
}

/// Resolves an alias defined in `/aliases`.
pub fn resolve_alias(ctx: &Context<'_>, alias: &str) -> Option<NodeId> {
    let aliases = ctx.tree.child(ctx.tree.root(), "aliases")?;
    match ctx.tree.property(aliases, alias)?.values.as_slice() {
        [PropValue::String(path)] if path.value.starts_with('/') => {
            ctx.tree.node_by_path(&path.value)
        }
        [PropValue::Phandle(target)] => resolve_target(ctx, &target.value),
        _ => None,
    }
}

/// Resolves a path-valued property value, e.g. an alias or `stdout-path`.
///
/// With `allow_options`, anything after the first `:` of a string is ignored, like
/// `stdout-path = "serial0:115200n8";`.
///
/// Returns the unresolved text on failure.
pub fn resolve_path_value(
    ctx: &Context<'_>,
    value: &PropValue,
    allow_options: bool,
) -> Result<NodeId, String> {
    match value {
        PropValue::String(path) => {
            let path = if allow_options {
                path.value
                    .split_once(':')
                    .map_or(path.value.as_str(), |(path, _)| path)
            } else {
                path.value.as_str()
            };
            resolve_path(ctx, path).ok_or_else(|| path.to_owned())
        }
        PropValue::Phandle(target) => {
            resolve_target(ctx, &target.value).ok_or_else(|| target.value.to_string())
        }
        PropValue::Cells(_) | PropValue::Bytestring(_) | PropValue::Expression(_) => {
            Err(String::new())
        }
    }
}
