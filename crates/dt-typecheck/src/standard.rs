//! The standard property and node types of the Devicetree specification

use std::sync::Arc;

use dt_diagnostic::{Diagnostic, StandardTypeIssue};
use dt_tree::{NodeId, PropValue, PropertyId, Tree};
use either::Either;
use itertools::Itertools as _;
use rustc_hash::FxHashMap;
use vec1::vec1;

use crate::{
    cells::{flatten, ADDRESS_CELLS, SIZE_CELLS},
    context::Context,
    nexus::{
        check_interrupt_map, check_interrupt_parent, check_interrupts, check_map_modifier,
        check_phandle_array, check_specifier_map,
    },
    node_type::{MismatchPolicy, NodeType},
    property_type::{PropertyNodeType, PropertyReport, PropertyType, Requirement},
    reg::{check_ranges, check_reg},
    resolve::resolve_path_value,
    settings::Settings,
    validator::BindingLookup,
};

/// Phandle-array consumers and the specifier their controllers define `#<x>-cells` for
const CONSUMERS: [(&str, &str); 8] = [
    ("clocks", "clock"),
    ("resets", "reset"),
    ("dmas", "dma"),
    ("pwms", "pwm"),
    ("phys", "phy"),
    ("mboxes", "mbox"),
    ("power-domains", "power-domain"),
    ("gpios", "gpio"),
];

fn phandle_array(name: &'static str, specifier: &'static str) -> PropertyNodeType {
    PropertyNodeType::new(name, vec1![PropertyType::PropEncodedArray])
        .with_check(move |ctx, prop| check_phandle_array(ctx, prop, specifier))
}

fn required_with_unit_address(ctx: &Context<'_>, node: NodeId) -> Requirement {
    if ctx.tree[node].unit_address.is_some() {
        Requirement::Required
    } else {
        Requirement::Optional
    }
}

/// Flags every node claiming the phandle of `prop` after the first one.
fn check_unique_phandle(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let mut report = PropertyReport::default();
    let Some(phandle) = flatten(&ctx.tree[prop].values)
        .and_then(|cells| cells.into_iter().exactly_one().ok())
        .and_then(|cell| ctx.evaluate(&cell.value))
    else {
        return report;
    };
    let claimants = ctx.phandles().get_all(phandle);
    let Some(&(first, first_prop)) = claimants.first() else {
        return report;
    };
    if claimants.iter().skip(1).any(|&(_, claim)| claim == prop) {
        report.push(
            Diagnostic::issue(
                StandardTypeIssue::ExpectedUniquePhandle,
                ctx.tree[prop].value_range(),
                [phandle.to_string(), ctx.tree.path(first)],
            )
            .with_label(ctx.tree[first_prop].range, "first used here"),
        );
    }
    report
}

fn check_device_type(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let property = &ctx.tree[prop];
    if matches!(ctx.tree[property.node].name.as_str(), "cpu" | "memory") {
        return PropertyReport::default();
    }
    vec![Diagnostic::issue(
        StandardTypeIssue::Deprecated,
        property.name_range,
        [property.name.as_str()],
    )]
    .into()
}

/// Reports every value of `prop` that doesn't resolve to a node.
fn unresolved_paths(ctx: &Context<'_>, prop: PropertyId, allow_options: bool) -> Vec<Diagnostic> {
    ctx.tree[prop]
        .values
        .iter()
        .filter_map(|value| {
            let unresolved = resolve_path_value(ctx, value, allow_options).err()?;
            Some(Diagnostic::issue(
                StandardTypeIssue::UnableToResolvePath,
                value.text_range(),
                [unresolved],
            ))
        })
        .collect()
}

fn is_alias_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn check_alias(ctx: &Context<'_>, prop: PropertyId) -> PropertyReport {
    let property = &ctx.tree[prop];
    let mut report = PropertyReport::default();
    if !is_alias_name(&property.name) {
        report.push(Diagnostic::issue(
            StandardTypeIssue::InvalidName,
            property.name_range,
            [property.name.as_str(), "[a-z0-9-]+"],
        ));
    }
    report
        .diagnostics
        .extend(unresolved_paths(ctx, prop, false));
    report
}

/// The properties every node may have
pub fn standard_properties() -> Vec<PropertyNodeType> {
    let mut properties = vec![
        PropertyNodeType::new("compatible", vec1![PropertyType::StringList]),
        PropertyNodeType::new("model", vec1![PropertyType::String]),
        PropertyNodeType::new("phandle", vec1![PropertyType::U32]).with_check(check_unique_phandle),
        PropertyNodeType::new("linux,phandle", vec1![PropertyType::U32])
            .deprecated()
            .with_check(check_unique_phandle),
        PropertyNodeType::new("status", vec1![PropertyType::String])
            .with_default("okay")
            .with_values(["disabled", "reserved", "fail", "fail-sss"]),
        PropertyNodeType::new(ADDRESS_CELLS, vec1![PropertyType::U32]),
        PropertyNodeType::new(SIZE_CELLS, vec1![PropertyType::U32]),
        PropertyNodeType::new("reg", vec1![PropertyType::PropEncodedArray])
            .required_if(required_with_unit_address)
            .with_check(check_reg),
        PropertyNodeType::new("virtual-reg", vec1![PropertyType::U32]),
        PropertyNodeType::new(
            "ranges",
            vec1![PropertyType::Empty, PropertyType::PropEncodedArray],
        )
        .with_check(check_ranges),
        PropertyNodeType::new(
            "dma-ranges",
            vec1![PropertyType::Empty, PropertyType::PropEncodedArray],
        )
        .with_check(check_ranges),
        PropertyNodeType::new("dma-coherent", vec1![PropertyType::Empty]),
        PropertyNodeType::new("name", vec1![PropertyType::String]).deprecated(),
        PropertyNodeType::new("device_type", vec1![PropertyType::String])
            .with_check(check_device_type),
        PropertyNodeType::new("interrupts", vec1![PropertyType::PropEncodedArray])
            .with_check(check_interrupts),
        PropertyNodeType::new("interrupt-parent", vec1![PropertyType::U32])
            .with_check(check_interrupt_parent),
        phandle_array("interrupts-extended", "interrupt"),
        PropertyNodeType::new("#interrupt-cells", vec1![PropertyType::U32]),
        PropertyNodeType::new("interrupt-controller", vec1![PropertyType::Empty]),
        PropertyNodeType::new("interrupt-map", vec1![PropertyType::PropEncodedArray])
            .with_check(check_interrupt_map),
        PropertyNodeType::new("interrupt-map-mask", vec1![PropertyType::PropEncodedArray])
            .with_check(check_map_modifier),
    ];
    properties.extend(
        CONSUMERS
            .into_iter()
            .map(|(name, specifier)| phandle_array(name, specifier)),
    );
    properties.extend([
        PropertyNodeType::pattern(
            "<x>-gpios",
            |name| name.ends_with("-gpios"),
            vec1![PropertyType::PropEncodedArray],
        )
        .with_check(|ctx, prop| check_phandle_array(ctx, prop, "gpio")),
        PropertyNodeType::pattern(
            "<x>-map",
            |name| name.len() > "-map".len() && name.ends_with("-map"),
            vec1![PropertyType::PropEncodedArray],
        )
        .with_check(check_specifier_map),
        PropertyNodeType::pattern(
            "<x>-map-mask",
            |name| name.ends_with("-map-mask") || name.ends_with("-map-pass-thru"),
            vec1![PropertyType::PropEncodedArray],
        )
        .with_check(check_map_modifier),
        PropertyNodeType::pattern(
            "#<x>-cells",
            |name| name.starts_with('#') && name.ends_with("-cells"),
            vec1![PropertyType::U32],
        ),
    ]);
    properties
}

/// Reports `node` with NODE_LOCATION at every place it's defined.
fn misplaced(ctx: &Context<'_>, node: NodeId, expected: &str) -> Diagnostic {
    let spans: Vec<_> = ctx.tree[node]
        .definitions
        .iter()
        .map(|def| def.name_range)
        .collect();
    Diagnostic::issue(
        StandardTypeIssue::NodeLocation,
        spans,
        [ctx.tree[node].full_name().into_owned(), expected.to_owned()],
    )
}

fn under_root(ctx: &Context<'_>, node: NodeId) -> Vec<Diagnostic> {
    if ctx.tree.parent(node) == Some(ctx.tree.root()) {
        Vec::new()
    } else {
        vec![misplaced(ctx, node, "a child of the root node")]
    }
}

/// A node type with the [standard properties](standard_properties)
pub fn standard_node_type(name: &'static str) -> NodeType {
    NodeType::new(name).with_properties(standard_properties())
}

/// The type of nodes without a more specific type
pub fn generic_node_type() -> NodeType {
    standard_node_type("node")
}

pub fn root_node_type() -> NodeType {
    standard_node_type("root").with_properties([
        PropertyNodeType::new(ADDRESS_CELLS, vec1![PropertyType::U32]).required(),
        PropertyNodeType::new(SIZE_CELLS, vec1![PropertyType::U32]).required(),
        PropertyNodeType::new("model", vec1![PropertyType::String]).required(),
        PropertyNodeType::new("compatible", vec1![PropertyType::StringList]).required(),
    ])
}

pub fn aliases_node_type() -> NodeType {
    NodeType::new("aliases")
        .with_property(
            PropertyNodeType::pattern("<alias>", |_| true, vec1![PropertyType::String])
                .with_check(check_alias),
        )
        .with_mismatch(MismatchPolicy::Deny)
        .with_validation(under_root)
}

pub fn chosen_node_type() -> NodeType {
    let path = |name: &'static str| {
        PropertyNodeType::new(name, vec1![PropertyType::String])
            .with_check(|ctx, prop| unresolved_paths(ctx, prop, true).into())
    };
    standard_node_type("chosen")
        .with_properties([
            PropertyNodeType::new("bootargs", vec1![PropertyType::String]),
            path("stdout-path"),
            path("stdin-path"),
            PropertyNodeType::new(
                "linux,initrd-start",
                vec1![PropertyType::U32, PropertyType::U64],
            ),
            PropertyNodeType::new(
                "linux,initrd-end",
                vec1![PropertyType::U32, PropertyType::U64],
            ),
            PropertyNodeType::new("kaslr-seed", vec1![PropertyType::U64]),
            PropertyNodeType::new("rng-seed", vec1![PropertyType::Bytestring]),
        ])
        .with_validation(under_root)
}

pub fn memory_node_type() -> NodeType {
    standard_node_type("memory")
        .with_properties([
            PropertyNodeType::new("device_type", vec1![PropertyType::String])
                .required()
                .with_values(["memory"]),
            PropertyNodeType::new("reg", vec1![PropertyType::PropEncodedArray])
                .required()
                .with_check(check_reg),
            PropertyNodeType::new("initial-mapped-area", vec1![PropertyType::PropEncodedArray]),
            PropertyNodeType::new("hotpluggable", vec1![PropertyType::Empty]),
        ])
        .with_validation(under_root)
}

/// `#address-cells` and `#size-cells` of `reserved-memory` must be the root's.
fn same_cells_as_root(ctx: &Context<'_>, node: NodeId) -> Vec<Diagnostic> {
    let tree = ctx.tree;
    [ADDRESS_CELLS, SIZE_CELLS]
        .into_iter()
        .filter_map(|name| {
            let prop = tree.property(node, name)?;
            let own = ctx.cells_of(node, name).ok()?;
            let root = ctx.cells_of(tree.root(), name).ok()?;
            (own != root).then(|| {
                Diagnostic::issue(
                    StandardTypeIssue::ExpectedValue,
                    prop.value_range(),
                    [name.to_owned(), format!("`<{root}>` like in the root node")],
                )
            })
        })
        .collect()
}

pub fn reserved_memory_child_type() -> NodeType {
    standard_node_type("reserved-memory child").with_properties([
        PropertyNodeType::new("size", vec1![PropertyType::PropEncodedArray]).required_if(
            |ctx, node| {
                if ctx.tree.find_property(node, "reg").is_some() {
                    Requirement::Optional
                } else {
                    Requirement::Required
                }
            },
        ),
        PropertyNodeType::new("alignment", vec1![PropertyType::PropEncodedArray]),
        PropertyNodeType::new("alloc-ranges", vec1![PropertyType::PropEncodedArray]),
        PropertyNodeType::new("no-map", vec1![PropertyType::Empty]),
        PropertyNodeType::new("reusable", vec1![PropertyType::Empty]),
    ])
}

pub fn reserved_memory_node_type() -> NodeType {
    let child = Arc::new(reserved_memory_child_type());
    standard_node_type("reserved-memory")
        .with_properties([
            PropertyNodeType::new(ADDRESS_CELLS, vec1![PropertyType::U32]).required(),
            PropertyNodeType::new(SIZE_CELLS, vec1![PropertyType::U32]).required(),
            PropertyNodeType::new(
                "ranges",
                vec1![PropertyType::Empty, PropertyType::PropEncodedArray],
            )
            .required()
            .with_check(check_ranges),
        ])
        .with_validation(under_root)
        .with_validation(same_cells_as_root)
        .with_child_node_type(move |_, _| Some(Arc::clone(&child)))
}

fn zero_size_cells(ctx: &Context<'_>, node: NodeId) -> Vec<Diagnostic> {
    let Some(prop) = ctx.tree.property(node, SIZE_CELLS) else {
        return Vec::new();
    };
    match ctx.size_cells(node) {
        Ok(0) | Err(_) => Vec::new(),
        Ok(_) => vec![Diagnostic::issue(
            StandardTypeIssue::ExpectedValue,
            prop.value_range(),
            [SIZE_CELLS, "`<0>`"],
        )],
    }
}

pub fn cpu_node_type() -> NodeType {
    standard_node_type("cpu")
        .with_properties([
            PropertyNodeType::new("device_type", vec1![PropertyType::String])
                .required()
                .with_values(["cpu"]),
            PropertyNodeType::new("reg", vec1![PropertyType::PropEncodedArray])
                .required()
                .with_check(check_reg),
            PropertyNodeType::new(
                "clock-frequency",
                vec1![PropertyType::U32, PropertyType::U64],
            ),
            PropertyNodeType::new(
                "timebase-frequency",
                vec1![PropertyType::U32, PropertyType::U64],
            ),
            PropertyNodeType::new("enable-method", vec1![PropertyType::StringList]),
            PropertyNodeType::new("cpu-release-addr", vec1![PropertyType::U64]),
        ])
        .with_validation(|ctx, node| {
            let tree = ctx.tree;
            let in_cpus = tree.parent(node).is_some_and(|parent| {
                tree[parent].name == "cpus" && tree.parent(parent) == Some(tree.root())
            });
            if in_cpus {
                Vec::new()
            } else {
                vec![misplaced(ctx, node, "a child of `/cpus`")]
            }
        })
}

pub fn cpus_node_type() -> NodeType {
    let cpu = Arc::new(cpu_node_type());
    standard_node_type("cpus")
        .with_properties([
            PropertyNodeType::new(ADDRESS_CELLS, vec1![PropertyType::U32]).required(),
            PropertyNodeType::new(SIZE_CELLS, vec1![PropertyType::U32]).required(),
        ])
        .with_validation(under_root)
        .with_validation(zero_size_cells)
        .with_child_node_type(move |ctx, node| {
            (ctx.tree[node].name == "cpu").then(|| Arc::clone(&cpu))
        })
}

pub fn simple_bus_node_type() -> NodeType {
    standard_node_type("simple-bus").with_properties([
        PropertyNodeType::new(ADDRESS_CELLS, vec1![PropertyType::U32]).required(),
        PropertyNodeType::new(SIZE_CELLS, vec1![PropertyType::U32]).required(),
        PropertyNodeType::new(
            "ranges",
            vec1![PropertyType::Empty, PropertyType::PropEncodedArray],
        )
            .required()
            .with_check(check_ranges),
    ])
}

/// The strings of `compatible`, most specific first
pub fn compatibles(tree: &Tree, node: NodeId) -> impl Iterator<Item = &str> {
    match tree.property(node, "compatible") {
        Some(prop) => Either::Left(prop.values.iter().filter_map(|value| match value {
            PropValue::String(string) => Some(string.value.as_str()),
            _ => None,
        })),
        None => Either::Right(std::iter::empty()),
    }
}

/// Node types by `compatible` and by position in the tree
///
/// # Example
///
/// ```
/// use dt_typecheck::{Catalog, NodeType, Settings};
///
/// let mut catalog = Catalog::standard(&Settings::default());
/// catalog.insert_binding("vendor,uart", NodeType::new("vendor,uart"));
/// assert!(catalog.binding("vendor,uart").is_some());
/// assert!(catalog.binding("simple-bus").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct Catalog {
    generic: Arc<NodeType>,
    root: Arc<NodeType>,
    structural: FxHashMap<&'static str, Arc<NodeType>>,
    bindings: FxHashMap<String, Arc<NodeType>>,
}

impl Catalog {
    /// Builds the standard node types for `settings`.
    pub fn standard(settings: &Settings) -> Self {
        let binding_type = settings.binding_type;
        let finish = |ty: NodeType| Arc::new(ty.with_binding_type(binding_type));
        let structural = [
            ("aliases", aliases_node_type()),
            ("chosen", chosen_node_type()),
            ("memory", memory_node_type()),
            ("reserved-memory", reserved_memory_node_type()),
            ("cpus", cpus_node_type()),
            ("cpu", cpu_node_type()),
        ]
        .into_iter()
        .map(|(name, ty)| (name, finish(ty)))
        .collect();
        let mut catalog = Self {
            generic: finish(generic_node_type()),
            root: finish(root_node_type()),
            structural,
            bindings: FxHashMap::default(),
        };
        catalog.insert_binding(
            "simple-bus",
            simple_bus_node_type().with_binding_type(binding_type),
        );
        catalog
    }

    /// Registers the type of nodes compatible with `compatible`, returning the type it replaces.
    pub fn insert_binding(
        &mut self,
        compatible: impl Into<String>,
        node_type: NodeType,
    ) -> Option<Arc<NodeType>> {
        self.bindings.insert(compatible.into(), Arc::new(node_type))
    }

    pub fn binding(&self, compatible: &str) -> Option<&Arc<NodeType>> {
        self.bindings.get(compatible)
    }

    pub fn generic(&self) -> &Arc<NodeType> {
        &self.generic
    }
}

impl BindingLookup for Catalog {
    fn node_type(
        &self,
        ctx: &Context<'_>,
        node: NodeId,
        parent: Option<&NodeType>,
    ) -> Arc<NodeType> {
        let tree = ctx.tree;
        if let Some(ty) = compatibles(tree, node).find_map(|compatible| self.binding(compatible)) {
            return Arc::clone(ty);
        }
        if node == tree.root() {
            return Arc::clone(&self.root);
        }
        if let Some(ty) = parent.and_then(|parent| parent.child_node_type(ctx, node)) {
            return ty;
        }
        if let Some(ty) = self.structural.get(tree[node].name.as_str()) {
            return Arc::clone(ty);
        }
        tracing::debug!(
            path = %tree.path(node),
            "No binding found, using the generic node type"
        );
        Arc::clone(&self.generic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_tree::{
        builder::{cells, string, TreeBuilder},
        MacroTable,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn alias_names() {
        assert!(is_alias_name("serial0"));
        assert!(is_alias_name("i2c-1"));
        assert!(!is_alias_name("Serial0"));
        assert!(!is_alias_name("my_alias"));
        assert!(!is_alias_name(""));
    }

    #[test]
    fn lookup_precedence() {
        let (tree, _) = TreeBuilder::new()
            .root(|root| {
                root.node("cpus", |cpus| {
                    cpus.node("cpu@0", |_| {});
                    cpus.node("cpu-map", |_| {});
                });
                root.node("soc", |soc| {
                    soc.prop("compatible", [string("vendor,soc"), string("simple-bus")]);
                    soc.node("cpus", |_| {});
                });
                root.node("reserved-memory", |rmem| {
                    rmem.node("pool", |pool| {
                        pool.prop("compatible", [string("vendor,uart")]);
                    });
                    rmem.node("other", |_| {});
                });
            })
            .finish();
        let (macros, settings) = (MacroTable::default(), Settings::default());
        let ctx = Context::new(&tree, &macros, &settings);
        let mut catalog = Catalog::standard(&settings);
        catalog.insert_binding("vendor,uart", NodeType::new("vendor,uart"));

        let mut types: FxHashMap<NodeId, Arc<NodeType>> = FxHashMap::default();
        for node in tree.dfs() {
            let parent = tree.parent(node).and_then(|parent| types.get(&parent));
            let ty = catalog.node_type(&ctx, node, parent.map(Arc::as_ref));
            types.insert(node, ty);
        }
        let name = |path: &str| types[&tree.node_by_path(path).unwrap()].name.to_string();
        assert_eq!(name("/"), "root");
        assert_eq!(name("/cpus"), "cpus");
        assert_eq!(name("/cpus/cpu@0"), "cpu");
        assert_eq!(name("/cpus/cpu-map"), "node");
        assert_eq!(name("/soc/cpus"), "cpus");
        assert!(Arc::ptr_eq(
            &types[&tree.node_by_path("/soc").unwrap()],
            catalog.binding("simple-bus").unwrap()
        ));
        assert_eq!(name("/reserved-memory/pool"), "vendor,uart");
        assert_eq!(name("/reserved-memory/other"), "reserved-memory child");
        assert!(types[&tree.node_by_path("/reserved-memory/other").unwrap()]
            .property_type("no-map")
            .is_some());
    }

    #[test]
    fn phandle_uniqueness() {
        let (tree, src) = TreeBuilder::new()
            .root(|root| {
                root.node("a", |a| {
                    a.prop("phandle", [cells("5")]);
                });
                root.node("b", |b| {
                    b.prop("phandle", [cells("5")]);
                });
                root.node("c", |c| {
                    c.prop("phandle", [cells("5")]);
                    c.prop("linux,phandle", [cells("5")]);
                });
            })
            .finish();
        let (macros, settings) = (MacroTable::default(), Settings::default());
        let ctx = Context::new(&tree, &macros, &settings);
        let report = |path: &str, name: &str| {
            let prop = tree
                .find_property(tree.node_by_path(path).unwrap(), name)
                .unwrap();
            check_unique_phandle(&ctx, prop).diagnostics
        };
        assert!(report("/a", "phandle").is_empty());
        let b = report("/b", "phandle");
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].issue, Some(StandardTypeIssue::ExpectedUniquePhandle));
        assert_eq!(b[0].msg, "Phandle 5 is already used by node `/a`");
        assert_eq!(
            b[0].linked()
                .map(|range| range.text(&src).unwrap())
                .collect::<Vec<_>>(),
            vec!["phandle = <5>;"]
        );
        assert_eq!(report("/c", "phandle").len(), 1);
        assert!(report("/c", "linux,phandle").is_empty());
    }
}
