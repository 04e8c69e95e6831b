use std::{borrow::Cow, sync::Arc};

use dt_diagnostic::{Diagnostic, StandardTypeIssue};
use dt_tree::{NodeId, PropertyId};
use rustc_hash::FxHashSet;

use crate::{
    context::Context,
    nexus::NexusMapping,
    property_type::{PropertyNodeType, PropertyReport, Requirement},
    reg::{reg_unit_address, unit_address_edits},
    settings::BindingType,
};

/// What to do with properties no declared property type matches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MismatchPolicy {
    #[default]
    Ignore,
    /// Report them with [`StandardTypeIssue::PropertyNotInBinding`]
    Warn,
    /// Report them with [`StandardTypeIssue::PropertyNotAllowed`]
    Deny,
}

pub type NodeCheck = Arc<dyn Fn(&Context<'_>, NodeId) -> Vec<Diagnostic> + Send + Sync>;
pub type ChildNodeTypeFn =
    Arc<dyn Fn(&Context<'_>, NodeId) -> Option<Arc<NodeType>> + Send + Sync>;

/// Diagnostics of one node, and the nexus mappings of its properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeReport {
    pub diagnostics: Vec<Diagnostic>,
    pub mappings: Vec<(PropertyId, Vec<NexusMapping>)>,
}

impl NodeReport {
    fn absorb(&mut self, prop: Option<PropertyId>, report: PropertyReport) {
        self.diagnostics.extend(report.diagnostics);
        if let Some(prop) = prop.filter(|_| !report.mappings.is_empty()) {
            self.mappings.push((prop, report.mappings));
        }
    }
}

/// The declared shape of a node: its property types, what to do with other properties and
/// node-level checks
#[derive(derive_more::Debug, Clone)]
pub struct NodeType {
    pub name: Cow<'static, str>,
    pub properties: Vec<PropertyNodeType>,
    pub mismatch: MismatchPolicy,
    pub binding_type: BindingType,
    #[debug(skip)]
    pub additional_validations: Vec<NodeCheck>,
    /// Derives the type of child nodes, e.g. `cpu` nodes under `cpus`
    #[debug(skip)]
    pub child_node_type: Option<ChildNodeTypeFn>,
}

impl NodeType {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            mismatch: MismatchPolicy::default(),
            binding_type: BindingType::default(),
            additional_validations: Vec::new(),
            child_node_type: None,
        }
    }

    /// Adds property types. Later types with the same exact name replace earlier ones.
    #[must_use]
    pub fn with_properties(
        mut self,
        properties: impl IntoIterator<Item = PropertyNodeType>,
    ) -> Self {
        for property in properties {
            let replaced = property.name.as_exact().and_then(|name| {
                self.properties
                    .iter_mut()
                    .find(|existing| existing.name.as_exact() == Some(name))
            });
            match replaced {
                Some(existing) => *existing = property,
                None => self.properties.push(property),
            }
        }
        self
    }

    #[must_use]
    pub fn with_property(self, property: PropertyNodeType) -> Self {
        self.with_properties([property])
    }

    #[must_use]
    pub fn with_mismatch(mut self, mismatch: MismatchPolicy) -> Self {
        self.mismatch = mismatch;
        self
    }

    #[must_use]
    pub fn with_binding_type(mut self, binding_type: BindingType) -> Self {
        self.binding_type = binding_type;
        self
    }

    #[must_use]
    pub fn with_validation(
        mut self,
        check: impl Fn(&Context<'_>, NodeId) -> Vec<Diagnostic> + Send + Sync + 'static,
    ) -> Self {
        self.additional_validations.push(Arc::new(check));
        self
    }

    #[must_use]
    pub fn with_child_node_type(
        mut self,
        child: impl Fn(&Context<'_>, NodeId) -> Option<Arc<NodeType>> + Send + Sync + 'static,
    ) -> Self {
        self.child_node_type = Some(Arc::new(child));
        self
    }

    /// Finds the property type `name` is validated with: an exact match, else the first pattern.
    pub fn property_type(&self, name: &str) -> Option<&PropertyNodeType> {
        self.properties
            .iter()
            .find(|ty| ty.name.as_exact() == Some(name))
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|ty| ty.name.as_exact().is_none() && ty.name.matches(name))
            })
    }

    /// The type of `child`, which is a child node of a node of this type
    pub fn child_node_type(&self, ctx: &Context<'_>, child: NodeId) -> Option<Arc<NodeType>> {
        self.child_node_type.as_ref()?(ctx, child)
    }

    /// Validates a node.
    ///
    /// Disabled nodes only get a hint on the disabling `status`. Nodes under a disabled node
    /// aren't checked at all.
    pub fn get_issue(&self, ctx: &Context<'_>, node: NodeId) -> NodeReport {
        let tree = ctx.tree;
        let mut report = NodeReport::default();
        if let Some(status) = ctx.disabling_status(node) {
            if ctx.settings.report_disabled_nodes {
                report.diagnostics.push(Diagnostic::issue(
                    StandardTypeIssue::NodeDisabled,
                    tree[status].range,
                    [tree[node].full_name()],
                ));
            }
            return report;
        }
        if ctx.is_disabled(node) {
            return report;
        }

        report
            .diagnostics
            .extend(self.missing_unit_address(ctx, node));

        let mut matched = FxHashSet::default();
        for ty in &self.properties {
            let Some(name) = ty.name.as_exact() else {
                continue;
            };
            let prop = tree.find_property(node, name);
            matched.extend(prop);
            report.absorb(prop, ty.validate(ctx, node, prop));
        }
        let patterns = self
            .properties
            .iter()
            .filter(|ty| ty.name.as_exact().is_none());
        for ty in patterns {
            let mut any = false;
            for (id, property) in tree.properties(node) {
                if matched.contains(&id) || !ty.name.matches(&property.name) {
                    continue;
                }
                any = true;
                matched.insert(id);
                report.absorb(Some(id), ty.validate(ctx, node, Some(id)));
            }
            // a required pattern needs at least one match
            if !any {
                report.absorb(None, ty.validate(ctx, node, None));
            }
        }

        if self.mismatch != MismatchPolicy::Ignore {
            for (id, property) in tree.properties(node) {
                if matched.contains(&id)
                    || (self.binding_type == BindingType::Zephyr
                        && property.name.ends_with("-controller"))
                {
                    continue;
                }
                let issue = match self.mismatch {
                    MismatchPolicy::Deny => StandardTypeIssue::PropertyNotAllowed,
                    _ => StandardTypeIssue::PropertyNotInBinding,
                };
                report.diagnostics.push(Diagnostic::issue(
                    issue,
                    property.name_range,
                    [property.name.as_str()],
                ));
            }
        }

        for check in &self.additional_validations {
            report.diagnostics.extend(check(ctx, node));
        }
        report
    }

    /// Reports a node with `reg` but no unit address, with a fix adding the address `reg`
    /// implies.
    fn missing_unit_address(&self, ctx: &Context<'_>, node: NodeId) -> Option<Diagnostic> {
        let tree = ctx.tree;
        let reg_type = self
            .properties
            .iter()
            .find(|ty| ty.name.as_exact() == Some("reg"))?;
        if node == tree.root()
            || tree[node].unit_address.is_some()
            || tree.find_property(node, "reg").is_none()
            || reg_type.requirement(ctx, node) == Requirement::Omitted
        {
            return None;
        }
        let spans: Vec<_> = tree[node]
            .definitions
            .iter()
            .filter(|def| !def.is_reference)
            .map(|def| def.name_range)
            .collect();
        let diag = Diagnostic::issue(
            StandardTypeIssue::ExpectedNodeAddress,
            spans,
            [tree[node].name.as_str()],
        );
        Some(match reg_unit_address(ctx, node) {
            Some(address) => diag.with_suggestion(
                format!("Add the unit address `@{address}`"),
                unit_address_edits(ctx, node, &address),
            ),
            None => diag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        property_type::{PropertyType, Requirement},
        settings::Settings,
    };
    use dt_diagnostic::{Severity, TextEdit};
    use dt_tree::{
        builder::{cells, string, TreeBuilder},
        MacroTable, Tree,
    };
    use pretty_assertions::assert_eq;
    use vec1::vec1;

    fn run(tree: &Tree, settings: &Settings, ty: &NodeType, path: &str) -> Vec<Diagnostic> {
        let macros = MacroTable::default();
        let ctx = Context::new(tree, &macros, settings);
        ty.get_issue(&ctx, tree.node_by_path(path).unwrap())
            .diagnostics
    }

    fn issues(diagnostics: &[Diagnostic]) -> Vec<StandardTypeIssue> {
        diagnostics.iter().filter_map(|diag| diag.issue).collect()
    }

    fn device_type() -> NodeType {
        NodeType::new("device")
            .with_property(
                PropertyNodeType::new("reg", vec1![PropertyType::PropEncodedArray]).required_if(
                    |ctx, node| {
                        if ctx.tree[node].unit_address.is_some() {
                            Requirement::Required
                        } else {
                            Requirement::Optional
                        }
                    },
                ),
            )
            .with_property(PropertyNodeType::new("status", vec1![PropertyType::String]))
            .with_property(PropertyNodeType::pattern(
                "#<x>-cells",
                |name| name.starts_with('#') && name.ends_with("-cells"),
                vec1![PropertyType::U32],
            ))
    }

    #[test]
    fn disabled_short_circuits() {
        let (tree, src) = TreeBuilder::new()
            .root(|root| {
                root.node("dev@10", |dev| {
                    dev.prop("status", [string("disabled")]);
                    dev.prop("bogus", [cells("1")]);
                    dev.node("child", |_| {});
                });
            })
            .finish();
        let ty = device_type().with_mismatch(MismatchPolicy::Deny);
        let diagnostics = run(&tree, &Settings::default(), &ty, "/dev@10");
        assert_eq!(issues(&diagnostics), vec![StandardTypeIssue::NodeDisabled]);
        assert_eq!(diagnostics[0].severity, Severity::Hint);
        assert_eq!(
            diagnostics[0].span.primary().unwrap().text(&src),
            Some("status = \"disabled\";")
        );
        assert!(run(&tree, &Settings::default(), &ty, "/dev@10/child").is_empty());

        let quiet = Settings {
            report_disabled_nodes: false,
            ..Settings::default()
        };
        assert!(run(&tree, &quiet, &ty, "/dev@10").is_empty());
    }

    #[test]
    fn mismatch_policies() {
        let (tree, _) = TreeBuilder::new()
            .root(|root| {
                root.node("dev", |dev| {
                    dev.prop("#gpio-cells", [cells("2")]);
                    dev.flag("gpio-controller");
                    dev.prop("unknown", [cells("1")]);
                });
            })
            .finish();
        let settings = Settings::default();
        let deny = device_type().with_mismatch(MismatchPolicy::Deny);
        assert_eq!(
            issues(&run(&tree, &settings, &deny, "/dev")),
            vec![
                StandardTypeIssue::PropertyNotAllowed,
                StandardTypeIssue::PropertyNotAllowed
            ]
        );
        let zephyr = device_type()
            .with_mismatch(MismatchPolicy::Warn)
            .with_binding_type(BindingType::Zephyr);
        let diagnostics = run(&tree, &settings, &zephyr, "/dev");
        assert_eq!(
            issues(&diagnostics),
            vec![StandardTypeIssue::PropertyNotInBinding]
        );
        assert_eq!(diagnostics[0].params, vec!["unknown".to_owned()]);
        assert_eq!(diagnostics[0].severity, Severity::Warn);
        assert!(run(&tree, &settings, &device_type(), "/dev").is_empty());
    }

    #[test]
    fn ordering() {
        let (tree, _) = TreeBuilder::new()
            .root(|root| {
                root.node("dev@10", |dev| {
                    dev.prop("extra", [cells("1")]);
                    dev.prop("status", [cells("1")]);
                });
            })
            .finish();
        let ty = device_type()
            .with_mismatch(MismatchPolicy::Warn)
            .with_validation(|ctx, node| {
                vec![Diagnostic::issue(
                    StandardTypeIssue::NodeLocation,
                    ctx.tree[node].definitions[0].name_range,
                    ["dev", "elsewhere"],
                )]
            });
        assert_eq!(
            issues(&run(&tree, &Settings::default(), &ty, "/dev@10")),
            vec![
                StandardTypeIssue::Required,
                StandardTypeIssue::ExpectedString,
                StandardTypeIssue::PropertyNotInBinding,
                StandardTypeIssue::NodeLocation,
            ]
        );
    }

    #[test]
    fn missing_unit_address_fix() {
        let (tree, src) = TreeBuilder::new()
            .root(|root| {
                root.prop("#address-cells", [cells("1")]);
                root.prop("#size-cells", [cells("1")]);
                root.node("serial", |serial| {
                    serial.prop("reg", [cells("0x4600 0x100")]);
                });
            })
            .finish();
        let diagnostics = run(&tree, &Settings::default(), &device_type(), "/serial");
        let [diag] = diagnostics.as_slice() else {
            panic!("expected one diagnostic: {diagnostics:?}");
        };
        assert_eq!(diag.issue, Some(StandardTypeIssue::ExpectedNodeAddress));
        assert_eq!(diag.span.primary().unwrap().text(&src), Some("serial"));
        let fixed = TextEdit::apply(&src, &diag.suggestion.as_ref().unwrap().edits);
        assert!(fixed.contains("\tserial@4600 {\n"));
    }

    #[test]
    fn later_property_types_replace() {
        let ty = device_type().with_property(
            PropertyNodeType::new("status", vec1![PropertyType::String]).omitted(),
        );
        assert_eq!(
            ty.properties
                .iter()
                .filter(|prop| prop.name.as_exact() == Some("status"))
                .count(),
            1
        );
        assert!(ty.property_type("#pwm-cells").is_some());
        assert!(ty.property_type("pwms").is_none());
    }

    #[test]
    fn required_pattern_without_match() {
        let (tree, src) = TreeBuilder::new()
            .root(|root| {
                root.node("dev", |_| {});
                root.node("ctrl", |ctrl| {
                    ctrl.prop("#clock-cells", [cells("1")]);
                });
            })
            .finish();
        let ty = NodeType::new("controller").with_property(
            PropertyNodeType::pattern(
                "#<x>-cells",
                |name| name.starts_with('#') && name.ends_with("-cells"),
                vec1![PropertyType::U32],
            )
            .required(),
        );
        let settings = Settings::default();

        let diagnostics = run(&tree, &settings, &ty, "/dev");
        assert_eq!(issues(&diagnostics), vec![StandardTypeIssue::Required]);
        assert_eq!(
            diagnostics[0].span.primary().unwrap().text(&src),
            Some("dev")
        );
        assert!(diagnostics[0].suggestion.is_none());

        assert!(run(&tree, &settings, &ty, "/ctrl").is_empty());
    }
}
