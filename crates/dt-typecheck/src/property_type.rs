//! Property types: what a property is named, what its values look like and when it must be
//! present

use std::{borrow::Cow, sync::Arc};

use dt_diagnostic::{text_range::TextRange, Diagnostic, StandardTypeIssue, TextEdit};
use dt_tree::{NodeId, PropValue, Property, PropertyId};
use itertools::Itertools as _;
use vec1::Vec1;

use crate::{context::Context, nexus::NexusMapping};

/// The structural type of a property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// No value, e.g. `interrupt-controller;`
    Empty,
    /// One cell
    U32,
    /// Two cells
    U64,
    String,
    /// Any number of cells, possibly in multiple arrays
    PropEncodedArray,
    /// One or more strings
    StringList,
    Bytestring,
    /// Anything, skipping all further checks
    Any,
    /// Not known, e.g. an empty cell array
    Unknown,
}

impl PropertyType {
    /// Returns the issue reported when a value isn't of this type.
    pub const fn expected_issue(self) -> Option<StandardTypeIssue> {
        Some(match self {
            Self::Empty => StandardTypeIssue::ExpectedEmpty,
            Self::U32 => StandardTypeIssue::ExpectedU32,
            Self::U64 => StandardTypeIssue::ExpectedU64,
            Self::String => StandardTypeIssue::ExpectedString,
            Self::PropEncodedArray => StandardTypeIssue::ExpectedPropEncodedArray,
            Self::StringList => StandardTypeIssue::ExpectedStringlist,
            Self::Bytestring => StandardTypeIssue::ExpectedBytestring,
            Self::Any | Self::Unknown => return None,
        })
    }

    /// Returns the type of one comma-separated value.
    ///
    /// Cell arrays are typed by their length, references outside cells are strings (they
    /// evaluate to the target's path).
    pub fn of_value(value: &PropValue) -> Self {
        match value {
            PropValue::String(_) | PropValue::Phandle(_) => Self::String,
            PropValue::Bytestring(_) => Self::Bytestring,
            PropValue::Expression(_) => Self::Unknown,
            PropValue::Cells(array) => match array.cells.len() {
                0 => Self::Unknown,
                1 => Self::U32,
                2 => Self::U64,
                _ => Self::PropEncodedArray,
            },
        }
    }

    /// The value inserted by the fix for a missing property
    fn placeholder(self) -> &'static str {
        match self {
            Self::U32 | Self::U64 | Self::PropEncodedArray => " = <>",
            Self::String | Self::StringList => " = \"\"",
            Self::Bytestring => " = []",
            Self::Empty | Self::Any | Self::Unknown => "",
        }
    }

    /// Checks `prop` against this type. On failure returns the issue and the offending range.
    fn check(self, prop: &Property, list: bool) -> Result<(), (StandardTypeIssue, TextRange)> {
        let Some(issue) = self.expected_issue() else {
            return Ok(());
        };
        let values = &prop.values;
        if self == Self::Empty {
            return match values.first() {
                Some(value) => Err((issue, value.text_range())),
                None => Ok(()),
            };
        }
        if values.is_empty() {
            return Err((issue, prop.name_range));
        }
        let slot_ok = |value: &PropValue| match self {
            Self::StringList => matches!(value, PropValue::String(_) | PropValue::Phandle(_)),
            Self::PropEncodedArray => matches!(value, PropValue::Cells(_)),
            _ => Self::of_value(value) == self,
        };
        if let Some(value) = values.iter().find(|value| !slot_ok(value)) {
            return Err((issue, value.text_range()));
        }
        let single = matches!(self, Self::U32 | Self::U64 | Self::String | Self::Bytestring);
        if single && !list && values.len() > 1 {
            return Err((StandardTypeIssue::ExpectedOne, values[1].text_range()));
        }
        Ok(())
    }
}

/// Whether a property must be present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requirement {
    Required,
    Optional,
    /// Must not be present
    Omitted,
}

/// Diagnostics and decoded nexus mappings of one property
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyReport {
    pub diagnostics: Vec<Diagnostic>,
    pub mappings: Vec<NexusMapping>,
}

impl PropertyReport {
    pub fn push(&mut self, diag: Diagnostic) {
        self.diagnostics.push(diag);
    }

    pub fn extend(&mut self, other: PropertyReport) {
        self.diagnostics.extend(other.diagnostics);
        self.mappings.extend(other.mappings);
    }
}

impl From<Vec<Diagnostic>> for PropertyReport {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            mappings: Vec::new(),
        }
    }
}

pub type RequirementFn = Arc<dyn Fn(&Context<'_>, NodeId) -> Requirement + Send + Sync>;
pub type ValuesFn = Arc<dyn Fn(&Context<'_>, PropertyId) -> Vec<String> + Send + Sync>;
pub type PropertyCheck = Arc<dyn Fn(&Context<'_>, PropertyId) -> PropertyReport + Send + Sync>;

/// How a property type is matched by name
#[derive(derive_more::Debug, Clone)]
pub enum PropertyName {
    Exact(Cow<'static, str>),
    /// A family of names, e.g. `#<x>-cells`
    Pattern {
        description: Cow<'static, str>,
        #[debug(skip)]
        matches: fn(&str) -> bool,
    },
}

impl PropertyName {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Pattern { matches, .. } => matches(name),
        }
    }

    pub fn as_exact(&self) -> Option<&str> {
        match self {
            Self::Exact(exact) => Some(exact),
            Self::Pattern { .. } => None,
        }
    }
}

impl std::fmt::Display for PropertyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Pattern { description, .. } => f.write_str(description),
        }
    }
}

/// The declared type of a property
///
/// # Example
///
/// ```
/// use dt_typecheck::{PropertyNodeType, PropertyType};
/// use vec1::vec1;
///
/// let status = PropertyNodeType::new("status", vec1![PropertyType::String])
///     .with_default("okay")
///     .with_values(["disabled", "reserved", "fail"]);
/// assert!(status.name.matches("status"));
/// ```
#[derive(derive_more::Debug, Clone)]
pub struct PropertyNodeType {
    pub name: PropertyName,
    /// Accepted alternatives
    pub types: Vec1<PropertyType>,
    #[debug(skip)]
    pub required: RequirementFn,
    /// Default value, also accepted when [`values`](Self::values) is set
    pub default: Option<String>,
    /// Accepted string values
    #[debug(skip)]
    pub values: Option<ValuesFn>,
    /// Semantic check run once the structural type is right
    #[debug(skip)]
    pub additional_check: Option<PropertyCheck>,
    /// Whether scalar types may repeat, e.g. `<1>, <2>` for [`PropertyType::U32`]
    pub list: bool,
    pub deprecated: bool,
}

impl PropertyNodeType {
    pub fn new(name: impl Into<Cow<'static, str>>, types: Vec1<PropertyType>) -> Self {
        Self::with_name(PropertyName::Exact(name.into()), types)
    }

    pub fn pattern(
        description: impl Into<Cow<'static, str>>,
        matches: fn(&str) -> bool,
        types: Vec1<PropertyType>,
    ) -> Self {
        Self::with_name(
            PropertyName::Pattern {
                description: description.into(),
                matches,
            },
            types,
        )
    }

    fn with_name(name: PropertyName, types: Vec1<PropertyType>) -> Self {
        Self {
            name,
            types,
            required: Arc::new(|_: &Context<'_>, _: NodeId| Requirement::Optional),
            default: None,
            values: None,
            additional_check: None,
            list: false,
            deprecated: false,
        }
    }

    #[must_use]
    pub fn required(self) -> Self {
        self.required_if(|_, _| Requirement::Required)
    }

    #[must_use]
    pub fn omitted(self) -> Self {
        self.required_if(|_, _| Requirement::Omitted)
    }

    /// Sets a node-dependent requirement.
    #[must_use]
    pub fn required_if(
        mut self,
        required: impl Fn(&Context<'_>, NodeId) -> Requirement + Send + Sync + 'static,
    ) -> Self {
        self.required = Arc::new(required);
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    #[must_use]
    pub fn with_values(self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        self.with_computed_values(move |_, _| values.clone())
    }

    #[must_use]
    pub fn with_computed_values(
        mut self,
        values: impl Fn(&Context<'_>, PropertyId) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.values = Some(Arc::new(values));
        self
    }

    #[must_use]
    pub fn with_check(
        mut self,
        check: impl Fn(&Context<'_>, PropertyId) -> PropertyReport + Send + Sync + 'static,
    ) -> Self {
        self.additional_check = Some(Arc::new(check));
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn requirement(&self, ctx: &Context<'_>, node: NodeId) -> Requirement {
        (self.required)(ctx, node)
    }

    /// Validates the property matching this type on `node`, or its absence.
    pub fn validate(
        &self,
        ctx: &Context<'_>,
        node: NodeId,
        prop: Option<PropertyId>,
    ) -> PropertyReport {
        let requirement = self.requirement(ctx, node);
        let Some(prop) = prop else {
            let mut report = PropertyReport::default();
            if requirement == Requirement::Required {
                report.push(self.missing(ctx, node));
            }
            return report;
        };
        let property = &ctx.tree[prop];
        if requirement == Requirement::Omitted {
            let diag = Diagnostic::issue(
                StandardTypeIssue::Omitted,
                property.name_range,
                [property.name.as_str()],
            );
            let fix = vec![TextEdit::delete(property.range)];
            return vec![diag.with_suggestion("Remove the property", fix)].into();
        }

        let mut report = PropertyReport::default();
        if self.deprecated {
            report.push(Diagnostic::issue(
                StandardTypeIssue::Deprecated,
                property.name_range,
                [property.name.as_str()],
            ));
        }
        if self.types.contains(&PropertyType::Any) {
            return report;
        }

        let failures: Vec<_> = self
            .types
            .iter()
            .map(|ty| ty.check(property, self.list))
            .collect();
        if failures.iter().all(Result::is_err) {
            for (issue, range) in failures.into_iter().filter_map(Result::err) {
                report.push(Diagnostic::issue(issue, range, [property.name.as_str()]));
            }
            return report;
        }

        if let Some(values) = &self.values {
            let allowed: Vec<String> = self
                .default
                .iter()
                .cloned()
                .chain(values(ctx, prop))
                .unique()
                .collect();
            for value in &property.values {
                let PropValue::String(string) = value else {
                    continue;
                };
                if !allowed.contains(&string.value) {
                    let set = allowed.iter().map(|value| format!("`{value}`")).join(", ");
                    report.push(Diagnostic::issue(
                        StandardTypeIssue::ExpectedEnum,
                        string.range,
                        [property.name.clone(), set],
                    ));
                }
            }
        }

        if let Some(check) = &self.additional_check {
            report.extend(check(ctx, prop));
        }
        report
    }

    /// Builds the REQUIRED diagnostic, anchored at every definition of the node, with a fix that
    /// adds the property to the last one.
    fn missing(&self, ctx: &Context<'_>, node: NodeId) -> Diagnostic {
        let name = self.name.to_string();
        let definitions = &ctx.tree[node].definitions;
        let spans: Vec<TextRange> = definitions.iter().map(|def| def.name_range).collect();
        let diag = Diagnostic::issue(
            StandardTypeIssue::Required,
            if spans.is_empty() {
                vec![TextRange::default()]
            } else {
                spans
            },
            [name.as_str()],
        );
        let Some(last) = definitions.last() else {
            return diag;
        };
        if self.name.as_exact().is_none() {
            return diag;
        }

        let value = if name == "reg" {
            reg_placeholder(ctx, node)
        } else {
            Cow::Borrowed(self.types.first().placeholder())
        };
        let depth = ctx.tree.ancestors(node).count() + 1;
        let indent = "\t".repeat(if last.is_reference { 1 } else { depth });
        diag.with_suggestion(
            format!("Add `{name}`"),
            vec![TextEdit::insert(
                last.body_range.start + 1,
                format!("\n{indent}{name}{value};"),
            )],
        )
    }
}

/// `reg` pre-filled with the unit address, laid out with the parent's cell counts, and a zero
/// size
fn reg_placeholder(ctx: &Context<'_>, node: NodeId) -> Cow<'static, str> {
    let Some(address) = ctx.tree[node].address() else {
        return Cow::Borrowed(" = <>");
    };
    let address_cells = ctx.parent_address_cells(node).unwrap_or(address.len());
    let size_cells = ctx.parent_size_cells(node).unwrap_or(0);
    // a single component is split over the address cells, most significant first
    let address = if address.len() == 1 && address_cells > 1 {
        let value = address[0];
        (0..address_cells)
            .rev()
            .map(|i| {
                u32::try_from(i)
                    .ok()
                    .and_then(|i| i.checked_mul(32))
                    .and_then(|shift| value.checked_shr(shift))
                    .map_or(0, |cell| cell & 0xffff_ffff)
            })
            .collect()
    } else {
        address
    };
    let cells = address
        .iter()
        .map(|cell| format!("{cell:#x}"))
        .chain(itertools::repeat_n("0x0".to_owned(), size_cells))
        .join(" ");
    Cow::Owned(format!(" = <{cells}>"))
}
