use crate::Severity;

/// The closed set of issues the binding and type validation layer reports.
///
/// Each issue has a message template with `{0}`, `{1}`, ... placeholders that are filled from the
/// diagnostic's parameters, see [`StandardTypeIssue::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize),
    serde(rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum StandardTypeIssue {
    // Structural
    Required,
    Omitted,
    ExpectedEmpty,
    ExpectedString,
    ExpectedStringlist,
    ExpectedU32,
    ExpectedU64,
    ExpectedPropEncodedArray,
    ExpectedBytestring,
    ExpectedOne,
    ExpectedCompositeLength,
    ExpectedEnum,
    ExpectedValue,
    ExpectedNodeAddress,
    InvalidName,

    // Cardinality and encoding
    CellMissMatch,
    MapEntryIncomplete,

    // Cross-reference
    InterruptsParentNodeNotFound,
    UnableToResolvePath,
    PropertyRequiresOtherPropertyInNode,
    NoNexusMapMatch,
    MismatchNodeAddressRefAddressValue,

    // Uniqueness
    ExpectedUniquePhandle,
    DuplicateMapEntry,

    // Policy
    PropertyNotAllowed,
    PropertyNotInBinding,
    NodeLocation,
    Deprecated,
    IgnoredProperty,
    NodeDisabled,
}

impl StandardTypeIssue {
    /// Returns the stable identifier used by editors, e.g. `CELL_MISS_MATCH`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Omitted => "OMITTED",
            Self::ExpectedEmpty => "EXPECTED_EMPTY",
            Self::ExpectedString => "EXPECTED_STRING",
            Self::ExpectedStringlist => "EXPECTED_STRINGLIST",
            Self::ExpectedU32 => "EXPECTED_U32",
            Self::ExpectedU64 => "EXPECTED_U64",
            Self::ExpectedPropEncodedArray => "EXPECTED_PROP_ENCODED_ARRAY",
            Self::ExpectedBytestring => "EXPECTED_BYTESTRING",
            Self::ExpectedOne => "EXPECTED_ONE",
            Self::ExpectedCompositeLength => "EXPECTED_COMPOSITE_LENGTH",
            Self::ExpectedEnum => "EXPECTED_ENUM",
            Self::ExpectedValue => "EXPECTED_VALUE",
            Self::ExpectedNodeAddress => "EXPECTED_NODE_ADDRESS",
            Self::InvalidName => "INVALID_NAME",
            Self::CellMissMatch => "CELL_MISS_MATCH",
            Self::MapEntryIncomplete => "MAP_ENTRY_INCOMPLETE",
            Self::InterruptsParentNodeNotFound => "INTERRUPTS_PARENT_NODE_NOT_FOUND",
            Self::UnableToResolvePath => "UNABLE_TO_RESOLVE_PATH",
            Self::PropertyRequiresOtherPropertyInNode => "PROPERTY_REQUIRES_OTHER_PROPERTY_IN_NODE",
            Self::NoNexusMapMatch => "NO_NEXUS_MAP_MATCH",
            Self::MismatchNodeAddressRefAddressValue => "MISMATCH_NODE_ADDRESS_REF_ADDRESS_VALUE",
            Self::ExpectedUniquePhandle => "EXPECTED_UNIQUE_PHANDLE",
            Self::DuplicateMapEntry => "DUPLICATE_MAP_ENTRY",
            Self::PropertyNotAllowed => "PROPERTY_NOT_ALLOWED",
            Self::PropertyNotInBinding => "PROPERTY_NOT_IN_BINDING",
            Self::NodeLocation => "NODE_LOCATION",
            Self::Deprecated => "DEPRECATED",
            Self::IgnoredProperty => "IGNORED_PROPERTY",
            Self::NodeDisabled => "NODE_DISABLED",
        }
    }

    /// The message template. Placeholders are positional: `{0}` is the first parameter.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            Self::Required => "Property `{0}` is required",
            Self::Omitted => "Property `{0}` should be omitted",
            Self::ExpectedEmpty => "Property `{0}` should be empty",
            Self::ExpectedString => "Property `{0}` should be a string",
            Self::ExpectedStringlist => "Property `{0}` should be a string or a list of strings",
            Self::ExpectedU32 => "Property `{0}` should be a single cell (u32)",
            Self::ExpectedU64 => "Property `{0}` should be two cells (u64)",
            Self::ExpectedPropEncodedArray => "Property `{0}` should be a cell array",
            Self::ExpectedBytestring => "Property `{0}` should be a bytestring",
            Self::ExpectedOne => "Property `{0}` should have exactly one value",
            Self::ExpectedCompositeLength => "Property `{0}` should have {1} cells, found {2}",
            Self::ExpectedEnum => "Property `{0}` should be one of {1}",
            Self::ExpectedValue => "Property `{0}` should be {1}",
            Self::ExpectedNodeAddress => "Node `{0}` has a `reg` property but no unit address",
            Self::InvalidName => "`{0}` should match `{1}`",
            Self::CellMissMatch => "Property `{0}` should be a multiple of {1} cells: {2}",
            Self::MapEntryIncomplete => "Entry of `{0}` is incomplete, missing: {1}",
            Self::InterruptsParentNodeNotFound => "Unable to resolve `{0}` to a node",
            Self::UnableToResolvePath => "Unable to resolve path `{0}`",
            Self::PropertyRequiresOtherPropertyInNode => {
                "Property `{0}` requires property `{1}` in node `{2}`"
            }
            Self::NoNexusMapMatch => "No entry of `{0}` in node `{1}` matches {2}",
            Self::MismatchNodeAddressRefAddressValue => {
                "Address {0} in `reg` does not match the unit address {1}"
            }
            Self::ExpectedUniquePhandle => "Phandle {0} is already used by node `{1}`",
            Self::DuplicateMapEntry => "Duplicate entry of `{0}` for {1}",
            Self::PropertyNotAllowed => "Property `{0}` is not allowed in this node",
            Self::PropertyNotInBinding => "Property `{0}` is not defined by the binding",
            Self::NodeLocation => "Node `{0}` should be {1}",
            Self::Deprecated => "Property `{0}` is deprecated",
            Self::IgnoredProperty => "Property `{0}` is ignored because `{1}` is present",
            Self::NodeDisabled => "Node `{0}` is disabled",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::Deprecated | Self::NodeDisabled => Severity::Hint,
            Self::PropertyNotInBinding | Self::IgnoredProperty | Self::InvalidName => {
                Severity::Warn
            }
            _ => Severity::Error,
        }
    }

    /// Renders the message template with `params`.
    ///
    /// Placeholders without a matching parameter are left as-is.
    ///
    /// # Example
    ///
    /// ```
    /// use dt_diagnostic::StandardTypeIssue;
    ///
    /// let msg = StandardTypeIssue::Required.render(&["reg".to_owned()]);
    /// assert_eq!(msg, "Property `reg` is required");
    /// ```
    #[must_use]
    pub fn render(self, params: &[String]) -> String {
        let template = self.template();
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                rest = &rest[open..];
                break;
            };
            match after[..close]
                .parse::<usize>()
                .ok()
                .and_then(|i| params.get(i))
            {
                Some(param) => out.push_str(param),
                None => out.push_str(&rest[open..=open + 1 + close]),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

impl std::fmt::Display for StandardTypeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
