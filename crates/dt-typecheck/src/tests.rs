use dt_diagnostic::{Diagnostic, DiagnosticTag, Severity, StandardTypeIssue, TextEdit};
use dt_tree::{
    builder::{cells, reference, string, NodeBuilder, TreeBuilder},
    MacroTable,
};
use pretty_assertions::assert_eq;

use crate::{
    standard::standard_node_type, validate_tree, BindingType, Catalog, MismatchPolicy,
    Settings, ValidationResult,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The root properties every board needs
fn board(root: &mut NodeBuilder<'_>) {
    root.prop("#address-cells", [cells("1")]);
    root.prop("#size-cells", [cells("1")]);
    root.prop("model", [string("Test board")]);
    root.prop("compatible", [string("vendor,board")]);
}

struct Checked {
    src: String,
    tree: dt_tree::Tree,
    diagnostics: Vec<Diagnostic>,
    result: ValidationResult,
}

impl Checked {
    fn issues(&self) -> Vec<StandardTypeIssue> {
        self.diagnostics
            .iter()
            .filter_map(|diag| diag.issue)
            .collect()
    }

    fn primary_text(&self, diag: &Diagnostic) -> &str {
        diag.span
            .primary()
            .and_then(|range| range.text(&self.src))
            .unwrap_or_default()
    }
}

fn check_with(builder: TreeBuilder, settings: &Settings, catalog: &Catalog) -> Checked {
    init_tracing();
    let (tree, src) = builder.finish();
    let (diagnostics, result) = validate_tree(&tree, &MacroTable::default(), settings, catalog);
    Checked {
        src,
        tree,
        diagnostics,
        result,
    }
}

fn check(builder: TreeBuilder) -> Checked {
    let settings = Settings::default();
    check_with(builder, &settings, &Catalog::standard(&settings))
}

#[test]
fn soc_validates_cleanly() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("soc", |soc| {
            soc.prop("compatible", [string("simple-bus")]);
            soc.prop("#address-cells", [cells("1")]);
            soc.prop("#size-cells", [cells("1")]);
            soc.prop("ranges", [cells("0x0 0xe0000000 0x00100000")]);
            soc.node("serial@4600", |serial| {
                serial.prop("reg", [cells("0x4600 0x100")]);
            });
        });
    }));
    assert!(checked.diagnostics.is_empty(), "{:#?}", checked.diagnostics);
}

#[test]
fn empty_root_requires_properties() {
    let checked = check(TreeBuilder::new().root(|_| {}));
    assert_eq!(
        checked
            .diagnostics
            .iter()
            .map(|diag| diag.params[0].as_str())
            .collect::<Vec<_>>(),
        vec!["compatible", "model", "#address-cells", "#size-cells"]
    );
    let fixed = TextEdit::apply(
        &checked.src,
        &checked.diagnostics[0].suggestion.as_ref().unwrap().edits,
    );
    assert!(fixed.contains("/ {\n\tcompatible = \"\";"));
}

#[test]
fn disabled_node_only_gets_a_hint() {
    let builder = || {
        TreeBuilder::new().root(|root| {
            board(root);
            root.node("serial@4600", |serial| {
                serial.prop("status", [string("disabled")]);
                serial.prop("reg", [cells("0x4600 0x100 0x1")]);
                serial.node("child@1", |_| {});
            });
        })
    };
    let checked = check(builder());
    assert_eq!(checked.issues(), vec![StandardTypeIssue::NodeDisabled]);
    let diag = &checked.diagnostics[0];
    assert_eq!(diag.severity, Severity::Hint);
    assert_eq!(diag.tags, vec![DiagnosticTag::Unnecessary]);
    assert_eq!(diag.msg, "Node `serial@4600` is disabled");

    let settings = Settings {
        report_disabled_nodes: false,
        ..Settings::default()
    };
    let quiet = check_with(builder(), &settings, &Catalog::standard(&settings));
    assert!(quiet.diagnostics.is_empty(), "{:#?}", quiet.diagnostics);
}

#[test]
fn duplicate_map_entry_links_first_occurrence() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("nexus", |nexus| {
            nexus.prop("#foo-cells", [cells("1")]);
            nexus.prop("foo-map", [cells("1 &p 10"), cells("1 &p 20")]);
        });
        root.node("p: controller", |p| {
            p.prop("#foo-cells", [cells("1")]);
        });
    }));
    assert_eq!(checked.issues(), vec![StandardTypeIssue::DuplicateMapEntry]);
    let diag = &checked.diagnostics[0];
    assert_eq!(checked.primary_text(diag), "1 &p 20");
    assert_eq!(
        diag.linked()
            .map(|range| range.text(&checked.src).unwrap())
            .collect::<Vec<_>>(),
        vec!["1 &p 10"]
    );
}

#[test]
fn incomplete_interrupt_map_entry() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("intc: intc", |intc| {
            intc.flag("interrupt-controller");
            intc.prop("#interrupt-cells", [cells("1")]);
        });
        root.node("nexus", |nexus| {
            nexus.prop("#address-cells", [cells("0")]);
            nexus.prop("#interrupt-cells", [cells("2")]);
            nexus.prop("interrupt-map", [cells("1 2 &intc 3"), cells("4 5")]);
        });
    }));
    assert_eq!(
        checked.issues(),
        vec![StandardTypeIssue::MapEntryIncomplete]
    );
    let diag = &checked.diagnostics[0];
    assert_eq!(checked.primary_text(diag), "4 5");
    assert_eq!(
        diag.params[1],
        "parent phandle, parent unit address, parent specifier"
    );
}

#[test]
fn interrupts_against_controller() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.prop("interrupt-parent", [cells("&intc")]);
        root.node("intc: interrupt-controller@1000", |intc| {
            intc.prop("reg", [cells("0x1000 0x100")]);
            intc.flag("interrupt-controller");
            intc.prop("#interrupt-cells", [cells("2")]);
        });
        root.node("dev@2000", |dev| {
            dev.prop("reg", [cells("0x2000 0x10")]);
            dev.prop("interrupts", [cells("5 1"), cells("6")]);
        });
    }));
    assert_eq!(checked.issues(), vec![StandardTypeIssue::CellMissMatch]);
    assert_eq!(checked.primary_text(&checked.diagnostics[0]), "6");

    let tree = &checked.tree;
    let intc = tree.label("intc").unwrap();
    let interrupts = tree
        .find_property(tree.node_by_path("/dev@2000").unwrap(), "interrupts")
        .unwrap();
    let mappings = checked.result.mappings(interrupts);
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].target, intc);
    assert_eq!(mappings[0].specifier.as_deref(), Some(&[5, 1][..]));
    assert_eq!(mappings[0].range.text(&checked.src), Some("5 1"));
    assert_eq!(checked.result.mappings_targeting(intc).count(), 1);
}

#[test]
fn interrupt_nexus_lookup() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("intc: interrupt-controller@1000", |intc| {
            intc.prop("reg", [cells("0x1000 0x100")]);
            intc.flag("interrupt-controller");
            intc.prop("#interrupt-cells", [cells("1")]);
        });
        root.node("bridge@2000", |bridge| {
            bridge.prop("reg", [cells("0x2000 0x100")]);
            bridge.prop("#address-cells", [cells("1")]);
            bridge.prop("#size-cells", [cells("0")]);
            bridge.prop("#interrupt-cells", [cells("1")]);
            bridge.prop(
                "interrupt-map",
                [cells("0x10 1 &intc 7"), cells("0x20 1 &intc 8")],
            );
            bridge.prop("interrupt-map-mask", [cells("0xffff 0x7")]);
            bridge.node("dev@10", |dev| {
                dev.prop("reg", [cells("0x10")]);
                dev.prop("interrupts", [cells("1")]);
            });
            bridge.node("dev@30", |dev| {
                dev.prop("reg", [cells("0x30")]);
                dev.prop("interrupts", [cells("1")]);
            });
        });
    }));
    assert_eq!(checked.issues(), vec![StandardTypeIssue::NoNexusMapMatch]);
    let diag = &checked.diagnostics[0];
    assert_eq!(
        diag.params,
        vec![
            "interrupt-map".to_owned(),
            "/bridge@2000".to_owned(),
            "<0x30 0x1>".to_owned()
        ]
    );

    let tree = &checked.tree;
    let intc = tree.label("intc").unwrap();
    let bridge = tree.node_by_path("/bridge@2000").unwrap();
    let interrupts = tree
        .find_property(
            tree.node_by_path("/bridge@2000/dev@10").unwrap(),
            "interrupts",
        )
        .unwrap();
    let resolved = checked.result.mappings(interrupts)[0].resolved.as_ref().unwrap();
    assert_eq!(resolved.parent, intc);
    assert_eq!(resolved.entry, 0);
    assert_eq!(resolved.parent_specifier.as_deref(), Some(&[7][..]));
    assert_eq!(checked.result.mappings_targeting(bridge).count(), 2);
    assert_eq!(checked.result.mappings_targeting(intc).count(), 1);
}

#[test]
fn interrupts_extended_overrides_interrupts() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("intc: interrupt-controller@1000", |intc| {
            intc.prop("reg", [cells("0x1000 0x100")]);
            intc.flag("interrupt-controller");
            intc.prop("#interrupt-cells", [cells("2")]);
        });
        root.node("dev@2000", |dev| {
            dev.prop("reg", [cells("0x2000 0x10")]);
            dev.prop("interrupts", [cells("1 2")]);
            dev.prop(
                "interrupts-extended",
                [cells("&intc 1 2"), cells("&nope 3 4")],
            );
        });
    }));
    assert_eq!(
        checked.issues(),
        vec![
            StandardTypeIssue::IgnoredProperty,
            StandardTypeIssue::InterruptsParentNodeNotFound
        ]
    );
    assert_eq!(checked.primary_text(&checked.diagnostics[0]), "interrupts");
    assert_eq!(
        checked.diagnostics[0].msg,
        "Property `interrupts` is ignored because `interrupts-extended` is present"
    );
    assert_eq!(checked.primary_text(&checked.diagnostics[1]), "&nope");
    assert_eq!(checked.diagnostics[1].params, vec!["&nope".to_owned()]);

    let tree = &checked.tree;
    let dev = tree.node_by_path("/dev@2000").unwrap();
    let intc = tree.label("intc").unwrap();
    assert!(checked
        .result
        .mappings(tree.find_property(dev, "interrupts").unwrap())
        .is_empty());
    let mappings = checked
        .result
        .mappings(tree.find_property(dev, "interrupts-extended").unwrap());
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].target, intc);
    assert_eq!(mappings[0].specifier.as_deref(), Some(&[1, 2][..]));
    assert_eq!(mappings[0].range.text(&checked.src), Some("&intc 1 2"));
}

#[test]
fn dangling_phandles() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("nexus", |nexus| {
            nexus.prop("#foo-cells", [cells("1")]);
            nexus.prop("foo-map", [cells("1 &nope 2")]);
        });
        root.node("dev@2000", |dev| {
            dev.prop("reg", [cells("0x2000 0x10")]);
            dev.prop("interrupt-parent", [cells("&missing")]);
            dev.prop("interrupts", [cells("5")]);
        });
    }));
    assert_eq!(
        checked.issues(),
        vec![
            StandardTypeIssue::InterruptsParentNodeNotFound,
            StandardTypeIssue::InterruptsParentNodeNotFound
        ]
    );
    assert_eq!(
        checked
            .diagnostics
            .iter()
            .map(|diag| checked.primary_text(diag))
            .collect::<Vec<_>>(),
        vec!["&nope", "&missing"]
    );
    assert_eq!(
        checked.diagnostics[1].msg,
        "Unable to resolve `&missing` to a node"
    );
}

#[test]
fn unique_phandles() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("a", |a| {
            a.prop("phandle", [cells("5")]);
        });
        root.node("b", |b| {
            b.prop("phandle", [cells("5")]);
        });
    }));
    assert_eq!(
        checked.issues(),
        vec![StandardTypeIssue::ExpectedUniquePhandle]
    );
    let diag = &checked.diagnostics[0];
    assert_eq!(checked.primary_text(diag), "<5>");
    assert_eq!(diag.msg, "Phandle 5 is already used by node `/a`");
}

#[test]
fn deprecated_properties() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("uart", |uart| {
            uart.prop("linux,phandle", [cells("1")]);
            uart.prop("name", [string("uart")]);
            uart.prop("device_type", [string("serial")]);
        });
        root.node("memory@80000000", |memory| {
            memory.prop("device_type", [string("memory")]);
            memory.prop("reg", [cells("0x80000000 0x1000")]);
        });
    }));
    assert_eq!(
        checked
            .diagnostics
            .iter()
            .map(|diag| (diag.issue, diag.params[0].as_str(), diag.severity))
            .collect::<Vec<_>>(),
        vec![
            (Some(StandardTypeIssue::Deprecated), "linux,phandle", Severity::Hint),
            (Some(StandardTypeIssue::Deprecated), "name", Severity::Hint),
            (Some(StandardTypeIssue::Deprecated), "device_type", Severity::Hint),
        ]
    );
    assert!(checked
        .diagnostics
        .iter()
        .all(|diag| diag.tags == vec![DiagnosticTag::Deprecated]));
}

#[test]
fn aliases_and_chosen_paths() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("aliases", |aliases| {
            aliases.prop("serial0", [string("/soc/serial@4600")]);
            aliases.prop("Bad_Name", [reference("uart")]);
            aliases.prop("broken", [string("/nope")]);
        });
        root.node("chosen", |chosen| {
            chosen.prop("stdout-path", [string("serial0:115200n8")]);
            chosen.prop("stdin-path", [string("missing")]);
        });
        root.node("soc", |soc| {
            soc.prop("#address-cells", [cells("1")]);
            soc.prop("#size-cells", [cells("1")]);
            soc.node("uart: serial@4600", |serial| {
                serial.prop("reg", [cells("0x4600 0x100")]);
            });
        });
    }));
    assert_eq!(
        checked.issues(),
        vec![
            StandardTypeIssue::InvalidName,
            StandardTypeIssue::UnableToResolvePath,
            StandardTypeIssue::UnableToResolvePath,
        ]
    );
    assert_eq!(checked.diagnostics[0].severity, Severity::Warn);
    assert_eq!(checked.primary_text(&checked.diagnostics[0]), "Bad_Name");
    assert_eq!(checked.diagnostics[1].msg, "Unable to resolve path `/nope`");
    assert_eq!(checked.primary_text(&checked.diagnostics[2]), "\"missing\"");
}

#[test]
fn node_locations() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("cpus", |cpus| {
            cpus.prop("#address-cells", [cells("1")]);
            cpus.prop("#size-cells", [cells("1")]);
            cpus.node("cpu@0", |cpu| {
                cpu.prop("device_type", [string("cpu")]);
                cpu.prop("reg", [cells("0x0 0x0")]);
            });
        });
        root.node("soc", |soc| {
            soc.prop("#address-cells", [cells("1")]);
            soc.prop("#size-cells", [cells("0")]);
            soc.node("chosen", |_| {});
            soc.node("cpu@1", |cpu| {
                cpu.prop("device_type", [string("cpu")]);
                cpu.prop("reg", [cells("0x1")]);
            });
        });
    }));
    assert_eq!(
        checked
            .diagnostics
            .iter()
            .map(|diag| diag.msg.to_string())
            .collect::<Vec<_>>(),
        vec![
            "Property `#size-cells` should be `<0>`",
            "Node `chosen` should be a child of the root node",
            "Node `cpu@1` should be a child of `/cpus`",
        ]
    );
    assert_eq!(checked.primary_text(&checked.diagnostics[0]), "<1>");
    assert_eq!(checked.primary_text(&checked.diagnostics[2]), "cpu@1");
}

#[test]
fn reserved_memory() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("reserved-memory", |rmem| {
            rmem.prop("#address-cells", [cells("2")]);
            rmem.prop("#size-cells", [cells("1")]);
            rmem.flag("ranges");
            rmem.node("pool", |pool| {
                pool.prop("size", [cells("0x1000")]);
                pool.flag("no-map");
            });
            rmem.node("other", |other| {
                other.flag("reusable");
            });
        });
    }));
    assert_eq!(
        checked
            .diagnostics
            .iter()
            .map(|diag| (diag.issue, diag.params[0].as_str()))
            .collect::<Vec<_>>(),
        vec![
            (Some(StandardTypeIssue::ExpectedValue), "#address-cells"),
            (Some(StandardTypeIssue::Required), "size"),
        ]
    );
    assert_eq!(checked.primary_text(&checked.diagnostics[0]), "<2>");
}

#[test]
fn missing_unit_address_is_fixable() {
    let checked = check(TreeBuilder::new().root(|root| {
        board(root);
        root.node("serial", |serial| {
            serial.prop("reg", [cells("0x4600 0x100")]);
        });
    }));
    assert_eq!(
        checked.issues(),
        vec![StandardTypeIssue::ExpectedNodeAddress]
    );
    let suggestion = checked.diagnostics[0].suggestion.as_ref().unwrap();
    let fixed = TextEdit::apply(&checked.src, &suggestion.edits);
    assert!(fixed.contains("\tserial@4600 {\n"));
}

#[test]
fn zephyr_binding_tolerates_controllers() {
    let settings = Settings {
        binding_type: BindingType::Zephyr,
        ..Settings::default()
    };
    let mut catalog = Catalog::standard(&settings);
    catalog.insert_binding(
        "vendor,gpio",
        standard_node_type("vendor,gpio")
            .with_mismatch(MismatchPolicy::Warn)
            .with_binding_type(settings.binding_type),
    );
    let checked = check_with(
        TreeBuilder::new().root(|root| {
            board(root);
            root.node("gpio@5000", |gpio| {
                gpio.prop("compatible", [string("vendor,gpio")]);
                gpio.prop("reg", [cells("0x5000 0x100")]);
                gpio.flag("gpio-controller");
                gpio.prop("#gpio-cells", [cells("2")]);
                gpio.prop("vendor,extra", [cells("1")]);
            });
        }),
        &settings,
        &catalog,
    );
    assert_eq!(
        checked.issues(),
        vec![StandardTypeIssue::PropertyNotInBinding]
    );
    assert_eq!(
        checked.primary_text(&checked.diagnostics[0]),
        "vendor,extra"
    );
}

#[test]
fn validation_is_deterministic() {
    let builder = || {
        TreeBuilder::new().root(|root| {
            board(root);
            root.node("nexus", |nexus| {
                nexus.prop("#foo-cells", [cells("1")]);
                nexus.prop(
                    "foo-map",
                    [cells("1 &p 10"), cells("1 &p 20"), cells("2 &p")],
                );
            });
            root.node("p: controller", |p| {
                p.prop("#foo-cells", [cells("1")]);
            });
        })
    };
    let first = check(builder());
    let second = check(builder());
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(
        first.issues(),
        vec![
            StandardTypeIssue::MapEntryIncomplete,
            StandardTypeIssue::DuplicateMapEntry
        ]
    );
}
