//! Reader, resolver and graph builder over synthetic Mach-O images

mod support;

use objc_deadcode::graph::ReferenceGraphBuilder;
use objc_deadcode::macho::{Arch, MachOReader, ObjcSection, SymbolResolver};
use objc_deadcode::{Error, SymbolCategory};
use std::path::Path;
use support::{fat, MachOBuilder, BASE, CPU_TYPE_ARM64, CPU_TYPE_X86_64};
use tempfile::TempDir;

const MAX_SYMBOL_SIZE: u64 = 1 << 20;

fn sample() -> MachOBuilder {
    MachOBuilder::new()
        .class("Bar", None)
        .class("Foo", Some("Bar"))
        .class("Baz", None)
        .class_ref("Foo")
        .method("Foo", "doWork")
        .method("Baz", "helper")
        .selector_ref("doWork")
        .cstring("Hello")
}

fn parse(bytes: &[u8]) -> objc_deadcode::Result<objc_deadcode::BinaryImage> {
    MachOReader::new().parse(Path::new("App"), bytes)
}

#[test]
fn test_reader_finds_objc_sections() {
    let image = parse(&sample().build()).unwrap();

    assert_eq!(image.arch_name(), "arm64");
    assert_eq!(image.base_address(), BASE);
    for kind in [
        ObjcSection::ClassList,
        ObjcSection::ClassRefs,
        ObjcSection::SelectorRefs,
        ObjcSection::MethodNames,
        ObjcSection::CStrings,
    ] {
        assert!(image.has_section(kind), "missing {}", kind.section_name());
    }
    assert!(!image.has_section(ObjcSection::NonLazyClassList));

    let classlist = image.section(ObjcSection::ClassList).unwrap();
    assert_eq!(classlist.entry_count(), 3);
    assert_eq!(image.pointers(ObjcSection::ClassRefs).len(), 1);
    assert_eq!(image.c_strings(ObjcSection::CStrings), vec!["Hello"]);
}

#[test]
fn test_reader_loads_defined_symbols() {
    let image = parse(&sample().build()).unwrap();
    let names: Vec<&str> = image.symbols().iter().map(|s| s.name.as_str()).collect();

    assert!(names.contains(&"_OBJC_CLASS_$_Foo"));
    assert!(names.contains(&"-[Baz helper]"));
    assert_eq!(names.len(), 5);
}

#[test]
fn test_resolver_maps_addresses_inside_ranges() {
    let (bytes, layout) = sample().build_with_layout();
    let image = parse(&bytes).unwrap();
    let resolver = SymbolResolver::from_image(&image, MAX_SYMBOL_SIZE);

    let foo = layout.classes["Foo"];
    let symbol = resolver.resolve(foo).unwrap();
    assert_eq!(symbol.name, "Foo");
    assert_eq!(symbol.category, SymbolCategory::Class);

    // Interior address of the method body
    let helper = layout.methods["-[Baz helper]"];
    let symbol = resolver.resolve(helper + 4).unwrap();
    assert_eq!(symbol.name, "helper");
    assert_eq!(symbol.owner.as_deref(), Some("Baz"));

    assert_eq!(resolver.resolve_by_name("Baz"), Some(layout.classes["Baz"]));
    assert!(resolver.resolve(BASE + 0x10).is_none());
    assert!(resolver.oversized_symbols().is_empty());
}

#[test]
fn test_tiny_threshold_flags_symbols_for_review() {
    let (bytes, layout) = sample().build_with_layout();
    let image = parse(&bytes).unwrap();
    let resolver = SymbolResolver::from_image(&image, 4);

    assert!(!resolver.oversized_symbols().is_empty());
    let helper = layout.methods["-[Baz helper]"];
    assert!(resolver.resolve(helper).is_some());
    assert!(resolver.resolve(helper + 8).is_none());
}

#[test]
fn test_fat_binary_selects_requested_slice() {
    let arm = sample().build();
    let intel = MachOBuilder::new()
        .cputype(CPU_TYPE_X86_64)
        .class("IntelOnly", None)
        .build();
    let universal = fat(&[(CPU_TYPE_X86_64, 3, intel), (CPU_TYPE_ARM64, 0, arm)]);

    let image = MachOReader::new()
        .with_arch(Some(Arch::Arm64))
        .parse(Path::new("App"), &universal)
        .unwrap();
    assert_eq!(image.arch_name(), "arm64");
    assert_eq!(image.section(ObjcSection::ClassList).unwrap().entry_count(), 3);

    let image = MachOReader::new()
        .with_arch(Some(Arch::X86_64))
        .parse(Path::new("App"), &universal)
        .unwrap();
    assert_eq!(image.arch_name(), "x86_64");
    assert_eq!(image.section(ObjcSection::ClassList).unwrap().entry_count(), 1);
}

#[test]
fn test_fat_binary_defaults_to_first_64_bit_slice() {
    let universal = fat(&[
        (CPU_TYPE_X86_64, 3, MachOBuilder::new().cputype(CPU_TYPE_X86_64).build()),
        (CPU_TYPE_ARM64, 0, sample().build()),
    ]);
    let image = parse(&universal).unwrap();
    assert_eq!(image.arch_name(), "x86_64");
}

#[test]
fn test_missing_slice_is_architecture_error() {
    let universal = fat(&[(CPU_TYPE_X86_64, 3, MachOBuilder::new().cputype(CPU_TYPE_X86_64).build())]);
    let err = MachOReader::new()
        .with_arch(Some(Arch::Arm64))
        .parse(Path::new("App"), &universal)
        .unwrap_err();

    match err {
        Error::ArchitectureNotFound { wanted, available, .. } => {
            assert_eq!(wanted, "arm64");
            assert_eq!(available, "x86_64");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_thin_binary_with_other_arch_is_rejected() {
    let err = MachOReader::new()
        .with_arch(Some(Arch::X86_64))
        .parse(Path::new("App"), &sample().build())
        .unwrap_err();
    assert!(matches!(err, Error::ArchitectureNotFound { .. }));
}

#[test]
fn test_32_bit_image_is_format_error() {
    // mach_header (32-bit) with no load commands
    let mut bytes = vec![0u8; 28];
    bytes[0..4].copy_from_slice(&0xfeed_face_u32.to_le_bytes());
    bytes[4..8].copy_from_slice(&12u32.to_le_bytes());
    bytes[12..16].copy_from_slice(&2u32.to_le_bytes());

    let err = parse(&bytes).unwrap_err();
    assert!(err.is_format(), "unexpected error: {err}");
}

#[test]
fn test_missing_and_empty_files() {
    let dir = TempDir::new().unwrap();

    let err = MachOReader::new().read(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::Path { .. }));

    let empty = dir.path().join("empty");
    std::fs::write(&empty, b"").unwrap();
    let err = MachOReader::new().read(&empty).unwrap_err();
    assert!(matches!(err, Error::Format { .. }));
}

#[test]
fn test_read_from_disk_matches_parse() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("App");
    sample().write_to(&path);

    let image = MachOReader::new().read(&path).unwrap();
    assert_eq!(image.path(), path.as_path());
    assert_eq!(image.symbols().len(), 5);
}

#[test]
fn test_graph_from_binary() {
    let image = parse(&sample().build()).unwrap();
    let resolver = SymbolResolver::from_image(&image, MAX_SYMBOL_SIZE);
    let graph = ReferenceGraphBuilder::new(&image, &resolver).build();

    let declared: Vec<&str> = graph.classes.symbols().map(|s| s.name.as_str()).collect();
    assert_eq!(declared.len(), 3);
    let referenced: Vec<&str> = graph.classes.referenced_names().into_iter().collect();
    assert_eq!(referenced, vec!["Foo"]);
    assert_eq!(graph.hierarchy.superclass("Foo"), Some("Bar"));
    assert_eq!(graph.hierarchy.superclass("Baz"), None);

    assert_eq!(graph.selectors.declared_count(), 2);
    let selectors: Vec<&str> = graph.selectors.referenced_names().into_iter().collect();
    assert_eq!(selectors, vec!["doWork"]);
    assert!(graph.unresolved.is_empty());
}

#[test]
fn test_stripped_classes_are_named_from_runtime_metadata() {
    let image = parse(&sample().strip_symbols().build()).unwrap();
    assert!(image.symbols().is_empty());

    let resolver = SymbolResolver::from_image(&image, MAX_SYMBOL_SIZE);
    let graph = ReferenceGraphBuilder::new(&image, &resolver).build();

    let mut declared: Vec<&str> = graph.classes.symbols().map(|s| s.name.as_str()).collect();
    declared.sort();
    assert_eq!(declared, vec!["Bar", "Baz", "Foo"]);
    assert_eq!(graph.hierarchy.superclass("Foo"), Some("Bar"));
    assert!(graph.classes.referenced_names().contains("Foo"));
}

#[test]
fn test_unresolvable_class_refs_are_counted_not_fatal() {
    let bytes = sample()
        .external_class_ref()
        .raw_class_ref(BASE + 0x10)
        .build();
    let image = parse(&bytes).unwrap();
    let resolver = SymbolResolver::from_image(&image, MAX_SYMBOL_SIZE);
    let graph = ReferenceGraphBuilder::new(&image, &resolver).build();

    // The bound (zero) pointer is skipped, the stray one recorded
    assert_eq!(graph.unresolved.len(), 1);
    assert_eq!(graph.unresolved[0].section, "__objc_classrefs");
    assert_eq!(graph.unresolved[0].address, BASE + 0x10);
    assert_eq!(graph.classes.referenced_count(), 1);
}

#[test]
fn test_load_hooks_from_nonlazy_list_and_class_methods() {
    let bytes = MachOBuilder::new()
        .class("Registrar", None)
        .class("Swizzler", None)
        .class("Idle", None)
        .non_lazy("Registrar")
        .class_method("Swizzler", "load")
        .method("Idle", "load")
        .build();
    let image = parse(&bytes).unwrap();
    let resolver = SymbolResolver::from_image(&image, MAX_SYMBOL_SIZE);
    let graph = ReferenceGraphBuilder::new(&image, &resolver).build();

    let hooks: Vec<&str> = graph.load_hooks.iter().map(String::as_str).collect();
    assert_eq!(hooks, vec!["Registrar", "Swizzler"]);
}
