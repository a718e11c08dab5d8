//! Synthetic Mach-O images for integration tests.
//!
//! Layout of a built image (single arm64 slice, vmaddr = BASE + file offset):
//!   0x0000  mach_header_64 + load commands
//!   0x1000  __TEXT: __text, __objc_methname, __objc_classname, __cstring
//!   DATA    __DATA: __objc_classlist, [__objc_nlclslist], __objc_classrefs,
//!           [__objc_selrefs], __objc_const, __objc_data
//!   then    symbol table and string table

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const BASE: u64 = 0x1_0000_0000;
pub const CPU_TYPE_ARM64: u32 = 0x0100_000c;
pub const CPU_TYPE_X86_64: u32 = 0x0100_0007;
pub const CPU_TYPE_ARM: u32 = 12;

const LC_SEGMENT_64: u32 = 0x19;
const LC_SYMTAB: u32 = 0x02;
const SEGMENT_CMD_SIZE: usize = 72;
const SECTION_SIZE: usize = 80;
const TEXT_START: usize = 0x1000;
const METHOD_SIZE: usize = 16;
const CLASS_SIZE: usize = 40;
const RO_SIZE: usize = 32;

pub fn write_u32_le(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn write_u64_le(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn write_name(data: &mut [u8], offset: usize, name: &str) {
    data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
}

fn align(value: usize, to: usize) -> usize {
    (value + to - 1) / to * to
}

#[derive(Debug, Clone)]
struct ClassSpec {
    name: String,
    superclass: Option<String>,
}

#[derive(Debug, Clone)]
struct MethodSpec {
    class: String,
    selector: String,
    class_method: bool,
}

#[derive(Debug, Clone)]
enum ClassRef {
    Local(String),
    External,
    Raw(u64),
}

struct Section {
    segment: &'static str,
    name: &'static str,
    content: Vec<u8>,
    offset: usize,
}

/// Addresses assigned by a layout pass
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub classes: BTreeMap<String, u64>,
    pub methods: BTreeMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct MachOBuilder {
    cputype: u32,
    classes: Vec<ClassSpec>,
    class_refs: Vec<ClassRef>,
    methods: Vec<MethodSpec>,
    selector_refs: Option<Vec<String>>,
    non_lazy: Vec<String>,
    cstrings: Vec<String>,
    strip_symbols: bool,
}

impl Default for MachOBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MachOBuilder {
    pub fn new() -> Self {
        Self {
            cputype: CPU_TYPE_ARM64,
            classes: Vec::new(),
            class_refs: Vec::new(),
            methods: Vec::new(),
            selector_refs: Some(Vec::new()),
            non_lazy: Vec::new(),
            cstrings: Vec::new(),
            strip_symbols: false,
        }
    }

    pub fn cputype(mut self, cputype: u32) -> Self {
        self.cputype = cputype;
        self
    }

    pub fn class(mut self, name: &str, superclass: Option<&str>) -> Self {
        self.classes.push(ClassSpec {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
        });
        self
    }

    pub fn class_ref(mut self, name: &str) -> Self {
        self.class_refs.push(ClassRef::Local(name.to_string()));
        self
    }

    /// A bound (zero) pointer to a class in another image
    pub fn external_class_ref(mut self) -> Self {
        self.class_refs.push(ClassRef::External);
        self
    }

    /// A rebased pointer that lands on no known symbol
    pub fn raw_class_ref(mut self, value: u64) -> Self {
        self.class_refs.push(ClassRef::Raw(value));
        self
    }

    pub fn method(mut self, class: &str, selector: &str) -> Self {
        self.methods.push(MethodSpec {
            class: class.to_string(),
            selector: selector.to_string(),
            class_method: false,
        });
        self
    }

    pub fn class_method(mut self, class: &str, selector: &str) -> Self {
        self.methods.push(MethodSpec {
            class: class.to_string(),
            selector: selector.to_string(),
            class_method: true,
        });
        self
    }

    pub fn selector_ref(mut self, selector: &str) -> Self {
        self.selector_refs
            .get_or_insert_with(Vec::new)
            .push(selector.to_string());
        self
    }

    /// Omit `__objc_selrefs` entirely
    pub fn without_selector_refs(mut self) -> Self {
        self.selector_refs = None;
        self
    }

    pub fn non_lazy(mut self, class: &str) -> Self {
        self.non_lazy.push(class.to_string());
        self
    }

    pub fn cstring(mut self, literal: &str) -> Self {
        self.cstrings.push(literal.to_string());
        self
    }

    pub fn strip_symbols(mut self) -> Self {
        self.strip_symbols = true;
        self
    }

    fn method_symbol(method: &MethodSpec) -> String {
        let sign = if method.class_method { '+' } else { '-' };
        format!("{}[{} {}]", sign, method.class, method.selector)
    }

    fn sections(&self) -> (Vec<Section>, Vec<Section>) {
        let mut text = vec![
            Section {
                segment: "__TEXT",
                name: "__text",
                content: vec![0; (self.methods.len().max(1)) * METHOD_SIZE],
                offset: 0,
            },
            Section {
                segment: "__TEXT",
                name: "__objc_methname",
                content: Vec::new(),
                offset: 0,
            },
            Section {
                segment: "__TEXT",
                name: "__objc_classname",
                content: Vec::new(),
                offset: 0,
            },
            Section {
                segment: "__TEXT",
                name: "__cstring",
                content: Vec::new(),
                offset: 0,
            },
        ];
        for literal in &self.cstrings {
            text[3].content.extend_from_slice(literal.as_bytes());
            text[3].content.push(0);
        }

        let mut data = vec![Section {
            segment: "__DATA",
            name: "__objc_classlist",
            content: vec![0; self.classes.len() * 8],
            offset: 0,
        }];
        if !self.non_lazy.is_empty() {
            data.push(Section {
                segment: "__DATA",
                name: "__objc_nlclslist",
                content: vec![0; self.non_lazy.len() * 8],
                offset: 0,
            });
        }
        data.push(Section {
            segment: "__DATA",
            name: "__objc_classrefs",
            content: vec![0; self.class_refs.len() * 8],
            offset: 0,
        });
        if let Some(refs) = &self.selector_refs {
            data.push(Section {
                segment: "__DATA",
                name: "__objc_selrefs",
                content: vec![0; refs.len() * 8],
                offset: 0,
            });
        }
        data.push(Section {
            segment: "__DATA",
            name: "__objc_const",
            content: vec![0; self.classes.len() * RO_SIZE],
            offset: 0,
        });
        data.push(Section {
            segment: "__DATA",
            name: "__objc_data",
            content: vec![0; self.classes.len().max(1) * CLASS_SIZE],
            offset: 0,
        });
        (text, data)
    }

    fn header_size(text: &[Section], data: &[Section]) -> usize {
        32 + 2 * SEGMENT_CMD_SIZE + (text.len() + data.len()) * SECTION_SIZE + 24
    }

    /// Build the image and return it with the assigned addresses
    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let (mut text, mut data) = self.sections();
        assert!(Self::header_size(&text, &data) <= TEXT_START);

        // Strings first so their addresses are known when pointers are written
        let mut methname: BTreeMap<String, usize> = BTreeMap::new();
        let selectors = self
            .methods
            .iter()
            .map(|m| m.selector.clone())
            .chain(self.selector_refs.iter().flatten().cloned());
        for selector in selectors {
            if !methname.contains_key(&selector) {
                methname.insert(selector.clone(), text[1].content.len());
                text[1].content.extend_from_slice(selector.as_bytes());
                text[1].content.push(0);
            }
        }
        let mut classname: BTreeMap<String, usize> = BTreeMap::new();
        for class in &self.classes {
            classname.insert(class.name.clone(), text[2].content.len());
            text[2].content.extend_from_slice(class.name.as_bytes());
            text[2].content.push(0);
        }

        let mut cursor = TEXT_START;
        for section in text.iter_mut() {
            cursor = align(cursor, 8);
            section.offset = cursor;
            cursor += section.content.len();
        }
        let text_end = align(cursor, 0x1000);

        let mut cursor = text_end;
        for section in data.iter_mut() {
            cursor = align(cursor, 8);
            section.offset = cursor;
            cursor += section.content.len();
        }
        let data_end = align(cursor, 0x1000);

        let addr = |offset: usize| BASE + offset as u64;
        let find = |sections: &[Section], name: &str| sections.iter().position(|s| s.name == name);

        let mut layout = Layout::default();
        let objc_data = find(&data, "__objc_data").unwrap_or_default();
        let objc_const = find(&data, "__objc_const").unwrap_or_default();
        for (i, class) in self.classes.iter().enumerate() {
            layout
                .classes
                .insert(class.name.clone(), addr(data[objc_data].offset + i * CLASS_SIZE));
        }
        for (i, method) in self.methods.iter().enumerate() {
            layout
                .methods
                .insert(Self::method_symbol(method), addr(text[0].offset + i * METHOD_SIZE));
        }

        // class_t and class_ro_t
        for (i, class) in self.classes.iter().enumerate() {
            let ro_addr = addr(data[objc_const].offset + i * RO_SIZE);
            let name_addr = addr(text[2].offset + classname[&class.name]);
            write_u64_le(&mut data[objc_const].content, i * RO_SIZE + 24, name_addr);

            let base = i * CLASS_SIZE;
            let superclass = class
                .superclass
                .as_ref()
                .and_then(|s| layout.classes.get(s))
                .copied()
                .unwrap_or(0);
            write_u64_le(&mut data[objc_data].content, base + 8, superclass);
            write_u64_le(&mut data[objc_data].content, base + 32, ro_addr);
        }

        for (i, class) in self.classes.iter().enumerate() {
            let class_addr = layout.classes[&class.name];
            write_u64_le(&mut data[0].content, i * 8, class_addr);
        }
        if let Some(idx) = find(&data, "__objc_nlclslist") {
            for (i, class) in self.non_lazy.iter().enumerate() {
                let class_addr = layout.classes.get(class).copied().unwrap_or(0);
                write_u64_le(&mut data[idx].content, i * 8, class_addr);
            }
        }
        if let Some(idx) = find(&data, "__objc_classrefs") {
            for (i, class_ref) in self.class_refs.iter().enumerate() {
                let value = match class_ref {
                    ClassRef::Local(name) => layout.classes.get(name).copied().unwrap_or(0),
                    ClassRef::External => 0,
                    ClassRef::Raw(value) => *value,
                };
                write_u64_le(&mut data[idx].content, i * 8, value);
            }
        }
        if let (Some(idx), Some(refs)) = (find(&data, "__objc_selrefs"), &self.selector_refs) {
            for (i, selector) in refs.iter().enumerate() {
                let value = addr(text[1].offset + methname[selector]);
                write_u64_le(&mut data[idx].content, i * 8, value);
            }
        }

        // Symbol table: (name, n_sect, n_value)
        let text_sect = 1u8;
        let data_sect = (text.len() + objc_data + 1) as u8;
        let mut symbols: Vec<(String, u8, u64)> = Vec::new();
        if !self.strip_symbols {
            for class in &self.classes {
                symbols.push((
                    format!("_OBJC_CLASS_$_{}", class.name),
                    data_sect,
                    layout.classes[&class.name],
                ));
            }
            for method in &self.methods {
                let name = Self::method_symbol(method);
                let value = layout.methods[&name];
                symbols.push((name, text_sect, value));
            }
        }

        let symoff = data_end;
        let stroff = symoff + symbols.len().max(1) * 16;
        let mut strtab = vec![0u8];
        let mut nlist = vec![0u8; symbols.len().max(1) * 16];
        for (i, (name, sect, value)) in symbols.iter().enumerate() {
            let strx = strtab.len() as u32;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            let base = i * 16;
            write_u32_le(&mut nlist, base, strx);
            nlist[base + 4] = 0x0f; // N_SECT | N_EXT
            nlist[base + 5] = *sect;
            write_u64_le(&mut nlist, base + 8, *value);
        }
        let strsize = align(strtab.len(), 8);
        strtab.resize(strsize, 0);
        let total = stroff + strsize;

        let mut out = vec![0u8; total];
        write_u32_le(&mut out, 0, 0xfeed_facf); // MH_MAGIC_64
        write_u32_le(&mut out, 4, self.cputype);
        write_u32_le(&mut out, 8, 0);
        write_u32_le(&mut out, 12, 2); // MH_EXECUTE
        write_u32_le(&mut out, 16, 3); // ncmds
        write_u32_le(&mut out, 20, (Self::header_size(&text, &data) - 32) as u32);

        let mut cmd = 32;
        cmd = write_segment(&mut out, cmd, "__TEXT", 0, text_end, &text);
        cmd = write_segment(&mut out, cmd, "__DATA", text_end, data_end - text_end, &data);

        write_u32_le(&mut out, cmd, LC_SYMTAB);
        write_u32_le(&mut out, cmd + 4, 24);
        write_u32_le(&mut out, cmd + 8, symoff as u32);
        write_u32_le(&mut out, cmd + 12, symbols.len() as u32);
        write_u32_le(&mut out, cmd + 16, stroff as u32);
        write_u32_le(&mut out, cmd + 20, strsize as u32);

        for section in text.iter().chain(data.iter()) {
            out[section.offset..section.offset + section.content.len()]
                .copy_from_slice(&section.content);
        }
        out[symoff..symoff + nlist.len()].copy_from_slice(&nlist);
        out[stroff..stroff + strtab.len()].copy_from_slice(&strtab);

        (out, layout)
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn write_to(&self, path: &Path) -> Layout {
        let (bytes, layout) = self.build_with_layout();
        std::fs::write(path, bytes).unwrap();
        layout
    }
}

fn write_segment(
    out: &mut [u8],
    cmd: usize,
    name: &str,
    fileoff: usize,
    filesize: usize,
    sections: &[Section],
) -> usize {
    let cmdsize = SEGMENT_CMD_SIZE + sections.len() * SECTION_SIZE;
    write_u32_le(out, cmd, LC_SEGMENT_64);
    write_u32_le(out, cmd + 4, cmdsize as u32);
    write_name(out, cmd + 8, name);
    write_u64_le(out, cmd + 24, BASE + fileoff as u64); // vmaddr
    write_u64_le(out, cmd + 32, filesize as u64); // vmsize
    write_u64_le(out, cmd + 40, fileoff as u64);
    write_u64_le(out, cmd + 48, filesize as u64);
    write_u32_le(out, cmd + 56, 7); // maxprot
    write_u32_le(out, cmd + 60, if name == "__TEXT" { 5 } else { 3 });
    write_u32_le(out, cmd + 64, sections.len() as u32);

    for (i, section) in sections.iter().enumerate() {
        let sect = cmd + SEGMENT_CMD_SIZE + i * SECTION_SIZE;
        write_name(out, sect, section.name);
        write_name(out, sect + 16, section.segment);
        write_u64_le(out, sect + 32, BASE + section.offset as u64); // addr
        write_u64_le(out, sect + 40, section.content.len() as u64); // size
        write_u32_le(out, sect + 48, section.offset as u32);
        write_u32_le(out, sect + 52, 3); // align 2^3
    }
    cmd + cmdsize
}

/// Universal binary from `(cputype, cpusubtype, slice)` triples
pub fn fat(slices: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
    let header = 8 + slices.len() * 20;
    let mut offsets = Vec::new();
    let mut cursor = align(header, 0x4000);
    for (_, _, bytes) in slices {
        offsets.push(cursor);
        cursor = align(cursor + bytes.len(), 0x4000);
    }

    let mut out = vec![0u8; cursor];
    out[0..4].copy_from_slice(&0xcafe_babe_u32.to_be_bytes());
    out[4..8].copy_from_slice(&(slices.len() as u32).to_be_bytes());
    for (i, (cputype, subtype, bytes)) in slices.iter().enumerate() {
        let entry = 8 + i * 20;
        out[entry..entry + 4].copy_from_slice(&cputype.to_be_bytes());
        out[entry + 4..entry + 8].copy_from_slice(&subtype.to_be_bytes());
        out[entry + 8..entry + 12].copy_from_slice(&(offsets[i] as u32).to_be_bytes());
        out[entry + 12..entry + 16].copy_from_slice(&(bytes.len() as u32).to_be_bytes());
        out[entry + 16..entry + 20].copy_from_slice(&14u32.to_be_bytes()); // align 2^14
        out[offsets[i]..offsets[i] + bytes.len()].copy_from_slice(bytes);
    }
    out
}

/// Write a source tree from `(relative path, contents)` pairs
pub fn write_project(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
    root.to_path_buf()
}

/// ld64-style link map for `(symbol, object file, address, size)` rows
pub fn link_map(rows: &[(&str, &str, u64, u64)]) -> String {
    let mut objects: Vec<&str> = Vec::new();
    for (_, object, _, _) in rows {
        if !objects.contains(object) {
            objects.push(object);
        }
    }

    let mut out = String::from("# Path: /build/App\n# Arch: arm64\n# Object files:\n[  0] linker synthesized\n");
    for (i, object) in objects.iter().enumerate() {
        out.push_str(&format!("[{:3}] {}\n", i + 1, object));
    }
    out.push_str("# Sections:\n# Address\tSize    \tSegment\tSection\n");
    out.push_str("# Symbols:\n# Address\tSize    \tFile  Name\n");
    for (symbol, object, address, size) in rows {
        let index = objects.iter().position(|o| o == object).unwrap_or(0) + 1;
        out.push_str(&format!("0x{:08X}\t0x{:08X}\t[{:3}] {}\n", address, size, index, symbol));
    }
    out
}
