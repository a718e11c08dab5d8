use crate::error::{Error, Result};
use goblin::mach::cputype::{CPU_ARCH_ABI64, CPU_TYPE_ARM64, CPU_TYPE_X86_64};
use goblin::mach::{Mach, MachO};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

const POINTER_SIZE: u64 = 8;

/// Bind and authenticated chained-fixup pointers carry this bit
const CHAINED_BIND_OR_AUTH: u64 = 1 << 63;

/// Rebase targets live in the low 36 bits of a chained pointer
const CHAINED_TARGET_MASK: u64 = (1 << 36) - 1;

const CPU_SUBTYPE_MASK: u32 = 0xff00_0000;
const CPU_SUBTYPE_ARM64E: u32 = 2;

const MAX_C_STRING: usize = 4096;

/// Objective-C runtime metadata sections the analysis consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjcSection {
    /// Every class the image defines
    ClassList,
    /// Classes referenced from code
    ClassRefs,
    /// Selectors referenced from message sends
    SelectorRefs,
    /// Classes that implement `+load`
    NonLazyClassList,
    /// Selector name strings
    MethodNames,
    /// C string literals
    CStrings,
}

impl ObjcSection {
    pub const ALL: [ObjcSection; 6] = [
        ObjcSection::ClassList,
        ObjcSection::ClassRefs,
        ObjcSection::SelectorRefs,
        ObjcSection::NonLazyClassList,
        ObjcSection::MethodNames,
        ObjcSection::CStrings,
    ];

    pub fn section_name(&self) -> &'static str {
        match self {
            ObjcSection::ClassList => "__objc_classlist",
            ObjcSection::ClassRefs => "__objc_classrefs",
            ObjcSection::SelectorRefs => "__objc_selrefs",
            ObjcSection::NonLazyClassList => "__objc_nlclslist",
            ObjcSection::MethodNames => "__objc_methname",
            ObjcSection::CStrings => "__cstring",
        }
    }

    pub fn segment_names(&self) -> &'static [&'static str] {
        match self {
            ObjcSection::MethodNames | ObjcSection::CStrings => &["__TEXT"],
            _ => &["__DATA", "__DATA_CONST"],
        }
    }

    /// Size of one entry, or 0 for variable-length string sections
    pub fn entry_size(&self) -> u64 {
        match self {
            ObjcSection::MethodNames | ObjcSection::CStrings => 0,
            _ => POINTER_SIZE,
        }
    }

    pub fn matches(&self, segment: &str, section: &str) -> bool {
        section == self.section_name() && self.segment_names().contains(&segment)
    }

    fn classify(segment: &str, section: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.matches(segment, section))
    }
}

/// One section header of the selected slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTable {
    pub segment_name: String,
    pub section_name: String,
    pub file_offset: u64,
    pub virtual_address: u64,
    pub size: u64,
    pub entry_size: u64,
}

impl SectionTable {
    pub fn end(&self) -> u64 {
        self.virtual_address.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.virtual_address && address < self.end()
    }

    pub fn entry_count(&self) -> u64 {
        if self.entry_size == 0 {
            0
        } else {
            self.size / self.entry_size
        }
    }
}

#[derive(Debug, Clone)]
struct SegmentRange {
    name: String,
    vmaddr: u64,
    fileoff: u64,
    filesize: u64,
}

/// A defined symbol-table entry (`n_sect` is 1-based into [`BinaryImage::sections`])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol {
    pub name: String,
    pub address: u64,
    pub section: usize,
}

/// Target architecture for universal binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Arm64,
    Arm64e,
    X86_64,
}

impl Arch {
    pub fn name(&self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::Arm64e => "arm64e",
            Arch::X86_64 => "x86_64",
        }
    }

    pub fn matches(&self, cputype: u32, cpusubtype: u32) -> bool {
        let subtype = cpusubtype & !CPU_SUBTYPE_MASK;
        match self {
            Arch::Arm64 => cputype == CPU_TYPE_ARM64 && subtype != CPU_SUBTYPE_ARM64E,
            Arch::Arm64e => cputype == CPU_TYPE_ARM64 && subtype == CPU_SUBTYPE_ARM64E,
            Arch::X86_64 => cputype == CPU_TYPE_X86_64,
        }
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "arm64" => Ok(Arch::Arm64),
            "arm64e" => Ok(Arch::Arm64e),
            "x86_64" | "x86-64" => Ok(Arch::X86_64),
            other => Err(Error::Configuration(format!(
                "unsupported architecture '{}' (expected arm64, arm64e or x86_64)",
                other
            ))),
        }
    }
}

fn arch_name(cputype: u32, cpusubtype: u32) -> String {
    [Arch::Arm64e, Arch::Arm64, Arch::X86_64]
        .into_iter()
        .find(|arch| arch.matches(cputype, cpusubtype))
        .map(|arch| arch.name().to_string())
        .unwrap_or_else(|| format!("cpu 0x{:x}", cputype))
}

/// Owned, read-only snapshot of one 64-bit Mach-O slice
#[derive(Debug, Clone)]
pub struct BinaryImage {
    path: PathBuf,
    data: Vec<u8>,
    cputype: u32,
    cpusubtype: u32,
    base_address: u64,
    segments: Vec<SegmentRange>,
    sections: Vec<SectionTable>,
    symbols: Vec<RawSymbol>,
}

impl BinaryImage {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn arch_name(&self) -> String {
        arch_name(self.cputype, self.cpusubtype)
    }

    /// `__TEXT` load address
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// All sections in load-command order
    pub fn sections(&self) -> &[SectionTable] {
        &self.sections
    }

    pub fn section(&self, kind: ObjcSection) -> Option<&SectionTable> {
        self.sections
            .iter()
            .find(|s| kind.matches(&s.segment_name, &s.section_name))
    }

    pub fn has_section(&self, kind: ObjcSection) -> bool {
        self.section(kind).is_some()
    }

    pub fn section_bytes(&self, table: &SectionTable) -> &[u8] {
        let start = table.file_offset as usize;
        let end = start.saturating_add(table.size as usize);
        if table.file_offset == 0 {
            // zerofill
            return &[];
        }
        self.data.get(start..end).unwrap_or(&[])
    }

    pub fn symbols(&self) -> &[RawSymbol] {
        &self.symbols
    }

    /// Raw pointer-sized entries of a pointer-list section; empty when absent
    pub fn pointers(&self, kind: ObjcSection) -> Vec<u64> {
        let Some(table) = self.section(kind) else {
            return Vec::new();
        };
        self.section_bytes(table)
            .chunks_exact(POINTER_SIZE as usize)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect()
    }

    /// Turn a stored pointer into a virtual address.
    ///
    /// Zero and bind pointers point outside the image and yield `None`.
    pub fn decode_pointer(&self, raw: u64) -> Option<u64> {
        if raw == 0 || raw & CHAINED_BIND_OR_AUTH != 0 {
            return None;
        }
        let target = raw & CHAINED_TARGET_MASK;
        if target != raw && target < self.base_address {
            Some(target + self.base_address)
        } else {
            Some(target)
        }
    }

    pub fn vm_to_offset(&self, address: u64) -> Option<usize> {
        self.segments
            .iter()
            .find(|seg| address >= seg.vmaddr && address - seg.vmaddr < seg.filesize)
            .and_then(|seg| usize::try_from(seg.fileoff.checked_add(address - seg.vmaddr)?).ok())
    }

    pub fn read_u64(&self, address: u64) -> Option<u64> {
        let offset = self.vm_to_offset(address)?;
        let bytes = self.data.get(offset..offset + POINTER_SIZE as usize)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Some(u64::from_le_bytes(buf))
    }

    /// Read and decode the pointer stored at `address`
    pub fn read_pointer(&self, address: u64) -> Option<u64> {
        self.read_u64(address).and_then(|raw| self.decode_pointer(raw))
    }

    pub fn read_c_string(&self, address: u64) -> Option<String> {
        let offset = self.vm_to_offset(address)?;
        let tail = self.data.get(offset..)?;
        let limit = tail.len().min(MAX_C_STRING);
        let len = tail[..limit].iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&tail[..len]).into_owned())
    }

    /// Every NUL-terminated string in a string section
    pub fn c_strings(&self, kind: ObjcSection) -> Vec<String> {
        let Some(table) = self.section(kind) else {
            return Vec::new();
        };
        self.section_bytes(table)
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect()
    }
}

/// Reads Mach-O images, choosing a slice from universal binaries
#[derive(Debug, Clone, Default)]
pub struct MachOReader {
    arch: Option<Arch>,
}

impl MachOReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arch(mut self, arch: Option<Arch>) -> Self {
        self.arch = arch;
        self
    }

    /// Map `path` read-only and parse it
    pub fn read(&self, path: &Path) -> Result<BinaryImage> {
        let file = File::open(path).map_err(|e| Error::path(path, e))?;
        let len = file.metadata().map_err(|e| Error::path(path, e))?.len();
        if len == 0 {
            return Err(Error::Format {
                path: path.to_path_buf(),
                reason: "empty file".to_string(),
            });
        }

        // The mapping is dropped before this returns; nothing writes the file meanwhile.
        match unsafe { Mmap::map(&file) } {
            Ok(mmap) => self.parse(path, &mmap),
            Err(e) => {
                debug!("mmap failed for {} ({}), reading instead", path.display(), e);
                let bytes = std::fs::read(path).map_err(|e| Error::path(path, e))?;
                self.parse(path, &bytes)
            }
        }
    }

    /// Parse an in-memory image; `path` is used for messages only
    pub fn parse(&self, path: &Path, bytes: &[u8]) -> Result<BinaryImage> {
        let format_err = |reason: String| Error::Format {
            path: path.to_path_buf(),
            reason,
        };

        match Mach::parse(bytes).map_err(|e| format_err(e.to_string()))? {
            Mach::Binary(macho) => self.from_macho(path, bytes, &macho),
            Mach::Fat(multi) => {
                let arches = multi.arches().map_err(|e| format_err(e.to_string()))?;

                let chosen = match self.arch {
                    Some(arch) => arches
                        .iter()
                        .find(|a| arch.matches(a.cputype, a.cpusubtype)),
                    None => arches.iter().find(|a| a.cputype & CPU_ARCH_ABI64 != 0),
                };

                let Some(fat_arch) = chosen else {
                    let available: Vec<String> = arches
                        .iter()
                        .map(|a| arch_name(a.cputype, a.cpusubtype))
                        .collect();
                    return Err(Error::ArchitectureNotFound {
                        path: path.to_path_buf(),
                        wanted: self
                            .arch
                            .map(|a| a.name().to_string())
                            .unwrap_or_else(|| "64-bit".to_string()),
                        available: available.join(", "),
                    });
                };

                let start = fat_arch.offset as usize;
                let end = start.saturating_add(fat_arch.size as usize);
                let slice = bytes.get(start..end).ok_or_else(|| {
                    format_err(format!("slice 0x{:x}..0x{:x} is out of bounds", start, end))
                })?;

                debug!(
                    "Selected {} slice at 0x{:x}",
                    arch_name(fat_arch.cputype, fat_arch.cpusubtype),
                    start
                );
                let macho = MachO::parse(slice, 0).map_err(|e| format_err(e.to_string()))?;
                // Section offsets are relative to the slice, not the fat file
                self.from_macho(path, slice, &macho)
            }
        }
    }

    fn from_macho(&self, path: &Path, data: &[u8], macho: &MachO) -> Result<BinaryImage> {
        if !macho.is_64 {
            return Err(Error::Format {
                path: path.to_path_buf(),
                reason: "32-bit images are not supported".to_string(),
            });
        }
        if !macho.little_endian {
            return Err(Error::Format {
                path: path.to_path_buf(),
                reason: "big-endian images are not supported".to_string(),
            });
        }
        if let Some(arch) = self.arch {
            if !arch.matches(macho.header.cputype, macho.header.cpusubtype) {
                return Err(Error::ArchitectureNotFound {
                    path: path.to_path_buf(),
                    wanted: arch.name().to_string(),
                    available: arch_name(macho.header.cputype, macho.header.cpusubtype),
                });
            }
        }

        let mut segments = Vec::new();
        let mut sections = Vec::new();
        for segment in macho.segments.iter() {
            let segment_name = segment.name().unwrap_or("").to_string();
            segments.push(SegmentRange {
                name: segment_name.clone(),
                vmaddr: segment.vmaddr,
                fileoff: segment.fileoff,
                filesize: segment.filesize,
            });

            let parsed = segment.sections().map_err(|e| Error::Format {
                path: path.to_path_buf(),
                reason: format!("bad section table in {}: {}", segment_name, e),
            })?;
            for (section, _) in parsed {
                let seg = section.segname().unwrap_or(segment_name.as_str()).to_string();
                let name = section.name().unwrap_or("").to_string();
                let entry_size = ObjcSection::classify(&seg, &name)
                    .map(|kind| kind.entry_size())
                    .unwrap_or(0);
                sections.push(SectionTable {
                    segment_name: seg,
                    section_name: name,
                    file_offset: u64::from(section.offset),
                    virtual_address: section.addr,
                    size: section.size,
                    entry_size,
                });
            }
        }

        let mut symbols = Vec::new();
        if let Some(ref table) = macho.symbols {
            for entry in table.iter() {
                let Ok((name, nlist)) = entry else {
                    continue;
                };
                if nlist.is_undefined() || nlist.is_stab() || nlist.n_sect == 0 {
                    continue;
                }
                symbols.push(RawSymbol {
                    name: name.to_string(),
                    address: nlist.n_value,
                    section: nlist.n_sect,
                });
            }
        } else {
            warn!("{} has no symbol table; names will come from the link map only", path.display());
        }

        let base_address = segments
            .iter()
            .find(|s| s.name == "__TEXT")
            .map(|s| s.vmaddr)
            .unwrap_or(0);

        let image = BinaryImage {
            path: path.to_path_buf(),
            data: data.to_vec(),
            cputype: macho.header.cputype,
            cpusubtype: macho.header.cpusubtype,
            base_address,
            segments,
            sections,
            symbols,
        };

        for kind in ObjcSection::ALL {
            match image.section(kind) {
                Some(table) => debug!(
                    "{},{}: 0x{:x} ({} bytes)",
                    table.segment_name, table.section_name, table.virtual_address, table.size
                ),
                None => debug!("{} not present", kind.section_name()),
            }
        }
        info!(
            "Loaded {} ({}): {} sections, {} symbols",
            path.display(),
            image.arch_name(),
            image.sections.len(),
            image.symbols.len()
        );

        Ok(image)
    }
}
