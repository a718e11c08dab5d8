//! Mach-O image access and address symbolication.

mod reader;
mod symbols;

pub use reader::{Arch, BinaryImage, MachOReader, ObjcSection, RawSymbol, SectionTable};
pub use symbols::SymbolResolver;
