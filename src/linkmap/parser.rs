use super::{LinkMap, LinkMapEntry, LinkMapSymbol};
use crate::graph::demangle;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Preamble,
    ObjectFiles,
    Sections,
    Symbols,
    DeadStripped,
}

/// Line-oriented parser for ld64-style link maps
pub(super) struct LinkMapParser {
    table: Table,
    skipped: usize,
}

impl LinkMapParser {
    pub(super) fn new() -> Self {
        Self {
            table: Table::Preamble,
            skipped: 0,
        }
    }

    pub(super) fn parse(mut self, content: &str) -> LinkMap {
        let mut map = LinkMap::default();

        for line in content.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(header) = line.strip_prefix('#') {
                self.header(header.trim(), &mut map);
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            match self.table {
                Table::ObjectFiles => self.object_file(line, &mut map),
                Table::Symbols => self.symbol(line, &mut map),
                Table::Preamble | Table::Sections | Table::DeadStripped => {}
            }
        }

        for sym in &map.symbols {
            let Some(object_file) = map.objects.get(&sym.file_index) else {
                continue;
            };
            map.entries
                .entry(demangle(&sym.name))
                .or_insert_with(|| LinkMapEntry {
                    symbol_name: sym.name.clone(),
                    object_file: object_file.clone(),
                });
        }

        debug!(
            "Link map: {} object files, {} symbols, {} lines skipped",
            map.objects.len(),
            map.symbols.len(),
            self.skipped
        );
        map
    }

    fn header(&mut self, header: &str, map: &mut LinkMap) {
        if let Some(arch) = header.strip_prefix("Arch:") {
            map.arch = Some(arch.trim().to_string());
            return;
        }
        self.table = match header {
            "Object files:" => Table::ObjectFiles,
            "Sections:" => Table::Sections,
            "Symbols:" => Table::Symbols,
            "Dead Stripped Symbols:" => Table::DeadStripped,
            // column captions inside a table
            _ => self.table,
        };
    }

    fn object_file(&mut self, line: &str, map: &mut LinkMap) {
        match file_index(line) {
            Some((index, path)) if !path.is_empty() => {
                map.objects.insert(index, PathBuf::from(path.replace('\\', "/")));
            }
            _ => self.skipped += 1,
        }
    }

    fn symbol(&mut self, line: &str, map: &mut LinkMap) {
        match symbol_fields(line) {
            Some(sym) => map.symbols.push(sym),
            None => self.skipped += 1,
        }
    }
}

/// `[  3] rest` → `(3, "rest")`
fn file_index(text: &str) -> Option<(usize, &str)> {
    let rest = text.trim_start().strip_prefix('[')?;
    let (index, rest) = rest.split_once(']')?;
    Some((index.trim().parse().ok()?, rest.trim()))
}

fn hex(field: &str) -> Option<u64> {
    let digits = field.strip_prefix("0x").or_else(|| field.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

/// `0xADDR<ws>0xSIZE<ws>[  N] name`
fn symbol_fields(line: &str) -> Option<LinkMapSymbol> {
    let line = line.trim_start();
    let (address, rest) = line.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    let (size, rest) = rest.split_once(char::is_whitespace)?;
    let (file_index, name) = file_index(rest)?;
    if name.is_empty() {
        return None;
    }
    Some(LinkMapSymbol {
        address: hex(address)?,
        size: hex(size)?,
        name: name.to_string(),
        file_index,
    })
}
