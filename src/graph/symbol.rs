use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CLASS_PREFIX: &str = "_OBJC_CLASS_$_";

/// Which reference category a symbol belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolCategory {
    Class,
    Selector,
}

impl SymbolCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            SymbolCategory::Class => "class",
            SymbolCategory::Selector => "selector",
        }
    }
}

impl std::fmt::Display for SymbolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A resolved class or selector. Unique by `(address, category)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub address: u64,

    /// Class name, or the bare selector (`doWork:`) for methods
    pub name: String,

    pub category: SymbolCategory,

    /// Declaring source file, when the builder knows it
    pub source_file: Option<PathBuf>,

    /// Class that implements the selector
    pub owner: Option<String>,

    /// `+` method rather than `-` method
    pub class_method: bool,
}

impl Symbol {
    pub fn class(address: u64, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            category: SymbolCategory::Class,
            source_file: None,
            owner: None,
            class_method: false,
        }
    }

    pub fn selector(
        address: u64,
        name: impl Into<String>,
        owner: Option<String>,
        class_method: bool,
    ) -> Self {
        Self {
            address,
            name: name.into(),
            category: SymbolCategory::Selector,
            source_file: None,
            owner,
            class_method,
        }
    }

    pub fn with_source_file(mut self, path: PathBuf) -> Self {
        self.source_file = Some(path);
        self
    }

    pub fn key(&self) -> (u64, SymbolCategory) {
        (self.address, self.category)
    }

    /// Name as it appears in reports and link maps: `Foo` or `-[Foo doWork]`
    pub fn display_name(&self) -> String {
        match (&self.category, &self.owner) {
            (SymbolCategory::Selector, Some(owner)) => {
                let sign = if self.class_method { '+' } else { '-' };
                format!("{}[{} {}]", sign, owner, self.name)
            }
            _ => self.name.clone(),
        }
    }

    /// Build a symbol from a raw Mach-O or link-map symbol name
    pub fn from_raw_name(address: u64, raw: &str) -> Option<Self> {
        match ObjcName::parse(raw)? {
            ObjcName::Class(name) => Some(Symbol::class(address, name)),
            ObjcName::Method {
                class,
                selector,
                class_method,
                ..
            } => Some(Symbol::selector(address, selector, Some(class), class_method)),
        }
    }
}

/// An Objective-C symbol name broken into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjcName {
    Class(String),
    Method {
        class: String,
        category: Option<String>,
        selector: String,
        class_method: bool,
    },
}

impl ObjcName {
    /// Parse `_OBJC_CLASS_$_Foo`, `-[Foo bar:]` or `+[Foo(Cat) baz]`
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(name) = raw.strip_prefix(CLASS_PREFIX) {
            if name.is_empty() {
                return None;
            }
            return Some(ObjcName::Class(name.to_string()));
        }

        let class_method = match raw.as_bytes().first()? {
            b'-' => false,
            b'+' => true,
            _ => return None,
        };
        let inner = raw.get(1..)?.strip_prefix('[')?.strip_suffix(']')?;
        let (receiver, selector) = inner.split_once(' ')?;
        let selector = selector.trim();
        if receiver.is_empty() || selector.is_empty() {
            return None;
        }

        let (class, category) = match receiver.split_once('(') {
            Some((class, rest)) => (
                class.to_string(),
                Some(rest.trim_end_matches(')').to_string()),
            ),
            None => (receiver.to_string(), None),
        };

        Some(ObjcName::Method {
            class,
            category,
            selector: selector.to_string(),
            class_method,
        })
    }
}

/// Canonical lookup key for a raw symbol name.
///
/// Class symbols lose their `_OBJC_CLASS_$_` prefix and method symbols lose
/// their category, so `-[Foo(Extras) bar]` and `-[Foo bar]` share one key.
pub fn demangle(raw: &str) -> String {
    match ObjcName::parse(raw) {
        Some(ObjcName::Class(name)) => name,
        Some(ObjcName::Method {
            class,
            selector,
            class_method,
            ..
        }) => {
            let sign = if class_method { '+' } else { '-' };
            format!("{}[{} {}]", sign, class, selector)
        }
        None => raw.to_string(),
    }
}
