use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Class name → superclass name adjacency map.
///
/// Cycles only appear in malformed inputs; a walk that revisits a class
/// stops there instead of looping.
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    parents: HashMap<String, String>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `class : superclass`. The first edge seen for a class wins.
    pub fn add_edge(&mut self, class: impl Into<String>, superclass: impl Into<String>) {
        self.parents
            .entry(class.into())
            .or_insert_with(|| superclass.into());
    }

    pub fn superclass(&self, class: &str) -> Option<&str> {
        self.parents.get(class).map(String::as_str)
    }

    /// All transitive superclasses of `class`, nearest first
    pub fn ancestors(&self, class: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(class);

        let mut result = Vec::new();
        let mut current = class;
        while let Some(parent) = self.superclass(current) {
            if !seen.insert(parent) {
                debug!("Superclass cycle through '{}'", parent);
                break;
            }
            result.push(parent.to_string());
            current = parent;
        }
        result
    }

    /// Union of the ancestors of every class in `classes`
    pub fn ancestors_of_all<'a, I>(&self, classes: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result = HashSet::new();
        // Chains are walked in full; a cycle can cut an earlier walk short
        // and leave part of a shared chain unvisited
        for class in classes {
            result.extend(self.ancestors(class));
        }
        result
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}
