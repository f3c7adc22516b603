//! The session's macro binding table.
//!
//! One entry per module, in first-import order. A repeated macro-import of
//! the same module replaces that entry's bindings wholesale; bindings are
//! never merged and never removed, only superseded (possibly to an empty
//! list). The table is the single source of truth for what the expander
//! rewrites and what stub names the session namespace mirrors.

use std::rc::Rc;

use crate::modules::ModuleHandle;

/// A macro usable in the session: known as `name` in its module, invoked
/// as `alias` in session source.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroBinding {
    pub name: String,
    pub alias: String,
}

#[derive(Clone)]
pub struct TableEntry {
    pub reference: String,
    pub module: Rc<dyn ModuleHandle>,
    pub bindings: Vec<MacroBinding>,
}

/// An immutable view of the table, taken after a unit's macro-imports have
/// committed and handed to the expander. Entry order is table order.
#[derive(Clone, Default)]
pub struct BindingSnapshot {
    entries: Vec<TableEntry>,
}

impl BindingSnapshot {
    pub fn entries(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
pub struct BindingTable {
    entries: Vec<TableEntry>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a validated macro-import. An existing entry for the same
    /// module keeps its position and has its bindings replaced; a new
    /// module goes to the end.
    pub fn replace(
        &mut self,
        reference: &str,
        module: Rc<dyn ModuleHandle>,
        bindings: Vec<MacroBinding>,
    ) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.reference == reference) {
            entry.module = module;
            entry.bindings = bindings;
        } else {
            self.entries.push(TableEntry {
                reference: reference.to_string(),
                module,
                bindings,
            });
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &TableEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> BindingSnapshot {
        BindingSnapshot {
            entries: self.entries.clone(),
        }
    }

    /// Every bound alias, deduplicated, in table-then-binding order. This
    /// is the set of stub names the session namespace mirrors.
    pub fn aliases(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            for binding in &entry.bindings {
                if !seen.contains(&binding.alias) {
                    seen.push(binding.alias.clone());
                }
            }
        }
        seen
    }

    /// Every (alias, module reference) pair, in table order.
    pub fn alias_listing(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry
                    .bindings
                    .iter()
                    .map(|b| (b.alias.clone(), entry.reference.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
