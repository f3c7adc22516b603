//! Stub synchronization.
//!
//! After a unit commits macro-imports, the session namespace is made to
//! mirror the binding table: one stub value per bound alias, so bare macro
//! names evaluate to something inspectable. The synchronizer runs on a
//! dirty flag set at commit time and consumes it before doing any work.
//! Its `del` and `from ... import ...` statements are synthesized source,
//! executed outside the unit pipeline: never recorded, never expanded.

use crate::bindings::BindingTable;
use crate::errors::{ErrorKind, SourceContext};
use crate::modules::ModuleRegistry;
use crate::runtime::eval::{self, EvalContext, ExecMode, MAX_EVAL_DEPTH};
use crate::runtime::namespace::Namespace;
use crate::runtime::output::SharedOutput;
use crate::syntax::parser::parse_program;

#[derive(Default)]
pub struct StubSynchronizer {
    stubs: Vec<String>,
    dirty: bool,
}

impl StubSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a unit commits at least one macro-import.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The aliases currently mirrored into the namespace.
    pub fn stub_names(&self) -> &[String] {
        &self.stubs
    }

    /// Bring the namespace in line with the binding table. The dirty flag
    /// is cleared first, so a failure partway through cannot re-trigger a
    /// stale synchronization later. Old stubs are deleted (a name the user
    /// already removed is fine), then every entry's bindings are re-imported
    /// (a module or name that has since vanished is fine too).
    pub fn synchronize(
        &mut self,
        table: &BindingTable,
        namespace: &mut Namespace,
        registry: &mut dyn ModuleRegistry,
        output: &SharedOutput,
    ) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        for alias in std::mem::take(&mut self.stubs) {
            run_internal(
                &format!("del {}", alias),
                namespace,
                registry,
                output,
                |kind| matches!(kind, ErrorKind::UndefinedName { .. }),
            );
        }

        self.stubs = table.aliases();
        for entry in table.entries() {
            if entry.bindings.is_empty() {
                continue;
            }
            let items: Vec<String> = entry
                .bindings
                .iter()
                .map(|b| {
                    if b.name == b.alias {
                        b.name.clone()
                    } else {
                        format!("{} as {}", b.name, b.alias)
                    }
                })
                .collect();
            run_internal(
                &format!("from {} import {}", entry.reference, items.join(", ")),
                namespace,
                registry,
                output,
                |kind| {
                    matches!(
                        kind,
                        ErrorKind::ModuleNotFound { .. } | ErrorKind::AttributeNotFound { .. }
                    )
                },
            );
        }
    }
}

/// Parse and execute one synthesized statement. Errors matching `suppress`
/// are expected housekeeping outcomes and vanish; anything else is printed,
/// never propagated, because synchronization must not take the session down.
fn run_internal(
    source_text: &str,
    namespace: &mut Namespace,
    registry: &mut dyn ModuleRegistry,
    output: &SharedOutput,
    suppress: impl Fn(&ErrorKind) -> bool,
) {
    let source = SourceContext::from_source("<stub-sync>", source_text);
    let stmts = match parse_program(source_text, &source) {
        Ok(stmts) => stmts,
        Err(_) => return,
    };
    let mut ctx = EvalContext {
        namespace,
        registry,
        output: output.clone(),
        source: source.clone(),
        mode: ExecMode::Program,
        anchor: None,
        depth: 0,
        max_depth: MAX_EVAL_DEPTH,
    };
    for stmt in &stmts {
        if let Err(error) = eval::execute_stmt(stmt, &mut ctx) {
            if !suppress(&error.kind) {
                crate::errors::print_error(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::MacroBinding;
    use crate::errors::{unspanned, ErrorReporting, MudraError, ReportContext};
    use crate::modules::ModuleHandle;
    use crate::runtime::output::OutputBuffer;
    use crate::runtime::Value;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Debug)]
    struct FakeModule {
        reference: String,
        attrs: HashMap<String, Value>,
    }

    impl ModuleHandle for FakeModule {
        fn reference(&self) -> &str {
            &self.reference
        }

        fn has_attribute(&self, name: &str) -> bool {
            self.attrs.contains_key(name)
        }

        fn get_attribute(&self, name: &str) -> Option<Value> {
            self.attrs.get(name).cloned()
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        modules: HashMap<String, Rc<FakeModule>>,
    }

    impl FakeRegistry {
        fn with_module(mut self, reference: &str, attrs: &[(&str, Value)]) -> Self {
            let module = FakeModule {
                reference: reference.to_string(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            };
            self.modules.insert(reference.to_string(), Rc::new(module));
            self
        }
    }

    impl ModuleRegistry for FakeRegistry {
        fn load(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError> {
            match self.modules.get(reference) {
                Some(module) => Ok(module.clone() as Rc<dyn ModuleHandle>),
                None => Err(
                    ReportContext::new(SourceContext::fallback(reference), "load")
                        .module_not_found(reference, "not registered", unspanned()),
                ),
            }
        }

        fn reload(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError> {
            self.load(reference)
        }
    }

    fn table_for(registry: &FakeRegistry, reference: &str, bindings: &[(&str, &str)]) -> BindingTable {
        let mut table = BindingTable::new();
        let module = registry.modules[reference].clone() as Rc<dyn ModuleHandle>;
        table.replace(
            reference,
            module,
            bindings
                .iter()
                .map(|(name, alias)| MacroBinding {
                    name: name.to_string(),
                    alias: alias.to_string(),
                })
                .collect(),
        );
        table
    }

    fn output() -> (SharedOutput, OutputBuffer) {
        let buffer = OutputBuffer::new();
        (SharedOutput::new(buffer.clone()), buffer)
    }

    #[test]
    fn synchronize_is_a_no_op_until_marked_dirty() {
        let mut registry = FakeRegistry::default().with_module("m", &[("t", Value::Number(1.0))]);
        let table = table_for(&registry, "m", &[("t", "t")]);
        let mut namespace = Namespace::new();
        let (output, _) = output();

        let mut sync = StubSynchronizer::new();
        sync.synchronize(&table, &mut namespace, &mut registry, &output);
        assert!(!namespace.contains("t"));
    }

    #[test]
    fn dirty_synchronize_installs_stubs_and_clears_the_flag() {
        let mut registry = FakeRegistry::default()
            .with_module("m", &[("twice", Value::Number(1.0)), ("pi", Value::Number(3.14))]);
        let table = table_for(&registry, "m", &[("twice", "t"), ("pi", "pi")]);
        let mut namespace = Namespace::new();
        let (output, _) = output();

        let mut sync = StubSynchronizer::new();
        sync.mark_dirty();
        assert!(sync.is_dirty());
        sync.synchronize(&table, &mut namespace, &mut registry, &output);

        assert!(!sync.is_dirty());
        assert_eq!(namespace.get("t"), Some(&Value::Number(1.0)));
        assert_eq!(namespace.get("pi"), Some(&Value::Number(3.14)));
        assert_eq!(sync.stub_names(), &["t".to_string(), "pi".to_string()]);
    }

    #[test]
    fn old_stubs_are_deleted_when_bindings_move_on() {
        let mut registry = FakeRegistry::default()
            .with_module("m", &[("a", Value::Number(1.0)), ("b", Value::Number(2.0))]);
        let mut namespace = Namespace::new();
        let (output, _) = output();
        let mut sync = StubSynchronizer::new();

        let table = table_for(&registry, "m", &[("a", "a")]);
        sync.mark_dirty();
        sync.synchronize(&table, &mut namespace, &mut registry, &output);
        assert!(namespace.contains("a"));

        let table = table_for(&registry, "m", &[("b", "b")]);
        sync.mark_dirty();
        sync.synchronize(&table, &mut namespace, &mut registry, &output);
        assert!(!namespace.contains("a"));
        assert!(namespace.contains("b"));
    }

    #[test]
    fn a_stub_the_user_already_deleted_is_not_an_error() {
        let mut registry = FakeRegistry::default().with_module("m", &[("t", Value::Number(1.0))]);
        let mut namespace = Namespace::new();
        let (output, _) = output();
        let mut sync = StubSynchronizer::new();

        let table = table_for(&registry, "m", &[("t", "t")]);
        sync.mark_dirty();
        sync.synchronize(&table, &mut namespace, &mut registry, &output);
        namespace.remove("t");

        sync.mark_dirty();
        sync.synchronize(&table, &mut namespace, &mut registry, &output);
        assert_eq!(namespace.get("t"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn vanished_modules_and_names_are_suppressed() {
        let mut registry = FakeRegistry::default().with_module("m", &[("t", Value::Number(1.0))]);
        let mut namespace = Namespace::new();
        let (output, _) = output();
        let mut sync = StubSynchronizer::new();

        let mut table = table_for(&registry, "m", &[("gone", "gone")]);
        let phantom = FakeModule {
            reference: "phantom".to_string(),
            attrs: HashMap::new(),
        };
        table.replace(
            "phantom",
            Rc::new(phantom),
            vec![MacroBinding {
                name: "x".to_string(),
                alias: "x".to_string(),
            }],
        );
        sync.mark_dirty();
        sync.synchronize(&table, &mut namespace, &mut registry, &output);

        assert!(!sync.is_dirty());
        assert!(!namespace.contains("gone"));
        assert!(!namespace.contains("x"));
        assert_eq!(sync.stub_names(), &["gone".to_string(), "x".to_string()]);
    }

    #[test]
    fn empty_bindings_import_nothing() {
        let mut registry = FakeRegistry::default().with_module("m", &[("t", Value::Number(1.0))]);
        let table = table_for(&registry, "m", &[]);
        let mut namespace = Namespace::new();
        let (output, _) = output();

        let mut sync = StubSynchronizer::new();
        sync.mark_dirty();
        sync.synchronize(&table, &mut namespace, &mut registry, &output);
        assert!(namespace.is_empty());
        assert!(sync.stub_names().is_empty());
    }
}
