//! Definition modules: resolution, loading, and in-place reloading.
//!
//! A module is a `.mudra` file executed top to bottom in its own namespace.
//! `macro` definitions become [`Value::Macro`] attributes; everything else
//! runs through the ordinary evaluator. Reloading re-executes the current
//! disk source and swaps the attribute namespace inside the existing handle,
//! so every holder of the handle observes the new definitions.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::detect::is_macro_import;
use crate::errors::{
    to_source_span, unspanned, ErrorKind, ErrorReporting, MudraError, ReportContext, SourceContext,
};
use crate::expand::MacroTemplate;
use crate::runtime::eval::{self, EvalContext, ExecMode};
use crate::runtime::namespace::Namespace;
use crate::runtime::output::SharedOutput;
use crate::runtime::{MacroValue, Value};
use crate::syntax::parser::parse_program;
use crate::syntax::{MacroDef, Span, Stmt};

/// A loaded definition module, shared by the registry, the binding table,
/// and the stub synchronizer.
pub trait ModuleHandle: std::fmt::Debug {
    fn reference(&self) -> &str;
    fn has_attribute(&self, name: &str) -> bool;
    fn get_attribute(&self, name: &str) -> Option<Value>;
}

/// Module loading policy. `load` returns the cached module when one exists;
/// `reload` always re-executes the current disk source. Macro-import
/// validation goes through `reload` so edited definitions take effect.
pub trait ModuleRegistry {
    fn load(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError>;
    fn reload(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError>;
}

/// Resolve a possibly-relative module reference against an anchor
/// package. One leading dot names the anchor package itself, each further
/// dot climbs one level. `Some("")` anchors at the module root; `None`
/// means relative references are unavailable.
pub fn resolve_reference(reference: &str, anchor: Option<&str>) -> Result<String, String> {
    let tail = reference.trim_start_matches('.');
    let dots = reference.len() - tail.len();
    if dots == 0 {
        return Ok(tail.to_string());
    }
    let anchor =
        anchor.ok_or_else(|| "relative reference used without a package anchor".to_string())?;
    let mut parts: Vec<&str> = if anchor.is_empty() {
        Vec::new()
    } else {
        anchor.split('.').collect()
    };
    for _ in 1..dots {
        if parts.pop().is_none() {
            return Err(format!("reference '{}' escapes the module root", reference));
        }
    }
    if tail.is_empty() {
        return Err(format!("reference '{}' names no module", reference));
    }
    parts.push(tail);
    Ok(parts.join("."))
}

/// The package a module's own relative imports resolve against.
pub fn parent_package(reference: &str) -> String {
    match reference.rsplit_once('.') {
        Some((package, _)) => package.to_string(),
        None => String::new(),
    }
}

#[derive(Debug)]
pub struct MudraModule {
    reference: String,
    file: PathBuf,
    attrs: RefCell<Namespace>,
}

impl ModuleHandle for MudraModule {
    fn reference(&self) -> &str {
        &self.reference
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.attrs.borrow().contains(name)
    }

    fn get_attribute(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }
}

/// Disk-backed registry rooted at a directory: reference `a.b` names
/// `<root>/a/b.mudra`.
pub struct FileModuleRegistry {
    root: PathBuf,
    modules: HashMap<String, Rc<MudraModule>>,
    loading: HashSet<String>,
    output: SharedOutput,
}

impl FileModuleRegistry {
    pub fn new(root: impl Into<PathBuf>, output: SharedOutput) -> Self {
        Self {
            root: root.into(),
            modules: HashMap::new(),
            loading: HashSet::new(),
            output,
        }
    }

    fn module_path(&self, reference: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in reference.split('.') {
            path.push(part);
        }
        path.set_extension("mudra");
        path
    }

    fn load_fresh(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError> {
        let (file, attrs) = self.execute_guarded(reference)?;
        let module = Rc::new(MudraModule {
            reference: reference.to_string(),
            file,
            attrs: RefCell::new(attrs),
        });
        self.modules.insert(reference.to_string(), module.clone());
        Ok(module)
    }

    fn execute_guarded(&mut self, reference: &str) -> Result<(PathBuf, Namespace), MudraError> {
        if !self.loading.insert(reference.to_string()) {
            let report = ReportContext::new(SourceContext::fallback(reference), "load");
            return Err(report.module_not_found(reference, "circular import", unspanned()));
        }
        let result = self.read_and_execute(reference);
        self.loading.remove(reference);
        result
    }

    fn read_and_execute(&mut self, reference: &str) -> Result<(PathBuf, Namespace), MudraError> {
        let file = self.module_path(reference);
        let source_text = fs::read_to_string(&file).map_err(|e| {
            let report = ReportContext::new(SourceContext::fallback(reference), "load");
            report.module_not_found(reference, &format!("{} ({})", e, file.display()), unspanned())
        })?;
        let source = SourceContext::from_source(file.display().to_string(), source_text.clone());
        let stmts = parse_program(&source_text, &source)?;
        let anchor = parent_package(reference);
        let mut namespace = Namespace::new();
        for stmt in &stmts {
            match &stmt.value {
                Stmt::MacroDef(def) => {
                    let value = build_macro_value(reference, &file, &source_text, def, stmt.span);
                    namespace.set(def.name.value.clone(), value);
                }
                Stmt::Import(import) if is_macro_import(stmt) => {
                    let report = ReportContext::new(source.clone(), "load");
                    let mut error = report.report(
                        ErrorKind::MacroImportInModule {
                            reference: import.reference.value.clone(),
                        },
                        to_source_span(stmt.span),
                    );
                    error.diagnostic_info.help = Some(
                        "definition modules run without macro expansion; import plain values instead"
                            .to_string(),
                    );
                    return Err(error);
                }
                _ => {
                    let output = self.output.clone();
                    eval::execute_stmt(
                        stmt,
                        &mut EvalContext {
                            namespace: &mut namespace,
                            registry: self,
                            output,
                            source: source.clone(),
                            mode: ExecMode::Program,
                            anchor: Some(anchor.clone()),
                            depth: 0,
                            max_depth: eval::MAX_EVAL_DEPTH,
                        },
                    )?;
                }
            }
        }
        Ok((file, namespace))
    }
}

impl ModuleRegistry for FileModuleRegistry {
    fn load(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError> {
        if let Some(module) = self.modules.get(reference) {
            return Ok(module.clone());
        }
        self.load_fresh(reference)
    }

    fn reload(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError> {
        if !self.modules.contains_key(reference) {
            return self.load_fresh(reference);
        }
        // Execute fully before touching the live handle: a failed reload
        // must leave the previous definitions in force.
        let (_, attrs) = self.execute_guarded(reference)?;
        match self.modules.get(reference) {
            Some(module) => {
                *module.attrs.borrow_mut() = attrs;
                Ok(module.clone() as Rc<dyn ModuleHandle>)
            }
            None => self.load_fresh(reference),
        }
    }
}

fn build_macro_value(
    reference: &str,
    file: &Path,
    source_text: &str,
    def: &MacroDef,
    span: Span,
) -> Value {
    let snippet = source_text
        .get(span.start..span.end)
        .unwrap_or("")
        .trim_end()
        .to_string();
    let line = source_text
        .get(..span.start)
        .map(|prefix| prefix.matches('\n').count() + 1)
        .unwrap_or(1);
    Value::Macro(Rc::new(MacroValue {
        module: reference.to_string(),
        name: def.name.value.clone(),
        doc: def.doc.clone(),
        source: snippet,
        file: file.to_path_buf(),
        line,
        template: MacroTemplate::new(def.params.clone(), def.body.clone()),
    }))
}
