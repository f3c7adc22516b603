//! The unit pipeline: parse, detect, validate, commit, expand, execute.
//!
//! One input unit moves through the stages in order. Validation failures
//! reject the unit before anything commits, so the binding table after a
//! rejected unit is exactly what it was before. Once the unit's
//! macro-imports commit, expansion and execution failures no longer touch
//! the table; runtime failures are reported and the unit still counts as
//! executed, so stub synchronization runs afterwards either way.

use std::path::PathBuf;

use miette::SourceSpan;

use crate::bindings::BindingTable;
use crate::detect::{is_macro_import, scan_unit};
use crate::errors::{
    to_source_span, ErrorKind, ErrorReporting, MudraError, ReportContext, SourceContext,
};
use crate::expand::{Expander, Expansion, TemplateExpander};
use crate::modules::{FileModuleRegistry, ModuleRegistry};
use crate::runtime::eval::{eval_expr, execute_unit, EvalContext, ExecMode, MAX_EVAL_DEPTH};
use crate::runtime::namespace::Namespace;
use crate::runtime::output::SharedOutput;
use crate::runtime::Value;
use crate::stubs::StubSynchronizer;
use crate::syntax::parser::{parse_program, parse_unit, ParseOutcome};
use crate::syntax::{Stmt, StmtNode};

/// What processing one source unit produced.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The text parses as a prefix of something longer; feed more lines.
    NeedMoreInput,
    /// The unit never reached execution. Nothing was committed unless the
    /// error arose after the validate stage.
    Rejected(MudraError),
    /// The unit ran. A runtime failure partway through is reported here but
    /// does not undo the statements that already took effect.
    Executed { error: Option<MudraError> },
}

pub struct ReplPipeline {
    registry: Box<dyn ModuleRegistry>,
    expander: Box<dyn Expander>,
    bindings: BindingTable,
    namespace: Namespace,
    sync: StubSynchronizer,
    output: SharedOutput,
    anchor: Option<String>,
    unit_index: usize,
}

impl ReplPipeline {
    pub fn new(
        registry: Box<dyn ModuleRegistry>,
        expander: Box<dyn Expander>,
        anchor: Option<String>,
        output: SharedOutput,
    ) -> Self {
        Self {
            registry,
            expander,
            bindings: BindingTable::new(),
            namespace: Namespace::new(),
            sync: StubSynchronizer::new(),
            output,
            anchor,
            unit_index: 1,
        }
    }

    /// The standard session setup: modules from disk under `root`, template
    /// expansion.
    pub fn with_disk_registry(
        root: impl Into<PathBuf>,
        anchor: Option<String>,
        output: SharedOutput,
    ) -> Self {
        let registry = FileModuleRegistry::new(root, output.clone());
        Self::new(Box::new(registry), Box::new(TemplateExpander), anchor, output)
    }

    /// Process one interactive unit end to end. Incomplete input consumes
    /// nothing; every other outcome consumes the next unit number.
    pub fn process(&mut self, source_text: &str) -> ProcessOutcome {
        let source =
            SourceContext::from_source(format!("<repl:{}>", self.unit_index), source_text);
        let stmts = match parse_unit(source_text, &source) {
            Ok(ParseOutcome::Complete(stmts)) => stmts,
            Ok(ParseOutcome::Incomplete) => return ProcessOutcome::NeedMoreInput,
            Err(error) => {
                self.unit_index += 1;
                return ProcessOutcome::Rejected(error);
            }
        };
        self.unit_index += 1;
        match self.run_unit(&stmts, &source, ExecMode::Interactive) {
            Ok(error) => ProcessOutcome::Executed { error },
            Err(error) => ProcessOutcome::Rejected(error),
        }
    }

    /// Like [`process`](Self::process), but input that still parses as
    /// incomplete is rejected instead of held. Used when the session flushes
    /// a continuation buffer the user chose not to finish.
    pub fn process_final(&mut self, source_text: &str) -> ProcessOutcome {
        match self.process(source_text) {
            ProcessOutcome::NeedMoreInput => {
                let source =
                    SourceContext::from_source(format!("<repl:{}>", self.unit_index), source_text);
                self.unit_index += 1;
                let end = source_text.len();
                let error = ReportContext::new(source, "parse").report(
                    ErrorKind::UnexpectedEnd {
                        expected: "a complete statement".to_string(),
                    },
                    SourceSpan::from(end..end),
                );
                ProcessOutcome::Rejected(error)
            }
            other => other,
        }
    }

    /// Post-execution hook: mirror the binding table into the namespace if
    /// the last unit changed it.
    pub fn on_post_execute(&mut self) {
        self.sync.synchronize(
            &self.bindings,
            &mut self.namespace,
            self.registry.as_mut(),
            &self.output,
        );
    }

    /// Run a whole program file through the pipeline as a single unit in
    /// program mode: no echo, the first error ends the run.
    pub fn run_program(&mut self, source_text: &str, name: &str) -> Result<(), MudraError> {
        let source = SourceContext::from_source(name, source_text);
        let stmts = parse_program(source_text, &source)?;
        match self.run_unit(&stmts, &source, ExecMode::Program)? {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Stage a program through expansion and return the rewritten unit
    /// without executing it. Macro modules still load and commit, since
    /// expansion is defined against the committed table.
    pub fn expand_program(
        &mut self,
        source_text: &str,
        name: &str,
    ) -> Result<Expansion, MudraError> {
        let source = SourceContext::from_source(name, source_text);
        let stmts = parse_program(source_text, &source)?;
        self.stage_expansion(&stmts, &source)
    }

    /// Evaluate one expression against the session namespace, outside the
    /// unit pipeline. Queries use this; the expression is not expanded.
    pub fn eval_expression(&mut self, text: &str) -> Result<Value, MudraError> {
        let source = SourceContext::from_source("<query>", text);
        let stmts = parse_program(text, &source)?;
        let expr = match stmts.as_slice() {
            [stmt] => match &stmt.value {
                Stmt::Expr(expr) => expr.clone(),
                _ => {
                    return Err(ReportContext::new(source, "parse").report(
                        ErrorKind::MalformedConstruct {
                            construct: "query (expected a single expression)".to_string(),
                        },
                        SourceSpan::from(0..text.len()),
                    ))
                }
            },
            _ => {
                return Err(ReportContext::new(source, "parse").report(
                    ErrorKind::MalformedConstruct {
                        construct: "query (expected a single expression)".to_string(),
                    },
                    SourceSpan::from(0..text.len()),
                ))
            }
        };
        eval_expr(
            &expr,
            &mut EvalContext {
                namespace: &mut self.namespace,
                registry: self.registry.as_mut(),
                output: self.output.clone(),
                source,
                mode: ExecMode::Program,
                anchor: self.anchor.clone(),
                depth: 0,
                max_depth: MAX_EVAL_DEPTH,
            },
        )
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn stub_names(&self) -> &[String] {
        self.sync.stub_names()
    }

    pub fn alias_listing(&self) -> Vec<(String, String)> {
        self.bindings.alias_listing()
    }

    pub fn output(&self) -> &SharedOutput {
        &self.output
    }

    fn run_unit(
        &mut self,
        stmts: &[StmtNode],
        source: &SourceContext,
        mode: ExecMode,
    ) -> Result<Option<MudraError>, MudraError> {
        let expansion = self.stage_expansion(stmts, source)?;
        let compiled = self.compile_unit(expansion.unit, source)?;
        let result = execute_unit(
            &compiled,
            &mut EvalContext {
                namespace: &mut self.namespace,
                registry: self.registry.as_mut(),
                output: self.output.clone(),
                source: source.clone(),
                mode,
                anchor: self.anchor.clone(),
                depth: 0,
                max_depth: MAX_EVAL_DEPTH,
            },
        );
        Ok(result.err())
    }

    /// Detect, validate, commit, expand. Validation completes for every
    /// candidate before the first one commits; a failure therefore leaves
    /// the table untouched.
    fn stage_expansion(
        &mut self,
        stmts: &[StmtNode],
        source: &SourceContext,
    ) -> Result<Expansion, MudraError> {
        self.reject_macro_defs(stmts, source)?;

        let candidates = scan_unit(stmts, self.anchor.as_deref()).map_err(|de| {
            ReportContext::new(source.clone(), "bind").module_not_found(
                &de.reference,
                &de.detail,
                to_source_span(de.span),
            )
        })?;

        let mut validated = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let module = self.registry.reload(&candidate.reference)?;
            for binding in &candidate.bindings {
                if !module.has_attribute(&binding.name) {
                    return Err(ReportContext::new(source.clone(), "bind").undefined_macro(
                        &candidate.reference,
                        &binding.name,
                        to_source_span(candidate.span),
                    ));
                }
            }
            validated.push((candidate, module));
        }

        let had_imports = !validated.is_empty();
        for (candidate, module) in validated {
            self.bindings
                .replace(&candidate.reference, module, candidate.bindings.clone());
        }
        if had_imports {
            self.sync.mark_dirty();
        }

        let snapshot = self.bindings.snapshot();
        self.expander.expand(stmts, source, &snapshot)
    }

    fn reject_macro_defs(
        &self,
        stmts: &[StmtNode],
        source: &SourceContext,
    ) -> Result<(), MudraError> {
        for stmt in stmts {
            if let Stmt::MacroDef(def) = &stmt.value {
                let mut error = ReportContext::new(source.clone(), "parse").report(
                    ErrorKind::MacroDefOutsideModule {
                        name: def.name.value.clone(),
                    },
                    to_source_span(stmt.span),
                );
                error.diagnostic_info.help = Some(format!(
                    "define '{}' in a .mudra module and import it with 'from <module> import macros, {}'",
                    def.name.value, def.name.value
                ));
                return Err(error);
            }
        }
        Ok(())
    }

    /// The rewritten tree must be plain executable code. Anything
    /// macro-shaped surviving expansion is an expander bug.
    fn compile_unit(
        &self,
        stmts: Vec<StmtNode>,
        source: &SourceContext,
    ) -> Result<Vec<StmtNode>, MudraError> {
        for stmt in &stmts {
            if is_macro_import(stmt) {
                return Err(ReportContext::new(source.clone(), "compile")
                    .internal_error("macro-import survived expansion", to_source_span(stmt.span)));
            }
        }
        Ok(stmts)
    }
}
