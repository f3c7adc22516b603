//! Macro expansion: rewriting units against the binding table.
//!
//! Expansion is syntactic and outside-in. A call whose callee is a bound
//! macro alias is replaced by the macro's body with arguments substituted
//! by name, then the result is expanded again until no macro calls remain.
//! Arguments substitute as unevaluated expressions; an argument bound to an
//! unused parameter disappears from the output entirely.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::bindings::BindingSnapshot;
use crate::detect::is_macro_import;
use crate::errors::{
    to_source_span, ErrorKind, ErrorReporting, MudraError, ReportContext, SourceContext,
};
use crate::runtime::{MacroValue, Value};
use crate::syntax::{AstNode, Expr, ParamList, Span, Spanned, Stmt, StmtNode};

/// How many rewrite generations one unit may go through before expansion
/// is declared non-terminating.
pub const MAX_EXPANSION_DEPTH: usize = 128;

/// A macro's substitutable form: parameter list plus body expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroTemplate {
    pub params: ParamList,
    pub body: AstNode,
}

impl MacroTemplate {
    pub fn new(params: ParamList, body: AstNode) -> Self {
        Self { params, body }
    }
}

/// One rewrite, rendered for the expansion trace.
#[derive(Debug, Clone)]
pub struct ExpansionStep {
    pub macro_name: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone)]
pub struct Expansion {
    pub unit: Vec<StmtNode>,
    pub trace: Vec<ExpansionStep>,
}

pub trait Expander {
    fn expand(
        &self,
        unit: &[StmtNode],
        source: &SourceContext,
        bindings: &BindingSnapshot,
    ) -> Result<Expansion, MudraError>;
}

/// The standard expander: template substitution driven by the committed
/// binding table. Macro-import statements are stripped from the output.
pub struct TemplateExpander;

impl Expander for TemplateExpander {
    fn expand(
        &self,
        unit: &[StmtNode],
        source: &SourceContext,
        bindings: &BindingSnapshot,
    ) -> Result<Expansion, MudraError> {
        let mut rewriter = Rewriter {
            macros: collect_macros(bindings),
            report: ReportContext::new(source.clone(), "expand"),
            trace: Vec::new(),
        };
        let mut out = Vec::with_capacity(unit.len());
        for stmt in unit {
            if is_macro_import(stmt) {
                continue;
            }
            out.push(rewriter.rewrite_stmt(stmt)?);
        }
        Ok(Expansion {
            unit: out,
            trace: rewriter.trace,
        })
    }
}

/// Resolve the snapshot to alias -> macro. Later entries win; an alias whose
/// current attribute is not a macro expands nothing (the stub synchronizer
/// imports it as a plain value instead).
fn collect_macros(bindings: &BindingSnapshot) -> HashMap<String, Rc<MacroValue>> {
    let mut map = HashMap::new();
    for entry in bindings.entries() {
        for binding in &entry.bindings {
            match entry.module.get_attribute(&binding.name) {
                Some(Value::Macro(mv)) => {
                    map.insert(binding.alias.clone(), mv);
                }
                _ => {
                    map.remove(&binding.alias);
                }
            }
        }
    }
    map
}

enum ParamValue {
    Single(AstNode),
    Variadic(Vec<AstNode>),
}

struct Rewriter {
    macros: HashMap<String, Rc<MacroValue>>,
    report: ReportContext,
    trace: Vec<ExpansionStep>,
}

impl Rewriter {
    fn rewrite_stmt(&mut self, stmt: &StmtNode) -> Result<StmtNode, MudraError> {
        let value = match &stmt.value {
            Stmt::Expr(expr) => Stmt::Expr(self.expand(expr, 0)?),
            Stmt::Assign { name, value } => Stmt::Assign {
                name: name.clone(),
                value: self.expand(value, 0)?,
            },
            other => other.clone(),
        };
        Ok(Spanned::new(value, stmt.span))
    }

    fn expand(&mut self, expr: &AstNode, depth: usize) -> Result<AstNode, MudraError> {
        match &*expr.value {
            Expr::Call { callee, args, span } => {
                if let Expr::Name(alias, _) = &*callee.value {
                    if let Some(mv) = self.macros.get(alias).cloned() {
                        let before = expr.value.pretty();
                        let rewritten = self.apply(&mv, alias, args, *span, depth)?;
                        self.trace.push(ExpansionStep {
                            macro_name: alias.clone(),
                            before,
                            after: rewritten.value.pretty(),
                        });
                        return self.expand(&rewritten, depth + 1);
                    }
                }
                let callee = self.expand(callee, depth)?;
                let args = args
                    .iter()
                    .map(|arg| self.expand(arg, depth))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(node(Expr::Call { callee, args, span: *span }, *span))
            }
            Expr::Unary { op, operand, span } => {
                let operand = self.expand(operand, depth)?;
                Ok(node(
                    Expr::Unary {
                        op: *op,
                        operand,
                        span: *span,
                    },
                    *span,
                ))
            }
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let left = self.expand(left, depth)?;
                let right = self.expand(right, depth)?;
                Ok(node(
                    Expr::Binary {
                        op: *op,
                        left,
                        right,
                        span: *span,
                    },
                    *span,
                ))
            }
            Expr::Spread { inner, span } => {
                let inner = self.expand(inner, depth)?;
                Ok(node(Expr::Spread { inner, span: *span }, *span))
            }
            _ => Ok(expr.clone()),
        }
    }

    fn apply(
        &mut self,
        mv: &Rc<MacroValue>,
        alias: &str,
        args: &[AstNode],
        span: Span,
        depth: usize,
    ) -> Result<AstNode, MudraError> {
        if depth >= MAX_EXPANSION_DEPTH {
            return Err(self.report.report(
                ErrorKind::ExpansionLimit {
                    macro_name: alias.to_string(),
                },
                to_source_span(span),
            ));
        }
        self.check_arity(mv, alias, args, span)?;
        let params = bind_params(&mv.template.params, args);
        self.substitute(&mv.template.body, &params, span)
    }

    fn check_arity(
        &self,
        mv: &MacroValue,
        alias: &str,
        args: &[AstNode],
        span: Span,
    ) -> Result<(), MudraError> {
        let required = mv.template.params.required.len();
        let ok = if mv.template.params.is_variadic() {
            args.len() >= required
        } else {
            args.len() == required
        };
        if !ok {
            return Err(self.report.report(
                ErrorKind::MacroArity {
                    macro_name: alias.to_string(),
                    expected: mv.template.params.arity_description(),
                    actual: args.len(),
                },
                to_source_span(span),
            ));
        }
        Ok(())
    }

    /// Rebuild the template body with parameters replaced by argument
    /// expressions. Spliced arguments keep their own spans; everything that
    /// originates in the template is re-spanned to the call site, so later
    /// diagnostics always label positions that exist in the unit source.
    fn substitute(
        &self,
        body: &AstNode,
        params: &HashMap<String, ParamValue>,
        call_span: Span,
    ) -> Result<AstNode, MudraError> {
        match &*body.value {
            Expr::Name(name, _) => match params.get(name) {
                Some(ParamValue::Single(arg)) => Ok(arg.clone()),
                Some(ParamValue::Variadic(_)) => Err(self.report.report(
                    ErrorKind::MalformedExpansion {
                        detail: format!("variadic parameter '{}' used outside a spread", name),
                    },
                    to_source_span(call_span),
                )),
                None => Ok(node(Expr::Name(name.clone(), call_span), call_span)),
            },
            Expr::Number(n, _) => Ok(node(Expr::Number(*n, call_span), call_span)),
            Expr::String(s, _) => Ok(node(Expr::String(s.clone(), call_span), call_span)),
            Expr::Bool(b, _) => Ok(node(Expr::Bool(*b, call_span), call_span)),
            Expr::None(_) => Ok(node(Expr::None(call_span), call_span)),
            Expr::Unary { op, operand, .. } => {
                let operand = self.substitute(operand, params, call_span)?;
                Ok(node(
                    Expr::Unary {
                        op: *op,
                        operand,
                        span: call_span,
                    },
                    call_span,
                ))
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                let left = self.substitute(left, params, call_span)?;
                let right = self.substitute(right, params, call_span)?;
                Ok(node(
                    Expr::Binary {
                        op: *op,
                        left,
                        right,
                        span: call_span,
                    },
                    call_span,
                ))
            }
            Expr::Call { callee, args, .. } => {
                let callee = self.substitute(callee, params, call_span)?;
                let mut out_args = Vec::new();
                for arg in args {
                    if let Expr::Spread { inner, .. } = &*arg.value {
                        if let Expr::Name(name, _) = &*inner.value {
                            if let Some(ParamValue::Variadic(nodes)) = params.get(name) {
                                out_args.extend(nodes.iter().cloned());
                                continue;
                            }
                        }
                        let inner = self.substitute(inner, params, call_span)?;
                        out_args.push(node(
                            Expr::Spread {
                                inner,
                                span: call_span,
                            },
                            call_span,
                        ));
                        continue;
                    }
                    out_args.push(self.substitute(arg, params, call_span)?);
                }
                Ok(node(
                    Expr::Call {
                        callee,
                        args: out_args,
                        span: call_span,
                    },
                    call_span,
                ))
            }
            Expr::Spread { inner, .. } => {
                let inner = self.substitute(inner, params, call_span)?;
                Ok(node(
                    Expr::Spread {
                        inner,
                        span: call_span,
                    },
                    call_span,
                ))
            }
        }
    }
}

fn bind_params(params: &ParamList, args: &[AstNode]) -> HashMap<String, ParamValue> {
    let mut map = HashMap::new();
    for (i, name) in params.required.iter().enumerate() {
        map.insert(name.clone(), ParamValue::Single(args[i].clone()));
    }
    if let Some(rest) = &params.rest {
        map.insert(
            rest.clone(),
            ParamValue::Variadic(args[params.required.len()..].to_vec()),
        );
    }
    map
}

fn node(expr: Expr, span: Span) -> AstNode {
    Spanned::new(Arc::new(expr), span)
}
