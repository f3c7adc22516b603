//! Statement and expression evaluation.
//!
//! Units arrive here already macro-expanded. Evaluation is plain tree
//! walking over a mutable namespace; the only reach outside the session is
//! a plain `from ... import ...`, which goes through the module registry.

use crate::errors::{
    to_source_span, ErrorKind, ErrorReporting, MudraError, ReportContext, SourceContext,
};
use crate::modules::{resolve_reference, ModuleRegistry};
use crate::runtime::namespace::Namespace;
use crate::runtime::output::SharedOutput;
use crate::runtime::{Builtin, Value};
use crate::syntax::{AstNode, BinaryOp, Expr, ImportStmt, Span, Stmt, StmtNode, UnaryOp};
use miette::SourceSpan;
use once_cell::sync::Lazy;

pub const MAX_EVAL_DEPTH: usize = 1000;

/// Interactive units echo non-none expression results; programs do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Interactive,
    Program,
}

pub struct EvalContext<'a> {
    pub namespace: &'a mut Namespace,
    pub registry: &'a mut dyn ModuleRegistry,
    pub output: SharedOutput,
    pub source: SourceContext,
    pub mode: ExecMode,
    /// Package context for resolving relative module references.
    pub anchor: Option<String>,
    pub depth: usize,
    pub max_depth: usize,
}

impl ErrorReporting for EvalContext<'_> {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> MudraError {
        ReportContext::new(self.source.clone(), "eval").report(kind, span)
    }
}

/// Execute the statements of one unit in order. The first failure aborts
/// the rest of the unit; whatever already ran stays committed.
pub fn execute_unit(stmts: &[StmtNode], ctx: &mut EvalContext) -> Result<(), MudraError> {
    for stmt in stmts {
        execute_stmt(stmt, ctx)?;
    }
    Ok(())
}

pub fn execute_stmt(stmt: &StmtNode, ctx: &mut EvalContext) -> Result<(), MudraError> {
    match &stmt.value {
        Stmt::Expr(expr) => {
            let value = eval_expr(expr, ctx)?;
            if ctx.mode == ExecMode::Interactive && !value.is_none() {
                ctx.output.emit(&value.repr());
            }
            Ok(())
        }
        Stmt::Assign { name, value } => {
            let value = eval_expr(value, ctx)?;
            ctx.namespace.set(name.value.clone(), value);
            Ok(())
        }
        Stmt::Delete { name } => {
            if ctx.namespace.remove(&name.value).is_none() {
                return Err(ctx.undefined_name(&name.value, to_source_span(name.span)));
            }
            Ok(())
        }
        Stmt::Import(import) => execute_import(import, ctx),
        Stmt::MacroDef(def) => {
            let mut error = ctx.report(
                ErrorKind::MacroDefOutsideModule {
                    name: def.name.value.clone(),
                },
                to_source_span(stmt.span),
            );
            error.diagnostic_info.help = Some(format!(
                "define '{}' in a .mudra module and import it with 'from <module> import macros, {}'",
                def.name.value, def.name.value
            ));
            Err(error)
        }
    }
}

/// A plain value import: load (never reload) the module and copy the named
/// attributes into the namespace.
fn execute_import(import: &ImportStmt, ctx: &mut EvalContext) -> Result<(), MudraError> {
    let reference = resolve_reference(&import.reference.value, ctx.anchor.as_deref())
        .map_err(|detail| {
            ctx.module_not_found(
                &import.reference.value,
                &detail,
                to_source_span(import.reference.span),
            )
        })?;
    let module = ctx.registry.load(&reference)?;
    for item in &import.items {
        let value = module.get_attribute(&item.name.value).ok_or_else(|| {
            ctx.report(
                ErrorKind::AttributeNotFound {
                    module: reference.clone(),
                    name: item.name.value.clone(),
                },
                to_source_span(item.name.span),
            )
        })?;
        ctx.namespace.set(item.bound_name().to_string(), value);
    }
    Ok(())
}

pub fn eval_expr(node: &AstNode, ctx: &mut EvalContext) -> Result<Value, MudraError> {
    if ctx.depth >= ctx.max_depth {
        return Err(ctx.report(ErrorKind::RecursionLimit, to_source_span(node.span)));
    }
    ctx.depth += 1;
    let result = eval_expr_inner(node, ctx);
    ctx.depth -= 1;
    result
}

fn eval_expr_inner(node: &AstNode, ctx: &mut EvalContext) -> Result<Value, MudraError> {
    match &*node.value {
        Expr::Number(n, _) => Ok(Value::Number(*n)),
        Expr::String(s, _) => Ok(Value::String(s.clone())),
        Expr::Bool(b, _) => Ok(Value::Bool(*b)),
        Expr::None(_) => Ok(Value::None),
        Expr::Name(name, span) => resolve_name(name, *span, ctx),
        Expr::Unary { op, operand, .. } => {
            let value = eval_expr(operand, ctx)?;
            match op {
                UnaryOp::Neg => match value.as_number() {
                    Some(n) => Ok(Value::Number(-n)),
                    None => Err(ctx.type_mismatch(
                        "Number",
                        value.type_name(),
                        to_source_span(operand.span),
                    )),
                },
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
            }
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            let lhs = eval_expr(left, ctx)?;
            let rhs = eval_expr(right, ctx)?;
            apply_binary(*op, &lhs, &rhs, node.span, ctx)
        }
        Expr::Call { callee, args, span } => {
            let callee_value = eval_expr(callee, ctx)?;
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                if matches!(&*arg.value, Expr::Spread { .. }) {
                    return Err(ctx.invalid_operation(
                        "*",
                        "runtime call arguments",
                        to_source_span(arg.span),
                    ));
                }
                values.push(eval_expr(arg, ctx)?);
            }
            match callee_value {
                Value::Builtin(builtin) => (builtin.func)(&values, *span, ctx),
                Value::Macro(stub) => {
                    let mut error = ctx.report(
                        ErrorKind::StubNotCallable {
                            name: stub.name.clone(),
                        },
                        to_source_span(callee.span),
                    );
                    error.diagnostic_info.help = Some(format!(
                        "macros expand before execution; import it with 'from {} import macros, {}' and call it by that name",
                        stub.module, stub.name
                    ));
                    Err(error)
                }
                other => Err(ctx.type_mismatch(
                    "a callable",
                    other.type_name(),
                    to_source_span(callee.span),
                )),
            }
        }
        Expr::Spread { span, .. } => {
            Err(ctx.invalid_operation("*", "a bare expression", to_source_span(*span)))
        }
    }
}

fn resolve_name(name: &str, span: Span, ctx: &mut EvalContext) -> Result<Value, MudraError> {
    if let Some(value) = ctx.namespace.get(name) {
        return Ok(value.clone());
    }
    if let Some(builtin) = lookup_builtin(name) {
        return Ok(Value::Builtin(builtin));
    }
    Err(ctx.undefined_name(name, to_source_span(span)))
}

fn apply_binary(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    span: Span,
    ctx: &EvalContext,
) -> Result<Value, MudraError> {
    use BinaryOp::*;
    let span = to_source_span(span);
    match op {
        Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(ctx.type_mismatch(
                "two Numbers or two Strings",
                &format!("{} and {}", lhs.type_name(), rhs.type_name()),
                span,
            )),
        },
        Sub | Mul | Div => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => match op {
                Sub => Ok(Value::Number(a - b)),
                Mul => Ok(Value::Number(a * b)),
                Div => {
                    if *b == 0.0 {
                        Err(ctx.report(ErrorKind::DivisionByZero, span))
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }
                _ => unreachable!("arithmetic op covered above"),
            },
            _ => Err(ctx.type_mismatch(
                "two Numbers",
                &format!("{} and {}", lhs.type_name(), rhs.type_name()),
                span,
            )),
        },
        Eq => Ok(Value::Bool(lhs == rhs)),
        Ne => Ok(Value::Bool(lhs != rhs)),
        Lt | Le | Gt | Ge => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Bool(compare(op, a, b))),
            (Value::String(a), Value::String(b)) => Ok(Value::Bool(compare(op, a, b))),
            _ => Err(ctx.type_mismatch(
                "two Numbers or two Strings",
                &format!("{} and {}", lhs.type_name(), rhs.type_name()),
                span,
            )),
        },
    }
}

fn compare<T: PartialOrd + ?Sized>(op: BinaryOp, a: &T, b: &T) -> bool {
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        _ => unreachable!("comparison op expected"),
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::None => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Builtin(_) | Value::Macro(_) => true,
    }
}

// ============================================================================
// BUILTINS
// ============================================================================

static BUILTINS: Lazy<Vec<Builtin>> = Lazy::new(|| {
    vec![
        Builtin {
            name: "print",
            doc: "print(values...): write the values to the session output, space-separated.",
            func: builtin_print,
        },
        Builtin {
            name: "len",
            doc: "len(string): number of characters in the string.",
            func: builtin_len,
        },
        Builtin {
            name: "str",
            doc: "str(value): the display form of the value as a string.",
            func: builtin_str,
        },
        Builtin {
            name: "abs",
            doc: "abs(number): absolute value.",
            func: builtin_abs,
        },
    ]
});

pub fn lookup_builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn builtin_print(args: &[Value], _span: Span, ctx: &mut EvalContext) -> Result<Value, MudraError> {
    let rendered: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    ctx.output.emit(&rendered.join(" "));
    Ok(Value::None)
}

fn expect_one<'v>(
    name: &str,
    args: &'v [Value],
    span: Span,
    ctx: &EvalContext,
) -> Result<&'v Value, MudraError> {
    if args.len() != 1 {
        return Err(ctx.arity_mismatch(name, "1", args.len(), to_source_span(span)));
    }
    Ok(&args[0])
}

fn builtin_len(args: &[Value], span: Span, ctx: &mut EvalContext) -> Result<Value, MudraError> {
    let arg = expect_one("len", args, span, ctx)?;
    match arg.as_str() {
        Some(s) => Ok(Value::Number(s.chars().count() as f64)),
        None => Err(ctx.type_mismatch("String", arg.type_name(), to_source_span(span))),
    }
}

fn builtin_str(args: &[Value], span: Span, ctx: &mut EvalContext) -> Result<Value, MudraError> {
    let arg = expect_one("str", args, span, ctx)?;
    Ok(Value::String(arg.to_string()))
}

fn builtin_abs(args: &[Value], span: Span, ctx: &mut EvalContext) -> Result<Value, MudraError> {
    let arg = expect_one("abs", args, span, ctx)?;
    match arg.as_number() {
        Some(n) => Ok(Value::Number(n.abs())),
        None => Err(ctx.type_mismatch("Number", arg.type_name(), to_source_span(span))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{unspanned, ErrorCategory};
    use crate::modules::ModuleHandle;
    use crate::runtime::output::OutputBuffer;
    use crate::syntax::parser::{parse_unit, ParseOutcome};
    use std::rc::Rc;

    struct EmptyRegistry;

    impl ModuleRegistry for EmptyRegistry {
        fn load(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError> {
            Err(ReportContext::new(SourceContext::fallback("registry"), "load")
                .module_not_found(reference, "no modules available", unspanned()))
        }

        fn reload(&mut self, reference: &str) -> Result<Rc<dyn ModuleHandle>, MudraError> {
            self.load(reference)
        }
    }

    fn run_mode(src: &str, mode: ExecMode) -> (Result<(), MudraError>, Vec<String>, Namespace) {
        let source = SourceContext::from_source("<test>", src);
        let stmts = match parse_unit(src, &source) {
            Ok(ParseOutcome::Complete(stmts)) => stmts,
            other => panic!("test source must parse: {:?}", other.map(|_| ())),
        };
        let mut namespace = Namespace::new();
        let mut registry = EmptyRegistry;
        let buffer = OutputBuffer::new();
        let result = execute_unit(
            &stmts,
            &mut EvalContext {
                namespace: &mut namespace,
                registry: &mut registry,
                output: SharedOutput::new(buffer.clone()),
                source,
                mode,
                anchor: None,
                depth: 0,
                max_depth: MAX_EVAL_DEPTH,
            },
        );
        (result, buffer.lines(), namespace)
    }

    fn run(src: &str) -> (Result<(), MudraError>, Vec<String>, Namespace) {
        run_mode(src, ExecMode::Interactive)
    }

    #[test]
    fn arithmetic_echoes_result() {
        let (result, lines, _) = run("1 + 2 * 3");
        result.unwrap();
        assert_eq!(lines, vec!["7".to_string()]);
    }

    #[test]
    fn string_echo_is_quoted_but_print_is_not() {
        let (result, lines, _) = run("\"a\" + \"b\"\nprint(\"a\" + \"b\")");
        result.unwrap();
        assert_eq!(lines, vec!["\"ab\"".to_string(), "ab".to_string()]);
    }

    #[test]
    fn assignment_binds_without_echo() {
        let (result, lines, ns) = run("x = 5\nx");
        result.unwrap();
        assert_eq!(lines, vec!["5".to_string()]);
        assert_eq!(ns.get("x"), Some(&Value::Number(5.0)));
    }

    #[test]
    fn program_mode_suppresses_echo() {
        let (result, lines, _) = run_mode("1 + 1", ExecMode::Program);
        result.unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn delete_removes_and_missing_delete_errors() {
        let (result, _, ns) = run("x = 1\ndel x");
        result.unwrap();
        assert!(!ns.contains("x"));

        let (result, _, _) = run("del ghost");
        let err = result.unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UndefinedName { ref name } if name == "ghost"));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let (result, _, _) = run("1 / 0");
        assert!(matches!(result.unwrap_err().kind, ErrorKind::DivisionByZero));
    }

    #[test]
    fn undefined_name_is_a_runtime_error() {
        let (result, _, _) = run("nope");
        let err = result.unwrap_err();
        assert_eq!(err.kind.category(), ErrorCategory::Runtime);
    }

    #[test]
    fn failure_aborts_rest_of_unit_but_keeps_earlier_effects() {
        let (result, lines, ns) = run("x = 1\nboom\nx = 2");
        assert!(result.is_err());
        assert!(lines.is_empty());
        assert_eq!(ns.get("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn truthiness_and_not() {
        let (result, lines, _) = run("not 0\nnot \"text\"");
        result.unwrap();
        assert_eq!(lines, vec!["true".to_string(), "false".to_string()]);
    }

    #[test]
    fn comparisons_work_on_numbers_and_strings() {
        let (result, lines, _) = run("1 < 2\n\"a\" < \"b\"\n1 == 1.0");
        result.unwrap();
        assert_eq!(
            lines,
            vec!["true".to_string(), "true".to_string(), "true".to_string()]
        );
    }

    #[test]
    fn mixed_addition_is_a_type_error() {
        let (result, _, _) = run("1 + \"a\"");
        assert!(matches!(
            result.unwrap_err().kind,
            ErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn builtins_are_resolvable_and_checked() {
        let (result, lines, _) = run("len(\"abc\")\nabs(-2)\nstr(4) + \"!\"");
        result.unwrap();
        assert_eq!(
            lines,
            vec!["3".to_string(), "2".to_string(), "\"4!\"".to_string()]
        );

        let (result, _, _) = run("len(\"a\", \"b\")");
        assert!(matches!(
            result.unwrap_err().kind,
            ErrorKind::ArityMismatch { .. }
        ));
    }

    #[test]
    fn calling_a_non_callable_is_a_type_error() {
        let (result, _, _) = run("x = 3\nx(1)");
        assert!(matches!(
            result.unwrap_err().kind,
            ErrorKind::TypeMismatch { .. }
        ));
    }

    #[test]
    fn spread_outside_templates_is_rejected_at_runtime() {
        let (result, _, _) = run("print(*xs)");
        assert!(matches!(
            result.unwrap_err().kind,
            ErrorKind::InvalidOperation { .. }
        ));
    }

    #[test]
    fn namespace_shadows_builtins() {
        let (result, lines, _) = run("len = 9\nlen");
        result.unwrap();
        assert_eq!(lines, vec!["9".to_string()]);
    }

    #[test]
    fn import_from_missing_module_fails() {
        let (result, _, _) = run("from nowhere import x");
        assert!(matches!(
            result.unwrap_err().kind,
            ErrorKind::ModuleNotFound { .. }
        ));
    }
}
