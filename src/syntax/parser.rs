//! Pest-based parser for units and definition modules.
//!
//! The REPL feeds partial input here: a parse failure positioned at the end
//! of the source is reported as [`ParseOutcome::Incomplete`] rather than an
//! error, which is what drives multi-line continuation.

use crate::errors::{
    to_source_span, unspanned, ErrorKind, ErrorReporting, MudraError, ReportContext, SourceContext,
};
use crate::syntax::{
    AstNode, BinaryOp, Expr, ImportItem, ImportStmt, MacroDef, ParamList, Span, Spanned, Stmt,
    StmtNode, UnaryOp,
};
use miette::SourceSpan;
use pest::error::{ErrorVariant, InputLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct MudraParser;

#[derive(Debug)]
pub enum ParseOutcome {
    Complete(Vec<StmtNode>),
    /// The input is a syntactically valid prefix: the parse failed at the
    /// very end of the source. The caller should gather more lines.
    Incomplete,
}

/// Parse one interactive unit.
pub fn parse_unit(source: &str, context: &SourceContext) -> Result<ParseOutcome, MudraError> {
    let report = ReportContext::new(context.clone(), "parse");
    if source.trim().is_empty() {
        return Ok(ParseOutcome::Complete(Vec::new()));
    }
    match MudraParser::parse(Rule::unit, source) {
        Ok(mut pairs) => {
            let unit = pairs
                .next()
                .ok_or_else(|| report.internal_error("parser produced no unit", unspanned()))?;
            Ok(ParseOutcome::Complete(build_statements(unit, &report)?))
        }
        Err(err) if error_at_end(&err, source) => Ok(ParseOutcome::Incomplete),
        Err(err) => Err(convert_parse_error(err, &report, source)),
    }
}

/// Parse a whole source file. Incomplete input is an error here: files do
/// not get continuation lines.
pub fn parse_program(source: &str, context: &SourceContext) -> Result<Vec<StmtNode>, MudraError> {
    match parse_unit(source, context)? {
        ParseOutcome::Complete(stmts) => Ok(stmts),
        ParseOutcome::Incomplete => {
            let report = ReportContext::new(context.clone(), "parse");
            let end = source.len();
            Err(report.report(
                ErrorKind::UnexpectedEnd {
                    expected: "a complete statement".into(),
                },
                SourceSpan::from(end..end),
            ))
        }
    }
}

// ============================================================================
// STATEMENT BUILDERS
// ============================================================================

fn build_statements(unit: Pair<Rule>, report: &ReportContext) -> Result<Vec<StmtNode>, MudraError> {
    let mut stmts = Vec::new();
    for pair in unit.into_inner() {
        match pair.as_rule() {
            Rule::statement => stmts.push(build_statement(pair, report)?),
            Rule::EOI => {}
            other => {
                return Err(report.internal_error(
                    &format!("unexpected rule {:?} at unit level", other),
                    unspanned(),
                ))
            }
        }
    }
    Ok(stmts)
}

fn build_statement(pair: Pair<Rule>, report: &ReportContext) -> Result<StmtNode, MudraError> {
    let span = get_span(&pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| report.internal_error("statement with no body", unspanned()))?;
    let stmt = match inner.as_rule() {
        Rule::import_stmt => Stmt::Import(build_import(inner, report)?),
        Rule::macro_def => Stmt::MacroDef(build_macro_def(inner, report)?),
        Rule::del_stmt => {
            let name = find_name(inner, report)?;
            Stmt::Delete { name }
        }
        Rule::assign_stmt => {
            let mut name = None;
            let mut value = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::name => name = Some(spanned_text(&part)),
                    Rule::expr => value = Some(build_expr(part, report)?),
                    _ => {}
                }
            }
            match (name, value) {
                (Some(name), Some(value)) => Stmt::Assign { name, value },
                _ => return Err(report.internal_error("malformed assignment", unspanned())),
            }
        }
        Rule::expr_stmt => {
            let expr = inner
                .into_inner()
                .next()
                .ok_or_else(|| report.internal_error("empty expression statement", unspanned()))?;
            Stmt::Expr(build_expr(expr, report)?)
        }
        other => {
            return Err(report.internal_error(
                &format!("unexpected statement rule {:?}", other),
                unspanned(),
            ))
        }
    };
    Ok(Spanned::new(stmt, span))
}

fn build_import(pair: Pair<Rule>, report: &ReportContext) -> Result<ImportStmt, MudraError> {
    let mut reference = None;
    let mut items = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::module_ref => reference = Some(spanned_text(&part)),
            Rule::import_item => items.push(build_import_item(part)),
            _ => {}
        }
    }
    let reference = reference
        .ok_or_else(|| report.internal_error("import without module reference", unspanned()))?;
    Ok(ImportStmt { reference, items })
}

fn build_import_item(pair: Pair<Rule>) -> ImportItem {
    let mut names = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::name)
        .map(|p| spanned_text(&p));
    let name = match names.next() {
        Some(name) => name,
        // Unreachable per grammar; an empty item would not have parsed.
        None => Spanned::new(String::new(), Span::default()),
    };
    ImportItem {
        name,
        alias: names.next(),
    }
}

fn build_macro_def(pair: Pair<Rule>, report: &ReportContext) -> Result<MacroDef, MudraError> {
    let mut doc_lines: Vec<String> = Vec::new();
    let mut name = None;
    let mut params = None;
    let mut body = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::doc_line => doc_lines.push(clean_doc_line(part.as_str())),
            Rule::name => name = Some(spanned_text(&part)),
            Rule::params => params = Some(build_params(part, report)?),
            Rule::expr => body = Some(build_expr(part, report)?),
            _ => {}
        }
    }
    let name =
        name.ok_or_else(|| report.internal_error("macro definition without name", unspanned()))?;
    let body =
        body.ok_or_else(|| report.internal_error("macro definition without body", unspanned()))?;
    let params = params.unwrap_or(ParamList {
        required: Vec::new(),
        rest: None,
        span: name.span,
    });
    let doc = if doc_lines.is_empty() {
        None
    } else {
        Some(doc_lines.join("\n"))
    };
    Ok(MacroDef {
        name,
        params,
        body,
        doc,
    })
}

fn clean_doc_line(raw: &str) -> String {
    let stripped = raw.trim_start_matches('#');
    stripped.strip_prefix(' ').unwrap_or(stripped).trim_end().to_string()
}

fn build_params(pair: Pair<Rule>, report: &ReportContext) -> Result<ParamList, MudraError> {
    let span = get_span(&pair);
    let mut required = Vec::new();
    let mut rest = None;
    let mut seen: HashSet<String> = HashSet::new();
    for part in pair.into_inner() {
        let (param_name, param_span, is_rest) = match part.as_rule() {
            Rule::param => {
                let span = get_span(&part);
                (part.as_str().to_string(), span, false)
            }
            Rule::rest_param => {
                let span = get_span(&part);
                let name = part
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::name)
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                (name, span, true)
            }
            _ => continue,
        };
        if !seen.insert(param_name.clone()) {
            return Err(report.report(
                ErrorKind::DuplicateParameter { name: param_name },
                to_source_span(param_span),
            ));
        }
        if is_rest {
            rest = Some(param_name);
        } else {
            required.push(param_name);
        }
    }
    Ok(ParamList {
        required,
        rest,
        span,
    })
}

// ============================================================================
// EXPRESSION BUILDERS
// ============================================================================

fn build_expr(pair: Pair<Rule>, report: &ReportContext) -> Result<AstNode, MudraError> {
    match pair.as_rule() {
        Rule::expr => {
            let span = get_span(&pair);
            let mut inner = pair.into_inner();
            let first = inner
                .next()
                .ok_or_else(|| report.internal_error("empty expression", unspanned()))?;
            if first.as_rule() == Rule::kw_not {
                let operand_pair = inner
                    .next()
                    .ok_or_else(|| report.internal_error("'not' without operand", unspanned()))?;
                let operand = build_expr(operand_pair, report)?;
                Ok(node(
                    Expr::Unary {
                        op: UnaryOp::Not,
                        operand,
                        span,
                    },
                    span,
                ))
            } else {
                build_expr(first, report)
            }
        }
        Rule::comparison | Rule::additive | Rule::multiplicative => {
            build_binary_chain(pair, report)
        }
        Rule::unary => {
            let span = get_span(&pair);
            let mut inner = pair.into_inner();
            let first = inner
                .next()
                .ok_or_else(|| report.internal_error("empty unary expression", unspanned()))?;
            if first.as_rule() == Rule::neg_op {
                let operand_pair = inner
                    .next()
                    .ok_or_else(|| report.internal_error("'-' without operand", unspanned()))?;
                let operand = build_expr(operand_pair, report)?;
                Ok(node(
                    Expr::Unary {
                        op: UnaryOp::Neg,
                        operand,
                        span,
                    },
                    span,
                ))
            } else {
                build_expr(first, report)
            }
        }
        Rule::postfix => {
            let mut inner = pair.into_inner();
            let head = inner
                .next()
                .ok_or_else(|| report.internal_error("empty postfix expression", unspanned()))?;
            let mut acc = build_expr(head, report)?;
            for call in inner {
                let call_span = get_span(&call);
                let span = Span::new(acc.span.start, call_span.end);
                let args = build_call_args(call, report)?;
                acc = node(
                    Expr::Call {
                        callee: acc,
                        args,
                        span,
                    },
                    span,
                );
            }
            Ok(acc)
        }
        Rule::primary => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| report.internal_error("empty primary expression", unspanned()))?;
            build_expr(inner, report)
        }
        Rule::number => {
            let span = get_span(&pair);
            let value: f64 = pair.as_str().parse().map_err(|_| {
                report.report(
                    ErrorKind::InvalidLiteral {
                        literal_type: "number".into(),
                        value: pair.as_str().into(),
                    },
                    to_source_span(span),
                )
            })?;
            Ok(node(Expr::Number(value, span), span))
        }
        Rule::string => {
            let span = get_span(&pair);
            Ok(node(Expr::String(unescape_string(pair.as_str()), span), span))
        }
        Rule::boolean => {
            let span = get_span(&pair);
            Ok(node(Expr::Bool(pair.as_str() == "true", span), span))
        }
        Rule::none_lit => {
            let span = get_span(&pair);
            Ok(node(Expr::None(span), span))
        }
        Rule::name => {
            let span = get_span(&pair);
            Ok(node(Expr::Name(pair.as_str().to_string(), span), span))
        }
        Rule::paren => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| report.internal_error("empty parenthesized expression", unspanned()))?;
            build_expr(inner, report)
        }
        Rule::call_arg => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| report.internal_error("empty call argument", unspanned()))?;
            build_expr(inner, report)
        }
        Rule::spread_arg => {
            let span = get_span(&pair);
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| report.internal_error("spread without operand", unspanned()))?;
            let inner = build_expr(inner, report)?;
            Ok(node(Expr::Spread { inner, span }, span))
        }
        other => Err(report.internal_error(
            &format!("unexpected expression rule {:?}", other),
            unspanned(),
        )),
    }
}

fn build_binary_chain(pair: Pair<Rule>, report: &ReportContext) -> Result<AstNode, MudraError> {
    let mut inner = pair.into_inner();
    let first = inner
        .next()
        .ok_or_else(|| report.internal_error("empty operator chain", unspanned()))?;
    let mut acc = build_expr(first, report)?;
    while let Some(op_pair) = inner.next() {
        let op = binary_op(op_pair.as_str(), report, get_span(&op_pair))?;
        let rhs_pair = inner
            .next()
            .ok_or_else(|| report.internal_error("operator without right operand", unspanned()))?;
        let rhs = build_expr(rhs_pair, report)?;
        let span = Span::new(acc.span.start, rhs.span.end);
        acc = node(
            Expr::Binary {
                op,
                left: acc,
                right: rhs,
                span,
            },
            span,
        );
    }
    Ok(acc)
}

fn build_call_args(pair: Pair<Rule>, report: &ReportContext) -> Result<Vec<AstNode>, MudraError> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::call_arg)
        .map(|p| build_expr(p, report))
        .collect()
}

fn binary_op(symbol: &str, report: &ReportContext, span: Span) -> Result<BinaryOp, MudraError> {
    match symbol {
        "+" => Ok(BinaryOp::Add),
        "-" => Ok(BinaryOp::Sub),
        "*" => Ok(BinaryOp::Mul),
        "/" => Ok(BinaryOp::Div),
        "==" => Ok(BinaryOp::Eq),
        "!=" => Ok(BinaryOp::Ne),
        "<" => Ok(BinaryOp::Lt),
        "<=" => Ok(BinaryOp::Le),
        ">" => Ok(BinaryOp::Gt),
        ">=" => Ok(BinaryOp::Ge),
        other => Err(report.internal_error(
            &format!("unknown operator '{}'", other),
            to_source_span(span),
        )),
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn node(expr: Expr, span: Span) -> AstNode {
    Spanned::new(Arc::new(expr), span)
}

fn get_span(pair: &Pair<Rule>) -> Span {
    let span = pair.as_span();
    Span::new(span.start(), span.end())
}

fn spanned_text(pair: &Pair<Rule>) -> Spanned<String> {
    Spanned::new(pair.as_str().to_string(), get_span(pair))
}

fn find_name(pair: Pair<Rule>, report: &ReportContext) -> Result<Spanned<String>, MudraError> {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::name)
        .map(|p| spanned_text(&p))
        .ok_or_else(|| report.internal_error("expected a name", unspanned()))
}

fn unescape_string(raw: &str) -> String {
    let body = &raw[1..raw.len().saturating_sub(1)];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            // Unknown escapes are kept verbatim.
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn error_at_end(err: &pest::error::Error<Rule>, source: &str) -> bool {
    let pos = match err.location {
        InputLocation::Pos(p) => p,
        InputLocation::Span((start, _)) => start,
    };
    pos >= source.trim_end().len()
}

fn convert_parse_error(
    err: pest::error::Error<Rule>,
    report: &ReportContext,
    source: &str,
) -> MudraError {
    let (start, end) = match err.location {
        InputLocation::Pos(p) => (p, (p + 1).min(source.len())),
        InputLocation::Span((s, e)) => (s, e),
    };
    let start = start.min(source.len());
    let end = end.clamp(start, source.len());
    let found = match source[start..].chars().next() {
        None => "end of input".to_string(),
        Some('\n') | Some('\r') => "end of line".to_string(),
        Some(c) => format!("'{}'", c),
    };
    let expected = match &err.variant {
        ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => {
            describe_rules(positives)
        }
        _ => "a statement".to_string(),
    };
    report.report(
        ErrorKind::UnexpectedToken { expected, found },
        SourceSpan::from(start..end),
    )
}

fn describe_rules(rules: &[Rule]) -> String {
    let mut seen = Vec::new();
    for rule in rules {
        let description = rule_description(*rule);
        if !seen.contains(&description) {
            seen.push(description);
        }
    }
    seen.join(" or ")
}

fn rule_description(rule: Rule) -> &'static str {
    match rule {
        Rule::statement | Rule::expr_stmt => "a statement",
        Rule::expr
        | Rule::comparison
        | Rule::additive
        | Rule::multiplicative
        | Rule::unary
        | Rule::postfix
        | Rule::primary
        | Rule::call_arg
        | Rule::spread_arg
        | Rule::paren => "an expression",
        Rule::name => "a name",
        Rule::number => "a number",
        Rule::string => "a string",
        Rule::boolean | Rule::none_lit => "a literal",
        Rule::import_item => "an imported name",
        Rule::module_ref => "a module reference",
        Rule::params | Rule::param | Rule::rest_param => "a parameter",
        Rule::cmp_op | Rule::add_op | Rule::mul_op | Rule::neg_op => "an operator",
        Rule::assign_op => "'='",
        Rule::call_args => "'('",
        Rule::sep => "a newline or ';'",
        Rule::EOI => "end of input",
        _ => "valid syntax",
    }
}
