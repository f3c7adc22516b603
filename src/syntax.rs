//! Core syntax types: spans, expressions, statements.
//!
//! Every node carries a byte span into the source text it was parsed from,
//! so diagnostics can point at the offending input.

pub mod parser;

use std::fmt;
use std::sync::Arc;

/// A byte range into some source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A value paired with the span it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Self {
        Self { value, span }
    }
}

/// Expression nodes are shared: macro expansion splices argument subtrees
/// into template bodies without copying them.
pub type AstNode = Spanned<Arc<Expr>>;

pub type StmtNode = Spanned<Stmt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, Span),
    String(String, Span),
    Bool(bool, Span),
    None(Span),
    Name(String, Span),
    Unary {
        op: UnaryOp,
        operand: AstNode,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: AstNode,
        right: AstNode,
        span: Span,
    },
    Call {
        callee: AstNode,
        args: Vec<AstNode>,
        span: Span,
    },
    /// `*expr` in call-argument position. Only meaningful inside macro
    /// templates, where it splices a variadic binding.
    Spread {
        inner: AstNode,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(_, span)
            | Expr::String(_, span)
            | Expr::Bool(_, span)
            | Expr::None(span)
            | Expr::Name(_, span)
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Call { span, .. }
            | Expr::Spread { span, .. } => *span,
        }
    }

    /// The name, if this node is a bare name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(name, _) => Some(name),
            _ => None,
        }
    }

    /// Canonical source form. Binary and unary subexpressions are
    /// parenthesized so the output re-parses with the same shape.
    pub fn pretty(&self) -> String {
        match self {
            Expr::Number(n, _) => n.to_string(),
            Expr::String(s, _) => quote_string(s),
            Expr::Bool(b, _) => b.to_string(),
            Expr::None(_) => "none".to_string(),
            Expr::Name(name, _) => name.clone(),
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Neg => format!("-{}", operand.value.pretty_atom()),
                UnaryOp::Not => format!("not {}", operand.value.pretty_atom()),
            },
            Expr::Binary { op, left, right, .. } => format!(
                "{} {} {}",
                left.value.pretty_atom(),
                op.symbol(),
                right.value.pretty_atom()
            ),
            Expr::Call { callee, args, .. } => {
                let rendered: Vec<String> = args.iter().map(|a| a.value.pretty()).collect();
                format!("{}({})", callee.value.pretty_atom(), rendered.join(", "))
            }
            Expr::Spread { inner, .. } => format!("*{}", inner.value.pretty_atom()),
        }
    }

    fn pretty_atom(&self) -> String {
        match self {
            Expr::Unary { .. } | Expr::Binary { .. } => format!("({})", self.pretty()),
            _ => self.pretty(),
        }
    }
}

pub(crate) fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Macro parameter list: required names plus an optional trailing
/// variadic rest parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamList {
    pub required: Vec<String>,
    pub rest: Option<String>,
    pub span: Span,
}

impl ParamList {
    pub fn is_variadic(&self) -> bool {
        self.rest.is_some()
    }

    /// Human-readable arity for error messages: "2", or "at least 1".
    pub fn arity_description(&self) -> String {
        if self.is_variadic() {
            format!("at least {}", self.required.len())
        } else {
            self.required.len().to_string()
        }
    }

    pub fn pretty(&self) -> String {
        let mut parts: Vec<String> = self.required.clone();
        if let Some(rest) = &self.rest {
            parts.push(format!("*{}", rest));
        }
        parts.join(", ")
    }
}

/// One name imported by a `from ... import ...` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportItem {
    pub name: Spanned<String>,
    pub alias: Option<Spanned<String>>,
}

impl ImportItem {
    /// The name this item binds in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.alias {
            Some(alias) => &alias.value,
            None => &self.name.value,
        }
    }

    pub fn pretty(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {}", self.name.value, alias.value),
            None => self.name.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportStmt {
    /// Module reference as written, leading dots included.
    pub reference: Spanned<String>,
    pub items: Vec<ImportItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: Spanned<String>,
    pub params: ParamList,
    pub body: AstNode,
    /// Joined text of the `##` lines immediately above the definition.
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(AstNode),
    Assign { name: Spanned<String>, value: AstNode },
    Delete { name: Spanned<String> },
    Import(ImportStmt),
    MacroDef(MacroDef),
}

impl Stmt {
    pub fn pretty(&self) -> String {
        match self {
            Stmt::Expr(e) => e.value.pretty(),
            Stmt::Assign { name, value } => {
                format!("{} = {}", name.value, value.value.pretty())
            }
            Stmt::Delete { name } => format!("del {}", name.value),
            Stmt::Import(import) => {
                let items: Vec<String> = import.items.iter().map(ImportItem::pretty).collect();
                format!("from {} import {}", import.reference.value, items.join(", "))
            }
            Stmt::MacroDef(def) => {
                let mut out = String::new();
                if let Some(doc) = &def.doc {
                    for line in doc.lines() {
                        out.push_str("## ");
                        out.push_str(line);
                        out.push('\n');
                    }
                }
                out.push_str(&format!(
                    "macro {}({}): {}",
                    def.name.value,
                    def.params.pretty(),
                    def.body.value.pretty()
                ));
                out
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}
