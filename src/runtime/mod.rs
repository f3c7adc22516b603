//! Runtime values and the pieces that evaluate them.

pub mod eval;
pub mod namespace;
pub mod output;

use crate::expand::MacroTemplate;
use crate::syntax::quote_string;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Represents a value in an interactive session.
///
/// # Examples
///
/// ```rust
/// use mudra::runtime::Value;
/// let n = Value::Number(3.0);
/// assert_eq!(n.type_name(), "Number");
/// assert_eq!(n.to_string(), "3");
/// assert!(Value::None.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Number(f64),
    String(String),
    Bool(bool),
    Builtin(&'static Builtin),
    Macro(Rc<MacroValue>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Bool(_) => "Bool",
            Value::Builtin(_) => "Builtin",
            Value::Macro(_) => "Macro",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Source-like form: strings come back quoted. This is what the REPL
    /// echoes for a bare expression statement.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => quote_string(s),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            // A reloaded macro compares equal to its previous incarnation.
            (Value::Macro(a), Value::Macro(b)) => a.module == b.module && a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::Macro(m) => write!(f, "<macro {}.{}>", m.module, m.name),
        }
    }
}

/// A macro as materialized from a definition module. The session namespace
/// holds these as stubs; the expander holds them through the binding table.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroValue {
    /// Resolved reference of the defining module.
    pub module: String,
    /// Name the module defines it under.
    pub name: String,
    pub doc: Option<String>,
    /// Definition text as written in the module file.
    pub source: String,
    pub file: PathBuf,
    /// 1-based line of the definition in `file`.
    pub line: usize,
    pub template: MacroTemplate,
}

pub type BuiltinFn =
    fn(&[Value], crate::syntax::Span, &mut eval::EvalContext) -> Result<Value, crate::errors::MudraError>;

/// A host function exposed to evaluated code.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub doc: &'static str,
    pub func: BuiltinFn,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_repr_differ_for_strings() {
        let v = Value::String("hi".to_string());
        assert_eq!(v.to_string(), "hi");
        assert_eq!(v.repr(), "\"hi\"");
    }

    #[test]
    fn whole_numbers_display_without_fraction() {
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }
}
