//! Mudra error handling.
//!
//! One error type for every pipeline phase. Errors are never constructed
//! by hand; each phase builds them through an [`ErrorReporting`] context
//! that stamps the phase name and source information.

use miette::{Diagnostic, SourceSpan};
use miette::{LabeledSpan, NamedSource};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source text a unit of errors refers to: an input unit, a definition
/// module file, or a synthesized internal statement.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    pub fn from_source(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable.
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("# {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting.
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

/// The single error type - no wrapper, no variants, just essential data.
#[derive(Debug)]
pub struct MudraError {
    /// What went wrong (type-specific data)
    pub kind: ErrorKind,
    /// Where it happened (context-specific source information)
    pub source_info: SourceInfo,
    /// How to help (populated where a concrete suggestion exists)
    pub diagnostic_info: DiagnosticInfo,
}

/// All error types as a clean enum - no duplicate fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Parse errors - structural and syntactic issues
    UnexpectedToken {
        expected: String,
        found: String,
    },
    UnexpectedEnd {
        expected: String,
    },
    InvalidLiteral {
        literal_type: String,
        value: String,
    },
    MalformedConstruct {
        construct: String,
    },
    DuplicateParameter {
        name: String,
    },
    MacroDefOutsideModule {
        name: String,
    },

    // Binding errors - macro-import validation failures
    ModuleNotFound {
        reference: String,
        detail: String,
    },
    UndefinedMacro {
        module: String,
        name: String,
    },
    MacroImportInModule {
        reference: String,
    },

    // Expansion errors - template application failures
    MacroArity {
        macro_name: String,
        expected: String,
        actual: usize,
    },
    ExpansionLimit {
        macro_name: String,
    },
    MalformedExpansion {
        detail: String,
    },

    // Runtime errors - evaluation failures
    UndefinedName {
        name: String,
    },
    AttributeNotFound {
        module: String,
        name: String,
    },
    TypeMismatch {
        expected: String,
        actual: String,
    },
    ArityMismatch {
        callable: String,
        expected: String,
        actual: usize,
    },
    InvalidOperation {
        operation: String,
        operand_type: String,
    },
    DivisionByZero,
    RecursionLimit,
    StubNotCallable {
        name: String,
    },
    ReadFailed {
        path: String,
        detail: String,
    },
}

/// Context-specific source information.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data.
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// Context-aware error creation - each context knows how to create
/// appropriate errors for its phase.
pub trait ErrorReporting {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> MudraError;

    fn undefined_name(&self, name: &str, span: SourceSpan) -> MudraError {
        self.report(ErrorKind::UndefinedName { name: name.into() }, span)
    }

    fn type_mismatch(&self, expected: &str, actual: &str, span: SourceSpan) -> MudraError {
        self.report(
            ErrorKind::TypeMismatch {
                expected: expected.into(),
                actual: actual.into(),
            },
            span,
        )
    }

    fn arity_mismatch(
        &self,
        callable: &str,
        expected: &str,
        actual: usize,
        span: SourceSpan,
    ) -> MudraError {
        self.report(
            ErrorKind::ArityMismatch {
                callable: callable.into(),
                expected: expected.into(),
                actual,
            },
            span,
        )
    }

    fn invalid_operation(&self, operation: &str, operand_type: &str, span: SourceSpan) -> MudraError {
        self.report(
            ErrorKind::InvalidOperation {
                operation: operation.into(),
                operand_type: operand_type.into(),
            },
            span,
        )
    }

    fn module_not_found(&self, reference: &str, detail: &str, span: SourceSpan) -> MudraError {
        self.report(
            ErrorKind::ModuleNotFound {
                reference: reference.into(),
                detail: detail.into(),
            },
            span,
        )
    }

    fn undefined_macro(&self, module: &str, name: &str, span: SourceSpan) -> MudraError {
        self.report(
            ErrorKind::UndefinedMacro {
                module: module.into(),
                name: name.into(),
            },
            span,
        )
    }

    /// Creates an internal error - these indicate pipeline bugs, not user
    /// errors. Use for situations that cannot happen in correct operation.
    fn internal_error(&self, message: &str, span: SourceSpan) -> MudraError {
        let mut error = self.report(
            ErrorKind::MalformedExpansion {
                detail: format!("INTERNAL ERROR: {}", message),
            },
            span,
        );
        error.diagnostic_info.help =
            Some("This is an internal error. Please report this as a bug.".into());
        error
    }
}

impl ErrorKind {
    /// Get the error category for dispatch and test assertions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnexpectedToken { .. }
            | Self::UnexpectedEnd { .. }
            | Self::InvalidLiteral { .. }
            | Self::MalformedConstruct { .. }
            | Self::DuplicateParameter { .. }
            | Self::MacroDefOutsideModule { .. } => ErrorCategory::Parse,

            Self::ModuleNotFound { .. }
            | Self::UndefinedMacro { .. }
            | Self::MacroImportInModule { .. } => ErrorCategory::Binding,

            Self::MacroArity { .. }
            | Self::ExpansionLimit { .. }
            | Self::MalformedExpansion { .. } => ErrorCategory::Expand,

            Self::UndefinedName { .. }
            | Self::AttributeNotFound { .. }
            | Self::TypeMismatch { .. }
            | Self::ArityMismatch { .. }
            | Self::InvalidOperation { .. }
            | Self::DivisionByZero
            | Self::RecursionLimit
            | Self::StubNotCallable { .. }
            | Self::ReadFailed { .. } => ErrorCategory::Runtime,
        }
    }

    /// Get error code suffix for diagnostic codes.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::UnexpectedToken { .. } => "unexpected_token",
            Self::UnexpectedEnd { .. } => "unexpected_end",
            Self::InvalidLiteral { .. } => "invalid_literal",
            Self::MalformedConstruct { .. } => "malformed_construct",
            Self::DuplicateParameter { .. } => "duplicate_parameter",
            Self::MacroDefOutsideModule { .. } => "macro_def_outside_module",
            Self::ModuleNotFound { .. } => "module_not_found",
            Self::UndefinedMacro { .. } => "undefined_macro",
            Self::MacroImportInModule { .. } => "macro_import_in_module",
            Self::MacroArity { .. } => "macro_arity",
            Self::ExpansionLimit { .. } => "expansion_limit",
            Self::MalformedExpansion { .. } => "malformed_expansion",
            Self::UndefinedName { .. } => "undefined_name",
            Self::AttributeNotFound { .. } => "attribute_not_found",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::ArityMismatch { .. } => "arity_mismatch",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::DivisionByZero => "division_by_zero",
            Self::RecursionLimit => "recursion_limit",
            Self::StubNotCallable { .. } => "stub_not_callable",
            Self::ReadFailed { .. } => "read_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Binding,
    Expand,
    Runtime,
}

impl std::error::Error for MudraError {}

impl fmt::Display for MudraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::UnexpectedToken { expected, found } => {
                write!(f, "Parse error: expected {}, found {}", expected, found)
            }
            ErrorKind::UnexpectedEnd { expected } => {
                write!(f, "Parse error: unexpected end of input, expected {}", expected)
            }
            ErrorKind::InvalidLiteral {
                literal_type,
                value,
            } => {
                write!(f, "Parse error: invalid {} '{}'", literal_type, value)
            }
            ErrorKind::MalformedConstruct { construct } => {
                write!(f, "Parse error: malformed {}", construct)
            }
            ErrorKind::DuplicateParameter { name } => {
                write!(f, "Parse error: duplicate parameter '{}'", name)
            }
            ErrorKind::MacroDefOutsideModule { name } => {
                write!(
                    f,
                    "Parse error: macro '{}' defined outside a definition module",
                    name
                )
            }
            ErrorKind::ModuleNotFound { reference, detail } => {
                write!(f, "Import error: cannot load module '{}': {}", reference, detail)
            }
            ErrorKind::UndefinedMacro { module, name } => {
                write!(f, "Import error: module '{}' has no macro '{}'", module, name)
            }
            ErrorKind::MacroImportInModule { reference } => {
                write!(
                    f,
                    "Import error: macro import of '{}' inside a definition module",
                    reference
                )
            }
            ErrorKind::MacroArity {
                macro_name,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Expansion error: macro '{}' expects {} argument(s), got {}",
                    macro_name, expected, actual
                )
            }
            ErrorKind::ExpansionLimit { macro_name } => {
                write!(
                    f,
                    "Expansion error: recursion limit exceeded while expanding '{}'",
                    macro_name
                )
            }
            ErrorKind::MalformedExpansion { detail } => {
                write!(f, "Expansion error: {}", detail)
            }
            ErrorKind::UndefinedName { name } => {
                write!(f, "Runtime error: name '{}' is not defined", name)
            }
            ErrorKind::AttributeNotFound { module, name } => {
                write!(
                    f,
                    "Runtime error: module '{}' has no attribute '{}'",
                    module, name
                )
            }
            ErrorKind::TypeMismatch { expected, actual } => {
                write!(f, "Type error: expected {}, got {}", expected, actual)
            }
            ErrorKind::ArityMismatch {
                callable,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "Runtime error: '{}' expects {} argument(s), got {}",
                    callable, expected, actual
                )
            }
            ErrorKind::InvalidOperation {
                operation,
                operand_type,
            } => {
                write!(
                    f,
                    "Runtime error: invalid operation '{}' on {}",
                    operation, operand_type
                )
            }
            ErrorKind::DivisionByZero => {
                write!(f, "Runtime error: division by zero")
            }
            ErrorKind::RecursionLimit => {
                write!(f, "Runtime error: recursion limit exceeded")
            }
            ErrorKind::StubNotCallable { name } => {
                write!(f, "Runtime error: macro stub '{}' is not callable", name)
            }
            ErrorKind::ReadFailed { path, detail } => {
                write!(f, "Runtime error: cannot read '{}': {}", path, detail)
            }
        }
    }
}

impl Diagnostic for MudraError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl MudraError {
    fn primary_label(&self) -> String {
        match &self.kind {
            ErrorKind::UnexpectedToken { .. } => "unexpected token".into(),
            ErrorKind::UnexpectedEnd { .. } => "input ends here".into(),
            ErrorKind::InvalidLiteral { .. } => "invalid literal".into(),
            ErrorKind::MalformedConstruct { .. } => "malformed syntax".into(),
            ErrorKind::DuplicateParameter { .. } => "duplicate parameter".into(),
            ErrorKind::MacroDefOutsideModule { .. } => "macro definition here".into(),
            ErrorKind::ModuleNotFound { .. } => "module reference".into(),
            ErrorKind::UndefinedMacro { .. } => "not found in module".into(),
            ErrorKind::MacroImportInModule { .. } => "macro import here".into(),
            ErrorKind::MacroArity { .. } => "macro invoked here".into(),
            ErrorKind::ExpansionLimit { .. } => "expansion did not terminate".into(),
            ErrorKind::MalformedExpansion { .. } => "produced by expansion".into(),
            ErrorKind::UndefinedName { .. } => "undefined name".into(),
            ErrorKind::AttributeNotFound { .. } => "imported here".into(),
            ErrorKind::TypeMismatch { .. } => "type mismatch".into(),
            ErrorKind::ArityMismatch { .. } => "called here".into(),
            ErrorKind::InvalidOperation { .. } => "invalid operation".into(),
            ErrorKind::DivisionByZero => "division by zero".into(),
            ErrorKind::RecursionLimit => "recursion limit exceeded".into(),
            ErrorKind::StubNotCallable { .. } => "stub called here".into(),
            ErrorKind::ReadFailed { .. } => "read failed".into(),
        }
    }
}

/// Creates a placeholder span for errors not tied to a specific source code
/// location, such as I/O errors or internal state failures.
pub fn unspanned() -> miette::SourceSpan {
    miette::SourceSpan::from(0..0)
}

/// Converts an AST span to a miette SourceSpan.
pub fn to_source_span(span: crate::syntax::Span) -> miette::SourceSpan {
    miette::SourceSpan::from(span.start..span.end)
}

/// General-purpose error creation context. Every phase of the pipeline
/// builds one of these around the source text it is working on.
pub struct ReportContext {
    pub source: SourceContext,
    pub phase: String,
}

impl ReportContext {
    pub fn new(source: SourceContext, phase: impl Into<String>) -> Self {
        Self {
            source,
            phase: phase.into(),
        }
    }
}

impl ErrorReporting for ReportContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> MudraError {
        let error_code = format!("mudra::{}::{}", self.phase, kind.code_suffix());

        MudraError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: self.phase.clone(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

// ============================================================================
// ERROR FORMATTING UTILITIES
// ============================================================================

/// Prints a MudraError with full miette diagnostics.
///
/// Rich formatting with source spans and help text, for user-facing display
/// in CLI and REPL contexts.
pub fn print_error(error: MudraError) {
    use miette::Report;
    let report = Report::new(error);
    eprintln!("{report:?}");
}
