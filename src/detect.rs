//! Macro-import detection.
//!
//! A macro-import is an import statement whose first imported name is
//! exactly `macros`, un-aliased. Everything else about the statement shape
//! is ordinary import syntax, so detection happens after parsing, purely
//! on the statement's structure and in source order.

use crate::bindings::MacroBinding;
use crate::modules::resolve_reference;
use crate::syntax::{Span, Stmt, StmtNode};

/// One detected macro-import: the resolved module reference and the macro
/// names it binds, in statement order.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub reference: String,
    pub bindings: Vec<MacroBinding>,
    pub span: Span,
}

/// A macro-import whose module reference cannot be resolved. Detection has
/// no source context of its own; the caller turns this into a diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectError {
    pub reference: String,
    pub detail: String,
    pub span: Span,
}

pub fn is_macro_import(stmt: &StmtNode) -> bool {
    match &stmt.value {
        Stmt::Import(import) => matches!(
            import.items.first(),
            Some(item) if item.name.value == "macros" && item.alias.is_none()
        ),
        _ => false,
    }
}

/// Scan one parsed unit for macro-imports. Candidates come back in source
/// order with their references already resolved; a resolution failure stops
/// the scan so the unit is rejected before anything loads.
pub fn scan_unit(unit: &[StmtNode], anchor: Option<&str>) -> Result<Vec<Candidate>, DetectError> {
    let mut candidates = Vec::new();
    for stmt in unit {
        if !is_macro_import(stmt) {
            continue;
        }
        let import = match &stmt.value {
            Stmt::Import(import) => import,
            _ => continue,
        };
        let reference =
            resolve_reference(&import.reference.value, anchor).map_err(|detail| DetectError {
                reference: import.reference.value.clone(),
                detail,
                span: import.reference.span,
            })?;
        let bindings = import.items[1..]
            .iter()
            .map(|item| MacroBinding {
                name: item.name.value.clone(),
                alias: item.bound_name().to_string(),
            })
            .collect();
        candidates.push(Candidate {
            reference,
            bindings,
            span: stmt.span,
        });
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceContext;
    use crate::syntax::parser::{parse_unit, ParseOutcome};

    fn parse(src: &str) -> Vec<StmtNode> {
        let source = SourceContext::from_source("<test>", src);
        match parse_unit(src, &source) {
            Ok(ParseOutcome::Complete(stmts)) => stmts,
            other => panic!("test source must parse: {:?}", other.map(|_| ())),
        }
    }

    fn scan(src: &str) -> Vec<Candidate> {
        scan_unit(&parse(src), Some("")).unwrap()
    }

    #[test]
    fn sentinel_first_marks_a_macro_import() {
        let unit = parse("from util import macros, twice");
        assert!(is_macro_import(&unit[0]));
    }

    #[test]
    fn aliased_or_displaced_sentinel_is_a_plain_import() {
        let unit = parse("from util import macros as m, twice");
        assert!(!is_macro_import(&unit[0]));

        let unit = parse("from util import twice, macros");
        assert!(!is_macro_import(&unit[0]));

        let unit = parse("from util import twice");
        assert!(!is_macro_import(&unit[0]));
    }

    #[test]
    fn bindings_default_to_the_original_name() {
        let candidates = scan("from util import macros, twice as t, log");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].reference, "util");
        assert_eq!(
            candidates[0].bindings,
            vec![
                MacroBinding {
                    name: "twice".to_string(),
                    alias: "t".to_string(),
                },
                MacroBinding {
                    name: "log".to_string(),
                    alias: "log".to_string(),
                },
            ]
        );
    }

    #[test]
    fn bare_sentinel_import_has_no_bindings() {
        let candidates = scan("from util import macros");
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].bindings.is_empty());
    }

    #[test]
    fn candidates_keep_source_order() {
        let candidates = scan("from a import macros, x\ny = 1\nfrom b import macros, z");
        let refs: Vec<&str> = candidates.iter().map(|c| c.reference.as_str()).collect();
        assert_eq!(refs, vec!["a", "b"]);
    }

    #[test]
    fn relative_references_resolve_against_the_anchor() {
        let unit = parse("from .util import macros, t");
        let candidates = scan_unit(&unit, Some("pkg")).unwrap();
        assert_eq!(candidates[0].reference, "pkg.util");
    }

    #[test]
    fn unresolvable_reference_stops_the_scan() {
        let unit = parse("from .util import macros, t");
        let err = scan_unit(&unit, None).unwrap_err();
        assert_eq!(err.reference, ".util");
        assert!(err.detail.contains("anchor"));
    }

    #[test]
    fn other_statements_are_ignored() {
        let candidates = scan("x = 1\nprint(x)\nfrom base import pi");
        assert!(candidates.is_empty());
    }
}
