//! Interactive inspection queries.
//!
//! A line ending in `?` asks for a docstring, `??` for a source listing,
//! and the literal line `macros?` lists the current bindings. Queries are
//! recognized on the raw line before any parsing and bypass the unit
//! pipeline entirely; the inspected expression is evaluated against the
//! live namespace without macro expansion, so a bare macro alias resolves
//! to its stub.

use crate::errors::MudraError;
use crate::pipeline::ReplPipeline;
use crate::runtime::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Doc(String),
    Source(String),
    ListMacros,
}

pub fn match_query(line: &str) -> Option<Query> {
    let trimmed = line.trim();
    if trimmed == "macros?" {
        return Some(Query::ListMacros);
    }
    if let Some(stripped) = trimmed.strip_suffix("??") {
        let expr = stripped.trim_end();
        if expr.is_empty() {
            return None;
        }
        return Some(Query::Source(expr.to_string()));
    }
    if let Some(stripped) = trimmed.strip_suffix('?') {
        let expr = stripped.trim_end();
        if expr.is_empty() {
            return None;
        }
        return Some(Query::Doc(expr.to_string()));
    }
    None
}

pub fn run_query(query: &Query, pipeline: &mut ReplPipeline) -> Result<(), MudraError> {
    match query {
        Query::ListMacros => {
            let mut listing = pipeline.alias_listing();
            listing.sort();
            let output = pipeline.output().clone();
            for (alias, module) in listing {
                output.emit(&format!("{} from {}", alias, module));
            }
            Ok(())
        }
        Query::Doc(expr) => {
            let value = pipeline.eval_expression(expr)?;
            let output = pipeline.output().clone();
            match value {
                Value::Macro(stub) => {
                    output.emit(&format!("{}:{}", stub.file.display(), stub.line));
                    match &stub.doc {
                        Some(doc) => output.emit(doc),
                        None => output.emit("<no docstring>"),
                    }
                }
                Value::Builtin(builtin) => output.emit(builtin.doc),
                _ => output.emit("<no docstring>"),
            }
            Ok(())
        }
        Query::Source(expr) => {
            let value = pipeline.eval_expression(expr)?;
            let output = pipeline.output().clone();
            match value {
                Value::Macro(stub) => {
                    output.emit(&format!("{}:{}", stub.file.display(), stub.line));
                    output.emit(&stub.source);
                }
                _ => output.emit("<no source code available>"),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ProcessOutcome;
    use crate::runtime::output::{OutputBuffer, SharedOutput};
    use std::fs;
    use std::path::{Path, PathBuf};

    fn session(tag: &str) -> (ReplPipeline, OutputBuffer, PathBuf) {
        let root = std::env::temp_dir().join(format!("mudra-inspect-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&root).unwrap();
        let buffer = OutputBuffer::new();
        let pipeline =
            ReplPipeline::with_disk_registry(&root, None, SharedOutput::new(buffer.clone()));
        (pipeline, buffer, root)
    }

    fn write_module(root: &Path, name: &str, text: &str) {
        fs::write(root.join(format!("{}.mudra", name)), text).unwrap();
    }

    fn run_unit(pipeline: &mut ReplPipeline, text: &str) {
        match pipeline.process(text) {
            ProcessOutcome::Executed { error: None } => pipeline.on_post_execute(),
            other => panic!("setup unit failed: {:?}", other),
        }
    }

    #[test]
    fn query_forms_are_recognized_on_the_raw_line() {
        assert_eq!(match_query("macros?"), Some(Query::ListMacros));
        assert_eq!(match_query("  macros?  "), Some(Query::ListMacros));
        assert_eq!(match_query("t?"), Some(Query::Doc("t".to_string())));
        assert_eq!(match_query("t ??"), Some(Query::Source("t".to_string())));
        assert_eq!(match_query("len(x)?"), Some(Query::Doc("len(x)".to_string())));
        assert_eq!(match_query("?"), None);
        assert_eq!(match_query("??"), None);
        assert_eq!(match_query("x = 1"), None);
    }

    #[test]
    fn macro_listing_is_sorted_by_alias() {
        let (mut pipeline, buffer, root) = session("listing");
        write_module(&root, "util", "macro twice(x): x + x\nmacro log(x): print(x)\n");
        run_unit(&mut pipeline, "from util import macros, twice as zz, log as aa");

        run_query(&Query::ListMacros, &mut pipeline).unwrap();
        assert_eq!(
            buffer.lines(),
            vec!["aa from util".to_string(), "zz from util".to_string()]
        );
    }

    #[test]
    fn empty_binding_table_lists_nothing() {
        let (mut pipeline, buffer, _) = session("empty-listing");
        run_query(&Query::ListMacros, &mut pipeline).unwrap();
        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn doc_query_prints_location_then_docstring() {
        let (mut pipeline, buffer, root) = session("doc");
        write_module(&root, "util", "## Doubles the argument.\nmacro twice(x): x + x\n");
        run_unit(&mut pipeline, "from util import macros, twice as t");

        run_query(&Query::Doc("t".to_string()), &mut pipeline).unwrap();
        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("util.mudra:1"));
        assert_eq!(lines[1], "Doubles the argument.");
    }

    #[test]
    fn undocumented_macros_say_so() {
        let (mut pipeline, buffer, root) = session("nodoc");
        write_module(&root, "util", "macro twice(x): x + x\n");
        run_unit(&mut pipeline, "from util import macros, twice");

        run_query(&Query::Doc("twice".to_string()), &mut pipeline).unwrap();
        assert_eq!(buffer.lines()[1], "<no docstring>");
    }

    #[test]
    fn source_query_prints_the_definition() {
        let (mut pipeline, buffer, root) = session("source");
        write_module(&root, "util", "offset = 1\nmacro twice(x): x + x\n");
        run_unit(&mut pipeline, "from util import macros, twice");

        run_query(&Query::Source("twice".to_string()), &mut pipeline).unwrap();
        let lines = buffer.lines();
        assert!(lines[0].ends_with("util.mudra:2"));
        assert_eq!(lines[1], "macro twice(x): x + x");
    }

    #[test]
    fn values_without_source_or_doc_fall_back() {
        let (mut pipeline, buffer, _) = session("fallback");
        run_unit(&mut pipeline, "x = 3");

        run_query(&Query::Doc("x".to_string()), &mut pipeline).unwrap();
        run_query(&Query::Source("x + 1".to_string()), &mut pipeline).unwrap();
        assert_eq!(
            buffer.lines(),
            vec![
                "<no docstring>".to_string(),
                "<no source code available>".to_string()
            ]
        );
    }

    #[test]
    fn builtin_doc_is_its_usage_line() {
        let (mut pipeline, buffer, _) = session("builtin");
        run_query(&Query::Doc("print".to_string()), &mut pipeline).unwrap();
        assert!(buffer.lines()[0].starts_with("print(values...)"));
    }

    #[test]
    fn query_over_an_undefined_name_errors() {
        let (mut pipeline, _, _) = session("undefined");
        assert!(run_query(&Query::Doc("ghost".to_string()), &mut pipeline).is_err());
    }
}
