//! Command-line entry point: dispatches `repl`, `run`, and `expand`.

pub mod args;
pub mod output;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use crate::errors::{
    print_error, unspanned, ErrorKind, ErrorReporting, MudraError, ReportContext, SourceContext,
};
use crate::pipeline::ReplPipeline;
use crate::repl::{run_repl, ReplConfig};
use crate::runtime::output::{SharedOutput, StdoutSink};

use args::{Command, MudraArgs};

#[derive(Debug)]
enum CliError {
    Io(std::io::Error),
    Mudra(MudraError),
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        CliError::Io(error)
    }
}

impl From<MudraError> for CliError {
    fn from(error: MudraError) -> Self {
        CliError::Mudra(error)
    }
}

impl CliError {
    fn render(self) {
        match self {
            CliError::Io(error) => eprintln!("Error: {}", error),
            CliError::Mudra(error) => print_error(error),
        }
    }
}

/// Parse arguments and run the selected command. Exits the process with
/// status 1 on failure.
pub fn run() {
    let args = MudraArgs::parse();
    let command = args.command.unwrap_or(Command::Repl {
        root: PathBuf::from("."),
        anchor: None,
    });

    if let Err(error) = dispatch(command) {
        error.render();
        process::exit(1);
    }
}

fn dispatch(command: Command) -> Result<(), CliError> {
    match command {
        Command::Repl { root, anchor } => {
            run_repl(&ReplConfig { root, anchor })?;
            Ok(())
        }
        Command::Run { file, root, anchor } => run_file(&file, root, anchor),
        Command::Expand {
            file,
            root,
            trace,
            anchor,
        } => expand_file(&file, root, anchor, trace),
    }
}

fn run_file(file: &Path, root: Option<PathBuf>, anchor: Option<String>) -> Result<(), CliError> {
    let source_text = read_program(file)?;
    let root = root.unwrap_or_else(|| default_root(file));
    let mut pipeline =
        ReplPipeline::with_disk_registry(root, anchor, SharedOutput::new(StdoutSink));
    pipeline.run_program(&source_text, &file.display().to_string())?;
    Ok(())
}

fn expand_file(
    file: &Path,
    root: Option<PathBuf>,
    anchor: Option<String>,
    trace: bool,
) -> Result<(), CliError> {
    let source_text = read_program(file)?;
    let root = root.unwrap_or_else(|| default_root(file));
    let mut pipeline =
        ReplPipeline::with_disk_registry(root, anchor, SharedOutput::new(StdoutSink));
    let expansion = pipeline.expand_program(&source_text, &file.display().to_string())?;
    if trace {
        output::print_expansion_trace(&expansion.trace)?;
    }
    output::print_program(&expansion.unit);
    Ok(())
}

fn read_program(file: &Path) -> Result<String, CliError> {
    fs::read_to_string(file).map_err(|error| {
        let report = ReportContext::new(
            SourceContext::fallback(&file.display().to_string()),
            "cli",
        );
        CliError::Mudra(report.report(
            ErrorKind::ReadFailed {
                path: file.display().to_string(),
                detail: error.to_string(),
            },
            unspanned(),
        ))
    })
}

/// Programs resolve module references against their own directory unless
/// an explicit root is given.
fn default_root(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

// ===== TESTS =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_root_is_the_program_directory() {
        assert_eq!(
            default_root(Path::new("demos/app/main.mudra")),
            PathBuf::from("demos/app")
        );
    }

    #[test]
    fn bare_filenames_resolve_against_the_current_directory() {
        assert_eq!(default_root(Path::new("main.mudra")), PathBuf::from("."));
    }

    #[test]
    fn unreadable_programs_report_the_path() {
        let error = match read_program(Path::new("/nonexistent/prog.mudra")) {
            Err(CliError::Mudra(error)) => error,
            other => panic!("expected a read failure, got {:?}", other),
        };
        assert!(error.to_string().contains("/nonexistent/prog.mudra"));
    }
}
