//! Shared fixtures for the integration suites: a throwaway module root on
//! disk and a pipeline wired to an in-memory output buffer.

use std::fs;
use std::path::{Path, PathBuf};

use mudra::pipeline::{ProcessOutcome, ReplPipeline};
use mudra::runtime::output::{OutputBuffer, SharedOutput};
use mudra::MudraError;

/// Create a unique scratch directory for one test's definition modules.
pub fn temp_root(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mudra-it-{}-{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_module(root: &Path, name: &str, text: &str) {
    fs::write(root.join(format!("{}.mudra", name)), text).unwrap();
}

/// A fresh interactive session over `root`, capturing output in a buffer.
pub fn session(root: &Path) -> (ReplPipeline, OutputBuffer) {
    let buffer = OutputBuffer::new();
    let pipeline = ReplPipeline::with_disk_registry(root, None, SharedOutput::new(buffer.clone()));
    (pipeline, buffer)
}

/// Drive one unit the way the session driver does: process it, then run the
/// post-execution hook. Panics unless the unit executed cleanly.
pub fn execute(pipeline: &mut ReplPipeline, text: &str) {
    match pipeline.process(text) {
        ProcessOutcome::Executed { error: None } => pipeline.on_post_execute(),
        other => panic!("expected clean execution of {:?}, got {:?}", text, other),
    }
}

/// Drive one unit expecting a runtime failure; the unit still counts as
/// executed, so the post-execution hook runs.
pub fn execute_failing(pipeline: &mut ReplPipeline, text: &str) -> MudraError {
    match pipeline.process(text) {
        ProcessOutcome::Executed { error: Some(error) } => {
            pipeline.on_post_execute();
            error
        }
        other => panic!("expected a runtime failure in {:?}, got {:?}", text, other),
    }
}

/// Drive one unit expecting rejection before execution.
pub fn reject(pipeline: &mut ReplPipeline, text: &str) -> MudraError {
    match pipeline.process(text) {
        ProcessOutcome::Rejected(error) => error,
        other => panic!("expected rejection of {:?}, got {:?}", text, other),
    }
}
