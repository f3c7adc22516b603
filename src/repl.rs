//! The interactive session driver.
//!
//! Owns the read loop: prompts, multi-line continuation, queries, session
//! commands, and error display. Each complete buffer goes through the unit
//! pipeline; the driver itself never terminates on user errors, only on
//! end of input or `:quit`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use atty::Stream;

use crate::errors::{print_error, ErrorCategory, MudraError};
use crate::inspect;
use crate::pipeline::{ProcessOutcome, ReplPipeline};
use crate::runtime::output::{SharedOutput, StdoutSink};

pub const PROMPT: &str = "mudra> ";
pub const CONTINUATION_PROMPT: &str = "   ... ";

pub struct ReplConfig {
    pub root: PathBuf,
    pub anchor: Option<String>,
}

/// What one read attempt produced.
#[derive(Debug)]
pub enum ReadResult {
    Line(String),
    Eof,
    Interrupted,
}

/// Where session input comes from. The session logic is written against
/// this seam so it can run on scripted input in tests.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult>;
}

/// Plain standard input. Prompts are printed only when stdin is a
/// terminal, so piped sessions produce clean output.
pub struct StdinSource {
    interactive: bool,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            interactive: atty::is(Stream::Stdin),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSource for StdinSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult> {
        if self.interactive {
            print!("{}", prompt);
            io::stdout().flush()?;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => Ok(ReadResult::Eof),
            Ok(_) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(ReadResult::Line(line))
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadResult::Interrupted),
            Err(e) => Err(e),
        }
    }
}

/// Start an interactive session on standard input.
pub fn run_repl(config: &ReplConfig) -> io::Result<()> {
    let mut lines = StdinSource::new();
    let interactive = lines.is_interactive();
    let output = SharedOutput::new(StdoutSink);
    run_session(config, &mut lines, output, interactive)
}

/// The session loop proper, on an arbitrary line source.
pub fn run_session(
    config: &ReplConfig,
    lines: &mut dyn LineSource,
    output: SharedOutput,
    interactive: bool,
) -> io::Result<()> {
    let mut pipeline =
        ReplPipeline::with_disk_registry(&config.root, config.anchor.clone(), output.clone());

    if interactive {
        output.emit(&format!(
            "Mudra {} -- macro-enabled interactive session.",
            env!("CARGO_PKG_VERSION")
        ));
        output.emit("Use 'name?' for docs, 'name??' for source, 'macros?' for bindings, :help for commands.");
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };
        match lines.read_line(prompt)? {
            ReadResult::Eof => {
                if interactive {
                    output.emit("\nGoodbye!");
                }
                return Ok(());
            }
            ReadResult::Interrupted => {
                buffer.clear();
                continue;
            }
            ReadResult::Line(line) => {
                if buffer.is_empty() {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some(command) = trimmed.strip_prefix(':') {
                        match handle_command(command, &mut pipeline, config, &output) {
                            CommandOutcome::Continue => continue,
                            CommandOutcome::Quit => return Ok(()),
                        }
                    }
                    if let Some(query) = inspect::match_query(&line) {
                        if let Err(error) = inspect::run_query(&query, &mut pipeline) {
                            report(error);
                        }
                        continue;
                    }
                } else if line.trim().is_empty() {
                    // An empty line closes an unfinished unit instead of
                    // growing it forever.
                    let text = std::mem::take(&mut buffer);
                    let outcome = pipeline.process_final(&text);
                    dispatch(&mut pipeline, outcome);
                    continue;
                }

                buffer.push_str(&line);
                buffer.push('\n');
                match pipeline.process(&buffer) {
                    ProcessOutcome::NeedMoreInput => {}
                    outcome => {
                        buffer.clear();
                        dispatch(&mut pipeline, outcome);
                    }
                }
            }
        }
    }
}

fn dispatch(pipeline: &mut ReplPipeline, outcome: ProcessOutcome) {
    match outcome {
        ProcessOutcome::NeedMoreInput => {}
        ProcessOutcome::Rejected(error) => report(error),
        ProcessOutcome::Executed { error } => {
            if let Some(error) = error {
                report(error);
            }
            pipeline.on_post_execute();
        }
    }
}

/// Import errors are workflow, not surprises: one line. Everything else
/// gets the full diagnostic rendering.
fn report(error: MudraError) {
    match error.kind.category() {
        ErrorCategory::Binding => eprintln!("{}", error),
        _ => print_error(error),
    }
}

enum CommandOutcome {
    Continue,
    Quit,
}

fn handle_command(
    command: &str,
    pipeline: &mut ReplPipeline,
    config: &ReplConfig,
    output: &SharedOutput,
) -> CommandOutcome {
    match command.trim() {
        "help" | "h" => {
            output.emit(":help        show this help");
            output.emit(":clear       reset the session (bindings, namespace, loaded modules)");
            output.emit(":quit        leave the session");
            output.emit("name?        print a macro's location and docstring");
            output.emit("name??       print a macro's location and source");
            output.emit("macros?      list current macro bindings");
            CommandOutcome::Continue
        }
        "quit" | "q" => CommandOutcome::Quit,
        "clear" | "c" => {
            *pipeline = ReplPipeline::with_disk_registry(
                &config.root,
                config.anchor.clone(),
                output.clone(),
            );
            output.emit("Session cleared.");
            CommandOutcome::Continue
        }
        other => {
            output.emit(&format!("Unknown command ':{}'. Type :help for the list.", other));
            CommandOutcome::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::output::OutputBuffer;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::Path;

    struct ScriptedSource {
        script: VecDeque<ReadResult>,
        prompts: Vec<String>,
    }

    impl ScriptedSource {
        fn new(script: Vec<ReadResult>) -> Self {
            Self {
                script: script.into(),
                prompts: Vec::new(),
            }
        }

        fn lines(script: &[&str]) -> Self {
            Self::new(
                script
                    .iter()
                    .map(|s| ReadResult::Line(s.to_string()))
                    .collect(),
            )
        }
    }

    impl LineSource for ScriptedSource {
        fn read_line(&mut self, prompt: &str) -> io::Result<ReadResult> {
            self.prompts.push(prompt.to_string());
            Ok(self.script.pop_front().unwrap_or(ReadResult::Eof))
        }
    }

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mudra-repl-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_module(root: &Path, name: &str, text: &str) {
        fs::write(root.join(format!("{}.mudra", name)), text).unwrap();
    }

    fn run(tag: &str, source: &mut ScriptedSource, interactive: bool) -> Vec<String> {
        let config = ReplConfig {
            root: temp_root(tag),
            anchor: None,
        };
        let buffer = OutputBuffer::new();
        run_session(
            &config,
            source,
            SharedOutput::new(buffer.clone()),
            interactive,
        )
        .unwrap();
        buffer.lines()
    }

    #[test]
    fn lines_execute_and_echo_without_a_banner_when_piped() {
        let mut source = ScriptedSource::lines(&["1 + 1"]);
        let lines = run("echo", &mut source, false);
        assert_eq!(lines, vec!["2".to_string()]);
    }

    #[test]
    fn banner_and_farewell_appear_when_interactive() {
        let mut source = ScriptedSource::new(Vec::new());
        let lines = run("banner", &mut source, true);
        assert!(lines[0].starts_with("Mudra "));
        assert!(lines.last().unwrap().contains("Goodbye!"));
    }

    #[test]
    fn continuation_prompt_appears_until_the_unit_closes() {
        let mut source = ScriptedSource::lines(&["print(1,", "2)"]);
        let lines = run("continuation", &mut source, false);
        assert_eq!(lines, vec!["1 2".to_string()]);
        assert_eq!(
            source.prompts,
            vec![
                PROMPT.to_string(),
                CONTINUATION_PROMPT.to_string(),
                PROMPT.to_string(),
            ]
        );
    }

    #[test]
    fn empty_line_abandons_an_unfinished_unit() {
        let mut source = ScriptedSource::lines(&["print(1,", "", "print(7)"]);
        let lines = run("abandon", &mut source, false);
        assert_eq!(lines, vec!["7".to_string()]);
    }

    #[test]
    fn interrupt_clears_the_buffer_and_keeps_the_session() {
        let mut source = ScriptedSource::new(vec![
            ReadResult::Line("print(1,".to_string()),
            ReadResult::Interrupted,
            ReadResult::Line("print(2)".to_string()),
        ]);
        let lines = run("interrupt", &mut source, false);
        assert_eq!(lines, vec!["2".to_string()]);
    }

    #[test]
    fn user_errors_do_not_end_the_session() {
        let mut source = ScriptedSource::lines(&["1 / 0", "boom", "1 +)", "print(\"alive\")"]);
        let lines = run("resilient", &mut source, false);
        assert_eq!(lines, vec!["alive".to_string()]);
    }

    #[test]
    fn quit_ends_the_session_early() {
        let mut source = ScriptedSource::lines(&[":quit", "print(9)"]);
        let lines = run("quit", &mut source, false);
        assert!(lines.is_empty());
    }

    #[test]
    fn clear_resets_bindings_and_namespace() {
        let mut source = ScriptedSource::lines(&["x = 4", ":clear", "x"]);
        let lines = run("clear", &mut source, false);
        assert_eq!(lines, vec!["Session cleared.".to_string()]);
    }

    #[test]
    fn help_lists_the_commands() {
        let mut source = ScriptedSource::lines(&[":help"]);
        let lines = run("help", &mut source, false);
        assert!(lines.iter().any(|l| l.contains(":clear")));
    }

    #[test]
    fn unknown_commands_are_reported_inline() {
        let mut source = ScriptedSource::lines(&[":frobnicate"]);
        let lines = run("unknown", &mut source, false);
        assert!(lines[0].contains(":frobnicate"));
    }

    #[test]
    fn queries_work_at_a_fresh_prompt() {
        let root = temp_root("query");
        write_module(&root, "util", "## Doubles.\nmacro twice(x): x + x\n");
        let config = ReplConfig { root, anchor: None };
        let buffer = OutputBuffer::new();
        let mut source =
            ScriptedSource::lines(&["from util import macros, twice", "twice?", "macros?"]);
        run_session(
            &config,
            &mut source,
            SharedOutput::new(buffer.clone()),
            false,
        )
        .unwrap();
        let lines = buffer.lines();
        assert!(lines[0].ends_with("util.mudra:1"));
        assert_eq!(lines[1], "Doubles.");
        assert_eq!(lines[2], "twice from util");
    }
}
