//! Rendering for the `expand` command.

use std::io::Write;

use difference::{Changeset, Difference};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::expand::ExpansionStep;
use crate::syntax::StmtNode;

/// Print the expanded program, one statement per line, in canonical form.
pub fn print_program(unit: &[StmtNode]) {
    for stmt in unit {
        println!("{}", stmt.value.pretty());
    }
}

/// Render every rewrite step as a colored before/after diff on stdout.
pub fn print_expansion_trace(steps: &[ExpansionStep]) -> std::io::Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    for (index, step) in steps.iter().enumerate() {
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
        writeln!(stdout, "--- step {}: {} ---", index + 1, step.macro_name)?;
        stdout.reset()?;
        print_diff(&mut stdout, &step.before, &step.after)?;
    }
    if !steps.is_empty() {
        writeln!(stdout)?;
    }
    Ok(())
}

fn print_diff(stdout: &mut StandardStream, before: &str, after: &str) -> std::io::Result<()> {
    let changeset = Changeset::new(before, after, "\n");
    for diff in &changeset.diffs {
        match diff {
            Difference::Same(text) => {
                writeln!(stdout, "  {}", text)?;
            }
            Difference::Rem(text) => {
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
                writeln!(stdout, "- {}", text)?;
                stdout.reset()?;
            }
            Difference::Add(text) => {
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                writeln!(stdout, "+ {}", text)?;
                stdout.reset()?;
            }
        }
    }
    Ok(())
}
