//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mudra",
    version,
    about = "A macro-enabled interactive interpreter with live macro reloading"
)]
pub struct MudraArgs {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive session (the default when no command is given).
    Repl {
        /// Directory definition modules are loaded from.
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Package anchor for relative module references.
        #[arg(long)]
        anchor: Option<String>,
    },

    /// Run a program file through the macro pipeline.
    Run {
        /// Path to the program file.
        file: PathBuf,

        /// Directory definition modules are loaded from; defaults to the
        /// program's own directory.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Package anchor for relative module references.
        #[arg(long)]
        anchor: Option<String>,
    },

    /// Print a program with all macro calls expanded, without running it.
    Expand {
        /// Path to the program file.
        file: PathBuf,

        /// Directory definition modules are loaded from; defaults to the
        /// program's own directory.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Show every rewrite step as a colored diff before the result.
        #[arg(long)]
        trace: bool,

        /// Package anchor for relative module references.
        #[arg(long)]
        anchor: Option<String>,
    },
}

// ===== TESTS =====
