pub use crate::errors::{ErrorKind, ErrorReporting, MudraError, SourceContext};

pub mod bindings;
pub mod cli;
pub mod detect;
pub mod errors;
pub mod expand;
pub mod inspect;
pub mod modules;
pub mod pipeline;
pub mod repl;
pub mod runtime;
pub mod stubs;
pub mod syntax;
