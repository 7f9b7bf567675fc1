//! Command-line surface: the interactive REPL and diagnostics.

pub mod doctor;
pub mod repl;
