//! Reconstructs flag-conditional shader source from the compiled variants
//! stored in a material container.
//!
//! Every pass of a material holds one compiled shader per flag combination.
//! All of those variants came from a single source file whose preprocessor
//! conditionals were expanded at build time. This crate runs that process
//! backwards: variant bodies are diffed line by line, each line's presence
//! condition is turned into a boolean expression over synthesized macro
//! names, and the result is emitted as one source file with `#if` blocks
//! that reproduces every variant under its flags.
use thiserror::Error;

pub mod decompile;
pub mod extract;
pub mod minimize;
pub mod preprocess;
pub mod search;
pub mod varying;

mod diff;

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("no input variants to decompile")]
    Empty,

    #[error("variant sources disagree after merging: {0}")]
    Inconsistent(String),

    #[error("unbalanced braces near {0:?}")]
    UnbalancedBraces(String),
}
