//! Pipeline-level error type.
//!
//! Stage errors bubble up unchanged; the driver translates them into process
//! exit codes at the very top, so no stage ever touches process lifetime.

use thiserror::Error;

use crate::interp::RuntimeError;
use crate::lexer::LexError;
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl PipelineError {
    /// Exit code contract: 1 lexical/syntax, 2 semantic, 3 runtime.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Lex(_) | PipelineError::Parse(ParseError::Syntax { .. }) => 1,
            PipelineError::Parse(ParseError::Semantic { .. }) => 2,
            PipelineError::Runtime(_) => 3,
        }
    }
}
