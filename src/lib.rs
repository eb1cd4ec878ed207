//! `minipascal` library crate: an interpreter for a small Pascal-like
//! language with integer and boolean variables.
//!
//! High-level layout, a strict pipeline:
//! - `lexer` tokenizes source against the configurable `vocab` tables
//! - `parser` checks grammar and types and publishes `ParseArtifacts`
//! - `polir` re-scans the tokens into a postfix instruction vector
//! - `interp` executes that vector on an operand stack, talking to the
//!   outside world through the `console` seam

pub mod console;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod polir;
pub mod token;
pub mod vocab;

pub use error::PipelineError;

use console::Console;
use vocab::Vocabulary;

/// Runs a source text through the whole pipeline with the given console.
pub fn run_source(
    source: &str,
    vocab: &Vocabulary,
    console: &mut impl Console,
) -> Result<(), PipelineError> {
    let mut stream = lexer::Lexer::new(vocab).tokenize(source)?;
    let artifacts = parser::Parser::new(vocab, &mut stream).parse()?;
    let polir = polir::Generator::new(&mut stream).generate();
    interp::Interpreter::new(&artifacts, &polir, console).run()?;
    Ok(())
}
