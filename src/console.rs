//! Console seam between the interpreter and the outside world.
//!
//! `read`/`write` go through the [`Console`] trait so tests can script input
//! and capture output. Rust's standard streams speak UTF-8 natively on every
//! supported platform, so no encoding wrapper sits between the trait and the
//! terminal.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

pub trait Console {
    /// Blocks for one line of user input, without the trailing newline.
    fn read_line(&mut self) -> io::Result<String>;
    /// Emits one line of program output.
    fn write_line(&mut self, text: &str) -> io::Result<()>;
}

/// Interactive console over stdin/stdout.
#[derive(Debug, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{text}")?;
        stdout.flush()
    }
}

/// Scripted console: hands out queued input lines and collects output.
/// An exhausted input queue yields empty lines.
#[derive(Debug, Default)]
pub struct BufferedConsole {
    inputs: VecDeque<String>,
    output: Vec<String>,
}

impl BufferedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs<I>(inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: Vec::new(),
        }
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }
}

impl Console for BufferedConsole {
    fn read_line(&mut self) -> io::Result<String> {
        Ok(self.inputs.pop_front().unwrap_or_default())
    }

    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.output.push(text.to_string());
        Ok(())
    }
}
