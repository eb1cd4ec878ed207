//! Stack interpreter for POLIR instruction vectors.
//!
//! Execution state is a program counter, an operand stack of instruction
//! items, and the variable environment seeded from the symbol table (every
//! variable starts at zero). Operand items resolve lazily: a variable
//! reference is looked up only when an operator consumes it, so `write` can
//! still see the name and format the value by its declared type.

use std::collections::HashMap;
use std::io;

use thiserror::Error;

use crate::console::Console;
use crate::parser::{ParseArtifacts, VarType};
use crate::polir::{Item, Op, Polir};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("RUNTIME ERROR: divide by zero")]
    DivideByZero,
    #[error("RUNTIME ERROR: operand stack underflow")]
    StackUnderflow,
    #[error("RUNTIME ERROR: unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("RUNTIME ERROR: malformed instruction stream: {0}")]
    Malformed(&'static str),
    #[error("RUNTIME ERROR: console failure: {0}")]
    Console(#[from] io::Error),
}

pub type RunResult<T> = Result<T, RuntimeError>;

/// Runtime slot: declared type plus the integer payload. Booleans live as
/// 0/1 but keep their type so `write` can render `true`/`false`.
#[derive(Debug, Clone, Copy)]
pub struct Variable {
    pub ty: VarType,
    pub value: i64,
}

pub struct Interpreter<'p, 'c, C: Console> {
    code: &'p [Item],
    console: &'c mut C,
    vars: HashMap<String, Variable>,
    stack: Vec<Item>,
}

impl<'p, 'c, C: Console> Interpreter<'p, 'c, C> {
    pub fn new(artifacts: &ParseArtifacts, polir: &'p Polir, console: &'c mut C) -> Self {
        let vars = artifacts
            .symbols
            .iter()
            .map(|(name, ty)| (name.clone(), Variable { ty: *ty, value: 0 }))
            .collect();
        Self {
            code: &polir.items,
            console,
            vars,
            stack: Vec::new(),
        }
    }

    /// Executes the instruction vector to completion.
    pub fn run(&mut self) -> RunResult<()> {
        let mut pc = 0;
        while let Some(item) = self.code.get(pc) {
            match item {
                Item::Int(_) | Item::Bool(_) | Item::Var(_) | Item::Target(_) => {
                    self.stack.push(item.clone());
                    pc += 1;
                }
                Item::JumpIfFalse => {
                    let index = self.pop_address()?;
                    let condition = self.pop()?;
                    pc = if self.resolve_int(&condition)? == 0 {
                        index
                    } else {
                        pc + 1
                    };
                }
                Item::Jump => {
                    pc = self.pop_address()?;
                }
                Item::Op(op) => {
                    self.execute(*op)?;
                    pc += 1;
                }
            }
        }
        if !self.stack.is_empty() {
            log::debug!("RUNTIME: {} operand(s) left on the stack", self.stack.len());
        }
        log::debug!("POLIR: executing done, no errors");
        Ok(())
    }

    fn execute(&mut self, op: Op) -> RunResult<()> {
        match op {
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                let y = self.pop_int()?;
                let x = self.pop_int()?;
                let value = match op {
                    Op::Add => x + y,
                    Op::Sub => x - y,
                    Op::Mul => x * y,
                    _ => {
                        if y == 0 {
                            return Err(RuntimeError::DivideByZero);
                        }
                        x / y
                    }
                };
                self.stack.push(Item::Int(value));
            }
            Op::And | Op::Or => {
                let y = self.pop_bool()?;
                let x = self.pop_bool()?;
                let value = match op {
                    Op::And => x && y,
                    _ => x || y,
                };
                self.stack.push(Item::Int(value as i64));
            }
            Op::Not => {
                let x = self.pop_bool()?;
                self.stack.push(Item::Int(!x as i64));
            }
            Op::Negate => {
                let x = self.pop_int()?;
                self.stack.push(Item::Int(-x));
            }
            Op::Less
            | Op::LessEqual
            | Op::Greater
            | Op::GreaterEqual
            | Op::Equal
            | Op::NotEqual => {
                let y = self.pop_int()?;
                let x = self.pop_int()?;
                let value = match op {
                    Op::Less => x < y,
                    Op::LessEqual => x <= y,
                    Op::Greater => x > y,
                    Op::GreaterEqual => x >= y,
                    Op::Equal => x == y,
                    _ => x != y,
                };
                self.stack.push(Item::Int(value as i64));
            }
            Op::Assign => {
                let value_item = self.pop()?;
                let value = self.resolve_int(&value_item)?;
                let name = self.pop_variable_name()?;
                let slot = self
                    .vars
                    .get_mut(&name)
                    .ok_or_else(|| RuntimeError::UnknownVariable(name.clone()))?;
                slot.value = value;
            }
            Op::Read => {
                let name = self.pop_variable_name()?;
                log::debug!("read: enter {name}:");
                let line = self.console.read_line()?.trim().to_lowercase();
                let slot = self
                    .vars
                    .get_mut(&name)
                    .ok_or_else(|| RuntimeError::UnknownVariable(name.clone()))?;
                slot.value = match slot.ty {
                    VarType::Bool => i64::from(line != "false" && line != "0"),
                    VarType::Int => match line.parse::<i64>() {
                        Ok(value) => value,
                        Err(_) => {
                            log::warn!(
                                "RUNTIME WARNING: '{line}' is not a number, storing 0 in {name}"
                            );
                            0
                        }
                    },
                };
            }
            Op::Write => {
                let item = self.pop()?;
                let text = match &item {
                    Item::Var(name) => {
                        let slot = self
                            .vars
                            .get(name)
                            .ok_or_else(|| RuntimeError::UnknownVariable(name.clone()))?;
                        match slot.ty {
                            VarType::Bool => {
                                if slot.value != 0 {
                                    "true".to_string()
                                } else {
                                    "false".to_string()
                                }
                            }
                            VarType::Int => slot.value.to_string(),
                        }
                    }
                    other => other.to_string(),
                };
                self.console.write_line(&format!("write: {text}"))?;
            }
        }
        Ok(())
    }

    fn pop(&mut self) -> RunResult<Item> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn pop_int(&mut self) -> RunResult<i64> {
        let item = self.pop()?;
        self.resolve_int(&item)
    }

    fn pop_bool(&mut self) -> RunResult<bool> {
        let item = self.pop()?;
        Ok(self.resolve_int(&item)? != 0)
    }

    fn pop_address(&mut self) -> RunResult<usize> {
        match self.pop()? {
            Item::Target(index) => Ok(index),
            Item::Int(value) if value >= 0 => Ok(value as usize),
            _ => Err(RuntimeError::Malformed("jump needs an address operand")),
        }
    }

    fn pop_variable_name(&mut self) -> RunResult<String> {
        match self.pop()? {
            Item::Var(name) => Ok(name),
            _ => Err(RuntimeError::Malformed("expected a variable operand")),
        }
    }

    /// Integer value of an operand; booleans coerce to 0/1, variables read
    /// the environment.
    fn resolve_int(&self, item: &Item) -> RunResult<i64> {
        match item {
            Item::Int(value) => Ok(*value),
            Item::Bool(value) => Ok(i64::from(*value)),
            Item::Var(name) => self
                .vars
                .get(name)
                .map(|slot| slot.value)
                .ok_or_else(|| RuntimeError::UnknownVariable(name.clone())),
            Item::Target(index) => Ok(*index as i64),
            Item::Op(_) | Item::JumpIfFalse | Item::Jump => {
                Err(RuntimeError::Malformed("operator used as operand"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::console::BufferedConsole;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::polir::Generator;
    use crate::vocab::Vocabulary;

    fn run(source: &str, inputs: &[&str]) -> (RunResult<()>, Vec<String>, usize) {
        let vocab = Vocabulary::default();
        let mut stream = Lexer::new(&vocab)
            .tokenize(source)
            .expect("tokenize should succeed");
        let artifacts = Parser::new(&vocab, &mut stream)
            .parse()
            .expect("parse should succeed");
        let polir = Generator::new(&mut stream).generate();

        let mut console = BufferedConsole::with_inputs(inputs.iter().copied());
        let mut interp = Interpreter::new(&artifacts, &polir, &mut console);
        let result = interp.run();
        let depth = interp.stack.len();
        (result, console.output().to_vec(), depth)
    }

    fn output_of(source: &str) -> Vec<String> {
        let (result, output, depth) = run(source, &[]);
        result.expect("program should run");
        assert_eq!(depth, 0, "operand stack should drain");
        output
    }

    #[test]
    fn evaluates_arithmetic() {
        let output = output_of("program var x : int; begin x := 2 + 3 * 4; write(x) end.");
        assert_eq!(output, vec!["write: 14"]);
    }

    #[test]
    fn evaluates_boolean_and_compare() {
        let output =
            output_of("program var b : bool; begin b := (2 < 3) and true; write(b) end.");
        assert_eq!(output, vec!["write: true"]);
    }

    #[test]
    fn takes_then_branch() {
        let output = output_of(
            "program var x : int; begin x := 5; if x > 0 then write(x) else write(0) end.",
        );
        assert_eq!(output, vec!["write: 5"]);
    }

    #[test]
    fn takes_else_branch() {
        let output = output_of(
            "program var x : int; begin x := un 5; if x > 0 then write(x) else write(0) end.",
        );
        assert_eq!(output, vec!["write: 0"]);
    }

    #[test]
    fn do_loop_runs_until_condition_fails() {
        let output = output_of(
            "program var i : int; begin i := 3; do i := i - 1 while i > 0; write(i) end.",
        );
        assert_eq!(output, vec!["write: 0"]);
    }

    #[test]
    fn do_loop_body_executes_at_least_once() {
        let output = output_of(
            "program var i : int; begin i := 0; do i := i + 7 while i < 0; write(i) end.",
        );
        assert_eq!(output, vec!["write: 7"]);
    }

    #[test]
    fn subtraction_associates_left_at_runtime() {
        let output = output_of("program var x : int; begin x := 10 - 3 - 2; write(x) end.");
        assert_eq!(output, vec!["write: 5"]);
    }

    #[test]
    fn copies_variable_to_variable() {
        let output = output_of(
            "program var x, y : int; begin x := 9; y := x; write(y) end.",
        );
        assert_eq!(output, vec!["write: 9"]);
    }

    #[test]
    fn repeated_unary_operators_cancel() {
        let output = output_of(indoc! {"
            program var x : int; b : bool;
            begin
                x := un un 5;
                b := not not true;
                write(x);
                write(b)
            end.
        "});
        assert_eq!(output, vec!["write: 5", "write: true"]);
    }

    #[test]
    fn bool_variable_renders_true_false() {
        let output = output_of(
            "program var b : bool; begin b := false; write(b); b := not b; write(b) end.",
        );
        assert_eq!(output, vec!["write: false", "write: true"]);
    }

    #[test]
    fn computed_comparison_writes_raw_integer() {
        // Only variables carry a declared type; a bare comparison result
        // prints as 0/1.
        let output = output_of("program var x : int; begin x := 1; write(x < 2) end.");
        assert_eq!(output, vec!["write: 1"]);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let (result, _, _) = run(
            "program var x, y : int; begin x := 1; y := 0; write(x / y) end.",
            &[],
        );
        assert!(matches!(result, Err(RuntimeError::DivideByZero)));
    }

    #[test]
    fn reads_integer_from_console() {
        let (result, output, _) = run(
            "program var x : int; begin read(x); write(x + 1) end.",
            &["41"],
        );
        result.expect("program should run");
        assert_eq!(output, vec!["write: 42"]);
    }

    #[test]
    fn read_accepts_boolean_spellings() {
        let (result, output, _) = run(
            indoc! {"
                program var a, b, c : bool;
                begin
                    read(a);
                    read(b);
                    read(c);
                    write(a);
                    write(b);
                    write(c)
                end.
            "},
            &["false", "0", "yes"],
        );
        result.expect("program should run");
        assert_eq!(output, vec!["write: false", "write: false", "write: true"]);
    }

    #[test]
    fn read_tolerates_non_numeric_input() {
        let (result, output, _) = run(
            "program var x : int; begin read(x); write(x) end.",
            &["not a number"],
        );
        result.expect("program should run");
        assert_eq!(output, vec!["write: 0"]);
    }

    #[test]
    fn empty_block_produces_no_output() {
        let output = output_of("program var x : int; begin end.");
        assert!(output.is_empty());
    }

    #[test]
    fn nested_blocks_and_conditionals() {
        let output = output_of(indoc! {"
            program var i, total : int;
            begin
                total := 0;
                i := 4;
                do begin
                    if i > 2 then total := total + i else total := total + 1;
                    i := i - 1
                end while i > 0;
                write(total)
            end.
        "});
        // 4 + 3 + 1 + 1
        assert_eq!(output, vec!["write: 9"]);
    }
}
