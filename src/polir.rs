//! Translation of a validated program into POLIR, a linear postfix
//! instruction stream executed by the stack interpreter.
//!
//! The generator re-scans the token stream from the beginning; syntax and
//! types were already checked by the parser, so this pass has no failure
//! modes of its own. Expressions go through Dijkstra's shunting-yard with the
//! precedence table below; structured statements become jump opcodes whose
//! forward targets are reserved as placeholder cells and back-patched once
//! the destination index is known.

use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::lexer::TokenStream;
use crate::token::{Token, TokenKind};
use crate::vocab;

/// Operator instructions. `Negate` is the unary minus spelled `un` in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Not,
    Negate,
    Assign,
    Read,
    Write,
}

impl Op {
    pub fn lexeme(self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Less => "<",
            Op::LessEqual => "<=",
            Op::Greater => ">",
            Op::GreaterEqual => ">=",
            Op::Equal => "=",
            Op::NotEqual => "<>",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
            Op::Negate => "un",
            Op::Assign => ":=",
            Op::Read => "read",
            Op::Write => "write",
        }
    }

    /// Binding strength for the shunting-yard pass; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Op::Negate => 9,
            Op::Mul | Op::Div => 8,
            Op::Add | Op::Sub => 7,
            Op::Less
            | Op::LessEqual
            | Op::Greater
            | Op::GreaterEqual
            | Op::Equal
            | Op::NotEqual => 6,
            Op::Not => 5,
            Op::And => 4,
            Op::Or => 3,
            Op::Assign => 2,
            // Statement operators never enter the operator stack.
            Op::Read | Op::Write => 0,
        }
    }

    fn is_unary(self) -> bool {
        matches!(self, Op::Not | Op::Negate)
    }
}

/// One cell of the instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// Integer literal operand.
    Int(i64),
    /// Boolean literal operand.
    Bool(bool),
    /// Variable reference operand, resolved through the environment.
    Var(String),
    Op(Op),
    /// Jump address operand: an index into the stream.
    Target(usize),
    /// Pop index, pop condition; jump when the condition is false.
    JumpIfFalse,
    /// Pop index; jump unconditionally.
    Jump,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Int(value) => write!(f, "{value}"),
            Item::Bool(true) => write!(f, "true"),
            Item::Bool(false) => write!(f, "false"),
            Item::Var(name) => write!(f, "{name}"),
            Item::Op(op) => write!(f, "{}", op.lexeme()),
            Item::Target(index) => write!(f, "{index}"),
            Item::JumpIfFalse => write!(f, "!F"),
            Item::Jump => write!(f, "!"),
        }
    }
}

/// Finished postfix program.
#[derive(Debug)]
pub struct Polir {
    pub items: Vec<Item>,
    /// Count of `if`/`do` conditions that referenced no variable.
    pub constant_condition_warnings: usize,
}

impl Polir {
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(Item::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Dumps the instruction stream, tokens separated by single spaces.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let mut text = self.render();
        text.push('\n');
        fs::write(path, text)
            .with_context(|| format!("Writing POLIR dump {}", path.display()))
    }
}

/// Operator-stack entry: a pending operator or an open parenthesis acting as
/// a barrier.
enum StackOp {
    Paren,
    Op(Op),
}

pub struct Generator<'s> {
    stream: &'s mut TokenStream,
    current: Option<Token>,
    code: Vec<Item>,
    warnings: usize,
}

impl<'s> Generator<'s> {
    pub fn new(stream: &'s mut TokenStream) -> Self {
        Self {
            stream,
            current: None,
            code: Vec::new(),
            warnings: 0,
        }
    }

    /// Rewinds the stream, skips the declaration section and translates the
    /// statement part into postfix.
    pub fn generate(mut self) -> Polir {
        self.stream.rewind();
        self.advance();
        while self.current.is_some() && !self.at_keyword(vocab::KW_BEGIN) {
            self.advance();
        }
        self.convert_statement();

        let polir = Polir {
            items: self.code,
            constant_condition_warnings: self.warnings,
        };
        log::debug!("POLIR: conversion done, no errors");
        log::debug!("POLIR: {}", polir.render());
        polir
    }

    /// Translates one statement. On return the cursor rests on the token
    /// that terminated the statement (`;`, `else`, `end`, `while` or `.`).
    fn convert_statement(&mut self) {
        let Some(token) = self.current.clone() else {
            return;
        };
        match &token.kind {
            TokenKind::Keyword(vocab::KW_IF) => {
                self.advance();
                if !self.convert_expression() {
                    self.warn_constant_condition("if", token.line);
                }
                let false_cell = self.reserve_target();
                self.code.push(Item::JumpIfFalse);
                // Cursor sits on `then`.
                self.advance();
                self.convert_statement();
                if self.at_keyword(vocab::KW_ELSE) {
                    let end_cell = self.reserve_target();
                    self.code.push(Item::Jump);
                    self.patch_target(false_cell);
                    self.advance();
                    self.convert_statement();
                    self.patch_target(end_cell);
                } else {
                    self.patch_target(false_cell);
                }
            }
            TokenKind::Keyword(vocab::KW_DO) => {
                self.advance();
                let loop_start = self.code.len();
                self.convert_statement();
                // Cursor sits on `while`.
                self.advance();
                if !self.convert_expression() {
                    self.warn_constant_condition("do", token.line);
                }
                self.code.push(Item::Op(Op::Not));
                self.code.push(Item::Target(loop_start));
                self.code.push(Item::JumpIfFalse);
            }
            TokenKind::Keyword(vocab::KW_READ) => {
                self.advance(); // (
                self.advance();
                if let Some(TokenKind::Ident(name)) = self.current.as_ref().map(|t| &t.kind) {
                    self.code.push(Item::Var(name.clone()));
                }
                self.advance(); // )
                self.advance();
                self.code.push(Item::Op(Op::Read));
            }
            TokenKind::Keyword(vocab::KW_WRITE) => {
                self.advance();
                // The argument parentheses balance inside the expression.
                self.convert_expression();
                self.code.push(Item::Op(Op::Write));
            }
            TokenKind::Keyword(vocab::KW_BEGIN) => {
                self.advance();
                while self.current.is_some() && !self.at_keyword(vocab::KW_END) {
                    if self.at_delim(vocab::DELIM_SEMICOLON) {
                        self.advance();
                        continue;
                    }
                    self.convert_statement();
                }
                self.advance();
            }
            _ => {
                // Assignment or bare expression; `:=` is an ordinary
                // operator with the lowest precedence.
                self.convert_expression();
            }
        }
    }

    /// Shunting-yard over the cursor up to the statement terminator, which is
    /// left as the current token. Returns true when the expression
    /// referenced at least one variable.
    fn convert_expression(&mut self) -> bool {
        let mut ops: Vec<StackOp> = Vec::new();
        let mut saw_variable = false;

        while let Some(token) = self.current.clone() {
            if is_terminator(&token) {
                break;
            }
            match &token.kind {
                TokenKind::Number(value) => self.code.push(Item::Int(*value)),
                TokenKind::Keyword(vocab::KW_TRUE) => self.code.push(Item::Bool(true)),
                TokenKind::Keyword(vocab::KW_FALSE) => self.code.push(Item::Bool(false)),
                TokenKind::Ident(name) => {
                    saw_variable = true;
                    self.code.push(Item::Var(name.clone()));
                }
                TokenKind::Delim(vocab::DELIM_LPAREN) => ops.push(StackOp::Paren),
                TokenKind::Delim(vocab::DELIM_RPAREN) => {
                    while let Some(top) = ops.pop() {
                        match top {
                            StackOp::Paren => break,
                            StackOp::Op(op) => self.code.push(Item::Op(op)),
                        }
                    }
                }
                _ => {
                    if let Some(op) = operator_for(&token) {
                        // Unary operators nest right-to-left, so an equal-
                        // precedence run stays on the stack; binary operators
                        // pop equal precedence and associate left.
                        while let Some(StackOp::Op(top)) = ops.last() {
                            let pop = if op.is_unary() {
                                top.precedence() > op.precedence()
                            } else {
                                top.precedence() >= op.precedence()
                            };
                            if !pop {
                                break;
                            }
                            self.code.push(Item::Op(*top));
                            ops.pop();
                        }
                        ops.push(StackOp::Op(op));
                    }
                }
            }
            self.advance();
        }

        while let Some(top) = ops.pop() {
            if let StackOp::Op(op) = top {
                self.code.push(Item::Op(op));
            }
        }
        saw_variable
    }

    /// Reserves a jump-target cell and returns its index for back-patching.
    fn reserve_target(&mut self) -> usize {
        self.code.push(Item::Target(usize::MAX));
        self.code.len() - 1
    }

    /// Overwrites a reserved cell with the current stream position.
    fn patch_target(&mut self, cell: usize) {
        let destination = self.code.len();
        self.code[cell] = Item::Target(destination);
    }

    fn warn_constant_condition(&mut self, keyword: &str, line: usize) {
        log::warn!(
            "POLIR WARNING: in \"{keyword}\" operator, line {line}, constant condition was found"
        );
        self.warnings += 1;
    }

    fn advance(&mut self) {
        self.current = self.stream.next();
    }

    fn at_keyword(&self, index: usize) -> bool {
        self.current.as_ref().is_some_and(|t| t.is_keyword(index))
    }

    fn at_delim(&self, index: usize) -> bool {
        self.current.as_ref().is_some_and(|t| t.is_delim(index))
    }
}

/// Statement terminators end the shunting-yard scan.
fn is_terminator(token: &Token) -> bool {
    token.is_delim(vocab::DELIM_SEMICOLON)
        || token.is_keyword(vocab::KW_THEN)
        || token.is_keyword(vocab::KW_ELSE)
        || token.is_keyword(vocab::KW_END)
        || token.is_keyword(vocab::KW_WHILE)
}

fn operator_for(token: &Token) -> Option<Op> {
    let op = match token.kind {
        TokenKind::Delim(vocab::DELIM_PLUS) => Op::Add,
        TokenKind::Delim(vocab::DELIM_MINUS) => Op::Sub,
        TokenKind::Delim(vocab::DELIM_MUL) => Op::Mul,
        TokenKind::Delim(vocab::DELIM_DIV) => Op::Div,
        TokenKind::Delim(vocab::DELIM_LESS) => Op::Less,
        TokenKind::Delim(vocab::DELIM_LESS_EQUAL) => Op::LessEqual,
        TokenKind::Delim(vocab::DELIM_GREATER) => Op::Greater,
        TokenKind::Delim(vocab::DELIM_GREATER_EQUAL) => Op::GreaterEqual,
        TokenKind::Delim(vocab::DELIM_EQUAL) => Op::Equal,
        TokenKind::Delim(vocab::DELIM_NOT_EQUAL) => Op::NotEqual,
        TokenKind::Delim(vocab::DELIM_ASSIGN) => Op::Assign,
        TokenKind::Keyword(vocab::KW_AND) => Op::And,
        TokenKind::Keyword(vocab::KW_OR) => Op::Or,
        TokenKind::Keyword(vocab::KW_NOT) => Op::Not,
        TokenKind::Keyword(vocab::KW_UN) => Op::Negate,
        _ => return None,
    };
    Some(op)
}
