//! Syntax and semantic analysis.
//!
//! A recursive-descent pass over the token stream that checks the grammar,
//! builds the symbol table from the `var` section, and type-checks every
//! expression on the way through. Expression typing uses an auxiliary stack
//! of operand types and operator lexemes; reductions consult the operator
//! signature table and push the result type back.
//!
//! The additive and multiplicative productions are right-recursive
//! (`E1 ::= T (+|-|or) E1`, `T ::= F (*|/|and) T`), mirroring the shape the
//! POLIR generator's precedence table expects. `a - b - c` is therefore
//! grammatically grouped as `a - (b - c)`; evaluation order is decided later
//! by the generator.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;

use crate::lexer::TokenStream;
use crate::token::{Token, TokenKind};
use crate::vocab::{self, Vocabulary};

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Int,
    Bool,
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Int => write!(f, "int"),
            VarType::Bool => write!(f, "bool"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("[{line}] Syntax error: {message}")]
    Syntax { message: String, line: usize },
    #[error("[{line}] Semantic error: {message}")]
    Semantic { message: String, line: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Operand and result type constraints for one operator. `None` operand
/// slots accept any type; `require_equal` additionally demands both operands
/// share one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSignature {
    pub lhs: Option<VarType>,
    pub rhs: Option<VarType>,
    pub require_equal: bool,
    pub result: Option<VarType>,
}

/// Everything the parser publishes to the downstream stages.
#[derive(Debug)]
pub struct ParseArtifacts {
    /// Identifier -> declared type, complete and immutable after parsing.
    pub symbols: BTreeMap<String, VarType>,
    /// Operator lexeme -> type signature.
    pub op_types: HashMap<String, OpSignature>,
    /// Declared but never referenced identifiers, in declaration-table order.
    pub unused: Vec<String>,
}

/// Entries of the expression type stack: operand types interleaved with
/// pending operator lexemes.
#[derive(Debug)]
enum TypeEntry {
    Ty(VarType),
    Op(String),
}

pub struct Parser<'v, 's> {
    vocab: &'v Vocabulary,
    stream: &'s mut TokenStream,
    current: Option<Token>,
    line: usize,
    symbols: BTreeMap<String, Option<VarType>>,
    used: BTreeSet<String>,
    op_types: HashMap<String, OpSignature>,
    type_stack: Vec<TypeEntry>,
}

impl<'v, 's> Parser<'v, 's> {
    pub fn new(vocab: &'v Vocabulary, stream: &'s mut TokenStream) -> Self {
        let op_types = operator_signatures(vocab);
        Self {
            vocab,
            stream,
            current: None,
            line: 0,
            symbols: BTreeMap::new(),
            used: BTreeSet::new(),
            op_types,
            type_stack: Vec::new(),
        }
    }

    /// Runs the full grammar + semantic check and reports unused variables.
    /// On success the stream cursor rests just past the closing `.`.
    pub fn parse(mut self) -> ParseResult<ParseArtifacts> {
        self.stream.rewind();
        self.advance();
        self.program()?;
        log::debug!("PARSER INFO: no syntax errors found");

        let mut unused = Vec::new();
        for name in self.symbols.keys() {
            if !self.used.contains(name) {
                log::warn!("SEMLER WARNING: {name} unreferenced local variable");
                unused.push(name.clone());
            }
        }
        if unused.is_empty() {
            log::debug!("SEMLER INFO: no errors, no warnings");
        } else {
            log::debug!("SEMLER INFO: no errors, {} warning(s)", unused.len());
        }

        let symbols = self
            .symbols
            .into_iter()
            .filter_map(|(name, ty)| ty.map(|ty| (name, ty)))
            .collect();
        Ok(ParseArtifacts {
            symbols,
            op_types: self.op_types,
            unused,
        })
    }

    // P ::= "program" D1 B "."
    fn program(&mut self) -> ParseResult<()> {
        if !self.at_keyword(vocab::KW_PROGRAM) {
            return Err(self.syntax("Keyword \"program\" expected"));
        }
        self.advance();
        self.declarations()?;
        self.block()?;
        if !self.at_delim(vocab::DELIM_PROGRAM_END) {
            return Err(self.syntax("\".\" expected"));
        }
        self.advance();
        Ok(())
    }

    // D1 ::= "var" D2 { ";" D2 }
    fn declarations(&mut self) -> ParseResult<()> {
        if !self.at_keyword(vocab::KW_VAR) {
            return Err(self.syntax("Keyword \"var\" expected"));
        }
        self.advance();
        self.declaration_group()
    }

    // D2 ::= I { "," I } ":" ("int" | "bool")
    fn declaration_group(&mut self) -> ParseResult<()> {
        let name = match self.current.as_ref().map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => name.clone(),
            _ => return Err(self.syntax("Identifier expected")),
        };
        if self.symbols.contains_key(&name) {
            return Err(self.semantic("Duplicate identifier"));
        }
        self.symbols.insert(name, None);
        self.advance();

        if self.at_delim(vocab::DELIM_COMMA) {
            self.advance();
            return self.declaration_group();
        }

        if !self.at_delim(vocab::DELIM_COLON) {
            return Err(self.syntax("\":\" expected"));
        }
        self.advance();

        let ty = if self.at_keyword(vocab::KW_INT) {
            VarType::Int
        } else if self.at_keyword(vocab::KW_BOOL) {
            VarType::Bool
        } else {
            return Err(self.syntax("Unknown variable data type"));
        };
        for slot in self.symbols.values_mut() {
            if slot.is_none() {
                *slot = Some(ty);
            }
        }
        self.advance();

        if !self.at_delim(vocab::DELIM_SEMICOLON) {
            return Err(self.syntax("\";\" expected"));
        }
        self.advance();

        if !self.at_keyword(vocab::KW_BEGIN) {
            return self.declaration_group();
        }
        Ok(())
    }

    // B ::= "begin" S { ";" S } "end"
    fn block(&mut self) -> ParseResult<()> {
        if !self.at_keyword(vocab::KW_BEGIN) {
            return Err(self.syntax("Keyword \"begin\" expected"));
        }
        self.advance();

        while self.current.is_some() && !self.at_keyword(vocab::KW_END) {
            self.statement()?;
            if self.at_keyword(vocab::KW_END) {
                break;
            }
            if !self.at_delim(vocab::DELIM_SEMICOLON) {
                return Err(self.syntax("\";\" expected"));
            }
            self.advance();
        }

        if !self.at_keyword(vocab::KW_END) {
            return Err(self.syntax("Keyword \"end\" expected"));
        }
        self.advance();
        Ok(())
    }

    // S ::= I ":=" E | "if" E "then" S ["else" S] | "do" S "while" E
    //     | "read" "(" I ")" | "write" "(" E ")" | B
    fn statement(&mut self) -> ParseResult<()> {
        if self.at_keyword(vocab::KW_IF) {
            self.advance();
            self.expression()?;
            if self.pop_type()? != VarType::Bool {
                return Err(self.semantic("\"if\" statement require bool expression"));
            }
            if !self.at_keyword(vocab::KW_THEN) {
                return Err(self.syntax("Keyword \"then\" expected"));
            }
            self.advance();
            self.statement()?;
            if self.at_keyword(vocab::KW_ELSE) {
                self.advance();
                self.statement()?;
            }
            return Ok(());
        }

        if self.at_keyword(vocab::KW_DO) {
            self.advance();
            self.statement()?;
            if !self.at_keyword(vocab::KW_WHILE) {
                return Err(self.syntax("Keyword \"while\" expected"));
            }
            self.advance();
            self.expression()?;
            if self.pop_type()? != VarType::Bool {
                return Err(self.semantic("\"while\" statement require bool expression"));
            }
            return Ok(());
        }

        if self.at_keyword(vocab::KW_BEGIN) {
            return self.block();
        }

        if self.at_keyword(vocab::KW_READ) {
            self.advance();
            if !self.at_delim(vocab::DELIM_LPAREN) {
                return Err(self.syntax("\"(\" expected"));
            }
            self.advance();
            self.identifier()?;
            self.pop_type()?;
            if !self.at_delim(vocab::DELIM_RPAREN) {
                return Err(self.syntax("\")\" expected"));
            }
            self.advance();
            return Ok(());
        }

        if self.at_keyword(vocab::KW_WRITE) {
            self.advance();
            if !self.at_delim(vocab::DELIM_LPAREN) {
                return Err(self.syntax("\"(\" expected"));
            }
            self.advance();
            self.expression()?;
            self.pop_type()?;
            if !self.at_delim(vocab::DELIM_RPAREN) {
                return Err(self.syntax("\")\" expected"));
            }
            self.advance();
            return Ok(());
        }

        // Assignment: the only statement starting with an identifier.
        match self.current.as_ref().map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => {
                if !self.symbols.contains_key(name.as_str()) {
                    return Err(self.semantic("Unknown identifier"));
                }
            }
            _ => return Err(self.syntax("Invalid identifier")),
        }
        self.identifier()?;
        if !self.at_delim(vocab::DELIM_ASSIGN) {
            return Err(self.syntax("\":=\" expected"));
        }
        self.advance();
        self.expression()?;

        let value_ty = self.pop_type()?;
        let target_ty = self.pop_type()?;
        if value_ty != target_ty {
            return Err(self.semantic("Type mismatch in assign operator"));
        }
        Ok(())
    }

    // E ::= E1 [ relop E1 ]
    fn expression(&mut self) -> ParseResult<()> {
        self.additive()?;
        if self.current.as_ref().is_some_and(Token::is_relational) {
            self.push_current_op();
            self.advance();
            self.additive()?;
            self.check_types()?;
        }
        Ok(())
    }

    // E1 ::= T [ ("+" | "-" | "or") E1 ]
    fn additive(&mut self) -> ParseResult<()> {
        self.term()?;
        if self.at_delim(vocab::DELIM_PLUS)
            || self.at_delim(vocab::DELIM_MINUS)
            || self.at_keyword(vocab::KW_OR)
        {
            self.push_current_op();
            self.advance();
            self.additive()?;
            self.check_types()?;
        }
        Ok(())
    }

    // T ::= F [ ("*" | "/" | "and") T ]
    fn term(&mut self) -> ParseResult<()> {
        self.factor()?;
        if self.at_delim(vocab::DELIM_MUL)
            || self.at_delim(vocab::DELIM_DIV)
            || self.at_keyword(vocab::KW_AND)
        {
            self.push_current_op();
            self.advance();
            self.term()?;
            self.check_types()?;
        }
        Ok(())
    }

    // F ::= I | N | L | "not" F | "un" F | "(" E ")"
    fn factor(&mut self) -> ParseResult<()> {
        if self.at_keyword(vocab::KW_NOT) {
            self.advance();
            self.factor()?;
            if self.pop_type()? != VarType::Bool {
                return Err(self.semantic("\"not\" operator needs bool operand"));
            }
            self.type_stack.push(TypeEntry::Ty(VarType::Bool));
            return Ok(());
        }

        if self.at_keyword(vocab::KW_UN) {
            self.advance();
            self.factor()?;
            if self.pop_type()? != VarType::Int {
                return Err(self.semantic("\"un\" operator needs int operand"));
            }
            self.type_stack.push(TypeEntry::Ty(VarType::Int));
            return Ok(());
        }

        if self.at_delim(vocab::DELIM_LPAREN) {
            self.advance();
            self.expression()?;
            if !self.at_delim(vocab::DELIM_RPAREN) {
                return Err(self.syntax("\")\" expected"));
            }
            self.advance();
            return Ok(());
        }

        if self.at_keyword(vocab::KW_TRUE) || self.at_keyword(vocab::KW_FALSE) {
            self.type_stack.push(TypeEntry::Ty(VarType::Bool));
            self.advance();
            return Ok(());
        }

        if matches!(
            self.current.as_ref().map(|t| &t.kind),
            Some(TokenKind::Number(_))
        ) {
            self.type_stack.push(TypeEntry::Ty(VarType::Int));
            self.advance();
            return Ok(());
        }

        self.identifier()
    }

    /// Expression-position identifier: must be declared; pushes its type and
    /// records the reference.
    fn identifier(&mut self) -> ParseResult<()> {
        let name = match self.current.as_ref().map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => name.clone(),
            _ => return Err(self.syntax("Invalid identifier")),
        };
        match self.symbols.get(&name).copied().flatten() {
            Some(ty) => {
                self.type_stack.push(TypeEntry::Ty(ty));
                self.used.insert(name);
                self.advance();
                Ok(())
            }
            None => Err(self.semantic("Unknown identifier")),
        }
    }

    /// Reduces `t2 op t1` on the type stack against the operator signature
    /// table and pushes the result type.
    fn check_types(&mut self) -> ParseResult<()> {
        let t1 = self.pop_type()?;
        let op = self.pop_op()?;
        let t2 = self.pop_type()?;

        let Some(sig) = self.op_types.get(&op).copied() else {
            return Err(self.syntax("malformed expression"));
        };
        let lhs_ok = sig.lhs.is_none_or(|expected| expected == t2);
        let rhs_ok = sig.rhs.is_none_or(|expected| expected == t1);
        let equal_ok = !sig.require_equal || t1 == t2;
        if !(lhs_ok && rhs_ok && equal_ok) {
            let message = if sig.require_equal {
                format!("Type mismatch: operation {op} need equal types")
            } else {
                format!(
                    "Type mismatch: operation {op} need types {} and {}",
                    describe(sig.lhs),
                    describe(sig.rhs)
                )
            };
            return Err(self.semantic(message));
        }
        if let Some(result) = sig.result {
            self.type_stack.push(TypeEntry::Ty(result));
        }
        Ok(())
    }

    fn push_current_op(&mut self) {
        if let Some(token) = &self.current {
            let lexeme = match token.kind {
                TokenKind::Keyword(index) => self.vocab.keyword(index),
                TokenKind::Delim(index) => self.vocab.delimiter(index),
                _ => return,
            };
            self.type_stack.push(TypeEntry::Op(lexeme.to_string()));
        }
    }

    fn pop_type(&mut self) -> ParseResult<VarType> {
        match self.type_stack.pop() {
            Some(TypeEntry::Ty(ty)) => Ok(ty),
            _ => Err(self.syntax("malformed expression")),
        }
    }

    fn pop_op(&mut self) -> ParseResult<String> {
        match self.type_stack.pop() {
            Some(TypeEntry::Op(op)) => Ok(op),
            _ => Err(self.syntax("malformed expression")),
        }
    }

    fn advance(&mut self) {
        self.current = self.stream.next();
        if let Some(token) = &self.current {
            self.line = token.line;
        }
    }

    fn at_keyword(&self, index: usize) -> bool {
        self.current.as_ref().is_some_and(|t| t.is_keyword(index))
    }

    fn at_delim(&self, index: usize) -> bool {
        self.current.as_ref().is_some_and(|t| t.is_delim(index))
    }

    fn syntax(&self, message: impl Into<String>) -> ParseError {
        ParseError::Syntax {
            message: message.into(),
            line: self.line,
        }
    }

    fn semantic(&self, message: impl Into<String>) -> ParseError {
        ParseError::Semantic {
            message: message.into(),
            line: self.line,
        }
    }
}

fn operator_signatures(vocab: &Vocabulary) -> HashMap<String, OpSignature> {
    let mut table = HashMap::new();

    table.insert(
        vocab.delimiter(vocab::DELIM_ASSIGN).to_string(),
        OpSignature {
            lhs: None,
            rhs: None,
            require_equal: true,
            result: None,
        },
    );

    let arithmetic = OpSignature {
        lhs: Some(VarType::Int),
        rhs: Some(VarType::Int),
        require_equal: false,
        result: Some(VarType::Int),
    };
    for index in [
        vocab::DELIM_PLUS,
        vocab::DELIM_MINUS,
        vocab::DELIM_MUL,
        vocab::DELIM_DIV,
    ] {
        table.insert(vocab.delimiter(index).to_string(), arithmetic);
    }

    let boolean = OpSignature {
        lhs: Some(VarType::Bool),
        rhs: Some(VarType::Bool),
        require_equal: false,
        result: Some(VarType::Bool),
    };
    for index in [vocab::KW_AND, vocab::KW_OR] {
        table.insert(vocab.keyword(index).to_string(), boolean);
    }

    let relational = OpSignature {
        lhs: None,
        rhs: None,
        require_equal: true,
        result: Some(VarType::Bool),
    };
    for index in [
        vocab::DELIM_EQUAL,
        vocab::DELIM_NOT_EQUAL,
        vocab::DELIM_GREATER,
        vocab::DELIM_GREATER_EQUAL,
        vocab::DELIM_LESS,
        vocab::DELIM_LESS_EQUAL,
    ] {
        table.insert(vocab.delimiter(index).to_string(), relational);
    }

    table
}

fn describe(ty: Option<VarType>) -> String {
    match ty {
        Some(ty) => ty.to_string(),
        None => "any".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> ParseResult<ParseArtifacts> {
        let vocab = Vocabulary::default();
        let mut stream = Lexer::new(&vocab)
            .tokenize(source)
            .expect("tokenize should succeed");
        Parser::new(&vocab, &mut stream).parse()
    }

    #[test]
    fn accepts_minimal_program() {
        let artifacts = parse("program var x : int; begin x := 1 end.")
            .expect("parse should succeed");
        assert_eq!(artifacts.symbols.get("x"), Some(&VarType::Int));
        assert!(artifacts.unused.is_empty());
    }

    #[test]
    fn types_comma_separated_declaration_groups() {
        let artifacts = parse(indoc! {"
            program
            var a, b : int;
                flag : bool;
            begin
                a := 1;
                b := 2;
                flag := true
            end.
        "})
        .expect("parse should succeed");
        assert_eq!(artifacts.symbols.get("a"), Some(&VarType::Int));
        assert_eq!(artifacts.symbols.get("b"), Some(&VarType::Int));
        assert_eq!(artifacts.symbols.get("flag"), Some(&VarType::Bool));
    }

    #[test]
    fn publishes_operator_signatures() {
        let artifacts = parse("program var x : int; begin x := 1 end.")
            .expect("parse should succeed");
        let plus = artifacts.op_types.get("+").expect("missing + signature");
        assert_eq!(plus.lhs, Some(VarType::Int));
        assert_eq!(plus.result, Some(VarType::Int));
        let less = artifacts.op_types.get("<").expect("missing < signature");
        assert!(less.require_equal);
        assert_eq!(less.result, Some(VarType::Bool));
        assert!(artifacts.op_types.contains_key(":="));
    }

    #[test]
    fn rejects_duplicate_declaration() {
        let error =
            parse("program var x : int; x : bool; begin x := 1 end.").expect_err("should fail");
        assert_eq!(
            error,
            ParseError::Semantic {
                message: "Duplicate identifier".to_string(),
                line: 1,
            }
        );
    }

    #[test]
    fn rejects_undeclared_identifier() {
        let error = parse("program var x : int; begin y := 1 end.").expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "Unknown identifier"));
    }

    #[test]
    fn rejects_assignment_type_mismatch() {
        let error = parse("program var x : int; begin x := true end.").expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "Type mismatch in assign operator"));
    }

    #[test]
    fn rejects_arithmetic_on_bool() {
        let error = parse("program var x : int; begin x := 1 + true end.")
            .expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "Type mismatch: operation + need types int and int"));
    }

    #[test]
    fn rejects_relational_operand_mix() {
        let error = parse("program var b : bool; begin b := 1 < true end.")
            .expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "Type mismatch: operation < need equal types"));
    }

    #[test]
    fn rejects_non_bool_if_condition() {
        let error = parse("program var x : int; begin if x + 1 then x := 1 end.")
            .expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "\"if\" statement require bool expression"));
    }

    #[test]
    fn rejects_non_bool_while_condition() {
        let error = parse("program var x : int; begin do x := x - 1 while x end.")
            .expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "\"while\" statement require bool expression"));
    }

    #[test]
    fn rejects_not_on_int_operand() {
        let error = parse("program var b : bool; begin b := not 3 end.").expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "\"not\" operator needs bool operand"));
    }

    #[test]
    fn rejects_un_on_bool_operand() {
        let error = parse("program var x : int; begin x := un true end.").expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { message, .. }
            if message == "\"un\" operator needs int operand"));
    }

    #[test]
    fn rejects_missing_then() {
        let error = parse("program var b : bool; begin if b b := true end.")
            .expect_err("should fail");
        assert!(matches!(error, ParseError::Syntax { message, .. }
            if message == "Keyword \"then\" expected"));
    }

    #[test]
    fn rejects_missing_program_terminator() {
        let error = parse("program var x : int; begin x := 1 end").expect_err("should fail");
        assert!(matches!(error, ParseError::Syntax { message, .. }
            if message == "\".\" expected"));
    }

    #[test]
    fn reports_error_line_numbers() {
        let error = parse(indoc! {"
            program
            var x : int;
            begin
                x := true end.
        "})
        .expect_err("should fail");
        assert!(matches!(error, ParseError::Semantic { line: 4, .. }));
    }

    #[test]
    fn accepts_empty_block() {
        parse("program var x : int; begin end.").expect("parse should succeed");
    }

    #[test]
    fn accepts_if_without_else_before_end() {
        parse("program var x : int; begin x := 5; if x > 0 then write(x) end.")
            .expect("parse should succeed");
    }

    #[test]
    fn accepts_repeated_unary_operators() {
        parse("program var b : bool; x : int; begin b := not not b; x := un un x end.")
            .expect("parse should succeed");
    }

    #[test]
    fn accepts_nested_parentheses() {
        parse("program var x : int; begin x := (((1 + 2)) * (3)) end.")
            .expect("parse should succeed");
    }

    #[test]
    fn collects_unused_variables() {
        let artifacts = parse("program var x, y : int; z : bool; begin x := 1 end.")
            .expect("parse should succeed");
        assert_eq!(artifacts.unused, vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn read_marks_variable_as_used() {
        let artifacts = parse("program var x : int; begin read(x) end.")
            .expect("parse should succeed");
        assert!(artifacts.unused.is_empty());
    }
}
