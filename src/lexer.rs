//! Lexical analysis: splits a MiniPascal source text into a classified token
//! stream.
//!
//! The lexer is vocabulary-driven: it knows nothing about the language except
//! what the [`Vocabulary`] lists tell it. Source is processed line by line,
//! lower-cased first (the language is case-insensitive), then stripped of
//! block and line comments, then split on whitespace and delimiters. Each
//! resulting lexeme is classified as number, delimiter, keyword or
//! identifier, in that order.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use crate::token::{Token, TokenKind};
use crate::vocab::Vocabulary;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("[{line}] LEXER ERROR: invalid comment - close symbol not found")]
    UnterminatedBlockComment { line: usize },
    #[error("[{line}] LEXER ERROR: invalid identifier '{lexeme}'")]
    InvalidIdentifier { lexeme: String, line: usize },
}

pub type LexResult<T> = Result<T, LexError>;

/// Finite token stream with a sequential cursor.
///
/// The parser consumes the stream front to back; the POLIR generator rewinds
/// it and scans again. Identifier and number lexemes are interned as they are
/// pushed so the debug dump can report stable indices.
#[derive(Debug, Default)]
pub struct TokenStream {
    tokens: Vec<Token>,
    numbers: Vec<i64>,
    idents: Vec<String>,
    pos: usize,
}

impl TokenStream {
    fn push(&mut self, token: Token) {
        match &token.kind {
            TokenKind::Number(value) => {
                if !self.numbers.contains(value) {
                    self.numbers.push(*value);
                }
            }
            TokenKind::Ident(name) => {
                if !self.idents.iter().any(|id| id == name) {
                    self.idents.push(name.clone());
                }
            }
            _ => {}
        }
        self.tokens.push(token);
    }

    /// Returns the token under the cursor and advances, or `None` once the
    /// stream is exhausted.
    pub fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Resets the cursor to the first token.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// Index of the token `next` would return.
    pub fn current_index(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Dumps the token table as `(kind, index, line)` triples, one per token,
    /// plus two companion files listing the interned identifiers and numbers.
    ///
    /// Kind tags: 1 keyword, 2 delimiter, 3 number, 4 identifier. For
    /// keywords and delimiters the index is the vocabulary position; for
    /// numbers and identifiers it is the interning index.
    pub fn save_lexeme_file(&self, path: &Path) -> anyhow::Result<()> {
        let mut table = String::new();
        for token in &self.tokens {
            let (kind, index) = match &token.kind {
                TokenKind::Keyword(index) => (1, *index),
                TokenKind::Delim(index) => (2, *index),
                TokenKind::Number(value) => (
                    3,
                    self.numbers
                        .iter()
                        .position(|n| n == value)
                        .unwrap_or_default(),
                ),
                TokenKind::Ident(name) => (
                    4,
                    self.idents
                        .iter()
                        .position(|id| id == name)
                        .unwrap_or_default(),
                ),
            };
            table.push_str(&format!("{} {} {}\n", kind, index, token.line));
        }
        fs::write(path, table)
            .with_context(|| format!("Writing lexeme table {}", path.display()))?;

        let ids_path = companion_path(path, "ids");
        let mut ids = String::new();
        for (index, name) in self.idents.iter().enumerate() {
            ids.push_str(&format!("{name} {index}\n"));
        }
        fs::write(&ids_path, ids)
            .with_context(|| format!("Writing identifier table {}", ids_path.display()))?;

        let nums_path = companion_path(path, "nums");
        let mut nums = String::new();
        for (index, value) in self.numbers.iter().enumerate() {
            nums.push_str(&format!("{value} {index}\n"));
        }
        fs::write(&nums_path, nums)
            .with_context(|| format!("Writing number table {}", nums_path.display()))?;
        Ok(())
    }
}

/// Inserts a tag before the file extension: `lexemes.txt` -> `lexemes.ids.txt`.
fn companion_path(path: &Path, tag: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("lexemes");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}.{tag}.{ext}"),
        None => format!("{stem}.{tag}"),
    };
    path.with_file_name(name)
}

pub struct Lexer<'v> {
    vocab: &'v Vocabulary,
}

impl<'v> Lexer<'v> {
    pub fn new(vocab: &'v Vocabulary) -> Self {
        Self { vocab }
    }

    /// Tokenizes an entire source text.
    pub fn tokenize(&self, source: &str) -> LexResult<TokenStream> {
        let mut stream = TokenStream::default();
        for (line, line_no) in self.strip_comments(source)? {
            self.scan_line(&line, line_no, &mut stream)?;
        }
        log::debug!("LEXER INFO: {} lexemes, no errors", stream.len());
        Ok(stream)
    }

    /// Lower-cases each line and removes block and line comments, keeping the
    /// text on either side of a comment. Returns non-empty lines paired with
    /// their 1-based line numbers.
    fn strip_comments(&self, source: &str) -> LexResult<Vec<(String, usize)>> {
        let open = &self.vocab.block_comment[0];
        let close = &self.vocab.block_comment[1];

        let mut lines = Vec::new();
        // Line number of the open marker while inside a block comment.
        let mut block_open: Option<usize> = None;

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let mut line = raw.to_lowercase();

            if block_open.is_some() {
                match line.find(close.as_str()) {
                    Some(pos) => {
                        line = line[pos + close.len()..].to_string();
                        block_open = None;
                    }
                    None => continue,
                }
            }

            while let Some(start) = line.find(open.as_str()) {
                match line[start + open.len()..].find(close.as_str()) {
                    Some(offset) => {
                        let end = start + open.len() + offset + close.len();
                        line.replace_range(start..end, "");
                    }
                    None => {
                        block_open = Some(line_no);
                        line.truncate(start);
                        break;
                    }
                }
            }

            for marker in &self.vocab.line_comments {
                if let Some(pos) = line.find(marker.as_str()) {
                    line.truncate(pos);
                }
            }

            let line = line.trim();
            if !line.is_empty() {
                lines.push((line.to_string(), line_no));
            }
        }

        if let Some(line) = block_open {
            return Err(LexError::UnterminatedBlockComment { line });
        }
        Ok(lines)
    }

    /// Splits one comment-free line into tokens. Delimiters both terminate
    /// the pending lexeme and emit their own token; two-character delimiters
    /// win over one-character ones.
    fn scan_line(&self, line: &str, line_no: usize, stream: &mut TokenStream) -> LexResult<()> {
        let chars: Vec<char> = line.chars().collect();
        let mut pending = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                self.flush(&mut pending, line_no, stream)?;
                i += 1;
                continue;
            }

            if i + 1 < chars.len() {
                let two: String = chars[i..i + 2].iter().collect();
                if let Some(index) = self.vocab.delimiter_index(&two) {
                    self.flush(&mut pending, line_no, stream)?;
                    stream.push(Token::new(TokenKind::Delim(index), line_no));
                    i += 2;
                    continue;
                }
            }

            let one = c.to_string();
            if let Some(index) = self.vocab.delimiter_index(&one) {
                self.flush(&mut pending, line_no, stream)?;
                stream.push(Token::new(TokenKind::Delim(index), line_no));
                i += 1;
                continue;
            }

            pending.push(c);
            i += 1;
        }

        self.flush(&mut pending, line_no, stream)
    }

    fn flush(
        &self,
        pending: &mut String,
        line_no: usize,
        stream: &mut TokenStream,
    ) -> LexResult<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let lexeme = std::mem::take(pending);
        stream.push(self.classify(&lexeme, line_no)?);
        Ok(())
    }

    /// Classification order: number, delimiter, keyword, identifier.
    fn classify(&self, lexeme: &str, line: usize) -> LexResult<Token> {
        if let Ok(value) = lexeme.parse::<i64>() {
            return Ok(Token::new(TokenKind::Number(value), line));
        }
        if let Some(index) = self.vocab.delimiter_index(lexeme) {
            return Ok(Token::new(TokenKind::Delim(index), line));
        }
        if let Some(index) = self.vocab.keyword_index(lexeme) {
            return Ok(Token::new(TokenKind::Keyword(index), line));
        }

        let starts_with_letter = lexeme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic());
        if !starts_with_letter || !lexeme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LexError::InvalidIdentifier {
                lexeme: lexeme.to_string(),
                line,
            });
        }
        Ok(Token::new(TokenKind::Ident(lexeme.to_string()), line))
    }
}
