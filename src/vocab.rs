//! Grammar vocabulary shared by every pipeline stage.
//!
//! Keywords and delimiters are ordered lists; tokens refer to them by index
//! so stage code compares small integers instead of strings. The named index
//! constants below are part of the configuration contract: a vocabulary file
//! may respell a keyword, but position decides meaning.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

pub const KW_PROGRAM: usize = 0;
pub const KW_VAR: usize = 1;
pub const KW_INT: usize = 2;
pub const KW_BOOL: usize = 3;
pub const KW_BEGIN: usize = 4;
pub const KW_END: usize = 5;
pub const KW_IF: usize = 6;
pub const KW_THEN: usize = 7;
pub const KW_ELSE: usize = 8;
pub const KW_WHILE: usize = 9;
pub const KW_DO: usize = 10;
pub const KW_READ: usize = 11;
pub const KW_WRITE: usize = 12;
pub const KW_TRUE: usize = 13;
pub const KW_FALSE: usize = 14;
pub const KW_AND: usize = 15;
pub const KW_OR: usize = 16;
pub const KW_NOT: usize = 17;
pub const KW_UN: usize = 18;

pub const DELIM_SEMICOLON: usize = 0;
pub const DELIM_PROGRAM_END: usize = 1;
pub const DELIM_COMMA: usize = 2;
pub const DELIM_COLON: usize = 3;
pub const DELIM_ASSIGN: usize = 4;
pub const DELIM_LPAREN: usize = 5;
pub const DELIM_RPAREN: usize = 6;
pub const DELIM_PLUS: usize = 7;
pub const DELIM_MINUS: usize = 8;
pub const DELIM_MUL: usize = 9;
pub const DELIM_DIV: usize = 10;
pub const DELIM_EQUAL: usize = 11;
pub const DELIM_NOT_EQUAL: usize = 12;
pub const DELIM_GREATER: usize = 13;
pub const DELIM_GREATER_EQUAL: usize = 14;
pub const DELIM_LESS: usize = 15;
pub const DELIM_LESS_EQUAL: usize = 16;

const KEYWORD_COUNT: usize = 19;
const DELIMITER_COUNT: usize = 17;

/// Ordered keyword/delimiter/comment-marker lists driving the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    pub keywords: Vec<String>,
    pub delimiters: Vec<String>,
    pub line_comments: Vec<String>,
    /// Exactly two entries: open marker, close marker.
    pub block_comment: Vec<String>,
}

/// On-disk layout: each section is one whitespace-separated list, under the
/// original configuration names.
#[derive(Debug, Deserialize)]
struct RawVocabulary {
    #[serde(rename = "Keywords")]
    keywords: String,
    #[serde(rename = "Delimiters")]
    delimiters: String,
    #[serde(rename = "Singleline_comment")]
    singleline_comment: String,
    #[serde(rename = "Multiline_comment")]
    multiline_comment: String,
}

impl Default for Vocabulary {
    fn default() -> Self {
        let split = |s: &str| s.split_whitespace().map(str::to_string).collect();
        Self {
            keywords: split(
                "program var int bool begin end if then else while do read write \
                 true false and or not un",
            ),
            delimiters: split("; . , : := ( ) + - * / = <> > >= < <="),
            line_comments: split("//"),
            block_comment: split("{ }"),
        }
    }
}

impl Vocabulary {
    /// Loads and validates a vocabulary from a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading vocabulary file {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("Parsing {}", path.display()))
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        let raw: RawVocabulary = serde_yaml::from_str(source)?;
        let split = |s: &str| s.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        let vocab = Self {
            keywords: split(&raw.keywords),
            delimiters: split(&raw.delimiters),
            line_comments: split(&raw.singleline_comment),
            block_comment: split(&raw.multiline_comment),
        };
        vocab.validate()?;
        Ok(vocab)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.keywords.len() >= KEYWORD_COUNT,
            "Keywords list has {} entries, {} required",
            self.keywords.len(),
            KEYWORD_COUNT
        );
        ensure!(
            self.delimiters.len() >= DELIMITER_COUNT,
            "Delimiters list has {} entries, {} required",
            self.delimiters.len(),
            DELIMITER_COUNT
        );
        ensure!(
            !self.line_comments.is_empty(),
            "Singleline_comment list is empty"
        );
        ensure!(
            self.block_comment.len() == 2,
            "Multiline_comment must hold exactly an open and a close marker, got {}",
            self.block_comment.len()
        );
        Ok(())
    }

    pub fn keyword(&self, index: usize) -> &str {
        &self.keywords[index]
    }

    pub fn delimiter(&self, index: usize) -> &str {
        &self.delimiters[index]
    }

    pub fn keyword_index(&self, lexeme: &str) -> Option<usize> {
        self.keywords.iter().position(|k| k == lexeme)
    }

    pub fn delimiter_index(&self, lexeme: &str) -> Option<usize> {
        self.delimiters.iter().position(|d| d == lexeme)
    }
}
