//! Parser for the textual expression form.
//!
//! ```text
//! program    := expression (';' expression)* ';'?
//! expression := operand postfix*
//! postfix    := '.' ident arguments? | '[' expression ']'
//! operand    := array | string | float | int | bool | accessor
//!             | ident arguments | ClassName
//! arguments  := '(' (ident ':' expression),* ')'
//! ```
//!
//! A bare class name must be followed by a member, e.g. `Restaurant.all()`.

mod grammar;

use thiserror::Error;
use tracing::debug;

use crate::ast::{Node, Program};

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    fn at(message: impl Into<String>, source: &str, remaining: &str) -> Self {
        Self {
            message: message.into(),
            offset: source.len().saturating_sub(remaining.len()),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse_program(source: &str) -> ParseResult<Program> {
    debug!("Parsing program: {}", source);
    match grammar::program(source) {
        Ok(("", program)) => Ok(program),
        Ok((rest, _)) => Err(ParseError::at("unexpected trailing input", source, rest)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let message = match e.code {
                nom::error::ErrorKind::Verify => "class name must be followed by a member".to_string(),
                code => format!("unexpected input ({:?})", code),
            };
            Err(ParseError::at(message, source, e.input))
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError {
            message: "incomplete input".to_string(),
            offset: source.len(),
        }),
    }
}

/// Parses exactly one expression.
pub fn parse_expression(source: &str) -> ParseResult<Node> {
    let mut program = parse_program(source)?;
    match program.len() {
        1 => Ok(program.remove(0)),
        n => Err(ParseError {
            message: format!("expected one expression, found {}", n),
            offset: 0,
        }),
    }
}
