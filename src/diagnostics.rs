use std::fmt;

use crate::error::RuntimeError;
use crate::token::{Token, TokenKind};

/// Pipeline stage a diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Syntax,
    Parser,
    Runtime,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Syntax => write!(f, "Syntax"),
            Stage::Parser => write!(f, "Parser"),
            Stage::Runtime => write!(f, "Runtime"),
        }
    }
}

/// One reported problem: source line, location hint, message, and stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub location: String,
    pub message: String,
    pub stage: Stage,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[line {}] {} Error{}: {}",
            self.line, self.stage, self.location, self.message
        )
    }
}

/// Collecting sink for recoverable diagnostics.
///
/// The scanner, parser, and resolver all report here and keep going; the
/// driver checks `had_error` between pipeline stages to decide whether the
/// next stage runs at all.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a scanning problem at a bare source line.
    pub fn line_error(&mut self, line: usize, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            line,
            location: String::new(),
            message: message.into(),
            stage: Stage::Syntax,
        });
    }

    /// Report a parse or resolution problem anchored at a token.
    pub fn token_error(&mut self, token: &Token, message: impl Into<String>) {
        let location = if token.kind == TokenKind::Eof {
            " at end".to_string()
        } else {
            format!(" at '{}'", token.lexeme)
        };
        self.diagnostics.push(Diagnostic {
            line: token.line,
            location,
            message: message.into(),
            stage: Stage::Parser,
        });
    }

    /// Record the single fatal fault of a run.
    pub fn runtime_error(&mut self, error: &RuntimeError) {
        self.diagnostics.push(Diagnostic {
            line: error.line,
            location: String::new(),
            message: error.kind.to_string(),
            stage: Stage::Runtime,
        });
    }

    pub fn had_error(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Print every collected diagnostic to stderr.
    pub fn report(&self) {
        for diagnostic in &self.diagnostics {
            eprintln!("{diagnostic}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RuntimeError, RuntimeErrorKind};

    fn identifier(lexeme: &str, line: usize) -> Token {
        Token::new(TokenKind::Identifier, lexeme.to_string(), None, line)
    }

    #[test]
    fn renders_line_diagnostics_without_location_hint() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.line_error(3, "Tabs are not allowed.");

        let rendered = diagnostics.iter().next().map(ToString::to_string);
        assert_eq!(
            rendered.as_deref(),
            Some("[line 3] Syntax Error: Tabs are not allowed.")
        );
    }

    #[test]
    fn renders_token_diagnostics_with_lexeme_hint() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.token_error(&identifier("x", 7), "Expected expression.");

        let rendered = diagnostics.iter().next().map(ToString::to_string);
        assert_eq!(
            rendered.as_deref(),
            Some("[line 7] Parser Error at 'x': Expected expression.")
        );
    }

    #[test]
    fn renders_eof_diagnostics_at_end() {
        let mut diagnostics = Diagnostics::new();
        let eof = Token::new(TokenKind::Eof, String::new(), None, 4);
        diagnostics.token_error(&eof, "Expect dedentation after block.");

        let rendered = diagnostics.iter().next().map(ToString::to_string);
        assert_eq!(
            rendered.as_deref(),
            Some("[line 4] Parser Error at end: Expect dedentation after block.")
        );
    }

    #[test]
    fn records_runtime_faults_with_their_line() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.runtime_error(&RuntimeError::new(9, RuntimeErrorKind::DivisionByZero));

        assert!(diagnostics.had_error());
        let rendered = diagnostics.iter().next().map(ToString::to_string);
        assert_eq!(
            rendered.as_deref(),
            Some("[line 9] Runtime Error: Attempted to divide by zero.")
        );
    }
}
