use crate::diagnostics::Diagnostics;
use crate::token::{Literal, Token, TokenKind};

/// Converts source text into a flat token sequence.
///
/// Indentation is only re-examined immediately after a `Newline` token: a
/// level is four spaces, going one level deeper emits `Indent`, and any drop
/// emits one `Dedent` per popped level. Remaining open levels are closed with
/// trailing `Dedent`s before the final `Eof`.
pub struct Scanner<'a> {
    chars: Vec<char>,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    start: usize,
    current: usize,
    line: usize,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &str, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            chars: source.chars().collect(),
            tokens: Vec::new(),
            indent_stack: vec![0],
            start: 0,
            current: 0,
            line: 1,
            diagnostics,
        }
    }

    pub fn scan_tokens(mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        // Close every block still open at end of input.
        for &indent in &self.indent_stack {
            if indent > 0 {
                self.tokens
                    .push(Token::new(TokenKind::Dedent, String::new(), None, self.line));
            }
        }
        self.tokens
            .push(Token::new(TokenKind::Eof, String::new(), None, self.line));
        self.tokens
    }

    fn scan_token(&mut self) {
        let mut c = self.advance();

        // A fresh line: compare leading spaces against the indentation stack.
        if self.last_kind() == Some(TokenKind::Newline) && c != '\n' {
            let spaces = self.count_leading_spaces();
            // A line of nothing but spaces keeps the current indentation.
            let after = self.chars.get(self.current - 1 + spaces);
            if c == ' ' && matches!(after, Option::None | Some('\n')) {
                self.skip_rest_of_line();
                return;
            }
            if spaces % 4 != 0 {
                self.diagnostics
                    .line_error(self.line, "Indentation must be a multiple of 4.");
                self.skip_rest_of_line();
                return;
            }
            let level = spaces / 4;
            let top = *self.indent_stack.last().unwrap_or(&0);
            if level > top + 1 {
                self.diagnostics.line_error(
                    self.line,
                    format!(
                        "Indentation too deep. Expected {} spaces, found {}.",
                        top * 4,
                        spaces
                    ),
                );
            } else if level == top + 1 {
                self.indent_stack.push(level);
                self.tokens
                    .push(Token::new(TokenKind::Indent, String::new(), None, self.line));
            } else if level < top {
                while self.indent_stack.last().is_some_and(|&t| t > level) {
                    self.indent_stack.pop();
                    self.tokens
                        .push(Token::new(TokenKind::Dedent, String::new(), None, self.line));
                }
            }

            while c == ' ' {
                if self.is_at_end() {
                    return;
                }
                c = self.advance();
                self.start = self.current - 1;
            }
        }

        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '{' => self.add_token(TokenKind::LeftBrace),
            '}' => self.add_token(TokenKind::RightBrace),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            ';' => self.add_token(TokenKind::Semicolon),
            '*' => self.add_token(TokenKind::Star),
            '/' => self.add_token(TokenKind::Slash),
            '^' => self.add_token(TokenKind::Hat),
            '=' => self.add_token(TokenKind::Equal),
            '\\' | 'λ' => self.add_token(TokenKind::Lambda),
            '@' => self.host_call(),
            '.' => {
                if self.match_char('.') {
                    self.add_token(TokenKind::Ellipsis);
                } else {
                    self.add_token(TokenKind::Dot);
                }
            }
            '+' => {
                if self.match_char('+') {
                    self.add_token(TokenKind::PlusPlus);
                } else {
                    self.add_token(TokenKind::Plus);
                }
            }
            '-' => {
                if self.match_char('-') {
                    self.add_token(TokenKind::MinusMinus);
                } else {
                    self.add_token(TokenKind::Minus);
                }
            }
            ':' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::Assignment);
                } else {
                    self.add_token(TokenKind::Colon);
                }
            }
            '!' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::BangEqual);
                } else {
                    self.add_token(TokenKind::Bang);
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::LessEqual);
                } else {
                    self.add_token(TokenKind::Less);
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.add_token(TokenKind::GreaterEqual);
                } else {
                    self.add_token(TokenKind::Greater);
                }
            }
            '#' => {
                while self.peek() != '\n' && !self.is_at_end() {
                    self.advance();
                }
            }
            ' ' => {
                if self.line == 1 && self.tokens.is_empty() {
                    self.diagnostics
                        .line_error(self.line, "White space is not allowed on the first line.");
                }
            }
            '\r' => {}
            '\t' => self.diagnostics.line_error(self.line, "Tabs are not allowed."),
            '\n' => {
                self.line += 1;
                if !matches!(
                    self.last_kind(),
                    Option::None | Some(TokenKind::Newline) | Some(TokenKind::Dedent)
                ) {
                    self.add_token(TokenKind::Newline);
                }
            }
            '"' => self.string(),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() => self.identifier(),
            c => self
                .diagnostics
                .line_error(self.line, format!("Unexpected character '{c}'.")),
        }
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() {
            self.advance();
        }

        let kind = match self.lexeme().as_str() {
            "and" => TokenKind::And,
            "break" => TokenKind::Break,
            "class" => TokenKind::Class,
            "continue" => TokenKind::Continue,
            "else" => TokenKind::Else,
            "ensure" => TokenKind::Ensure,
            "false" => TokenKind::False,
            "for" => TokenKind::For,
            "fun" => TokenKind::Fun,
            "if" => TokenKind::If,
            "in" => TokenKind::In,
            "mut" => TokenKind::Mut,
            "none" => TokenKind::None,
            "or" => TokenKind::Or,
            "print" => TokenKind::Print,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "unstable" => TokenKind::Unstable,
            "var" => TokenKind::Var,
            "while" => TokenKind::While,
            _ => TokenKind::Identifier,
        };
        self.add_token(kind);
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // Fractional part, only when a digit follows the dot.
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        match self.lexeme().parse::<f64>() {
            Ok(value) => self.add_literal_token(TokenKind::Number, Literal::Number(value)),
            Err(_) => self
                .diagnostics
                .line_error(self.line, format!("Invalid number literal '{}'.", self.lexeme())),
        }
    }

    fn string(&mut self) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.diagnostics.line_error(self.line, "Unterminated string.");
            return;
        }

        // Closing quote.
        self.advance();

        let text: String = self.chars[self.start + 1..self.current - 1].iter().collect();
        self.add_literal_token(TokenKind::String, Literal::Text(text));
    }

    /// `@ ... @` captures verbatim host-call text as an opaque payload.
    fn host_call(&mut self) {
        while self.peek() != '@' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.diagnostics.line_error(self.line, "Unterminated host call.");
            return;
        }

        self.advance();

        let text: String = self.chars[self.start + 1..self.current - 1].iter().collect();
        self.add_literal_token(TokenKind::HostCall, Literal::Text(text));
    }

    /// Spaces from the character just consumed onward, without consuming.
    fn count_leading_spaces(&self) -> usize {
        let mut position = self.current - 1;
        if self.chars.get(position) != Some(&' ') {
            return 0;
        }
        while position < self.chars.len() && self.chars[position] == ' ' {
            position += 1;
        }
        position - self.current + 1
    }

    fn skip_rest_of_line(&mut self) {
        while self.peek() != '\n' && !self.is_at_end() {
            self.advance();
        }
    }

    fn last_kind(&self) -> Option<TokenKind> {
        self.tokens.last().map(|token| token.kind)
    }

    fn lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.lexeme();
        self.tokens.push(Token::new(kind, lexeme, None, self.line));
    }

    fn add_literal_token(&mut self, kind: TokenKind, literal: Literal) {
        let lexeme = self.lexeme();
        self.tokens
            .push(Token::new(kind, lexeme, Some(literal), self.line));
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }
}
