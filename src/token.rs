use std::fmt;

/// Everything the scanner can classify a lexeme as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Colon,
    Slash,
    Star,
    Hat,
    Lambda,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    Assignment,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Ellipsis,
    PlusPlus,
    MinusMinus,

    // Literals
    Identifier,
    String,
    Number,
    HostCall,

    // Keywords
    And,
    Break,
    Class,
    Continue,
    Else,
    Ensure,
    False,
    For,
    Fun,
    If,
    In,
    Mut,
    None,
    Or,
    Print,
    Return,
    True,
    Unstable,
    Var,
    While,

    // Structural
    Newline,
    Indent,
    Dedent,
    Eof,
}

/// Literal payload carried by number, string, and host-call tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
}

/// A lexeme bundled with what the scanner learned about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, literal: Option<Literal>, line: usize) -> Self {
        Self {
            kind,
            lexeme,
            literal,
            line,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.lexeme)
    }
}
