pub mod ast;
pub mod builtins;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod resolver;
pub mod token;
pub mod value;
