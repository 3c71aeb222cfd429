use std::rc::Rc;

use crate::token::Token;

/// Identity of a variable-referencing node.
///
/// Two syntactically identical references at different source positions are
/// distinct bindings, so the resolver side-table and the interpreter key on
/// this id rather than on structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

/// Monotonic id source. The driver owns one so ids stay unique across
/// successive REPL inputs feeding the same interpreter.
#[derive(Debug, Default)]
pub struct ExprIdGen(u32);

impl ExprIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> ExprId {
        self.0 += 1;
        ExprId(self.0)
    }
}

/// Literal value embedded directly in the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
}

/// A function or lambda declaration, shared between the statement that
/// introduced it and every runtime function value created from it.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// `None` for lambdas.
    pub name: Option<Token>,
    pub parameters: Vec<Token>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Index {
        collection: Box<Expr>,
        bracket: Token,
        indices: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    Grouping {
        expression: Box<Expr>,
    },
    List {
        elements: Vec<Expr>,
    },
    /// Inclusive numeric range `a..b` or `a,b..c`; the effective increment is
    /// `step - start`, defaulting to 1 when no step expression was written.
    ListConstructor {
        start: Box<Expr>,
        step: Option<Box<Expr>>,
        stop: Box<Expr>,
        token: Token,
    },
    Lambda {
        declaration: Rc<FunctionDecl>,
    },
    Literal {
        value: LiteralValue,
    },
    Variable {
        id: ExprId,
        name: Token,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block {
        statements: Vec<Stmt>,
    },
    Class {
        name: Token,
        methods: Vec<Rc<FunctionDecl>>,
    },
    Expression {
        expression: Expr,
    },
    Function {
        declaration: Rc<FunctionDecl>,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Print {
        expression: Expr,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    /// `var` — single assignment, type fixed with the value.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    /// `mut var` — reassignable, but type stable.
    Mut {
        name: Token,
        initializer: Option<Expr>,
    },
    /// `unstable [mut] var` — reassignable, type free.
    Unstable {
        name: Token,
        initializer: Option<Expr>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Break,
    Continue,
}
