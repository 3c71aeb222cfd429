use std::rc::Rc;

use crate::ast::{Expr, ExprIdGen, FunctionDecl, LiteralValue, Stmt};
use crate::diagnostics::Diagnostics;
use crate::token::{Token, TokenKind};

/// Marker for an unrecoverable fault inside one statement; the parser
/// synchronizes to the next statement boundary and keeps going.
struct ParseInterrupt;

type ParseResult<T> = Result<T, ParseInterrupt>;

/// Recursive-descent parser with one-token lookahead.
///
/// Blocks are delimited purely by `Indent`/`Dedent`; a `:` + newline +
/// `Indent` opens one and the matching `Dedent` closes it. Diagnostics
/// accumulate in the shared sink instead of aborting the parse.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    loop_level: u32,
    ids: &'a mut ExprIdGen,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: Vec<Token>,
        ids: &'a mut ExprIdGen,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            tokens,
            current: 0,
            loop_level: 0,
            ids,
            diagnostics,
        }
    }

    pub fn parse(mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        while !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        statements
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_kind(TokenKind::Class) {
            self.class_declaration()
        } else if self.match_kind(TokenKind::Fun) {
            self.function("function")
                .map(|declaration| Stmt::Function { declaration })
        } else if self.match_kind(TokenKind::Var) {
            self.var_declaration()
        } else if self.match_kind(TokenKind::Mut) {
            self.mut_declaration()
        } else if self.match_kind(TokenKind::Unstable) {
            self.unstable_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(statement) => Some(statement),
            Err(ParseInterrupt) => {
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expect class name.")?;
        self.consume(TokenKind::Colon, "Expect ':' after class name.")?;
        self.consume(TokenKind::Newline, "Expect newline after ':'.")?;
        self.consume(TokenKind::Indent, "Expect indent after class name.")?;

        // Methods use the same `fun` form as top-level declarations.
        let mut methods = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.is_at_end() {
            self.consume(TokenKind::Fun, "Expect 'fun' to begin a method.")?;
            methods.push(self.function("method")?);
        }

        self.consume(TokenKind::Dedent, "Expect dedent after class body.")?;
        Ok(Stmt::Class { name, methods })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_kind(TokenKind::For) {
            return self.for_statement();
        }
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::Print) {
            return self.print_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        if self.match_kind(TokenKind::Indent) {
            return Ok(Stmt::Block {
                statements: self.block()?,
            });
        }
        if self.match_kind(TokenKind::Break) {
            return self.break_statement();
        }
        if self.match_kind(TokenKind::Continue) {
            return self.continue_statement();
        }
        self.expression_statement()
    }

    /// `for x in c:` desugars into an unstable iterator initialized to none,
    /// wrapped in a `while true` loop that re-binds `x` from `c` after each
    /// pass. Only the fixed single-variable rebind form is supported, and the
    /// first pass through the body sees the iterator still holding none.
    fn for_statement(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenKind::Identifier, "Expect variable name.")?;
        self.consume(TokenKind::In, "Expect 'in' after variable name.")?;
        let collection =
            self.consume(TokenKind::Identifier, "Expect collection to iterate over.")?;
        self.consume(TokenKind::Colon, "Expect ':' to end 'for'.")?;
        self.consume(TokenKind::Newline, "Expect newline after ':'.")?;

        let body = self.statement()?;

        let rebind = Expr::Assign {
            id: self.ids.next_id(),
            name: name.clone(),
            value: Box::new(Expr::Variable {
                id: self.ids.next_id(),
                name: collection,
            }),
        };
        let body = Stmt::Block {
            statements: vec![body, Stmt::Expression { expression: rebind }],
        };
        let body = Stmt::While {
            condition: Expr::Literal {
                value: LiteralValue::Bool(true),
            },
            body: Box::new(body),
        };
        Ok(Stmt::Block {
            statements: vec![
                Stmt::Unstable {
                    name,
                    initializer: Some(Expr::Literal {
                        value: LiteralValue::None,
                    }),
                },
                body,
            ],
        })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        let condition = self.expression()?;
        self.consume(TokenKind::Colon, "Expect ':' after if condition.")?;
        self.consume(TokenKind::Newline, "Expect newline after ':'.")?;
        let then_branch = Box::new(self.statement()?);

        let mut else_branch = None;
        if self.match_kind(TokenKind::Else) {
            self.consume(TokenKind::Colon, "Expect ':' after 'else'.")?;
            self.consume(TokenKind::Newline, "Expect newline after ':'.")?;
            else_branch = Some(Box::new(self.statement()?));
        }

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn print_statement(&mut self) -> ParseResult<Stmt> {
        let value = self.expression()?;
        self.end_statement("Expect newline after value.")?;
        Ok(Stmt::Print { expression: value })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous();
        let value = if self.check(TokenKind::Newline) {
            None
        } else {
            Some(self.expression()?)
        };
        self.end_statement("Expect newline after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let (name, initializer) = self.binding("Expect newline after variable initialization.")?;
        Ok(Stmt::Var { name, initializer })
    }

    fn mut_declaration(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenKind::Var, "Expect 'var' keyword after 'mut'.")?;
        let (name, initializer) = self.binding("Expect newline after variable declaration.")?;
        Ok(Stmt::Mut { name, initializer })
    }

    fn unstable_declaration(&mut self) -> ParseResult<Stmt> {
        if self.match_kind(TokenKind::Mut) {
            self.consume(TokenKind::Var, "Expect 'var' after keyword 'mut'.")?;
        } else {
            self.consume(TokenKind::Var, "Expect 'var' after keyword 'unstable'.")?;
        }
        let (name, initializer) = self.binding("Expect newline after variable declaration.")?;
        Ok(Stmt::Unstable { name, initializer })
    }

    /// Shared tail of the three declaration forms: name, optional `:=`
    /// initializer, and the comma-list sugar (`var x := 1, 2, 3`).
    fn binding(&mut self, newline_message: &str) -> ParseResult<(Token, Option<Expr>)> {
        let name = self.consume(TokenKind::Identifier, "Expect variable name.")?;

        let mut initializer = None;
        if self.match_kind(TokenKind::Assignment) {
            let mut value = self.expression()?;
            if self.match_kind(TokenKind::Comma) {
                value = self.comma_list(value)?;
            }
            initializer = Some(value);
        }

        self.end_statement(newline_message)?;
        Ok((name, initializer))
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        let condition = self.expression()?;
        self.consume(TokenKind::Colon, "Expect ':' after while condition.")?;
        self.consume(TokenKind::Newline, "Expect newline after ':'.")?;

        self.loop_level += 1;
        let body = self.statement();
        self.loop_level -= 1;

        Ok(Stmt::While {
            condition,
            body: Box::new(body?),
        })
    }

    fn break_statement(&mut self) -> ParseResult<Stmt> {
        if self.loop_level == 0 {
            let token = self.previous();
            return Err(self.error(&token, "'break' statement must be inside a loop."));
        }
        self.end_statement("Expect newline after 'break' statement.")?;
        Ok(Stmt::Break)
    }

    fn continue_statement(&mut self) -> ParseResult<Stmt> {
        if self.loop_level == 0 {
            let token = self.previous();
            return Err(self.error(&token, "'continue' statement must be inside a loop."));
        }
        self.end_statement("Expect newline after 'continue' statement.")?;
        Ok(Stmt::Continue)
    }

    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expression = self.expression()?;
        self.end_statement("Expect newline after expression.")?;
        Ok(Stmt::Expression { expression })
    }

    fn function(&mut self, kind: &str) -> ParseResult<Rc<FunctionDecl>> {
        let name = self.consume(TokenKind::Identifier, &format!("Expect {kind} name."))?;
        self.consume(TokenKind::LeftParen, &format!("Expect '(' after {kind} name."))?;
        let parameters = self.parameters()?;
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;
        self.consume(TokenKind::Colon, &format!("Expect ':' before {kind} body."))?;
        self.consume(TokenKind::Newline, "Expect newline after ':'.")?;
        self.consume(TokenKind::Indent, "Expect indent after ':'.")?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl {
            name: Some(name),
            parameters,
            body,
        }))
    }

    fn lambda_declaration(&mut self) -> ParseResult<Expr> {
        // Parentheses around the parameter list are optional.
        let using_paren = self.match_kind(TokenKind::LeftParen);

        let mut parameters = Vec::new();
        if !(self.check(TokenKind::RightParen) || self.check(TokenKind::Colon)) {
            parameters.push(self.consume(TokenKind::Identifier, "Expect parameter name.")?);
            while self.match_kind(TokenKind::Comma) {
                parameters.push(self.consume(TokenKind::Identifier, "Expect parameter name.")?);
                if parameters.len() >= 5 {
                    let token = self.peek();
                    self.report(&token, "Cannot have more than 5 parameters.");
                }
            }
        }
        if using_paren {
            self.consume(TokenKind::RightParen, "Expect ')' after parameters.")?;
        }
        self.consume(TokenKind::Colon, "Expect ':' before lambda body.")?;

        // The body is a single expression, wrapped as an implicit return.
        let value = self.expression()?;
        let body = vec![Stmt::Return {
            keyword: self.previous(),
            value: Some(value),
        }];

        Ok(Expr::Lambda {
            declaration: Rc::new(FunctionDecl {
                name: None,
                parameters,
                body,
            }),
        })
    }

    fn parameters(&mut self) -> ParseResult<Vec<Token>> {
        let mut parameters = Vec::new();
        if !self.check(TokenKind::RightParen) {
            parameters.push(self.consume(TokenKind::Identifier, "Expect parameter name.")?);
            while self.match_kind(TokenKind::Comma) {
                parameters.push(self.consume(TokenKind::Identifier, "Expect parameter name.")?);
                if parameters.len() >= 5 {
                    let token = self.peek();
                    self.report(&token, "Cannot have more than 5 parameters.");
                }
            }
        }
        Ok(parameters)
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        self.consume(TokenKind::Dedent, "Expect dedentation after block.")?;
        Ok(statements)
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.logical_or()?;
        if self.match_kind(TokenKind::Assignment) {
            let equals = self.previous();
            let mut value = self.assignment()?;
            if self.match_kind(TokenKind::Comma) {
                value = self.comma_list(value)?;
            }

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    id: self.ids.next_id(),
                    name,
                    value: Box::new(value),
                }),
                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value: Box::new(value),
                }),
                other => {
                    // Report but keep the expression so parsing continues.
                    self.report(&equals, "Invalid assignment target.");
                    Ok(other)
                }
            };
        }
        Ok(expr)
    }

    /// Extends an already-parsed first element with the trailing comma-list
    /// sugar used by declarations and assignments.
    fn comma_list(&mut self, first: Expr) -> ParseResult<Expr> {
        match self.inner_list()? {
            Expr::List { mut elements } => {
                elements.insert(0, first);
                Ok(Expr::List { elements })
            }
            other => {
                let token = self.previous();
                self.report(&token, "Expect list elements after ','.");
                Ok(other)
            }
        }
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.logical_and()?;
        while self.match_kind(TokenKind::Or) {
            let operator = self.previous();
            let right = self.logical_and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;
        while self.match_kind(TokenKind::And) {
            let operator = self.previous();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.comparison()?;
        while self.match_kinds(&[TokenKind::BangEqual, TokenKind::Equal]) {
            let operator = self.previous();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.addition()?;
        while self.match_kinds(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let operator = self.previous();
            let right = self.addition()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn addition(&mut self) -> ParseResult<Expr> {
        let mut expr = self.list_construction()?;
        while self.match_kinds(&[TokenKind::Minus, TokenKind::Plus]) {
            let operator = self.previous();
            let right = self.list_construction()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn list_construction(&mut self) -> ParseResult<Expr> {
        if self.match_kind(TokenKind::LeftBracket) {
            let list = self.inner_list()?;
            self.consume(TokenKind::RightBracket, "Expect ']' to close list.")?;
            return Ok(list);
        }
        self.multiplication()
    }

    /// Either an explicit comma list or one of the two range-with-ellipsis
    /// forms: `a..b`, or `a,b..c` which encodes an explicit step as `b - a`.
    fn inner_list(&mut self) -> ParseResult<Expr> {
        let mut elements = vec![self.expression()?];

        if self.match_kind(TokenKind::Ellipsis) {
            let token = self.previous();
            let stop = self.expression()?;
            let start = elements
                .pop()
                .unwrap_or(Expr::Literal { value: LiteralValue::None });
            return Ok(Expr::ListConstructor {
                start: Box::new(start),
                step: None,
                stop: Box::new(stop),
                token,
            });
        }

        while self.match_kind(TokenKind::Comma) {
            elements.push(self.expression()?);
            if elements.len() == 2 && self.match_kind(TokenKind::Ellipsis) {
                let token = self.previous();
                let stop = self.multiplication()?;
                let step = elements
                    .pop()
                    .unwrap_or(Expr::Literal { value: LiteralValue::None });
                let start = elements
                    .pop()
                    .unwrap_or(Expr::Literal { value: LiteralValue::None });
                return Ok(Expr::ListConstructor {
                    start: Box::new(start),
                    step: Some(Box::new(step)),
                    stop: Box::new(stop),
                    token,
                });
            }
        }
        Ok(Expr::List { elements })
    }

    fn multiplication(&mut self) -> ParseResult<Expr> {
        let mut expr = self.exponentiation()?;
        while self.match_kinds(&[TokenKind::Slash, TokenKind::Star]) {
            let operator = self.previous();
            let right = self.exponentiation()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn exponentiation(&mut self) -> ParseResult<Expr> {
        let mut expr = self.unary()?;
        while self.match_kind(TokenKind::Hat) {
            let operator = self.previous();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_kinds(&[
            TokenKind::Bang,
            TokenKind::Minus,
            TokenKind::PlusPlus,
            TokenKind::MinusMinus,
        ]) {
            let operator = self.previous();
            let right = self.unary()?;
            if matches!(operator.kind, TokenKind::PlusPlus | TokenKind::MinusMinus)
                && !matches!(right, Expr::Variable { .. })
            {
                self.report(&operator, "Invalid assignment target.");
            }
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.indexation()?;
        loop {
            if self.match_kind(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.match_kind(TokenKind::Dot) {
                let name =
                    self.consume(TokenKind::Identifier, "Expect property name after '.'.")?;
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightParen) {
            arguments.push(self.expression()?);
            while self.match_kind(TokenKind::Comma) {
                if arguments.len() >= 5 {
                    let token = self.peek();
                    self.report(&token, "Cannot have more than 5 arguments.");
                }
                arguments.push(self.expression()?);
            }
        }
        let paren = self.consume(TokenKind::RightParen, "Expect ')' after arguments.")?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn indexation(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        while self.match_kind(TokenKind::LeftBracket) {
            expr = self.finish_indexation(expr)?;
        }
        Ok(expr)
    }

    fn finish_indexation(&mut self, collection: Expr) -> ParseResult<Expr> {
        let mut indices = Vec::new();
        if !self.check(TokenKind::RightBracket) {
            indices.push(self.expression()?);
            while self.match_kind(TokenKind::Comma) {
                indices.push(self.expression()?);
            }
        }
        let bracket = self.consume(TokenKind::RightBracket, "Expect ']' after indices.")?;
        Ok(Expr::Index {
            collection: Box::new(collection),
            bracket,
            indices,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.expression()?;
            self.consume(TokenKind::RightParen, "Expect ')' after expression.")?;
            return Ok(Expr::Grouping {
                expression: Box::new(expr),
            });
        }

        if self.match_kind(TokenKind::False) {
            return Ok(Expr::Literal {
                value: LiteralValue::Bool(false),
            });
        }
        if self.match_kind(TokenKind::True) {
            return Ok(Expr::Literal {
                value: LiteralValue::Bool(true),
            });
        }
        if self.match_kind(TokenKind::None) {
            return Ok(Expr::Literal {
                value: LiteralValue::None,
            });
        }

        if self.match_kinds(&[TokenKind::Number, TokenKind::String]) {
            let token = self.previous();
            let value = match token.literal {
                Some(crate::token::Literal::Number(n)) => LiteralValue::Number(n),
                Some(crate::token::Literal::Text(s)) => LiteralValue::Str(s),
                Option::None => LiteralValue::None,
            };
            return Ok(Expr::Literal { value });
        }

        if self.match_kind(TokenKind::Identifier) {
            return Ok(Expr::Variable {
                id: self.ids.next_id(),
                name: self.previous(),
            });
        }

        if self.match_kind(TokenKind::Lambda) {
            return self.lambda_declaration();
        }

        let token = self.peek();
        Err(self.error(&token, "Expected expression."))
    }

    /// Consumes the statement-terminating newline, tolerating end of input so
    /// the final line of a file needs no trailing newline.
    fn end_statement(&mut self, message: &str) -> ParseResult<()> {
        if !self.is_at_end() {
            self.consume(TokenKind::Newline, message)?;
        }
        Ok(())
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn match_kinds(&mut self, kinds: &[TokenKind]) -> bool {
        for &kind in kinds {
            if self.match_kind(kind) {
                return true;
            }
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        let token = self.peek();
        Err(self.error(&token, message))
    }

    fn check(&self, kind: TokenKind) -> bool {
        // A trailing dedent directly before EOF still counts as end of
        // input, but remains consumable as a dedent.
        if self.is_at_end() && kind != TokenKind::Dedent {
            return false;
        }
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        let token = &self.tokens[self.current];
        token.kind == TokenKind::Eof
            || (token.kind == TokenKind::Dedent
                && self
                    .tokens
                    .get(self.current + 1)
                    .is_some_and(|next| next.kind == TokenKind::Eof))
    }

    fn peek(&self) -> Token {
        self.tokens[self.current].clone()
    }

    fn previous(&self) -> Token {
        self.tokens[self.current - 1].clone()
    }

    /// Report a diagnostic and interrupt the current statement.
    fn error(&mut self, token: &Token, message: &str) -> ParseInterrupt {
        self.diagnostics.token_error(token, message);
        ParseInterrupt
    }

    /// Report a diagnostic without interrupting.
    fn report(&mut self, token: &Token, message: &str) {
        self.diagnostics.token_error(token, message);
    }

    /// Discard tokens until a probable statement boundary: just past a
    /// newline, or in front of a token that can start a statement.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Newline {
                return;
            }
            if matches!(
                self.peek().kind,
                TokenKind::Fun
                    | TokenKind::Var
                    | TokenKind::For
                    | TokenKind::If
                    | TokenKind::While
                    | TokenKind::Print
                    | TokenKind::Return
                    | TokenKind::Mut
            ) {
                return;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Scanner;
    use indoc::indoc;

    fn parse(source: &str) -> (Vec<Stmt>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new(source, &mut diagnostics).scan_tokens();
        let mut ids = ExprIdGen::new();
        let statements = Parser::new(tokens, &mut ids, &mut diagnostics).parse();
        (statements, diagnostics)
    }

    fn parse_clean(source: &str) -> Vec<Stmt> {
        let (statements, diagnostics) = parse(source);
        let messages: Vec<_> = diagnostics.iter().map(ToString::to_string).collect();
        assert!(messages.is_empty(), "unexpected diagnostics: {messages:?}");
        statements
    }

    #[test]
    fn parses_declaration_forms_into_distinct_variants() {
        let statements = parse_clean(indoc! {"
            var a := 1
            mut var b := 2
            unstable var c := 3
            unstable mut var d := 4
        "});
        assert!(matches!(statements[0], Stmt::Var { .. }));
        assert!(matches!(statements[1], Stmt::Mut { .. }));
        assert!(matches!(statements[2], Stmt::Unstable { .. }));
        assert!(matches!(statements[3], Stmt::Unstable { .. }));
    }

    #[test]
    fn comma_sugar_builds_a_list_initializer() {
        let statements = parse_clean("var xs := 1, 2, 3\n");
        let Stmt::Var { initializer, .. } = &statements[0] else {
            panic!("expected var declaration");
        };
        let Some(Expr::List { elements }) = initializer else {
            panic!("expected list initializer, got {initializer:?}");
        };
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn parses_both_range_forms() {
        let statements = parse_clean("var a := [1..5]\nvar b := [1, 3..9]\n");
        let Stmt::Var { initializer: Some(first), .. } = &statements[0] else {
            panic!("expected var declaration");
        };
        assert!(matches!(
            first,
            Expr::ListConstructor { step: Option::None, .. }
        ));
        let Stmt::Var { initializer: Some(second), .. } = &statements[1] else {
            panic!("expected var declaration");
        };
        assert!(matches!(
            second,
            Expr::ListConstructor { step: Some(_), .. }
        ));
    }

    #[test]
    fn precedence_puts_addition_below_multiplication() {
        let statements = parse_clean("print 1 + 2 * 3\n");
        let Stmt::Print { expression } = &statements[0] else {
            panic!("expected print statement");
        };
        let Expr::Binary { operator, right, .. } = expression else {
            panic!("expected binary expression");
        };
        assert_eq!(operator.lexeme, "+");
        assert!(matches!(**right, Expr::Binary { .. }));
    }

    #[test]
    fn exponentiation_binds_tighter_than_multiplication() {
        let statements = parse_clean("print 2 * 3 ^ 4\n");
        let Stmt::Print { expression } = &statements[0] else {
            panic!("expected print statement");
        };
        let Expr::Binary { operator, right, .. } = expression else {
            panic!("expected binary expression");
        };
        assert_eq!(operator.lexeme, "*");
        let Expr::Binary { operator, .. } = &**right else {
            panic!("expected nested exponentiation");
        };
        assert_eq!(operator.lexeme, "^");
    }

    #[test]
    fn single_equals_is_the_equality_operator() {
        let statements = parse_clean("print 1 = 2\n");
        let Stmt::Print { expression } = &statements[0] else {
            panic!("expected print statement");
        };
        let Expr::Binary { operator, .. } = expression else {
            panic!("expected binary expression");
        };
        assert_eq!(operator.kind, TokenKind::Equal);
    }

    #[test]
    fn desugars_for_into_unstable_iterator_and_while_loop() {
        let statements = parse_clean(indoc! {"
            for x in xs:
                print x
        "});
        let Stmt::Block { statements: outer } = &statements[0] else {
            panic!("expected desugared block");
        };
        assert!(matches!(
            outer[0],
            Stmt::Unstable {
                initializer: Some(Expr::Literal { value: LiteralValue::None }),
                ..
            }
        ));
        let Stmt::While { condition, body } = &outer[1] else {
            panic!("expected while loop");
        };
        assert!(matches!(
            condition,
            Expr::Literal { value: LiteralValue::Bool(true) }
        ));
        let Stmt::Block { statements: inner } = &**body else {
            panic!("expected loop body block");
        };
        assert_eq!(inner.len(), 2);
        assert!(matches!(
            inner[1],
            Stmt::Expression { expression: Expr::Assign { .. } }
        ));
    }

    #[test]
    fn rejects_break_outside_a_loop() {
        let (_, diagnostics) = parse("break\n");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "'break' statement must be inside a loop."));
    }

    #[test]
    fn rejects_continue_outside_a_loop() {
        let (_, diagnostics) = parse("continue\n");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "'continue' statement must be inside a loop."));
    }

    #[test]
    fn for_loops_do_not_open_a_break_context() {
        // Only `while` increments the loop nesting counter.
        let (_, diagnostics) = parse(indoc! {"
            for x in xs:
                break
        "});
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "'break' statement must be inside a loop."));
    }

    #[test]
    fn allows_break_inside_while() {
        let statements = parse_clean(indoc! {"
            while true:
                break
        "});
        assert!(matches!(statements[0], Stmt::While { .. }));
    }

    #[test]
    fn caps_call_arguments_at_five_without_aborting() {
        let (statements, diagnostics) = parse("f(1, 2, 3, 4, 5, 6)\n");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Cannot have more than 5 arguments."));
        // The call still parses with all its arguments.
        let Stmt::Expression { expression: Expr::Call { arguments, .. } } = &statements[0] else {
            panic!("expected call expression");
        };
        assert_eq!(arguments.len(), 6);
    }

    #[test]
    fn recovers_at_statement_boundaries_and_reports_every_fault() {
        let (statements, diagnostics) = parse(indoc! {"
            var := 1
            print 2
            var := 3
            print 4
        "});
        // Both malformed declarations are reported, both prints survive.
        assert_eq!(
            diagnostics
                .iter()
                .filter(|d| d.message == "Expect variable name.")
                .count(),
            2
        );
        assert_eq!(
            statements
                .iter()
                .filter(|s| matches!(s, Stmt::Print { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn parses_lambda_with_and_without_parentheses() {
        let statements = parse_clean("var f := \\x: x + 1\nvar g := λ(a, b): a + b\n");
        for statement in &statements {
            let Stmt::Var { initializer: Some(Expr::Lambda { declaration }), .. } = statement
            else {
                panic!("expected lambda initializer");
            };
            assert!(matches!(
                declaration.body[0],
                Stmt::Return { value: Some(_), .. }
            ));
        }
    }

    #[test]
    fn chains_calls_indexing_and_property_access() {
        let statements = parse_clean("print box.unwrap()\n");
        let Stmt::Print { expression } = &statements[0] else {
            panic!("expected print");
        };
        let Expr::Call { callee, .. } = expression else {
            panic!("expected call");
        };
        assert!(matches!(**callee, Expr::Get { .. }));
    }

    #[test]
    fn multi_index_form_keeps_every_index() {
        let statements = parse_clean("print xs[0, 2, 4]\n");
        let Stmt::Print { expression } = &statements[0] else {
            panic!("expected print");
        };
        let Expr::Index { indices, .. } = expression else {
            panic!("expected index expression");
        };
        assert_eq!(indices.len(), 3);
    }

    #[test]
    fn assignment_to_a_property_becomes_set() {
        let statements = parse_clean("box.value := 9\n");
        assert!(matches!(
            statements[0],
            Stmt::Expression { expression: Expr::Set { .. } }
        ));
    }

    #[test]
    fn invalid_assignment_target_reports_but_keeps_parsing() {
        let (statements, diagnostics) = parse("1 := 2\nprint 3\n");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Invalid assignment target."));
        assert!(statements
            .iter()
            .any(|s| matches!(s, Stmt::Print { .. })));
    }

    #[test]
    fn return_outside_newline_tolerates_end_of_input() {
        // No trailing newline on the final statement.
        let statements = parse_clean("var x := 1");
        assert!(matches!(statements[0], Stmt::Var { .. }));
    }

    #[test]
    fn class_bodies_hold_methods() {
        let statements = parse_clean(indoc! {"
            class Box:
                fun unwrap(self):
                    return self
        "});
        let Stmt::Class { methods, .. } = &statements[0] else {
            panic!("expected class declaration");
        };
        assert_eq!(methods.len(), 1);
        assert_eq!(
            methods[0].name.as_ref().map(|t| t.lexeme.clone()),
            Some("unwrap".to_string())
        );
    }

    #[test]
    fn class_methods_require_the_fun_keyword() {
        let (_, diagnostics) = parse(indoc! {"
            class Box:
                unwrap():
                    return 1
        "});
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Expect 'fun' to begin a method."));
    }

    #[test]
    fn increment_requires_a_variable_target() {
        let (_, diagnostics) = parse("++1\n");
        assert!(diagnostics
            .iter()
            .any(|d| d.message == "Invalid assignment target."));
    }
}
