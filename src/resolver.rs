use rustc_hash::FxHashMap;

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::builtins;
use crate::diagnostics::Diagnostics;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingState {
    /// Declared but its initializer has not finished resolving.
    Declared,
    Defined,
    Used,
    /// Host builtin; exempt from use tracking and shadowing.
    Core,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    state: BindingState,
    line: usize,
    /// Whether the declaration carried an initializer; declared-but-empty
    /// slots get a different unused-variable message.
    initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
}

/// Static pass between parsing and execution.
///
/// Walks the tree once, mapping every variable reference to the number of
/// environment hops between its use site and its declaring scope. References
/// that stay unresolved fall back to the global scope at runtime. Also
/// reports declaration-shape problems the parser cannot see: shadowing,
/// self-referential initializers, unused locals, and top-level `return`.
pub struct Resolver<'a> {
    scopes: Vec<FxHashMap<String, Binding>>,
    locals: FxHashMap<ExprId, usize>,
    current_function: FunctionType,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Resolver<'a> {
    pub fn new(diagnostics: &'a mut Diagnostics) -> Self {
        let mut globals = FxHashMap::default();
        for name in builtins::names() {
            globals.insert(
                name.to_string(),
                Binding {
                    state: BindingState::Core,
                    line: 0,
                    initialized: true,
                },
            );
        }
        Self {
            scopes: vec![globals],
            locals: FxHashMap::default(),
            current_function: FunctionType::None,
            diagnostics,
        }
    }

    pub fn resolve(mut self, statements: &[Stmt]) -> FxHashMap<ExprId, usize> {
        self.resolve_statements(statements);
        self.locals
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Block { statements } => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Stmt::Class { name, methods } => {
                self.declare(name);
                self.define(name, true);
                for method in methods {
                    self.resolve_function(method);
                }
            }
            Stmt::Expression { expression } | Stmt::Print { expression } => {
                self.resolve_expression(expression);
            }
            Stmt::Function { declaration } => {
                if let Some(name) = &declaration.name {
                    self.declare(name);
                    self.define(name, true);
                }
                self.resolve_function(declaration);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expression(condition);
                self.resolve_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.diagnostics
                        .token_error(keyword, "Cannot return from top-level code.");
                }
                if let Some(value) = value {
                    self.resolve_expression(value);
                }
            }
            Stmt::Var { name, initializer }
            | Stmt::Mut { name, initializer }
            | Stmt::Unstable { name, initializer } => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expression(initializer);
                }
                // The slot becomes referenceable even without an initializer;
                // a first assignment may come later. Reading before that is a
                // runtime fault, not a resolution one.
                self.define(name, initializer.is_some());
            }
            Stmt::While { condition, body } => {
                self.resolve_expression(condition);
                self.resolve_statement(body);
            }
            Stmt::Break | Stmt::Continue => {}
        }
    }

    fn resolve_expression(&mut self, expression: &Expr) {
        match expression {
            Expr::Assign { id, name, value } => {
                self.resolve_expression(value);
                self.resolve_local(*id, name, false);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expression(left);
                self.resolve_expression(right);
            }
            Expr::Unary { right, .. } => self.resolve_expression(right),
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expression(callee);
                for argument in arguments {
                    self.resolve_expression(argument);
                }
            }
            Expr::Index {
                collection, indices, ..
            } => {
                self.resolve_expression(collection);
                for index in indices {
                    self.resolve_expression(index);
                }
            }
            Expr::Get { object, .. } => self.resolve_expression(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expression(object);
                self.resolve_expression(value);
            }
            Expr::Grouping { expression } => self.resolve_expression(expression),
            Expr::List { elements } => {
                for element in elements {
                    self.resolve_expression(element);
                }
            }
            Expr::ListConstructor {
                start, step, stop, ..
            } => {
                self.resolve_expression(start);
                if let Some(step) = step {
                    self.resolve_expression(step);
                }
                self.resolve_expression(stop);
            }
            Expr::Lambda { declaration } => self.resolve_function(declaration),
            Expr::Literal { .. } => {}
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last()
                    && scope.get(&name.lexeme).map(|binding| binding.state)
                        == Some(BindingState::Declared)
                {
                    self.diagnostics.token_error(
                        name,
                        "Cannot read local variable in its own initializer.",
                    );
                }
                self.resolve_local(*id, name, true);
            }
        }
    }

    /// The call frame holds parameters and body locals in one scope, so the
    /// resolver mirrors that with a single scope for both.
    fn resolve_function(&mut self, declaration: &FunctionDecl) {
        let enclosing = self.current_function;
        self.current_function = FunctionType::Function;

        self.begin_scope();
        for parameter in &declaration.parameters {
            self.declare(parameter);
            self.define(parameter, true);
        }
        self.resolve_statements(&declaration.body);
        self.end_scope();

        self.current_function = enclosing;
    }

    fn begin_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        for (name, binding) in &scope {
            match binding.state {
                BindingState::Declared | BindingState::Defined => {
                    let verb = if binding.initialized { "defined" } else { "declared" };
                    self.diagnostics.line_error(
                        binding.line,
                        format!("Local variable '{name}' is {verb} but not used."),
                    );
                }
                BindingState::Used | BindingState::Core => {}
            }
        }
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if let Some(existing) = scope.get(&name.lexeme) {
            let message = if existing.state == BindingState::Core {
                "Cannot redefine core variable."
            } else {
                "A variable with this name was already declared in this scope."
            };
            self.diagnostics.token_error(name, message);
            return;
        }
        scope.insert(
            name.lexeme.clone(),
            Binding {
                state: BindingState::Declared,
                line: name.line,
                initialized: false,
            },
        );
    }

    fn define(&mut self, name: &Token, initialized: bool) {
        if let Some(scope) = self.scopes.last_mut()
            && let Some(binding) = scope.get_mut(&name.lexeme)
            && binding.state == BindingState::Declared
        {
            binding.state = BindingState::Defined;
            binding.initialized = initialized;
        }
    }

    /// Record the hop count from the innermost scope to the one declaring
    /// `name`. Unfound names get no entry and resolve globally at runtime.
    fn resolve_local(&mut self, id: ExprId, name: &Token, is_read: bool) {
        for (i, scope) in self.scopes.iter_mut().enumerate().rev() {
            if let Some(binding) = scope.get_mut(&name.lexeme) {
                if is_read && binding.state != BindingState::Core {
                    binding.state = BindingState::Used;
                }
                self.locals.insert(id, self.scopes.len() - 1 - i);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprIdGen;
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use indoc::indoc;

    fn resolve(source: &str) -> Vec<String> {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new(source, &mut diagnostics).scan_tokens();
        let mut ids = ExprIdGen::new();
        let statements = Parser::new(tokens, &mut ids, &mut diagnostics).parse();
        assert!(!diagnostics.had_error(), "source failed to parse");
        Resolver::new(&mut diagnostics).resolve(&statements);
        diagnostics.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn clean_programs_produce_no_diagnostics() {
        let messages = resolve(indoc! {"
            fun double(n):
                return n * 2
            print double(4)
        "});
        assert!(messages.is_empty(), "unexpected: {messages:?}");
    }

    #[test]
    fn flags_unused_locals_but_not_globals() {
        let messages = resolve(indoc! {"
            var top := 1
            fun f():
                var inner := 2
                return 3
            print f()
        "});
        assert_eq!(
            messages,
            vec!["Local variable 'inner' is defined but not used.".to_string()]
        );
    }

    #[test]
    fn flags_declared_but_never_assigned_locals() {
        let messages = resolve(indoc! {"
            fun f():
                mut var pending
                return 0
            print f()
        "});
        assert_eq!(
            messages,
            vec!["Local variable 'pending' is declared but not used.".to_string()]
        );
    }

    #[test]
    fn declared_locals_accept_a_later_first_assignment() {
        // A declaration without an initializer still produces a referenceable
        // binding; reading it before assignment is a runtime concern.
        let messages = resolve(indoc! {"
            fun f():
                mut var pending
                pending := 1
                return pending
            print f()
        "});
        assert!(messages.is_empty(), "unexpected: {messages:?}");
    }

    #[test]
    fn flags_redeclaration_in_the_same_scope() {
        let messages = resolve(indoc! {"
            fun f():
                var x := 1
                var x := 2
                return x
            print f()
        "});
        assert!(messages
            .contains(&"A variable with this name was already declared in this scope.".to_string()));
    }

    #[test]
    fn protects_core_builtins_from_redefinition() {
        let messages = resolve("var len := 3\n");
        assert_eq!(messages, vec!["Cannot redefine core variable.".to_string()]);
    }

    #[test]
    fn flags_self_referential_initializers() {
        let messages = resolve(indoc! {"
            fun f():
                var a := 1
                if true:
                    var a := a
                    print a
                return a
            print f()
        "});
        assert!(messages
            .contains(&"Cannot read local variable in its own initializer.".to_string()));
    }

    #[test]
    fn rejects_top_level_return() {
        let messages = resolve("return 5\n");
        assert_eq!(messages, vec!["Cannot return from top-level code.".to_string()]);
    }

    #[test]
    fn lambda_bodies_may_return() {
        let messages = resolve("var f := \\x: x\nprint f(1)\n");
        assert!(messages.is_empty(), "unexpected: {messages:?}");
    }

    #[test]
    fn hop_counts_point_at_the_declaring_scope() {
        let mut diagnostics = Diagnostics::new();
        let source = indoc! {"
            fun outer():
                var x := 1
                fun inner():
                    return x
                return inner()
            print outer()
        "};
        let tokens = Scanner::new(source, &mut diagnostics).scan_tokens();
        let mut ids = ExprIdGen::new();
        let statements = Parser::new(tokens, &mut ids, &mut diagnostics).parse();
        let locals = Resolver::new(&mut diagnostics).resolve(&statements);

        // `x` inside `inner` sits one hop out; `inner` itself is local.
        assert!(locals.values().any(|&hops| hops == 1));
    }
}
