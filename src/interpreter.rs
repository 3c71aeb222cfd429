use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{Expr, ExprId, LiteralValue, Stmt};
use crate::builtins;
use crate::environment::{Attributes, EnvRef, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::printer::Printer;
use crate::token::{Token, TokenKind};
use crate::value::{Class, Function, Instance, Value};

/// How a statement finished. `break`/`continue`/`return` unwind through
/// enclosing blocks as ordinary values until a loop or call frame absorbs
/// them; none of them ever escapes `interpret`.
#[derive(Debug)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Tree-walking evaluator over a chain of reference-counted environments.
///
/// Variable references resolved by the static pass are read and written at
/// their recorded hop distance; everything else falls back to the global
/// scope. The interpreter outlives individual runs so a REPL can keep its
/// state across inputs.
pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: FxHashMap<ExprId, usize>,
    printer: Printer,
}

impl Interpreter {
    pub fn new(printer: Printer) -> Self {
        let globals = Environment::new();
        builtins::install(&globals);
        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: FxHashMap::default(),
            printer,
        }
    }

    /// Merge in the side-table from the latest resolver pass.
    pub fn add_locals(&mut self, locals: FxHashMap<ExprId, usize>) {
        self.locals.extend(locals);
    }

    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        for statement in statements {
            if !matches!(self.execute(statement)?, Flow::Normal) {
                break;
            }
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Stmt) -> Result<Flow, RuntimeError> {
        match statement {
            Stmt::Block { statements } => {
                let scope = Environment::with_enclosing(Rc::clone(&self.environment));
                self.execute_block(statements, scope)
            }
            Stmt::Class { name, methods } => {
                let mut table = FxHashMap::default();
                for declaration in methods {
                    let method = Rc::new(Function {
                        declaration: Rc::clone(declaration),
                        closure: Rc::clone(&self.environment),
                    });
                    if let Some(method_name) = &declaration.name {
                        table.insert(method_name.lexeme.clone(), method);
                    }
                }
                let class = Rc::new(Class {
                    name: name.lexeme.clone(),
                    methods: table,
                });
                self.environment.borrow_mut().define(
                    name.clone(),
                    Some(Value::Class(class)),
                    Attributes::FUNCTION,
                );
                Ok(Flow::Normal)
            }
            Stmt::Expression { expression } => {
                self.evaluate(expression)?;
                Ok(Flow::Normal)
            }
            Stmt::Function { declaration } => {
                let function = Value::Function(Rc::new(Function {
                    declaration: Rc::clone(declaration),
                    closure: Rc::clone(&self.environment),
                }));
                if let Some(name) = &declaration.name {
                    self.environment.borrow_mut().define(
                        name.clone(),
                        Some(function),
                        Attributes::FUNCTION,
                    );
                }
                Ok(Flow::Normal)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::Print { expression } => {
                let value = self.evaluate(expression)?;
                self.printer.println(value.stringify());
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expression) => self.evaluate(expression)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Var { name, initializer } => {
                self.declare(name, initializer, Attributes::empty())
            }
            Stmt::Mut { name, initializer } => {
                self.declare(name, initializer, Attributes::MUTABLE)
            }
            Stmt::Unstable { name, initializer } => {
                self.declare(name, initializer, Attributes::MUTABLE | Attributes::UNSTABLE)
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn declare(
        &mut self,
        name: &Token,
        initializer: &Option<Expr>,
        attributes: Attributes,
    ) -> Result<Flow, RuntimeError> {
        let value = match initializer {
            Some(expression) => Some(self.evaluate(expression)?),
            None => None,
        };
        self.environment
            .borrow_mut()
            .define(name.clone(), value, attributes);
        Ok(Flow::Normal)
    }

    /// Run `statements` in `scope`, restoring the previous environment no
    /// matter how the block exits.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        scope: EnvRef,
    ) -> Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.environment, scope);
        let mut outcome = Ok(Flow::Normal);
        for statement in statements {
            match self.execute(statement) {
                Ok(Flow::Normal) => {}
                other => {
                    outcome = other;
                    break;
                }
            }
        }
        self.environment = previous;
        outcome
    }

    fn evaluate(&mut self, expression: &Expr) -> Result<Value, RuntimeError> {
        match expression {
            Expr::Literal { value } => Ok(match value {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::Str(s.clone()),
                LiteralValue::Bool(b) => Value::Bool(*b),
                LiteralValue::None => Value::None,
            }),
            Expr::Grouping { expression } => self.evaluate(expression),
            Expr::Variable { id, name } => self.lookup_variable(*id, name),
            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                self.assign_variable(*id, name, value)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                if operator.kind == TokenKind::Or {
                    if left.is_truthy() {
                        return Ok(left);
                    }
                } else if !left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right)
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary(operator, left, right)
            }
            Expr::Unary { operator, right } => self.unary(operator, right),
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;
                let mut evaluated = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    evaluated.push(self.evaluate(argument)?);
                }
                self.call(callee, evaluated, paren)
            }
            Expr::Index {
                collection,
                bracket,
                indices,
            } => {
                let collection = self.evaluate(collection)?;
                let mut evaluated = Vec::with_capacity(indices.len());
                for index in indices {
                    evaluated.push(self.evaluate(index)?);
                }
                self.index(collection, evaluated, bracket)
            }
            Expr::Get { object, name } => {
                let object = self.evaluate(object)?;
                let Value::Instance(instance) = object else {
                    return Err(RuntimeError::new(
                        name.line,
                        RuntimeErrorKind::PropertyOnNonInstance,
                    ));
                };
                let instance = instance.borrow();
                if let Some(value) = instance.fields.get(&name.lexeme) {
                    return Ok(value.clone());
                }
                if let Some(class) = instance.class.upgrade()
                    && let Some(method) = class.find_method(&name.lexeme)
                {
                    return Ok(Value::Function(method));
                }
                Err(RuntimeError::new(
                    name.line,
                    RuntimeErrorKind::UndefinedProperty {
                        name: name.lexeme.clone(),
                    },
                ))
            }
            Expr::Set {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(object)?;
                let Value::Instance(instance) = object else {
                    return Err(RuntimeError::new(
                        name.line,
                        RuntimeErrorKind::FieldOnNonInstance,
                    ));
                };
                let value = self.evaluate(value)?;
                instance
                    .borrow_mut()
                    .fields
                    .insert(name.lexeme.clone(), value.clone());
                Ok(value)
            }
            Expr::List { elements } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Value::List(Rc::new(values)))
            }
            Expr::ListConstructor {
                start,
                step,
                stop,
                token,
            } => {
                let start = self.range_bound(start, token)?;
                let step = match step {
                    Some(step) => Some(self.range_bound(step, token)?),
                    None => None,
                };
                let stop = self.range_bound(stop, token)?;
                self.range_list(start, step, stop, token)
            }
            Expr::Lambda { declaration } => Ok(Value::Function(Rc::new(Function {
                declaration: Rc::clone(declaration),
                closure: Rc::clone(&self.environment),
            }))),
        }
    }

    fn lookup_variable(&self, id: ExprId, name: &Token) -> Result<Value, RuntimeError> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name),
            None => self.globals.borrow().get(name),
        }
    }

    fn assign_variable(
        &mut self,
        id: ExprId,
        name: &Token,
        value: Value,
    ) -> Result<Value, RuntimeError> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::assign_at(&self.environment, distance, name, value),
            None => self.globals.borrow_mut().assign(name, value),
        }
    }

    fn binary(
        &mut self,
        operator: &Token,
        left: Value,
        right: Value,
    ) -> Result<Value, RuntimeError> {
        match operator.kind {
            TokenKind::Minus => {
                let (l, r) = self.number_operands(operator, &left, &right)?;
                Ok(Value::Number(l - r))
            }
            TokenKind::Star => {
                let (l, r) = self.number_operands(operator, &left, &right)?;
                Ok(Value::Number(l * r))
            }
            TokenKind::Slash => {
                let (l, r) = self.number_operands(operator, &left, &right)?;
                if r == 0.0 {
                    return Err(RuntimeError::new(
                        operator.line,
                        RuntimeErrorKind::DivisionByZero,
                    ));
                }
                Ok(Value::Number(l / r))
            }
            TokenKind::Hat => {
                let (l, r) = self.number_operands(operator, &left, &right)?;
                Ok(Value::Number(l.powf(r)))
            }
            TokenKind::Plus => match (&left, &right) {
                (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                (Value::Str(l), Value::Str(r)) => Ok(Value::Str(format!("{l}{r}"))),
                (Value::List(l), Value::List(r)) => {
                    let mut joined = l.as_ref().clone();
                    joined.extend(r.iter().cloned());
                    Ok(Value::List(Rc::new(joined)))
                }
                _ => Err(RuntimeError::new(
                    operator.line,
                    RuntimeErrorKind::AdditionTypeMismatch,
                )),
            },
            TokenKind::Greater => self.comparison(operator, left, right, |l, r| l > r),
            TokenKind::GreaterEqual => self.comparison(operator, left, right, |l, r| l >= r),
            TokenKind::Less => self.comparison(operator, left, right, |l, r| l < r),
            TokenKind::LessEqual => self.comparison(operator, left, right, |l, r| l <= r),
            TokenKind::BangEqual => Ok(Value::Bool(left != right)),
            TokenKind::Equal => Ok(Value::Bool(left == right)),
            _ => Err(RuntimeError::new(
                operator.line,
                RuntimeErrorKind::OperandNotNumber,
            )),
        }
    }

    /// Comparison keeps two deliberate quirks: a bare `false` on either side
    /// makes the whole comparison `false` with no type check, and a holding
    /// comparison yields the right operand rather than `true` so chains like
    /// `a < b < c` thread the middle value.
    fn comparison(
        &mut self,
        operator: &Token,
        left: Value,
        right: Value,
        holds: fn(f64, f64) -> bool,
    ) -> Result<Value, RuntimeError> {
        if matches!(left, Value::Bool(false)) || matches!(right, Value::Bool(false)) {
            return Ok(Value::Bool(false));
        }
        let (l, r) = self.number_operands(operator, &left, &right)?;
        if holds(l, r) {
            Ok(right)
        } else {
            Ok(Value::Bool(false))
        }
    }

    fn number_operands(
        &self,
        operator: &Token,
        left: &Value,
        right: &Value,
    ) -> Result<(f64, f64), RuntimeError> {
        let Value::Number(l) = left else {
            return Err(RuntimeError::new(
                operator.line,
                RuntimeErrorKind::BinaryOperandNotNumber {
                    side: "Left",
                    operand: left.stringify(),
                },
            ));
        };
        let Value::Number(r) = right else {
            return Err(RuntimeError::new(
                operator.line,
                RuntimeErrorKind::BinaryOperandNotNumber {
                    side: "Right",
                    operand: right.stringify(),
                },
            ));
        };
        Ok((*l, *r))
    }

    fn unary(&mut self, operator: &Token, right: &Expr) -> Result<Value, RuntimeError> {
        match operator.kind {
            TokenKind::Bang => {
                let value = self.evaluate(right)?;
                Ok(Value::Bool(!value.is_truthy()))
            }
            TokenKind::Minus => {
                let value = self.evaluate(right)?;
                let Value::Number(n) = value else {
                    return Err(RuntimeError::new(
                        operator.line,
                        RuntimeErrorKind::OperandNotNumber,
                    ));
                };
                Ok(Value::Number(-n))
            }
            TokenKind::PlusPlus => self.increment(operator, right, 1.0),
            TokenKind::MinusMinus => self.increment(operator, right, -1.0),
            _ => Err(RuntimeError::new(
                operator.line,
                RuntimeErrorKind::OperandNotNumber,
            )),
        }
    }

    /// `++x`/`--x` read the variable, shift it by one, store it back through
    /// the same mutability checks an assignment faces, and yield the new value.
    fn increment(
        &mut self,
        operator: &Token,
        target: &Expr,
        delta: f64,
    ) -> Result<Value, RuntimeError> {
        let Expr::Variable { id, name } = target else {
            return Err(RuntimeError::new(
                operator.line,
                RuntimeErrorKind::InvalidIncrementTarget,
            ));
        };
        let current = self.lookup_variable(*id, name)?;
        let Value::Number(n) = current else {
            return Err(RuntimeError::new(
                operator.line,
                RuntimeErrorKind::OperandNotNumber,
            ));
        };
        self.assign_variable(*id, name, Value::Number(n + delta))
    }

    fn call(
        &mut self,
        callee: Value,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => {
                let expected = function.declaration.parameters.len();
                if arguments.len() != expected {
                    return Err(RuntimeError::new(
                        paren.line,
                        RuntimeErrorKind::ArityMismatch {
                            expected,
                            found: arguments.len(),
                        },
                    ));
                }
                self.call_function(&function, arguments)
            }
            Value::Native(native) => {
                if let Some(expected) = native.arity
                    && arguments.len() != expected
                {
                    return Err(RuntimeError::new(
                        paren.line,
                        RuntimeErrorKind::ArityMismatch {
                            expected,
                            found: arguments.len(),
                        },
                    ));
                }
                (native.call)(&arguments)
                    .map_err(|kind| RuntimeError::new(paren.line, kind))
            }
            Value::Class(class) => {
                if !arguments.is_empty() {
                    return Err(RuntimeError::new(
                        paren.line,
                        RuntimeErrorKind::ArityMismatch {
                            expected: 0,
                            found: arguments.len(),
                        },
                    ));
                }
                Ok(Value::Instance(Rc::new(std::cell::RefCell::new(
                    Instance::new(&class),
                ))))
            }
            _ => Err(RuntimeError::new(paren.line, RuntimeErrorKind::NotCallable)),
        }
    }

    /// One environment holds parameters and body locals, parented at the
    /// captured closure. A stray `break`/`continue` unwinding to the frame
    /// boundary yields no value, same as falling off the end.
    fn call_function(
        &mut self,
        function: &Rc<Function>,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let frame = Environment::with_enclosing(Rc::clone(&function.closure));
        {
            let mut frame = frame.borrow_mut();
            for (parameter, argument) in
                function.declaration.parameters.iter().zip(arguments)
            {
                frame.define(
                    parameter.clone(),
                    Some(argument),
                    Attributes::MUTABLE | Attributes::UNSTABLE,
                );
            }
        }
        match self.execute_block(&function.declaration.body, frame)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }

    fn index(
        &mut self,
        collection: Value,
        indices: Vec<Value>,
        bracket: &Token,
    ) -> Result<Value, RuntimeError> {
        let single = indices.len() == 1;
        let mut selected = Vec::with_capacity(indices.len());
        for index in indices {
            let position = self.index_position(&index, bracket)?;
            let element = match &collection {
                Value::List(elements) => elements.get(position).cloned(),
                Value::Str(s) => s.chars().nth(position).map(|c| Value::Str(c.to_string())),
                _ => {
                    return Err(RuntimeError::new(
                        bracket.line,
                        RuntimeErrorKind::NotIndexable,
                    ));
                }
            };
            match element {
                Some(element) => selected.push(element),
                None => {
                    return Err(RuntimeError::new(
                        bracket.line,
                        RuntimeErrorKind::IndexOutOfBounds {
                            index: index.stringify(),
                            collection: collection.preview(),
                        },
                    ));
                }
            }
        }
        if single {
            match selected.pop() {
                Some(element) => Ok(element),
                None => Err(RuntimeError::new(
                    bracket.line,
                    RuntimeErrorKind::InvalidIndex {
                        index: String::new(),
                    },
                )),
            }
        } else if matches!(collection, Value::Str(_)) {
            let mut joined = String::new();
            for element in &selected {
                joined.push_str(&element.stringify());
            }
            Ok(Value::Str(joined))
        } else {
            Ok(Value::List(Rc::new(selected)))
        }
    }

    fn index_position(&self, index: &Value, bracket: &Token) -> Result<usize, RuntimeError> {
        match index {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
            other => Err(RuntimeError::new(
                bracket.line,
                RuntimeErrorKind::InvalidIndex {
                    index: other.stringify(),
                },
            )),
        }
    }

    fn range_bound(&mut self, bound: &Expr, token: &Token) -> Result<f64, RuntimeError> {
        match self.evaluate(bound)? {
            Value::Number(n) => Ok(n),
            _ => Err(RuntimeError::new(
                token.line,
                RuntimeErrorKind::RangeBoundNotNumber,
            )),
        }
    }

    /// Inclusive range. The written step value is the second element, so the
    /// effective increment is `step - start`; without one the increment is 1.
    fn range_list(
        &self,
        start: f64,
        step: Option<f64>,
        stop: f64,
        token: &Token,
    ) -> Result<Value, RuntimeError> {
        let increment = match step {
            Some(step) => step - start,
            None => 1.0,
        };
        if increment == 0.0 {
            return Err(RuntimeError::new(
                token.line,
                RuntimeErrorKind::RangeStepZero,
            ));
        }
        let mut elements = Vec::new();
        let mut i = 0u32;
        loop {
            let value = start + f64::from(i) * increment;
            if (increment > 0.0 && value > stop) || (increment < 0.0 && value < stop) {
                break;
            }
            elements.push(Value::Number(value));
            i += 1;
        }
        Ok(Value::List(Rc::new(elements)))
    }
}
