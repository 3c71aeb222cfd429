use std::cell::RefCell;
use std::rc::Rc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::token::Token;
use crate::value::{TypeTag, Value};

bitflags! {
    /// Binding attributes carried by every variable slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u8 {
        /// Reassignment after the first definition is allowed.
        const MUTABLE = 1 << 0;
        /// Introduced by a function or class declaration.
        const FUNCTION = 1 << 1;
        /// Reassignment may change the value's type.
        const UNSTABLE = 1 << 2;
        /// Installed by the host; cannot be shadowed in the global scope.
        const CORE = 1 << 3;
    }
}

/// One variable slot: current value plus the rules governing writes to it.
#[derive(Debug)]
struct Variable {
    name: Token,
    value: Value,
    attributes: Attributes,
    /// Declared-but-unassigned slots exist (e.g. `mut var x`); reading one
    /// is a fault rather than yielding `none`.
    defined: bool,
}

impl Variable {
    fn assign(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.defined {
            if !self.attributes.contains(Attributes::MUTABLE) {
                return Err(RuntimeError::new(
                    self.name.line,
                    RuntimeErrorKind::ImmutableAssignment {
                        name: self.name.lexeme.clone(),
                    },
                ));
            }
            if !self.attributes.contains(Attributes::UNSTABLE)
                && !matches!(self.value, Value::None)
                && TypeTag::of(&self.value) != TypeTag::of(&value)
            {
                return Err(RuntimeError::new(
                    self.name.line,
                    RuntimeErrorKind::TypeStabilityViolation {
                        name: self.name.lexeme.clone(),
                        to: TypeTag::of(&value).to_string(),
                    },
                ));
            }
        }
        self.value = value;
        self.defined = true;
        Ok(())
    }
}

pub type EnvRef = Rc<RefCell<Environment>>;

/// A lexical scope: named slots plus a handle to the enclosing scope.
#[derive(Debug, Default)]
pub struct Environment {
    values: FxHashMap<String, Variable>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> EnvRef {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn with_enclosing(enclosing: EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            values: FxHashMap::default(),
            enclosing: Some(enclosing),
        }))
    }

    /// Introduce a slot in this scope. `None` declares without assigning.
    pub fn define(&mut self, name: Token, value: Option<Value>, attributes: Attributes) {
        let defined = value.is_some();
        self.values.insert(
            name.lexeme.clone(),
            Variable {
                name,
                value: value.unwrap_or(Value::None),
                attributes,
                defined,
            },
        );
    }

    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        if let Some(variable) = self.values.get(&name.lexeme) {
            if !variable.defined {
                return Err(RuntimeError::new(
                    name.line,
                    RuntimeErrorKind::UnassignedVariable {
                        name: name.lexeme.clone(),
                    },
                ));
            }
            return Ok(variable.value.clone());
        }
        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow().get(name);
        }
        Err(RuntimeError::new(
            name.line,
            RuntimeErrorKind::UndefinedVariable {
                name: name.lexeme.clone(),
            },
        ))
    }

    /// Assign to an existing slot, walking outward. Returns the stored value
    /// so chained assignment expressions have a result.
    pub fn assign(&mut self, name: &Token, value: Value) -> Result<Value, RuntimeError> {
        if let Some(variable) = self.values.get_mut(&name.lexeme) {
            variable.assign(value.clone())?;
            return Ok(value);
        }
        if let Some(enclosing) = &self.enclosing {
            return enclosing.borrow_mut().assign(name, value);
        }
        Err(RuntimeError::new(
            name.line,
            RuntimeErrorKind::UndefinedVariable {
                name: name.lexeme.clone(),
            },
        ))
    }

    /// Read from the scope exactly `distance` hops up the chain.
    pub fn get_at(env: &EnvRef, distance: usize, name: &Token) -> Result<Value, RuntimeError> {
        let target = Self::ancestor(env, distance, name)?;
        let target = target.borrow();
        match target.values.get(&name.lexeme) {
            Some(variable) if variable.defined => Ok(variable.value.clone()),
            Some(_) => Err(RuntimeError::new(
                name.line,
                RuntimeErrorKind::UnassignedVariable {
                    name: name.lexeme.clone(),
                },
            )),
            None => Err(RuntimeError::new(
                name.line,
                RuntimeErrorKind::ResolutionDepthMismatch {
                    name: name.lexeme.clone(),
                },
            )),
        }
    }

    /// Write to the scope exactly `distance` hops up the chain.
    pub fn assign_at(
        env: &EnvRef,
        distance: usize,
        name: &Token,
        value: Value,
    ) -> Result<Value, RuntimeError> {
        let target = Self::ancestor(env, distance, name)?;
        let mut target = target.borrow_mut();
        match target.values.get_mut(&name.lexeme) {
            Some(variable) => {
                variable.assign(value.clone())?;
                Ok(value)
            }
            None => Err(RuntimeError::new(
                name.line,
                RuntimeErrorKind::ResolutionDepthMismatch {
                    name: name.lexeme.clone(),
                },
            )),
        }
    }

    fn ancestor(env: &EnvRef, distance: usize, name: &Token) -> Result<EnvRef, RuntimeError> {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let next = current.borrow().enclosing.clone();
            match next {
                Some(enclosing) => current = enclosing,
                None => {
                    return Err(RuntimeError::new(
                        name.line,
                        RuntimeErrorKind::ResolutionDepthMismatch {
                            name: name.lexeme.clone(),
                        },
                    ));
                }
            }
        }
        Ok(current)
    }
}
