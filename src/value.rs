use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::ast::FunctionDecl;
use crate::builtins::Native;
use crate::environment::EnvRef;

/// A runtime value. Lists are immutable sequences shared by handle;
/// functions, classes, and instances compare by identity.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
    List(Rc<Vec<Value>>),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<RefCell<Instance>>),
    Native(&'static Native),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            // `none = none` is false: an absent value equals nothing.
            (Value::None, Value::None) => false,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl Value {
    /// Everything is truthy except `false` and `none`; zero included.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::None)
    }

    /// Render the value the way `print` and `tostring` show it.
    pub fn stringify(&self) -> String {
        match self {
            Value::Number(n) => format!("{n}"),
            Value::Str(s) => s.clone(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::None => "none".to_string(),
            Value::List(elements) => {
                let rendered: Vec<String> = elements.iter().map(Value::stringify).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Function(function) => match &function.declaration.name {
                Some(name) => format!("<fn {}>", name.lexeme),
                Option::None => "<lambda>".to_string(),
            },
            Value::Class(class) => class.name.clone(),
            Value::Instance(instance) => {
                let instance = instance.borrow();
                match instance.class.upgrade() {
                    Some(class) => format!("{} instance", class.name),
                    Option::None => "instance".to_string(),
                }
            }
            Value::Native(native) => format!("<native fn {}>", native.name),
        }
    }

    /// Abridged rendering used in index fault messages: lists longer than
    /// four elements show only the two ends.
    pub fn preview(&self) -> String {
        match self {
            Value::List(elements) if elements.len() > 4 => {
                let n = elements.len();
                format!(
                    "[{}, {}, ..., {}, {}]",
                    elements[0].stringify(),
                    elements[1].stringify(),
                    elements[n - 2].stringify(),
                    elements[n - 1].stringify()
                )
            }
            other => other.stringify(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

/// Coarse classification used by type-stability checks and fault messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Number,
    String,
    Boolean,
    List,
    Function,
    Class,
    Instance,
    None,
    NativeFunction,
}

impl TypeTag {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Number(_) => TypeTag::Number,
            Value::Str(_) => TypeTag::String,
            Value::Bool(_) => TypeTag::Boolean,
            Value::None => TypeTag::None,
            Value::List(_) => TypeTag::List,
            Value::Function(_) => TypeTag::Function,
            Value::Class(_) => TypeTag::Class,
            Value::Instance(_) => TypeTag::Instance,
            Value::Native(_) => TypeTag::NativeFunction,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Number => "number",
            TypeTag::String => "string",
            TypeTag::Boolean => "boolean",
            TypeTag::List => "list",
            TypeTag::Function => "function",
            TypeTag::Class => "class",
            TypeTag::Instance => "instance",
            TypeTag::None => "none",
            TypeTag::NativeFunction => "native function",
        };
        write!(f, "{name}")
    }
}

/// A user function: shared declaration plus the environment captured at the
/// point of definition.
#[derive(Debug)]
pub struct Function {
    pub declaration: Rc<FunctionDecl>,
    pub closure: EnvRef,
}

/// A class is a named method table. Methods are plain functions; no
/// inheritance, no constructors.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub methods: FxHashMap<String, Rc<Function>>,
}

impl Class {
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        self.methods.get(name).cloned()
    }
}

/// Instance state: a weak handle back to the class for method lookup, and a
/// mutable field map.
#[derive(Debug)]
pub struct Instance {
    pub class: Weak<Class>,
    pub fields: FxHashMap<String, Value>,
}

impl Instance {
    pub fn new(class: &Rc<Class>) -> Self {
        Self {
            class: Rc::downgrade(class),
            fields: FxHashMap::default(),
        }
    }
}
