use crate::environment::{Attributes, EnvRef};
use crate::error::RuntimeErrorKind;
use crate::token::{Token, TokenKind};
use crate::value::Value;

/// A host-provided function. `arity` of `None` means variadic.
pub struct Native {
    pub name: &'static str,
    pub arity: Option<usize>,
    pub call: fn(&[Value]) -> Result<Value, RuntimeErrorKind>,
}

impl std::fmt::Debug for Native {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Native")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

static BUILTINS: &[Native] = &[
    Native {
        name: "list",
        arity: None,
        call: |arguments| Ok(Value::List(std::rc::Rc::new(arguments.to_vec()))),
    },
    Native {
        name: "tostring",
        arity: Some(1),
        call: |arguments| Ok(Value::Str(arguments[0].stringify())),
    },
    Native {
        name: "tonumber",
        arity: Some(1),
        call: |arguments| match &arguments[0] {
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::Bool(true) => Ok(Value::Number(1.0)),
            Value::Bool(false) => Ok(Value::Number(0.0)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Number)
                .map_err(|_| RuntimeErrorKind::InvalidArgumentType { name: "tonumber" }),
            _ => Err(RuntimeErrorKind::InvalidArgumentType { name: "tonumber" }),
        },
    },
    Native {
        name: "len",
        arity: Some(1),
        call: |arguments| match &arguments[0] {
            Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
            Value::List(elements) => Ok(Value::Number(elements.len() as f64)),
            _ => Err(RuntimeErrorKind::InvalidArgumentType { name: "len" }),
        },
    },
];

/// Seed the global scope with every builtin as a core binding.
pub fn install(globals: &EnvRef) {
    let mut globals = globals.borrow_mut();
    for native in BUILTINS {
        let token = Token::new(TokenKind::Identifier, native.name.to_string(), None, 0);
        globals.define(token, Some(Value::Native(native)), Attributes::CORE);
    }
}

/// Builtin names, for pre-seeding the resolver's global scope.
pub fn names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|native| native.name)
}
