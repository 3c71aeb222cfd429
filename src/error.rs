use thiserror::Error;

/// Fatal fault raised while executing a program.
///
/// Exactly one of these terminates a run; it carries the source line of the
/// token that triggered it so the driver can report where things went wrong.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub line: usize,
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    pub fn new(line: usize, kind: RuntimeErrorKind) -> Self {
        Self { line, kind }
    }
}

/// Typed runtime fault categories with their rendered messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{name}'.")]
    UndefinedVariable { name: String },
    #[error("Can not get value of unassigned variable '{name}'.")]
    UnassignedVariable { name: String },
    #[error("Variable '{name}' is immutable and can not be redefined.")]
    ImmutableAssignment { name: String },
    #[error("Variable '{name}' is type stable and can not change type to '{to}'.")]
    TypeStabilityViolation { name: String, to: String },
    #[error("Operand must be a number.")]
    OperandNotNumber,
    #[error("{side} operand '{operand}' must be a number.")]
    BinaryOperandNotNumber { side: &'static str, operand: String },
    #[error("Operands must both be numbers or strings.")]
    AdditionTypeMismatch,
    #[error("Attempted to divide by zero.")]
    DivisionByZero,
    #[error("Expected {expected} arguments, but got {found}.")]
    ArityMismatch { expected: usize, found: usize },
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Index {index} is out of bounds for {collection}.")]
    IndexOutOfBounds { index: String, collection: String },
    #[error("Index '{index}' must be a non-negative whole number.")]
    InvalidIndex { index: String },
    #[error("Can only index into lists and strings.")]
    NotIndexable,
    #[error("List range values must be numbers.")]
    RangeBoundNotNumber,
    #[error("List range step can not be zero.")]
    RangeStepZero,
    #[error("Undefined property '{name}'.")]
    UndefinedProperty { name: String },
    #[error("Only instances have properties.")]
    PropertyOnNonInstance,
    #[error("Only instances have fields.")]
    FieldOnNonInstance,
    #[error("Invalid argument type for {name}.")]
    InvalidArgumentType { name: &'static str },
    #[error("Can only increment or decrement variables.")]
    InvalidIncrementTarget,
    #[error("Resolved scope for '{name}' is missing.")]
    ResolutionDepthMismatch { name: String },
}
