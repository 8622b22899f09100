//! Error types for all compilation phases and the runtime.

use crate::span::Span;
use thiserror::Error;

/// Lexical errors.
#[derive(Debug, Error)]
pub enum LexError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Unterminated block comment at {0}")]
    UnterminatedComment(Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::UnterminatedComment(span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Syntactic errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of file at {0}")]
    UnexpectedEof(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParseError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self::General {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// Errors raised while lowering an AST to bytecode.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{message} at {span}")]
    General { message: String, span: Span },

    #[error("Too many locals in function at {0}")]
    TooManyLocals(Span),

    #[error("Too many constants in function at {0}")]
    TooManyConstants(Span),

    #[error("Too many upvalues in function at {0}")]
    TooManyUpvalues(Span),

    #[error("Jump too large to encode at {0}")]
    JumpTooLarge(Span),

    #[error("Variable '{0}' already declared in this scope at {1}")]
    DuplicateLocal(String, Span),

    #[error("Cannot use 'break' outside of a loop at {0}")]
    BreakOutsideLoop(Span),

    #[error("Cannot use 'continue' outside of a loop at {0}")]
    ContinueOutsideLoop(Span),
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::General { span, .. } => *span,
            Self::TooManyLocals(span) => *span,
            Self::TooManyConstants(span) => *span,
            Self::TooManyUpvalues(span) => *span,
            Self::JumpTooLarge(span) => *span,
            Self::DuplicateLocal(_, span) => *span,
            Self::BreakOutsideLoop(span) => *span,
            Self::ContinueOutsideLoop(span) => *span,
        }
    }
}

/// Runtime (VM) errors.
#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    #[error("Division by zero")]
    DivisionByZero,

    #[error("Modulo by zero")]
    ModuloByZero,

    #[error("Attempt to call a non-function value")]
    NotCallable,

    #[error("Expected {expected} arguments but got {got}")]
    WrongArity { expected: usize, got: usize },

    #[error("{message}")]
    TypeError { message: String },

    #[error("Index {index} out of bounds (length {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("Stack overflow")]
    StackOverflow,

    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }
}

/// A single frame of a runtime backtrace, printed on an unhandled `RuntimeError`.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub line: u32,
    pub name: Option<String>,
}

/// A runtime error paired with the call stack active when it was raised.
#[derive(Debug, Error, Clone)]
#[error("{error}")]
pub struct Traceback {
    pub error: RuntimeError,
    pub frames: Vec<TraceFrame>,
}

/// A unified error type spanning every phase of the pipeline.
#[derive(Debug, Error)]
pub enum XrayError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] Traceback),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
