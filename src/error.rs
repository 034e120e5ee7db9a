//! Error kinds and the stack-trace-carrying error type threaded through the
//! tokenizer, parser, and evaluator.

use std::fmt;

use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::token::Pos;

/// The five error kinds distinguished in §7.
#[derive(Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed number, unterminated string. The lexer itself is permissive
    /// and mostly recovers; this kind exists for the cases it does not.
    Lex,
    /// Unexpected token, incomplete form.
    Parse,
    /// Undefined name, wrong arity, bad index, division by zero, non-callable
    /// call, incompatible operands, import failure.
    Runtime,
    /// Domain errors in math builtins (`pow(0, 0)`, `log` of zero, ...).
    Math,
    /// Builtin argument type mismatch.
    Type,
}

/// One frame of a call-stack trace, innermost last.
#[derive(Clone, Debug)]
pub struct StackFrame {
    pub fn_name: Option<std::rc::Rc<str>>,
    pub pos: Pos,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fn_name {
            Some(name) => write!(f, "  in fn {name} {}", self.pos),
            None => write!(f, "  in fn <anonymous> {}", self.pos),
        }
    }
}

/// The single error type that crosses module boundaries.
#[derive(Clone, Debug)]
pub struct GlintError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Pos,
    pub trace: Vec<StackFrame>,
}

impl GlintError {
    fn new(kind: ErrorKind, pos: Pos, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), pos, trace: Vec::new() }
    }

    pub fn lex(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lex, pos, message)
    }

    pub fn parse(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, pos, message)
    }

    pub fn runtime(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, pos, message)
    }

    pub fn math(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Math, pos, message)
    }

    pub fn type_error(pos: Pos, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, pos, message)
    }

    /// Appends a call frame as the error unwinds past a function boundary.
    #[must_use]
    pub fn with_frame(mut self, fn_name: Option<std::rc::Rc<str>>, pos: Pos) -> Self {
        self.trace.push(StackFrame { fn_name, pos });
        self
    }
}

impl fmt::Display for GlintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Parse => write!(f, "Parse error at {}: {}", self.pos, self.message),
            _ => {
                writeln!(f, "Runtime error {}: {}", self.pos, self.message)?;
                for frame in &self.trace {
                    writeln!(f, "{frame}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for GlintError {}
