//! The runtime value model (§3.3).

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::FnDef;
use crate::heap::HeapId;
use crate::native::NativeFn;
use crate::scope::ScopeId;

/// Reference-shared object storage. Keys are kept insertion-ordered so display
/// can sort them on demand without losing the iteration order callers expect
/// from `keys`.
pub type ObjectMap = IndexMap<String, Value, ahash::RandomState>;

#[derive(Clone, Debug)]
pub enum Value {
    Empty,
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Atom(Rc<str>),
    Str(HeapId),
    List(HeapId),
    Object(HeapId),
    Fn(Rc<FnDef>, ScopeId),
    Native(NativeFn),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Empty => "empty",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Atom(_) => "atom",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Fn(..) | Self::Native(_) => "function",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Fn(..) | Self::Native(_))
    }

    pub fn truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "_"),
            Self::Null => write!(f, "?"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => {
                let mut buf = ryu::Buffer::new();
                write!(f, "{}", buf.format(*n))
            }
            Self::Bool(b) => write!(f, "{b}"),
            Self::Atom(name) => write!(f, ":{name}"),
            Self::Str(_) => write!(f, "<string>"),
            Self::List(_) => write!(f, "<list>"),
            Self::Object(_) => write!(f, "<object>"),
            Self::Fn(def, _) => {
                let name = def.name.as_deref().unwrap_or("");
                write!(f, "fn {name}(")?;
                for (i, p) in def.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", if p.is_empty() { "_" } else { p })?;
                }
                write!(f, ")")
            }
            Self::Native(n) => write!(f, "fn {}(...)", n.name()),
        }
    }
}
