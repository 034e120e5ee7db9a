//! Native callables: the core's small fixed set of required builtins
//! (§6.3), plus the host extension point and callbackification wrapper
//! (§4.6.2, Design Notes "Callbackification") that the filesystem/HTTP/
//! subprocess builtins named as external collaborators are expected to use.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::engine::{Engine, EngineState};
use crate::error::GlintError;
use crate::eval::call_value;
use crate::heap::HeapData;
use crate::token::Pos;
use crate::value::{ObjectMap, Value};

/// The builtins every program can rely on existing, drawn verbatim from §6.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Import,
    StringOf,
    IntOf,
    FloatOf,
    AtomOf,
    Codepoint,
    Char,
    TypeOf,
    Len,
    Keys,
    Print,
    Exit,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::StringOf => "string",
            Self::IntOf => "int",
            Self::FloatOf => "float",
            Self::AtomOf => "atom",
            Self::Codepoint => "codepoint",
            Self::Char => "char",
            Self::TypeOf => "type",
            Self::Len => "len",
            Self::Keys => "keys",
            Self::Print => "print",
            Self::Exit => "exit",
        }
    }

    pub const ALL: [Builtin; 12] = [
        Self::Import,
        Self::StringOf,
        Self::IntOf,
        Self::FloatOf,
        Self::AtomOf,
        Self::Codepoint,
        Self::Char,
        Self::TypeOf,
        Self::Len,
        Self::Keys,
        Self::Print,
        Self::Exit,
    ];
}

/// A host-provided native function: an escape hatch for embedders (the
/// filesystem/HTTP/subprocess builtins named in §1 as out of core scope are
/// expected to be supplied this way).
pub struct HostFn {
    pub name: String,
    #[allow(clippy::type_complexity)]
    pub call: Box<dyn Fn(&Engine, &mut EngineState, Pos, Vec<Value>) -> Result<Value, GlintError> + Send + Sync>,
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFn").field("name", &self.name).finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub enum NativeFn {
    Builtin(Builtin),
    Host(Arc<HostFn>),
}

impl NativeFn {
    pub fn name(&self) -> &str {
        match self {
            Self::Builtin(b) => b.name(),
            Self::Host(h) => &h.name,
        }
    }
}

impl PartialEq for NativeFn {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Host(a), Self::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Null)
}

/// Calls one of the core's fixed builtins. `call_pos` is the call site, used
/// to attach errors at the correct position per §9's stack-trace rule.
///
/// `Builtin::Import` is never routed here: it is the one builtin that needs
/// the caller's [`crate::engine::Context`] (for relative-path resolution),
/// which this context-free dispatcher doesn't have access to, so
/// `eval.rs`'s call dispatch special-cases it before reaching this function.
pub fn call_builtin(
    engine: &Engine,
    state: &mut EngineState,
    builtin: Builtin,
    call_pos: Pos,
    args: Vec<Value>,
) -> Result<Value, GlintError> {
    match builtin {
        Builtin::Import => unreachable!("import is dispatched in eval.rs, where a Context is available"),
        Builtin::StringOf => Ok(string_of(state, &arg(&args, 0))),
        Builtin::IntOf => int_of(state, &call_pos, &arg(&args, 0)),
        Builtin::FloatOf => float_of(state, &call_pos, &arg(&args, 0)),
        Builtin::AtomOf => atom_of(&call_pos, &arg(&args, 0)),
        Builtin::Codepoint => codepoint_of(state, &call_pos, &arg(&args, 0)),
        Builtin::Char => char_of(state, &call_pos, &arg(&args, 0)),
        Builtin::TypeOf => Ok(Value::Atom(type_atom(&arg(&args, 0)).into())),
        Builtin::Len => len_of(state, &call_pos, &arg(&args, 0)),
        Builtin::Keys => keys_of(state, &call_pos, &arg(&args, 0)),
        Builtin::Print => {
            print_value(state, &arg(&args, 0));
            Ok(Value::Null)
        }
        Builtin::Exit => Err(GlintError::runtime(call_pos, exit_message(&arg(&args, 0)))),
    }
}

/// Special sentinel message recognized by the top-level runner to translate
/// into a process exit code instead of a printed error (see `lib.rs::run`).
pub(crate) const EXIT_SENTINEL: &str = "__glint_exit__:";

fn exit_message(v: &Value) -> String {
    let code = match v {
        Value::Int(n) => *n,
        Value::Null => 0,
        _ => 0,
    };
    format!("{EXIT_SENTINEL}{code}")
}

fn type_atom(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Empty => "empty",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Bool(_) => "bool",
        Value::Atom(_) => "atom",
        Value::Str(_) => "string",
        Value::List(_) => "list",
        Value::Object(_) => "object",
        Value::Fn(..) | Value::Native(_) => "function",
    }
}

fn string_of(state: &mut EngineState, v: &Value) -> Value {
    let bytes = crate::heap::stringify_scalar(&state.heap, v)
        .unwrap_or_else(|| crate::display::display_value(state, v).into_bytes());
    Value::Str(state.heap.alloc_str(bytes))
}

fn int_of(_state: &mut EngineState, pos: &Pos, v: &Value) -> Result<Value, GlintError> {
    match v {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Str(id) => {
            let bytes = _state.heap.get(*id).as_str().expect("Str value points at string heap data").clone();
            let text = String::from_utf8_lossy(&bytes);
            text.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                GlintError::type_error(pos.clone(), format!("`int` cannot parse {text:?} as an integer"))
            })
        }
        other => Err(GlintError::type_error(pos.clone(), format!("`int` does not accept a {}", other.type_name()))),
    }
}

fn float_of(_state: &mut EngineState, pos: &Pos, v: &Value) -> Result<Value, GlintError> {
    match v {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(id) => {
            let bytes = _state.heap.get(*id).as_str().expect("Str value points at string heap data").clone();
            let text = String::from_utf8_lossy(&bytes);
            text.trim().parse::<f64>().map(Value::Float).map_err(|_| {
                GlintError::type_error(pos.clone(), format!("`float` cannot parse {text:?} as a float"))
            })
        }
        other => Err(GlintError::type_error(pos.clone(), format!("`float` does not accept a {}", other.type_name()))),
    }
}

fn atom_of(pos: &Pos, v: &Value) -> Result<Value, GlintError> {
    match v {
        Value::Atom(a) => Ok(Value::Atom(a.clone())),
        other => {
            Err(GlintError::type_error(pos.clone(), format!("`atom` does not accept a {}", other.type_name())))
        }
    }
}

fn codepoint_of(state: &mut EngineState, pos: &Pos, v: &Value) -> Result<Value, GlintError> {
    match v {
        Value::Str(id) => {
            let bytes = state.heap.get(*id).as_str().expect("Str value points at string heap data");
            match bytes.as_slice() {
                [byte] => Ok(Value::Int(i64::from(*byte))),
                _ => Err(GlintError::type_error(pos.clone(), "`codepoint` requires a one-byte string")),
            }
        }
        other => {
            Err(GlintError::type_error(pos.clone(), format!("`codepoint` does not accept a {}", other.type_name())))
        }
    }
}

fn char_of(state: &mut EngineState, pos: &Pos, v: &Value) -> Result<Value, GlintError> {
    match v {
        Value::Int(n) if (0..=255).contains(n) => {
            let id = state.heap.alloc_str(vec![*n as u8]);
            Ok(Value::Str(id))
        }
        Value::Int(_) => Err(GlintError::type_error(pos.clone(), "`char` requires an int in [0, 255]")),
        other => Err(GlintError::type_error(pos.clone(), format!("`char` does not accept a {}", other.type_name()))),
    }
}

fn len_of(state: &EngineState, pos: &Pos, v: &Value) -> Result<Value, GlintError> {
    match v {
        Value::Str(id) => Ok(Value::Int(state.heap.get(*id).as_str().expect("string heap data").len() as i64)),
        Value::List(id) => Ok(Value::Int(state.heap.get(*id).as_list().expect("list heap data").len() as i64)),
        Value::Object(id) => Ok(Value::Int(state.heap.get(*id).as_object().expect("object heap data").len() as i64)),
        other => Err(GlintError::type_error(pos.clone(), format!("`len` does not accept a {}", other.type_name()))),
    }
}

fn keys_of(state: &mut EngineState, pos: &Pos, v: &Value) -> Result<Value, GlintError> {
    match v {
        Value::Str(id) => {
            let n = state.heap.get(*id).as_str().expect("string heap data").len();
            let items = (0..n as i64).map(Value::Int).collect();
            Ok(Value::List(state.heap.alloc_list(items)))
        }
        Value::List(id) => {
            let n = state.heap.get(*id).as_list().expect("list heap data").len();
            let items = (0..n as i64).map(Value::Int).collect();
            Ok(Value::List(state.heap.alloc_list(items)))
        }
        Value::Object(id) => {
            let keys: Vec<Value> =
                state.heap.get(*id).as_object().expect("object heap data").keys().map(|k| {
                    let sid = state.heap.alloc_str(k.clone().into_bytes());
                    Value::Str(sid)
                }).collect();
            Ok(Value::List(state.heap.alloc_list(keys)))
        }
        other => Err(GlintError::type_error(pos.clone(), format!("`keys` does not accept a {}", other.type_name()))),
    }
}

fn print_value(state: &EngineState, v: &Value) {
    println!("{}", crate::display::display_value(state, v));
}

/// The one piece of evaluator-facing glue this module needs: building an
/// empty object, used by `import` to represent a module's bindings and by
/// `keys`'s dual (kept here rather than in `eval.rs` to avoid a cycle).
pub fn empty_object(state: &mut EngineState) -> Value {
    Value::Object(state.heap.alloc_object(ObjectMap::default()))
}

/// Wraps a synchronous native operation so that, when the final user-supplied
/// argument is callable, the operation runs on a background worker instead of
/// blocking the interpreter; see Design Notes "Callbackification" and §5.
///
/// `op` must not touch any [`EngineState`] itself — it runs without holding
/// the interpreter lock. Its result is handed to `continuation` after the
/// worker re-acquires the lock.
pub fn callbackify<F>(engine: &Engine, args: Vec<Value>, op: F, call_pos: Pos) -> Result<Value, GlintError>
where
    F: FnOnce() -> Result<Value, GlintError> + Send + 'static,
{
    let last_is_fn = matches!(args.last(), Some(v) if v.is_callable());
    if !last_is_fn {
        return op();
    }
    let mut args = args;
    let continuation = args.pop().expect("checked non-empty above");
    engine.spawn_background(move |engine| {
        let result = op();
        let outcome = match result {
            Ok(v) => v,
            Err(e) => {
                engine.report_error(e);
                return;
            }
        };
        let mut state = engine.lock();
        if let Err(e) = call_value(engine, &mut state, &continuation, vec![outcome], call_pos.clone()) {
            engine.report_error(e);
        }
    });
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::engine::ResourceLimits;

    /// Regression test for the lock-ordering bug: `op` must run without the
    /// interpreter lock held, so it can make progress even while the caller
    /// (here, the test thread itself) is still holding it. Only the
    /// continuation call needs the lock back.
    #[test]
    fn callbackify_runs_the_operation_off_the_lock_then_resumes_with_the_result() {
        let engine = Engine::new(ResourceLimits::default());
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();

        let continuation = HostFn {
            name: "continuation".into(),
            call: Box::new(move |_engine, _state, _pos, args| {
                *seen2.lock().expect("mutex poisoned") = args.first().cloned();
                Ok(Value::Null)
            }),
        };
        let continuation = Value::Native(NativeFn::Host(Arc::new(continuation)));
        let call_pos = Pos { file: "test".into(), line: 1, col: 1 };

        let guard = engine.lock();
        let result = callbackify(&engine, vec![continuation], || Ok(Value::Int(42)), call_pos);
        drop(guard);
        assert!(matches!(result, Ok(Value::Null)));

        engine.wait_for_background_work();
        assert!(matches!(seen.lock().expect("mutex poisoned").take(), Some(Value::Int(42))));
    }
}
