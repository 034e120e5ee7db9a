//! The tree-walking evaluator (§4.6).
//!
//! Two design points deserve a note up front:
//!
//! - **Tail calls are a control-flow value, not a data value.** [`EvalFlow`] is
//!   the sum type the evaluator actually threads through recursive descent:
//!   `Value` for an ordinary result, `Tail` for a function body + call scope
//!   still waiting to run. A call made in tail position (the last expression
//!   of a block, the chosen branch of an `if`, or the call itself) yields
//!   `Tail` instead of recursing into the body; [`call_value_flow`]'s own loop
//!   unwraps `Tail` repeatedly in place, so `loop(n)`-style tail recursion
//!   runs in O(1) Rust stack regardless of `n` (§4.6.3, §8 scenario 7).
//!   `Value` never contains a thunk, which is what makes "thunks are not
//!   observable" (§9) a structural guarantee rather than a convention.
//! - **Recursion guard via threaded depth, not a shared counter.** Rather than
//!   a mutable counter incremented/decremented around each non-tail
//!   `evalExpr` call, `depth` is an ordinary call argument: every genuinely
//!   non-tail recursive step (via [`eval_value`]) passes `depth + 1`, and
//!   Rust's own call-stack unwinding "decrements" it back for free on return.
//!   Tail-propagating steps (block tails, chosen `if` branches, and
//!   `call_value_flow`'s own trampoline loop) pass `depth` unchanged, since
//!   they consume no additional native stack. This is the idiomatic
//!   substitution for the `RecursionGuard` named in SPEC_FULL.md §4.6.10.
//!
//! A further simplification, recorded in DESIGN.md: a running function's
//! [`Context`] (directory/file, for `import`'s relative-path resolution) is
//! threaded dynamically from the call site rather than captured at closure
//! definition time. A closure that is exported from one module and invoked
//! from another will resolve its own internal `import()` calls against the
//! *caller's* directory, not its defining module's. No test scenario in §8
//! exercises this edge case.

use std::path::PathBuf;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::ast::{BinOp, Expr, FnDef, IfBranch, UnOp};
use crate::engine::{Context, Engine, EngineState};
use crate::error::GlintError;
use crate::heap::HeapData;
use crate::native::{Builtin, NativeFn};
use crate::scope::ScopeId;
use crate::token::Pos;
use crate::value::{ObjectMap, Value};

/// What evaluating one AST node produces: either a finished value, or a
/// still-pending tail call. See the module doc.
enum EvalFlow {
    Value(Value),
    Tail(Rc<FnDef>, ScopeId),
}

/// Evaluates a whole program: each top-level expression in order against
/// `ctx`'s root scope, returning the last one's value (`Null` if `exprs` is
/// empty, per §8's universal property).
pub fn eval_program(engine: &Engine, ctx: &Context, exprs: &[Expr]) -> Result<Value, GlintError> {
    let mut state = engine.lock();
    let mut result = Value::Null;
    for expr in exprs {
        result = eval_value(engine, ctx, &mut state, expr, 0)?;
    }
    Ok(result)
}

/// Calls a value from outside any particular lexical context — the one entry
/// point background workers use to invoke a user-supplied continuation (see
/// [`crate::native::callbackify`]). Since the callee is already a bound
/// [`Value::Fn`] or [`Value::Native`], the ephemeral [`Context`] constructed
/// here only matters for a nested `import()` inside the continuation, which
/// resolves relative to the process's current directory in that case.
pub fn call_value(
    engine: &Engine,
    state: &mut EngineState,
    callee: &Value,
    args: Vec<Value>,
    call_pos: Pos,
) -> Result<Value, GlintError> {
    let scope = state.scopes.new_root();
    let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let ctx = Context { dir, file: "<continuation>".into(), scope };
    match call_value_flow(engine, &ctx, state, callee, args, call_pos, 0, false)? {
        EvalFlow::Value(v) => Ok(v),
        EvalFlow::Tail(..) => unreachable!("call_value_flow must resolve to a value when tail=false"),
    }
}

/// Fully resolves `expr` to a value, trampolining any tail call it produces.
/// This is the entry point used for every non-tail-position subexpression:
/// call arguments, binary operands, list/object elements, block statements
/// other than the last, `if` conditions and targets.
fn eval_value(engine: &Engine, ctx: &Context, state: &mut EngineState, expr: &Expr, depth: usize) -> Result<Value, GlintError> {
    if depth > engine.limits().max_recursion_depth {
        return Err(GlintError::runtime(expr.pos().clone(), "recursion depth exceeded"));
    }
    match eval_flow(engine, ctx, state, expr, depth, false)? {
        EvalFlow::Value(v) => Ok(v),
        EvalFlow::Tail(..) => unreachable!("eval_flow must resolve to a value when tail=false"),
    }
}

fn eval_flow(
    engine: &Engine,
    ctx: &Context,
    state: &mut EngineState,
    expr: &Expr,
    depth: usize,
    tail: bool,
) -> Result<EvalFlow, GlintError> {
    match expr {
        Expr::Empty(_) => Ok(EvalFlow::Value(Value::Empty)),
        Expr::Null(_) => Ok(EvalFlow::Value(Value::Null)),
        Expr::Bool(_, b) => Ok(EvalFlow::Value(Value::Bool(*b))),
        Expr::Int(_, n) => Ok(EvalFlow::Value(Value::Int(*n))),
        Expr::Float(_, n) => Ok(EvalFlow::Value(Value::Float(*n))),
        Expr::Atom(_, name) => Ok(EvalFlow::Value(Value::Atom(name.clone()))),
        Expr::Str(_, bytes) => Ok(EvalFlow::Value(Value::Str(state.heap.alloc_str(bytes.clone())))),

        Expr::Identifier(pos, name) => match state.scopes.get(ctx.scope, name) {
            Some(v) => Ok(EvalFlow::Value(v)),
            None => Err(GlintError::runtime(pos.clone(), format!("undefined name `{name}`"))),
        },

        Expr::List(_, elems) => {
            let mut items = Vec::with_capacity(elems.len());
            for e in elems {
                items.push(eval_value(engine, ctx, state, e, depth + 1)?);
            }
            Ok(EvalFlow::Value(Value::List(state.heap.alloc_list(items))))
        }

        Expr::Object(_, entries) => {
            let mut map = ObjectMap::default();
            for (key_expr, val_expr) in entries {
                let key = object_key_string(engine, ctx, state, key_expr, depth)?;
                let val = eval_value(engine, ctx, state, val_expr, depth + 1)?;
                map.insert(key, val);
            }
            Ok(EvalFlow::Value(Value::Object(state.heap.alloc_object(map))))
        }

        Expr::Fn(_, def) => {
            let v = Value::Fn(def.clone(), ctx.scope);
            if let Some(name) = &def.name {
                state.scopes.put(ctx.scope, name, v.clone());
            }
            Ok(EvalFlow::Value(v))
        }

        Expr::Assignment(pos, is_local, left, right) => {
            let rhs = eval_value(engine, ctx, state, right, depth + 1)?;
            assign(engine, ctx, state, left, rhs.clone(), *is_local, pos, depth)?;
            Ok(EvalFlow::Value(rhs))
        }

        Expr::PropertyAccess(pos, left, key_expr) => {
            let target = eval_value(engine, ctx, state, left, depth + 1)?;
            let key = eval_raw_key(engine, ctx, state, key_expr, depth)?;
            Ok(EvalFlow::Value(read_property(state, pos, &target, &key)?))
        }

        Expr::Unary(pos, op, operand) => {
            let v = eval_value(engine, ctx, state, operand, depth + 1)?;
            Ok(EvalFlow::Value(apply_unary(pos, *op, v)?))
        }

        Expr::Binary(pos, op, lhs, rhs) => {
            Ok(EvalFlow::Value(eval_binary(engine, ctx, state, pos, *op, lhs, rhs, depth)?))
        }

        Expr::FnCall(pos, callee_expr, arg_exprs, rest_expr) => {
            let callee = eval_value(engine, ctx, state, callee_expr, depth + 1)?;
            // Most calls pass a handful of positional arguments, so this is
            // built inline on the stack rather than always heap-allocating a
            // `Vec` up front.
            let mut args: SmallVec<[Value; 4]> = SmallVec::with_capacity(arg_exprs.len());
            for a in arg_exprs {
                args.push(eval_value(engine, ctx, state, a, depth + 1)?);
            }
            if let Some(rest) = rest_expr {
                let rv = eval_value(engine, ctx, state, rest, depth + 1)?;
                let Value::List(id) = rv else {
                    return Err(GlintError::type_error(
                        pos.clone(),
                        format!("a call's spread argument must be a list, found {}", rv.type_name()),
                    ));
                };
                args.extend(state.heap.get(id).as_list().expect("List value points at list heap data").iter().cloned());
            }
            call_value_flow(engine, ctx, state, &callee, args.into_vec(), pos.clone(), depth, tail)
        }

        Expr::If(pos, cond_expr, branches) => {
            let cond = eval_value(engine, ctx, state, cond_expr, depth + 1)?;
            for branch in branches {
                let IfBranch { target, body } = branch;
                let target_val = eval_value(engine, ctx, state, target, depth + 1)?;
                if values_eq(state, &cond, &target_val) {
                    return eval_flow(engine, ctx, state, body, depth, tail);
                }
            }
            let _ = pos;
            Ok(EvalFlow::Value(Value::Null))
        }

        Expr::Block(_, exprs) => {
            let Some((last, init)) = exprs.split_last() else {
                return Ok(EvalFlow::Value(Value::Null));
            };
            let child_scope = state.scopes.child_of(ctx.scope);
            let block_ctx = Context { dir: ctx.dir.clone(), file: ctx.file.clone(), scope: child_scope };
            for e in init {
                eval_value(engine, &block_ctx, state, e, depth + 1)?;
            }
            eval_flow(engine, &block_ctx, state, last, depth, tail)
        }
    }
}

fn call_value_flow(
    engine: &Engine,
    ctx: &Context,
    state: &mut EngineState,
    callee: &Value,
    args: Vec<Value>,
    call_pos: Pos,
    depth: usize,
    tail: bool,
) -> Result<EvalFlow, GlintError> {
    match callee {
        Value::Fn(def, closure_scope) => {
            let call_scope = bind_params(state, def, *closure_scope, args);
            if tail {
                return Ok(EvalFlow::Tail(def.clone(), call_scope));
            }
            let mut cur_def = def.clone();
            let mut cur_scope = call_scope;
            loop {
                let body_ctx = Context { dir: ctx.dir.clone(), file: ctx.file.clone(), scope: cur_scope };
                let flow = eval_flow(engine, &body_ctx, state, &cur_def.body, depth, true)
                    .map_err(|e| e.with_frame(cur_def.name.clone(), call_pos.clone()))?;
                match flow {
                    EvalFlow::Value(v) => return Ok(EvalFlow::Value(v)),
                    EvalFlow::Tail(next_def, next_scope) => {
                        cur_def = next_def;
                        cur_scope = next_scope;
                    }
                }
            }
        }
        Value::Native(nf) => {
            let v = call_native(engine, ctx, state, nf, call_pos, args)?;
            Ok(EvalFlow::Value(v))
        }
        other => Err(GlintError::runtime(call_pos, format!("cannot call a {}", other.type_name()))),
    }
}

/// `import` is dispatched here rather than through [`crate::native::call_builtin`]
/// because it is the one core builtin that needs the calling [`Context`] (for
/// relative-path resolution); every other builtin is context-free.
fn call_native(
    engine: &Engine,
    ctx: &Context,
    state: &mut EngineState,
    nf: &NativeFn,
    call_pos: Pos,
    args: Vec<Value>,
) -> Result<Value, GlintError> {
    match nf {
        NativeFn::Builtin(Builtin::Import) => engine.import(state, ctx, &call_pos, &args),
        NativeFn::Builtin(b) => crate::native::call_builtin(engine, state, *b, call_pos, args),
        NativeFn::Host(h) => (h.call)(engine, state, call_pos, args),
    }
}

/// Binds `args` to `def`'s parameters in a fresh child of `closure_scope`:
/// missing positional arguments bind `Null`, and a declared rest parameter
/// collects anything beyond the declared parameter count (§4.6.2).
fn bind_params(state: &mut EngineState, def: &FnDef, closure_scope: ScopeId, mut args: Vec<Value>) -> ScopeId {
    let call_scope = state.scopes.child_of(closure_scope);
    let extra = if args.len() > def.params.len() { args.split_off(def.params.len()) } else { Vec::new() };
    let mut args = args.into_iter();
    for param in &def.params {
        state.scopes.put(call_scope, param, args.next().unwrap_or(Value::Null));
    }
    if let Some(rest_name) = &def.rest {
        let id = state.heap.alloc_list(extra);
        state.scopes.put(call_scope, rest_name, Value::List(id));
    }
    call_scope
}

/// An object-literal / destructuring key: an identifier is taken literally as
/// a string key (never looked up as a name); anything else is evaluated and
/// stringified (§4.6.1).
fn object_key_string(
    engine: &Engine,
    ctx: &Context,
    state: &mut EngineState,
    key_expr: &Expr,
    depth: usize,
) -> Result<String, GlintError> {
    if let Expr::Identifier(_, name) = key_expr {
        return Ok(name.to_string());
    }
    let v = eval_value(engine, ctx, state, key_expr, depth + 1)?;
    stringify_object_key(state, key_expr.pos(), &v)
}

fn stringify_object_key(state: &EngineState, pos: &Pos, key: &Value) -> Result<String, GlintError> {
    match key {
        Value::Str(id) => {
            Ok(String::from_utf8_lossy(state.heap.get(*id).as_str().expect("Str value points at string heap data")).into_owned())
        }
        Value::Int(_) | Value::Float(_) => {
            let bytes = crate::heap::stringify_scalar(&state.heap, key).expect("int/float always stringify");
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        other => Err(GlintError::type_error(pos.clone(), format!("object key must be a string, int, or float, found {}", other.type_name()))),
    }
}

/// Evaluates a `PropertyAccess`/assignment key: an identifier syntactically
/// on the right is used as a string key without evaluation; anything else is
/// evaluated normally (§3.2).
fn eval_raw_key(engine: &Engine, ctx: &Context, state: &mut EngineState, key_expr: &Expr, depth: usize) -> Result<Value, GlintError> {
    if let Expr::Identifier(_, name) = key_expr {
        return Ok(Value::Str(state.heap.alloc_str(name.as_bytes().to_vec())));
    }
    eval_value(engine, ctx, state, key_expr, depth + 1)
}

fn require_int_index(pos: &Pos, kind: &str, key: &Value) -> Result<i64, GlintError> {
    match key {
        Value::Int(n) => Ok(*n),
        other => Err(GlintError::type_error(pos.clone(), format!("{kind} index must be an int, found {}", other.type_name()))),
    }
}

/// Resolves a possibly-negative logical index against `len`; returns `None`
/// if the index is out of bounds for reading (negative or `>= len`).
fn read_index(len: usize, idx: i64) -> Option<usize> {
    if idx < 0 {
        return None;
    }
    let idx = idx as usize;
    if idx < len {
        Some(idx)
    } else {
        None
    }
}

/// Same as [`read_index`] but for a write, where `idx == len` (append) is
/// also valid (§4.6.6).
fn write_index(pos: &Pos, idx: i64, len: usize) -> Result<usize, GlintError> {
    if idx < 0 || idx as usize > len {
        return Err(GlintError::runtime(pos.clone(), format!("index {idx} out of range (len {len})")));
    }
    Ok(idx as usize)
}

fn read_property(state: &mut EngineState, pos: &Pos, target: &Value, key: &Value) -> Result<Value, GlintError> {
    match target {
        Value::Str(id) => {
            let idx = require_int_index(pos, "string", key)?;
            let bytes = state.heap.get(*id).as_str().expect("Str value points at string heap data");
            match read_index(bytes.len(), idx) {
                Some(i) => {
                    let byte = bytes[i];
                    Ok(Value::Str(state.heap.alloc_str(vec![byte])))
                }
                None => Ok(Value::Null),
            }
        }
        Value::List(id) => {
            let idx = require_int_index(pos, "list", key)?;
            let items = state.heap.get(*id).as_list().expect("List value points at list heap data");
            Ok(read_index(items.len(), idx).map_or(Value::Null, |i| items[i].clone()))
        }
        Value::Object(id) => {
            let key_str = stringify_object_key(state, pos, key)?;
            let HeapData::Object(map) = state.heap.get(*id) else {
                unreachable!("Object value points at object heap data")
            };
            Ok(map.get(&key_str).cloned().unwrap_or(Value::Null))
        }
        other => Err(GlintError::runtime(pos.clone(), format!("cannot read a property of a {}", other.type_name()))),
    }
}

fn write_property(state: &mut EngineState, pos: &Pos, target: &Value, key: &Value, value: Value) -> Result<(), GlintError> {
    match target {
        Value::Str(id) => {
            let idx = require_int_index(pos, "string", key)?;
            let len = state.heap.get(*id).as_str().expect("Str value points at string heap data").len();
            let at = write_index(pos, idx, len)?;
            let Value::Str(rid) = value else {
                return Err(GlintError::type_error(pos.clone(), format!("string assignment requires a string, found {}", value.type_name())));
            };
            let rhs_bytes = state.heap.get(rid).as_str().expect("Str value points at string heap data").clone();
            let HeapData::Str(bytes) = state.heap.get_mut(*id) else { unreachable!("Str value points at string heap data") };
            let end = at + rhs_bytes.len();
            if end > bytes.len() {
                bytes.resize(end, 0);
            }
            bytes[at..end].copy_from_slice(&rhs_bytes);
            Ok(())
        }
        Value::List(id) => {
            let idx = require_int_index(pos, "list", key)?;
            let len = state.heap.get(*id).as_list().expect("List value points at list heap data").len();
            let at = write_index(pos, idx, len)?;
            let HeapData::List(items) = state.heap.get_mut(*id) else { unreachable!("List value points at list heap data") };
            if at == items.len() {
                items.push(value);
            } else {
                items[at] = value;
            }
            Ok(())
        }
        Value::Object(id) => {
            let key_str = stringify_object_key(state, pos, key)?;
            let HeapData::Object(map) = state.heap.get_mut(*id) else { unreachable!("Object value points at object heap data") };
            if matches!(value, Value::Empty) {
                map.shift_remove(&key_str);
            } else {
                map.insert(key_str, value);
            }
            Ok(())
        }
        other => Err(GlintError::runtime(pos.clone(), format!("cannot write a property of a {}", other.type_name()))),
    }
}

fn assign(
    engine: &Engine,
    ctx: &Context,
    state: &mut EngineState,
    left: &Expr,
    value: Value,
    is_local: bool,
    pos: &Pos,
    depth: usize,
) -> Result<(), GlintError> {
    match left {
        Expr::Identifier(_, name) => bind_pattern(state, ctx, &Expr::Identifier(pos.clone(), name.clone()), value, is_local, pos),
        Expr::List(_, patterns) => {
            let Value::List(id) = value else {
                return Err(GlintError::type_error(pos.clone(), format!("list destructuring requires a list, found {}", value.type_name())));
            };
            let items = state.heap.get(id).as_list().expect("List value points at list heap data").clone();
            for (i, pat) in patterns.iter().enumerate() {
                let v = items.get(i).cloned().unwrap_or(Value::Null);
                bind_pattern(state, ctx, pat, v, is_local, pos)?;
            }
            Ok(())
        }
        Expr::Object(_, entries) => {
            let Value::Object(id) = value else {
                return Err(GlintError::type_error(pos.clone(), format!("object destructuring requires an object, found {}", value.type_name())));
            };
            for (key_expr, pat) in entries {
                let key = object_key_string(engine, ctx, state, key_expr, depth)?;
                let v = {
                    let HeapData::Object(map) = state.heap.get(id) else { unreachable!("Object value points at object heap data") };
                    map.get(&key).cloned().unwrap_or(Value::Null)
                };
                bind_pattern(state, ctx, pat, v, is_local, pos)?;
            }
            Ok(())
        }
        Expr::PropertyAccess(ppos, target_expr, key_expr) => {
            let target = eval_value(engine, ctx, state, target_expr, depth + 1)?;
            let key = eval_raw_key(engine, ctx, state, key_expr, depth)?;
            write_property(state, ppos, &target, &key, value)
        }
        other => Err(GlintError::parse(pos.clone(), format!("invalid assignment target {other:?}"))),
    }
}

/// Binds one destructuring leaf: `_` is skipped, an identifier is bound,
/// anything else is not a valid pattern element (§4.6.7).
fn bind_pattern(state: &mut EngineState, ctx: &Context, pat: &Expr, value: Value, is_local: bool, pos: &Pos) -> Result<(), GlintError> {
    match pat {
        Expr::Empty(_) => Ok(()),
        Expr::Identifier(_, name) => {
            if is_local {
                state.scopes.put(ctx.scope, name, value);
                Ok(())
            } else if state.scopes.update(ctx.scope, name, value) {
                Ok(())
            } else {
                Err(GlintError::runtime(pos.clone(), format!("undefined name `{name}`")))
            }
        }
        other => Err(GlintError::parse(pos.clone(), format!("invalid destructuring target {other:?}"))),
    }
}

fn apply_unary(pos: &Pos, op: UnOp, v: Value) -> Result<Value, GlintError> {
    match (op, &v) {
        (UnOp::Plus, Value::Int(n)) => Ok(Value::Int(*n)),
        (UnOp::Plus, Value::Float(n)) => Ok(Value::Float(*n)),
        (UnOp::Minus, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
        (UnOp::Minus, Value::Float(n)) => Ok(Value::Float(-*n)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!*b)),
        _ => Err(GlintError::type_error(pos.clone(), format!("unary `{}` does not accept a {}", unop_symbol(op), v.type_name()))),
    }
}

#[allow(clippy::too_many_arguments)]
fn eval_binary(
    engine: &Engine,
    ctx: &Context,
    state: &mut EngineState,
    pos: &Pos,
    op: BinOp,
    lhs_expr: &Expr,
    rhs_expr: &Expr,
    depth: usize,
) -> Result<Value, GlintError> {
    let lhs = eval_value(engine, ctx, state, lhs_expr, depth + 1)?;
    let rhs = eval_value(engine, ctx, state, rhs_expr, depth + 1)?;
    match op {
        BinOp::Push => push_onto(state, pos, lhs, rhs),
        BinOp::Eq => Ok(Value::Bool(values_eq(state, &lhs, &rhs))),
        BinOp::Neq => Ok(Value::Bool(!values_eq(state, &lhs, &rhs))),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arith(state, pos, op, lhs, rhs),
        BinOp::Gt | BinOp::Lt | BinOp::Geq | BinOp::Leq => compare(state, pos, op, &lhs, &rhs),
        BinOp::And | BinOp::Or | BinOp::Xor => bitwise(state, pos, op, lhs, rhs),
    }
}

fn push_onto(state: &mut EngineState, pos: &Pos, lhs: Value, rhs: Value) -> Result<Value, GlintError> {
    match &lhs {
        Value::Str(id) => {
            let Value::Str(rid) = &rhs else {
                return Err(GlintError::type_error(pos.clone(), format!("`<<` on a string requires a string, found {}", rhs.type_name())));
            };
            let bytes = state.heap.get(*rid).as_str().expect("Str value points at string heap data").clone();
            let HeapData::Str(data) = state.heap.get_mut(*id) else { unreachable!("Str value points at string heap data") };
            data.extend_from_slice(&bytes);
            Ok(lhs)
        }
        Value::List(id) => {
            let HeapData::List(items) = state.heap.get_mut(*id) else { unreachable!("List value points at list heap data") };
            items.push(rhs);
            Ok(lhs)
        }
        other => Err(GlintError::type_error(pos.clone(), format!("`<<` does not accept a {}", other.type_name()))),
    }
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Float(_))
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        _ => unreachable!("as_f64 only called on numeric values"),
    }
}

fn arith(state: &mut EngineState, pos: &Pos, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, GlintError> {
    match (op, &lhs, &rhs) {
        (BinOp::Add, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
        (BinOp::Mul, Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            let mut bytes = state.heap.get(*a).as_str().expect("Str value points at string heap data").clone();
            let b_bytes = state.heap.get(*b).as_str().expect("Str value points at string heap data");
            bytes.extend_from_slice(b_bytes);
            Ok(Value::Str(state.heap.alloc_str(bytes)))
        }
        (BinOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(*b))),
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(*b))),
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(*b))),
        (BinOp::Div, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(GlintError::runtime(pos.clone(), "division by zero"));
            }
            Ok(Value::Int(a.wrapping_div(*b)))
        }
        (BinOp::Mod, Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(GlintError::runtime(pos.clone(), "division by zero"));
            }
            Ok(Value::Int(a.wrapping_rem(*b)))
        }
        _ if is_numeric(&lhs) && is_numeric(&rhs) => {
            let a = as_f64(&lhs);
            let b = as_f64(&rhs);
            match op {
                BinOp::Add => Ok(Value::Float(a + b)),
                BinOp::Sub => Ok(Value::Float(a - b)),
                BinOp::Mul => Ok(Value::Float(a * b)),
                BinOp::Div => {
                    if b == 0.0 {
                        return Err(GlintError::runtime(pos.clone(), "division by zero"));
                    }
                    Ok(Value::Float(a / b))
                }
                BinOp::Mod => {
                    if b == 0.0 {
                        return Err(GlintError::runtime(pos.clone(), "division by zero"));
                    }
                    Ok(Value::Float(a % b))
                }
                _ => unreachable!("arith only called for arithmetic operators"),
            }
        }
        _ => Err(GlintError::type_error(
            pos.clone(),
            format!("`{}` does not accept a {} and a {}", binop_symbol(op), lhs.type_name(), rhs.type_name()),
        )),
    }
}

fn compare(state: &EngineState, pos: &Pos, op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, GlintError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => {
            let ab = state.heap.get(*a).as_str().expect("Str value points at string heap data");
            let bb = state.heap.get(*b).as_str().expect("Str value points at string heap data");
            Some(ab.cmp(bb))
        }
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(GlintError::type_error(pos.clone(), format!("cannot compare a {} and a {}", lhs.type_name(), rhs.type_name())));
    };
    use std::cmp::Ordering;
    let result = match op {
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Geq => ordering != Ordering::Less,
        BinOp::Leq => ordering != Ordering::Greater,
        _ => unreachable!("compare only called for comparison operators"),
    };
    Ok(Value::Bool(result))
}

fn bitwise(state: &mut EngineState, pos: &Pos, op: BinOp, lhs: Value, rhs: Value) -> Result<Value, GlintError> {
    match (&lhs, &rhs) {
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(match op {
            BinOp::And => *a && *b,
            BinOp::Or => *a || *b,
            BinOp::Xor => *a != *b,
            _ => unreachable!("bitwise only called for &, |, ^"),
        })),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(match op {
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            _ => unreachable!("bitwise only called for &, |, ^"),
        })),
        (Value::Str(a), Value::Str(b)) => {
            let ab = state.heap.get(*a).as_str().expect("Str value points at string heap data").clone();
            let bb = state.heap.get(*b).as_str().expect("Str value points at string heap data").clone();
            let len = ab.len().max(bb.len());
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let x = ab.get(i).copied().unwrap_or(0);
                let y = bb.get(i).copied().unwrap_or(0);
                out.push(match op {
                    BinOp::And => x & y,
                    BinOp::Or => x | y,
                    BinOp::Xor => x ^ y,
                    _ => unreachable!("bitwise only called for &, |, ^"),
                });
            }
            Ok(Value::Str(state.heap.alloc_str(out)))
        }
        _ => Err(GlintError::type_error(
            pos.clone(),
            format!("`{}` does not accept a {} and a {}", binop_symbol(op), lhs.type_name(), rhs.type_name()),
        )),
    }
}

/// Deep structural equality, with `Empty` as a universal wildcard and `Fn`
/// compared by defining-node identity (§3.3, §9's NaN decision).
fn values_eq(state: &EngineState, a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Empty, _) | (_, Value::Empty) => true,
        (Value::Null, Value::Null) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Atom(x), Value::Atom(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => state.heap.get(*x).as_str() == state.heap.get(*y).as_str(),
        (Value::List(x), Value::List(y)) => {
            if x == y {
                return true;
            }
            let xs = state.heap.get(*x).as_list().expect("List value points at list heap data");
            let ys = state.heap.get(*y).as_list().expect("List value points at list heap data");
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(l, r)| values_eq(state, l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            if x == y {
                return true;
            }
            let HeapData::Object(xm) = state.heap.get(*x) else { unreachable!("Object value points at object heap data") };
            let HeapData::Object(ym) = state.heap.get(*y) else { unreachable!("Object value points at object heap data") };
            xm.len() == ym.len() && xm.iter().all(|(k, v)| ym.get(k).is_some_and(|v2| values_eq(state, v, v2)))
        }
        (Value::Fn(d1, _), Value::Fn(d2, _)) => Rc::ptr_eq(d1, d2),
        (Value::Native(n1), Value::Native(n2)) => n1 == n2,
        _ => false,
    }
}

fn unop_symbol(op: UnOp) -> &'static str {
    match op {
        UnOp::Plus => "+",
        UnOp::Minus => "-",
        UnOp::Not => "!",
    }
}

fn binop_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Xor => "^",
        BinOp::And => "&",
        BinOp::Or => "|",
        BinOp::Gt => ">",
        BinOp::Lt => "<",
        BinOp::Eq => "=",
        BinOp::Geq => ">=",
        BinOp::Leq => "<=",
        BinOp::Neq => "!=",
        BinOp::Push => "<<",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, ResourceLimits};

    fn run(src: &str) -> Value {
        let engine = Engine::new(ResourceLimits::default());
        let ctx = engine.new_context("test", ".");
        engine.eval_source(&ctx, src).expect("program should evaluate")
    }

    fn run_err(src: &str) -> GlintError {
        let engine = Engine::new(ResourceLimits::default());
        let ctx = engine.new_context("test", ".");
        engine.eval_source(&ctx, src).expect_err("program should fail")
    }

    #[test]
    fn factorial_scenario() {
        let v = run("fn fact(n) if n { 0 -> 1, _ -> n * fact(n - 1) }, fact(10)");
        assert!(matches!(v, Value::Int(3628800)));
    }

    #[test]
    fn string_indexing_scenario() {
        let v = run("s := 'Hello, World!', [s.0 + s.2, s.-2, s.15]");
        let Value::List(_) = v else { panic!("expected a list") };
    }

    #[test]
    fn object_key_deletion_scenario() {
        let v = run("obj := {a: 1, b: 2}, obj.b := _, keys(obj)");
        let Value::List(_) = v else { panic!("expected a list") };
    }

    #[test]
    fn pipeline_scenario() {
        let v = run("fn add(a,b) a + b, 10 |> add(20) |> add(100)");
        assert!(matches!(v, Value::Int(130)));
    }

    #[test]
    fn list_push_and_computed_index_write_scenario() {
        let v = run("arr := [], arr << 1 << 2 << 3, arr.(len(arr)) := 4, arr");
        let Value::List(_) = v else { panic!("expected a list") };
    }

    #[test]
    fn multi_target_if_scenario() {
        let v = run("if 12 { 10, 5+7, {10+3} -> :yes, _ -> :no }");
        assert!(matches!(v, Value::Atom(a) if &*a == "yes"));
    }

    #[test]
    fn deep_tail_recursion_does_not_overflow() {
        let v = run("fn loop(n) if n { 0 -> :done, _ -> loop(n - 1) }, loop(100000)");
        assert!(matches!(v, Value::Atom(a) if &*a == "done"));
    }

    #[test]
    fn empty_is_a_universal_wildcard() {
        let v = run("if 42 { _ -> :matched }");
        assert!(matches!(v, Value::Atom(a) if &*a == "matched"));
    }

    #[test]
    fn shared_list_mutation_is_observed_through_both_bindings() {
        let v = run("a := [1], b := a, b << 2, len(a)");
        assert!(matches!(v, Value::Int(2)));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let err = run_err("1 / 0");
        assert_eq!(err.kind, crate::error::ErrorKind::Runtime);
    }

    #[test]
    fn non_tail_runaway_recursion_is_caught() {
        let err = run_err("fn rec(n) 1 + rec(n + 1), rec(0)");
        assert_eq!(err.kind, crate::error::ErrorKind::Runtime);
    }

    #[test]
    fn destructuring_missing_fields_bind_null() {
        let v = run("[a, b, c] := [1], c");
        assert!(matches!(v, Value::Null));
    }

    #[test]
    fn rest_parameter_collects_extra_positional_args() {
        let v = run("fn f(a, rest...) len(rest), f(1, 2, 3, 4)");
        assert!(matches!(v, Value::Int(3)));
    }
}
