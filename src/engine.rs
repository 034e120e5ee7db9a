//! The engine: process-wide interpreter state (§3.5) and the concurrency
//! primitives built on top of it (§5).
//!
//! The reference design calls for a single mutex "acquired for all evaluator
//! activity" that must behave as if re-entrant, since the evaluator recurses
//! while holding it. Rust's borrow checker gives us that re-entrancy for
//! free: a single [`std::sync::MutexGuard`] is acquired once per top-level
//! evaluation and threaded through the whole recursive call tree as a
//! `&mut EngineState` function argument, so no frame ever tries to lock what
//! it already holds. A background worker that wants to resume evaluation
//! (§5's "worker re-acquires the interpreter lock") simply calls
//! [`Engine::lock`] fresh, exactly like a second top-level evaluation would.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use ahash::AHashMap;

use crate::error::GlintError;
use crate::eval::eval_program;
use crate::heap::Heap;
use crate::native::empty_object;
use crate::scope::{ScopeId, Scopes};
use crate::token::Pos;
use crate::value::{ObjectMap, Value};

/// The language's canonical import-file suffix (SPEC_FULL.md §6.4).
pub const IMPORT_SUFFIX: &str = ".glint";

/// Resource limits threaded through `Engine::new`; the ambient config layer
/// named in SPEC_FULL.md's "Ambient stack" section.
#[derive(Clone, Debug)]
pub struct ResourceLimits {
    /// Guards non-tail recursion (SPEC_FULL.md §4.6.10). Tail calls trampoline
    /// in a loop and never touch this counter, so deep tail recursion is
    /// unaffected regardless of this value.
    pub max_recursion_depth: usize,
    /// Caps how many background workers (§5) may run concurrently. `None`
    /// means unbounded (one OS thread per suspension point).
    pub max_background_workers: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self { max_recursion_depth: 4_000, max_background_workers: None }
    }
}

/// Everything the interpreter lock guards: the value heap, the scope arena,
/// and the import memoization table.
pub struct EngineState {
    pub heap: Heap,
    pub scopes: Scopes,
    import_cache: AHashMap<String, Value>,
}

impl EngineState {
    fn new() -> Self {
        Self { heap: Heap::default(), scopes: Scopes::default(), import_cache: AHashMap::default() }
    }
}

/// A per-module pair of root directory + root scope, sharing one engine
/// (Glossary: "Context").
#[derive(Clone)]
pub struct Context {
    pub dir: PathBuf,
    pub file: Rc<str>,
    pub scope: ScopeId,
}

struct WaitGroup {
    count: Mutex<usize>,
    drained: Condvar,
}

impl WaitGroup {
    fn new() -> Self {
        Self { count: Mutex::new(0), drained: Condvar::new() }
    }

    fn add(&self) {
        *self.count.lock().expect("wait group mutex poisoned") += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().expect("wait group mutex poisoned");
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait(&self) {
        let mut count = self.count.lock().expect("wait group mutex poisoned");
        while *count > 0 {
            count = self.drained.wait(count).expect("wait group condvar poisoned");
        }
    }
}

struct EngineInner {
    state: Mutex<EngineState>,
    limits: ResourceLimits,
    wait_group: WaitGroup,
    error_sink: Mutex<Box<dyn FnMut(GlintError) + Send>>,
    worker_permits: Option<Arc<Semaphore>>,
}

// `std::sync::Semaphore` does not exist in std; background worker capping is
// implemented with a counting primitive built from Mutex/Condvar instead, to
// stay within the teacher's std::sync-only concurrency idiom (no added
// dependency on a crate like `tokio` purely for a semaphore).
mod semaphore {
    use std::sync::{Condvar, Mutex};

    pub struct Semaphore {
        permits: Mutex<usize>,
        available: Condvar,
    }

    impl Semaphore {
        pub fn new(permits: usize) -> Self {
            Self { permits: Mutex::new(permits), available: Condvar::new() }
        }

        pub fn acquire(&self) {
            let mut permits = self.permits.lock().expect("semaphore mutex poisoned");
            while *permits == 0 {
                permits = self.available.wait(permits).expect("semaphore condvar poisoned");
            }
            *permits -= 1;
        }

        pub fn release(&self) {
            let mut permits = self.permits.lock().expect("semaphore mutex poisoned");
            *permits += 1;
            self.available.notify_one();
        }
    }
}
use semaphore::Semaphore;

/// Handle to the shared interpreter. Cloning is cheap (an `Arc` bump) and
/// every clone refers to the same lock, heap, and wait group.
#[derive(Clone)]
pub struct Engine(Arc<EngineInner>);

impl Engine {
    pub fn new(limits: ResourceLimits) -> Self {
        Self::with_error_sink(limits, |e| eprintln!("{e}"))
    }

    pub fn with_error_sink(limits: ResourceLimits, sink: impl FnMut(GlintError) + Send + 'static) -> Self {
        let worker_permits = limits.max_background_workers.map(|n| Arc::new(Semaphore::new(n)));
        Self(Arc::new(EngineInner {
            state: Mutex::new(EngineState::new()),
            worker_permits,
            limits,
            wait_group: WaitGroup::new(),
            error_sink: Mutex::new(Box::new(sink)),
        }))
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.0.limits
    }

    /// Acquires the interpreter lock. Held for the duration of one top-level
    /// evaluation, or for the duration of one resumed continuation call.
    pub fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.0.state.lock().expect("interpreter lock poisoned")
    }

    pub fn report_error(&self, err: GlintError) {
        tracing::warn!(kind = %err.kind, pos = %err.pos, "background task reported an error");
        (self.0.error_sink.lock().expect("error sink mutex poisoned"))(err);
    }

    /// Creates a fresh root context: a new root scope, no bindings yet.
    pub fn new_context(&self, file_name: &str, dir: impl Into<PathBuf>) -> Context {
        let scope = self.lock().scopes.new_root();
        Context { dir: dir.into(), file: file_name.into(), scope }
    }

    /// Parses and evaluates `source` under `ctx`'s root scope, returning the
    /// last top-level expression's value (Null if the program is empty, per
    /// §8's universal property).
    #[tracing::instrument(level = "debug", skip(self, source), fields(file = %ctx.file, bytes = source.len()))]
    pub fn eval_source(&self, ctx: &Context, source: &str) -> Result<Value, GlintError> {
        let tokens = crate::token::tokenize(source, &ctx.file);
        tracing::trace!(tokens = tokens.len(), "tokenized");
        let exprs = crate::parse::parse(tokens)?;
        tracing::trace!(top_level_exprs = exprs.len(), "parsed");
        eval_program(self, ctx, &exprs)
    }

    /// `import("path")` (§4.7): resolves, memoizes, and evaluates a module.
    pub fn import(
        &self,
        state: &mut EngineState,
        ctx: &Context,
        call_pos: &Pos,
        args: &[Value],
    ) -> Result<Value, GlintError> {
        let Some(Value::Str(id)) = args.first() else {
            return Err(GlintError::type_error(call_pos.clone(), "`import` requires a string path"));
        };
        let raw = String::from_utf8_lossy(
            state.heap.get(*id).as_str().expect("Str value points at string heap data"),
        )
        .into_owned();
        tracing::debug!(target = %raw, "import requested");

        if let Some(lib_source) = crate::stdlib::lookup(&raw) {
            tracing::trace!(library = %raw, "resolved as a standard library");
            return self.import_by_key(state, ctx, call_pos, raw.clone(), &raw, lib_source);
        }

        let path = if Path::new(&raw).is_absolute() {
            PathBuf::from(&raw)
        } else {
            ctx.dir.join(&raw)
        };
        let mut path_with_suffix = path.clone();
        if path_with_suffix.extension().is_none() {
            path_with_suffix.set_extension(IMPORT_SUFFIX.trim_start_matches('.'));
        }
        let key = path_with_suffix.to_string_lossy().into_owned();
        let source = std::fs::read_to_string(&path_with_suffix).map_err(|e| {
            GlintError::runtime(call_pos.clone(), format!("import failed: could not read {key}: {e}"))
        })?;
        self.import_by_key(state, ctx, call_pos, key, &path_with_suffix.to_string_lossy(), &source)
    }

    fn import_by_key(
        &self,
        state: &mut EngineState,
        ctx: &Context,
        call_pos: &Pos,
        key: String,
        file_name: &str,
        source: &str,
    ) -> Result<Value, GlintError> {
        if let Some(cached) = state.import_cache.get(&key) {
            tracing::trace!(%key, "import cache hit");
            return Ok(cached.clone());
        }

        // Seed the cache with the module's (initially empty) scope before
        // evaluating it, so mutually recursive imports observe each other's
        // partial state instead of looping (§4.7).
        let module_scope = state.scopes.new_root();
        let placeholder = empty_object(state);
        state.import_cache.insert(key.clone(), placeholder);

        let child_ctx = Context { dir: PathBuf::from(file_name).parent().map_or_else(|| ctx.dir.clone(), Path::to_path_buf), file: file_name.into(), scope: module_scope };

        let tokens = crate::token::tokenize(source, file_name);
        let exprs = crate::parse::parse(tokens)?;
        eval_program(self, &child_ctx, &exprs)?;

        let module_object = module_scope_to_object(state, module_scope);
        state.import_cache.insert(key, module_object.clone());
        Ok(module_object)
    }

    /// Runs `f` on a background worker (§5's "suspension points"), without
    /// holding the interpreter lock. `f` receives only the engine handle; it
    /// must call [`Engine::lock`] itself for any part of its work that
    /// touches user values, so the blocking operation it wraps never stalls
    /// every other evaluation in the process. In practice callers use
    /// [`crate::native::callbackify`] rather than this directly.
    pub fn spawn_background(&self, f: impl FnOnce(&Engine) + Send + 'static) {
        let engine = self.clone();
        self.0.wait_group.add();
        let permit = self.0.worker_permits.clone();
        tracing::debug!("spawning background worker");
        thread::spawn(move || {
            if let Some(p) = &permit {
                p.acquire();
            }
            f(&engine);
            if let Some(p) = &permit {
                p.release();
            }
            engine.0.wait_group.done();
        });
    }

    /// Blocks until every outstanding background task has completed (§3.5's
    /// "program exits only after it [the wait group] drains").
    pub fn wait_for_background_work(&self) {
        self.0.wait_group.wait();
    }
}

fn module_scope_to_object(state: &mut EngineState, scope: ScopeId) -> Value {
    // The module's public surface is its top-level bindings, snapshotted into
    // a plain object; later mutation of the module's own scope (e.g. by a
    // second import of the same path, which never happens due to the cache)
    // does not retroactively change an already-returned module object.
    let mut map = ObjectMap::default();
    for (name, value) in state.scopes.bindings_of(scope) {
        map.insert(name, value);
    }
    Value::Object(state.heap.alloc_object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A background worker must be able to make progress while the caller
    /// still holds the interpreter lock; only the part of `f` that touches
    /// `EngineState` is allowed to need it. This reproduces the scenario
    /// that would deadlock if `spawn_background` acquired the lock before
    /// running the worker's non-locked portion.
    #[test]
    fn spawn_background_does_not_need_the_lock_up_front() {
        let engine = Engine::new(ResourceLimits::default());
        let done = Arc::new(std::sync::Mutex::new(false));
        let done2 = done.clone();

        let guard = engine.lock();
        engine.spawn_background(move |_engine| {
            *done2.lock().expect("flag mutex poisoned") = true;
        });

        let start = std::time::Instant::now();
        while !*done.lock().expect("flag mutex poisoned") {
            assert!(start.elapsed() < Duration::from_secs(5), "background worker never ran while the lock was held");
            std::thread::yield_now();
        }
        drop(guard);
        engine.wait_for_background_work();
    }
}
