//! Lexical scopes (§3.4 / §4.4).
//!
//! Unlike the bytecode teacher's slot-indexed namespaces, `L` is evaluated by
//! walking the AST directly, so scopes here are the classic tree-walker shape
//! named in the reference implementation's own `scope` struct: a parent link
//! plus a name→value map. They live in their own arena, addressed by
//! [`ScopeId`], for the same reason composite values live in the [`Heap`]
//! arena: it keeps everything the interpreter lock guards inside one `Send`
//! structure instead of scattering `Rc<RefCell<_>>` handles that can't cross
//! the background-worker thread boundary described in §5.
//!
//! [`Heap`]: crate::heap::Heap

use ahash::AHashMap;

use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

struct ScopeSlot {
    parent: Option<ScopeId>,
    bindings: AHashMap<String, Value>,
}

#[derive(Default)]
pub struct Scopes {
    slots: Vec<ScopeSlot>,
}

impl Scopes {
    pub fn new_root(&mut self) -> ScopeId {
        self.alloc(None)
    }

    pub fn child_of(&mut self, parent: ScopeId) -> ScopeId {
        self.alloc(Some(parent))
    }

    fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(u32::try_from(self.slots.len()).expect("scope arena exhausted u32 slot space"));
        self.slots.push(ScopeSlot { parent, bindings: AHashMap::default() });
        id
    }

    fn slot(&self, id: ScopeId) -> &ScopeSlot {
        &self.slots[id.0 as usize]
    }

    fn slot_mut(&mut self, id: ScopeId) -> &mut ScopeSlot {
        &mut self.slots[id.0 as usize]
    }

    /// Walks `parent` links looking up `name`.
    pub fn get(&self, id: ScopeId, name: &str) -> Option<Value> {
        let mut cur = Some(id);
        while let Some(sid) = cur {
            let slot = self.slot(sid);
            if let Some(v) = slot.bindings.get(name) {
                return Some(v.clone());
            }
            cur = slot.parent;
        }
        None
    }

    /// Introduces or rebinds `name` in `id` itself. The anonymous parameter
    /// name `""` is suppressed per §4.4.
    pub fn put(&mut self, id: ScopeId, name: &str, value: Value) {
        if name.is_empty() {
            return;
        }
        self.slot_mut(id).bindings.insert(name.to_string(), value);
    }

    /// The scope's own bindings (not its ancestors'), used to snapshot a
    /// finished module's top-level scope into its module object (§4.7).
    pub fn bindings_of(&self, id: ScopeId) -> Vec<(String, Value)> {
        self.slot(id).bindings.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Writes to the nearest ancestor already binding `name`. Returns `false`
    /// (leaving the scope chain untouched) if no ancestor binds it.
    pub fn update(&mut self, id: ScopeId, name: &str, value: Value) -> bool {
        let mut cur = Some(id);
        while let Some(sid) = cur {
            if self.slot(sid).bindings.contains_key(name) {
                self.slot_mut(sid).bindings.insert(name.to_string(), value);
                return true;
            }
            cur = self.slot(sid).parent;
        }
        false
    }
}
