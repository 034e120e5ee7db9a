//! Arena storage for the three reference-shared composite value kinds:
//! strings, lists, and objects.
//!
//! Values never embed their data directly; they carry a [`HeapId`] indexing
//! into this arena, which is exactly the indirection Design Notes §9 calls
//! for to keep two bindings of the same composite observing each other's
//! mutations. The core has no garbage collector: slots live for the lifetime
//! of the engine, which matches the scripting-session lifetime this
//! specification targets and keeps the arena a plain growable vector instead
//! of a refcounted/freed structure.

use crate::value::{ObjectMap, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapId(u32);

#[derive(Debug)]
pub enum HeapData {
    Str(Vec<u8>),
    List(Vec<Value>),
    Object(ObjectMap),
}

#[derive(Default)]
pub struct Heap {
    slots: Vec<HeapData>,
}

/// Point-in-time counts, surfaced for diagnostics/embedders; not used by the
/// evaluator itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapStats {
    pub total_slots: usize,
    pub strings: usize,
    pub lists: usize,
    pub objects: usize,
}

impl Heap {
    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(u32::try_from(self.slots.len()).expect("heap exhausted u32 slot space"));
        self.slots.push(data);
        id
    }

    pub fn alloc_str(&mut self, bytes: Vec<u8>) -> HeapId {
        self.alloc(HeapData::Str(bytes))
    }

    pub fn alloc_list(&mut self, items: Vec<Value>) -> HeapId {
        self.alloc(HeapData::List(items))
    }

    pub fn alloc_object(&mut self, entries: ObjectMap) -> HeapId {
        self.alloc(HeapData::Object(entries))
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.slots[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.slots[id.0 as usize]
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats { total_slots: self.slots.len(), strings: 0, lists: 0, objects: 0 };
        for slot in &self.slots {
            match slot {
                HeapData::Str(_) => stats.strings += 1,
                HeapData::List(_) => stats.lists += 1,
                HeapData::Object(_) => stats.objects += 1,
            }
        }
        stats
    }
}

impl HeapData {
    pub fn as_str(&self) -> Option<&Vec<u8>> {
        match self {
            Self::Str(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Self::Object(m) => Some(m),
            _ => None,
        }
    }
}

/// The unquoted byte representation of a scalar value, used both for object
/// key stringification (§3.3: int/float keys are stringified) and for the
/// `string` builtin's plain (non-display) conversion. Returns `None` for
/// composites and callables, which have no canonical scalar form.
pub fn stringify_scalar(heap: &Heap, v: &Value) -> Option<Vec<u8>> {
    match v {
        Value::Int(n) => Some(n.to_string().into_bytes()),
        Value::Float(f) => {
            let mut buf = ryu::Buffer::new();
            Some(buf.format(*f).as_bytes().to_vec())
        }
        Value::Bool(b) => Some(b.to_string().into_bytes()),
        Value::Atom(a) => Some(a.as_bytes().to_vec()),
        Value::Str(id) => heap.get(*id).as_str().cloned(),
        Value::Null => Some(b"?".to_vec()),
        Value::Empty => Some(b"_".to_vec()),
        Value::List(_) | Value::Object(_) | Value::Fn(..) | Value::Native(_) => None,
    }
}
