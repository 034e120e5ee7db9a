//! Heap-aware value formatting (§4.3). Plain [`std::fmt::Display`] on
//! [`Value`] can't reach composite contents, since those live in the heap
//! arena rather than the value itself, so display is a free function taking
//! the engine state alongside the value.

use crate::engine::EngineState;
use crate::heap::HeapData;
use crate::value::Value;

pub fn display_value(state: &EngineState, v: &Value) -> String {
    let mut out = String::new();
    write_value(state, v, &mut out);
    out
}

fn write_value(state: &EngineState, v: &Value, out: &mut String) {
    match v {
        Value::Empty => out.push('_'),
        Value::Null => out.push('?'),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(n) => {
            let mut buf = ryu::Buffer::new();
            out.push_str(buf.format(*n));
        }
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Atom(name) => {
            out.push(':');
            out.push_str(name);
        }
        Value::Str(id) => {
            out.push('\'');
            let bytes = state.heap.get(*id).as_str().expect("Str value points at string heap data");
            out.push_str(&String::from_utf8_lossy(bytes));
            out.push('\'');
        }
        Value::List(id) => {
            out.push('[');
            let items = state.heap.get(*id).as_list().expect("List value points at list heap data");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(state, item, out);
            }
            out.push(']');
        }
        Value::Object(id) => {
            out.push('{');
            let HeapData::Object(map) = state.heap.get(*id) else {
                unreachable!("Object value points at object heap data")
            };
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(k);
                out.push_str(": ");
                write_value(state, &map[*k], out);
            }
            out.push('}');
        }
        Value::Fn(def, _) => {
            out.push_str("fn ");
            if let Some(name) = &def.name {
                out.push_str(name);
            }
            out.push('(');
            for (i, p) in def.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(if p.is_empty() { "_" } else { p });
            }
            out.push(')');
        }
        Value::Native(n) => {
            out.push_str("fn ");
            out.push_str(n.name());
            out.push_str("(...)");
        }
    }
}
