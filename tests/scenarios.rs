//! End-to-end scenarios run through the public API, mirroring how an
//! embedder would call into this crate: build an [`Engine`], evaluate
//! source, inspect the result.

use glint::{display_value, run, Engine, ErrorKind, Outcome, ResourceLimits, Value};
use pretty_assertions::assert_eq;

fn eval(src: &str) -> Value {
    let engine = Engine::new(ResourceLimits::default());
    match run(&engine, "test", ".", src).expect("program should evaluate") {
        Outcome::Value(v) => v,
        Outcome::Exit(code) => panic!("unexpected exit({code})"),
    }
}

fn eval_display(src: &str) -> String {
    let engine = Engine::new(ResourceLimits::default());
    let v = match run(&engine, "test", ".", src).expect("program should evaluate") {
        Outcome::Value(v) => v,
        Outcome::Exit(code) => panic!("unexpected exit({code})"),
    };
    display_value(&engine.lock(), &v)
}

fn eval_err(src: &str) -> glint::GlintError {
    let engine = Engine::new(ResourceLimits::default());
    run(&engine, "test", ".", src).expect_err("program should fail")
}

#[test]
fn scenario_factorial() {
    let src = "fn fact(n) if n { 0 -> 1, _ -> n * fact(n - 1) }, fact(10)";
    assert!(matches!(eval(src), Value::Int(3_628_800)));
}

#[test]
fn scenario_string_indexing() {
    let src = "s := 'Hello, World!', [s.0 + s.2, s.-2, s.15]";
    assert_eq!(eval_display(src), "['Hl', ?, ?]");
}

#[test]
fn scenario_object_key_deletion() {
    let src = "obj := {a: 1, b: 2}, obj.b := _, keys(obj)";
    assert_eq!(eval_display(src), "['a']");
}

#[test]
fn scenario_pipeline() {
    let src = "fn add(a, b) a + b, 10 |> add(20) |> add(100)";
    assert!(matches!(eval(src), Value::Int(130)));
}

#[test]
fn scenario_list_push_and_append_by_computed_index() {
    let src = "arr := [], arr << 1 << 2 << 3, arr.(len(arr)) := 4, arr";
    assert_eq!(eval_display(src), "[1, 2, 3, 4]");
}

#[test]
fn scenario_multi_target_if() {
    let src = "if 12 { 10, 5+7, {10+3} -> :yes, _ -> :no }";
    assert_eq!(eval_display(src), ":yes");
}

#[test]
fn scenario_deep_tail_call_does_not_overflow_the_stack() {
    let src = "fn loopy(n) if n { 0 -> :done, _ -> loopy(n - 1) }, loopy(100000)";
    assert_eq!(eval_display(src), ":done");
}

#[test]
fn universal_empty_program_is_null() {
    assert!(matches!(eval(""), Value::Null));
}

#[test]
fn universal_empty_is_a_wildcard_on_both_sides_of_eq() {
    assert!(matches!(eval("_ = 5"), Value::Bool(true)));
    assert!(matches!(eval("5 = _"), Value::Bool(true)));
}

#[test]
fn universal_shared_list_mutation_is_observed_through_both_bindings() {
    let src = "a := [1], b := a, b << 2, len(a)";
    assert!(matches!(eval(src), Value::Int(2)));
}

#[test]
fn universal_import_is_memoized_across_two_calls() {
    let src = "a := import('math'), b := import('math'), a.abs = b.abs";
    assert!(matches!(eval(src), Value::Bool(true)));
}

#[test]
fn universal_keys_and_indexed_read_agree() {
    // An explicitly-Null value still has its key present in `keys`; only
    // `:= _` removes it.
    let src = "obj := {a: 1, b: ?}, keys(obj)";
    assert_eq!(eval_display(src), "['a', 'b']");
    let src = "obj := {a: 1}, keys(obj).(0) = 'a'";
    assert!(matches!(eval(src), Value::Bool(true)));
}

#[test]
fn round_trip_string_int() {
    assert_eq!(eval_display("string(int('42'))"), "'42'");
}

#[test]
fn round_trip_codepoint_char() {
    for n in [0_i64, 1, 65, 255] {
        let src = format!("codepoint(char({n}))");
        assert!(matches!(eval(&src), Value::Int(v) if v == n));
    }
}

#[test]
fn boundary_read_past_end_of_list_is_null_and_write_appends() {
    assert!(matches!(eval("l := [1, 2], l.(len(l))"), Value::Null));
    assert!(matches!(eval("l := [1, 2], l.(len(l)) := 3, len(l)"), Value::Int(3)));
}

#[test]
fn boundary_negative_index_reads_null() {
    assert!(matches!(eval("'abc'.-1"), Value::Null));
    assert!(matches!(eval("[1, 2].-1"), Value::Null));
}

#[test]
fn boundary_empty_brace_parses_as_empty_object() {
    assert_eq!(eval_display("{}"), "{}");
}

#[test]
fn boundary_fn_with_empty_block_returns_null() {
    assert!(matches!(eval("f := fn {}, f()"), Value::Null));
}

#[test]
fn boundary_int_division_by_zero_errors() {
    let err = eval_err("1 / 0");
    assert_eq!(err.kind, ErrorKind::Runtime);
}

#[test]
fn boundary_float_division_by_zero_never_produces_nan() {
    let err = eval_err("0.0 / 0.0");
    assert_eq!(err.kind, ErrorKind::Runtime);
}

#[test]
fn destructuring_assignment_binds_list_pattern_elements() {
    assert_eq!(eval_display("[a, b] := [1, 2], [b, a]"), "[2, 1]");
}

#[test]
fn destructuring_assignment_missing_slots_bind_null() {
    assert_eq!(eval_display("[a, b] := [1], b"), "?");
}

#[test]
fn std_library_map_and_filter_round_trip() {
    let src = "std := import('std'), std.map([1, 2, 3], fn(x) x * 2)";
    assert_eq!(eval_display(src), "[2, 4, 6]");
}

#[test]
fn math_library_pow_and_clamp() {
    assert!(matches!(eval("import('math').pow(2, 10)"), Value::Int(1024)));
    assert!(matches!(eval("import('math').clamp(15, 0, 10)"), Value::Int(10)));
}

#[test]
fn str_library_repeat_and_reverse() {
    assert_eq!(eval_display("import('str').repeat('ab', 3)"), "'ababab'");
    assert_eq!(eval_display("import('str').reverse('abc')"), "'cba'");
}

#[test]
fn exit_unwinds_to_an_outcome_not_a_runtime_error() {
    let engine = Engine::new(ResourceLimits::default());
    assert!(matches!(run(&engine, "test", ".", "exit(3)").unwrap(), Outcome::Exit(3)));
}
