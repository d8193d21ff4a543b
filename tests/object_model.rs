// Object model behaviour through the public API: stems and compound
// variables, directories, access control and the sort built on stems.

use std::sync::Arc;

use oryx_core::vm::{
    Activity, CompoundElement, CompoundTail, Method, MethodFlags, NovalueHandler, SignalNovalue, SortOptions,
    VariableDictionary,
};
use oryx_core::{Activation, ErrorKind, OryxResult, Value, VM};

fn tail(parts: &[&str]) -> CompoundTail {
    CompoundTail::from_parts(parts)
}

fn put(vm: &VM, stem: &Value, value: &str, index: &str) {
    vm.send_message(&vm.root_activation(), stem, "[]=", &[Value::from(value), Value::from(index)])
        .unwrap();
}

fn at(vm: &VM, stem: &Value, index: &str) -> Value {
    vm.send_message(&vm.root_activation(), stem, "[]", &[Value::from(index)])
        .unwrap()
}

#[test]
fn test_unset_compound_reads_its_own_name() {
    let vm = VM::new();
    let root = vm.root_activation();
    let variables = VariableDictionary::new(None);

    vm.set_compound(&variables, "S.", &tail(&["A", "B"]), Value::from("42")).unwrap();
    assert_eq!(
        vm.evaluate_compound(&root, &variables, "S.", &tail(&["A", "B"])).unwrap(),
        Value::from("42")
    );
    assert_eq!(
        vm.evaluate_compound(&root, &variables, "S.", &tail(&["A", "C"])).unwrap(),
        Value::from("S.A.C")
    );

    let stem = vm.stem_variable(&variables, "S.").unwrap();
    let err = vm
        .sort_stem(&root, &stem, "", 1, None, SortOptions::default())
        .unwrap_err();
    assert!(err.is(ErrorKind::SortMissingSize));
    assert_eq!(
        vm.evaluate_compound(&root, &variables, "S.", &tail(&["A", "B"])).unwrap(),
        Value::from("42")
    );
}

#[test]
fn test_stem_default_absorbs_unset_tails() {
    let vm = VM::new();
    let root = vm.root_activation();
    let variables = VariableDictionary::new(None);

    vm.assign_stem(&variables, "STEM.", Value::from("D")).unwrap();
    assert_eq!(
        vm.evaluate_compound(&root, &variables, "STEM.", &tail(&["5"])).unwrap(),
        Value::from("D")
    );

    vm.drop_stem(&variables, "STEM.").unwrap();
    assert_eq!(
        vm.evaluate_compound(&root, &variables, "STEM.", &tail(&["5"])).unwrap(),
        Value::from("STEM.5")
    );
}

#[test]
fn test_bare_assignment_resets_every_tail() {
    let vm = VM::new();
    let stem = vm.new_stem("S.");
    put(&vm, &stem, "kept?", "1");
    vm.send_message(&vm.root_activation(), &stem, "[]=", &[Value::from("fresh")])
        .unwrap();

    assert_eq!(at(&vm, &stem, "1"), Value::from("fresh"));
    let items = vm.send_message(&vm.root_activation(), &stem, "items", &[]).unwrap();
    assert_eq!(items, Value::from("0"));
}

struct Recorder;

impl NovalueHandler for Recorder {
    fn handle_novalue_event(
        &self,
        name: &str,
        default: Value,
        _element: Option<&Arc<CompoundElement>>,
    ) -> OryxResult<Value> {
        Ok(Value::string(format!("novalue {} ({:?})", name, default)))
    }
}

#[test]
fn test_signalled_novalue_names_the_compound() {
    let vm = VM::new();
    let strict = Activation::root(Activity::new("strict")).with_novalue(Arc::new(SignalNovalue));
    let variables = VariableDictionary::new(None);
    vm.set_compound(&variables, "S.", &tail(&["A", "B"]), Value::from("42")).unwrap();

    assert_eq!(
        vm.evaluate_compound(&strict, &variables, "S.", &tail(&["A", "B"])).unwrap(),
        Value::from("42")
    );
    let err = vm
        .evaluate_compound(&strict, &variables, "S.", &tail(&["A", "C"]))
        .unwrap_err();
    assert!(err.is(ErrorKind::NoValue));
    assert!(err.message.contains("S.A.C"));
}

#[test]
fn test_novalue_handler_sees_the_qualified_name() {
    let vm = VM::new();
    let plain = vm.root_activation();
    let trapped = Activation::root(Activity::new("trapped")).with_novalue(Arc::new(Recorder));
    let variables = VariableDictionary::new(None);

    assert_eq!(
        vm.evaluate_compound(&trapped, &variables, "X.", &tail(&["Y"])).unwrap(),
        Value::from("novalue X.Y (\"X.Y\")")
    );
    assert_eq!(
        vm.evaluate_compound(&plain, &variables, "X.", &tail(&["Y"])).unwrap(),
        Value::from("X.Y")
    );

    // a stem default means there is no NOVALUE at all
    vm.assign_stem(&variables, "X.", Value::from("")).unwrap();
    assert_eq!(
        vm.evaluate_compound(&trapped, &variables, "X.", &tail(&["Y"])).unwrap(),
        Value::from("")
    );
}

#[test]
fn test_expose_collapses_to_the_real_element() {
    let vm = VM::new();
    let root = vm.root_activation();
    let outer = VariableDictionary::new(None);
    let middle = VariableDictionary::new(None);
    let inner = VariableDictionary::new(None);
    let item = tail(&["ITEM"]);

    vm.set_compound(&outer, "LIST.", &item, Value::from("first")).unwrap();
    let from_middle = vm.expose_compound(&outer, &middle, "LIST.", &item).unwrap();
    let from_inner = vm.expose_compound(&middle, &inner, "LIST.", &item).unwrap();
    assert!(!from_inner.is_alias());
    assert!(Arc::ptr_eq(&from_middle, &from_inner));

    vm.set_compound(&inner, "LIST.", &item, Value::from("second")).unwrap();
    for variables in [&outer, &middle, &inner] {
        assert_eq!(
            vm.evaluate_compound(&root, variables, "LIST.", &item).unwrap(),
            Value::from("second")
        );
    }

    // other tails of the frames stay separate
    vm.set_compound(&inner, "LIST.", &tail(&["OTHER"]), Value::from("local")).unwrap();
    assert_eq!(
        vm.evaluate_compound(&root, &outer, "LIST.", &tail(&["OTHER"])).unwrap(),
        Value::from("LIST.OTHER")
    );
}

#[test]
fn test_expose_whole_stem_shares_it() {
    let vm = VM::new();
    let root = vm.root_activation();
    let caller = VariableDictionary::new(None);
    let callee = VariableDictionary::new(None);

    vm.expose_stem(&caller, &callee, "DATA.").unwrap();
    vm.set_compound(&callee, "DATA.", &tail(&["K"]), Value::from("v")).unwrap();
    assert_eq!(
        vm.evaluate_compound(&root, &caller, "DATA.", &tail(&["K"])).unwrap(),
        Value::from("v")
    );
}

#[test]
fn test_sort_touches_only_the_range() {
    let vm = VM::new();
    let root = vm.root_activation();
    let stem = vm.new_stem("S.");
    put(&vm, &stem, "5", "0");
    for (i, word) in ["echo", "delta", "charlie", "bravo", "alpha"].iter().enumerate() {
        put(&vm, &stem, word, &(i + 1).to_string());
    }
    put(&vm, &stem, "untouched", "X");

    vm.sort_stem(&root, &stem, "", 2, Some(4), SortOptions::default()).unwrap();

    let sorted: Vec<Value> = (0..=5).map(|i| at(&vm, &stem, &i.to_string())).collect();
    assert_eq!(
        sorted,
        vec![
            Value::from("5"),
            Value::from("echo"),
            Value::from("bravo"),
            Value::from("charlie"),
            Value::from("delta"),
            Value::from("alpha"),
        ]
    );
    assert_eq!(at(&vm, &stem, "X"), Value::from("untouched"));
}

#[test]
fn test_sort_method_with_options() {
    let vm = VM::new();
    let root = vm.root_activation();
    let stem = vm.new_stem("NAMES.");
    put(&vm, &stem, "3", "0");
    put(&vm, &stem, "bob", "1");
    put(&vm, &stem, "Alice", "2");
    put(&vm, &stem, "carol", "3");

    vm.send_message(&root, &stem, "sort", &[Value::from("D"), Value::from("I")])
        .unwrap();
    assert_eq!(at(&vm, &stem, "1"), Value::from("carol"));
    assert_eq!(at(&vm, &stem, "2"), Value::from("bob"));
    assert_eq!(at(&vm, &stem, "3"), Value::from("Alice"));
}

#[test]
fn test_sort_failures_leave_the_stem_alone() {
    let vm = VM::new();
    let root = vm.root_activation();
    let stem = vm.new_stem("S.");
    put(&vm, &stem, "lots", "0");
    put(&vm, &stem, "b", "1");
    let err = vm.sort_stem(&root, &stem, "", 1, None, SortOptions::default()).unwrap_err();
    assert!(err.is(ErrorKind::SortNonNumericSize));

    put(&vm, &stem, "3", "0");
    put(&vm, &stem, "a", "3");
    let err = vm.sort_stem(&root, &stem, "", 1, None, SortOptions::default()).unwrap_err();
    assert!(err.is(ErrorKind::SortSparse));
    assert_eq!(at(&vm, &stem, "1"), Value::from("b"));
    assert_eq!(at(&vm, &stem, "3"), Value::from("a"));

    let err = vm.sort_stem(&root, &stem, "", 2, Some(9), SortOptions::default()).unwrap_err();
    assert!(err.is(ErrorKind::SortBounds));
}

#[test]
fn test_directory_shadowing_both_ways() {
    let vm = VM::new();
    let root = vm.root_activation();
    let dir = vm.new_directory();
    let computed = vm.add_method(Method::from_fn("x", |_, _, _, _| Ok(Value::from("computed"))));

    vm.send_message(&root, &dir, "put", &[Value::from("stored"), Value::from("X")])
        .unwrap();
    vm.send_message(&root, &dir, "setMethod", &[Value::from("X"), Value::Method(computed)])
        .unwrap();
    assert_eq!(
        vm.send_message(&root, &dir, "at", &[Value::from("X")]).unwrap(),
        Value::from("computed")
    );

    vm.send_message(&root, &dir, "put", &[Value::from("stored"), Value::from("X")])
        .unwrap();
    assert_eq!(
        vm.send_message(&root, &dir, "at", &[Value::from("X")]).unwrap(),
        Value::from("stored")
    );
}

#[test]
fn test_directory_entries_as_messages() {
    let vm = VM::new();
    let root = vm.root_activation();
    let dir = vm.new_directory();

    vm.send_message(&root, &dir, "color=", &[Value::from("red")]).unwrap();
    assert_eq!(vm.send_message(&root, &dir, "color", &[]).unwrap(), Value::from("red"));
    assert_eq!(
        vm.send_message(&root, &dir, "entry", &[Value::from("color")]).unwrap(),
        Value::from("red")
    );
    assert_eq!(vm.send_message(&root, &dir, "size", &[]).unwrap(), Value::Nil);
}

#[test]
fn test_private_method_from_unrelated_class() {
    let vm = VM::new();
    let root = vm.root_activation();
    let safe = vm.create_class("Safe", None, None).unwrap();
    let thief = vm.create_class("Thief", None, None).unwrap();
    let combination = Method::from_fn("combination", |_, _, _, _| Ok(Value::from("1234")))
        .with_flags(MethodFlags::PRIVATE);
    vm.define(safe, "combination", Some(combination)).unwrap();
    let open = |name: &str| {
        Method::from_fn(name, |vm, activation, _, args| {
            vm.send_message(activation, &args[0], "combination", &[])
        })
    };
    vm.define(safe, "unlock", Some(open("unlock"))).unwrap();
    vm.define(thief, "crack", Some(open("crack"))).unwrap();

    let target = vm.new_instance(&root, safe, &[]).unwrap();
    let twin = vm.new_instance(&root, safe, &[]).unwrap();
    let burglar = vm.new_instance(&root, thief, &[]).unwrap();

    assert_eq!(
        vm.send_message(&root, &twin, "unlock", &[target.clone()]).unwrap(),
        Value::from("1234")
    );
    let err = vm.send_message(&root, &burglar, "crack", &[target]).unwrap_err();
    assert!(err.is(ErrorKind::PrivateMethod));
}

#[test]
fn test_message_object_round_trip() {
    let vm = VM::new();
    let root = vm.root_activation();
    let message_class = Value::Class(vm.builtins().message);
    let message = vm
        .send_message(
            &root,
            &message_class,
            "new",
            &[Value::from("abc"), Value::from("length")],
        )
        .unwrap();

    let err = vm.send_message(&root, &message, "result", &[]).unwrap_err();
    assert!(err.is(ErrorKind::Activity));
    assert_eq!(vm.send_message(&root, &message, "send", &[]).unwrap(), Value::from("3"));
    assert_eq!(vm.send_message(&root, &message, "result", &[]).unwrap(), Value::from("3"));
    assert!(vm.send_message(&root, &message, "send", &[]).is_err());
}
