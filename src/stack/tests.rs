//! Value stack tests

use super::*;
use crate::functions::{ClientFuncId, ServerFuncId};
use proptest::prelude::*;

#[test]
fn test_scalar_round_trip() {
    let mut stack = ValueStack::new();

    stack.push(true);
    assert_eq!(stack.pop::<bool>(), Ok(true));

    stack.push(-7i32);
    assert_eq!(stack.pop::<i32>(), Ok(-7));

    stack.push(u64::MAX);
    assert_eq!(stack.pop::<u64>(), Ok(u64::MAX));

    stack.push(2.5f64);
    assert_eq!(stack.pop::<f64>(), Ok(2.5));

    stack.push(Handle::from_raw(0xdead_beef));
    assert_eq!(stack.pop::<Handle>(), Ok(Handle::from_raw(0xdead_beef)));

    stack.push(ClientFuncId(3));
    assert_eq!(stack.pop::<ClientFuncId>(), Ok(ClientFuncId(3)));

    assert!(stack.is_empty());
}

#[test]
fn test_lifo_order() {
    let mut stack = ValueStack::new();
    stack.push(1i32);
    stack.push_str("two");
    stack.push(false);

    assert_eq!(stack.pop::<bool>(), Ok(false));
    assert_eq!(stack.pop::<String>(), Ok("two".to_string()));
    assert_eq!(stack.pop::<i32>(), Ok(1));
}

#[test]
fn test_tag_mismatch_leaves_slot() {
    let mut stack = ValueStack::new();
    stack.push(5i32);

    let err = stack.pop::<bool>().unwrap_err();
    assert_eq!(
        err,
        ProtocolError::TagMismatch {
            expected: Tag::Bool,
            found: Tag::I32
        }
    );
    assert_eq!(stack.peek_tag(), Some(Tag::I32));
}

#[test]
fn test_signedness_is_part_of_the_tag() {
    let mut stack = ValueStack::new();
    stack.push(5u32);
    assert!(matches!(
        stack.pop::<i32>(),
        Err(ProtocolError::TagMismatch { .. })
    ));
}

#[test]
fn test_underflow() {
    let mut stack = ValueStack::new();
    assert_eq!(
        stack.pop::<String>(),
        Err(ProtocolError::StackUnderflow { expected: Tag::Str })
    );
}

#[test]
fn test_instance_and_null() {
    let mut stack = ValueStack::new();
    stack.push(InstanceRef::Server(7));
    stack.push_null();
    stack.push(InstanceRef::Client(7));

    assert_eq!(stack.pop_instance(), Ok(Some(InstanceRef::Client(7))));
    assert_eq!(stack.pop_instance(), Ok(None));
    assert_eq!(stack.pop_instance(), Ok(Some(InstanceRef::Server(7))));
}

#[test]
fn test_pop_instance_rejects_other_tags() {
    let mut stack = ValueStack::new();
    stack.push(ServerFuncId(1));
    assert!(matches!(
        stack.pop_instance(),
        Err(ProtocolError::TagMismatch {
            expected: Tag::Instance,
            found: Tag::ServerFunc
        })
    ));
}

#[test]
fn test_array_layout_is_count_on_top() {
    let mut stack = ValueStack::new();
    stack.push_array(vec![10i32, 20, 30]);

    assert_eq!(stack.len(), 4);
    assert_eq!(stack.peek_tag(), Some(Tag::Size));
    assert_eq!(stack.pop::<usize>(), Ok(3));
    assert_eq!(stack.pop::<i32>(), Ok(10));
}

#[test]
fn test_string_array_preserves_order() {
    let mut stack = ValueStack::new();
    stack.push_string_array(&["app", "--style", "fusion"]);

    let args = stack.pop_string_array().unwrap();
    assert_eq!(args, vec!["app", "--style", "fusion"]);
    assert!(stack.is_empty());
}

#[test]
fn test_empty_array() {
    let mut stack = ValueStack::new();
    stack.push_string_array::<&str>(&[]);
    assert_eq!(stack.pop_string_array(), Ok(Vec::new()));
    assert!(stack.is_empty());
}

#[test]
fn test_array_with_wrong_element_tag() {
    let mut stack = ValueStack::new();
    stack.push_array(vec![1i32, 2]);
    assert!(stack.pop_array::<String>().is_err());
}

#[test]
fn test_drain_and_high_water() {
    let mut stack = ValueStack::new();
    stack.push(1i8);
    stack.push(2i8);
    stack.push(3i8);
    let _ = stack.pop::<i8>();

    assert_eq!(stack.high_water(), 3);
    assert_eq!(stack.drain(), vec![Value::I8(1), Value::I8(2)]);
    assert!(stack.is_empty());
    assert_eq!(stack.high_water(), 0);
}

#[test]
fn test_tag_classification() {
    assert!(Tag::Size.is_integral());
    assert!(Tag::F32.is_float());
    assert!(!Tag::Str.is_integral());
    assert_eq!(Tag::ServerFunc.to_string(), "server function");
}

proptest! {
    #[test]
    fn prop_string_round_trip(s in ".*") {
        let mut stack = ValueStack::new();
        stack.push(s.clone());
        prop_assert_eq!(stack.pop::<String>(), Ok(s));
    }

    #[test]
    fn prop_string_array_round_trip(items in proptest::collection::vec(".*", 0..16)) {
        let mut stack = ValueStack::new();
        stack.push_string_array(&items);
        prop_assert_eq!(stack.pop_string_array(), Ok(items));
        prop_assert!(stack.is_empty());
    }
}
