use super::{Value, ValueMap};
use crate::params;

#[test]
fn test_insert_replaces_in_place() {
    let mut map = params! { "a" => 1, "b" => 2, "c" => 3 };
    map.insert("a", 10);
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert_eq!(map.get("a"), Some(&Value::Int(10)));
}

#[test]
fn test_remove_keeps_order() {
    let mut map = params! { "a" => 1, "b" => 2, "c" => 3 };
    assert_eq!(map.remove("b"), Some(Value::Int(2)));
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(map.remove("zzz"), None);
}

#[test]
fn test_merge_other_wins() {
    let mut base = params! { "status" => "draft", "owner" => 1 };
    base.merge(params! { "status" => "live", "title" => "x" });
    assert_eq!(base.get("status"), Some(&Value::from("live")));
    assert_eq!(base.keys().collect::<Vec<_>>(), vec!["status", "owner", "title"]);
}

#[test]
fn test_loose_eq_numeric_text() {
    assert!(Value::Int(5).loose_eq(&Value::from("5")));
    assert!(Value::from(" 5 ").loose_eq(&Value::Int(5)));
    assert!(Value::Float(2.0).loose_eq(&Value::Int(2)));
    assert!(Value::from("1.50").loose_eq(&Value::Float(1.5)));
    assert!(!Value::Int(5).loose_eq(&Value::from("5a")));
}

#[test]
fn test_loose_eq_empty_string_is_not_zero() {
    assert!(!Value::from("").loose_eq(&Value::Int(0)));
    assert!(!Value::from("").loose_eq(&Value::Bool(false)));
    assert!(!Value::from("").loose_eq(&Value::Null));
    assert!(!Value::Null.loose_eq(&Value::Int(0)));
    assert!(Value::Null.loose_eq(&Value::Null));
}

#[test]
fn test_loose_eq_bool() {
    assert!(Value::Bool(true).loose_eq(&Value::Int(1)));
    assert!(Value::Bool(false).loose_eq(&Value::from("0")));
    assert!(!Value::Bool(true).loose_eq(&Value::from("true")));
}

#[test]
fn test_loose_eq_text_is_exact() {
    assert!(Value::from("abc").loose_eq(&Value::from("abc")));
    assert!(!Value::from("abc").loose_eq(&Value::from("ABC")));
}

#[test]
fn test_json_conversion() {
    let json: serde_json::Value = serde_json::from_str(r#"{"a":[true,null,"x"],"z":1}"#).unwrap();
    let value = Value::from(json);
    let Value::Map(map) = &value else {
        panic!("expected map");
    };
    assert_eq!(map.get("z"), Some(&Value::Int(1)));
    assert_eq!(
        map.get("a"),
        Some(&Value::List(vec![Value::Bool(true), Value::Null, Value::from("x")]))
    );
    assert_eq!(value.to_json().to_string(), r#"{"a":[true,null,"x"],"z":1}"#);
}

#[test]
fn test_display() {
    assert_eq!(Value::Null.to_string(), "");
    assert_eq!(Value::Bool(true).to_string(), "1");
    assert_eq!(Value::from(vec![1, 2]).to_string(), "[1,2]");
    assert_eq!(Value::expr("NOW()").to_string(), "NOW()");
}

#[test]
fn test_blank() {
    assert!(Value::Null.is_blank());
    assert!(Value::from("").is_blank());
    assert!(Value::Map(ValueMap::new()).is_blank());
    assert!(!Value::Int(0).is_blank());
}
