//! Property tests for contract parsing.
//!
//! - Serialized values survive a prose preamble plus a code fence.
//! - One missing comma between keys is recovered.
//! - One raw newline inside a string value is recovered.

use casegen_contract::{parse_contract, ContractParser};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 {}\\[\\],:\"\\\\]{0,12}".prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,6}", value(), 1..5)
        .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()))
}

proptest! {
    #[test]
    fn prop_preamble_and_fence_roundtrip(obj in object(), pretty in any::<bool>()) {
        let body = if pretty {
            serde_json::to_string_pretty(&obj).unwrap()
        } else {
            serde_json::to_string(&obj).unwrap()
        };
        let text = format!("Sure, here is the payload you asked for:\n```json\n{body}\n```\nAnything else?");
        prop_assert_eq!(parse_contract(&text).unwrap(), obj);
    }

    #[test]
    fn prop_single_missing_comma_between_keys(
        a in "[a-z]{1,6}",
        b in "[A-Z]{1,6}",
        va in "[a-z ]{0,10}",
        vb in any::<i32>(),
    ) {
        let expected = json!({ a.clone(): va.clone(), b.clone(): vb });
        let broken = format!("{{\"{a}\": \"{va}\" \"{b}\": {vb}}}");
        prop_assert!(serde_json::from_str::<Value>(&broken).is_err());
        prop_assert_eq!(parse_contract(&broken).unwrap(), expected);
    }

    #[test]
    fn prop_single_raw_newline_in_string(
        key in "[a-z]{1,6}",
        head in "[a-zA-Z ]{0,10}",
        tail in "[a-zA-Z ]{0,10}",
    ) {
        let expected = json!({ key.clone(): format!("{head}\n{tail}") });
        let broken = format!("{{\"{key}\": \"{head}\n{tail}\"}}");
        prop_assert_eq!(parse_contract(&broken).unwrap(), expected);
    }
}

#[test]
fn missing_comma_and_trailing_comma_in_case_list() {
    let text = r#"
    Model notes first.
    {
      "cases": [
        {"id": "010.010", "title": "Login succeeds" "steps": ["open", "submit"]}
        {"id": "010.020", "title": "OTP expires", "steps": ["wait 5 minutes",],}
      ]
    }
    "#;
    let parsed = ContractParser.parse_object(text).unwrap();
    let cases = parsed.value["cases"].as_array().unwrap();
    assert_eq!(cases.len(), 2);
    assert_eq!(cases[0]["title"], "Login succeeds");
    assert_eq!(cases[1]["steps"], json!(["wait 5 minutes"]));
}
