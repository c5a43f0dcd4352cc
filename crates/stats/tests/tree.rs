//! Tree reconstruction from flat metric sequences: well-formed nestings,
//! scalar coercion, and every way a sequence can be malformed.

use indexmap::IndexMap;
use proptest::prelude::*;
use relay_stats::export::{GroupMarker, MetricNode, MetricSequence, TreeError};
use relay_stats::{Dict, Value, reconstruct_into};

fn build(f: impl FnOnce(&mut MetricSequence)) -> MetricSequence {
    let mut s = MetricSequence::new();
    f(&mut s);
    s
}

fn replay(seq: &MetricSequence) -> Result<Dict, TreeError> {
    let mut root = Dict::new();
    reconstruct_into(&mut root, None, seq)?;
    Ok(root)
}

// ---------------------------------------------------------------------------
// Well-formed sequences
// ---------------------------------------------------------------------------

#[test]
fn nested_groups_mirror_the_markers() {
    let seq = build(|s| {
        s.group("a");
        s.open_dict();
        s.short_integer("x", 1);
        s.close_dict();
        s.group("b");
        s.open_list();
        s.open_dict();
        s.short_integer("y", 2);
        s.close_dict();
        s.open_list();
        s.close_list();
        s.close_list();
    });
    let root = replay(&seq).unwrap();

    let json = serde_json::to_value(&root).unwrap();
    assert_eq!(json, serde_json::json!({ "a": { "x": 1 }, "b": [ { "y": 2 }, [] ] }));
}

#[test]
fn dictionary_keys_keep_insertion_order() {
    let seq = build(|s| {
        for key in ["zeta", "alpha", "mid"] {
            s.short_integer(key, 0);
        }
    });
    let root = replay(&seq).unwrap();
    assert_eq!(root.keys().collect::<Vec<_>>(), ["zeta", "alpha", "mid"]);
}

#[test]
fn duplicate_key_replaces_in_place() {
    let seq = build(|s| {
        s.short_integer("a", 1);
        s.short_integer("b", 2);
        s.short_integer("a", 3);
    });
    let root = replay(&seq).unwrap();
    assert_eq!(root.keys().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(root["a"], Value::Integer(3));
}

#[test]
fn descriptive_entries_do_not_reach_the_tree() {
    let seq = build(|s| {
        s.text("heading");
        s.blank();
        s.line("Min/Max/Avg", "1/2/3");
        s.short_integer("kept", 1);
    });
    let root = replay(&seq).unwrap();
    assert_eq!(root.len(), 1);
}

#[test]
fn caller_root_entries_survive() {
    let seq = build(|s| {
        s.open_dict();
        s.short_integer("n", 5);
        s.close_dict();
    });
    let mut root = Dict::new();
    root.insert("result".into(), Value::String("ok".into()));
    reconstruct_into(&mut root, Some("statistics"), &seq).unwrap();

    assert_eq!(root.keys().collect::<Vec<_>>(), ["result", "statistics"]);
    assert_eq!(root["statistics"].get("n"), Some(&Value::Integer(5)));
}

// ---------------------------------------------------------------------------
// Scalar coercion
// ---------------------------------------------------------------------------

#[test]
fn quoted_values_are_unwrapped() {
    let seq = build(|s| {
        s.quoted("name", "foo");
        s.short("raw", "\"".into());
        s.short("inner", "a\"b".into());
    });
    let root = replay(&seq).unwrap();
    assert_eq!(root["name"], Value::String("foo".into()));
    assert_eq!(root["raw"], Value::String("\"".into()));
    assert_eq!(root["inner"], Value::String("a\"b".into()));
}

#[test]
fn integer_flag_decides_the_type() {
    let seq = build(|s| {
        s.short_integer("int", 42);
        s.short("text", "42".into());
        s.short_signed("neg", -3);
    });
    let root = replay(&seq).unwrap();
    assert_eq!(root["int"], Value::Integer(42));
    assert_eq!(root["text"], Value::String("42".into()));
    assert_eq!(root["neg"], Value::Integer(-3));
}

// ---------------------------------------------------------------------------
// Malformed sequences
// ---------------------------------------------------------------------------

#[test]
fn open_in_dict_needs_a_label() {
    let seq = build(|s| {
        s.open_dict();
        s.close_dict();
    });
    assert_eq!(replay(&seq), Err(TreeError::MissingLabel { index: 0 }));
}

#[test]
fn two_labels_in_a_row() {
    let seq = build(|s| {
        s.group("a");
        s.group("b");
        s.open_dict();
        s.close_dict();
    });
    assert!(matches!(
        replay(&seq),
        Err(TreeError::LabelAlreadyPending { index: 1, .. })
    ));
}

#[test]
fn close_without_open() {
    let seq = build(|s| {
        s.group("a");
        s.open_dict();
        s.close_dict();
        s.close_list();
    });
    assert_eq!(replay(&seq), Err(TreeError::StackUnderflow { index: 3 }));
}

#[test]
fn unclosed_group_at_end() {
    let seq = build(|s| {
        s.group("a");
        s.open_dict();
        s.short_integer("x", 1);
        s.close_dict();
        s.group("b");
        s.open_list();
        s.short_integer("y", 2);
    });
    assert_eq!(replay(&seq), Err(TreeError::Unbalanced { depth: 1 }));
}

#[test]
fn label_without_group_at_end() {
    let seq = build(|s| {
        s.short_integer("x", 1);
        s.group("orphan");
    });
    assert_eq!(
        replay(&seq),
        Err(TreeError::DanglingLabel { label: "orphan".into() })
    );
}

#[test]
fn seed_label_is_replaced_by_an_explicit_one() {
    let seq = build(|s| {
        s.group("explicit");
        s.open_list();
        s.close_list();
    });
    let mut root = Dict::new();
    reconstruct_into(&mut root, Some("statistics"), &seq).unwrap();
    assert!(root.contains_key("explicit"));
    assert!(!root.contains_key("statistics"));
}

#[test]
fn marker_with_stray_label_is_still_structural() {
    let mut node = MetricNode::marker(GroupMarker::DictOpen);
    node.label = Some("ignored".into());
    let seq: MetricSequence = [
        MetricNode::group_label("g", None),
        node,
        MetricNode::marker(GroupMarker::DictClose),
    ]
    .into_iter()
    .collect();
    let root = replay(&seq).unwrap();
    assert_eq!(root["g"], Value::Dict(IndexMap::new()));
}

// ---------------------------------------------------------------------------
// Random well-formed nestings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Shape {
    Int(u32),
    Text(String),
    Dict(Vec<(String, Shape)>),
    List(Vec<Shape>),
}

fn shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        (0u32..1_000_000).prop_map(Shape::Int),
        "[a-z ]{0,8}".prop_map(Shape::Text),
    ];
    leaf.prop_recursive(4, 48, 5, |inner| {
        prop_oneof![
            prop::collection::vec(("[a-z]{1,3}", inner.clone()), 0..5).prop_map(Shape::Dict),
            prop::collection::vec(inner, 0..5).prop_map(Shape::List),
        ]
    })
}

/// Emit `shape` into `seq`; `key` is `None` inside lists.
fn emit(seq: &mut MetricSequence, key: Option<&str>, shape: &Shape) {
    match shape {
        Shape::Int(v) => seq.short_integer(key.unwrap_or("_"), u64::from(*v)),
        Shape::Text(t) => seq.quoted(key.unwrap_or("_"), t),
        Shape::Dict(entries) => {
            if let Some(k) = key {
                seq.group(k);
            }
            seq.open_dict();
            for (k, v) in entries {
                emit(seq, Some(k), v);
            }
            seq.close_dict();
        }
        Shape::List(items) => {
            if let Some(k) = key {
                seq.group(k);
            }
            seq.open_list();
            for v in items {
                emit(seq, None, v);
            }
            seq.close_list();
        }
    }
}

fn expected(shape: &Shape) -> Value {
    match shape {
        Shape::Int(v) => Value::Integer(i64::from(*v)),
        Shape::Text(t) => Value::String(t.clone()),
        Shape::Dict(entries) => {
            let mut d = Dict::new();
            for (k, v) in entries {
                d.insert(k.clone(), expected(v));
            }
            Value::Dict(d)
        }
        Shape::List(items) => Value::List(items.iter().map(expected).collect()),
    }
}

proptest! {
    #[test]
    fn balanced_sequences_rebuild_their_shape(
        top in prop::collection::vec(("[a-z]{1,3}", shape()), 0..6)
    ) {
        let mut seq = MetricSequence::new();
        let mut want = Dict::new();
        for (k, v) in &top {
            emit(&mut seq, Some(k), v);
            want.insert(k.clone(), expected(v));
        }

        let got = replay(&seq).unwrap();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn dropping_any_close_marker_is_rejected(
        top in prop::collection::vec(("[a-z]{1,3}", shape()), 1..4),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut seq = MetricSequence::new();
        for (k, v) in &top {
            emit(&mut seq, Some(k), v);
        }
        let closes: Vec<usize> = seq
            .iter()
            .enumerate()
            .filter(|(_, n)| n.marker.is_some_and(GroupMarker::is_close))
            .map(|(i, _)| i)
            .collect();
        prop_assume!(!closes.is_empty());
        let drop_at = closes[pick.index(closes.len())];

        let broken: MetricSequence = seq
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != drop_at)
            .map(|(_, n)| n.clone())
            .collect();
        prop_assert!(replay(&broken).is_err());
    }
}
