//! Rebuilds a nested document from a flat [`MetricSequence`].
//!
//! The sequence is replayed through a small stack machine. Scalars are
//! inserted into the current container, a label-only entry names the group
//! that opens next, and open/close markers push and pop containers. Any
//! deviation from that grammar is a bug in whoever built the sequence and is
//! reported as a [`TreeError`]; the caller's root is left untouched.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use super::metric::{GroupMarker, MetricNode, MetricSequence};
use crate::stats::Statistics;
use crate::time::Timestamp;

/// Ordered dictionary node of the exported document.
pub type Dict = IndexMap<String, Value>;

/// A node of the exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    String(String),
    Dict(Dict),
    List(Vec<Value>),
}

impl Value {
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Look up `key` when this is a dictionary.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Dict(_) => "dict",
            Value::List(_) => "list",
        }
    }
}

/// Malformed sequence. Each variant carries the index of the offending entry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("entry {index}: close marker without an open group")]
    StackUnderflow { index: usize },

    #[error("entry {index}: {marker:?} cannot close a {open}")]
    MismatchedClose {
        index: usize,
        marker: GroupMarker,
        open: &'static str,
    },

    #[error("entry {index}: label `{label}` while `{pending}` is still pending")]
    LabelAlreadyPending {
        index: usize,
        label: String,
        pending: String,
    },

    #[error("entry {index}: group opened inside a dict without a label")]
    MissingLabel { index: usize },

    #[error("label `{label}` is not followed by a group")]
    DanglingLabel { label: String },

    #[error("{depth} group(s) still open at end of sequence")]
    Unbalanced { depth: usize },
}

/// An open group and the key it will be stored under in its parent.
struct Frame {
    key: Option<String>,
    container: Value,
}

/// Insert `value` into a container. Lists drop the key.
fn place(container: &mut Value, key: Option<String>, value: Value) {
    match container {
        Value::Dict(d) => {
            if let Some(key) = key {
                d.insert(key, value);
            }
        }
        Value::List(l) => l.push(value),
        Value::Integer(_) | Value::String(_) => {}
    }
}

fn scalar_value(node: &MetricNode, short: &str) -> Value {
    if let Some(i) = node.integer {
        return Value::Integer(i);
    }
    let unquoted = short
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(short);
    Value::String(unquoted.to_owned())
}

/// Replay `seq` into `root`.
///
/// `initial_label` seeds the pending label, so a sequence starting with an
/// open marker lands under that key. A seed that is never used is dropped.
/// On error `root` is unchanged.
pub fn reconstruct_into(
    root: &mut Dict,
    initial_label: Option<&str>,
    seq: &MetricSequence,
) -> Result<(), TreeError> {
    let mut top = Value::Dict(Dict::new());
    let mut stack: Vec<Frame> = Vec::new();
    let mut pending: Option<String> = initial_label.map(str::to_owned);
    // set while `pending` holds the unconsumed seed, which a real label may replace
    let mut seeded = pending.is_some();

    for (index, node) in seq.iter().enumerate() {
        let current = match stack.last_mut() {
            Some(frame) => &mut frame.container,
            None => &mut top,
        };

        match (node.marker, &node.label, &node.short_value) {
            (Some(marker), _, _) if marker.is_close() => {
                let frame = stack.pop().ok_or(TreeError::StackUnderflow { index })?;
                let matches = match &frame.container {
                    Value::List(_) => marker == GroupMarker::ListClose,
                    Value::Dict(_) => marker == GroupMarker::DictClose,
                    _ => false,
                };
                if !matches {
                    return Err(TreeError::MismatchedClose {
                        index,
                        marker,
                        open: frame.container.kind(),
                    });
                }
                let parent = match stack.last_mut() {
                    Some(p) => &mut p.container,
                    None => &mut top,
                };
                place(parent, frame.key, frame.container);
            }
            (Some(marker), _, _) => {
                seeded = false;
                let key = match current {
                    Value::Dict(_) => {
                        Some(pending.take().ok_or(TreeError::MissingLabel { index })?)
                    }
                    _ => {
                        pending = None;
                        None
                    }
                };
                let container = if marker.is_list() {
                    Value::List(Vec::new())
                } else {
                    Value::Dict(Dict::new())
                };
                stack.push(Frame { key, container });
            }
            (None, None, _) => {}
            (None, Some(label), Some(short)) => {
                place(current, Some(label.clone()), scalar_value(node, short));
            }
            (None, Some(label), None) => {
                if let Some(prev) = pending.as_ref().filter(|_| !seeded) {
                    return Err(TreeError::LabelAlreadyPending {
                        index,
                        label: label.clone(),
                        pending: prev.clone(),
                    });
                }
                seeded = false;
                pending = Some(label.clone());
            }
        }
    }

    if !stack.is_empty() {
        return Err(TreeError::Unbalanced { depth: stack.len() });
    }
    if let Some(label) = pending.filter(|_| !seeded) {
        return Err(TreeError::DanglingLabel { label });
    }

    if let Value::Dict(top) = top {
        root.extend(top);
    }
    Ok(())
}

impl Statistics {
    /// Gather the current metrics and embed them under `statistics` in `root`.
    pub fn export_into<C>(
        &self,
        root: &mut Dict,
        collaborators: &C,
        now: Timestamp,
    ) -> Result<(), TreeError>
    where
        C: super::gather::Collaborators + ?Sized,
    {
        let seq = self.gather_metrics(collaborators, now);
        reconstruct_into(root, Some("statistics"), &seq)
    }
}
