//! Flat, annotated metric entries.
//!
//! An export is first produced as an ordered [`MetricSequence`]; the tree
//! engine and the text renderers consume that sequence, never the live data.

use std::fmt;

use serde::Serialize;

/// Structural entry kinds. Opening and closing are separate markers so the
/// sequence can be checked for balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupMarker {
    ListOpen,
    DictOpen,
    ListClose,
    DictClose,
}

impl GroupMarker {
    pub const fn is_open(self) -> bool {
        matches!(self, GroupMarker::ListOpen | GroupMarker::DictOpen)
    }

    pub const fn is_close(self) -> bool {
        !self.is_open()
    }

    pub const fn is_list(self) -> bool {
        matches!(self, GroupMarker::ListOpen | GroupMarker::ListClose)
    }

    /// The marker that closes a group opened by `self`.
    pub const fn closing(self) -> GroupMarker {
        if self.is_list() { GroupMarker::ListClose } else { GroupMarker::DictClose }
    }
}

/// Metric type for the pull-based text exposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromType {
    Gauge,
    Counter,
}

impl fmt::Display for PromType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PromType::Gauge => "gauge",
            PromType::Counter => "counter",
        })
    }
}

/// One entry of the flat sequence.
///
/// Exactly one of these holds: a short value is present (scalar), a marker is
/// present (group boundary), or only a label is present (name of the group
/// that opens next). Entries with neither label nor marker are descriptive
/// text only and never reach the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricNode {
    pub label: Option<String>,
    pub description: Option<String>,
    pub short_value: Option<String>,
    pub long_value: Option<String>,
    /// Set when the value is exported as an integer rather than a string.
    pub integer: Option<i64>,
    pub marker: Option<GroupMarker>,
    pub prom_name: Option<&'static str>,
    pub prom_type: Option<PromType>,
    pub prom_labels: Option<String>,
    /// Continues the previous sibling; text renderers use it for spacing.
    pub follow_up: bool,
}

impl MetricNode {
    pub fn marker(marker: GroupMarker) -> Self {
        Self { marker: Some(marker), ..Self::default() }
    }

    /// Label-only entry naming the group that opens next.
    pub fn group_label(label: impl Into<String>, description: Option<String>) -> Self {
        Self { label: Some(label.into()), description, ..Self::default() }
    }

    /// Scalar with distinct machine and human renderings.
    pub fn scalar(
        label: impl Into<String>,
        description: Option<String>,
        short: String,
        long: Option<String>,
    ) -> Self {
        Self {
            label: Some(label.into()),
            description,
            short_value: Some(short),
            long_value: long,
            ..Self::default()
        }
    }

    /// Integer scalar. Values beyond `i64::MAX` saturate in the integer field;
    /// the string renderings keep the exact value.
    pub fn integer(
        label: impl Into<String>,
        description: Option<String>,
        value: u64,
        long: bool,
    ) -> Self {
        let text = value.to_string();
        Self {
            integer: Some(i64::try_from(value).unwrap_or(i64::MAX)),
            long_value: long.then(|| text.clone()),
            ..Self::scalar(label, description, text, None)
        }
    }

    /// Description-only line, optionally with a human-readable value.
    pub fn text(description: impl Into<String>, long: Option<String>) -> Self {
        Self { description: Some(description.into()), long_value: long, ..Self::default() }
    }

    pub fn is_integer(&self) -> bool {
        self.integer.is_some()
    }

    pub fn is_scalar(&self) -> bool {
        self.short_value.is_some()
    }

    /// Label-bearing or structural entries; the follow-up rule looks back to the last of these.
    fn is_anchor(&self) -> bool {
        self.label.is_some() || self.marker.is_some()
    }
}

/// Ordered sequence of metric entries, annotated as they are pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MetricSequence {
    nodes: Vec<MetricNode>,
}

impl MetricSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, marking it as a follow-up when it continues the
    /// previous label-bearing or structural entry:
    /// a non-structural entry after anything but an opening marker, or an
    /// opening marker right after a closing one.
    pub fn push(&mut self, mut node: MetricNode) {
        let last = self.nodes.iter().rev().find(|n| n.is_anchor());
        if let Some(last) = last {
            node.follow_up = match node.marker {
                None => !last.marker.is_some_and(GroupMarker::is_open),
                Some(m) if m.is_open() => last.marker.is_some_and(GroupMarker::is_close),
                Some(_) => false,
            };
        }
        self.nodes.push(node);
    }

    pub fn open_dict(&mut self) {
        self.push(MetricNode::marker(GroupMarker::DictOpen));
    }

    pub fn open_list(&mut self) {
        self.push(MetricNode::marker(GroupMarker::ListOpen));
    }

    pub fn close_dict(&mut self) {
        self.push(MetricNode::marker(GroupMarker::DictClose));
    }

    pub fn close_list(&mut self) {
        self.push(MetricNode::marker(GroupMarker::ListClose));
    }

    /// Name the next group and give it a heading line.
    pub fn header(&mut self, label: &str, description: &str) {
        self.push(MetricNode::group_label(label, Some(description.to_owned())));
    }

    /// Name the next group without a heading line.
    pub fn group(&mut self, label: &str) {
        self.push(MetricNode::group_label(label, None));
    }

    /// Empty separator line.
    pub fn blank(&mut self) {
        self.push(MetricNode::text("", None));
    }

    /// Free-form heading line.
    pub fn text(&mut self, line: impl Into<String>) {
        self.push(MetricNode::text(line, None));
    }

    /// Human-only row: a description and its rendered value.
    pub fn line(&mut self, description: impl Into<String>, long: impl Into<String>) {
        self.push(MetricNode::text(description, Some(long.into())));
    }

    /// Described integer metric.
    pub fn integer(&mut self, label: &str, description: &str, value: u64) {
        self.push(MetricNode::integer(label, Some(description.to_owned()), value, true));
    }

    /// Described string metric with separate short and long renderings.
    pub fn value(&mut self, label: &str, description: &str, short: String, long: String) {
        self.push(MetricNode::scalar(label, Some(description.to_owned()), short, Some(long)));
    }

    /// Undescribed integer metric.
    pub fn short_integer(&mut self, label: &str, value: u64) {
        self.push(MetricNode::integer(label, None, value, false));
    }

    /// Undescribed signed integer metric.
    pub fn short_signed(&mut self, label: &str, value: i64) {
        self.push(MetricNode {
            integer: Some(value),
            ..MetricNode::scalar(label, None, value.to_string(), None)
        });
    }

    /// Undescribed string metric.
    pub fn short(&mut self, label: &str, value: String) {
        self.push(MetricNode::scalar(label, None, value, None));
    }

    /// Undescribed string metric inserted verbatim into the tree.
    pub fn quoted(&mut self, label: &str, value: &str) {
        self.short(label, format!("\"{value}\""));
    }

    /// Attach an exposition name and type to the last entry.
    pub fn prom(&mut self, name: &'static str, kind: PromType) {
        if let Some(last) = self.nodes.last_mut() {
            last.prom_name = Some(name);
            last.prom_type = Some(kind);
        }
    }

    /// Attach an exposition label set (`key="value",…`) to the last entry.
    pub fn prom_labels(&mut self, labels: String) {
        if let Some(last) = self.nodes.last_mut() {
            last.prom_labels = Some(labels);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Entries carrying an exposition name. Everything else is display-only.
    pub fn exposition(&self) -> impl Iterator<Item = &MetricNode> {
        self.nodes.iter().filter(|n| n.prom_name.is_some() && n.is_scalar())
    }
}

impl FromIterator<MetricNode> for MetricSequence {
    fn from_iter<I: IntoIterator<Item = MetricNode>>(iter: I) -> Self {
        let mut seq = MetricSequence::new();
        for node in iter {
            seq.push(node);
        }
        seq
    }
}

impl<'a> IntoIterator for &'a MetricSequence {
    type Item = &'a MetricNode;
    type IntoIter = std::slice::Iter<'a, MetricNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
