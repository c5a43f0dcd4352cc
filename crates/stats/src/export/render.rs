//! Operator-facing plain-text view of a metric sequence.

use std::fmt::Write;

use super::metric::MetricSequence;

/// One line per described entry. Scalars and value rows render as
/// `description: value`; a group heading that continues a previous group is
/// preceded by a blank line.
pub fn render_text(seq: &MetricSequence) -> String {
    let mut out = String::new();

    for node in seq {
        let Some(descr) = node.description.as_deref() else {
            continue;
        };
        let heading = node.label.is_some() && !node.is_scalar();
        if heading && node.follow_up {
            out.push('\n');
        }
        let _ = match (node.long_value.as_deref(), descr.is_empty()) {
            (Some(long), true) => writeln!(out, "{long}"),
            (Some(long), false) => writeln!(out, " {descr:<48}: {long}"),
            (None, _) => writeln!(out, "{descr}"),
        };
    }

    out
}
