//! Pull-based text exposition of a metric sequence.
//!
//! Samples sharing a metric name are grouped under a single `# TYPE` line, in
//! order of the name's first appearance. Entries without a name never appear,
//! and a name none of whose samples is numeric gets no `# TYPE` line either.

use std::fmt::Write;

use indexmap::IndexMap;
use relay_stats::MetricSequence;
use relay_stats::export::{MetricNode, PromType};

pub const PREFIX: &str = "relay_";

struct Family<'a> {
    kind: Option<PromType>,
    samples: Vec<&'a MetricNode>,
}

fn sample_value(node: &MetricNode) -> Option<String> {
    if let Some(v) = node.integer {
        return Some(v.to_string());
    }
    let raw = node.short_value.as_deref()?.trim_matches('"');
    raw.parse::<f64>().is_ok().then(|| raw.to_owned())
}

pub fn render(seq: &MetricSequence) -> String {
    let mut families: IndexMap<&'static str, Family<'_>> = IndexMap::new();
    for node in seq.exposition() {
        let Some(name) = node.prom_name else { continue };
        let family = families
            .entry(name)
            .or_insert_with(|| Family { kind: node.prom_type, samples: Vec::new() });
        family.samples.push(node);
    }

    let mut out = String::new();
    for (name, family) in &families {
        let mut lines = String::new();
        for node in &family.samples {
            let Some(value) = sample_value(node) else {
                tracing::trace!(metric = name, "Skipping non-numeric sample");
                continue;
            };
            match node.prom_labels.as_deref() {
                Some(labels) => {
                    let _ = writeln!(lines, "{PREFIX}{name}{{{labels}}} {value}");
                }
                None => {
                    let _ = writeln!(lines, "{PREFIX}{name} {value}");
                }
            }
        }
        if lines.is_empty() {
            continue;
        }
        if let Some(kind) = family.kind {
            let _ = writeln!(out, "# TYPE {PREFIX}{name} {kind}");
        }
        out.push_str(&lines);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_line_once_per_name() {
        let mut seq = MetricSequence::new();
        seq.short_integer("a", 1);
        seq.prom("sessions", PromType::Gauge);
        seq.prom_labels("type=\"own\"".into());
        seq.short_integer("b", 2);
        seq.prom("uptime_seconds", PromType::Gauge);
        seq.short_integer("c", 3);
        seq.prom("sessions", PromType::Gauge);
        seq.prom_labels("type=\"foreign\"".into());
        seq.short_integer("hidden", 4);

        assert_eq!(
            render(&seq),
            "# TYPE relay_sessions gauge\n\
             relay_sessions{type=\"own\"} 1\n\
             relay_sessions{type=\"foreign\"} 3\n\
             # TYPE relay_uptime_seconds gauge\n\
             relay_uptime_seconds 2\n"
        );
    }

    #[test]
    fn string_values_are_dropped_unless_numeric() {
        let mut seq = MetricSequence::new();
        seq.value(
            "avgcallduration",
            "Average call duration",
            "12.500000".into(),
            "12.500000".into(),
        );
        seq.prom("call_duration_avg", PromType::Gauge);
        seq.quoted("name", "default");
        seq.prom("interface", PromType::Gauge);

        let text = render(&seq);
        assert!(text.contains("relay_call_duration_avg 12.500000\n"));
        assert!(!text.lines().any(|l| l.starts_with("relay_interface")));
    }

    #[test]
    fn no_type_line_without_numeric_samples() {
        let mut seq = MetricSequence::new();
        seq.quoted("name", "default");
        seq.prom("interface", PromType::Gauge);
        seq.quoted("address", "192.0.2.1");
        seq.prom("interface", PromType::Gauge);
        seq.short_integer("b", 2);
        seq.prom("uptime_seconds", PromType::Gauge);

        assert_eq!(
            render(&seq),
            "# TYPE relay_uptime_seconds gauge\n\
             relay_uptime_seconds 2\n"
        );
    }
}
