//! Builds the flat metric sequence from live reads.
//!
//! Each component is read under its own lock and released before the next
//! one is touched, so the result is consistent per component only.

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;

use super::metric::{MetricSequence, PromType};
use crate::accounting::{
    CodecChainSnapshot, ControlPeerStats, IntervalSnapshot, NgCommand, RequestKind,
};
use crate::stats::Statistics;
use crate::time::{Timestamp, format_duration};

/// Read access to the state the statistics do not own.
pub trait Collaborators {
    /// Size of the session table, foreign sessions included.
    fn session_count(&self) -> u64;

    /// Every control peer that has ever sent a request.
    fn control_peers(&self) -> Vec<Arc<ControlPeerStats>>;

    /// Every configured local interface.
    fn local_interfaces(&self) -> Vec<InterfaceSnapshot>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        }
    }
}

/// Port-pool usage of one local interface address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub address: IpAddr,
    /// Family the logical interface prefers; other addresses are secondary.
    pub preferred_family: AddressFamily,
    pub port_min: u16,
    pub port_max: u16,
    pub free_ports: u32,
    pub last_used: u16,
}

impl InterfaceSnapshot {
    pub fn is_first_order(&self) -> bool {
        AddressFamily::of(&self.address) == self.preferred_family
    }

    pub fn total_ports(&self) -> u32 {
        u32::from(self.port_max.saturating_sub(self.port_min)) + 1
    }

    pub fn used_ports(&self) -> u32 {
        self.total_ports().saturating_sub(self.free_ports)
    }
}

impl Statistics {
    /// Assemble the full export sequence.
    pub fn gather_metrics<C: Collaborators + ?Sized>(
        &self,
        collaborators: &C,
        now: Timestamp,
    ) -> MetricSequence {
        let mut m = MetricSequence::new();

        m.open_dict();
        self.gather_current(&mut m, collaborators.session_count());
        self.gather_totals(&mut m, now);
        gather_interval(&mut m, &self.interval.last());
        gather_control(&mut m, &collaborators.control_peers());
        gather_interfaces(&mut m, &collaborators.local_interfaces());
        gather_transcoders(&mut m, &self.codecs.snapshot_all(now));
        m.close_dict();

        m
    }

    fn gather_current(&self, m: &mut MetricSequence, session_count: u64) {
        let c = &self.current;

        m.header("currentstatistics", "Statistics over currently running sessions:");
        m.open_dict();

        m.integer("sessionsown", "Owned sessions", self.managed_sessions(session_count));
        m.prom("sessions", PromType::Gauge);
        m.prom_labels("type=\"own\"".into());
        m.integer("sessionsforeign", "Foreign sessions", c.foreign_sessions.get());
        m.prom("sessions", PromType::Gauge);
        m.prom_labels("type=\"foreign\"".into());

        m.integer("sessionstotal", "Total sessions", session_count);
        m.integer("transcodedmedia", "Transcoded media", c.transcoded_media.get());
        m.prom("transcoded_media", PromType::Gauge);

        m.integer("packetrate", "Packets per second", c.packet_rate.get());
        m.integer("byterate", "Bytes per second", c.byte_rate.get());
        m.integer("errorrate", "Errors per second", c.error_rate.get());

        m.close_dict();
    }

    fn gather_totals(&self, m: &mut MetricSequence, now: Timestamp) {
        let avg = self.totals.average.snapshot();
        let t = self.totals.counters();

        m.header(
            "totalstatistics",
            "Total statistics (does not include current running sessions):",
        );
        m.open_dict();

        let uptime = self.uptime(now);
        m.value("uptime", "Uptime", uptime.to_string(), format!("{uptime} seconds"));
        m.prom("uptime_seconds", PromType::Gauge);

        m.integer("managedsessions", "Total managed sessions", avg.samples);
        m.prom("sessions_total", PromType::Counter);

        let closed = [
            ("rejectedsessions", "Total rejected sessions", t.rejected_sessions, "rejected"),
            (
                "timeoutsessions",
                "Total timed-out sessions via TIMEOUT",
                t.timeout_sessions,
                "timeout",
            ),
            (
                "silenttimeoutsessions",
                "Total timed-out sessions via SILENT_TIMEOUT",
                t.silent_timeout_sessions,
                "silent_timeout",
            ),
            (
                "finaltimeoutsessions",
                "Total timed-out sessions via FINAL_TIMEOUT",
                t.final_timeout_sessions,
                "final_timeout",
            ),
            (
                "offertimeoutsessions",
                "Total timed-out sessions via OFFER_TIMEOUT",
                t.offer_timeout_sessions,
                "offer_timeout",
            ),
            (
                "regularterminatedsessions",
                "Total regular terminated sessions",
                t.regular_term_sessions,
                "terminated",
            ),
            (
                "forcedterminatedsessions",
                "Total forced terminated sessions",
                t.forced_term_sessions,
                "force_terminated",
            ),
        ];
        for (label, descr, value, reason) in closed {
            m.integer(label, descr, value);
            m.prom("closed_sessions_total", PromType::Counter);
            m.prom_labels(format!("reason=\"{reason}\""));
        }

        m.integer("relayedpackets", "Total relayed packets", t.relayed_packets);
        m.prom("packets_total", PromType::Counter);
        m.integer("relayedpacketerrors", "Total relayed packet errors", t.relayed_errors);
        m.prom("packet_errors_total", PromType::Counter);
        m.integer("relayedbytes", "Total relayed bytes", t.relayed_bytes);
        m.prom("bytes_total", PromType::Counter);

        m.integer(
            "zerowaystreams",
            "Total number of streams with no relayed packets",
            t.zero_way_streams,
        );
        m.prom("zero_packet_streams_total", PromType::Counter);
        m.integer("onewaystreams", "Total number of 1-way streams", t.one_way_streams);
        m.prom("one_way_sessions_total", PromType::Counter);

        let avg_dur = format_duration(avg.average);
        m.value("avgcallduration", "Average call duration", avg_dur.clone(), avg_dur);

        m.blank();
        m.close_dict();
    }
}

fn gather_interval(m: &mut MetricSequence, last: &IntervalSnapshot) {
    m.header("intervalstatistics", "Interval statistics (last completed interval):");
    m.open_dict();

    let total = format_duration(last.calls_duration);
    m.value("totalcallsduration", "Total calls duration", total.clone(), total);
    m.blank();

    m.integer("minmanagedsessions", "Min managed sessions", last.min_managed_sessions);
    m.integer("maxmanagedsessions", "Max managed sessions", last.max_managed_sessions);

    for kind in RequestKind::ALL {
        let t = last.request_time(kind);
        let (min, max, avg) =
            (format_duration(t.min), format_duration(t.max), format_duration(t.avg));
        let name = kind.name();
        m.line(
            format!("Min/Max/Avg {name} processing delay"),
            format!("{min}/{max}/{avg} sec"),
        );
        m.short(&format!("min{name}delay"), min);
        m.short(&format!("max{name}delay"), max);
        m.short(&format!("avg{name}delay"), avg);
    }

    for kind in RequestKind::ALL {
        let r = last.request_rate(kind);
        let name = kind.name();
        m.line(
            format!("Min/Max/Avg {name} requests per second"),
            format!("{}/{}/{} per sec", r.min, r.max, r.avg),
        );
        m.short_integer(&format!("min{name}requestrate"), r.min);
        m.short_integer(&format!("max{name}requestrate"), r.max);
        m.short_integer(&format!("avg{name}requestrate"), r.avg);
    }

    m.blank();
    m.close_dict();
}

fn gather_control(m: &mut MetricSequence, peers: &[Arc<ControlPeerStats>]) {
    m.header("controlstatistics", "Control statistics:");
    m.open_dict();
    m.group("proxies");
    m.open_list();

    let mut heading = format!(" {:>20} ", "Proxy");
    for cmd in NgCommand::ALL {
        heading.push_str(&format!("| {:>10} ", cmd.short_name()));
    }
    m.text(heading);

    let mut totals = [0u64; NgCommand::COUNT];

    for peer in peers {
        let addr = peer.addr().to_string();
        m.open_dict();
        m.quoted("proxy", &addr);

        let mut row = format!(" {addr:>20} ");
        for cmd in NgCommand::ALL {
            let stats = peer.command(cmd);
            row.push_str(&format!("| {:>10} ", stats.count));
            totals[cmd.index()] += stats.count;

            let short = cmd.short_name().to_ascii_lowercase();
            let labels = format!("proxy=\"{addr}\",request=\"{}\"", cmd.name());
            m.short_integer(&format!("{short}count"), stats.count);
            m.prom("requests_total", PromType::Counter);
            m.prom_labels(labels.clone());
            m.short(&format!("{short}duration"), format_duration(stats.time));
            m.prom("request_seconds_total", PromType::Counter);
            m.prom_labels(labels);
        }
        m.line("", row);

        m.short_integer("errorcount", peer.errors());
        m.prom("errors_total", PromType::Counter);
        m.prom_labels(format!("proxy=\"{addr}\""));
        m.close_dict();
    }

    m.close_list();

    for cmd in NgCommand::ALL {
        let short = cmd.short_name().to_ascii_lowercase();
        m.short_integer(&format!("total{short}count"), totals[cmd.index()]);
    }

    m.close_dict();
}

fn gather_interfaces(m: &mut MetricSequence, interfaces: &[InterfaceSnapshot]) {
    m.group("interfaces");
    m.open_list();

    for lif in interfaces.iter().filter(|l| l.is_first_order()) {
        let address = lif.address.to_string();
        let labels = format!("name=\"{}\",address=\"{address}\"", lif.name);
        let total = lif.total_ports();
        let used = lif.used_ports();

        m.open_dict();
        m.quoted("name", &lif.name);
        m.quoted("address", &address);

        m.group("ports");
        m.open_dict();
        m.short_integer("min", lif.port_min.into());
        m.short_integer("max", lif.port_max.into());
        m.short_integer("used", used.into());
        m.prom("ports_used", PromType::Gauge);
        m.prom_labels(labels.clone());
        m.short("used_pct", format!("{:.2}", f64::from(used) * 100.0 / f64::from(total)));
        m.short_integer("free", lif.free_ports.into());
        m.prom("ports_free", PromType::Gauge);
        m.prom_labels(labels.clone());
        m.short_integer("totals", total.into());
        m.prom("ports", PromType::Gauge);
        m.prom_labels(labels);
        m.short_integer("last", lif.last_used.into());
        m.close_dict();

        m.close_dict();
    }

    m.close_list();
}

fn gather_transcoders(m: &mut MetricSequence, chains: &[CodecChainSnapshot]) {
    m.group("transcoders");
    m.open_list();

    for c in chains {
        let labels = format!("chain=\"{}\"", c.chain);
        m.open_dict();
        m.quoted("chain", &c.chain);
        m.short_signed("num", c.transcoders);
        m.prom("transcoders", PromType::Gauge);
        m.prom_labels(labels.clone());
        if let Some(rate) = c.rate {
            m.short_integer("packetrate", rate.packets);
            m.short_integer("byterate", rate.bytes);
            m.short_integer("samplerate", rate.samples);
        }
        m.short_integer("packets", c.packets);
        m.prom("transcode_packets_total", PromType::Counter);
        m.prom_labels(labels.clone());
        m.short_integer("bytes", c.bytes);
        m.prom("transcode_bytes_total", PromType::Counter);
        m.prom_labels(labels.clone());
        m.short_integer("samples", c.samples);
        m.prom("transcode_samples_total", PromType::Counter);
        m.prom_labels(labels);
        m.close_dict();
    }

    m.close_list();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_interface_addresses_are_not_first_order() {
        let lif = InterfaceSnapshot {
            name: "pub".into(),
            address: "::1".parse().unwrap(),
            preferred_family: AddressFamily::Ipv4,
            port_min: 30000,
            port_max: 30009,
            free_ports: 7,
            last_used: 30004,
        };
        assert!(!lif.is_first_order());
        assert_eq!(lif.total_ports(), 10);
        assert_eq!(lif.used_ports(), 3);
    }
}
