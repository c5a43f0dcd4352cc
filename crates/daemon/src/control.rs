//! Control request handling.
//!
//! A request is a JSON object carrying a `command` plus command-specific
//! keys. Every reply is a JSON object with `result` set to `ok`, `pong` or
//! `error`; errors add an `error-reason`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow, bail};
use relay_stats::accounting::{MediaFamilies, NgCommand, Ownership, TermReason};
use relay_stats::{Dict, Timestamp, Value};
use serde::Deserialize;
use serde_json::json;

use crate::Daemon;
use crate::registry::OfferParams;

/// Keys a request may carry. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct Request {
    command: String,
    call_id: Option<String>,
    from_tag: Option<String>,
    to_tag: Option<String>,
    foreign: bool,
    /// SDP address types offered by the side sending this request.
    families: Vec<String>,
    interface: Option<String>,
    transcode: Option<String>,
    reason: Option<TermReason>,
}

impl Request {
    fn call_id(&self) -> Result<&str> {
        self.call_id
            .as_deref()
            .ok_or_else(|| anyhow!("No call-id in message"))
    }

    fn from_tag(&self) -> Result<&str> {
        self.from_tag
            .as_deref()
            .ok_or_else(|| anyhow!("No from-tag in message"))
    }

    fn families(&self) -> Result<MediaFamilies> {
        let mut f = MediaFamilies::NONE;
        for family in &self.families {
            match family.as_str() {
                "IP4" => f.ipv4 = true,
                "IP6" => f.ipv6 = true,
                other => bail!("Unsupported address family '{}'", other),
            }
        }
        Ok(f)
    }
}

/// Dispatches control requests against a [`Daemon`].
#[derive(Clone)]
pub struct ControlHandler {
    daemon: Arc<Daemon>,
}

impl ControlHandler {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self { daemon }
    }

    /// Handle one request from `peer` and produce the reply.
    ///
    /// Known commands are counted and timed against the peer's IP address
    /// (the source port is ignored); failures of any kind bump the peer's
    /// error counter instead.
    pub fn handle(&self, peer: SocketAddr, request: &serde_json::Value) -> serde_json::Value {
        let started = Instant::now();
        let peer_stats = self.daemon.peers.peer(peer.ip());

        let outcome = Request::deserialize(request)
            .context("Could not decode request")
            .and_then(|req| {
                let cmd = NgCommand::from_name(&req.command)
                    .ok_or_else(|| anyhow!("Unrecognized command '{}'", req.command))?;
                self.dispatch(cmd, &req).map(|reply| (cmd, reply))
            });

        match outcome {
            Ok((cmd, reply)) => {
                let elapsed = started.elapsed();
                peer_stats.record(cmd, elapsed);
                if let Some(kind) = cmd.request_kind() {
                    self.daemon.stats.record_request(kind, elapsed);
                }
                tracing::debug!(%peer, command = cmd.name(), ?elapsed, "Control request done");
                reply
            }
            Err(e) => {
                peer_stats.record_error();
                tracing::warn!(%peer, "Control request failed: {:#}", e);
                json!({ "result": "error", "error-reason": format!("{e:#}") })
            }
        }
    }

    fn dispatch(&self, cmd: NgCommand, req: &Request) -> Result<serde_json::Value> {
        let now = Timestamp::now();
        let sessions = &self.daemon.sessions;

        match cmd {
            NgCommand::Ping => Ok(json!({ "result": "pong" })),

            NgCommand::Offer => {
                let params = OfferParams {
                    from_tag: req.from_tag()?.to_owned(),
                    ownership: req.foreign.then_some(Ownership::Foreign),
                    families: req.families()?,
                    interface: req.interface.clone(),
                    transcode: req.transcode.clone(),
                };
                let (_, port) = sessions.offer(req.call_id()?, params, now)?;
                Ok(json!({ "result": "ok", "port": port }))
            }

            NgCommand::Answer => {
                let to_tag = req
                    .to_tag
                    .as_deref()
                    .ok_or_else(|| anyhow!("No to-tag in message"))?;
                let (_, port) = sessions.answer(req.call_id()?, to_tag, req.families()?, now)?;
                Ok(json!({ "result": "ok", "port": port }))
            }

            NgCommand::Delete => {
                let reason = req.reason.unwrap_or(TermReason::Regular);
                sessions.delete(req.call_id()?, reason, now)?;
                Ok(json!({ "result": "ok" }))
            }

            NgCommand::Query => {
                let session = sessions
                    .get(req.call_id()?)
                    .ok_or_else(|| anyhow!("Unknown call-id"))?;
                Ok(json!({
                    "result": "ok",
                    "created": session.created.as_secs(),
                    "legs": session.legs(),
                }))
            }

            NgCommand::List => Ok(json!({ "result": "ok", "calls": sessions.list() })),

            NgCommand::Statistics => {
                let mut root = Dict::new();
                root.insert("result".into(), Value::String("ok".into()));
                self.daemon
                    .stats
                    .export_into(&mut root, self.daemon.as_ref(), now)?;
                Ok(serde_json::to_value(&root)?)
            }

            other => bail!("Unsupported command '{}'", other.name()),
        }
    }
}
