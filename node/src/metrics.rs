//! Prometheus metrics for the shroud node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`] that the API `/metrics`
//! route encodes into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

use crate::NodeError;

pub struct NodeMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Frames read from the datagram transport.
    pub datagrams_received: IntCounter,
    /// Envelopes that passed replay and validation.
    pub messages_accepted: IntCounter,
    /// Frames dropped for any reason.
    pub messages_dropped: IntCounter,
    pub pings_accepted: IntCounter,
    pub blocks_finalized: IntCounter,
    /// Transactions stacked locally, from the API or a completed join.
    pub transactions_stacked: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub chain_height: IntGauge,
    /// Peers in the current network snapshot.
    pub network_size: IntGauge,
    /// Last summarized ping latency in milliseconds.
    pub average_latency_ms: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, NodeError> {
    Ok(register_int_counter_with_registry!(
        Opts::new(name, help),
        registry
    )?)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, NodeError> {
    Ok(register_int_gauge_with_registry!(
        Opts::new(name, help),
        registry
    )?)
}

impl NodeMetrics {
    pub fn new() -> Result<Self, NodeError> {
        let registry = Registry::new();
        Ok(Self {
            datagrams_received: counter(
                &registry,
                "shroud_datagrams_received_total",
                "Frames read from the datagram transport",
            )?,
            messages_accepted: counter(
                &registry,
                "shroud_messages_accepted_total",
                "Envelopes accepted after replay and validation checks",
            )?,
            messages_dropped: counter(
                &registry,
                "shroud_messages_dropped_total",
                "Frames dropped by the network engine",
            )?,
            pings_accepted: counter(
                &registry,
                "shroud_pings_accepted_total",
                "Liveness pings accepted",
            )?,
            blocks_finalized: counter(
                &registry,
                "shroud_blocks_finalized_total",
                "Blocks appended to the local chain",
            )?,
            transactions_stacked: counter(
                &registry,
                "shroud_transactions_stacked_total",
                "Transactions stacked for proposal by this node",
            )?,
            chain_height: gauge(&registry, "shroud_chain_height", "Height of the local chain tip")?,
            network_size: gauge(
                &registry,
                "shroud_network_size",
                "Peers in the current network snapshot",
            )?,
            average_latency_ms: gauge(
                &registry,
                "shroud_average_latency_ms",
                "Average observed ping latency in milliseconds",
            )?,
            registry,
        })
    }

    /// Encode every registered metric in the text exposition format.
    pub fn encode(&self) -> Result<String, NodeError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| NodeError::Config(format!("metrics encoding: {e}")))
    }
}
