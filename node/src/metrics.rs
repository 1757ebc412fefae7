//! # Prometheus Metrics
//!
//! Operational metrics for the ledger node, scraped at `/metrics` on the
//! configured metrics port. All metrics live in a dedicated
//! [`prometheus::Registry`] prefixed `levy_`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use levy_protocol::config::ONE_TOKEN;
use levy_protocol::Amount;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Transfers and delegated transfers that settled.
    pub transfers_total: IntCounter,
    /// Transfers rejected by the ledger.
    pub transfer_failures_total: IntCounter,
    pub permits_total: IntCounter,
    pub permit_rejections_total: IntCounter,
    /// Automation runs that reached the exchange.
    pub automation_attempts_total: IntCounter,
    /// Automation runs where the swap or the contribution failed.
    pub automation_failures_total: IntCounter,
    /// Snapshot writes that failed after the mutation was applied.
    pub snapshot_failures_total: IntCounter,
    /// Total supply, in whole tokens.
    pub total_supply_tokens: IntGauge,
    /// Liquidity accumulator balance, in whole tokens.
    pub accumulator_tokens: IntGauge,
    pub transfer_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("levy".into()), None)?;

        let transfers_total =
            IntCounter::new("transfers_total", "Total number of settled transfers")?;
        registry.register(Box::new(transfers_total.clone()))?;

        let transfer_failures_total = IntCounter::new(
            "transfer_failures_total",
            "Total number of transfers rejected by the ledger",
        )?;
        registry.register(Box::new(transfer_failures_total.clone()))?;

        let permits_total = IntCounter::new("permits_total", "Total number of accepted permits")?;
        registry.register(Box::new(permits_total.clone()))?;

        let permit_rejections_total = IntCounter::new(
            "permit_rejections_total",
            "Total number of rejected permits",
        )?;
        registry.register(Box::new(permit_rejections_total.clone()))?;

        let automation_attempts_total = IntCounter::new(
            "automation_attempts_total",
            "Liquidity automation runs that reached the exchange",
        )?;
        registry.register(Box::new(automation_attempts_total.clone()))?;

        let automation_failures_total = IntCounter::new(
            "automation_failures_total",
            "Liquidity automation runs that failed inside the exchange",
        )?;
        registry.register(Box::new(automation_failures_total.clone()))?;

        let snapshot_failures_total = IntCounter::new(
            "snapshot_failures_total",
            "Ledger snapshot writes that failed",
        )?;
        registry.register(Box::new(snapshot_failures_total.clone()))?;

        let total_supply_tokens =
            IntGauge::new("total_supply_tokens", "Total supply in whole tokens")?;
        registry.register(Box::new(total_supply_tokens.clone()))?;

        let accumulator_tokens = IntGauge::new(
            "accumulator_tokens",
            "Liquidity accumulator balance in whole tokens",
        )?;
        registry.register(Box::new(accumulator_tokens.clone()))?;

        let transfer_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_latency_seconds",
                "Time spent inside the ledger per transfer call, in seconds",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(transfer_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            transfers_total,
            transfer_failures_total,
            permits_total,
            permit_rejections_total,
            automation_attempts_total,
            automation_failures_total,
            snapshot_failures_total,
            total_supply_tokens,
            accumulator_tokens,
            transfer_latency_seconds,
        })
    }

    /// Refreshes the supply and accumulator gauges.
    pub fn observe_balances(&self, total_supply: Amount, accumulator: Amount) {
        self.total_supply_tokens.set(whole_tokens(total_supply));
        self.accumulator_tokens.set(whole_tokens(accumulator));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn whole_tokens(amount: Amount) -> i64 {
    i64::try_from(amount / ONE_TOKEN).unwrap_or(i64::MAX)
}

pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
