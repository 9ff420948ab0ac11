//! # Prometheus Metrics
//!
//! Exposes shop and chain metrics. Scraped by Prometheus at the `/metrics`
//! HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use lucky_contracts::runtime::{Block, CallOutput, TxStatus};
use lucky_contracts::token::TokenLedger;
use lucky_contracts::Chain;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct ShopMetrics {
    registry: Registry,
    /// Blocks committed, including genesis and faucet blocks.
    pub blocks_committed_total: IntCounter,
    /// Included transactions by outcome (`success` / `failed`).
    pub transactions_total: IntCounterVec,
    /// Blocks refused before execution (bad signature, nonce, size).
    pub blocks_rejected_total: IntCounter,
    pub tokens_bought_total: IntCounter,
    pub tokens_sold_total: IntCounter,
    /// Currency charged to buyers plus currency paid to sellers.
    pub currency_volume_total: IntCounter,
    pub shop_currency_balance: IntGauge,
    pub shop_token_inventory: IntGauge,
    pub token_total_supply: IntGauge,
    pub block_height: IntGauge,
    /// Time spent executing and persisting a block.
    pub block_commit_seconds: Histogram,
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C) -> prometheus::Result<C> {
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

fn gauge_value(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

impl ShopMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("lucky".into()), None)?;

        Ok(Self {
            blocks_committed_total: register(
                &registry,
                IntCounter::new("blocks_committed_total", "Total number of committed blocks")?,
            )?,
            transactions_total: register(
                &registry,
                IntCounterVec::new(
                    Opts::new("transactions_total", "Included transactions by outcome"),
                    &["outcome"],
                )?,
            )?,
            blocks_rejected_total: register(
                &registry,
                IntCounter::new("blocks_rejected_total", "Blocks refused before execution")?,
            )?,
            tokens_bought_total: register(
                &registry,
                IntCounter::new("tokens_bought_total", "Tokens sold by the shop to buyers")?,
            )?,
            tokens_sold_total: register(
                &registry,
                IntCounter::new("tokens_sold_total", "Tokens bought back by the shop")?,
            )?,
            currency_volume_total: register(
                &registry,
                IntCounter::new("currency_volume_total", "Currency moved by buys and sells")?,
            )?,
            shop_currency_balance: register(
                &registry,
                IntGauge::new("shop_currency_balance", "Native currency held by the shop")?,
            )?,
            shop_token_inventory: register(
                &registry,
                IntGauge::new("shop_token_inventory", "Tokens held by the shop")?,
            )?,
            token_total_supply: register(
                &registry,
                IntGauge::new("token_total_supply", "Total token supply")?,
            )?,
            block_height: register(
                &registry,
                IntGauge::new("block_height", "Height of the latest committed block")?,
            )?,
            block_commit_seconds: register(
                &registry,
                Histogram::with_opts(
                    HistogramOpts::new(
                        "block_commit_seconds",
                        "Latency of executing and persisting a block in seconds",
                    )
                    .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
                )?,
            )?,
            registry,
        })
    }

    /// Records a committed block and refreshes the state gauges.
    pub fn observe_block(&self, block: &Block, chain: &Chain) {
        self.blocks_committed_total.inc();
        for receipt in &block.receipts {
            match &receipt.status {
                TxStatus::Success { output, .. } => {
                    self.transactions_total.with_label_values(&["success"]).inc();
                    match output {
                        CallOutput::Bought(r) => {
                            self.tokens_bought_total.inc_by(r.amount);
                            self.currency_volume_total.inc_by(r.charge);
                        }
                        CallOutput::Sold(r) => {
                            self.tokens_sold_total.inc_by(r.amount);
                            self.currency_volume_total.inc_by(r.payout);
                        }
                        CallOutput::Unit | CallOutput::Withdrawn { .. } => {}
                    }
                }
                TxStatus::Failed { .. } => {
                    self.transactions_total.with_label_values(&["failed"]).inc();
                }
            }
        }
        self.observe_state(chain);
    }

    /// Sets the gauges from the current state.
    pub fn observe_state(&self, chain: &Chain) {
        let shop = chain.shop();
        self.shop_currency_balance
            .set(gauge_value(shop.shop_balance(chain.bank())));
        self.shop_token_inventory.set(gauge_value(shop.inventory()));
        self.token_total_supply
            .set(gauge_value(shop.token().total_supply()));
        self.block_height.set(gauge_value(chain.height()));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Shared metrics handle passed to axum handlers and the service.
pub type SharedMetrics = Arc<ShopMetrics>;

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

#[cfg(test)]
mod tests {
    use super::*;
    use lucky_protocol::Address;

    #[test]
    fn genesis_state_is_exported() {
        let metrics = ShopMetrics::new().unwrap();
        let (chain, block) = Chain::genesis(Address::from_label("owner"), 1_000, 0);
        metrics.observe_block(&block, &chain);

        assert_eq!(metrics.blocks_committed_total.get(), 1);
        assert_eq!(metrics.shop_token_inventory.get(), 1_000);
        assert_eq!(metrics.token_total_supply.get(), 1_000);

        let text = metrics.encode().unwrap();
        assert!(text.contains("lucky_shop_token_inventory 1000"));
        assert!(text.contains("lucky_block_height 0"));
    }

    #[test]
    fn gauge_value_saturates() {
        assert_eq!(gauge_value(u64::MAX), i64::MAX);
        assert_eq!(gauge_value(7), 7);
    }
}
