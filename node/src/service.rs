//! # Shop Service
//!
//! The single writer in front of the chain. Every mutation (transaction
//! blocks and faucet credits) goes through one `parking_lot::Mutex`, so
//! operations on the shop are strictly sequential no matter how many API
//! requests arrive at once.
//!
//! A block is executed on a copy of the chain, persisted together with its
//! events and the resulting snapshot, and only then swapped in. If the
//! store write fails, the in-memory state stays at the last persisted block.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::broadcast;

use lucky_contracts::runtime::{Block, ChainError, SignedTransaction};
use lucky_contracts::{Chain, ShopEvent, TokenLedger};
use lucky_protocol::storage::{ChainStore, StoreError};
use lucky_protocol::{Address, Clock};

use crate::metrics::SharedMetrics;

/// Broadcast channel capacity for live event streaming.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Rejected(#[from] ChainError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("faucet is disabled on this node")]
    FaucetDisabled,

    #[error("faucet request of {requested} exceeds the limit of {limit}")]
    FaucetLimit { requested: u64, limit: u64 },

    #[error("stored snapshot is missing although {blocks} blocks exist")]
    MissingSnapshot { blocks: usize },
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEvent {
    /// A block was committed.
    Block {
        height: u64,
        timestamp: u64,
        tx_count: usize,
        failed: usize,
    },
    /// A shop event was appended to the audit log.
    Shop { sequence: u64, event: ShopEvent },
}

pub struct ShopService {
    chain: Mutex<Chain>,
    store: ChainStore,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<NodeEvent>,
    metrics: SharedMetrics,
    faucet_limit: Option<u64>,
}

impl ShopService {
    /// Restores the chain from the store's latest snapshot, or deploys a
    /// fresh shop for `administrator` and persists it as block 0.
    pub fn open(
        store: ChainStore,
        clock: Arc<dyn Clock>,
        administrator: Address,
        initial_supply: u64,
        metrics: SharedMetrics,
        faucet_limit: Option<u64>,
    ) -> Result<Self, ServiceError> {
        let chain = match store.load_snapshot::<Chain>()? {
            Some(chain) => {
                tracing::info!(
                    height = chain.height(),
                    shop = %chain.shop().address(),
                    "chain restored from snapshot"
                );
                if chain.shop().administrator() != administrator {
                    tracing::warn!(
                        configured = %administrator,
                        deployed = %chain.shop().administrator(),
                        "configured key is not the shop administrator"
                    );
                }
                metrics.observe_state(&chain);
                chain
            }
            None => {
                let blocks = store.block_count();
                if blocks > 0 {
                    return Err(ServiceError::MissingSnapshot { blocks });
                }
                let (chain, genesis) = Chain::genesis(administrator, initial_supply, clock.now());
                store.put_block(genesis.height, &genesis, &genesis.events(), &chain)?;
                metrics.observe_block(&genesis, &chain);
                tracing::info!(
                    shop = %chain.shop().address(),
                    token = %chain.shop().token().address(),
                    %administrator,
                    initial_supply,
                    "genesis block persisted"
                );
                chain
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            chain: Mutex::new(chain),
            store,
            clock,
            events,
            metrics,
            faucet_limit,
        })
    }

    /// Executes `txs` as one block at the current clock time.
    pub fn submit(&self, txs: Vec<SignedTransaction>) -> Result<Block, ServiceError> {
        let started = Instant::now();
        let mut chain = self.chain.lock();
        let mut next = chain.clone();
        let block = match next.execute_block(self.clock.now(), txs) {
            Ok(block) => block,
            Err(err) => {
                self.metrics.blocks_rejected_total.inc();
                tracing::debug!(code = err.code(), error = %err, "block rejected");
                return Err(err.into());
            }
        };
        self.commit(&mut chain, next, &block)?;
        self.metrics
            .block_commit_seconds
            .observe(started.elapsed().as_secs_f64());
        Ok(block)
    }

    /// Credits devnet currency to `to`, bounded by the faucet limit.
    pub fn fund(&self, to: Address, amount: u64) -> Result<Block, ServiceError> {
        let limit = self.faucet_limit.ok_or(ServiceError::FaucetDisabled)?;
        if amount > limit {
            return Err(ServiceError::FaucetLimit {
                requested: amount,
                limit,
            });
        }
        let mut chain = self.chain.lock();
        let mut next = chain.clone();
        let block = next.fund(self.clock.now(), to, amount)?;
        self.commit(&mut chain, next, &block)?;
        Ok(block)
    }

    fn commit(&self, current: &mut Chain, next: Chain, block: &Block) -> Result<(), ServiceError> {
        let events = block.events();
        let first_seq = self.store.put_block(block.height, block, &events, &next)?;
        *current = next;
        self.metrics.observe_block(block, current);

        // Nobody listening is fine.
        let _ = self.events.send(NodeEvent::Block {
            height: block.height,
            timestamp: block.timestamp,
            tx_count: block.receipts.len(),
            failed: block.receipts.iter().filter(|r| !r.is_success()).count(),
        });
        for (offset, event) in events.into_iter().enumerate() {
            let _ = self.events.send(NodeEvent::Shop {
                sequence: first_seq + offset as u64,
                event,
            });
        }
        Ok(())
    }

    /// Runs `f` against the current state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&Chain) -> R) -> R {
        f(&self.chain.lock())
    }

    pub fn block(&self, height: u64) -> Result<Option<Block>, ServiceError> {
        Ok(self.store.get_block(height)?)
    }

    /// A page of the audit log.
    pub fn events(&self, from: u64, limit: usize) -> Result<Vec<(u64, ShopEvent)>, ServiceError> {
        Ok(self.store.events(from, limit)?)
    }

    pub fn event_count(&self) -> Result<u64, ServiceError> {
        Ok(self.store.event_count()?)
    }

    pub fn faucet_limit(&self) -> Option<u64> {
        self.faucet_limit
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }
}
